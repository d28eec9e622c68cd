//! Chromium render surface using chromiumoxide.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::SetUserAgentOverrideParams;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams as NetworkEnableParams, SetBlockedUrLsParams,
};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use review_harvest::extract::{parse_total_count, records_from_value};
use review_harvest::surface::{LabelPredicate, RenderSurface, SelectorSet};
use review_harvest::{HarvestError, HarvestResult, RawRecord};

use super::find_chromium;

const MAIN_SELECTOR: &str = r#"[role="main"]"#;
const REVIEWS_TAB_SELECTOR: &str = r#"button[aria-label*="Reviews"]"#;
const SORT_BUTTON_SELECTOR: &str = r#"button.HQzyZ[aria-label*="relevant"]"#;
const SORT_MENU_ITEM_SELECTOR: &str = r#"[role="menuitemradio"]"#;
const TOTAL_COUNT_SELECTORS: [&str; 3] = [
    ".fontBodySmall",
    ".jANrlb .fontBodySmall",
    r#"[jslog*="25991"]"#,
];

/// URL patterns aborted when resource blocking is on. Review photos and
/// avatars are served from googleusercontent without a file extension.
const BLOCKED_URL_PATTERNS: [&str; 16] = [
    "*.png",
    "*.jpg",
    "*.jpeg",
    "*.gif",
    "*.webp",
    "*.svg",
    "*.ico",
    "*.woff",
    "*.woff2",
    "*.ttf",
    "*.otf",
    "*.mp4",
    "*.webm",
    "*.mp3",
    "*googleusercontent.com/*",
    "*fonts.gstatic.com/*",
];

const UNKNOWN_BUSINESS: &str = "Unknown Business";
const BUSINESS_NAME_SCRIPT: &str =
    "(() => { const h = document.querySelector('h1'); return h ? h.textContent.trim() : null; })()";

const PAGE_READY_TIMEOUT: Duration = Duration::from_secs(8);
const SORT_BUTTON_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(250);
const AFTER_REVIEWS_TAB: Duration = Duration::from_millis(1500);
const AFTER_SORT_MENU_OPEN: Duration = Duration::from_secs(1);
const AFTER_SORT_SELECTED: Duration = Duration::from_secs(2);
const AFTER_FOCUS: Duration = Duration::from_millis(300);

/// Windows virtual key code for PageDown.
const VK_NEXT: i64 = 34;

/// Settings for launching the browser.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub user_agent: String,
    /// Abort image, font and media requests.
    pub block_resources: bool,
    /// Explicit binary; discovered when `None`.
    pub executable: Option<PathBuf>,
}

/// What the page told us while preparing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub business_name: String,
}

/// A Google Maps place page in a Chromium tab.
pub struct ChromiumSurface {
    browser: Browser,
    page: Page,
    handler: JoinHandle<()>,
    item_selector: String,
}

impl ChromiumSurface {
    /// Launch Chromium and open a blank tab.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let chrome_path = match &options.executable {
            Some(path) => path.clone(),
            None => find_chromium().context(
                "Chromium not found. Install Chrome/Chromium or set REVIEW_HARVEST_CHROMIUM_PATH.",
            )?,
        };

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .window_size(1280, 720)
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg("--disable-software-rasterizer")
            .arg("--disable-extensions");
        if !options.headless {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        page.set_user_agent(SetUserAgentOverrideParams::new(options.user_agent.clone()))
            .await
            .context("failed to set user agent")?;

        if options.block_resources {
            page.execute(NetworkEnableParams::default())
                .await
                .context("failed to enable network domain")?;
            page.execute(SetBlockedUrLsParams::new(blocked_url_patterns()))
                .await
                .context("failed to block resource requests")?;
            debug!(patterns = BLOCKED_URL_PATTERNS.len(), "resource blocking enabled");
        }

        info!(
            headless = options.headless,
            block_resources = options.block_resources,
            "browser launched"
        );
        Ok(Self {
            browser,
            page,
            handler,
            item_selector: SelectorSet::default().item,
        })
    }

    /// Navigate to the place page and open its reviews tab.
    ///
    /// Any failure here is fatal for the run.
    pub async fn prepare(&mut self, url: &str, timeout: Duration) -> Result<PageInfo> {
        let start = Instant::now();
        match tokio::time::timeout(timeout, self.page.goto(url)).await {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {}ms", timeout.as_millis()),
        }
        debug!(elapsed_ms = start.elapsed().as_millis() as u64, "navigation finished");

        self.wait_for(MAIN_SELECTOR, PAGE_READY_TIMEOUT)
            .await
            .context("place page did not render")?;

        let business_name = self
            .eval::<Option<String>>(BUSINESS_NAME_SCRIPT)
            .await
            .ok()
            .flatten()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| UNKNOWN_BUSINESS.to_string());
        info!(business = %business_name, "place page loaded");

        let tab = self
            .wait_for(REVIEWS_TAB_SELECTOR, PAGE_READY_TIMEOUT)
            .await
            .context("reviews tab not found")?;
        tab.click().await.context("failed to open reviews tab")?;
        tokio::time::sleep(AFTER_REVIEWS_TAB).await;
        info!("reviews tab opened");

        Ok(PageInfo { business_name })
    }

    /// Close the browser and stop its event loop.
    pub async fn close(mut self) -> Result<()> {
        let result = self.browser.close().await;
        let _ = self.browser.wait().await;
        self.handler.abort();
        result.map(|_| ()).context("failed to close browser")
    }

    async fn eval<T: DeserializeOwned>(&self, script: &str) -> Result<T> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;
        result
            .into_value()
            .map_err(|e| anyhow!("failed to convert JS result: {e:?}"))
    }

    /// Poll for `selector` until it appears or `timeout` elapses.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<Element> {
        let deadline = Instant::now() + timeout;
        loop {
            match self.page.find_element(selector).await {
                Ok(element) => return Ok(element),
                Err(e) if Instant::now() >= deadline => {
                    bail!("timed out after {}ms waiting for {selector}: {e}", timeout.as_millis())
                }
                Err(_) => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    async fn press_page_down(&self) -> Result<()> {
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let params = DispatchKeyEventParams::builder()
                .r#type(kind)
                .key("PageDown")
                .code("PageDown")
                .windows_virtual_key_code(VK_NEXT)
                .native_virtual_key_code(VK_NEXT)
                .build()
                .map_err(|e| anyhow!("invalid key event: {e}"))?;
            self.page
                .execute(params)
                .await
                .context("failed to dispatch key event")?;
        }
        Ok(())
    }
}

fn blocked_url_patterns() -> Vec<String> {
    BLOCKED_URL_PATTERNS.iter().map(|p| p.to_string()).collect()
}

fn count_script(item_selector: &str) -> String {
    format!(
        "document.querySelectorAll({}).length",
        js_string(item_selector)
    )
}

fn total_count_script() -> String {
    let selectors = serde_json::to_string(&TOTAL_COUNT_SELECTORS).unwrap_or_else(|_| "[]".into());
    format!(
        "(() => {selectors}.map((s) => {{ const el = document.querySelector(s); return el ? el.textContent : null; }}))()"
    )
}

fn menu_labels_script() -> String {
    format!(
        "Array.from(document.querySelectorAll({})).map((el) => el.textContent || '')",
        js_string(SORT_MENU_ITEM_SELECTOR)
    )
}

fn click_menu_item_script(index: usize) -> String {
    format!(
        "(() => {{ const el = document.querySelectorAll({})[{index}]; if (!el) return false; el.click(); return true; }})()",
        js_string(SORT_MENU_ITEM_SELECTOR)
    )
}

/// Script returning one loosely typed object per review item.
fn extraction_script(selectors: &SelectorSet) -> String {
    let s = serde_json::to_string(selectors).unwrap_or_else(|_| "{}".into());
    format!(
        r#"(() => {{
  const s = {s};
  const text = (root, sel) => {{ const el = root.querySelector(sel); return el ? el.textContent.trim() : null; }};
  const attr = (root, sel, name) => {{ const el = root.querySelector(sel); return el ? el.getAttribute(name) : null; }};
  return Array.from(document.querySelectorAll(s.item)).map((el) => {{
    try {{
      return {{
        reviewId: el.getAttribute(s.id_attribute),
        name: text(el, s.name),
        ratingText: text(el, s.rating_text),
        ratingLabel: attr(el, s.rating_label, 'aria-label'),
        text: text(el, s.body),
        date: text(el, s.date),
        likes: text(el, s.likes),
        ownerResponse: text(el, s.owner_response),
        profilePicture: attr(el, s.avatar, 'src'),
        profileUrl: attr(el, s.profile_link, 'data-href'),
        imageStyles: Array.from(el.querySelectorAll(s.image_buttons)).map((b) => b.getAttribute('style') || ''),
      }};
    }} catch (e) {{
      return {{}};
    }}
  }});
}})()"#
    )
}

fn js_string(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".into())
}

#[async_trait]
impl RenderSurface for ChromiumSurface {
    async fn count(&mut self) -> HarvestResult<usize> {
        self.eval::<usize>(&count_script(&self.item_selector))
            .await
            .map_err(|e| HarvestError::SurfaceRead(format!("{e:#}")))
    }

    async fn stimulate(&mut self) -> HarvestResult<()> {
        self.press_page_down()
            .await
            .map_err(|e| HarvestError::Surface(format!("{e:#}")))
    }

    async fn read_fields(&mut self, selectors: &SelectorSet) -> HarvestResult<Vec<RawRecord>> {
        let value = self
            .eval::<serde_json::Value>(&extraction_script(selectors))
            .await
            .map_err(|e| HarvestError::Surface(format!("extraction failed: {e:#}")))?;
        Ok(records_from_value(value, Utc::now()))
    }

    async fn locate_and_activate(&mut self, predicate: &LabelPredicate) -> HarvestResult<bool> {
        let button = self
            .wait_for(SORT_BUTTON_SELECTOR, SORT_BUTTON_TIMEOUT)
            .await
            .map_err(|e| HarvestError::Surface(format!("sort button: {e:#}")))?;
        button
            .click()
            .await
            .map_err(|e| HarvestError::Surface(format!("sort button click: {e}")))?;
        tokio::time::sleep(AFTER_SORT_MENU_OPEN).await;

        let labels = self
            .eval::<Vec<String>>(&menu_labels_script())
            .await
            .map_err(|e| HarvestError::Surface(format!("sort menu: {e:#}")))?;
        debug!(?labels, "sort menu entries");

        let Some(index) = labels.iter().position(|label| predicate(label.as_str())) else {
            return Ok(false);
        };
        let clicked = self
            .eval::<bool>(&click_menu_item_script(index))
            .await
            .map_err(|e| HarvestError::Surface(format!("sort menu click: {e:#}")))?;
        if clicked {
            tokio::time::sleep(AFTER_SORT_SELECTED).await;
        }
        Ok(clicked)
    }

    /// Click the first review so PageDown scrolls the review pane. Never fails.
    async fn focus(&mut self) -> HarvestResult<()> {
        match self.page.find_element(self.item_selector.as_str()).await {
            Ok(first) => match first.click().await {
                Ok(_) => tokio::time::sleep(AFTER_FOCUS).await,
                Err(e) => debug!(error = %e, "could not focus first review"),
            },
            Err(e) => debug!(error = %e, "no review item to focus yet"),
        }
        Ok(())
    }

    async fn disclosed_total(&mut self) -> HarvestResult<Option<usize>> {
        let texts = match self.eval::<Vec<Option<String>>>(&total_count_script()).await {
            Ok(texts) => texts,
            Err(e) => {
                warn!(error = %e, "could not read review total");
                return Ok(None);
            }
        };
        Ok(texts.iter().flatten().find_map(|t| parse_total_count(t)))
    }
}
