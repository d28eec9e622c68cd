//! One end-to-end harvest: browser, harvester, persistence, console report.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{info, info_span, warn, Instrument};

use review_harvest::progress;
use review_harvest::{
    AssetFetcher, AssetLayout, AssetOptions, HarvestOptions, HarvestOutput, Harvester,
    LoadOutcome, NormalizedRecord, RenderSurface, ReviewStats, RunContext,
};

use crate::browser::{ChromiumSurface, LaunchOptions, PageInfo};
use crate::config::{ConfigLoader, HarvestConfig};
use crate::display;
use crate::http::HttpAssetFetcher;
use crate::storage::{RunMetadata, RunStorage};

/// Where a finished run was written, plus its results.
#[derive(Debug)]
pub struct RunSummary {
    pub run_dir: PathBuf,
    pub business_name: String,
    pub output: HarvestOutput,
}

/// What gets persisted for a run, complete or partial.
#[derive(Debug, Clone)]
pub struct RunReport<'a> {
    pub url: &'a str,
    pub business_name: &'a str,
    pub records: &'a [NormalizedRecord],
    pub load_outcome: Option<LoadOutcome>,
    pub error: Option<String>,
}

/// Run the full pipeline against a live Chromium page.
pub async fn run(config: &HarvestConfig) -> Result<RunSummary> {
    ConfigLoader::validate(config)?;
    let url = config.target_url()?.to_string();

    let started_at = Utc::now();
    let storage = RunStorage::new(&config.base_dir, started_at);

    let run_id = uuid::Uuid::new_v4().to_string();
    let (tx, rx) = progress::channel();
    let ctx = RunContext::new(run_id.clone()).with_progress(tx);
    let view = display::spawn_progress_view(rx);

    let span = info_span!("run", run_id = %run_id);
    let result = drive_browser(config, &url, &storage, ctx)
        .instrument(span)
        .await;

    // Every sender is gone once drive_browser returns, so the view drains and exits.
    if let Err(e) = view.await {
        warn!(error = %e, "progress view task failed");
    }

    let summary = result?;
    report(&summary);
    Ok(summary)
}

async fn drive_browser(
    config: &HarvestConfig,
    url: &str,
    storage: &RunStorage,
    ctx: RunContext,
) -> Result<RunSummary> {
    let launch = LaunchOptions {
        headless: config.headless,
        user_agent: config.user_agent.clone(),
        block_resources: config.block_resources,
        executable: None,
    };
    let mut surface = ChromiumSurface::launch(&launch).await?;

    let result = harvest_page(&mut surface, config, url, storage, ctx).await;

    if let Err(e) = surface.close().await {
        warn!(error = %e, "browser did not close cleanly");
    }
    result
}

async fn harvest_page(
    surface: &mut ChromiumSurface,
    config: &HarvestConfig,
    url: &str,
    storage: &RunStorage,
    ctx: RunContext,
) -> Result<RunSummary> {
    info!(url, "opening place page");
    let page = surface
        .prepare(url, config.navigation_timeout())
        .await
        .context("Failed to prepare the reviews page")?;

    let fetcher: Option<Arc<dyn AssetFetcher>> = config.download_images.then(|| {
        Arc::new(HttpAssetFetcher::new(
            &config.user_agent,
            config.fetcher_config().timeout,
        )) as Arc<dyn AssetFetcher>
    });

    execute(surface, &page, url, config, storage, ctx, fetcher).await
}

/// Run the harvester over an already prepared surface and persist the result.
///
/// Records collected before a late failure are still written, with the error
/// noted in the metadata, before the failure is returned.
pub async fn execute<S>(
    surface: &mut S,
    page: &PageInfo,
    url: &str,
    config: &HarvestConfig,
    storage: &RunStorage,
    ctx: RunContext,
    fetcher: Option<Arc<dyn AssetFetcher>>,
) -> Result<RunSummary>
where
    S: RenderSurface + ?Sized,
{
    let options = harvest_options(config, storage, fetcher);
    let harvester = Harvester::new(options, ctx);

    match harvester.run(surface).await {
        Ok(output) => {
            let run_report = RunReport {
                url,
                business_name: &page.business_name,
                records: &output.records,
                load_outcome: Some(output.load.outcome),
                error: None,
            };
            persist(storage, config, Utc::now(), &run_report)?;
            Ok(RunSummary {
                run_dir: storage.run_dir().to_path_buf(),
                business_name: page.business_name.clone(),
                output,
            })
        }
        Err(failure) => {
            if !failure.collected.is_empty() {
                warn!(
                    collected = failure.collected.len(),
                    error = %failure.error,
                    "run failed after extraction, saving partial results"
                );
                let run_report = RunReport {
                    url,
                    business_name: &page.business_name,
                    records: &failure.collected,
                    load_outcome: None,
                    error: Some(failure.error.to_string()),
                };
                if let Err(e) = persist(storage, config, Utc::now(), &run_report) {
                    warn!(error = %e, "could not save partial results");
                }
            }
            Err(anyhow::Error::new(failure).context("Harvest failed"))
        }
    }
}

/// Harvester options derived from the config.
pub fn harvest_options(
    config: &HarvestConfig,
    storage: &RunStorage,
    fetcher: Option<Arc<dyn AssetFetcher>>,
) -> HarvestOptions {
    HarvestOptions {
        sort: config.sort_by,
        loader: config.loader_config(),
        assets: fetcher.map(|fetcher| AssetOptions {
            layout: AssetLayout::new(storage.images_dir()),
            fetcher,
            config: config.fetcher_config(),
        }),
        ..HarvestOptions::default()
    }
}

/// Write reviews.json, the optional CSV and metadata.json.
pub fn persist(
    storage: &RunStorage,
    config: &HarvestConfig,
    finished_at: DateTime<Utc>,
    run_report: &RunReport<'_>,
) -> Result<Vec<PathBuf>> {
    storage.ensure_dir()?;
    let mut written = Vec::new();

    written.push(
        storage
            .save_reviews(run_report.records)
            .context("Failed to save reviews.json")?,
    );
    if config.export_csv {
        written.push(
            storage
                .save_csv(run_report.records)
                .context("Failed to save reviews.csv")?,
        );
    }

    let metadata = RunMetadata {
        timestamp: finished_at,
        url: run_report.url.to_string(),
        sort_by: config.sort_by,
        business_name: run_report.business_name.to_string(),
        total_reviews: run_report.records.len(),
        stats: ReviewStats::calculate(run_report.records),
        run_timestamp: storage.run_timestamp().to_string(),
        load_outcome: run_report.load_outcome,
        images_downloaded: local_asset_count(run_report.records),
        error: run_report.error.clone(),
    };
    written.push(
        storage
            .save_metadata(&metadata)
            .context("Failed to save metadata.json")?,
    );

    info!(dir = %storage.run_dir().display(), files = written.len(), "results saved");
    Ok(written)
}

/// Avatars and review images that made it to disk.
pub fn local_asset_count(records: &[NormalizedRecord]) -> usize {
    records
        .iter()
        .map(|r| {
            usize::from(r.profile_picture_local.is_some())
                + r.images_local.iter().filter(|p| p.is_some()).count()
        })
        .sum()
}

fn report(summary: &RunSummary) {
    let output = &summary.output;
    println!();
    println!("{}", summary.business_name);
    println!("{}", display::stats_table(&output.stats));
    if !output.records.is_empty() {
        println!();
        println!("Sample reviews:");
        print!("{}", display::sample_reviews(&output.records));
    }
    println!();
    println!(
        "Loaded {} reviews ({}, {} scroll attempts)",
        output.records.len(),
        output.load.outcome,
        output.load.attempts()
    );
    if let Some(assets) = output.assets {
        println!(
            "Images: {} downloaded, {} failed",
            assets.downloaded, assets.failed
        );
    }
    println!("Saved to {}", summary.run_dir.display());
}
