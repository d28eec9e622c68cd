//! Layered configuration for a harvest run.
//!
//! Precedence (lowest to highest):
//! 1. Programmatic defaults (`HarvestConfig::default()`)
//! 2. YAML file (`--config`, default `./config.yaml`; missing file is fine)
//! 3. Environment variables (`REVIEW_HARVEST_*`)
//! 4. Command-line flags

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use review_harvest::{FetcherConfig, LoaderConfig, SortMode};

/// Default config file looked up when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "config.yaml";

/// Prefix of environment overrides.
pub const ENV_PREFIX: &str = "REVIEW_HARVEST_";

/// Desktop Chrome user agent sent by the browser and the image fetcher.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
                                      AppleWebKit/537.36 (KHTML, like Gecko) \
                                      Chrome/131.0.0.0 Safari/537.36";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No URL given. Pass --url or set `url` in the config file")]
    MissingUrl,

    #[error("Invalid URL: {0}. Must be a Google Maps URL (google.com/maps or goo.gl)")]
    InvalidUrl(String),

    #[error("Invalid max_scrolls: {0}. Must be at least 1")]
    InvalidMaxScrolls(usize),

    #[error("Invalid image_concurrency: {0}. Must be at least 1")]
    InvalidImageConcurrency(usize),

    #[error("Invalid timeout_ms: {0}. Must be positive")]
    InvalidTimeout(u64),
}

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    pub url: Option<String>,
    pub sort_by: SortMode,
    pub headless: bool,
    /// Navigation timeout.
    pub timeout_ms: u64,
    pub max_scrolls: usize,
    /// Settle delay after each burst of scroll key presses.
    pub scroll_delay_ms: u64,
    pub base_dir: PathBuf,
    pub export_csv: bool,
    pub download_images: bool,
    pub image_concurrency: usize,
    pub user_agent: String,
    /// Abort image, font and media requests in the browser.
    pub block_resources: bool,
    pub log_dir: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            url: None,
            sort_by: SortMode::Relevance,
            headless: true,
            timeout_ms: 20_000,
            max_scrolls: 250,
            scroll_delay_ms: 800,
            base_dir: PathBuf::from("./data"),
            export_csv: false,
            download_images: false,
            image_concurrency: 5,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            block_resources: true,
            log_dir: None,
        }
    }
}

impl HarvestConfig {
    /// The validated target URL.
    pub fn target_url(&self) -> Result<&str, ConfigError> {
        let url = self
            .url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingUrl)?;
        if is_maps_url(url) {
            Ok(url)
        } else {
            Err(ConfigError::InvalidUrl(url.to_string()))
        }
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_attempts: self.max_scrolls,
            settle: Duration::from_millis(self.scroll_delay_ms),
            ..LoaderConfig::default()
        }
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            concurrency: self.image_concurrency,
            ..FetcherConfig::default()
        }
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Whether `url` points at Google Maps.
pub fn is_maps_url(url: &str) -> bool {
    url.contains("google.com/maps") || url.contains("goo.gl")
}

/// Values supplied on the command line. Unset fields leave lower layers alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConfigOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sort_by: Option<SortMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headless: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_scrolls: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub export_csv: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_images: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_resources: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

/// Configuration loader with hierarchical merging.
pub struct ConfigLoader;

impl ConfigLoader {
    /// The merged provider stack, before extraction.
    pub fn figment(file: &Path, overrides: &ConfigOverrides) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(HarvestConfig::default()))
            .merge(Yaml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::defaults(overrides))
    }

    /// Load and validate. `file` falls back to `./config.yaml`.
    pub fn load(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<HarvestConfig> {
        let file = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        let config: HarvestConfig = Self::figment(file, overrides)
            .extract()
            .with_context(|| format!("Failed to load configuration (file: {})", file.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load without requiring a URL, for `config` display.
    pub fn load_unchecked(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<HarvestConfig> {
        let file = file.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::figment(file, overrides)
            .extract()
            .with_context(|| format!("Failed to load configuration (file: {})", file.display()))
    }

    pub fn validate(config: &HarvestConfig) -> Result<(), ConfigError> {
        config.target_url()?;

        if config.max_scrolls == 0 {
            return Err(ConfigError::InvalidMaxScrolls(config.max_scrolls));
        }
        if config.image_concurrency == 0 {
            return Err(ConfigError::InvalidImageConcurrency(config.image_concurrency));
        }
        if config.timeout_ms == 0 {
            return Err(ConfigError::InvalidTimeout(config.timeout_ms));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAPS: &str = "https://www.google.com/maps/place/Blue+Bottle/@37.78,-122.39,17z";

    fn with_url() -> HarvestConfig {
        HarvestConfig {
            url: Some(MAPS.to_string()),
            ..HarvestConfig::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = HarvestConfig::default();
        assert!(config.headless);
        assert_eq!(config.max_scrolls, 250);
        assert_eq!(config.scroll_delay_ms, 800);
        assert_eq!(config.image_concurrency, 5);
        assert_eq!(config.sort_by, SortMode::Relevance);
        assert_eq!(config.base_dir, PathBuf::from("./data"));
        assert!(config.block_resources);
    }

    #[test]
    fn test_validate_requires_url() {
        assert_eq!(
            ConfigLoader::validate(&HarvestConfig::default()),
            Err(ConfigError::MissingUrl)
        );
        ConfigLoader::validate(&with_url()).expect("maps url should be valid");
    }

    #[test]
    fn test_validate_rejects_foreign_url() {
        let config = HarvestConfig {
            url: Some("https://example.com/reviews".into()),
            ..HarvestConfig::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidUrl(_))
        ));
        assert!(is_maps_url("https://goo.gl/maps/abc123"));
    }

    #[test]
    fn test_validate_zero_limits() {
        let config = HarvestConfig {
            max_scrolls: 0,
            ..with_url()
        };
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidMaxScrolls(0))
        );

        let config = HarvestConfig {
            image_concurrency: 0,
            ..with_url()
        };
        assert_eq!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidImageConcurrency(0))
        );
    }

    #[test]
    fn test_derived_component_configs() {
        let config = HarvestConfig {
            max_scrolls: 40,
            scroll_delay_ms: 100,
            image_concurrency: 2,
            ..with_url()
        };
        let loader = config.loader_config();
        assert_eq!(loader.max_attempts, 40);
        assert_eq!(loader.settle, Duration::from_millis(100));
        assert_eq!(loader.stall_threshold, 15);
        assert_eq!(config.fetcher_config().concurrency, 2);
    }

    #[test]
    fn test_layering() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "harvest.yaml",
                r"
url: https://www.google.com/maps/place/Cafe
sort_by: newest
max_scrolls: 80
export_csv: true
",
            )?;
            jail.set_env("REVIEW_HARVEST_MAX_SCROLLS", "120");

            let overrides = ConfigOverrides {
                sort_by: Some(SortMode::Lowest),
                ..ConfigOverrides::default()
            };
            let config = ConfigLoader::load(Some(Path::new("harvest.yaml")), &overrides)
                .map_err(|e| e.to_string())?;

            assert_eq!(config.url.as_deref(), Some("https://www.google.com/maps/place/Cafe"));
            assert!(config.export_csv);
            assert_eq!(config.max_scrolls, 120);
            assert_eq!(config.sort_by, SortMode::Lowest);
            assert!(config.headless);
            Ok(())
        });
    }

    #[test]
    fn test_resource_blocking_layers() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("harvest.yaml", "block_resources: false\n")?;
            let file = Path::new("harvest.yaml");

            let config = ConfigLoader::load_unchecked(Some(file), &ConfigOverrides::default())
                .map_err(|e| e.to_string())?;
            assert!(!config.block_resources);

            jail.set_env("REVIEW_HARVEST_BLOCK_RESOURCES", "true");
            let config = ConfigLoader::load_unchecked(Some(file), &ConfigOverrides::default())
                .map_err(|e| e.to_string())?;
            assert!(config.block_resources);

            let overrides = ConfigOverrides {
                block_resources: Some(false),
                ..ConfigOverrides::default()
            };
            let config = ConfigLoader::load_unchecked(Some(file), &overrides)
                .map_err(|e| e.to_string())?;
            assert!(!config.block_resources);
            Ok(())
        });
    }

    #[test]
    fn test_missing_file_is_tolerated() {
        figment::Jail::expect_with(|_jail| {
            let overrides = ConfigOverrides {
                url: Some(MAPS.to_string()),
                ..ConfigOverrides::default()
            };
            let config = ConfigLoader::load(None, &overrides).map_err(|e| e.to_string())?;
            assert_eq!(config.url.as_deref(), Some(MAPS));
            Ok(())
        });
    }
}
