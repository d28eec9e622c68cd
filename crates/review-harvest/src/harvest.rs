//! Run orchestration over a render surface.
//!
//! `Harvester` sequences one run: sort selection, convergence loading,
//! extraction, normalization and, when asset downloads are enabled, the
//! batch fetch plus write-back. Persistence and presentation stay with the
//! caller.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::assets::{apply_downloads, plan_downloads, AssetLayout};
use crate::context::RunContext;
use crate::fetcher::{AssetFetcher, BatchFetcher, FetcherConfig};
use crate::loader::{ConvergenceLoader, LoadReport, LoaderConfig};
use crate::normalize::normalize_all;
use crate::progress::ProgressEventKind;
use crate::sort::{select_sort, SortMode, SortSelection};
use crate::stats::ReviewStats;
use crate::surface::{RenderSurface, SelectorSet};
use crate::types::{HarvestError, NormalizedRecord};

/// Asset download settings for one run.
#[derive(Clone)]
pub struct AssetOptions {
    pub layout: AssetLayout,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub config: FetcherConfig,
}

impl std::fmt::Debug for AssetOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetOptions")
            .field("layout", &self.layout)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Everything a run needs besides the surface.
#[derive(Debug, Clone, Default)]
pub struct HarvestOptions {
    pub sort: SortMode,
    pub loader: LoaderConfig,
    pub selectors: SelectorSet,
    /// `None` skips asset downloads.
    pub assets: Option<AssetOptions>,
}

/// Asset phase totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetSummary {
    pub planned: usize,
    pub downloaded: usize,
    pub failed: usize,
}

/// A finished run.
#[derive(Debug, Clone)]
pub struct HarvestOutput {
    pub records: Vec<NormalizedRecord>,
    pub stats: ReviewStats,
    pub load: LoadReport,
    pub sort: SortSelection,
    pub assets: Option<AssetSummary>,
}

/// A run that hit a fatal condition. `collected` holds whatever records were
/// produced before the failure so the caller can still persist them.
#[derive(thiserror::Error, Debug)]
#[error("{error}")]
pub struct HarvestFailure {
    #[source]
    pub error: HarvestError,
    pub collected: Vec<NormalizedRecord>,
}

impl HarvestFailure {
    fn before_extraction(error: HarvestError) -> Self {
        Self {
            error,
            collected: Vec::new(),
        }
    }
}

pub struct Harvester {
    options: HarvestOptions,
    ctx: RunContext,
}

impl Harvester {
    pub fn new(options: HarvestOptions, ctx: RunContext) -> Self {
        Self { options, ctx }
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub async fn run<S>(&self, surface: &mut S) -> Result<HarvestOutput, HarvestFailure>
    where
        S: RenderSurface + ?Sized,
    {
        self.options
            .loader
            .validate()
            .map_err(HarvestFailure::before_extraction)?;
        if let Some(assets) = &self.options.assets {
            assets
                .config
                .validate()
                .map_err(HarvestFailure::before_extraction)?;
        }

        let sort = select_sort(surface, self.options.sort, &self.ctx).await;

        // Sort controls take focus away from the list.
        if let Err(e) = surface.focus().await {
            warn!(error = %e, "could not focus the item list");
        }

        let target = match surface.disclosed_total().await {
            Ok(total) => total,
            Err(e) => {
                warn!(error = %e, "could not read disclosed total, continuing without target");
                None
            }
        };

        let loader = ConvergenceLoader::new(self.options.loader.clone(), self.ctx.clone());
        let load = loader
            .run(surface, target)
            .await
            .map_err(HarvestFailure::before_extraction)?;

        let raw = surface
            .read_fields(&self.options.selectors)
            .await
            .map_err(HarvestFailure::before_extraction)?;
        info!(count = raw.len(), "extracted review items");
        self.ctx.emit(ProgressEventKind::Extracted { count: raw.len() });

        let mut records = normalize_all(&raw, Utc::now());

        let assets = match &self.options.assets {
            Some(options) => match self.fetch_assets(&mut records, options).await {
                Ok(summary) => Some(summary),
                Err(error) => {
                    return Err(HarvestFailure {
                        error,
                        collected: records,
                    })
                }
            },
            None => None,
        };

        let stats = ReviewStats::calculate(&records);
        Ok(HarvestOutput {
            records,
            stats,
            load,
            sort,
            assets,
        })
    }

    async fn fetch_assets(
        &self,
        records: &mut [NormalizedRecord],
        options: &AssetOptions,
    ) -> Result<AssetSummary, HarvestError> {
        let tasks = plan_downloads(records, &options.layout);
        let planned = tasks.len();
        if planned == 0 {
            info!("no images to download");
            return Ok(AssetSummary::default());
        }

        let fetcher = BatchFetcher::new(
            Arc::clone(&options.fetcher),
            options.config.clone(),
            self.ctx.clone(),
        );
        fetcher.prepare(&options.layout.directories()).await?;
        let report = fetcher.run(tasks, |_, _| {}).await;

        apply_downloads(records, &report.completed);
        Ok(AssetSummary {
            planned,
            downloaded: report.succeeded(),
            failed: report.failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::LoadOutcome;
    use crate::surface::ScriptedSurface;
    use crate::types::RawRecord;

    fn options() -> HarvestOptions {
        HarvestOptions {
            loader: LoaderConfig::default().without_delays(),
            ..HarvestOptions::default()
        }
    }

    fn raw(name: &str, rating: &str) -> RawRecord {
        let mut r = RawRecord::empty(Utc::now());
        r.name = name.to_string();
        r.rating_text = rating.to_string();
        r
    }

    #[tokio::test]
    async fn test_run_without_assets() {
        let mut surface = ScriptedSurface::new(vec![1, 2])
            .with_disclosed_total(2)
            .with_records(vec![raw("Ada", "5 stars"), raw("Bo", "3 stars")]);
        let output = Harvester::new(options(), RunContext::new("h"))
            .run(&mut surface)
            .await
            .unwrap();

        assert_eq!(output.load.outcome, LoadOutcome::ReachedTarget);
        assert_eq!(output.sort, SortSelection::Skipped);
        assert_eq!(output.records.len(), 2);
        assert_eq!(output.stats.total_reviews, 2);
        assert!((output.stats.average_rating - 4.0).abs() < 1e-9);
        assert!(output.assets.is_none());
    }

    #[tokio::test]
    async fn test_lost_surface_collects_nothing() {
        let mut surface = ScriptedSurface::new(vec![1, 2, 3]).lost_after(2);
        let failure = Harvester::new(options(), RunContext::new("h"))
            .run(&mut surface)
            .await
            .unwrap_err();
        assert!(matches!(failure.error, HarvestError::Surface(_)));
        assert!(failure.collected.is_empty());
    }

    #[tokio::test]
    async fn test_list_refocused_after_sort_before_loading() {
        let mut surface = ScriptedSurface::new(vec![1, 2])
            .with_disclosed_total(2)
            .with_labels(["Most relevant", "Newest"])
            .with_records(vec![raw("Ada", "5 stars")]);
        let options = HarvestOptions {
            sort: SortMode::Newest,
            ..options()
        };
        Harvester::new(options, RunContext::new("h"))
            .run(&mut surface)
            .await
            .unwrap();

        let log = surface.focus_log();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].activated.as_deref(), Some("Newest"));
        assert_eq!(log[0].stimuli, 0);
        assert!(surface.stimuli() > 0);
    }

    #[tokio::test]
    async fn test_zero_budget_is_rejected_before_touching_surface() {
        let mut surface = ScriptedSurface::new(vec![5]);
        let mut options = options();
        options.loader.max_attempts = 0;
        let failure = Harvester::new(options, RunContext::new("h"))
            .run(&mut surface)
            .await
            .unwrap_err();

        assert!(matches!(failure.error, HarvestError::InvalidConfig(_)));
        assert_eq!(surface.count_reads(), 0);
    }
}
