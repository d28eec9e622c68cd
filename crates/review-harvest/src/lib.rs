//! Review Harvest: convergence-driven loading, normalization and bounded asset fetching for infinite-scroll review lists.

pub mod assets;
pub mod context;
pub mod extract;
pub mod fetcher;
pub mod harvest;
pub mod loader;
pub mod normalize;
pub mod progress;
pub mod sort;
pub mod stats;
pub mod surface;
pub mod types;

pub use assets::{apply_downloads, plan_downloads, AssetLayout};
pub use context::RunContext;
pub use extract::{parse_total_count, records_from_value};
pub use fetcher::{AssetFetcher, BatchFetcher, FetchReport, FetcherConfig};
pub use harvest::{AssetOptions, AssetSummary, HarvestFailure, HarvestOptions, HarvestOutput, Harvester};
pub use loader::{ConvergenceLoader, ConvergenceState, LoadOutcome, LoadReport, LoaderConfig};
pub use normalize::{normalize_all, normalize_record, parse_likes, parse_rating, parse_relative_date};
pub use progress::{ProgressEvent, ProgressEventKind};
pub use sort::{keywords_for, select_sort, SortMode, SortSelection};
pub use stats::ReviewStats;
pub use surface::{FocusCall, LabelPredicate, RenderSurface, ScriptedSurface, SelectorSet};
pub use types::*;
