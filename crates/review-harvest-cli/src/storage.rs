//! Run directory persistence: reviews.json, reviews.csv and metadata.json.

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use review_harvest::{HarvestError, HarvestResult, LoadOutcome, NormalizedRecord, ReviewStats, SortMode};

const REVIEWS_JSON: &str = "reviews.json";
const REVIEWS_CSV: &str = "reviews.csv";
const METADATA_JSON: &str = "metadata.json";
const IMAGES_DIR: &str = "images";

const CSV_HEADERS: [&str; 7] = [
    "Name",
    "Rating",
    "Date",
    "Review Text",
    "Owner Response",
    "Likes",
    "Review ID",
];

/// Summary written next to the reviews.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub timestamp: DateTime<Utc>,
    pub url: String,
    pub sort_by: SortMode,
    pub business_name: String,
    pub total_reviews: usize,
    pub stats: ReviewStats,
    /// Name of the run directory.
    pub run_timestamp: String,
    pub load_outcome: Option<LoadOutcome>,
    pub images_downloaded: usize,
    /// Set when the run ended early; the files hold what was collected.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One timestamped output directory under the base directory.
#[derive(Debug, Clone)]
pub struct RunStorage {
    run_dir: PathBuf,
    run_timestamp: String,
}

impl RunStorage {
    /// Paths for `<base_dir>/<YYYY-MM-DD_HH-MM>`. Nothing is created yet.
    pub fn new(base_dir: &Path, started_at: DateTime<Utc>) -> Self {
        let run_timestamp = started_at.format("%Y-%m-%d_%H-%M").to_string();
        Self {
            run_dir: base_dir.join(&run_timestamp),
            run_timestamp,
        }
    }

    /// Like `new`, creating the directory.
    pub fn create(base_dir: &Path, started_at: DateTime<Utc>) -> HarvestResult<Self> {
        let storage = Self::new(base_dir, started_at);
        storage.ensure_dir()?;
        Ok(storage)
    }

    pub fn ensure_dir(&self) -> HarvestResult<()> {
        std::fs::create_dir_all(&self.run_dir).map_err(|e| {
            HarvestError::Storage(format!("cannot create {}: {e}", self.run_dir.display()))
        })
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    pub fn run_timestamp(&self) -> &str {
        &self.run_timestamp
    }

    /// Root for downloaded images. Created lazily by the fetcher.
    pub fn images_dir(&self) -> PathBuf {
        self.run_dir.join(IMAGES_DIR)
    }

    /// Write all records as a pretty-printed JSON array.
    pub fn save_reviews(&self, records: &[NormalizedRecord]) -> HarvestResult<PathBuf> {
        let path = self.run_dir.join(REVIEWS_JSON);
        let json = serde_json::to_string_pretty(records)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }

    pub fn save_csv(&self, records: &[NormalizedRecord]) -> HarvestResult<PathBuf> {
        let path = self.run_dir.join(REVIEWS_CSV);
        let mut file = std::io::BufWriter::new(std::fs::File::create(&path)?);
        write_csv(records, &mut file)?;
        file.flush()?;
        Ok(path)
    }

    pub fn save_metadata(&self, metadata: &RunMetadata) -> HarvestResult<PathBuf> {
        let path = self.run_dir.join(METADATA_JSON);
        let json = serde_json::to_string_pretty(metadata)?;
        std::fs::write(&path, json)?;
        Ok(path)
    }
}

/// Write records as CSV with a header row.
pub fn write_csv<W: Write>(records: &[NormalizedRecord], writer: &mut W) -> HarvestResult<()> {
    writeln!(writer, "{}", CSV_HEADERS.join(","))?;
    for record in records {
        let row = [
            csv_field(&record.name),
            csv_field(&record.rating.to_string()),
            csv_field(record.date.as_deref().unwrap_or_default()),
            csv_field(&record.text),
            csv_field(record.owner_response.as_deref().unwrap_or_default()),
            csv_field(&record.likes.to_string()),
            csv_field(record.review_id.as_deref().unwrap_or_default()),
        ];
        writeln!(writer, "{}", row.join(","))?;
    }
    Ok(())
}

/// Quote a field when it contains a delimiter, quote or line break.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
