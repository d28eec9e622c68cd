//! Core data types for harvested reviews and asset work.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Placeholder body used by the extractor when a review has no text.
pub const NO_REVIEW_TEXT: &str = "No review text";

/// Placeholder author used by the extractor when no name element exists.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// One review exactly as read off the render surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub review_id: Option<String>,
    pub name: String,
    pub rating_text: String,
    pub text: String,
    pub date_text: Option<String>,
    pub likes_text: Option<String>,
    pub owner_response: Option<String>,
    pub image_urls: Vec<String>,
    pub profile_picture: Option<String>,
    pub profile_url: Option<String>,
    pub scraped_at: DateTime<Utc>,
}

impl RawRecord {
    /// A record with every optional field empty and placeholder text fields.
    pub fn empty(scraped_at: DateTime<Utc>) -> Self {
        Self {
            review_id: None,
            name: UNKNOWN_AUTHOR.to_string(),
            rating_text: String::new(),
            text: NO_REVIEW_TEXT.to_string(),
            date_text: None,
            likes_text: None,
            owner_response: None,
            image_urls: Vec::new(),
            profile_picture: None,
            profile_url: None,
            scraped_at,
        }
    }
}

/// A review date after normalization.
///
/// Serializes as a plain string either way, so persisted output carries an
/// RFC 3339 instant when one could be computed and the original text otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReviewDate {
    Absolute(DateTime<Utc>),
    Verbatim(String),
}

impl ReviewDate {
    /// The resolved instant, if the date could be made absolute.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Absolute(at) => Some(*at),
            Self::Verbatim(_) => None,
        }
    }
}

impl fmt::Display for ReviewDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absolute(at) => write!(f, "{}", at.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Self::Verbatim(text) => write!(f, "{text}"),
        }
    }
}

/// A review with typed fields and, after asset resolution, local file handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub review_id: Option<String>,
    pub name: String,
    pub rating: f32,
    pub text: String,
    /// Date text as displayed on the page.
    pub date: Option<String>,
    pub date_resolved: Option<ReviewDate>,
    pub likes: u32,
    pub owner_response: Option<String>,
    pub profile_picture: Option<String>,
    pub profile_url: Option<String>,
    pub images: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_local: Option<PathBuf>,
    /// Parallel to `images`; a failed download leaves `None` at its position.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images_local: Vec<Option<PathBuf>>,
    pub scraped_at: DateTime<Utc>,
}

impl NormalizedRecord {
    /// Whether the review carries real body text.
    pub fn has_text(&self) -> bool {
        !self.text.trim().is_empty() && self.text != NO_REVIEW_TEXT
    }

    /// Identifier used in asset filenames: the review id, or `review-<index>`.
    pub fn asset_key(&self, index: usize) -> String {
        match self.review_id.as_deref() {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => format!("review-{index}"),
        }
    }
}

/// Where a downloaded asset is written back to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AssetSlot {
    /// The single avatar of a record.
    Profile { record_index: usize },
    /// One entry of a record's image list.
    ReviewImage {
        record_index: usize,
        image_index: usize,
    },
}

impl AssetSlot {
    pub fn record_index(&self) -> usize {
        match *self {
            Self::Profile { record_index } | Self::ReviewImage { record_index, .. } => {
                record_index
            }
        }
    }
}

/// A unit of fetch work, consumed exactly once by one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadTask {
    pub url: String,
    pub destination: PathBuf,
    pub slot: AssetSlot,
}

/// Errors that can occur in the harvest library.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("Render surface error: {0}")]
    Surface(String),

    /// A single read against a live surface failed; the surface itself is
    /// still usable.
    #[error("Transient surface read failure: {0}")]
    SurfaceRead(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Fetch failed for {url}: {reason}")]
    Fetch { url: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;
