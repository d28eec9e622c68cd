//! Asset task planning and result write-back.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::debug;

use crate::types::{AssetSlot, DownloadTask, NormalizedRecord};

const DEFAULT_EXTENSION: &str = ".jpg";

/// Directory layout for downloaded images under a run's image root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    root: PathBuf,
}

impl AssetLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.root.join("profiles")
    }

    pub fn reviews_dir(&self) -> PathBuf {
        self.root.join("reviews")
    }

    /// Every directory that must exist before fetching starts.
    pub fn directories(&self) -> Vec<PathBuf> {
        vec![self.profiles_dir(), self.reviews_dir()]
    }
}

fn extension_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.(jpg|jpeg|png|gif|webp)").expect("extension regex is valid"))
}

/// First image extension appearing anywhere in the URL, `.jpg` otherwise.
pub fn image_extension(url: &str) -> String {
    extension_regex()
        .find(url)
        .map(|m| m.as_str().to_ascii_lowercase())
        .unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
}

/// Make a review key safe to embed in a filename.
pub fn sanitize_key(key: &str) -> String {
    key.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

fn usable_url(url: &str) -> bool {
    let url = url.trim();
    !url.is_empty() && url != "N/A"
}

/// Build one task per avatar and per review image, in record order.
pub fn plan_downloads(records: &[NormalizedRecord], layout: &AssetLayout) -> Vec<DownloadTask> {
    let profiles = layout.profiles_dir();
    let reviews = layout.reviews_dir();
    let mut tasks = Vec::new();

    for (record_index, record) in records.iter().enumerate() {
        let key = sanitize_key(&record.asset_key(record_index));

        if let Some(url) = record.profile_picture.as_deref().filter(|u| usable_url(u)) {
            let ext = image_extension(url);
            tasks.push(DownloadTask {
                url: url.to_string(),
                destination: profiles.join(format!("profile-{key}{ext}")),
                slot: AssetSlot::Profile { record_index },
            });
        }

        for (image_index, url) in record.images.iter().enumerate() {
            if !usable_url(url) {
                continue;
            }
            let ext = image_extension(url);
            tasks.push(DownloadTask {
                url: url.clone(),
                destination: reviews.join(format!("review-{key}-{image_index}{ext}")),
                slot: AssetSlot::ReviewImage {
                    record_index,
                    image_index,
                },
            });
        }
    }

    tasks
}

/// Write completed downloads back into their owning records.
///
/// Review images land at their original index; positions whose download
/// failed stay `None`. Records untouched by `completed` are not modified.
/// Returns the number of handles written.
pub fn apply_downloads(records: &mut [NormalizedRecord], completed: &[DownloadTask]) -> usize {
    let mut applied = 0;

    for task in completed {
        let Some(record) = records.get_mut(task.slot.record_index()) else {
            debug!(slot = ?task.slot, "download refers to a missing record");
            continue;
        };

        match task.slot {
            AssetSlot::Profile { .. } => {
                record.profile_picture_local = Some(task.destination.clone());
            }
            AssetSlot::ReviewImage { image_index, .. } => {
                let len = record.images.len().max(image_index + 1);
                if record.images_local.len() < len {
                    record.images_local.resize(len, None);
                }
                record.images_local[image_index] = Some(task.destination.clone());
            }
        }
        applied += 1;
    }

    applied
}
