//! Aggregate statistics over a finished record set.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::NormalizedRecord;

/// Summary handed to persistence and presentation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReviewStats {
    pub total_reviews: usize,
    pub average_rating: f64,
    /// Count per rounded star value. Unrated reviews land under `0`.
    pub ratings: BTreeMap<u8, usize>,
    pub with_text: usize,
    pub with_images: usize,
    pub with_owner_response: usize,
}

impl ReviewStats {
    pub fn calculate(records: &[NormalizedRecord]) -> Self {
        if records.is_empty() {
            return Self::default();
        }

        let mut stats = Self {
            total_reviews: records.len(),
            ..Self::default()
        };
        let mut rating_sum = 0.0f64;

        for record in records {
            let rating = f64::from(record.rating);
            rating_sum += rating;
            let bucket = rating.round().clamp(0.0, f64::from(u8::MAX)) as u8;
            *stats.ratings.entry(bucket).or_insert(0) += 1;

            if record.has_text() {
                stats.with_text += 1;
            }
            if !record.images.is_empty() {
                stats.with_images += 1;
            }
            if record.owner_response.is_some() {
                stats.with_owner_response += 1;
            }
        }

        stats.average_rating = rating_sum / records.len() as f64;
        stats
    }

    /// Count of reviews with the given star value.
    pub fn star_count(&self, stars: u8) -> usize {
        self.ratings.get(&stars).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_record;
    use crate::types::RawRecord;
    use chrono::Utc;

    fn record(rating: &str, text: &str, images: usize, response: bool) -> NormalizedRecord {
        let mut raw = RawRecord::empty(Utc::now());
        raw.rating_text = rating.to_string();
        raw.text = text.to_string();
        raw.image_urls = (0..images).map(|i| format!("https://img/{i}.jpg")).collect();
        raw.owner_response = response.then(|| "Thanks".to_string());
        normalize_record(&raw, Utc::now())
    }

    #[test]
    fn test_empty_stats() {
        let stats = ReviewStats::calculate(&[]);
        assert_eq!(stats.total_reviews, 0);
        assert_eq!(stats.average_rating, 0.0);
        assert!(stats.ratings.is_empty());
    }

    #[test]
    fn test_calculate() {
        let records = vec![
            record("5 stars", "Great", 2, true),
            record("5 stars", "No review text", 0, false),
            record("3 stars", "Fine", 1, false),
            record("no rating", "", 0, true),
        ];
        let stats = ReviewStats::calculate(&records);
        assert_eq!(stats.total_reviews, 4);
        assert!((stats.average_rating - 3.25).abs() < 1e-9);
        assert_eq!(stats.star_count(5), 2);
        assert_eq!(stats.star_count(3), 1);
        assert_eq!(stats.star_count(0), 1);
        assert_eq!(stats.star_count(1), 0);
        assert_eq!(stats.with_text, 2);
        assert_eq!(stats.with_images, 2);
        assert_eq!(stats.with_owner_response, 2);
    }
}
