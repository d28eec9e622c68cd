//! Raw item decoding: strings scraped by the surface into `RawRecord`s.
//!
//! The surface returns one loosely typed JSON object per review item. Decoding
//! is field-by-field and lossy on purpose: a malformed field is defaulted and
//! the item is kept.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{RawRecord, NO_REVIEW_TEXT, UNKNOWN_AUTHOR};

/// One review item as returned by the page script.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RawItem {
    pub review_id: Option<String>,
    pub name: Option<String>,
    pub rating_text: Option<String>,
    pub rating_label: Option<String>,
    pub text: Option<String>,
    pub date: Option<String>,
    pub likes: Option<String>,
    pub owner_response: Option<String>,
    pub profile_picture: Option<String>,
    pub profile_url: Option<String>,
    /// Inline `style` attributes of the image buttons.
    pub image_styles: Vec<String>,
}

fn css_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"url\("([^"]+)"\)|url\('([^']+)'\)|url\(([^)]+)\)"#)
            .expect("css url regex is valid")
    })
}

fn image_size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"=w\d+-h\d+-p").expect("image size regex is valid"))
}

fn total_count_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        // One integer, optionally thousands-grouped, not glued to a preceding number.
        Regex::new(r"(?i)(?:^|[^\d.,])(\d{1,3}(?:[,.\u{a0}]\d{3})+|\d+)\s+reviews?\b")
            .expect("review total regex is valid")
    })
}

/// Decode the script result into raw records. Non-array input yields nothing.
pub fn records_from_value(value: Value, scraped_at: DateTime<Utc>) -> Vec<RawRecord> {
    let Value::Array(items) = value else {
        warn!("extraction script returned a non-array value");
        return Vec::new();
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let raw = serde_json::from_value::<RawItem>(item).unwrap_or_else(|e| {
                debug!(index, error = %e, "malformed review item, keeping defaults");
                RawItem::default()
            });
            raw_record(raw, scraped_at)
        })
        .collect()
}

/// Convert one decoded item, filling placeholders for missing fields.
pub fn raw_record(item: RawItem, scraped_at: DateTime<Utc>) -> RawRecord {
    let rating_text = non_empty(item.rating_label)
        .or_else(|| non_empty(item.rating_text))
        .unwrap_or_default();

    RawRecord {
        review_id: non_empty(item.review_id),
        name: non_empty(item.name).unwrap_or_else(|| UNKNOWN_AUTHOR.to_string()),
        rating_text,
        text: non_empty(item.text).unwrap_or_else(|| NO_REVIEW_TEXT.to_string()),
        date_text: non_empty(item.date).map(|d| clean_date_text(&d)),
        likes_text: non_empty(item.likes),
        owner_response: non_empty(item.owner_response),
        image_urls: item
            .image_styles
            .iter()
            .filter_map(|style| image_url_from_style(style))
            .collect(),
        profile_picture: non_empty(item.profile_picture),
        profile_url: non_empty(item.profile_url),
        scraped_at,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Drop a trailing `" on Google"` (or bare `" on"`) source suffix from a date label.
pub fn clean_date_text(text: &str) -> String {
    let text = text.trim();
    text.strip_suffix(" on Google")
        .or_else(|| text.strip_suffix(" on"))
        .unwrap_or(text)
        .trim()
        .to_string()
}

/// Pull the image URL out of an inline `background-image` style and request
/// the full-size rendition.
pub fn image_url_from_style(style: &str) -> Option<String> {
    let decoded = style.replace("&quot;", "\"");
    let caps = css_url_regex().captures(&decoded)?;
    let url = caps
        .get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))?
        .as_str()
        .trim();
    if url.is_empty() {
        return None;
    }
    Some(image_size_regex().replace_all(url, "=s0").into_owned())
}

/// Parse a disclosed total such as `"1,234 reviews"`.
pub fn parse_total_count(text: &str) -> Option<usize> {
    let caps = total_count_regex().captures(text)?;
    let digits: String = caps
        .get(1)?
        .as_str()
        .chars()
        .filter(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_item() {
        let value = json!([{
            "reviewId": "ChZDSUhN",
            "name": "  Ada  ",
            "ratingLabel": "5 stars",
            "text": "Lovely",
            "date": "2 weeks ago on Google",
            "likes": "3",
            "ownerResponse": "Thanks!",
            "profilePicture": "https://lh3.example/a.png",
            "profileUrl": "https://maps.example/contrib/1",
            "imageStyles": ["background-image: url(&quot;https://lh5.example/p/AF1Q=w300-h450-p-k-no&quot;);"]
        }]);
        let records = records_from_value(value, Utc::now());
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.review_id.as_deref(), Some("ChZDSUhN"));
        assert_eq!(r.name, "Ada");
        assert_eq!(r.rating_text, "5 stars");
        assert_eq!(r.date_text.as_deref(), Some("2 weeks ago"));
        assert_eq!(r.image_urls, vec!["https://lh5.example/p/AF1Q=s0-k-no"]);
    }

    #[test]
    fn test_malformed_item_is_kept_with_defaults() {
        let value = json!([{ "name": 42 }, { "name": "Bo", "text": "" }]);
        let records = records_from_value(value, Utc::now());
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name, UNKNOWN_AUTHOR);
        assert_eq!(records[1].name, "Bo");
        assert_eq!(records[1].text, NO_REVIEW_TEXT);
        assert!(records[1].review_id.is_none());
    }

    #[test]
    fn test_non_array_yields_nothing() {
        assert!(records_from_value(json!({"oops": true}), Utc::now()).is_empty());
    }

    #[test]
    fn test_rating_text_fallback() {
        let item = RawItem {
            rating_text: Some("4/5".into()),
            ..RawItem::default()
        };
        assert_eq!(raw_record(item, Utc::now()).rating_text, "4/5");
    }

    #[test]
    fn test_image_url_quoting_styles() {
        assert_eq!(
            image_url_from_style("background-image: url('https://x/y.jpg')").as_deref(),
            Some("https://x/y.jpg")
        );
        assert_eq!(
            image_url_from_style("background-image: url(https://x/z=w100-h100-p)").as_deref(),
            Some("https://x/z=s0")
        );
        assert!(image_url_from_style("color: red").is_none());
    }

    #[test]
    fn test_parse_total_count() {
        assert_eq!(parse_total_count("4.6 (1,234 reviews)"), Some(1234));
        assert_eq!(parse_total_count("87 reviews"), Some(87));
        assert_eq!(parse_total_count("1 review"), Some(1));
        assert_eq!(parse_total_count("No reviews yet"), None);
    }

    #[test]
    fn test_total_count_ignores_adjacent_rating() {
        assert_eq!(parse_total_count("4.6 1,234 reviews"), Some(1234));
        assert_eq!(parse_total_count("4.6\u{a0}12.345 reviews"), Some(12345));
        assert_eq!(parse_total_count("4.61,234 reviews"), None);
        assert_eq!(parse_total_count("1,234,567 reviews"), Some(1234567));
    }

    #[test]
    fn test_clean_date_text_strips_first_suffix_only() {
        assert_eq!(clean_date_text("2 months ago on Google"), "2 months ago");
        assert_eq!(clean_date_text("a year ago on"), "a year ago");
        assert_eq!(
            clean_date_text("Visited on a weekday 2 months ago on Google"),
            "Visited on a weekday 2 months ago"
        );
        assert_eq!(clean_date_text("Edited on Monday"), "Edited on Monday");
    }
}
