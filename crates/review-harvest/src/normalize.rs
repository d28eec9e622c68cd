//! Field normalization: raw review strings into typed values.
//!
//! Every function here is pure and total. Unparseable input yields a
//! best-effort default instead of an error, so a single malformed field
//! never costs the whole record.

use std::sync::OnceLock;

use chrono::{DateTime, TimeDelta, Utc};
use regex::Regex;

use crate::types::{NormalizedRecord, RawRecord, ReviewDate};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;
const DAY: u64 = 24 * HOUR;

fn relative_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(\d+)\s+(second|minute|hour|day|week|month|year)s?\s+ago")
            .expect("relative date regex is valid")
    })
}

fn star_rating_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d+(?:[.,]\d+)?)\s*(?:star|estrella|estrela|étoile|stern|stell|ster|gwiazd|звезд|星|★)",
        )
        .expect("star rating regex is valid")
    })
}

fn out_of_five_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^\s*(\d+(?:[.,]\d+)?)\s*/\s*5\b").expect("out-of-five regex is valid")
    })
}

fn digits_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\d+").expect("digits regex is valid"))
}

/// Seconds per unit. Months are 30 days and years 365 days; no calendar math.
fn unit_seconds(unit: &str) -> Option<u64> {
    match unit {
        "second" => Some(1),
        "minute" => Some(MINUTE),
        "hour" => Some(HOUR),
        "day" => Some(DAY),
        "week" => Some(7 * DAY),
        "month" => Some(30 * DAY),
        "year" => Some(365 * DAY),
        _ => None,
    }
}

/// Resolve `"<n> <unit>(s) ago"` against `now`.
///
/// Already-absolute RFC 3339 input is recognised and kept as an instant.
/// Anything else comes back verbatim.
pub fn parse_relative_date(text: &str, now: DateTime<Utc>) -> ReviewDate {
    if let Ok(at) = DateTime::parse_from_rfc3339(text.trim()) {
        return ReviewDate::Absolute(at.with_timezone(&Utc));
    }

    let lower = text.to_lowercase();
    let resolved = relative_date_regex().captures(&lower).and_then(|caps| {
        let value: u64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = unit_seconds(caps.get(2)?.as_str())?;
        let secs = i64::try_from(value.checked_mul(unit)?).ok()?;
        now.checked_sub_signed(TimeDelta::try_seconds(secs)?)
    });

    match resolved {
        Some(at) => ReviewDate::Absolute(at),
        None => ReviewDate::Verbatim(text.to_string()),
    }
}

/// Extract a numeric rating; 0.0 when nothing matches.
///
/// Looks for a number followed by a star marker (`"4 stars"`, `"5 estrellas"`),
/// then for a leading `"<n>/5"` score.
pub fn parse_rating(text: &str) -> f32 {
    let caps = star_rating_regex()
        .captures(text)
        .or_else(|| out_of_five_regex().captures(text));

    caps.and_then(|c| c.get(1))
        .and_then(|m| m.as_str().replace(',', ".").parse::<f32>().ok())
        .unwrap_or(0.0)
}

/// First run of digits as a count; 0 when absent.
pub fn parse_likes(text: &str) -> u32 {
    digits_regex()
        .find(text)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Normalize one raw record. Asset handles start empty.
pub fn normalize_record(raw: &RawRecord, now: DateTime<Utc>) -> NormalizedRecord {
    NormalizedRecord {
        review_id: raw.review_id.clone(),
        name: raw.name.clone(),
        rating: parse_rating(&raw.rating_text),
        text: raw.text.clone(),
        date: raw.date_text.clone(),
        date_resolved: raw
            .date_text
            .as_deref()
            .map(|text| parse_relative_date(text, now)),
        likes: raw.likes_text.as_deref().map(parse_likes).unwrap_or(0),
        owner_response: raw.owner_response.clone(),
        profile_picture: raw.profile_picture.clone(),
        profile_url: raw.profile_url.clone(),
        images: raw.image_urls.clone(),
        profile_picture_local: None,
        images_local: Vec::new(),
        scraped_at: raw.scraped_at,
    }
}

/// Normalize a batch, evaluating relative dates against a single `now`.
pub fn normalize_all(raws: &[RawRecord], now: DateTime<Utc>) -> Vec<NormalizedRecord> {
    raws.iter().map(|raw| normalize_record(raw, now)).collect()
}
