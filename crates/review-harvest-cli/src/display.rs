//! Console presentation: spinners, the image progress bar and result tables.
//!
//! Everything here only reads results and progress events; none of it feeds
//! back into the run.

use std::time::Duration;

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use review_harvest::progress::{ProgressEventKind, ProgressReceiver};
use review_harvest::{NormalizedRecord, ReviewStats};

use crate::config::HarvestConfig;

const SPINNER_TEMPLATE: &str = "{spinner:.green} {msg}";
const PROGRESS_TEMPLATE: &str = "{msg} {bar:40.cyan/blue} {pos}/{len} ({eta})";
const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏";

/// Reviews shown in the sample section.
const SAMPLE_SIZE: usize = 3;
/// Sample review bodies are cut to this many characters.
const SAMPLE_TEXT_CHARS: usize = 100;

pub fn create_spinner(message: impl Into<String>) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::default_spinner()
            .template(SPINNER_TEMPLATE)
            .expect("spinner template is valid")
            .tick_chars(SPINNER_CHARS),
    );
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner.set_message(message.into());
    spinner
}

pub fn create_progress_bar(total: u64, message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .template(PROGRESS_TEMPLATE)
            .expect("progress bar template is valid")
            .progress_chars(PROGRESS_CHARS),
    );
    bar.set_message(message.into());
    bar
}

/// Drive a spinner and the image bar from the run's progress events until
/// the channel closes.
pub fn spawn_progress_view(mut rx: ProgressReceiver) -> JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = create_spinner("Loading reviews...");
        let mut images: Option<ProgressBar> = None;

        loop {
            let event = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            };
            match event.event {
                ProgressEventKind::SortSelected { mode } => {
                    spinner.println(format!("Sorted by {mode}"));
                }
                ProgressEventKind::SortNotFound { mode } => {
                    spinner.println(format!("Could not find sort option: {mode}"));
                }
                ProgressEventKind::LoadProgress {
                    attempt,
                    current,
                    target,
                } => {
                    let of = target.map(|t| format!("/{t}")).unwrap_or_default();
                    spinner.set_message(format!("Loading reviews... {current}{of} (scroll {attempt})"));
                }
                ProgressEventKind::LoadFinished { outcome, count } => {
                    spinner.set_message(format!("Loaded {count} reviews ({outcome})"));
                }
                ProgressEventKind::Extracted { count } => {
                    spinner.finish_with_message(format!("Extracted {count} reviews"));
                }
                ProgressEventKind::ChunkCompleted { processed, total } => {
                    let bar = images
                        .get_or_insert_with(|| create_progress_bar(total as u64, "Images"));
                    bar.set_position(processed as u64);
                    if processed >= total {
                        bar.finish();
                    }
                }
                ProgressEventKind::Warning { message } => {
                    spinner.println(format!("warning: {message}"));
                }
            }
        }

        if !spinner.is_finished() {
            spinner.finish_and_clear();
        }
        if let Some(bar) = images {
            if !bar.is_finished() {
                bar.abandon();
            }
        }
    })
}

fn key_value_table(header: (&str, &str)) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![Cell::new(header.0), Cell::new(header.1)]);
    table
}

pub fn config_table(config: &HarvestConfig) -> Table {
    let mut table = key_value_table(("Setting", "Value"));
    let yes_no = |b: bool| (if b { "yes" } else { "no" }).to_string();
    let rows = [
        ("URL", config.url.clone().unwrap_or_else(|| "(not set)".into())),
        ("Sort by", config.sort_by.to_string()),
        ("Headless", yes_no(config.headless)),
        ("Max scrolls", config.max_scrolls.to_string()),
        ("Scroll delay", format!("{}ms", config.scroll_delay_ms)),
        ("Navigation timeout", format!("{}ms", config.timeout_ms)),
        ("Output directory", config.base_dir.display().to_string()),
        ("Export CSV", yes_no(config.export_csv)),
        ("Download images", yes_no(config.download_images)),
        ("Image concurrency", config.image_concurrency.to_string()),
        ("Block resources", yes_no(config.block_resources)),
        (
            "Log directory",
            config
                .log_dir
                .as_ref()
                .map(|d| d.display().to_string())
                .unwrap_or_else(|| "(stderr only)".into()),
        ),
    ];
    for (key, value) in rows {
        table.add_row(vec![Cell::new(key), Cell::new(value)]);
    }
    table
}

pub fn stats_table(stats: &ReviewStats) -> Table {
    let mut table = key_value_table(("Statistic", "Value"));
    table.add_row(vec![Cell::new("Total reviews"), Cell::new(stats.total_reviews)]);
    table.add_row(vec![
        Cell::new("Average rating"),
        Cell::new(format!("{:.2}", stats.average_rating)),
    ]);
    for stars in (1..=5).rev() {
        table.add_row(vec![
            Cell::new(format!("{stars} star")),
            Cell::new(stats.star_count(stars)).set_alignment(CellAlignment::Right),
        ]);
    }
    table.add_row(vec![Cell::new("With text"), Cell::new(stats.with_text)]);
    table.add_row(vec![Cell::new("With images"), Cell::new(stats.with_images)]);
    table.add_row(vec![
        Cell::new("With owner response"),
        Cell::new(stats.with_owner_response),
    ]);
    table
}

/// First few reviews, bodies truncated.
pub fn sample_reviews(records: &[NormalizedRecord]) -> String {
    let mut out = String::new();
    for (i, record) in records.iter().take(SAMPLE_SIZE).enumerate() {
        let stars = "★".repeat(record.rating.round().clamp(0.0, 5.0) as usize);
        let date = record.date.as_deref().unwrap_or("unknown date");
        out.push_str(&format!("{}. {} {} ({date})\n", i + 1, record.name, stars));
        out.push_str(&format!("   {}\n", truncate(&record.text, SAMPLE_TEXT_CHARS)));
    }
    out
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use review_harvest::{normalize_record, RawRecord};

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }

    #[test]
    fn test_sample_shows_first_three() {
        let records: Vec<NormalizedRecord> = (0..5)
            .map(|i| {
                let mut raw = RawRecord::empty(Utc::now());
                raw.name = format!("Reviewer {i}");
                raw.rating_text = "3 stars".into();
                normalize_record(&raw, Utc::now())
            })
            .collect();
        let sample = sample_reviews(&records);
        assert!(sample.contains("Reviewer 2 ★★★"));
        assert!(!sample.contains("Reviewer 3"));
    }

    #[test]
    fn test_stats_table_lists_every_star() {
        let rendered = stats_table(&ReviewStats::default()).to_string();
        for stars in 1..=5 {
            assert!(rendered.contains(&format!("{stars} star")));
        }
    }
}
