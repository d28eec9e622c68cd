//! Render surface abstraction.
//!
//! Defines the `RenderSurface` trait that stands between the harvest core and
//! whatever drives the dynamically rendered page (a real Chromium tab in the
//! CLI, `ScriptedSurface` in tests).

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{HarvestError, HarvestResult, RawRecord};

/// Predicate over a candidate control's visible label.
pub type LabelPredicate = dyn Fn(&str) -> bool + Send + Sync;

/// CSS selectors used to read review fields off the page.
///
/// Selectors are maintained alongside the target page's markup; the defaults
/// match the current Google Maps review list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectorSet {
    /// One element per review item.
    pub item: String,
    pub name: String,
    /// Element whose text holds the rating (e.g. `"4/5"`).
    pub rating_text: String,
    /// Element whose `aria-label` holds the rating (e.g. `"4 stars"`).
    pub rating_label: String,
    pub body: String,
    pub date: String,
    pub likes: String,
    pub owner_response: String,
    pub avatar: String,
    pub profile_link: String,
    /// Buttons whose inline `style` carries a `background-image: url(...)`.
    pub image_buttons: String,
    /// Attribute on `item` carrying the review id.
    pub id_attribute: String,
}

impl Default for SelectorSet {
    fn default() -> Self {
        Self {
            item: ".jftiEf.fontBodyMedium[data-review-id]".to_string(),
            name: ".d4r55.fontTitleMedium".to_string(),
            rating_text: ".fzvQIb".to_string(),
            rating_label: ".kvMYJc".to_string(),
            body: ".MyEned .wiI7pd".to_string(),
            date: ".DU9Pgb .xRkPPb, .rsqaWe".to_string(),
            likes: ".pkWtMe".to_string(),
            owner_response: ".CDe7pd .wiI7pd".to_string(),
            avatar: "button.WEBjve img.NBa7we".to_string(),
            profile_link: "button.WEBjve".to_string(),
            image_buttons: ".KtCyie button.Tya61d".to_string(),
            id_attribute: "data-review-id".to_string(),
        }
    }
}

/// A live, queryable view of a dynamically loaded page.
///
/// Exclusively owned by one run; never accessed concurrently.
#[async_trait]
pub trait RenderSurface: Send {
    /// Number of review items currently revealed.
    ///
    /// Implementations return `HarvestError::SurfaceRead` for a one-off read
    /// failure and `HarvestError::Surface` when the surface is gone.
    async fn count(&mut self) -> HarvestResult<usize>;

    /// Perform one "reveal more" stimulus.
    async fn stimulate(&mut self) -> HarvestResult<()>;

    /// Read every revealed item into raw records.
    async fn read_fields(&mut self, selectors: &SelectorSet) -> HarvestResult<Vec<RawRecord>>;

    /// Activate the first candidate control whose label satisfies `predicate`.
    /// Returns `false` when nothing matched.
    async fn locate_and_activate(&mut self, predicate: &LabelPredicate) -> HarvestResult<bool>;

    /// Put input focus on the item list so stimuli move it. Called once
    /// sort selection is done, right before loading starts.
    async fn focus(&mut self) -> HarvestResult<()> {
        Ok(())
    }

    /// Total item count the page discloses up front, if any.
    async fn disclosed_total(&mut self) -> HarvestResult<Option<usize>> {
        Ok(None)
    }
}

/// A deterministic surface driven by a fixed script of observations.
///
/// `count()` walks through `counts` one entry per call and then keeps
/// returning the last entry.
#[derive(Debug, Clone, Default)]
pub struct ScriptedSurface {
    counts: Vec<usize>,
    records: Vec<RawRecord>,
    labels: Vec<String>,
    total: Option<usize>,
    failing_reads: HashSet<usize>,
    lost_after_stimuli: Option<usize>,
    count_reads: usize,
    stimuli: usize,
    activated: Option<String>,
    focus_log: Vec<FocusCall>,
}

/// Surface state observed by a `focus()` call on `ScriptedSurface`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FocusCall {
    /// Label activated before this call, if any.
    pub activated: Option<String>,
    /// Stimuli delivered before this call.
    pub stimuli: usize,
}

impl ScriptedSurface {
    pub fn new(counts: Vec<usize>) -> Self {
        Self {
            counts,
            ..Self::default()
        }
    }

    /// Records returned by `read_fields`.
    pub fn with_records(mut self, records: Vec<RawRecord>) -> Self {
        self.records = records;
        self
    }

    /// Labels of the candidate controls for `locate_and_activate`.
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disclosed_total(mut self, total: usize) -> Self {
        self.total = Some(total);
        self
    }

    /// Make the `n`-th `count()` call (zero-based) fail transiently.
    pub fn with_failing_read(mut self, n: usize) -> Self {
        self.failing_reads.insert(n);
        self
    }

    /// Make the surface unusable once `n` stimuli have been delivered.
    pub fn lost_after(mut self, n: usize) -> Self {
        self.lost_after_stimuli = Some(n);
        self
    }

    pub fn count_reads(&self) -> usize {
        self.count_reads
    }

    pub fn stimuli(&self) -> usize {
        self.stimuli
    }

    /// Label of the control activated by `locate_and_activate`, if any.
    pub fn activated(&self) -> Option<&str> {
        self.activated.as_deref()
    }

    pub fn focus_log(&self) -> &[FocusCall] {
        &self.focus_log
    }

    fn is_lost(&self) -> bool {
        self.lost_after_stimuli
            .is_some_and(|limit| self.stimuli >= limit)
    }
}

#[async_trait]
impl RenderSurface for ScriptedSurface {
    async fn count(&mut self) -> HarvestResult<usize> {
        if self.is_lost() {
            return Err(HarvestError::Surface("page closed".into()));
        }
        let n = self.count_reads;
        self.count_reads += 1;
        if self.failing_reads.contains(&n) {
            return Err(HarvestError::SurfaceRead(format!("read {n} failed")));
        }
        let idx = n.min(self.counts.len().saturating_sub(1));
        Ok(self.counts.get(idx).copied().unwrap_or(0))
    }

    async fn stimulate(&mut self) -> HarvestResult<()> {
        if self.is_lost() {
            return Err(HarvestError::Surface("page closed".into()));
        }
        self.stimuli += 1;
        Ok(())
    }

    async fn read_fields(&mut self, _selectors: &SelectorSet) -> HarvestResult<Vec<RawRecord>> {
        if self.is_lost() {
            return Err(HarvestError::Surface("page closed".into()));
        }
        Ok(self.records.clone())
    }

    async fn locate_and_activate(&mut self, predicate: &LabelPredicate) -> HarvestResult<bool> {
        match self.labels.iter().find(|label| predicate(label.as_str())) {
            Some(label) => {
                self.activated = Some(label.clone());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn focus(&mut self) -> HarvestResult<()> {
        self.focus_log.push(FocusCall {
            activated: self.activated.clone(),
            stimuli: self.stimuli,
        });
        Ok(())
    }

    async fn disclosed_total(&mut self) -> HarvestResult<Option<usize>> {
        Ok(self.total)
    }
}
