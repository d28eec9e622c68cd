//! Progress event types and broadcast channel for run telemetry.
//!
//! The loader and fetcher emit `ProgressEvent`s through a
//! `tokio::sync::broadcast` channel to any subscribers (console spinner,
//! progress bar, tests). Events are advisory: when no subscriber exists they
//! are dropped, and a slow subscriber only loses events, it never blocks the
//! emitter.

use serde::{Deserialize, Serialize};

use crate::loader::LoadOutcome;

/// A progress event emitted during a harvest run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// The run this event belongs to.
    pub run_id: String,
    /// Monotonically increasing sequence number.
    pub seq: u64,
    /// The kind of progress event.
    pub event: ProgressEventKind,
}

/// The specific kind of progress event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ProgressEventKind {
    /// Periodic loader observation.
    LoadProgress {
        attempt: usize,
        current: usize,
        target: Option<usize>,
    },
    /// The loader terminated.
    LoadFinished { outcome: LoadOutcome, count: usize },
    /// A sort control matching the requested mode was activated.
    SortSelected { mode: String },
    /// No sort control matched; loading continues in the active order.
    SortNotFound { mode: String },
    /// Raw records were read off the surface.
    Extracted { count: usize },
    /// A fetch chunk finished.
    ChunkCompleted { processed: usize, total: usize },
    /// A non-fatal warning occurred.
    Warning { message: String },
}

/// Sender handle for emitting progress events.
pub type ProgressSender = tokio::sync::broadcast::Sender<ProgressEvent>;

/// Receiver handle for consuming progress events.
pub type ProgressReceiver = tokio::sync::broadcast::Receiver<ProgressEvent>;

/// Create a new progress broadcast channel with a bounded buffer.
///
/// 256 slots cover a full 250-attempt load at the 10-attempt cadence plus
/// one event per fetch chunk for several thousand assets.
pub fn channel() -> (ProgressSender, ProgressReceiver) {
    tokio::sync::broadcast::channel(256)
}

/// Emit a progress event, silently ignoring send errors (which occur when no
/// receivers are listening).
pub fn emit(tx: &Option<ProgressSender>, run_id: &str, seq: u64, event: ProgressEventKind) {
    if let Some(ref sender) = tx {
        let _ = sender.send(ProgressEvent {
            run_id: run_id.to_string(),
            seq,
            event,
        });
    }
}
