//! Per-run context handed to each component at construction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::progress::{self, ProgressEventKind, ProgressReceiver, ProgressSender};

/// Identity and telemetry for a single harvest run.
///
/// Cloning shares the sequence counter, so events from the loader and the
/// fetcher interleave with strictly increasing `seq` values.
#[derive(Debug, Clone)]
pub struct RunContext {
    run_id: String,
    progress: Option<ProgressSender>,
    seq: Arc<AtomicU64>,
}

impl RunContext {
    /// A context without a progress channel. Events are discarded.
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            progress: None,
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Attach a progress channel.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Subscribe to this run's progress events, if a channel is attached.
    pub fn subscribe(&self) -> Option<ProgressReceiver> {
        self.progress.as_ref().map(|tx| tx.subscribe())
    }

    /// Emit an advisory event. Never blocks and never fails.
    pub fn emit(&self, event: ProgressEventKind) {
        if self.progress.is_none() {
            return;
        }
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        progress::emit(&self.progress, &self.run_id, seq, event);
    }
}
