//! Bounded-concurrency batch fetcher.
//!
//! Tasks are processed chunk by chunk. Within a chunk a fixed number of
//! workers drain a shared FIFO queue; each task is popped by exactly one
//! worker. Failures are logged and counted, never propagated.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::progress::ProgressEventKind;
use crate::types::{DownloadTask, HarvestError, HarvestResult};

/// Default number of concurrent workers.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Default number of tasks per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetch one remote asset into a local file.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Download `url` to `destination`. Implementations should honour
    /// `timeout`; the batch fetcher enforces it regardless.
    async fn fetch(&self, url: &str, destination: &Path, timeout: Duration) -> HarvestResult<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetcherConfig {
    pub concurrency: usize,
    pub chunk_size: usize,
    pub timeout: Duration,
}

impl Default for FetcherConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            chunk_size: DEFAULT_CHUNK_SIZE,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl FetcherConfig {
    pub fn validate(&self) -> HarvestResult<()> {
        if self.concurrency == 0 || self.chunk_size == 0 {
            return Err(HarvestError::InvalidConfig(format!(
                "concurrency and chunk_size must be positive (got {} and {})",
                self.concurrency, self.chunk_size
            )));
        }
        if self.timeout.is_zero() {
            return Err(HarvestError::InvalidConfig("fetch timeout must be positive".into()));
        }
        Ok(())
    }
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    /// Tasks whose file was written. Order within a chunk is not significant.
    pub completed: Vec<DownloadTask>,
    pub failed: usize,
    pub attempted: usize,
}

impl FetchReport {
    pub fn succeeded(&self) -> usize {
        self.completed.len()
    }
}

type TaskQueue = Arc<Mutex<VecDeque<DownloadTask>>>;

/// Worker pool over an [`AssetFetcher`].
pub struct BatchFetcher {
    fetcher: Arc<dyn AssetFetcher>,
    config: FetcherConfig,
    ctx: RunContext,
}

impl BatchFetcher {
    pub fn new(fetcher: Arc<dyn AssetFetcher>, config: FetcherConfig, ctx: RunContext) -> Self {
        Self {
            fetcher,
            config,
            ctx,
        }
    }

    pub fn config(&self) -> &FetcherConfig {
        &self.config
    }

    /// Create every destination directory. This is the batch's only fatal
    /// failure.
    pub async fn prepare(&self, dirs: &[PathBuf]) -> HarvestResult<()> {
        for dir in dirs {
            tokio::fs::create_dir_all(dir).await.map_err(|e| {
                HarvestError::Storage(format!("cannot create {}: {e}", dir.display()))
            })?;
        }
        Ok(())
    }

    /// Fetch every task, invoking `on_chunk(processed, total)` after each
    /// chunk completes.
    pub async fn run<F>(&self, tasks: Vec<DownloadTask>, mut on_chunk: F) -> FetchReport
    where
        F: FnMut(usize, usize),
    {
        let total = tasks.len();
        let chunk_size = self.config.chunk_size.max(1);
        let workers = self.config.concurrency.max(1);
        let mut report = FetchReport::default();

        info!(total, workers, chunk_size, "starting asset downloads");

        let mut remaining = tasks.into_iter().peekable();
        while remaining.peek().is_some() {
            let chunk: VecDeque<DownloadTask> = remaining.by_ref().take(chunk_size).collect();
            let chunk_len = chunk.len();
            let queue: TaskQueue = Arc::new(Mutex::new(chunk));

            let results = join_all(
                (0..workers.min(chunk_len)).map(|id| self.worker(id, Arc::clone(&queue))),
            )
            .await;

            for (done, failed) in results {
                report.completed.extend(done);
                report.failed += failed;
            }
            report.attempted += chunk_len;

            let processed = report.attempted;
            debug!(processed, total, "chunk completed");
            on_chunk(processed, total);
            self.ctx.emit(ProgressEventKind::ChunkCompleted { processed, total });
        }

        info!(
            succeeded = report.succeeded(),
            failed = report.failed,
            total,
            "asset downloads finished"
        );
        report
    }

    /// Pop tasks until the queue is empty. Returns this worker's successes
    /// and its failure count.
    async fn worker(&self, id: usize, queue: TaskQueue) -> (Vec<DownloadTask>, usize) {
        let mut done = Vec::new();
        let mut failed = 0;

        loop {
            let Some(task) = queue.lock().await.pop_front() else {
                break;
            };

            let fetch = self
                .fetcher
                .fetch(&task.url, &task.destination, self.config.timeout);
            match tokio::time::timeout(self.config.timeout, fetch).await {
                Ok(Ok(())) => done.push(task),
                Ok(Err(e)) => {
                    warn!(worker = id, url = %task.url, error = %e, "asset download failed");
                    failed += 1;
                }
                Err(_) => {
                    warn!(
                        worker = id,
                        url = %task.url,
                        timeout = ?self.config.timeout,
                        "asset download timed out"
                    );
                    // The fetch was cancelled mid-flight; drop whatever it wrote.
                    discard_partial(&task.destination).await;
                    failed += 1;
                }
            }
        }

        (done, failed)
    }
}

async fn discard_partial(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed partial download"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "could not remove partial download"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AssetSlot;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct CountingFetcher {
        calls: StdMutex<HashMap<String, usize>>,
    }

    #[async_trait]
    impl AssetFetcher for CountingFetcher {
        async fn fetch(&self, url: &str, _destination: &Path, _timeout: Duration) -> HarvestResult<()> {
            tokio::task::yield_now().await;
            *self.calls.lock().unwrap().entry(url.to_string()).or_insert(0) += 1;
            if url.contains("bad") {
                return Err(HarvestError::Fetch {
                    url: url.to_string(),
                    reason: "404".into(),
                });
            }
            Ok(())
        }
    }

    struct SlowFetcher;

    #[async_trait]
    impl AssetFetcher for SlowFetcher {
        async fn fetch(&self, _url: &str, _destination: &Path, _timeout: Duration) -> HarvestResult<()> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        }
    }

    fn task(i: usize, url: &str) -> DownloadTask {
        DownloadTask {
            url: url.to_string(),
            destination: PathBuf::from(format!("/tmp/{i}.jpg")),
            slot: AssetSlot::Profile { record_index: i },
        }
    }

    #[test]
    fn test_validate_rejects_zero_workers() {
        assert!(FetcherConfig::default().validate().is_ok());
        let config = FetcherConfig {
            concurrency: 0,
            ..FetcherConfig::default()
        };
        assert!(matches!(config.validate(), Err(HarvestError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_failures_are_absorbed() {
        let fetcher = Arc::new(CountingFetcher::default());
        let batch = BatchFetcher::new(fetcher.clone(), FetcherConfig::default(), RunContext::new("f"));
        let tasks = vec![task(0, "https://ok/0"), task(1, "https://bad/1"), task(2, "https://ok/2")];

        let report = batch.run(tasks, |_, _| {}).await;
        assert_eq!(report.attempted, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.succeeded(), 2);
        assert!(report.completed.iter().all(|t| !t.url.contains("bad")));
    }

    #[tokio::test]
    async fn test_empty_batch_reports_nothing() {
        let batch = BatchFetcher::new(
            Arc::new(CountingFetcher::default()),
            FetcherConfig::default(),
            RunContext::new("f"),
        );
        let mut calls = 0;
        let report = batch.run(Vec::new(), |_, _| calls += 1).await;
        assert_eq!(report, FetchReport::default());
        assert_eq!(calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_counts_as_failure() {
        let config = FetcherConfig {
            timeout: Duration::from_secs(1),
            ..FetcherConfig::default()
        };
        let batch = BatchFetcher::new(Arc::new(SlowFetcher), config, RunContext::new("f"));
        let report = batch.run(vec![task(0, "https://slow/0")], |_, _| {}).await;
        assert_eq!(report.failed, 1);
        assert!(report.completed.is_empty());
    }

    struct StallingWriter;

    #[async_trait]
    impl AssetFetcher for StallingWriter {
        async fn fetch(&self, _url: &str, destination: &Path, _timeout: Duration) -> HarvestResult<()> {
            std::fs::write(destination, b"partial")?;
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_timed_out_fetch_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("profile-a.jpg");
        let config = FetcherConfig {
            timeout: Duration::from_millis(50),
            ..FetcherConfig::default()
        };
        let batch = BatchFetcher::new(Arc::new(StallingWriter), config, RunContext::new("f"));
        let report = batch
            .run(
                vec![DownloadTask {
                    url: "https://slow/a.jpg".into(),
                    destination: destination.clone(),
                    slot: AssetSlot::Profile { record_index: 0 },
                }],
                |_, _| {},
            )
            .await;

        assert_eq!(report.failed, 1);
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_prepare_fails_on_file_in_the_way() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("images");
        std::fs::write(&blocker, b"not a dir").unwrap();

        let batch = BatchFetcher::new(
            Arc::new(CountingFetcher::default()),
            FetcherConfig::default(),
            RunContext::new("f"),
        );
        let err = batch.prepare(&[blocker.join("profiles")]).await.unwrap_err();
        assert!(matches!(err, HarvestError::Storage(_)));
    }
}
