//! Convergence-driven incremental loader.
//!
//! Repeatedly stimulates the render surface until the revealed item count
//! reaches a disclosed target, stops growing for a streak of attempts, or the
//! attempt budget runs out.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::RunContext;
use crate::progress::ProgressEventKind;
use crate::surface::RenderSurface;
use crate::types::{HarvestError, HarvestResult};

/// Default attempt budget.
pub const DEFAULT_MAX_ATTEMPTS: usize = 250;

/// Consecutive no-growth attempts that count as exhaustion.
pub const DEFAULT_STALL_THRESHOLD: usize = 15;

/// Tuning for the loader loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    pub max_attempts: usize,
    pub stall_threshold: usize,
    /// Stimuli issued per attempt.
    pub stimuli_per_attempt: usize,
    /// Pause between consecutive stimuli within an attempt.
    pub pacing: Duration,
    /// Pause after the last stimulus, before the next observation.
    pub settle: Duration,
    /// Emit a progress event every this many attempts.
    pub report_every: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stall_threshold: DEFAULT_STALL_THRESHOLD,
            stimuli_per_attempt: 3,
            pacing: Duration::from_millis(80),
            settle: Duration::from_millis(800),
            report_every: 10,
        }
    }
}

impl LoaderConfig {
    /// Same thresholds with every delay removed.
    pub fn without_delays(mut self) -> Self {
        self.pacing = Duration::ZERO;
        self.settle = Duration::ZERO;
        self
    }

    pub fn validate(&self) -> HarvestResult<()> {
        if self.max_attempts == 0 {
            return Err(HarvestError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.stall_threshold == 0 {
            return Err(HarvestError::InvalidConfig(
                "stall_threshold must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// How the loader terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadOutcome {
    /// The observed count reached the disclosed target.
    ReachedTarget,
    /// The count stayed flat for a full stall streak.
    Exhausted,
    /// The attempt budget ran out first.
    BudgetExceeded,
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReachedTarget => write!(f, "reached target"),
            Self::Exhausted => write!(f, "exhausted"),
            Self::BudgetExceeded => write!(f, "budget exceeded"),
        }
    }
}

/// Running counters for one load.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvergenceState {
    pub previous_count: usize,
    pub no_change_streak: usize,
    /// Zero-based index of the current attempt.
    pub attempt: usize,
}

impl ConvergenceState {
    /// Fold in an observation taken at the end of an attempt.
    ///
    /// The streak resets on strict growth and increments otherwise.
    /// Returns the updated streak.
    pub fn observe(&mut self, count: usize) -> usize {
        if count > self.previous_count {
            self.no_change_streak = 0;
        } else {
            self.no_change_streak += 1;
        }
        self.previous_count = count;
        self.no_change_streak
    }
}

/// Result of a finished load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadReport {
    pub outcome: LoadOutcome,
    /// Last observed item count.
    pub count: usize,
    pub target: Option<usize>,
    pub state: ConvergenceState,
}

impl LoadReport {
    /// Number of attempts that observed the surface.
    pub fn attempts(&self) -> usize {
        self.state.attempt + 1
    }
}

/// Drives a render surface to convergence.
pub struct ConvergenceLoader {
    config: LoaderConfig,
    ctx: RunContext,
}

impl ConvergenceLoader {
    pub fn new(config: LoaderConfig, ctx: RunContext) -> Self {
        Self { config, ctx }
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Run the loader until termination.
    ///
    /// A transient count failure is treated as "no growth this attempt".
    /// Any other surface error is fatal and returned as-is.
    pub async fn run<S>(&self, surface: &mut S, target: Option<usize>) -> HarvestResult<LoadReport>
    where
        S: RenderSurface + ?Sized,
    {
        let mut state = ConvergenceState::default();
        let mut last_count = 0;

        match target {
            Some(t) => info!(target = t, "starting load"),
            None => info!("starting load (target unknown)"),
        }

        for attempt in 0..self.config.max_attempts {
            state.attempt = attempt;

            let count = match surface.count().await {
                Ok(c) => c,
                Err(HarvestError::SurfaceRead(reason)) => {
                    warn!(attempt, %reason, "count read failed, treating as no growth");
                    state.previous_count
                }
                Err(e) => return Err(e),
            };
            last_count = count;

            if let Some(t) = target {
                if count >= t {
                    return Ok(self.finish(LoadOutcome::ReachedTarget, count, target, state));
                }
            }

            if self.config.report_every > 0 && attempt % self.config.report_every == 0 {
                let grown = count.saturating_sub(state.previous_count);
                info!(attempt, count, target, grown, "load progress");
                self.ctx.emit(ProgressEventKind::LoadProgress {
                    attempt,
                    current: count,
                    target,
                });
            }

            self.reveal_more(surface).await?;

            let streak = state.observe(count);
            debug!(attempt, count, streak, "attempt observed");
            if streak >= self.config.stall_threshold {
                return Ok(self.finish(LoadOutcome::Exhausted, count, target, state));
            }
        }

        Ok(self.finish(LoadOutcome::BudgetExceeded, last_count, target, state))
    }

    /// Issue the per-attempt burst of stimuli followed by one settle delay.
    async fn reveal_more<S>(&self, surface: &mut S) -> HarvestResult<()>
    where
        S: RenderSurface + ?Sized,
    {
        for i in 0..self.config.stimuli_per_attempt {
            if i > 0 && !self.config.pacing.is_zero() {
                tokio::time::sleep(self.config.pacing).await;
            }
            surface.stimulate().await?;
        }
        if !self.config.settle.is_zero() {
            tokio::time::sleep(self.config.settle).await;
        }
        Ok(())
    }

    fn finish(
        &self,
        outcome: LoadOutcome,
        count: usize,
        target: Option<usize>,
        state: ConvergenceState,
    ) -> LoadReport {
        match (outcome, target) {
            (LoadOutcome::Exhausted, Some(t)) if count < t => {
                warn!(count, target = t, "reached end early");
            }
            (LoadOutcome::BudgetExceeded, _) => {
                warn!(count, ?target, attempts = state.attempt + 1, "attempt budget exhausted");
            }
            _ => info!(count, ?target, %outcome, "load finished"),
        }
        self.ctx.emit(ProgressEventKind::LoadFinished { outcome, count });
        LoadReport {
            outcome,
            count,
            target,
            state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::ScriptedSurface;

    fn loader() -> ConvergenceLoader {
        ConvergenceLoader::new(LoaderConfig::default().without_delays(), RunContext::new("test"))
    }

    #[test]
    fn test_validate() {
        assert!(LoaderConfig::default().validate().is_ok());
        let zero = LoaderConfig {
            max_attempts: 0,
            ..LoaderConfig::default()
        };
        assert!(matches!(zero.validate(), Err(HarvestError::InvalidConfig(_))));
    }

    #[test]
    fn test_observe_resets_on_growth() {
        let mut state = ConvergenceState::default();
        assert_eq!(state.observe(0), 1);
        assert_eq!(state.observe(3), 0);
        assert_eq!(state.observe(3), 1);
        assert_eq!(state.observe(3), 2);
        assert_eq!(state.observe(9), 0);
        assert_eq!(state.previous_count, 9);
    }

    #[test]
    fn test_observe_counts_shrinkage_as_stall() {
        let mut state = ConvergenceState::default();
        assert_eq!(state.observe(9), 0);
        assert_eq!(state.observe(4), 1);
        assert_eq!(state.previous_count, 4);
        assert_eq!(state.observe(2), 2);
        // Growth is measured against the last observation, not the peak.
        assert_eq!(state.observe(5), 0);
    }

    #[tokio::test]
    async fn test_flat_surface_exhausts() {
        let mut surface = ScriptedSurface::new(vec![7]);
        let report = loader().run(&mut surface, None).await.unwrap();
        assert_eq!(report.outcome, LoadOutcome::Exhausted);
        assert_eq!(report.count, 7);
        // First observation 7 > 0 is growth, then 15 flat attempts.
        assert_eq!(report.attempts(), 16);
    }

    #[tokio::test]
    async fn test_three_stimuli_per_attempt() {
        let mut surface = ScriptedSurface::new(vec![0, 1, 2]).with_disclosed_total(2);
        let report = loader().run(&mut surface, Some(2)).await.unwrap();
        assert_eq!(report.outcome, LoadOutcome::ReachedTarget);
        assert_eq!(report.attempts(), 3);
        // The terminating attempt short-circuits before stimulating.
        assert_eq!(surface.stimuli(), 6);
    }

    #[tokio::test]
    async fn test_target_undercount_short_circuits() {
        // The page claims 10 items but already shows 12.
        let mut surface = ScriptedSurface::new(vec![12, 20]);
        let report = loader().run(&mut surface, Some(10)).await.unwrap();
        assert_eq!(report.outcome, LoadOutcome::ReachedTarget);
        assert_eq!(report.count, 12);
        assert_eq!(surface.stimuli(), 0);
    }

    #[tokio::test]
    async fn test_transient_read_counts_as_no_growth() {
        // Growth every attempt except a failed read at index 2.
        let counts: Vec<usize> = (1..=40).collect();
        let mut surface = ScriptedSurface::new(counts).with_failing_read(2);
        let config = LoaderConfig {
            max_attempts: 5,
            ..LoaderConfig::default().without_delays()
        };
        let report = ConvergenceLoader::new(config, RunContext::new("t"))
            .run(&mut surface, None)
            .await
            .unwrap();
        assert_eq!(report.outcome, LoadOutcome::BudgetExceeded);
        assert_eq!(surface.count_reads(), 5);
        assert_eq!(report.count, 5);
        assert_eq!(report.state.no_change_streak, 0);
    }

    #[tokio::test]
    async fn test_lost_surface_is_fatal() {
        let mut surface = ScriptedSurface::new(vec![1, 2, 3, 4]).lost_after(3);
        let err = loader().run(&mut surface, None).await.unwrap_err();
        assert!(matches!(err, HarvestError::Surface(_)));
    }

    #[tokio::test]
    async fn test_progress_cadence() {
        let (tx, mut rx) = crate::progress::channel();
        let ctx = RunContext::new("cadence").with_progress(tx);
        let counts: Vec<usize> = (1..=25).collect();
        let mut surface = ScriptedSurface::new(counts);
        let config = LoaderConfig {
            max_attempts: 25,
            ..LoaderConfig::default().without_delays()
        };
        ConvergenceLoader::new(config, ctx)
            .run(&mut surface, None)
            .await
            .unwrap();

        let mut attempts = Vec::new();
        while let Ok(event) = rx.try_recv() {
            if let ProgressEventKind::LoadProgress { attempt, .. } = event.event {
                attempts.push(attempt);
            }
        }
        assert_eq!(attempts, vec![0, 10, 20]);
    }
}
