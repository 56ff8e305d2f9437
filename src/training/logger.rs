//! Verbosity-gated training output.
//!
//! Training code reports progress through a [`TrainingLogger`]; the logger
//! decides whether an event is emitted and forwards it to `tracing`. Install any
//! `tracing` subscriber to see the output.

use std::time::{Duration, Instant};

/// How much training output to produce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// No output at all.
    Silent,
    /// Only conditions that change the result, e.g. an early stop.
    #[default]
    Warning,
    /// One line per tree level.
    Info,
    /// Per-phase timings.
    Debug,
}

/// Summary of one grown tree level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LevelSummary {
    pub depth: usize,
    pub feature: usize,
    pub condition: usize,
    pub border: f32,
    pub score: f64,
    pub n_leaves: usize,
    pub n_rescanned: usize,
}

/// Emits training events at or below the configured verbosity.
#[derive(Debug)]
pub struct TrainingLogger {
    verbosity: Verbosity,
    start: Option<Instant>,
    level_start: Option<Instant>,
}

impl TrainingLogger {
    pub fn new(verbosity: Verbosity) -> Self {
        Self {
            verbosity,
            start: None,
            level_start: None,
        }
    }

    #[inline]
    pub fn verbosity(&self) -> Verbosity {
        self.verbosity
    }

    #[inline]
    pub fn enabled(&self, level: Verbosity) -> bool {
        level != Verbosity::Silent && self.verbosity >= level
    }

    pub fn start_training(&mut self, n_samples: usize, n_features: usize, max_depth: usize) {
        let now = Instant::now();
        self.start = Some(now);
        self.level_start = Some(now);
        if self.enabled(Verbosity::Info) {
            tracing::info!(
                target: "linear_tree",
                n_samples,
                n_features,
                max_depth,
                "training linear oblivious tree"
            );
        }
    }

    pub fn log_level(&mut self, summary: &LevelSummary) {
        let elapsed = self.level_start.map(|t| t.elapsed()).unwrap_or_default();
        self.level_start = Some(Instant::now());
        if self.enabled(Verbosity::Info) {
            tracing::info!(
                target: "linear_tree",
                depth = summary.depth,
                feature = summary.feature,
                condition = summary.condition,
                border = summary.border,
                score = summary.score,
                n_leaves = summary.n_leaves,
                n_rescanned = summary.n_rescanned,
                elapsed_ms = elapsed.as_secs_f64() * 1e3,
                "level grown"
            );
        }
    }

    /// Time spent in one phase of a level.
    pub fn log_phase(&self, depth: usize, phase: &'static str, elapsed: Duration) {
        if self.enabled(Verbosity::Debug) {
            tracing::debug!(
                target: "linear_tree",
                depth,
                phase,
                elapsed_ms = elapsed.as_secs_f64() * 1e3,
                "phase done"
            );
        }
    }

    pub fn log_no_split(&self, depth: usize) {
        if self.enabled(Verbosity::Warning) {
            tracing::warn!(
                target: "linear_tree",
                depth,
                "no admissible split left, stopping early"
            );
        }
    }

    pub fn finish_training(&self, depth: usize, n_leaves: usize) {
        if self.enabled(Verbosity::Info) {
            let elapsed = self.start.map(|t| t.elapsed()).unwrap_or_default();
            tracing::info!(
                target: "linear_tree",
                depth,
                n_leaves,
                elapsed_ms = elapsed.as_secs_f64() * 1e3,
                "training finished"
            );
        }
    }
}

/// Runs `f` and reports its duration as a debug phase.
pub(crate) fn timed<T>(
    logger: &TrainingLogger,
    depth: usize,
    phase: &'static str,
    f: impl FnOnce() -> T,
) -> T {
    let start = Instant::now();
    let out = f();
    logger.log_phase(depth, phase, start.elapsed());
    out
}
