//! Stability evaluation
//!
//! A stability strategy compares a statistic over the trailing window of the
//! metric history with the same statistic over the whole history (or, for
//! Cohen's d, over the values preceding the window) and reports whether the
//! difference is below a threshold.

use serde::{Deserialize, Serialize};

pub mod stats;
pub mod strategy;
pub mod threshold;

pub use stats::{Statistic, EPSILON};
pub use strategy::{CustomStatistic, DeltaMode, FnStatistic, StabilityStrategy};
pub use threshold::{Threshold, ThresholdKind};

use crate::error::Result;

/// Outcome of a single stability check
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StabilityVerdict {
    pub is_stable: bool,
    pub stability_value: f64,
    pub threshold_value: f64,
    pub strategy: String,
}

/// Evaluate `strategy` over `history`
///
/// Fails with an insufficient-data error unless `history.len() >= window + 1`.
pub fn evaluate(
    strategy: &StabilityStrategy,
    history: &[f64],
    window: usize,
    threshold: &Threshold,
) -> Result<StabilityVerdict> {
    strategy.evaluate(history, window, threshold)
}

/// A strategy bound to its window and threshold
#[derive(Debug, Clone)]
pub struct StabilityRule {
    pub strategy: StabilityStrategy,
    pub window: usize,
    pub threshold: Threshold,
}

impl StabilityRule {
    pub fn new(strategy: StabilityStrategy, window: usize, threshold: Threshold) -> Self {
        Self {
            strategy,
            window,
            threshold,
        }
    }

    /// Smallest history length this rule can be checked against
    pub fn min_history(&self) -> usize {
        self.window + 1
    }

    pub fn check(&self, history: &[f64]) -> Result<StabilityVerdict> {
        let verdict = self
            .strategy
            .evaluate(history, self.window, &self.threshold)?;
        tracing::debug!(
            strategy = %verdict.strategy,
            stability = verdict.stability_value,
            threshold = verdict.threshold_value,
            stable = verdict.is_stable,
            "Stability check over {} values",
            history.len()
        );
        Ok(verdict)
    }
}
