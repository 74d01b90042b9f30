use crate::dispatch::ExecutionType;
use crate::error::{AdaptiveError, ErrorCode, Result};
use crate::seed;
use crate::stability::StabilityRule;
use crate::unit::MetricPath;

/// Immutable configuration of one controller run
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub execution: ExecutionType,
    pub base_seed: i64,
    /// History length at which stability checks start
    pub min_splits: usize,
    /// Hard cap on executed units
    pub max_splits: usize,
    /// Units per iteration for the parallel variant
    pub n_per_iteration: usize,
    pub rule: StabilityRule,
    pub metric: MetricPath,
    /// Base pipeline configuration copied into every unit
    pub pipeline: serde_json::Value,
}

impl ControllerConfig {
    /// Units requested per iteration
    pub fn batch_size(&self) -> usize {
        match self.execution {
            ExecutionType::Sequential => 1,
            ExecutionType::Parallel => self.n_per_iteration,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.rule.window == 0 {
            return Err(AdaptiveError::invalid_value(
                "stability.window",
                "window must be at least 1",
            ));
        }
        self.rule
            .threshold
            .validate()
            .map_err(|e| e.with_context("stability.threshold"))?;

        if self.min_splits == 0 {
            return Err(AdaptiveError::invalid_value(
                "min_splits",
                "at least one unit must run before termination",
            ));
        }
        if self.min_splits > self.max_splits {
            return Err(AdaptiveError::invalid_value(
                "min_splits",
                format!(
                    "min_splits ({}) exceeds max_splits ({})",
                    self.min_splits, self.max_splits
                ),
            ));
        }
        if self.min_splits < self.rule.min_history() {
            return Err(AdaptiveError::invalid_value(
                "min_splits",
                format!(
                    "min_splits ({}) must be at least window + 1 ({})",
                    self.min_splits,
                    self.rule.min_history()
                ),
            ));
        }
        if self.execution == ExecutionType::Parallel && self.n_per_iteration == 0 {
            return Err(AdaptiveError::invalid_value(
                "n_per_iteration",
                "parallel runs need at least one unit per iteration",
            ));
        }

        // seeds are reserved for whole iterations, even when the last one is truncated
        let batch = self.batch_size();
        let total = self
            .max_splits
            .div_ceil(batch)
            .checked_mul(batch)
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| {
                AdaptiveError::config_with_code(
                    ErrorCode::CONFIG_SEED_OVERFLOW,
                    format!(
                        "max_splits ({}) reserves more seeds than fit in a 64-bit seed",
                        self.max_splits
                    ),
                )
            })?;
        match seed::max_base_seed(total) {
            Some(max) if self.base_seed <= max => Ok(()),
            _ => Err(AdaptiveError::config_with_code(
                ErrorCode::CONFIG_SEED_OVERFLOW,
                format!(
                    "base seed {} leaves no room for {} distinct seeds",
                    self.base_seed, total
                ),
            )),
        }
    }
}
