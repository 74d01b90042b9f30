//! Batch dispatch
//!
//! A dispatcher executes every unit of one controller iteration and blocks
//! until the whole batch has resolved. It returns either a complete map of
//! results keyed by unit id or an error; partial batches are never returned.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

pub mod parallel;
pub mod registry;
pub mod scheduler;
pub mod sequential;

pub use parallel::ParallelDispatcher;
pub use registry::JobRegistry;
pub use scheduler::{
    ClusterScheduler, JobOutcome, JobScheduler, JobSpec, LocalPoolScheduler, SubmissionHandle,
};
pub use sequential::SequentialDispatcher;

use crate::error::{AdaptiveError, ErrorCode, Result};
use crate::unit::{UnitConfig, UnitId, UnitResult};

/// The two execution variants of the controller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionType {
    /// One unit per iteration, evaluated in-process
    #[default]
    Sequential,
    /// `n_per_iteration` units per iteration, evaluated by a worker pool or cluster
    Parallel,
}

impl std::fmt::Display for ExecutionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionType::Sequential => write!(f, "sequential"),
            ExecutionType::Parallel => write!(f, "parallel"),
        }
    }
}

#[async_trait]
pub trait BatchDispatcher: Send + Sync {
    fn execution_type(&self) -> ExecutionType;

    /// Called once before the first batch of a run
    async fn prepare(&self) -> Result<()> {
        Ok(())
    }

    async fn run_batch(&self, units: &[UnitConfig]) -> Result<HashMap<UnitId, UnitResult>>;

    /// Called once after the run terminated, on success and on error
    async fn finish(&self) -> Result<()> {
        Ok(())
    }
}

/// Opt-in recovery for failed or hung batches
///
/// The default is fail-fast: no timeout and no retries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchPolicy {
    /// Upper bound on how long one submission may take to resolve
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// How often failed units are resubmitted with their original seeds
    #[serde(default)]
    pub max_retries: u32,
}

impl BatchPolicy {
    pub fn fail_fast() -> Self {
        Self::default()
    }

    pub fn is_fail_fast(&self) -> bool {
        self.timeout.is_none() && self.max_retries == 0
    }
}

/// One executed unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub seed: i64,
    pub result: UnitResult,
}

/// The resolved units of one iteration, ordered by unit id
#[derive(Debug, Clone, PartialEq)]
pub struct IterationBatch {
    iteration: u64,
    units: BTreeMap<UnitId, UnitRecord>,
}

impl IterationBatch {
    /// Pair every requested unit with its result
    ///
    /// Fails if a requested unit has no result or a result belongs to a unit
    /// that was never requested.
    pub fn assemble(
        iteration: u64,
        requested: &[UnitConfig],
        mut results: HashMap<UnitId, UnitResult>,
    ) -> Result<Self> {
        let mut units = BTreeMap::new();
        for unit in requested {
            let result = results.remove(&unit.unit_id).ok_or_else(|| {
                AdaptiveError::batch_with_code(
                    ErrorCode::BATCH_MISSING_RESULT,
                    "dispatcher returned no result for unit",
                )
                .with_unit(unit.unit_id)
                .with_iteration(iteration)
            })?;
            units.insert(
                unit.unit_id,
                UnitRecord {
                    seed: unit.seed,
                    result,
                },
            );
        }

        if let Some(stray) = results.keys().min() {
            return Err(AdaptiveError::batch(format!(
                "dispatcher returned {} result(s) for units that were not requested",
                results.len()
            ))
            .with_unit(stray)
            .with_iteration(iteration));
        }

        Ok(Self { iteration, units })
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn units(&self) -> &BTreeMap<UnitId, UnitRecord> {
        &self.units
    }

    pub fn into_units(self) -> BTreeMap<UnitId, UnitRecord> {
        self.units
    }
}

/// Wrap an evaluator failure as a batch execution error for `unit`
pub(crate) fn unit_failure(unit: &UnitConfig, message: impl Into<String>) -> AdaptiveError {
    AdaptiveError::batch_with_code(ErrorCode::BATCH_UNIT_FAILED, message)
        .with_unit(unit.unit_id)
        .with_iteration(unit.iteration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn unit(index: u64) -> UnitConfig {
        UnitConfig {
            unit_id: UnitId::new(index),
            iteration: 1,
            seed: 100 + index as i64,
            pipeline: json!(null),
        }
    }

    #[test]
    fn test_assemble_orders_by_unit_id() {
        let requested = vec![unit(2), unit(10), unit(1)];
        let results: HashMap<_, _> = requested
            .iter()
            .map(|u| (u.unit_id, UnitResult::new(json!({"seed": u.seed}))))
            .collect();

        let batch = IterationBatch::assemble(1, &requested, results).unwrap();
        let order: Vec<u64> = batch.units().keys().map(|id| id.index()).collect();
        assert_eq!(order, [1, 2, 10]);
        assert_eq!(batch.units()[&UnitId::new(10)].seed, 110);
    }

    #[test]
    fn test_assemble_rejects_missing_result() {
        let requested = vec![unit(1), unit(2)];
        let mut results = HashMap::new();
        results.insert(UnitId::new(1), UnitResult::new(json!({})));

        let err = IterationBatch::assemble(4, &requested, results).unwrap_err();
        assert_eq!(err.code(), ErrorCode::BATCH_MISSING_RESULT);
        assert!(err.user_message().contains("split_2"));
    }

    #[test]
    fn test_assemble_rejects_stray_result() {
        let requested = vec![unit(1)];
        let mut results = HashMap::new();
        results.insert(UnitId::new(1), UnitResult::new(json!({})));
        results.insert(UnitId::new(9), UnitResult::new(json!({})));

        assert!(IterationBatch::assemble(1, &requested, results).is_err());
    }

    #[test]
    fn test_batch_policy_defaults_to_fail_fast() {
        let policy: BatchPolicy = serde_yaml::from_str("{}").unwrap();
        assert!(policy.is_fail_fast());

        let policy: BatchPolicy = serde_yaml::from_str("timeout: 90s\nmax_retries: 2").unwrap();
        assert_eq!(policy.timeout, Some(Duration::from_secs(90)));
        assert_eq!(policy.max_retries, 2);
    }
}
