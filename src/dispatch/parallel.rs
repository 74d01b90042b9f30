use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::registry::JobRegistry;
use super::scheduler::{JobOutcome, JobScheduler, JobSpec};
use super::{BatchDispatcher, BatchPolicy, ExecutionType};
use crate::error::{AdaptiveError, ErrorCode, Result};
use crate::unit::{UnitConfig, UnitId, UnitResult};

/// A unit that did not complete in one attempt
struct Failure<'a> {
    unit: &'a UnitConfig,
    code: u16,
    reason: String,
}

/// Submits a whole batch to a [`JobScheduler`] and blocks until every unit
/// has resolved
///
/// With the default [`BatchPolicy`] the first failed or missing unit fails
/// the batch. A policy with retries resubmits only the failed units, with
/// their original seeds.
pub struct ParallelDispatcher {
    scheduler: Arc<dyn JobScheduler>,
    registry: JobRegistry,
    policy: BatchPolicy,
    job_context: serde_json::Value,
    keep_registry: bool,
}

impl ParallelDispatcher {
    pub fn new(scheduler: Arc<dyn JobScheduler>, registry: JobRegistry) -> Self {
        Self {
            scheduler,
            registry,
            policy: BatchPolicy::fail_fast(),
            job_context: serde_json::Value::Null,
            keep_registry: false,
        }
    }

    pub fn with_policy(mut self, policy: BatchPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Data written into every job file for remote workers
    pub fn with_job_context(mut self, context: serde_json::Value) -> Self {
        self.job_context = context;
        self
    }

    /// Leave the registry on disk after the run, for inspection
    pub fn keep_registry(mut self, keep: bool) -> Self {
        self.keep_registry = keep;
        self
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Submit `units` once and wait for them, honouring the policy timeout
    async fn attempt(&self, units: &[&UnitConfig]) -> Result<Option<HashMap<UnitId, JobOutcome>>> {
        let jobs = units
            .iter()
            .map(|unit| JobSpec {
                unit: (*unit).clone(),
                context: self.job_context.clone(),
            })
            .collect();
        let handle = self.scheduler.submit(&self.registry, jobs).await?;

        match self.policy.timeout {
            None => Ok(Some(self.scheduler.wait(&self.registry, &handle).await?)),
            Some(limit) => {
                match tokio::time::timeout(limit, self.scheduler.wait(&self.registry, &handle))
                    .await
                {
                    Ok(outcomes) => Ok(Some(outcomes?)),
                    Err(_) => {
                        // abandon the hung submission before anything is resubmitted
                        self.scheduler.reset().await?;
                        Ok(None)
                    }
                }
            }
        }
    }
}

#[async_trait]
impl BatchDispatcher for ParallelDispatcher {
    fn execution_type(&self) -> ExecutionType {
        ExecutionType::Parallel
    }

    async fn prepare(&self) -> Result<()> {
        debug!(
            "Preparing {} scheduler with registry {}",
            self.scheduler.name(),
            self.registry.root().display()
        );
        self.scheduler.reset().await?;
        self.registry.reset().await
    }

    async fn run_batch(&self, units: &[UnitConfig]) -> Result<HashMap<UnitId, UnitResult>> {
        let iteration = units.first().map(|u| u.iteration).unwrap_or_default();
        let mut results = HashMap::with_capacity(units.len());
        let mut pending: Vec<&UnitConfig> = units.iter().collect();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let outcomes = self.attempt(&pending).await?;

            let mut failures: Vec<Failure> = Vec::new();
            match outcomes {
                Some(mut outcomes) => {
                    for unit in pending {
                        let (code, reason) = match outcomes.remove(&unit.unit_id) {
                            Some(JobOutcome::Completed(result)) => {
                                results.insert(unit.unit_id, result);
                                continue;
                            }
                            Some(JobOutcome::Failed(reason)) => (ErrorCode::BATCH_UNIT_FAILED, reason),
                            Some(JobOutcome::Panicked(reason)) => {
                                (ErrorCode::BATCH_WORKER_PANICKED, reason)
                            }
                            None => (
                                ErrorCode::BATCH_MISSING_RESULT,
                                "unit produced no result".to_string(),
                            ),
                        };
                        failures.push(Failure { unit, code, reason });
                    }
                }
                None => {
                    let limit = self.policy.timeout.unwrap_or_default();
                    let reason = format!("no result within {limit:?}");
                    failures.extend(pending.into_iter().map(|unit| Failure {
                        unit,
                        code: ErrorCode::BATCH_TIMEOUT,
                        reason: reason.clone(),
                    }));
                }
            }

            if failures.is_empty() {
                debug!(
                    "Iteration {} resolved {} units after {} attempt(s)",
                    iteration,
                    results.len(),
                    attempt
                );
                return Ok(results);
            }

            if attempt > self.policy.max_retries {
                failures.sort_by_key(|failure| failure.unit.unit_id);
                let first = &failures[0];
                let mut message = first.reason.clone();
                if failures.len() > 1 {
                    message.push_str(&format!(" ({} units failed)", failures.len()));
                }
                return Err(AdaptiveError::batch_with_code(first.code, message)
                    .with_unit(first.unit.unit_id)
                    .with_iteration(first.unit.iteration));
            }

            for Failure { unit, reason, .. } in &failures {
                warn!(
                    "{} failed in iteration {} ({}), resubmitting with seed {}",
                    unit.unit_id, unit.iteration, reason, unit.seed
                );
            }
            info!(
                "Retrying {} unit(s), attempt {} of {}",
                failures.len(),
                attempt + 1,
                self.policy.max_retries + 1
            );
            pending = failures.into_iter().map(|failure| failure.unit).collect();
        }
    }

    async fn finish(&self) -> Result<()> {
        self.scheduler.reset().await?;
        if self.keep_registry {
            info!("Job registry kept at {}", self.registry.root().display());
            Ok(())
        } else {
            self.registry.cleanup().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{LocalPoolScheduler, SubmissionHandle};
    use crate::testing::{FailingEvaluator, ScriptedEvaluator};
    use std::time::Duration;
    use tempfile::TempDir;

    fn units(iteration: u64, seeds: &[i64]) -> Vec<UnitConfig> {
        seeds
            .iter()
            .enumerate()
            .map(|(i, seed)| UnitConfig {
                unit_id: UnitId::new(i as u64 + 1),
                iteration,
                seed: *seed,
                pipeline: serde_json::Value::Null,
            })
            .collect()
    }

    fn dispatcher(temp: &TempDir, evaluator: Arc<dyn crate::unit::UnitEvaluator>) -> ParallelDispatcher {
        ParallelDispatcher::new(
            Arc::new(LocalPoolScheduler::new(evaluator, 3)),
            JobRegistry::new(temp.path().join("registry")),
        )
    }

    #[tokio::test]
    async fn test_complete_batch() {
        let temp = TempDir::new().unwrap();
        let evaluator = ScriptedEvaluator::new(|seed| seed as f64).with_delay(Duration::from_millis(1));
        let dispatcher = dispatcher(&temp, Arc::new(evaluator));

        dispatcher.prepare().await.unwrap();
        let results = dispatcher.run_batch(&units(1, &[5, 6, 7, 8])).await.unwrap();
        dispatcher.finish().await.unwrap();

        assert_eq!(results.len(), 4);
        assert!(!temp.path().join("registry").exists());
    }

    #[tokio::test]
    async fn test_fail_fast_reports_failing_unit() {
        let temp = TempDir::new().unwrap();
        let evaluator = Arc::new(FailingEvaluator::on_seeds([7]));
        let dispatcher = dispatcher(&temp, evaluator.clone());

        let err = dispatcher.run_batch(&units(3, &[5, 6, 7])).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::BATCH_UNIT_FAILED);
        assert!(err.user_message().contains("iteration 3"));
        assert!(err.user_message().contains("split_3"));
        assert_eq!(evaluator.calls(), 3);
    }

    #[tokio::test]
    async fn test_retries_resubmit_only_failed_units_with_original_seed() {
        let temp = TempDir::new().unwrap();
        let evaluator = Arc::new(FailingEvaluator::on_seeds([6]).recovering_after(1));
        let dispatcher = dispatcher(&temp, evaluator.clone()).with_policy(BatchPolicy {
            timeout: None,
            max_retries: 2,
        });

        let results = dispatcher.run_batch(&units(1, &[5, 6, 7])).await.unwrap();

        assert_eq!(results.len(), 3);
        assert_eq!(evaluator.calls(), 4);
    }

    #[tokio::test]
    async fn test_retries_exhausted() {
        let temp = TempDir::new().unwrap();
        let evaluator = Arc::new(FailingEvaluator::on_seeds([5, 6]));
        let dispatcher = dispatcher(&temp, evaluator.clone()).with_policy(BatchPolicy {
            timeout: None,
            max_retries: 1,
        });

        let err = dispatcher.run_batch(&units(2, &[5, 6, 7])).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::BATCH_UNIT_FAILED);
        assert!(err.user_message().contains("split_1"));
        assert!(err.user_message().contains("2 units failed"));
        assert_eq!(evaluator.calls(), 5);
    }

    #[tokio::test]
    async fn test_timeout_without_retries() {
        let temp = TempDir::new().unwrap();
        let evaluator =
            ScriptedEvaluator::new(|seed| seed as f64).with_delay(Duration::from_secs(5));
        let dispatcher = dispatcher(&temp, Arc::new(evaluator)).with_policy(BatchPolicy {
            timeout: Some(Duration::from_millis(20)),
            max_retries: 0,
        });

        let err = dispatcher.run_batch(&units(1, &[1, 2])).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::BATCH_TIMEOUT);
    }

    /// Completes every job except the last one submitted
    struct DroppingScheduler;

    #[async_trait]
    impl JobScheduler for DroppingScheduler {
        fn name(&self) -> &str {
            "dropping"
        }

        async fn submit(
            &self,
            _registry: &JobRegistry,
            jobs: Vec<JobSpec>,
        ) -> Result<SubmissionHandle> {
            Ok(SubmissionHandle::new(
                jobs.iter().map(|job| job.unit.unit_id).collect(),
            ))
        }

        async fn wait(
            &self,
            _registry: &JobRegistry,
            handle: &SubmissionHandle,
        ) -> Result<HashMap<UnitId, JobOutcome>> {
            let kept = handle.units.len().saturating_sub(1);
            Ok(handle.units[..kept]
                .iter()
                .map(|unit| {
                    let result = UnitResult::new(serde_json::json!({"evaluation": {"metric": 0.0}}));
                    (*unit, JobOutcome::Completed(result))
                })
                .collect())
        }
    }

    #[tokio::test]
    async fn test_missing_outcome_has_its_own_code() {
        let temp = TempDir::new().unwrap();
        let dispatcher = ParallelDispatcher::new(
            Arc::new(DroppingScheduler),
            JobRegistry::new(temp.path().join("registry")),
        );

        let err = dispatcher.run_batch(&units(4, &[1, 2, 3])).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::BATCH_MISSING_RESULT);
        assert!(err.user_message().contains("split_3"));
        assert!(err.user_message().contains("no result"));
    }

    struct PanickingEvaluator;

    #[async_trait]
    impl crate::unit::UnitEvaluator for PanickingEvaluator {
        async fn evaluate(&self, _config: &UnitConfig) -> anyhow::Result<UnitResult> {
            panic!("evaluator bug");
        }
    }

    #[tokio::test]
    async fn test_panicked_worker_reported_as_panic() {
        let temp = TempDir::new().unwrap();
        let dispatcher = dispatcher(&temp, Arc::new(PanickingEvaluator));

        let err = dispatcher.run_batch(&units(1, &[9])).await.unwrap_err();

        assert_eq!(err.code(), ErrorCode::BATCH_WORKER_PANICKED);
        assert!(err.user_message().contains("split_1"));
    }
}
