use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::config::ControllerConfig;
use super::output::{self, ExecutionOutput, RunSummary, TerminationReason};
use super::state::LoopState;
use crate::dispatch::{BatchDispatcher, IterationBatch};
use crate::error::{AdaptiveError, ErrorCode, Result};
use crate::seed;
use crate::unit::{UnitConfig, UnitEvaluator, UnitId};

/// Where a step of the loop leaves the run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Continue,
    Stop(TerminationReason),
}

/// Convergence-driven controller
///
/// Runs batches of units until the monitored metric is stable or the unit cap
/// is reached. Collaborators are injected; the loop owns nothing but its
/// accumulated [`LoopState`].
pub struct ControlLoop {
    config: ControllerConfig,
    evaluator: Arc<dyn UnitEvaluator>,
    dispatcher: Arc<dyn BatchDispatcher>,
}

impl ControlLoop {
    pub fn new(
        config: ControllerConfig,
        evaluator: Arc<dyn UnitEvaluator>,
        dispatcher: Arc<dyn BatchDispatcher>,
    ) -> Self {
        Self {
            config,
            evaluator,
            dispatcher,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Run to termination
    ///
    /// On error no output is produced and everything accumulated so far is
    /// dropped.
    pub async fn run(&self) -> Result<ExecutionOutput> {
        self.check_preconditions()?;
        let started_at = Utc::now();

        info!(
            "Starting {} run: strategy {}, window {}, {}..{} units, {} per iteration",
            self.config.execution,
            self.config.rule.strategy,
            self.config.rule.window,
            self.config.min_splits,
            self.config.max_splits,
            self.config.batch_size()
        );

        self.dispatcher.prepare().await?;
        let outcome = self.iterate().await;
        let teardown = self.dispatcher.finish().await;

        let (state, reason) = match (outcome, teardown) {
            (Ok(done), Ok(())) => done,
            (Ok(_), Err(e)) | (Err(e), Ok(())) => return Err(e),
            (Err(e), Err(teardown_err)) => {
                warn!("Dispatcher teardown failed after error: {}", teardown_err);
                return Err(e);
            }
        };

        let (iterations, history, units, used_seeds, final_verdict) = state.into_parts();
        Ok(output::build(
            units,
            history,
            reason,
            &self.config.metric,
            used_seeds,
            RunSummary {
                execution_type: self.config.execution,
                iterations,
                final_verdict,
                started_at,
                finished_at: Utc::now(),
            },
        ))
    }

    /// INIT: everything that can be rejected before the first unit runs
    fn check_preconditions(&self) -> Result<()> {
        self.config.validate()?;

        let units = self.evaluator.units_per_split();
        if units != 1 {
            return Err(AdaptiveError::config_with_code(
                ErrorCode::CONFIG_UNIT_CARDINALITY,
                format!(
                    "adaptive runs need exactly one unit per split, the evaluator yields {units}"
                ),
            ));
        }

        let dispatcher_type = self.dispatcher.execution_type();
        if dispatcher_type != self.config.execution {
            return Err(AdaptiveError::config_with_code(
                ErrorCode::CONFIG_EXECUTION_MISMATCH,
                format!(
                    "{} run configured with a {} dispatcher",
                    self.config.execution, dispatcher_type
                ),
            ));
        }
        Ok(())
    }

    async fn iterate(&self) -> Result<(LoopState, TerminationReason)> {
        let mut state = LoopState::new();
        loop {
            let (next, decision) = self.step(state).await?;
            state = next;
            if let Decision::Stop(reason) = decision {
                return Ok((state, reason));
            }
        }
    }

    /// One ITERATE, DISPATCH, ACCUMULATE, CHECK_STABILITY round
    async fn step(&self, state: LoopState) -> Result<(LoopState, Decision)> {
        let iteration = state.iteration() + 1;
        let units = self.plan_batch(&state, iteration)?;
        info!(
            "Iteration {}: dispatching {} unit(s), {} executed so far",
            iteration,
            units.len(),
            state.history().len()
        );

        let results = self.dispatcher.run_batch(&units).await?;
        let batch = IterationBatch::assemble(iteration, &units, results)?;
        let state = state.absorb(batch, &self.config.metric)?;
        let executed = state.history().len();

        if executed < self.config.min_splits {
            debug!(
                "{} of {} units before the first stability check",
                executed, self.config.min_splits
            );
            return Ok((state, Decision::Continue));
        }

        let verdict = self.config.rule.check(state.history().values())?;
        let stable = verdict.is_stable;
        let state = state.with_verdict(verdict);
        let decision = self.decide(stable, executed);

        match decision {
            Decision::Stop(TerminationReason::Stable) => {
                info!("Metric stable after {} units", executed);
            }
            Decision::Stop(TerminationReason::MaxIterationsReached) => {
                warn!(
                    "Reached {} units without the metric becoming stable",
                    self.config.max_splits
                );
            }
            Decision::Continue => {}
        }
        Ok((state, decision))
    }

    /// Seeds and unit configurations for the next batch, truncated so the run
    /// never exceeds `max_splits`
    fn plan_batch(&self, state: &LoopState, iteration: u64) -> Result<Vec<UnitConfig>> {
        let batch_size = self.config.batch_size();
        let remaining = self.config.max_splits - state.history().len();
        let seeds = seed::next_seeds(self.config.base_seed, iteration, batch_size as u64)?;
        debug!("Iteration {} seeds: {:?}", iteration, seeds);

        let first = state.next_unit_id().index();
        Ok(seeds
            .into_iter()
            .take(remaining.min(batch_size))
            .enumerate()
            .map(|(offset, seed)| UnitConfig {
                unit_id: UnitId::new(first + offset as u64),
                iteration,
                seed,
                pipeline: self.config.pipeline.clone(),
            })
            .collect())
    }

    /// Stability takes precedence over the cap
    fn decide(&self, stable: bool, executed: usize) -> Decision {
        if stable {
            Decision::Stop(TerminationReason::Stable)
        } else if executed >= self.config.max_splits {
            Decision::Stop(TerminationReason::MaxIterationsReached)
        } else {
            Decision::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{ExecutionType, SequentialDispatcher};
    use crate::stability::{DeltaMode, StabilityRule, StabilityStrategy, Statistic, Threshold};
    use crate::testing::{metric_path, MultiUnitEvaluator, ScriptedEvaluator, SeedEchoEvaluator};

    fn config(min: usize, max: usize, threshold: f64) -> ControllerConfig {
        ControllerConfig {
            execution: ExecutionType::Sequential,
            base_seed: 0,
            min_splits: min,
            max_splits: max,
            n_per_iteration: 1,
            rule: StabilityRule::new(
                StabilityStrategy::new(Statistic::Mean, DeltaMode::Absolute),
                2,
                Threshold::absolute(threshold),
            ),
            metric: metric_path(),
            pipeline: serde_json::json!({"model": "logreg"}),
        }
    }

    fn sequential(config: ControllerConfig, evaluator: Arc<dyn UnitEvaluator>) -> ControlLoop {
        let dispatcher = Arc::new(SequentialDispatcher::new(evaluator.clone()));
        ControlLoop::new(config, evaluator, dispatcher)
    }

    #[tokio::test]
    async fn test_constant_metric_stops_at_first_check() {
        let evaluator = Arc::new(ScriptedEvaluator::new(|_| 0.8));
        let output = sequential(config(4, 50, 0.01), evaluator).run().await.unwrap();

        assert_eq!(output.termination_reason, TerminationReason::Stable);
        assert_eq!(output.metric_history.len(), 4);
        assert_eq!(output.used_seeds, vec![1, 2, 3, 4]);
        assert_eq!(output.iterations, 4);
        assert!(output.final_verdict.unwrap().is_stable);
    }

    #[tokio::test]
    async fn test_diverging_metric_hits_cap() {
        let evaluator = Arc::new(SeedEchoEvaluator::new());
        let output = sequential(config(3, 6, 0.01), evaluator.clone())
            .run()
            .await
            .unwrap();

        assert_eq!(
            output.termination_reason,
            TerminationReason::MaxIterationsReached
        );
        assert_eq!(output.unit_count(), 6);
        assert_eq!(evaluator.seen_seeds().len(), 6);
        assert!(!output.final_verdict.unwrap().is_stable);
    }

    #[tokio::test]
    async fn test_multi_unit_evaluator_rejected_before_any_unit_runs() {
        let evaluator = Arc::new(MultiUnitEvaluator { units: 5 });
        let err = sequential(config(3, 6, 0.01), evaluator)
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_UNIT_CARDINALITY);
    }

    #[tokio::test]
    async fn test_execution_type_mismatch_rejected() {
        let mut config = config(3, 6, 0.01);
        config.execution = ExecutionType::Parallel;
        config.n_per_iteration = 2;
        let err = sequential(config, Arc::new(SeedEchoEvaluator::new()))
            .run()
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_EXECUTION_MISMATCH);
    }

    #[tokio::test]
    async fn test_pipeline_forwarded_to_units() {
        let evaluator = Arc::new(ScriptedEvaluator::new(|_| 1.0));
        let control = sequential(config(3, 3, 0.0), evaluator);
        let state = LoopState::new();
        let units = control.plan_batch(&state, 1).unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units[0].pipeline["model"], "logreg");
        assert_eq!(units[0].unit_id.to_string(), "split_1");
    }
}
