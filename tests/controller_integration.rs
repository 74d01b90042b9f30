//! End-to-end runs of the control loop against stub evaluators

use adaptive_splits::controller::{ControlLoop, ControllerConfig, TerminationReason};
use adaptive_splits::dispatch::{
    BatchPolicy, ExecutionType, JobRegistry, LocalPoolScheduler, ParallelDispatcher,
    SequentialDispatcher,
};
use adaptive_splits::error::ErrorCode;
use adaptive_splits::stability::{DeltaMode, StabilityRule, StabilityStrategy, Statistic, Threshold};
use adaptive_splits::testing::{metric_path, FailingEvaluator, ScriptedEvaluator, SeedEchoEvaluator};
use adaptive_splits::unit::UnitEvaluator;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn config(execution: ExecutionType, min: usize, max: usize, per_iteration: usize) -> ControllerConfig {
    ControllerConfig {
        execution,
        base_seed: 1000,
        min_splits: min,
        max_splits: max,
        n_per_iteration: per_iteration,
        rule: StabilityRule::new(
            StabilityStrategy::new(Statistic::Mean, DeltaMode::Absolute),
            3,
            Threshold::absolute(0.05),
        ),
        metric: metric_path(),
        pipeline: serde_json::json!({"stage": "evaluate"}),
    }
}

fn sequential(config: ControllerConfig, evaluator: Arc<dyn UnitEvaluator>) -> ControlLoop {
    let dispatcher = Arc::new(SequentialDispatcher::new(Arc::clone(&evaluator)));
    ControlLoop::new(config, evaluator, dispatcher)
}

fn parallel(
    config: ControllerConfig,
    evaluator: Arc<dyn UnitEvaluator>,
    registry: &TempDir,
    policy: BatchPolicy,
) -> ControlLoop {
    let scheduler = Arc::new(LocalPoolScheduler::new(Arc::clone(&evaluator), 4));
    let dispatcher = ParallelDispatcher::new(scheduler, JobRegistry::new(registry.path().join("jobs")))
        .with_policy(policy);
    ControlLoop::new(config, evaluator, Arc::new(dispatcher))
}

/// Bounded, non-converging metric
fn noisy(seed: i64) -> f64 {
    ((seed * 7919) % 101) as f64
}

#[tokio::test]
async fn test_runs_are_deterministic() {
    let first = sequential(
        config(ExecutionType::Sequential, 4, 25, 1),
        Arc::new(ScriptedEvaluator::new(noisy)),
    )
    .run()
    .await
    .unwrap();
    let second = sequential(
        config(ExecutionType::Sequential, 4, 25, 1),
        Arc::new(ScriptedEvaluator::new(noisy)),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(first.used_seeds, second.used_seeds);
    assert_eq!(first.metric_history, second.metric_history);
    assert_eq!(first.termination_reason, second.termination_reason);
}

#[tokio::test]
async fn test_parallel_runs_are_deterministic_despite_completion_order() {
    let temp = TempDir::new().unwrap();
    let run = || {
        parallel(
            config(ExecutionType::Parallel, 6, 12, 4),
            Arc::new(ScriptedEvaluator::new(noisy).with_delay(Duration::from_millis(1))),
            &temp,
            BatchPolicy::fail_fast(),
        )
    };

    let first = run().run().await.unwrap();
    let second = run().run().await.unwrap();

    assert_eq!(first.used_seeds, second.used_seeds);
    assert_eq!(first.metric_history, second.metric_history);
}

#[tokio::test]
async fn test_history_follows_unit_order_not_arrival_order() {
    let temp = TempDir::new().unwrap();
    let evaluator = ScriptedEvaluator::new(|seed| seed as f64).with_delay(Duration::from_millis(2));
    let output = parallel(
        config(ExecutionType::Parallel, 5, 5, 5),
        Arc::new(evaluator),
        &temp,
        BatchPolicy::fail_fast(),
    )
    .run()
    .await
    .unwrap();

    let expected: Vec<f64> = (1001..=1005).map(|s| s as f64).collect();
    assert_eq!(output.metric_history.values(), expected.as_slice());
    assert_eq!(output.used_seeds, vec![1001, 1002, 1003, 1004, 1005]);
}

#[tokio::test]
async fn test_history_grows_by_batch_size_and_last_batch_is_truncated() {
    let temp = TempDir::new().unwrap();
    let evaluator = Arc::new(SeedEchoEvaluator::new());
    let output = parallel(
        config(ExecutionType::Parallel, 6, 14, 3),
        evaluator.clone(),
        &temp,
        BatchPolicy::fail_fast(),
    )
    .run()
    .await
    .unwrap();

    assert_eq!(output.termination_reason, TerminationReason::MaxIterationsReached);
    assert_eq!(output.iterations, 5);
    assert_eq!(output.metric_history.len(), 14);
    assert_eq!(output.used_seeds, (1001..=1014).collect::<Vec<i64>>());
    assert_eq!(evaluator.seen_seeds().len(), 14);
}

#[tokio::test]
async fn test_constant_metric_stops_as_soon_as_checked() {
    let temp = TempDir::new().unwrap();
    let output = parallel(
        config(ExecutionType::Parallel, 7, 100, 4),
        Arc::new(ScriptedEvaluator::new(|_| 0.42)),
        &temp,
        BatchPolicy::fail_fast(),
    )
    .run()
    .await
    .unwrap();

    // checks start once 7 values exist, i.e. after the second batch of 4
    assert_eq!(output.termination_reason, TerminationReason::Stable);
    assert_eq!(output.metric_history.len(), 8);
    assert!(!output.continue_workflow);
    assert_eq!(output.units.len(), 8);
    assert!(!temp.path().join("jobs").exists());
}

#[tokio::test]
async fn test_termination_is_exclusive_and_capped() {
    for max in [4usize, 5, 9, 10] {
        let output = sequential(
            config(ExecutionType::Sequential, 4, max, 1),
            Arc::new(ScriptedEvaluator::new(noisy)),
        )
        .run()
        .await
        .unwrap();

        assert!(output.metric_history.len() <= max);
        match output.termination_reason {
            TerminationReason::Stable => assert!(output.final_verdict.unwrap().is_stable),
            TerminationReason::MaxIterationsReached => {
                assert_eq!(output.metric_history.len(), max);
                assert!(!output.final_verdict.unwrap().is_stable);
            }
        }
    }
}

#[tokio::test]
async fn test_non_convergent_run_stops_at_max_splits() {
    let alternating = |seed: i64| if seed % 2 == 0 { 100.0 } else { -100.0 };
    let mut config = config(ExecutionType::Sequential, 5, 5, 1);
    config.rule = StabilityRule::new(
        StabilityStrategy::new(Statistic::Sd, DeltaMode::Absolute),
        2,
        Threshold::absolute(1.0),
    );

    let output = sequential(config, Arc::new(ScriptedEvaluator::new(alternating)))
        .run()
        .await
        .unwrap();

    assert_eq!(output.termination_reason, TerminationReason::MaxIterationsReached);
    assert_eq!(output.metric_history.len(), 5);
    assert_eq!(output.iterations, 5);
}

#[tokio::test]
async fn test_failed_job_aborts_the_run_without_output() {
    let temp = TempDir::new().unwrap();
    // seed 1005 belongs to the second batch of 4
    let evaluator = Arc::new(FailingEvaluator::on_seeds([1005]));
    let result = parallel(
        config(ExecutionType::Parallel, 6, 40, 4),
        evaluator.clone(),
        &temp,
        BatchPolicy::fail_fast(),
    )
    .run()
    .await;

    let err = result.unwrap_err();
    assert!(err.is_batch_execution());
    assert_eq!(err.code(), ErrorCode::BATCH_UNIT_FAILED);
    assert!(err.user_message().contains("iteration 2"));
    assert!(err.user_message().contains("split_5"));
    // no third batch was dispatched
    assert_eq!(evaluator.calls(), 8);
    assert!(!temp.path().join("jobs").exists());
}

#[tokio::test]
async fn test_sequential_failure_is_fail_fast() {
    let evaluator = Arc::new(FailingEvaluator::on_seeds([1002]));
    let err = sequential(config(ExecutionType::Sequential, 4, 10, 1), evaluator.clone())
        .run()
        .await
        .unwrap_err();

    assert!(err.is_batch_execution());
    assert_eq!(evaluator.calls(), 2);
}

#[tokio::test]
async fn test_opt_in_retries_recover_transient_failures() {
    let temp = TempDir::new().unwrap();
    let evaluator = Arc::new(FailingEvaluator::on_seeds([1002, 1007]).recovering_after(1));
    let output = parallel(
        config(ExecutionType::Parallel, 4, 8, 4),
        evaluator.clone(),
        &temp,
        BatchPolicy {
            timeout: None,
            max_retries: 1,
        },
    )
    .run()
    .await
    .unwrap();

    assert_eq!(output.used_seeds, (1001..=1008).collect::<Vec<i64>>());
    assert_eq!(evaluator.calls(), 10);
}
