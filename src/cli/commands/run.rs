//! Run command implementation
//!
//! Wires the collaborators described by a run file into a control loop.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{load_run_config, BackendConfig, RunConfig};
use crate::controller::{ControlLoop, ExecutionOutput};
use crate::dispatch::registry::write_atomically;
use crate::dispatch::scheduler::CommandSpec;
use crate::dispatch::{
    BatchDispatcher, ClusterScheduler, ExecutionType, JobScheduler, LocalPoolScheduler,
    ParallelDispatcher, SequentialDispatcher,
};
use crate::subprocess::{production_runner, ProcessRunner};
use crate::unit::{ProcessUnitEvaluator, UnitEvaluator};

/// Parameters for the run command
pub struct RunParams {
    pub config: PathBuf,
    pub output: Option<PathBuf>,
    pub base_seed: Option<i64>,
}

pub async fn run_controller(params: RunParams) -> Result<()> {
    let mut run = load_run_config(&params.config).await?;
    if let Some(seed) = params.base_seed {
        debug!("Base seed overridden on the command line: {}", seed);
        run.base_seed = seed;
    }
    let config = run.into_controller_config()?;

    let runner = production_runner();
    let evaluator: Arc<dyn UnitEvaluator> = Arc::new(ProcessUnitEvaluator::new(
        run.evaluator.clone(),
        Arc::clone(&runner),
    ));
    let dispatcher = build_dispatcher(&run, Arc::clone(&evaluator), runner).await?;

    let output = ControlLoop::new(config, evaluator, dispatcher).run().await?;
    info!(
        "Run finished: {} after {} units",
        output.termination_reason,
        output.unit_count()
    );
    write_output(&output, params.output.as_deref()).await
}

/// Dispatcher matching the execution type and backend of a run file
pub async fn build_dispatcher(
    run: &RunConfig,
    evaluator: Arc<dyn UnitEvaluator>,
    runner: Arc<dyn ProcessRunner>,
) -> Result<Arc<dyn BatchDispatcher>> {
    if run.execution == ExecutionType::Sequential {
        if !run.batch_policy.is_fail_fast() {
            debug!("Batch policy ignored for sequential execution");
        }
        return Ok(Arc::new(SequentialDispatcher::new(evaluator)));
    }

    let run_id = Uuid::new_v4().to_string();
    let registry = run.backend.registry_for_run(&run_id);
    let mut keep_registry = false;

    let scheduler: Arc<dyn JobScheduler> = match &run.backend {
        BackendConfig::Local { workers, .. } => match workers {
            Some(n) => Arc::new(LocalPoolScheduler::new(evaluator, *n)),
            None => Arc::new(LocalPoolScheduler::with_available_parallelism(evaluator)),
        },
        BackendConfig::Cluster(cluster) => {
            keep_registry = cluster.keep_registry;
            let worker = match &cluster.worker {
                Some(worker) => worker.clone(),
                None => {
                    let exe = std::env::current_exe()
                        .context("Failed to locate the worker executable")?;
                    CommandSpec::new(exe.to_string_lossy())
                }
            };
            let mut scheduler = ClusterScheduler::new(runner, cluster.submit.clone(), worker)
                .with_resources(cluster.resources.clone())
                .with_poll_interval(cluster.poll_interval);
            if let Some(path) = &cluster.template {
                let template = tokio::fs::read_to_string(path)
                    .await
                    .with_context(|| format!("Failed to read job template {}", path.display()))?;
                scheduler = scheduler.with_template(template);
            }
            if let Some(status) = &cluster.status {
                scheduler = scheduler.with_status_command(status.clone());
            }
            Arc::new(scheduler)
        }
    };

    debug!("Run {} uses registry {}", run_id, registry.root().display());
    Ok(Arc::new(
        ParallelDispatcher::new(scheduler, registry)
            .with_policy(run.batch_policy.clone())
            .with_job_context(serde_json::to_value(&run.evaluator)?)
            .keep_registry(keep_registry),
    ))
}

async fn write_output(output: &ExecutionOutput, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(output)?;
    match path {
        Some(path) => write_atomically(path, json.as_bytes())
            .await
            .with_context(|| format!("Failed to write output to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_run_config;
    use crate::config::ConfigFormat;
    use crate::testing::SeedEchoEvaluator;

    const RUN: &str = r#"
min_splits: 3
max_splits: 6
metric: { source: evaluation, name: metric }
stability: { strategy: mean_absolute, window: 2, threshold: { value: 0.1 } }
evaluator: { program: "true" }
"#;

    #[tokio::test]
    async fn test_sequential_dispatcher_for_sequential_runs() {
        let run = parse_run_config(RUN, ConfigFormat::Yaml).unwrap();
        let dispatcher = build_dispatcher(&run, Arc::new(SeedEchoEvaluator::new()), production_runner())
            .await
            .unwrap();
        assert_eq!(dispatcher.execution_type(), ExecutionType::Sequential);
    }

    #[tokio::test]
    async fn test_parallel_dispatcher_for_local_backend() {
        let yaml = format!("{RUN}execution: parallel\nn_per_iteration: 2\nbackend: {{ kind: local, workers: 2 }}\n");
        let run = parse_run_config(&yaml, ConfigFormat::Yaml).unwrap();
        let dispatcher = build_dispatcher(&run, Arc::new(SeedEchoEvaluator::new()), production_runner())
            .await
            .unwrap();
        assert_eq!(dispatcher.execution_type(), ExecutionType::Parallel);
    }

    #[tokio::test]
    async fn test_missing_template_file_is_reported() {
        let yaml = format!(
            "{RUN}execution: parallel\nbackend: {{ kind: cluster, registry_dir: /tmp/x, submit: {{ program: sbatch }}, template: /nonexistent/job.tera }}\n"
        );
        let run = parse_run_config(&yaml, ConfigFormat::Yaml).unwrap();
        let err = build_dispatcher(&run, Arc::new(SeedEchoEvaluator::new()), production_runner())
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("job template"));
    }
}
