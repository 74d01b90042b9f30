//! Worker entry point for cluster jobs

use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::dispatch::registry::write_atomically;
use crate::dispatch::JobSpec;
use crate::subprocess::production_runner;
use crate::unit::{EvaluatorConfig, ProcessUnitEvaluator, UnitEvaluator};

/// Evaluate the unit of a job file and write its result
///
/// The job context must hold the evaluator configuration of the run.
pub async fn run_unit(job: &Path, output: &Path) -> Result<()> {
    let raw = tokio::fs::read_to_string(job)
        .await
        .with_context(|| format!("Failed to read job file {}", job.display()))?;
    let spec: JobSpec = serde_json::from_str(&raw)
        .with_context(|| format!("Malformed job file {}", job.display()))?;
    let evaluator_config: EvaluatorConfig = serde_json::from_value(spec.context.clone())
        .context("Job file carries no evaluator configuration")?;

    info!(
        "Evaluating {} (iteration {}, seed {})",
        spec.unit.unit_id, spec.unit.iteration, spec.unit.seed
    );
    let evaluator = ProcessUnitEvaluator::new(evaluator_config, production_runner());
    let result = evaluator.evaluate(&spec.unit).await?;

    write_atomically(output, &serde_json::to_vec(&result)?)
        .await
        .with_context(|| format!("Failed to write result {}", output.display()))
}
