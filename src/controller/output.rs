//! Assembly of the final execution output

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::state::MetricHistory;
use crate::dispatch::{ExecutionType, UnitRecord};
use crate::stability::StabilityVerdict;
use crate::unit::{MetricPath, UnitId, UnitResult};

/// Why the control loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TerminationReason {
    Stable,
    MaxIterationsReached,
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TerminationReason::Stable => write!(f, "STABLE"),
            TerminationReason::MaxIterationsReached => write!(f, "MAX_ITERATIONS_REACHED"),
        }
    }
}

/// Everything a run produced, handed to downstream aggregation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionOutput {
    pub execution_type: ExecutionType,
    pub units: BTreeMap<UnitId, UnitResult>,
    /// Always false: the per-unit pipeline already ran inside the controller
    pub continue_workflow: bool,
    pub metric_name: String,
    pub metric_source: String,
    pub metric_history: MetricHistory,
    pub termination_reason: TerminationReason,
    pub used_seeds: Vec<i64>,
    pub iterations: u64,
    pub final_verdict: Option<StabilityVerdict>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl ExecutionOutput {
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn is_stable(&self) -> bool {
        self.termination_reason == TerminationReason::Stable
    }
}

/// Run bookkeeping that is not part of the unit data
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub execution_type: ExecutionType,
    pub iterations: u64,
    pub final_verdict: Option<StabilityVerdict>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Assemble the output of a terminated run
pub fn build(
    units: BTreeMap<UnitId, UnitRecord>,
    history: MetricHistory,
    termination_reason: TerminationReason,
    metric: &MetricPath,
    used_seeds: Vec<i64>,
    summary: RunSummary,
) -> ExecutionOutput {
    ExecutionOutput {
        execution_type: summary.execution_type,
        units: units
            .into_iter()
            .map(|(id, record)| (id, record.result))
            .collect(),
        continue_workflow: false,
        metric_name: metric.name.clone(),
        metric_source: metric.source.clone(),
        metric_history: history,
        termination_reason,
        used_seeds,
        iterations: summary.iterations,
        final_verdict: summary.final_verdict,
        started_at: summary.started_at,
        finished_at: summary.finished_at,
    }
}
