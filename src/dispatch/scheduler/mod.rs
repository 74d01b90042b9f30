//! Worker pool and cluster backends for the parallel dispatcher

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

pub mod cluster;
pub mod local;

pub use cluster::{ClusterScheduler, CommandSpec, ResourceSpec, DEFAULT_JOB_TEMPLATE};
pub use local::LocalPoolScheduler;

use super::JobRegistry;
use crate::error::Result;
use crate::unit::{UnitConfig, UnitId, UnitResult};

/// A unit as submitted to a scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    pub unit: UnitConfig,
    /// Opaque data a remote worker needs to evaluate the unit
    #[serde(default)]
    pub context: serde_json::Value,
}

/// Final state of one submitted job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(UnitResult),
    Failed(String),
    /// The worker task died before reporting, e.g. a panic in the evaluator
    Panicked(String),
}

/// Identifies one submission so that it can be awaited
#[derive(Debug, Clone)]
pub struct SubmissionHandle {
    pub id: Uuid,
    pub units: Vec<UnitId>,
    /// Scheduler-side job ids, when the backend reports them
    pub job_ids: Vec<String>,
}

impl SubmissionHandle {
    pub fn new(units: Vec<UnitId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            units,
            job_ids: Vec::new(),
        }
    }
}

#[async_trait]
pub trait JobScheduler: Send + Sync {
    fn name(&self) -> &str;

    async fn submit(&self, registry: &JobRegistry, jobs: Vec<JobSpec>)
        -> Result<SubmissionHandle>;

    /// Block until every job of the submission resolved
    ///
    /// Units without an entry in the returned map produced no outcome.
    async fn wait(
        &self,
        registry: &JobRegistry,
        handle: &SubmissionHandle,
    ) -> Result<HashMap<UnitId, JobOutcome>>;

    /// Drop all in-flight submissions
    async fn reset(&self) -> Result<()> {
        Ok(())
    }
}
