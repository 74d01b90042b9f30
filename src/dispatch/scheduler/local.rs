use anyhow::anyhow;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::{Id, JoinSet};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{JobOutcome, JobScheduler, JobSpec, SubmissionHandle};
use crate::dispatch::JobRegistry;
use crate::error::{AdaptiveError, Result};
use crate::unit::{UnitEvaluator, UnitId, UnitResult};

type UnitTask = (UnitId, anyhow::Result<UnitResult>);

/// Tasks of one submission plus the unit each task runs, so that a task
/// that dies without returning can still be attributed
struct Submission {
    tasks: JoinSet<UnitTask>,
    units: HashMap<Id, UnitId>,
}

/// Runs jobs as tokio tasks on the local machine, at most `workers` at a time
pub struct LocalPoolScheduler {
    evaluator: Arc<dyn UnitEvaluator>,
    semaphore: Arc<Semaphore>,
    workers: usize,
    in_flight: Mutex<HashMap<Uuid, Submission>>,
}

impl LocalPoolScheduler {
    pub fn new(evaluator: Arc<dyn UnitEvaluator>, workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            evaluator,
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// One worker per available core
    pub fn with_available_parallelism(evaluator: Arc<dyn UnitEvaluator>) -> Self {
        let workers = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self::new(evaluator, workers)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[async_trait]
impl JobScheduler for LocalPoolScheduler {
    fn name(&self) -> &str {
        "local"
    }

    async fn submit(
        &self,
        _registry: &JobRegistry,
        jobs: Vec<JobSpec>,
    ) -> Result<SubmissionHandle> {
        let handle = SubmissionHandle::new(jobs.iter().map(|job| job.unit.unit_id).collect());
        debug!(
            "Submitting {} jobs to local pool ({} workers)",
            jobs.len(),
            self.workers
        );

        let mut tasks = JoinSet::new();
        let mut units = HashMap::with_capacity(jobs.len());
        for job in jobs {
            let unit_id = job.unit.unit_id;
            let evaluator = Arc::clone(&self.evaluator);
            let semaphore = Arc::clone(&self.semaphore);
            let task = tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return (unit_id, Err(anyhow!("worker pool is closed"))),
                };
                (unit_id, evaluator.evaluate(&job.unit).await)
            });
            units.insert(task.id(), unit_id);
        }

        self.in_flight
            .lock()
            .await
            .insert(handle.id, Submission { tasks, units });
        Ok(handle)
    }

    async fn wait(
        &self,
        _registry: &JobRegistry,
        handle: &SubmissionHandle,
    ) -> Result<HashMap<UnitId, JobOutcome>> {
        let Submission { mut tasks, units } =
            self.in_flight.lock().await.remove(&handle.id).ok_or_else(|| {
                AdaptiveError::batch(format!("unknown submission {}", handle.id))
            })?;

        let mut outcomes = HashMap::with_capacity(handle.units.len());
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((unit_id, Ok(result))) => {
                    outcomes.insert(unit_id, JobOutcome::Completed(result));
                }
                Ok((unit_id, Err(e))) => {
                    outcomes.insert(unit_id, JobOutcome::Failed(format!("{e:#}")));
                }
                Err(e) => {
                    warn!("Local worker task failed: {}", e);
                    if let Some(unit_id) = units.get(&e.id()) {
                        outcomes.insert(*unit_id, JobOutcome::Panicked(e.to_string()));
                    }
                }
            }
        }
        Ok(outcomes)
    }

    async fn reset(&self) -> Result<()> {
        let mut in_flight = self.in_flight.lock().await;
        if !in_flight.is_empty() {
            debug!("Aborting {} in-flight local submissions", in_flight.len());
        }
        // dropping a JoinSet aborts its tasks
        in_flight.clear();
        Ok(())
    }
}
