//! Batch scheduler backend for HPC clusters
//!
//! Every unit becomes one job: a job file in the registry plus a shell script
//! rendered from a tera template. The script is handed to the configured
//! submit command (`sbatch`, `qsub`, ...). Completion is detected by polling
//! the registry for the result or failure file the job leaves behind. With a
//! status command configured, a job that leaves the queue without either file
//! (killed for walltime or memory, lost with its node) counts as failed.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tera::{Context, Tera};
use tracing::{debug, info, warn};

use super::{JobOutcome, JobScheduler, JobSpec, SubmissionHandle};
use crate::dispatch::JobRegistry;
use crate::error::{AdaptiveError, ErrorCode, Result};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};
use crate::unit::UnitId;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Placeholder for the job id in status command arguments
pub const JOB_ID_PLACEHOLDER: &str = "{id}";

/// Job script used when no template file is configured
///
/// The worker writes the result file itself; a non-zero exit leaves a
/// failure marker instead.
pub const DEFAULT_JOB_TEMPLATE: &str = r#"#!/bin/sh
# {{ unit_id }} iteration={{ iteration }} seed={{ seed }}
{% for key, value in resources -%}
# resource {{ key }}={{ value }}
{% endfor -%}
{{ worker }} run-unit --job {{ job_file }} --output {{ result_file }} || echo "{{ unit_id }} exited with status $?" > {{ failure_file }}
"#;

/// A program plus leading arguments
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Shell-quoted command line
    pub fn to_shell(&self) -> String {
        shell_words::join(std::iter::once(&self.program).chain(self.args.iter()))
    }

    /// Arguments with `{id}` replaced by `job_id`; the id is appended when no
    /// argument mentions it
    fn args_for_job(&self, job_id: &str) -> Vec<String> {
        let mut args: Vec<String> = self
            .args
            .iter()
            .map(|arg| arg.replace(JOB_ID_PLACEHOLDER, job_id))
            .collect();
        if !self.args.iter().any(|arg| arg.contains(JOB_ID_PLACEHOLDER)) {
            args.push(job_id.to_string());
        }
        args
    }
}

/// Resources requested per job, exposed to the job template
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub walltime: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ResourceSpec {
    fn as_pairs(&self) -> BTreeMap<String, String> {
        let mut pairs = self.extra.clone();
        if let Some(cpus) = self.cpus {
            pairs.insert("cpus".to_string(), cpus.to_string());
        }
        if let Some(memory) = &self.memory {
            pairs.insert("memory".to_string(), memory.clone());
        }
        if let Some(walltime) = &self.walltime {
            pairs.insert("walltime".to_string(), walltime.clone());
        }
        pairs
    }
}

pub struct ClusterScheduler {
    runner: Arc<dyn ProcessRunner>,
    submit: CommandSpec,
    worker: CommandSpec,
    status: Option<CommandSpec>,
    template: String,
    resources: ResourceSpec,
    poll_interval: Duration,
}

impl ClusterScheduler {
    pub fn new(runner: Arc<dyn ProcessRunner>, submit: CommandSpec, worker: CommandSpec) -> Self {
        Self {
            runner,
            submit,
            worker,
            status: None,
            template: DEFAULT_JOB_TEMPLATE.to_string(),
            resources: ResourceSpec::default(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_template(mut self, template: impl Into<String>) -> Self {
        self.template = template.into();
        self
    }

    pub fn with_resources(mut self, resources: ResourceSpec) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Command listing a job while it is queued or running, e.g.
    /// `squeue -h -j {id}`
    ///
    /// Empty output or a non-zero exit means the job has left the queue.
    pub fn with_status_command(mut self, status: CommandSpec) -> Self {
        self.status = Some(status);
        self
    }

    async fn is_queued(&self, status: &CommandSpec, job_id: &str) -> Result<bool> {
        let command = ProcessCommandBuilder::new(&status.program)
            .args(status.args_for_job(job_id))
            .build();
        let output = self.runner.run(command).await?;
        Ok(output.status.success() && !output.stdout.trim().is_empty())
    }

    /// Render the job script for one unit
    pub fn render_script(&self, registry: &JobRegistry, job: &JobSpec) -> Result<String> {
        let unit = &job.unit.unit_id;
        let mut context = Context::new();
        context.insert("unit_id", &unit.to_string());
        context.insert("iteration", &job.unit.iteration);
        context.insert("seed", &job.unit.seed);
        context.insert("worker", &self.worker.to_shell());
        context.insert("job_file", &quote_path(&registry.job_file(unit)));
        context.insert("result_file", &quote_path(&registry.result_file(unit)));
        context.insert("failure_file", &quote_path(&registry.failure_file(unit)));
        context.insert("resources", &self.resources.as_pairs());

        Ok(Tera::one_off(&self.template, &context, false)?)
    }

    async fn submit_one(&self, registry: &JobRegistry, job: JobSpec) -> Result<String> {
        let unit = job.unit.unit_id;
        registry.write_job(&job).await?;

        let script_path = registry.job_script(&unit);
        let script = self.render_script(registry, &job)?;
        tokio::fs::write(&script_path, script).await.map_err(|e| {
            AdaptiveError::storage_with_code(
                ErrorCode::STORAGE_IO_ERROR,
                "cannot write job script",
                Some(script_path.clone()),
            )
            .with_source(e)
        })?;
        make_executable(&script_path).await?;

        let command = ProcessCommandBuilder::new(&self.submit.program)
            .args(&self.submit.args)
            .arg(script_path.to_string_lossy())
            .build();
        let rendered = command.display();
        let output = self.runner.run(command).await.map_err(|e| {
            AdaptiveError::batch_with_code(
                ErrorCode::BATCH_SUBMISSION_FAILED,
                format!("cannot run submit command '{rendered}'"),
            )
            .with_unit(unit)
            .with_iteration(job.unit.iteration)
            .with_source(e)
        })?;

        if !output.status.success() {
            return Err(AdaptiveError::batch_with_code(
                ErrorCode::BATCH_SUBMISSION_FAILED,
                format!(
                    "submit command '{}' failed with {}: {}",
                    rendered,
                    output.status,
                    output.stderr.trim()
                ),
            )
            .with_unit(unit)
            .with_iteration(job.unit.iteration));
        }

        let job_id = output
            .stdout
            .split_whitespace()
            .last()
            .map(str::to_string)
            .unwrap_or_else(|| unit.to_string());
        debug!("Submitted {} as job {}", unit, job_id);
        Ok(job_id)
    }
}

#[async_trait]
impl JobScheduler for ClusterScheduler {
    fn name(&self) -> &str {
        "cluster"
    }

    async fn submit(
        &self,
        registry: &JobRegistry,
        jobs: Vec<JobSpec>,
    ) -> Result<SubmissionHandle> {
        let mut handle = SubmissionHandle::new(jobs.iter().map(|job| job.unit.unit_id).collect());
        info!(
            "Submitting {} jobs with '{}'",
            jobs.len(),
            self.submit.program
        );

        let submissions = jobs.into_iter().map(|job| self.submit_one(registry, job));
        handle.job_ids = futures::future::try_join_all(submissions).await?;
        Ok(handle)
    }

    async fn wait(
        &self,
        registry: &JobRegistry,
        handle: &SubmissionHandle,
    ) -> Result<HashMap<UnitId, JobOutcome>> {
        let mut outcomes = HashMap::with_capacity(handle.units.len());
        loop {
            for unit in &handle.units {
                if outcomes.contains_key(unit) {
                    continue;
                }
                if let Some(outcome) = registry.read_outcome(unit).await? {
                    outcomes.insert(*unit, outcome);
                }
            }

            if let Some(status) = &self.status {
                for (unit, job_id) in handle.units.iter().zip(&handle.job_ids) {
                    if outcomes.contains_key(unit) || self.is_queued(status, job_id).await? {
                        continue;
                    }
                    // the job may have finished between the two checks
                    let outcome = match registry.read_outcome(unit).await? {
                        Some(outcome) => outcome,
                        None => {
                            warn!("Job {} of {} left the queue without a result", job_id, unit);
                            JobOutcome::Failed(format!(
                                "job {job_id} left the queue without a result"
                            ))
                        }
                    };
                    outcomes.insert(*unit, outcome);
                }
            }

            if outcomes.len() == handle.units.len() {
                return Ok(outcomes);
            }
            debug!(
                "{}/{} jobs of submission {} finished",
                outcomes.len(),
                handle.units.len(),
                handle.id
            );
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn quote_path(path: &Path) -> String {
    shell_words::quote(&path.to_string_lossy()).into_owned()
}

#[cfg(unix)]
async fn make_executable(path: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;

    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
        .await
        .map_err(|e| {
            AdaptiveError::storage_with_code(
                ErrorCode::STORAGE_PERMISSION_DENIED,
                "cannot mark job script executable",
                Some(path.to_path_buf()),
            )
            .with_source(e)
        })
}

#[cfg(not(unix))]
async fn make_executable(_path: &Path) -> Result<()> {
    Ok(())
}
