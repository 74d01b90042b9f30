//! On-disk job registry shared between the controller and cluster jobs
//!
//! Layout under the registry root:
//!
//! ```text
//! jobs/<unit>.json      job file (unit configuration + opaque context)
//! jobs/<unit>.sh        rendered job script
//! results/<unit>.json   unit result written by the job
//! results/<unit>.failed failure marker written by the job
//! ```

use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use super::scheduler::{JobOutcome, JobSpec};
use crate::error::{AdaptiveError, ErrorCode, Result};
use crate::unit::{UnitId, UnitResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRegistry {
    root: PathBuf,
}

impl JobRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Registry for one run below a shared base directory
    pub fn for_run(base: &Path, run_id: &str) -> Self {
        Self::new(base.join(run_id))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn results_dir(&self) -> PathBuf {
        self.root.join("results")
    }

    pub fn job_file(&self, unit: &UnitId) -> PathBuf {
        self.jobs_dir().join(format!("{unit}.json"))
    }

    pub fn job_script(&self, unit: &UnitId) -> PathBuf {
        self.jobs_dir().join(format!("{unit}.sh"))
    }

    pub fn result_file(&self, unit: &UnitId) -> PathBuf {
        self.results_dir().join(format!("{unit}.json"))
    }

    pub fn failure_file(&self, unit: &UnitId) -> PathBuf {
        self.results_dir().join(format!("{unit}.failed"))
    }

    /// Wipe any state left by a previous run and recreate the layout
    pub async fn reset(&self) -> Result<()> {
        if fs::try_exists(&self.root).await.map_err(|e| self.io_error(e, &self.root))? {
            debug!("Clearing stale job registry at {}", self.root.display());
            fs::remove_dir_all(&self.root)
                .await
                .map_err(|e| self.io_error(e, &self.root))?;
        }
        for dir in [self.jobs_dir(), self.results_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| self.io_error(e, &dir))?;
        }
        Ok(())
    }

    pub async fn cleanup(&self) -> Result<()> {
        match fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e, &self.root)),
        }
    }

    /// Write the job file for a unit, removing any earlier outcome of it
    pub async fn write_job(&self, job: &JobSpec) -> Result<PathBuf> {
        let unit = job.unit.unit_id;
        for stale in [self.result_file(&unit), self.failure_file(&unit)] {
            if let Err(e) = fs::remove_file(&stale).await {
                if e.kind() != std::io::ErrorKind::NotFound {
                    return Err(self.io_error(e, &stale));
                }
            }
        }

        let path = self.job_file(&unit);
        let body = serde_json::to_vec_pretty(job).map_err(|e| {
            AdaptiveError::storage_with_code(
                ErrorCode::STORAGE_SERIALIZATION_ERROR,
                format!("cannot serialize job for {unit}"),
                Some(path.clone()),
            )
            .with_source(e)
        })?;
        fs::write(&path, body)
            .await
            .map_err(|e| self.io_error(e, &path))?;
        Ok(path)
    }

    /// Read what a job left behind, if it finished
    pub async fn read_outcome(&self, unit: &UnitId) -> Result<Option<JobOutcome>> {
        let result_path = self.result_file(unit);
        match fs::read(&result_path).await {
            Ok(bytes) => {
                return Ok(Some(match serde_json::from_slice::<UnitResult>(&bytes) {
                    Ok(result) => JobOutcome::Completed(result),
                    Err(e) => JobOutcome::Failed(format!("unreadable result file: {e}")),
                }))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(self.io_error(e, &result_path)),
        }

        let failure_path = self.failure_file(unit);
        match fs::read_to_string(&failure_path).await {
            Ok(reason) => {
                let reason = reason.trim();
                Ok(Some(JobOutcome::Failed(if reason.is_empty() {
                    "job reported failure".to_string()
                } else {
                    reason.to_string()
                })))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(self.io_error(e, &failure_path)),
        }
    }

    fn io_error(&self, err: std::io::Error, path: &Path) -> AdaptiveError {
        let code = match err.kind() {
            std::io::ErrorKind::PermissionDenied => ErrorCode::STORAGE_PERMISSION_DENIED,
            std::io::ErrorKind::NotFound => ErrorCode::STORAGE_NOT_FOUND,
            _ => ErrorCode::STORAGE_IO_ERROR,
        };
        AdaptiveError::storage_with_code(code, err.to_string(), Some(path.to_path_buf()))
            .with_source(err)
    }
}

/// Write `bytes` next to `path` and rename into place so pollers never see a
/// partial file
pub async fn write_atomically(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes).await?;
    fs::rename(&tmp, path).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::UnitConfig;
    use serde_json::json;
    use tempfile::TempDir;

    fn job(index: u64) -> JobSpec {
        JobSpec {
            unit: UnitConfig {
                unit_id: UnitId::new(index),
                iteration: 1,
                seed: 7,
                pipeline: json!({}),
            },
            context: json!({"program": "train"}),
        }
    }

    #[tokio::test]
    async fn test_reset_clears_stale_state() {
        let temp = TempDir::new().unwrap();
        let registry = JobRegistry::for_run(temp.path(), "run-1");
        registry.reset().await.unwrap();

        let stale = registry.result_file(&UnitId::new(1));
        std::fs::write(&stale, "{}").unwrap();
        registry.reset().await.unwrap();

        assert!(!stale.exists());
        assert!(registry.jobs_dir().is_dir());
        assert!(registry.results_dir().is_dir());
    }

    #[tokio::test]
    async fn test_outcomes() {
        let temp = TempDir::new().unwrap();
        let registry = JobRegistry::new(temp.path().join("registry"));
        registry.reset().await.unwrap();

        let one = UnitId::new(1);
        let two = UnitId::new(2);
        assert_eq!(registry.read_outcome(&one).await.unwrap(), None);

        write_atomically(&registry.result_file(&one), br#"{"eval": {"dp": 0.3}}"#)
            .await
            .unwrap();
        std::fs::write(registry.failure_file(&two), "exit status 137\n").unwrap();

        assert_eq!(
            registry.read_outcome(&one).await.unwrap(),
            Some(JobOutcome::Completed(UnitResult::new(json!({"eval": {"dp": 0.3}}))))
        );
        assert_eq!(
            registry.read_outcome(&two).await.unwrap(),
            Some(JobOutcome::Failed("exit status 137".to_string()))
        );
    }

    #[tokio::test]
    async fn test_write_job_removes_previous_outcome() {
        let temp = TempDir::new().unwrap();
        let registry = JobRegistry::new(temp.path());
        registry.reset().await.unwrap();

        std::fs::write(registry.failure_file(&UnitId::new(3)), "boom").unwrap();
        let path = registry.write_job(&job(3)).await.unwrap();

        assert!(path.ends_with("jobs/split_3.json"));
        assert_eq!(registry.read_outcome(&UnitId::new(3)).await.unwrap(), None);

        registry.cleanup().await.unwrap();
        assert!(!temp.path().exists());
        registry.cleanup().await.unwrap();
    }
}
