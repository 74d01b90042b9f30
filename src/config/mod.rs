//! Run configuration
//!
//! A run file describes one controller invocation: the stopping rule, the
//! metric to monitor, the unit evaluator command and the execution backend.
//!
//! ```yaml
//! execution: parallel
//! base_seed: 1000
//! min_splits: 10
//! max_splits: 200
//! n_per_iteration: 8
//! metric: { source: evaluation, name: demographic_parity }
//! stability:
//!   strategy: mean_relative
//!   window: 5
//!   threshold: { kind: relative, value: 0.02 }
//! evaluator:
//!   program: python
//!   args: [pipeline.py]
//! backend:
//!   kind: local
//!   workers: 8
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub mod loader;

pub use loader::{load_run_config, parse_run_config, ConfigFormat};

use crate::controller::ControllerConfig;
use crate::dispatch::scheduler::{CommandSpec, ResourceSpec};
use crate::dispatch::{BatchPolicy, ExecutionType, JobRegistry};
use crate::error::{AdaptiveError, Result};
use crate::stability::{StabilityRule, StabilityStrategy, Threshold, ThresholdKind};
use crate::unit::{EvaluatorConfig, MetricPath};

/// Directory below the system temp dir used when no registry is configured
pub const DEFAULT_REGISTRY_DIR: &str = "adaptive-splits";

fn default_n_per_iteration() -> usize {
    1
}

fn default_poll_interval() -> Duration {
    crate::dispatch::scheduler::cluster::DEFAULT_POLL_INTERVAL
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub execution: ExecutionType,
    #[serde(default)]
    pub base_seed: i64,
    pub min_splits: usize,
    pub max_splits: usize,
    #[serde(default = "default_n_per_iteration")]
    pub n_per_iteration: usize,
    pub metric: MetricPath,
    pub stability: StabilityConfig,
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub batch_policy: BatchPolicy,
    /// Forwarded verbatim to every unit
    #[serde(default)]
    pub pipeline: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    pub strategy: String,
    pub window: usize,
    #[serde(default)]
    pub threshold: Option<ThresholdConfig>,
}

/// Threshold as written in a run file; the value is mandatory but checked
/// after parsing so that its absence is reported by field name
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub kind: ThresholdKind,
    #[serde(default)]
    pub value: Option<f64>,
}

/// Where parallel batches run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Local {
        /// Defaults to the number of available cores
        #[serde(default)]
        workers: Option<usize>,
        #[serde(default)]
        registry_dir: Option<PathBuf>,
    },
    Cluster(ClusterConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Local {
            workers: None,
            registry_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Must be reachable from the cluster nodes
    pub registry_dir: PathBuf,
    pub submit: CommandSpec,
    /// Job script template file; the built-in template is used when absent
    #[serde(default)]
    pub template: Option<PathBuf>,
    #[serde(default)]
    pub resources: ResourceSpec,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Worker command on the nodes; defaults to this executable
    #[serde(default)]
    pub worker: Option<CommandSpec>,
    /// Queue lookup for one job, e.g. `squeue -h -j {id}`; without it a job
    /// killed by the cluster is only noticed through `batch_policy.timeout`
    #[serde(default)]
    pub status: Option<CommandSpec>,
    #[serde(default)]
    pub keep_registry: bool,
}

impl BackendConfig {
    fn registry_base(&self) -> PathBuf {
        match self {
            BackendConfig::Local {
                registry_dir: Some(dir),
                ..
            } => dir.clone(),
            BackendConfig::Local { .. } => std::env::temp_dir().join(DEFAULT_REGISTRY_DIR),
            BackendConfig::Cluster(cluster) => cluster.registry_dir.clone(),
        }
    }

    /// Registry of one run, isolated from concurrent runs sharing the base
    pub fn registry_for_run(&self, run_id: &str) -> JobRegistry {
        JobRegistry::for_run(&self.registry_base(), run_id)
    }
}

impl StabilityConfig {
    pub fn threshold(&self) -> Result<Threshold> {
        let threshold = self
            .threshold
            .as_ref()
            .ok_or_else(|| AdaptiveError::missing_field("stability.threshold"))?;
        let value = threshold
            .value
            .ok_or_else(|| AdaptiveError::missing_field("stability.threshold.value"))?;
        Ok(Threshold {
            kind: threshold.kind,
            value,
        })
    }

    pub fn rule(&self) -> Result<StabilityRule> {
        let strategy: StabilityStrategy = self.strategy.parse()?;
        Ok(StabilityRule::new(strategy, self.window, self.threshold()?))
    }
}

impl RunConfig {
    /// Validate and convert into the immutable controller configuration
    pub fn into_controller_config(&self) -> Result<ControllerConfig> {
        let config = ControllerConfig {
            execution: self.execution,
            base_seed: self.base_seed,
            min_splits: self.min_splits,
            max_splits: self.max_splits,
            n_per_iteration: self.n_per_iteration,
            rule: self.stability.rule()?,
            metric: self.metric.clone(),
            pipeline: self.pipeline.clone(),
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    const MINIMAL: &str = r#"
min_splits: 4
max_splits: 10
metric: { source: evaluation, name: dp }
stability:
  strategy: mean_absolute
  window: 3
  threshold: { value: 0.05 }
evaluator:
  program: ./pipeline
"#;

    #[test]
    fn test_minimal_config_defaults() {
        let config: RunConfig = serde_yaml::from_str(MINIMAL).unwrap();
        assert_eq!(config.execution, ExecutionType::Sequential);
        assert_eq!(config.n_per_iteration, 1);
        assert_eq!(config.backend, BackendConfig::default());
        assert!(config.batch_policy.is_fail_fast());

        let controller = config.into_controller_config().unwrap();
        assert_eq!(controller.rule.threshold, Threshold::absolute(0.05));
        assert_eq!(controller.rule.strategy.id(), "mean_absolute");
    }

    #[test]
    fn test_missing_threshold_value_names_the_field() {
        let yaml = MINIMAL.replace("{ value: 0.05 }", "{ kind: relative }");
        let config: RunConfig = serde_yaml::from_str(&yaml).unwrap();

        let err = config.into_controller_config().unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_MISSING_REQUIRED);
        assert!(err.user_message().contains("stability.threshold.value"));
    }

    #[test]
    fn test_unknown_strategy() {
        let yaml = MINIMAL.replace("mean_absolute", "median_absolute");
        let config: RunConfig = serde_yaml::from_str(&yaml).unwrap();

        let err = config.into_controller_config().unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_UNKNOWN_STRATEGY);
    }

    #[test]
    fn test_sd_threshold_alias() {
        let yaml = MINIMAL.replace("{ value: 0.05 }", "{ kind: sd, value: 0.5 }");
        let config: RunConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(
            config.stability.threshold().unwrap(),
            Threshold::derived_from_sd(0.5)
        );
    }

    #[test]
    fn test_cluster_backend() {
        let yaml = format!(
            "{MINIMAL}execution: parallel\nn_per_iteration: 4\nbackend:\n  kind: cluster\n  registry_dir: /shared/runs\n  submit: {{ program: sbatch, args: [--parsable] }}\n  poll_interval: 30s\n  resources: {{ cpus: 4, walltime: '02:00:00', partition: short }}\n  status: {{ program: squeue, args: [-h, -j, '{{id}}'] }}\n"
        );
        let config: RunConfig = serde_yaml::from_str(&yaml).unwrap();

        match &config.backend {
            BackendConfig::Cluster(cluster) => {
                assert_eq!(cluster.poll_interval, Duration::from_secs(30));
                assert_eq!(cluster.submit.args, vec!["--parsable"]);
                assert_eq!(cluster.resources.cpus, Some(4));
                assert_eq!(cluster.resources.extra["partition"], "short");
                assert!(cluster.worker.is_none());
                assert_eq!(
                    cluster.status,
                    Some(CommandSpec::new("squeue").with_args(["-h", "-j", "{id}"]))
                );
            }
            other => panic!("expected cluster backend, got {other:?}"),
        }
        assert_eq!(
            config.backend.registry_for_run("abc").root(),
            std::path::Path::new("/shared/runs/abc")
        );
    }
}
