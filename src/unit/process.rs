//! Unit evaluator backed by an external command
//!
//! The command receives the unit configuration as JSON on stdin and the seed
//! in `SPLIT_SEED`, and must print the unit result as JSON on stdout.

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{UnitConfig, UnitEvaluator, UnitResult};
use crate::subprocess::{ProcessCommandBuilder, ProcessRunner};

pub const SEED_ENV: &str = "SPLIT_SEED";
pub const UNIT_ID_ENV: &str = "SPLIT_UNIT_ID";
pub const ITERATION_ENV: &str = "SPLIT_ITERATION";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Per-unit wall clock limit, e.g. "15m"
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
}

impl EvaluatorConfig {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            working_dir: None,
            timeout: None,
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
}

pub struct ProcessUnitEvaluator {
    config: EvaluatorConfig,
    runner: Arc<dyn ProcessRunner>,
}

impl ProcessUnitEvaluator {
    pub fn new(config: EvaluatorConfig, runner: Arc<dyn ProcessRunner>) -> Self {
        Self { config, runner }
    }

    /// Parse the whole stdout as JSON, falling back to its last non-empty line
    /// so that commands may log before printing their result.
    fn parse_result(stdout: &str) -> anyhow::Result<UnitResult> {
        if let Ok(value) = serde_json::from_str::<serde_json::Value>(stdout) {
            return Ok(UnitResult::new(value));
        }

        let last_line = stdout
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .ok_or_else(|| anyhow!("evaluator printed no result"))?;
        let value = serde_json::from_str::<serde_json::Value>(last_line)
            .with_context(|| format!("evaluator output is not JSON: {}", last_line.trim()))?;
        Ok(UnitResult::new(value))
    }
}

#[async_trait]
impl UnitEvaluator for ProcessUnitEvaluator {
    async fn evaluate(&self, config: &UnitConfig) -> anyhow::Result<UnitResult> {
        let stdin = serde_json::to_string(config)?;
        let command = ProcessCommandBuilder::new(&self.config.program)
            .args(self.config.args.iter().cloned())
            .envs(&self.config.env)
            .env(SEED_ENV, config.seed)
            .env(UNIT_ID_ENV, config.unit_id)
            .env(ITERATION_ENV, config.iteration)
            .working_dir(self.config.working_dir.clone())
            .maybe_timeout(self.config.timeout)
            .stdin(stdin)
            .build();

        let output = self
            .runner
            .run(command)
            .await
            .with_context(|| format!("failed to run evaluator for {}", config.unit_id))?;

        if !output.status.success() {
            let stderr = output.stderr.trim();
            return Err(anyhow!(
                "evaluator for {} failed with {}{}",
                config.unit_id,
                output.status,
                if stderr.is_empty() {
                    String::new()
                } else {
                    format!(": {stderr}")
                }
            ));
        }

        Self::parse_result(&output.stdout)
            .with_context(|| format!("invalid result for {}", config.unit_id))
    }
}
