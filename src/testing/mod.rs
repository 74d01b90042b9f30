//! Deterministic unit evaluators for tests
//!
//! Every stub reports its metric under [`metric_path`].

use anyhow::anyhow;
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::unit::{MetricPath, UnitConfig, UnitEvaluator, UnitResult};

pub const METRIC_SOURCE: &str = "evaluation";
pub const METRIC_NAME: &str = "metric";

pub fn metric_path() -> MetricPath {
    MetricPath::new(METRIC_SOURCE, METRIC_NAME)
}

fn metric_result(config: &UnitConfig, metric: f64) -> UnitResult {
    UnitResult::new(json!({
        METRIC_SOURCE: { METRIC_NAME: metric },
        "split": { "unit_id": config.unit_id.to_string(), "seed": config.seed },
    }))
}

/// Reports the seed itself as the metric and records every seed it saw
#[derive(Default)]
pub struct SeedEchoEvaluator {
    seen: Mutex<Vec<i64>>,
}

impl SeedEchoEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seen_seeds(&self) -> Vec<i64> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl UnitEvaluator for SeedEchoEvaluator {
    async fn evaluate(&self, config: &UnitConfig) -> anyhow::Result<UnitResult> {
        self.seen.lock().unwrap().push(config.seed);
        Ok(metric_result(config, config.seed as f64))
    }
}

/// Computes the metric from the seed with a pure function
pub struct ScriptedEvaluator<F> {
    metric: F,
    delay: Option<Duration>,
}

impl<F> ScriptedEvaluator<F>
where
    F: Fn(i64) -> f64 + Send + Sync,
{
    pub fn new(metric: F) -> Self {
        Self {
            metric,
            delay: None,
        }
    }

    /// Sleep before answering, used to shuffle completion order in pools
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl<F> UnitEvaluator for ScriptedEvaluator<F>
where
    F: Fn(i64) -> f64 + Send + Sync,
{
    async fn evaluate(&self, config: &UnitConfig) -> anyhow::Result<UnitResult> {
        if let Some(delay) = self.delay {
            // later units finish first
            let factor = 1 + (10 - (config.unit_id.index() % 10)) as u32;
            tokio::time::sleep(delay * factor).await;
        }
        Ok(metric_result(config, (self.metric)(config.seed)))
    }
}

/// Fails for selected seeds, optionally only for the first few attempts
pub struct FailingEvaluator {
    fail_seeds: HashSet<i64>,
    failures_per_seed: Option<usize>,
    attempts: Mutex<HashMap<i64, usize>>,
    calls: AtomicUsize,
}

impl FailingEvaluator {
    pub fn on_seeds(seeds: impl IntoIterator<Item = i64>) -> Self {
        Self {
            fail_seeds: seeds.into_iter().collect(),
            failures_per_seed: None,
            attempts: Mutex::new(HashMap::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Fail each selected seed `n` times, then succeed
    pub fn recovering_after(mut self, n: usize) -> Self {
        self.failures_per_seed = Some(n);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UnitEvaluator for FailingEvaluator {
    async fn evaluate(&self, config: &UnitConfig) -> anyhow::Result<UnitResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_seeds.contains(&config.seed) {
            let mut attempts = self.attempts.lock().unwrap();
            let seen = attempts.entry(config.seed).or_insert(0);
            *seen += 1;
            let should_fail = match self.failures_per_seed {
                Some(limit) => *seen <= limit,
                None => true,
            };
            if should_fail {
                return Err(anyhow!("training diverged for seed {}", config.seed));
            }
        }
        Ok(metric_result(config, config.seed as f64))
    }
}

/// Pretends every split request yields several units
pub struct MultiUnitEvaluator {
    pub units: usize,
}

#[async_trait]
impl UnitEvaluator for MultiUnitEvaluator {
    async fn evaluate(&self, config: &UnitConfig) -> anyhow::Result<UnitResult> {
        Ok(metric_result(config, 0.0))
    }

    fn units_per_split(&self) -> usize {
        self.units
    }
}
