//! Units: one independent execution of the downstream pipeline for a single
//! data split and seed.

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub mod process;
pub mod result;

pub use process::{EvaluatorConfig, ProcessUnitEvaluator};
pub use result::{MetricPath, UnitResult};

use crate::error::{AdaptiveError, Result};

const UNIT_ID_PREFIX: &str = "split_";

/// Identifier of a unit within one controller run
///
/// Ids are 1-based in generation order and compare numerically, so ordering by
/// id reproduces the order in which units were generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UnitId(u64);

impl UnitId {
    pub fn new(index: u64) -> Self {
        Self(index)
    }

    pub fn index(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for UnitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", UNIT_ID_PREFIX, self.0)
    }
}

impl std::str::FromStr for UnitId {
    type Err = AdaptiveError;

    fn from_str(s: &str) -> Result<Self> {
        s.strip_prefix(UNIT_ID_PREFIX)
            .and_then(|n| n.parse::<u64>().ok())
            .map(UnitId)
            .ok_or_else(|| AdaptiveError::invalid_value("unit_id", format!("malformed unit id '{s}'")))
    }
}

impl Serialize for UnitId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for UnitId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Everything a unit evaluator needs to run one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitConfig {
    pub unit_id: UnitId,
    pub iteration: u64,
    pub seed: i64,
    /// Opaque base configuration of the downstream pipeline
    #[serde(default)]
    pub pipeline: serde_json::Value,
}

/// Runs the train/adjust/evaluate pipeline for one split
#[async_trait]
pub trait UnitEvaluator: Send + Sync {
    async fn evaluate(&self, config: &UnitConfig) -> anyhow::Result<UnitResult>;

    /// Number of independent units one split request produces.
    ///
    /// The adaptive controller only accepts evaluators that return 1.
    fn units_per_split(&self) -> usize {
        1
    }
}
