use serde::{Deserialize, Serialize};

use super::stats::{self, EPSILON};
use crate::error::{AdaptiveError, Result};

/// How the configured threshold value turns into the number a stability value
/// is compared against
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThresholdKind {
    /// The configured value is the threshold.
    #[default]
    Absolute,
    /// The configured value is a fraction of the overall metric level.
    Relative,
    /// The configured value is a multiple of the metric's standard deviation.
    #[serde(alias = "sd")]
    DerivedFromSd,
}

impl std::str::FromStr for ThresholdKind {
    type Err = AdaptiveError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "absolute" => Ok(Self::Absolute),
            "relative" => Ok(Self::Relative),
            "derived_from_sd" | "sd" => Ok(Self::DerivedFromSd),
            _ => Err(AdaptiveError::invalid_value(
                "threshold.kind",
                format!("unknown threshold kind '{s}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Threshold {
    #[serde(default)]
    pub kind: ThresholdKind,
    pub value: f64,
}

impl Threshold {
    pub fn absolute(value: f64) -> Self {
        Self {
            kind: ThresholdKind::Absolute,
            value,
        }
    }

    pub fn relative(value: f64) -> Self {
        Self {
            kind: ThresholdKind::Relative,
            value,
        }
    }

    pub fn derived_from_sd(value: f64) -> Self {
        Self {
            kind: ThresholdKind::DerivedFromSd,
            value,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.value.is_finite() || self.value < 0.0 {
            return Err(AdaptiveError::invalid_value(
                "threshold.value",
                format!(
                    "threshold must be a finite, non-negative number, got {}",
                    self.value
                ),
            ));
        }
        Ok(())
    }

    /// Resolve the threshold against the full metric history
    pub fn resolve(&self, history: &[f64]) -> f64 {
        match self.kind {
            ThresholdKind::Absolute => self.value,
            ThresholdKind::Relative => self.value * stats::mean(history).abs().max(EPSILON),
            ThresholdKind::DerivedFromSd => self.value * stats::sd(history),
        }
    }
}
