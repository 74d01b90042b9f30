use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use super::stats::{self, Statistic, EPSILON};
use super::threshold::Threshold;
use super::StabilityVerdict;
use crate::error::{AdaptiveError, Result};

/// How the window statistic is compared with the global statistic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaMode {
    Absolute,
    Relative,
}

impl DeltaMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeltaMode::Absolute => "absolute",
            DeltaMode::Relative => "relative",
        }
    }

    pub fn apply(&self, global: f64, window: f64) -> f64 {
        let absolute = (window - global).abs();
        match self {
            DeltaMode::Absolute => absolute,
            DeltaMode::Relative => absolute / global.abs().max(EPSILON),
        }
    }
}

/// A user supplied statistic for [`StabilityStrategy::Custom`]
///
/// The returned value must be a single finite JSON number.
pub trait CustomStatistic: Send + Sync {
    fn name(&self) -> &str;

    fn compute(&self, values: &[f64]) -> serde_json::Value;
}

/// Adapts a closure into a [`CustomStatistic`]
pub struct FnStatistic<F> {
    name: String,
    func: F,
}

impl<F> FnStatistic<F>
where
    F: Fn(&[f64]) -> serde_json::Value + Send + Sync,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }
}

impl<F> CustomStatistic for FnStatistic<F>
where
    F: Fn(&[f64]) -> serde_json::Value + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn compute(&self, values: &[f64]) -> serde_json::Value {
        (self.func)(values)
    }
}

/// The closed set of stability strategies
#[derive(Clone)]
pub enum StabilityStrategy {
    /// Compare a built-in statistic over the trailing window with the same
    /// statistic over the whole history.
    Statistic { statistic: Statistic, delta: DeltaMode },
    /// Cohen's d between the trailing window and everything before it.
    CohenAbsolute,
    Custom {
        statistic: Arc<dyn CustomStatistic>,
        delta: DeltaMode,
    },
}

impl StabilityStrategy {
    pub fn new(statistic: Statistic, delta: DeltaMode) -> Self {
        Self::Statistic { statistic, delta }
    }

    pub fn custom(statistic: Arc<dyn CustomStatistic>, delta: DeltaMode) -> Self {
        Self::Custom { statistic, delta }
    }

    /// Identifier reported in verdicts, e.g. `mean_absolute`
    pub fn id(&self) -> String {
        match self {
            Self::Statistic { statistic, delta } => {
                format!("{}_{}", statistic.as_str(), delta.as_str())
            }
            Self::CohenAbsolute => "cohen_absolute".to_string(),
            Self::Custom { delta, .. } => format!("custom_{}", delta.as_str()),
        }
    }

    /// Evaluate this strategy over `history` with a trailing `window`
    pub fn evaluate(
        &self,
        history: &[f64],
        window: usize,
        threshold: &Threshold,
    ) -> Result<StabilityVerdict> {
        if window == 0 {
            return Err(AdaptiveError::invalid_value(
                "stability.window",
                "window must be at least 1",
            ));
        }
        let required = window + 1;
        if history.len() < required {
            return Err(AdaptiveError::insufficient_data(required, history.len()));
        }

        let recent = &history[history.len() - window..];
        let stability_value = match self {
            Self::Statistic { statistic, delta } => {
                delta.apply(statistic.compute(history), statistic.compute(recent))
            }
            Self::CohenAbsolute => cohen_d(history, window),
            Self::Custom { statistic, delta } => {
                let global = self.custom_scalar(statistic.as_ref(), history)?;
                let local = self.custom_scalar(statistic.as_ref(), recent)?;
                delta.apply(global, local)
            }
        };

        let threshold_value = threshold.resolve(history);
        Ok(StabilityVerdict {
            is_stable: stability_value < threshold_value,
            stability_value,
            threshold_value,
            strategy: self.id(),
        })
    }

    fn custom_scalar(&self, statistic: &dyn CustomStatistic, values: &[f64]) -> Result<f64> {
        let raw = statistic.compute(values);
        match raw.as_f64() {
            Some(v) if v.is_finite() => Ok(v),
            Some(v) => Err(AdaptiveError::invalid_custom_result(
                statistic.name(),
                format!("{} returned non-finite value {}", self.id(), v),
            )),
            None => Err(AdaptiveError::invalid_custom_result(
                statistic.name(),
                format!("{} must return a single number, got {}", self.id(), raw),
            )),
        }
    }
}

/// Cohen's d between the trailing window and the values before it.
///
/// Returns `+inf` (never stable) when fewer than two values precede the window.
fn cohen_d(history: &[f64], window: usize) -> f64 {
    let split = history.len() - window;
    let (rest, recent) = history.split_at(split);
    if rest.len() < 2 {
        return f64::INFINITY;
    }

    let sd_recent = stats::sd(recent);
    let sd_rest = stats::sd(rest);
    let pooled = ((sd_recent.powi(2) + sd_rest.powi(2)) / 2.0)
        .sqrt()
        .max(EPSILON);

    (stats::mean(recent) - stats::mean(rest)).abs() / pooled
}

impl fmt::Debug for StabilityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Custom { statistic, delta } => f
                .debug_struct("Custom")
                .field("statistic", &statistic.name())
                .field("delta", delta)
                .finish(),
            other => f.write_str(&other.id()),
        }
    }
}

impl fmt::Display for StabilityStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

impl std::str::FromStr for StabilityStrategy {
    type Err = AdaptiveError;

    fn from_str(s: &str) -> Result<Self> {
        let id = s.trim().to_lowercase();
        if id == "cohen_absolute" {
            return Ok(Self::CohenAbsolute);
        }

        let (stat, delta) = id
            .rsplit_once('_')
            .ok_or_else(|| AdaptiveError::unknown_strategy(s))?;
        let delta = match delta {
            "absolute" => DeltaMode::Absolute,
            "relative" => DeltaMode::Relative,
            _ => return Err(AdaptiveError::unknown_strategy(s)),
        };
        let statistic = match stat {
            "mean" => Statistic::Mean,
            "sd" => Statistic::Sd,
            "cv" => Statistic::Cv,
            "mad" => Statistic::Mad,
            "custom" => {
                return Err(AdaptiveError::invalid_value(
                    "stability.strategy",
                    format!("'{s}' needs a statistic function and must be built in code"),
                ))
            }
            _ => return Err(AdaptiveError::unknown_strategy(s)),
        };

        Ok(Self::Statistic { statistic, delta })
    }
}
