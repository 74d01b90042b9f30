//! Descriptive statistics used by the stability strategies
//!
//! All functions accept arbitrary slices. Empty input yields `0.0` rather than
//! `NaN` so that a strategy never produces an unordered stability value.

use serde::{Deserialize, Serialize};

/// Floor applied to denominators
pub const EPSILON: f64 = 1e-8;

/// Consistency constant that makes the MAD estimate the standard deviation of
/// normally distributed data.
pub const MAD_SCALE: f64 = 1.4826;

/// Built-in statistics a stability strategy can compare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Mean,
    Sd,
    Cv,
    Mad,
}

impl Statistic {
    pub fn as_str(&self) -> &'static str {
        match self {
            Statistic::Mean => "mean",
            Statistic::Sd => "sd",
            Statistic::Cv => "cv",
            Statistic::Mad => "mad",
        }
    }

    pub fn compute(&self, values: &[f64]) -> f64 {
        match self {
            Statistic::Mean => mean(values),
            Statistic::Sd => sd(values),
            Statistic::Cv => cv(values),
            Statistic::Mad => mad(values),
        }
    }
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n - 1 denominator)
pub fn sd(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

/// Coefficient of variation, with the mean floored at [`EPSILON`]
pub fn cv(values: &[f64]) -> f64 {
    sd(values) / mean(values).abs().max(EPSILON)
}

pub fn median(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

/// Scaled median absolute deviation
pub fn mad(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let center = median(values);
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    MAD_SCALE * median(&deviations)
}
