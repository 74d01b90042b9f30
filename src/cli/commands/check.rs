//! Check command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::error::AdaptiveError;
use crate::stability::{StabilityRule, StabilityStrategy, Threshold, ThresholdKind};

/// Parameters for a one-off stability check
pub struct CheckParams {
    pub history: PathBuf,
    pub strategy: String,
    pub window: usize,
    pub threshold: f64,
    pub threshold_kind: ThresholdKind,
}

/// Print the stability verdict of a recorded metric history as JSON
pub async fn run_check(params: CheckParams) -> Result<()> {
    let raw = tokio::fs::read_to_string(&params.history)
        .await
        .with_context(|| format!("Failed to read history {}", params.history.display()))?;
    let history: Vec<f64> = serde_json::from_str(&raw).map_err(AdaptiveError::from)?;

    let strategy: StabilityStrategy = params.strategy.parse()?;
    let threshold = Threshold {
        kind: params.threshold_kind,
        value: params.threshold,
    };
    threshold.validate()?;

    let verdict = StabilityRule::new(strategy, params.window, threshold).check(&history)?;
    println!("{}", serde_json::to_string_pretty(&verdict)?);
    Ok(())
}
