use serde::{Deserialize, Serialize};

use crate::error::{AdaptiveError, ErrorCode, Result};

/// Where the monitored metric lives inside a unit result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricPath {
    /// Top-level section of the result, e.g. the evaluation stage name
    pub source: String,
    pub name: String,
}

impl MetricPath {
    pub fn new(source: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for MetricPath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.source, self.name)
    }
}

/// Opaque payload produced by a unit evaluator
///
/// Only the configured metric is ever read; the rest is passed through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnitResult(serde_json::Value);

impl UnitResult {
    pub fn new(payload: serde_json::Value) -> Self {
        Self(payload)
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_payload(self) -> serde_json::Value {
        self.0
    }

    /// Look up `result[source][name]` as a finite number
    pub fn metric(&self, path: &MetricPath) -> Result<f64> {
        let raw = self
            .0
            .get(&path.source)
            .and_then(|section| section.get(&path.name))
            .ok_or_else(|| {
                AdaptiveError::config_with_code(
                    ErrorCode::CONFIG_METRIC_PATH,
                    format!("unit result has no metric '{path}'"),
                )
            })?;

        match raw.as_f64() {
            Some(value) if value.is_finite() => Ok(value),
            _ => Err(AdaptiveError::config_with_code(
                ErrorCode::CONFIG_METRIC_PATH,
                format!("metric '{path}' is not a finite number: {raw}"),
            )),
        }
    }
}

impl From<serde_json::Value> for UnitResult {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_metric_lookup() {
        let result = UnitResult::new(json!({
            "fairness": {"demographic_parity": 0.12, "note": "ok"},
            "performance": {"auc": 0.81}
        }));
        let path = MetricPath::new("fairness", "demographic_parity");
        assert_eq!(result.metric(&path).unwrap(), 0.12);
    }

    #[test]
    fn test_metric_missing_or_non_numeric() {
        let result = UnitResult::new(json!({"fairness": {"note": "ok"}}));
        let err = result
            .metric(&MetricPath::new("fairness", "dp"))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::CONFIG_METRIC_PATH);

        let err = result
            .metric(&MetricPath::new("fairness", "note"))
            .unwrap_err();
        assert!(err.to_string().contains("not a finite number"));
    }
}
