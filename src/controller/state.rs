//! Accumulated state of a controller run
//!
//! Each iteration consumes the previous [`LoopState`] and returns a new one;
//! nothing is mutated in place between iterations.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::dispatch::{IterationBatch, UnitRecord};
use crate::error::{AdaptiveError, Result};
use crate::stability::StabilityVerdict;
use crate::unit::{MetricPath, UnitId};

/// Append-only sequence of metric values in unit generation order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricHistory(Vec<f64>);

impl MetricHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.0
    }

    fn extended(mut self, values: impl IntoIterator<Item = f64>) -> Self {
        self.0.extend(values);
        self
    }
}

impl From<Vec<f64>> for MetricHistory {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl AsRef<[f64]> for MetricHistory {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

#[derive(Debug, Clone, Default)]
pub struct LoopState {
    iteration: u64,
    history: MetricHistory,
    units: BTreeMap<UnitId, UnitRecord>,
    used_seeds: Vec<i64>,
    last_verdict: Option<StabilityVerdict>,
}

impl LoopState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of the last completed iteration, 0 before the first
    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn history(&self) -> &MetricHistory {
        &self.history
    }

    pub fn units(&self) -> &BTreeMap<UnitId, UnitRecord> {
        &self.units
    }

    pub fn used_seeds(&self) -> &[i64] {
        &self.used_seeds
    }

    pub fn last_verdict(&self) -> Option<&StabilityVerdict> {
        self.last_verdict.as_ref()
    }

    /// Id of the next unit to generate
    pub fn next_unit_id(&self) -> UnitId {
        UnitId::new(self.units.len() as u64 + 1)
    }

    /// Fold a completed batch in, extracting one metric per unit in unit id
    /// order
    ///
    /// The whole batch is validated before anything is appended.
    pub fn absorb(self, batch: IterationBatch, metric: &MetricPath) -> Result<Self> {
        let expected = self.iteration + 1;
        if batch.iteration() != expected {
            return Err(AdaptiveError::other(format!(
                "batch of iteration {} folded into state expecting iteration {}",
                batch.iteration(),
                expected
            )));
        }

        let mut metrics = Vec::with_capacity(batch.len());
        for (unit_id, record) in batch.units() {
            let value = record.result.metric(metric).map_err(|e| {
                e.with_context(format!("{} of iteration {}", unit_id, batch.iteration()))
            })?;
            metrics.push(value);
        }

        let LoopState {
            history,
            mut units,
            mut used_seeds,
            ..
        } = self;
        for (unit_id, record) in batch.into_units() {
            used_seeds.push(record.seed);
            units.insert(unit_id, record);
        }

        Ok(Self {
            iteration: expected,
            history: history.extended(metrics),
            units,
            used_seeds,
            last_verdict: None,
        })
    }

    pub fn with_verdict(self, verdict: StabilityVerdict) -> Self {
        Self {
            last_verdict: Some(verdict),
            ..self
        }
    }

    /// Give up the accumulated parts for output assembly
    pub fn into_parts(
        self,
    ) -> (
        u64,
        MetricHistory,
        BTreeMap<UnitId, UnitRecord>,
        Vec<i64>,
        Option<StabilityVerdict>,
    ) {
        (
            self.iteration,
            self.history,
            self.units,
            self.used_seeds,
            self.last_verdict,
        )
    }
}
