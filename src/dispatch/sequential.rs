use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{unit_failure, BatchDispatcher, ExecutionType};
use crate::error::Result;
use crate::unit::{UnitConfig, UnitEvaluator, UnitId, UnitResult};

/// Evaluates units in-process, one after another, in the order given
///
/// The first failing unit aborts the batch.
pub struct SequentialDispatcher {
    evaluator: Arc<dyn UnitEvaluator>,
}

impl SequentialDispatcher {
    pub fn new(evaluator: Arc<dyn UnitEvaluator>) -> Self {
        Self { evaluator }
    }
}

#[async_trait]
impl BatchDispatcher for SequentialDispatcher {
    fn execution_type(&self) -> ExecutionType {
        ExecutionType::Sequential
    }

    async fn run_batch(&self, units: &[UnitConfig]) -> Result<HashMap<UnitId, UnitResult>> {
        let mut results = HashMap::with_capacity(units.len());
        for unit in units {
            debug!("Evaluating {} with seed {}", unit.unit_id, unit.seed);
            let result = self
                .evaluator
                .evaluate(unit)
                .await
                .map_err(|e| unit_failure(unit, format!("{e:#}")))?;
            results.insert(unit.unit_id, result);
        }
        Ok(results)
    }
}
