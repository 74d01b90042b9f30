//! Per-unit seed derivation
//!
//! Iteration `i` (1-indexed) with batch size `k` owns the seed range
//! `base + (i - 1) * k + 1 ..= base + i * k`. Ranges of different iterations
//! never overlap, so every unit of a run gets a distinct, reproducible seed.

use crate::error::{AdaptiveError, ErrorCode, Result};

pub fn next_seeds(base_seed: i64, iteration: u64, batch_size: u64) -> Result<Vec<i64>> {
    if iteration == 0 {
        return Err(AdaptiveError::invalid_value(
            "iteration",
            "iterations are numbered from 1",
        ));
    }

    let overflow = || {
        AdaptiveError::config_with_code(
            ErrorCode::CONFIG_SEED_OVERFLOW,
            format!(
                "seeds for iteration {iteration} (batch size {batch_size}) overflow from base seed {base_seed}"
            ),
        )
    };

    let offset = (iteration - 1)
        .checked_mul(batch_size)
        .and_then(|o| i64::try_from(o).ok())
        .ok_or_else(overflow)?;
    let first = base_seed
        .checked_add(offset)
        .and_then(|s| s.checked_add(1))
        .ok_or_else(overflow)?;
    let span = i64::try_from(batch_size).map_err(|_| overflow())?;
    if span > 0 {
        first.checked_add(span - 1).ok_or_else(overflow)?;
    }

    Ok((0..span).map(|k| first + k).collect())
}

/// Largest base seed for which `total_units` seeds can be derived
pub fn max_base_seed(total_units: u64) -> Option<i64> {
    i64::try_from(total_units)
        .ok()
        .and_then(|n| i64::MAX.checked_sub(n))
}
