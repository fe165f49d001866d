// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Goodness-of-fit scores for scalar predictions.

use crate::error::{FieldError, FieldResult};
use ndarray::ArrayView1;

fn paired(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> FieldResult<()> {
    if truth.is_empty() {
        return Err(FieldError::EmptyInput("metric targets"));
    }
    if truth.len() != predicted.len() {
        return Err(FieldError::invalid(
            "metric inputs",
            format!("{} targets but {} predictions", truth.len(), predicted.len()),
        ));
    }
    Ok(())
}

fn residual_sum(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> f64 {
    truth
        .iter()
        .zip(predicted.iter())
        .map(|(t, p)| (t - p) * (t - p))
        .sum()
}

/// Root-mean-square error.
pub fn rmse(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> FieldResult<f64> {
    paired(truth, predicted)?;
    Ok((residual_sum(truth, predicted) / truth.len() as f64).sqrt())
}

/// Coefficient of determination. A constant target scores 1.0 when matched
/// exactly and 0.0 otherwise.
pub fn r2_score(truth: ArrayView1<'_, f64>, predicted: ArrayView1<'_, f64>) -> FieldResult<f64> {
    paired(truth, predicted)?;
    let mean = truth.sum() / truth.len() as f64;
    let total: f64 = truth.iter().map(|t| (t - mean) * (t - mean)).sum();
    let residual = residual_sum(truth, predicted);
    if total == 0.0 {
        return Ok(if residual == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - residual / total)
}
