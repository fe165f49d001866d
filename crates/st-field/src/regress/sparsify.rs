// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::error::{FieldError, FieldResult};
use serde::{Deserialize, Serialize};

/// Summary describing a magnitude sparsification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SparsityReport {
    pub keep_ratio: f64,
    pub achieved_ratio: f64,
    pub kept: usize,
    pub zeroed: usize,
    pub threshold: f64,
}

impl SparsityReport {
    pub(crate) fn new(keep_ratio: f64, weights: &[f64], threshold: f64) -> Self {
        let kept = weights.iter().filter(|w| **w != 0.0).count();
        let zeroed = weights.len() - kept;
        let achieved_ratio = if weights.is_empty() {
            1.0
        } else {
            kept as f64 / weights.len() as f64
        };
        Self {
            keep_ratio,
            achieved_ratio,
            kept,
            zeroed,
            threshold,
        }
    }
}

/// Smallest count `k` with `k / n >= keep_ratio`, at least one.
/// `n * ratio` may round up past an integer, so `ceil` is stepped back
/// when the smaller count already meets the ratio.
fn minimum_kept(n: usize, keep_ratio: f64) -> usize {
    let mut k = (n as f64 * keep_ratio).ceil() as usize;
    if k > 1 && (k - 1) as f64 / n as f64 >= keep_ratio {
        k -= 1;
    }
    k.max(1).min(n)
}

/// Zeroes the smallest-magnitude weights so that at least `keep_ratio` of
/// them survive, dropping as many as that allows.
///
/// Weights tied at the cut-off magnitude are kept together, so fewer than
/// the maximum may be dropped. Returns the new weights and the largest
/// zeroed magnitude (`0.0` when nothing was zeroed).
pub fn sparsify(weights: &[f64], keep_ratio: f64) -> FieldResult<(Vec<f64>, f64)> {
    if !(keep_ratio > 0.0 && keep_ratio <= 1.0) {
        return Err(FieldError::invalid(
            "keep ratio",
            format!("{keep_ratio} is outside (0, 1]"),
        ));
    }
    let n = weights.len();
    let keep_min = minimum_kept(n, keep_ratio);
    let drop_max = n - keep_min;
    if drop_max == 0 {
        return Ok((weights.to_vec(), 0.0));
    }

    let mut magnitudes: Vec<f64> = weights.iter().map(|w| w.abs()).collect();
    magnitudes.sort_unstable_by(|a, b| a.total_cmp(b));
    let cut = magnitudes[drop_max - 1];
    let straddles = magnitudes[drop_max] == cut;

    let mut threshold = 0.0f64;
    let pruned = weights
        .iter()
        .map(|&w| {
            let m = w.abs();
            let drop = if straddles { m < cut } else { m <= cut };
            if drop {
                threshold = threshold.max(m);
                0.0
            } else {
                w
            }
        })
        .collect();
    Ok((pruned, threshold))
}
