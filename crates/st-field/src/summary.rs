// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Human-readable overview of a consolidated tensor.

use crate::coords::SpatialAxis;
use crate::tensor::ConsolidatedTensor;
use core::fmt;
use ndarray::ArrayView4;
use rayon::prelude::*;
use serde::Serialize;

/// Value range of one variable. Non-finite entries are counted, not folded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VariableStats {
    pub label: String,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub non_finite: usize,
}

impl VariableStats {
    fn collect(label: &str, values: ArrayView4<'_, f64>) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut finite = 0usize;
        let mut non_finite = 0usize;
        for &v in values.iter() {
            if v.is_finite() {
                min = min.min(v);
                max = max.max(v);
                sum += v;
                finite += 1;
            } else {
                non_finite += 1;
            }
        }
        let mean = if finite == 0 { f64::NAN } else { sum / finite as f64 };
        Self {
            label: label.to_owned(),
            min,
            max,
            mean,
            non_finite,
        }
    }
}

/// Extent of one spatial axis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AxisSummary {
    pub axis: SpatialAxis,
    pub points: usize,
    pub first: f64,
    pub last: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TensorSummary {
    /// `(snapshots, x, y, z, variables)`.
    pub shape: [usize; 5],
    pub elements: usize,
    pub bytes: usize,
    pub axes: Vec<AxisSummary>,
    pub variables: Vec<VariableStats>,
}

impl TensorSummary {
    pub fn of(tensor: &ConsolidatedTensor) -> Self {
        let shape = tensor.shape();
        let elements = shape.iter().product::<usize>();
        let axes = SpatialAxis::ALL
            .into_iter()
            .map(|axis| {
                let index = tensor.coords().axis(axis);
                let coords = index.coords();
                AxisSummary {
                    axis,
                    points: coords.len(),
                    first: coords.first().copied().unwrap_or(f64::NAN),
                    last: coords.last().copied().unwrap_or(f64::NAN),
                }
            })
            .collect();
        let labels = tensor.labels().as_slice();
        let variables = (0..tensor.variable_count())
            .into_par_iter()
            .map(|slot| VariableStats::collect(&labels[slot], tensor.variable_at(slot)))
            .collect();
        Self {
            shape,
            elements,
            bytes: elements * core::mem::size_of::<f64>(),
            axes,
            variables,
        }
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> + '_ {
        self.variables.iter().map(|v| v.label.as_str())
    }
}

impl fmt::Display for TensorSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [t, x, y, z, v] = self.shape;
        writeln!(f, "shape: (snapshots={t}, x={x}, y={y}, z={z}, variables={v})")?;
        writeln!(f, "elements: {}", self.elements)?;
        writeln!(f, "memory: {:.2} MiB", self.bytes as f64 / (1024.0 * 1024.0))?;
        for axis in &self.axes {
            writeln!(
                f,
                "axis {}: {} points in [{}, {}]",
                axis.axis, axis.points, axis.first, axis.last
            )?;
        }
        writeln!(f, "variables:")?;
        for (slot, stats) in self.variables.iter().enumerate() {
            write!(
                f,
                "  [{slot}] {:<8} min={:.6e} max={:.6e} mean={:.6e}",
                stats.label, stats.min, stats.max, stats.mean
            )?;
            if stats.non_finite > 0 {
                write!(f, " non_finite={}", stats.non_finite)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
