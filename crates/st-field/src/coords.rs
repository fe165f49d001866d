// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Bidirectional mapping between physical grid coordinates and integer
//! indices on the three spatial axes.
//!
//! Each axis keeps its coordinates sorted and deduplicated, so both exact
//! lookup and nearest-neighbour lookup are binary searches.

use crate::error::{FieldError, FieldResult};
use core::fmt;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One of the three spatial grid axes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpatialAxis {
    X,
    Y,
    Z,
}

impl SpatialAxis {
    pub const ALL: [SpatialAxis; 3] = [SpatialAxis::X, SpatialAxis::Y, SpatialAxis::Z];

    pub fn name(self) -> &'static str {
        match self {
            SpatialAxis::X => "x",
            SpatialAxis::Y => "y",
            SpatialAxis::Z => "z",
        }
    }
}

impl fmt::Display for SpatialAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Sorted, distinct coordinates of a single axis. Index `i` maps to the
/// `i`-th smallest coordinate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AxisIndex {
    axis: SpatialAxis,
    coords: Vec<f64>,
}

impl AxisIndex {
    /// Orders and deduplicates `values`, assigning indices `0..k`.
    pub fn build<I>(axis: SpatialAxis, values: I) -> FieldResult<Self>
    where
        I: IntoIterator<Item = f64>,
    {
        let mut coords: Vec<f64> = values.into_iter().collect();
        if coords.is_empty() {
            return Err(FieldError::EmptyInput("axis coordinates"));
        }
        if let Some(bad) = coords.iter().find(|c| !c.is_finite()) {
            return Err(FieldError::invalid(
                "axis coordinates",
                format!("{axis} axis contains non-finite coordinate {bad}"),
            ));
        }
        coords.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
        coords.dedup();
        Ok(Self { axis, coords })
    }

    pub fn axis(&self) -> SpatialAxis {
        self.axis
    }

    pub fn len(&self) -> usize {
        self.coords.len()
    }

    /// Always `false`; construction rejects empty axes.
    pub fn is_empty(&self) -> bool {
        self.coords.is_empty()
    }

    pub fn coords(&self) -> &[f64] {
        &self.coords
    }

    pub fn coordinate(&self, index: usize) -> Option<f64> {
        self.coords.get(index).copied()
    }

    /// Exact lookup of a stored coordinate.
    pub fn index_of(&self, coordinate: f64) -> FieldResult<usize> {
        self.coords
            .binary_search_by(|probe| probe.partial_cmp(&coordinate).unwrap_or(Ordering::Less))
            .map_err(|_| FieldError::InconsistentGrid {
                axis: self.axis,
                coordinate,
            })
    }

    /// Index of the stored coordinate closest to `target`. Equidistant
    /// candidates resolve to the smaller coordinate.
    pub fn nearest_index(&self, target: f64) -> FieldResult<usize> {
        if target.is_nan() {
            return Err(FieldError::invalid(
                "nearest_index",
                format!("target on the {} axis is NaN", self.axis),
            ));
        }
        let upper = self.coords.partition_point(|c| *c < target);
        if upper == 0 {
            return Ok(0);
        }
        if upper == self.coords.len() {
            return Ok(self.coords.len() - 1);
        }
        let below = target - self.coords[upper - 1];
        let above = self.coords[upper] - target;
        Ok(if above < below { upper } else { upper - 1 })
    }
}

/// Coordinate index for a regular `(x, y, z)` grid. Immutable once built.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CoordinateIndex {
    x: AxisIndex,
    y: AxisIndex,
    z: AxisIndex,
}

impl CoordinateIndex {
    pub fn new<X, Y, Z>(x: X, y: Y, z: Z) -> FieldResult<Self>
    where
        X: IntoIterator<Item = f64>,
        Y: IntoIterator<Item = f64>,
        Z: IntoIterator<Item = f64>,
    {
        Ok(Self {
            x: AxisIndex::build(SpatialAxis::X, x)?,
            y: AxisIndex::build(SpatialAxis::Y, y)?,
            z: AxisIndex::build(SpatialAxis::Z, z)?,
        })
    }

    /// Builds the axes from the coordinates of every grid point. The points
    /// must cover the full tensor product of the distinct axis values.
    pub fn from_points(points: &[[f64; 3]]) -> FieldResult<Self> {
        if points.is_empty() {
            return Err(FieldError::EmptyInput("grid points"));
        }
        let index = Self::new(
            points.iter().map(|p| p[0]),
            points.iter().map(|p| p[1]),
            points.iter().map(|p| p[2]),
        )?;
        let expected: usize = index.shape().iter().product();
        if expected != points.len() {
            return Err(FieldError::invalid(
                "grid points",
                format!(
                    "{} points cannot form a complete {:?} grid",
                    points.len(),
                    index.shape()
                ),
            ));
        }
        Ok(index)
    }

    pub fn axis(&self, axis: SpatialAxis) -> &AxisIndex {
        match axis {
            SpatialAxis::X => &self.x,
            SpatialAxis::Y => &self.y,
            SpatialAxis::Z => &self.z,
        }
    }

    /// `[n_x, n_y, n_z]`
    pub fn shape(&self) -> [usize; 3] {
        [self.x.len(), self.y.len(), self.z.len()]
    }

    /// Exact grid indices of a physical point.
    pub fn locate(&self, point: [f64; 3]) -> FieldResult<[usize; 3]> {
        Ok([
            self.x.index_of(point[0])?,
            self.y.index_of(point[1])?,
            self.z.index_of(point[2])?,
        ])
    }

    /// Grid indices of the closest grid point to an arbitrary location.
    pub fn nearest_point(&self, point: [f64; 3]) -> FieldResult<[usize; 3]> {
        Ok([
            self.x.nearest_index(point[0])?,
            self.y.nearest_index(point[1])?,
            self.z.nearest_index(point[2])?,
        ])
    }

    /// First axis whose coordinate sequence differs from `other`.
    pub fn first_mismatch(&self, other: &CoordinateIndex) -> Option<SpatialAxis> {
        SpatialAxis::ALL
            .into_iter()
            .find(|&axis| self.axis(axis).coords() != other.axis(axis).coords())
    }
}
