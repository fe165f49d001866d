// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Sliding-window feature extraction over a consolidated tensor.
//!
//! An [`OutputSelection`] names the grid points that need a prediction. The
//! sampler widens it by the window margin on every axis, slices the input
//! field there (a view, never a copy) and slides a [`WindowShape`] over that
//! plane with unit stride. Window `i` is centred on the `i`-th output point,
//! with points enumerated in `(snapshot, x, y, z)` row-major order; each
//! window is flattened in the same order.

use crate::coords::CoordinateIndex;
use crate::error::{FieldError, FieldResult};
use crate::observability::emit_field_op;
use crate::tensor::ConsolidatedTensor;
use core::fmt;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, ArrayView4, Axis};
use rand::seq::SliceRandom;
use spiral_config::determinism;
use std::ops::Range;
use tracing::debug;

/// The four sampling axes of a field, in array order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SampleAxis {
    Snapshot,
    X,
    Y,
    Z,
}

impl SampleAxis {
    pub const ALL: [SampleAxis; 4] = [
        SampleAxis::Snapshot,
        SampleAxis::X,
        SampleAxis::Y,
        SampleAxis::Z,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SampleAxis::Snapshot => "snapshot",
            SampleAxis::X => "x",
            SampleAxis::Y => "y",
            SampleAxis::Z => "z",
        }
    }
}

impl fmt::Display for SampleAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Contiguous, non-empty index range per axis selecting the points that
/// receive a window.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputSelection {
    ranges: [Range<usize>; 4],
}

impl OutputSelection {
    pub fn new(
        snapshots: Range<usize>,
        x: Range<usize>,
        y: Range<usize>,
        z: Range<usize>,
    ) -> FieldResult<Self> {
        Self::from_ranges([snapshots, x, y, z])
    }

    pub fn from_ranges(ranges: [Range<usize>; 4]) -> FieldResult<Self> {
        for (axis, range) in SampleAxis::ALL.into_iter().zip(ranges.iter()) {
            if range.start >= range.end {
                return Err(FieldError::InvalidSelection {
                    axis,
                    reason: "range must be non-empty",
                });
            }
        }
        Ok(Self { ranges })
    }

    /// Selects the grid point nearest to a physical location over a range of
    /// snapshots.
    pub fn around_point(
        coords: &CoordinateIndex,
        point: [f64; 3],
        snapshots: Range<usize>,
    ) -> FieldResult<Self> {
        let [ix, iy, iz] = coords.nearest_point(point)?;
        Self::new(snapshots, ix..ix + 1, iy..iy + 1, iz..iz + 1)
    }

    pub fn ranges(&self) -> &[Range<usize>; 4] {
        &self.ranges
    }

    pub fn range(&self, axis: SampleAxis) -> Range<usize> {
        self.ranges[axis as usize].clone()
    }

    pub fn shape(&self) -> [usize; 4] {
        self.ranges.clone().map(|r| r.len())
    }

    /// Number of selected points, which is also the number of windows.
    pub fn len(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Selected points in sampling order.
    pub fn points(&self) -> impl Iterator<Item = [usize; 4]> + '_ {
        let [t, x, y, z] = &self.ranges;
        t.clone().flat_map(move |ti| {
            x.clone().flat_map(move |xi| {
                y.clone()
                    .flat_map(move |yi| z.clone().map(move |zi| [ti, xi, yi, zi]))
            })
        })
    }
}

/// Region of the input field a set of windows reads from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputSelection {
    ranges: [Range<usize>; 4],
}

impl InputSelection {
    pub fn ranges(&self) -> &[Range<usize>; 4] {
        &self.ranges
    }

    pub fn shape(&self) -> [usize; 4] {
        self.ranges.clone().map(|r| r.len())
    }
}

/// Full window extent per axis, centre included. Extents are odd.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowShape([usize; 4]);

impl WindowShape {
    pub fn new(extents: [usize; 4]) -> FieldResult<Self> {
        if extents.iter().any(|&w| w == 0 || w % 2 == 0) {
            return Err(FieldError::InvalidWindowShape { shape: extents });
        }
        Ok(Self(extents))
    }

    pub fn extents(&self) -> [usize; 4] {
        self.0
    }

    /// Points on each side of the centre.
    pub fn margins(&self) -> [usize; 4] {
        self.0.map(|w| (w - 1) / 2)
    }

    /// Length of a flattened window.
    pub fn len(&self) -> usize {
        self.0.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    /// Position of the centre element inside a flattened window.
    pub fn center_offset(&self) -> usize {
        let margins = self.margins();
        self.0
            .iter()
            .zip(margins.iter())
            .fold(0, |offset, (&extent, &margin)| offset * extent + margin)
    }
}

impl TryFrom<[usize; 4]> for WindowShape {
    type Error = FieldError;

    fn try_from(extents: [usize; 4]) -> FieldResult<Self> {
        WindowShape::new(extents)
    }
}

/// Widens `output` by the margins of `shape`, failing when the result leaves
/// `0..extent` on any axis. Nothing is padded or wrapped.
pub fn input_selection(
    output: &OutputSelection,
    shape: &WindowShape,
    extent: [usize; 4],
) -> FieldResult<InputSelection> {
    let margins = shape.margins();
    let mut ranges: [Range<usize>; 4] = Default::default();
    for (d, axis) in SampleAxis::ALL.into_iter().enumerate() {
        let range = &output.ranges[d];
        let start = range.start as isize - margins[d] as isize;
        let end = range.end + margins[d];
        if start < 0 || end > extent[d] {
            return Err(FieldError::WindowOutOfBounds {
                axis,
                start,
                end: end as isize,
                extent: extent[d],
            });
        }
        ranges[d] = start as usize..end;
    }
    Ok(InputSelection { ranges })
}

/// Flattened windows paired with one scalar target each.
#[derive(Clone, Debug, PartialEq)]
pub struct WindowBatch {
    features: Array2<f64>,
    targets: Array1<f64>,
    shape: WindowShape,
}

impl WindowBatch {
    pub fn new(features: Array2<f64>, targets: Array1<f64>, shape: WindowShape) -> FieldResult<Self> {
        if features.nrows() != targets.len() {
            return Err(FieldError::invalid(
                "window batch",
                format!("{} windows but {} targets", features.nrows(), targets.len()),
            ));
        }
        if features.ncols() != shape.len() {
            return Err(FieldError::invalid(
                "window batch",
                format!(
                    "windows have {} elements, shape {:?} implies {}",
                    features.ncols(),
                    shape.extents(),
                    shape.len()
                ),
            ));
        }
        Ok(Self {
            features,
            targets,
            shape,
        })
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn window_len(&self) -> usize {
        self.features.ncols()
    }

    pub fn shape(&self) -> WindowShape {
        self.shape
    }

    pub fn features(&self) -> ArrayView2<'_, f64> {
        self.features.view()
    }

    pub fn targets(&self) -> ArrayView1<'_, f64> {
        self.targets.view()
    }

    /// Centre element of every window.
    pub fn center_values(&self) -> ArrayView1<'_, f64> {
        self.features.column(self.shape.center_offset())
    }

    pub fn into_parts(self) -> (Array2<f64>, Array1<f64>) {
        (self.features, self.targets)
    }

    /// Shuffles samples and splits off `holdout_fraction` of them for
    /// evaluation. Both halves are non-empty.
    pub fn split(&self, holdout_fraction: f64, seed: Option<u64>) -> FieldResult<(Self, Self)> {
        if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
            return Err(FieldError::invalid(
                "holdout fraction",
                format!("{holdout_fraction} is outside (0, 1)"),
            ));
        }
        let n = self.len();
        let holdout = ((n as f64) * holdout_fraction).round() as usize;
        if holdout == 0 || holdout >= n {
            return Err(FieldError::invalid(
                "holdout fraction",
                format!("{holdout_fraction} of {n} samples leaves an empty side"),
            ));
        }
        let mut order: Vec<usize> = (0..n).collect();
        let mut rng = determinism::rng_from_optional(seed, "st-field.window.split");
        order.shuffle(&mut rng);
        let (eval_idx, train_idx) = order.split_at(holdout);
        let take = |idx: &[usize]| WindowBatch {
            features: self.features.select(Axis(0), idx),
            targets: self.targets.select(Axis(0), idx),
            shape: self.shape,
        };
        Ok((take(train_idx), take(eval_idx)))
    }
}

/// Extracts windows of a fixed shape from a consolidated tensor.
#[derive(Clone, Copy, Debug)]
pub struct WindowSampler {
    shape: WindowShape,
}

impl WindowSampler {
    pub fn new(shape: WindowShape) -> Self {
        Self { shape }
    }

    pub fn shape(&self) -> WindowShape {
        self.shape
    }

    pub fn input_selection(
        &self,
        tensor: &ConsolidatedTensor,
        output: &OutputSelection,
    ) -> FieldResult<InputSelection> {
        let [t, x, y, z, _] = tensor.shape();
        input_selection(output, &self.shape, [t, x, y, z])
    }

    /// The slice of `label` that the windows for `output` read from.
    pub fn window_plane<'a>(
        &self,
        tensor: &'a ConsolidatedTensor,
        output: &OutputSelection,
        label: &str,
    ) -> FieldResult<ArrayView4<'a, f64>> {
        let input = self.input_selection(tensor, output)?;
        let field = tensor.variable(label)?;
        let [t, x, y, z] = input.ranges().clone();
        Ok(field.slice_move(s![t, x, y, z]))
    }

    /// One flattened window per output point, as rows.
    pub fn windows(
        &self,
        tensor: &ConsolidatedTensor,
        output: &OutputSelection,
        label: &str,
    ) -> FieldResult<Array2<f64>> {
        let plane = self.window_plane(tensor, output, label)?;
        let count = output.len();
        let mut features = Array2::<f64>::zeros((count, self.shape.len()));
        let mut produced = 0usize;
        for (mut row, window) in features
            .rows_mut()
            .into_iter()
            .zip(plane.windows(self.shape.extents()))
        {
            for (dst, src) in row.iter_mut().zip(window.iter()) {
                *dst = *src;
            }
            produced += 1;
        }
        debug_assert_eq!(produced, count);
        debug!(label, windows = produced, window_len = self.shape.len(), "extracted windows");
        emit_field_op("window.sample", plane.shape(), &[count, self.shape.len()]);
        Ok(features)
    }

    /// Values of `label` at every output point, in sampling order.
    pub fn targets(
        &self,
        tensor: &ConsolidatedTensor,
        output: &OutputSelection,
        label: &str,
    ) -> FieldResult<Array1<f64>> {
        let [t, x, y, z, _] = tensor.shape();
        let extent = [t, x, y, z];
        for (d, axis) in SampleAxis::ALL.into_iter().enumerate() {
            let range = &output.ranges[d];
            if range.end > extent[d] {
                return Err(FieldError::WindowOutOfBounds {
                    axis,
                    start: range.start as isize,
                    end: range.end as isize,
                    extent: extent[d],
                });
            }
        }
        let field = tensor.variable(label)?;
        let [t, x, y, z] = output.ranges().clone();
        Ok(field.slice_move(s![t, x, y, z]).iter().copied().collect())
    }

    /// Windows of `input_label` paired with `target_label` at the centres.
    pub fn batch(
        &self,
        tensor: &ConsolidatedTensor,
        output: &OutputSelection,
        input_label: &str,
        target_label: &str,
    ) -> FieldResult<WindowBatch> {
        let features = self.windows(tensor, output, input_label)?;
        let targets = self.targets(tensor, output, target_label)?;
        WindowBatch::new(features, targets, self.shape)
    }
}
