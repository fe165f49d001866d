// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::coords::CoordinateIndex;
use crate::error::{FieldError, FieldResult};
use ndarray::{Array4, ArrayView4};

/// One named physical field sampled over every snapshot and grid point.
///
/// Values are indexed `(snapshot, x, y, z)`; the spatial extents always
/// match the attached [`CoordinateIndex`].
#[derive(Clone, Debug, PartialEq)]
pub struct VariableSeries {
    label: String,
    values: Array4<f64>,
    coords: CoordinateIndex,
}

impl VariableSeries {
    pub fn new(
        label: impl Into<String>,
        values: Array4<f64>,
        coords: CoordinateIndex,
    ) -> FieldResult<Self> {
        let label = label.into();
        if label.trim().is_empty() {
            return Err(FieldError::invalid("series label", "must not be blank"));
        }
        let got = dims4(&values);
        let [nx, ny, nz] = coords.shape();
        let expected = [got[0], nx, ny, nz];
        if got[0] == 0 || got != expected {
            return Err(FieldError::ShapeMismatch {
                label,
                expected: [got[0].max(1), nx, ny, nz],
                got,
            });
        }
        Ok(Self {
            label,
            values,
            coords,
        })
    }

    /// Scatters `(snapshot, point, value)` samples onto the grid.
    ///
    /// Every cell must be written exactly once; points that are not part of
    /// `coords` fail with [`FieldError::InconsistentGrid`].
    pub fn from_point_samples<I>(
        label: impl Into<String>,
        coords: CoordinateIndex,
        snapshots: usize,
        samples: I,
    ) -> FieldResult<Self>
    where
        I: IntoIterator<Item = (usize, [f64; 3], f64)>,
    {
        if snapshots == 0 {
            return Err(FieldError::EmptyInput("series snapshots"));
        }
        let [nx, ny, nz] = coords.shape();
        let mut values = Array4::<f64>::zeros((snapshots, nx, ny, nz));
        let mut written = Array4::<bool>::from_elem((snapshots, nx, ny, nz), false);
        for (snapshot, point, value) in samples {
            if snapshot >= snapshots {
                return Err(FieldError::InsufficientSnapshots {
                    requested: snapshot + 1,
                    available: snapshots,
                });
            }
            let [ix, iy, iz] = coords.locate(point)?;
            let slot = &mut written[[snapshot, ix, iy, iz]];
            if *slot {
                return Err(FieldError::invalid(
                    "point samples",
                    format!("snapshot {snapshot} repeats point {point:?}"),
                ));
            }
            *slot = true;
            values[[snapshot, ix, iy, iz]] = value;
        }
        let missing = written.iter().filter(|filled| !**filled).count();
        if missing > 0 {
            return Err(FieldError::invalid(
                "point samples",
                format!("{missing} grid cells were never written"),
            ));
        }
        Self::new(label, values, coords)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn values(&self) -> ArrayView4<'_, f64> {
        self.values.view()
    }

    pub fn coords(&self) -> &CoordinateIndex {
        &self.coords
    }

    /// `[snapshots, n_x, n_y, n_z]`
    pub fn shape(&self) -> [usize; 4] {
        dims4(&self.values)
    }

    pub fn snapshot_count(&self) -> usize {
        self.values.shape()[0]
    }

    pub fn into_parts(self) -> (String, Array4<f64>, CoordinateIndex) {
        (self.label, self.values, self.coords)
    }
}

pub(crate) fn dims4<S>(array: &ndarray::ArrayBase<S, ndarray::Ix4>) -> [usize; 4]
where
    S: ndarray::Data,
{
    let (t, x, y, z) = array.dim();
    [t, x, y, z]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> CoordinateIndex {
        CoordinateIndex::new([0.0, 1.0], [0.0, 1.0, 2.0], [0.0]).unwrap()
    }

    #[test]
    fn shape_must_match_grid() {
        let ok = VariableSeries::new("vx", Array4::zeros((4, 2, 3, 1)), grid()).unwrap();
        assert_eq!(ok.shape(), [4, 2, 3, 1]);
        assert_eq!(ok.snapshot_count(), 4);

        match VariableSeries::new("vy", Array4::zeros((4, 3, 2, 1)), grid()) {
            Err(FieldError::ShapeMismatch {
                label,
                expected,
                got,
            }) => {
                assert_eq!(label, "vy");
                assert_eq!(expected, [4, 2, 3, 1]);
                assert_eq!(got, [4, 3, 2, 1]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn point_samples_fill_the_grid() {
        let coords = grid();
        let mut samples = Vec::new();
        for t in 0..2 {
            for (ix, x) in [0.0, 1.0].into_iter().enumerate() {
                for (iy, y) in [0.0, 1.0, 2.0].into_iter().enumerate() {
                    samples.push((t, [x, y, 0.0], (t * 100 + ix * 10 + iy) as f64));
                }
            }
        }
        // Scattered order must not matter.
        samples.reverse();
        let series = VariableSeries::from_point_samples("p", coords, 2, samples).unwrap();
        assert_eq!(series.values()[[1, 1, 2, 0]], 112.0);
        assert_eq!(series.values()[[0, 0, 1, 0]], 1.0);
    }

    #[test]
    fn off_grid_point_is_rejected() {
        let samples = vec![(0, [0.5, 0.0, 0.0], 1.0)];
        assert!(matches!(
            VariableSeries::from_point_samples("p", grid(), 1, samples),
            Err(FieldError::InconsistentGrid { .. })
        ));
    }

    #[test]
    fn missing_cells_are_rejected() {
        let samples = vec![(0, [0.0, 0.0, 0.0], 1.0)];
        assert!(VariableSeries::from_point_samples("p", grid(), 1, samples).is_err());
    }
}
