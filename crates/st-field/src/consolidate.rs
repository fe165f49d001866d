// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Merges independently produced per-variable series into one tensor.

use crate::archive::{self, ArchiveMode};
use crate::error::{FieldError, FieldResult, IntegrityError};
use crate::observability::emit_field_op;
use crate::series::VariableSeries;
use crate::tensor::{compare_bits, ConsolidatedTensor, LabelMap};
use ndarray::{Array5, Axis};
use std::path::Path;
use tracing::{debug, info};

/// Stacks `series` along a trailing variable axis, in input order.
///
/// All entries must share the snapshot count, the spatial extent and the
/// coordinate sequences of the first entry. Values are copied verbatim.
pub fn consolidate(series: &[VariableSeries]) -> FieldResult<ConsolidatedTensor> {
    let reference = series
        .first()
        .ok_or(FieldError::EmptyInput("series to consolidate"))?;
    let expected = reference.shape();

    for entry in series {
        let got = entry.shape();
        if got != expected {
            return Err(FieldError::ShapeMismatch {
                label: entry.label().to_string(),
                expected,
                got,
            });
        }
        if let Some(axis) = reference.coords().first_mismatch(entry.coords()) {
            return Err(FieldError::IncompatibleCoordinateIndex {
                label: entry.label().to_string(),
                axis,
            });
        }
    }

    let labels = LabelMap::new(series.iter().map(|s| s.label().to_string()))?;
    let [t, x, y, z] = expected;
    let mut data = Array5::<f64>::zeros((t, x, y, z, series.len()));
    for (slot, entry) in series.iter().enumerate() {
        data.index_axis_mut(Axis(4), slot).assign(&entry.values());
        debug!(label = entry.label(), slot, "copied series into variable slot");
    }

    let tensor = ConsolidatedTensor::from_parts(data, labels, reference.coords().clone())?;
    info!(
        shape = ?tensor.shape(),
        variables = tensor.variable_count(),
        "consolidated variable series"
    );
    emit_field_op("consolidate", &expected, &tensor.shape());
    Ok(tensor)
}

/// Rebuilds every per-variable slice from `tensor` and checks it bit for bit
/// against the series it was built from.
pub fn verify(tensor: &ConsolidatedTensor, series: &[VariableSeries]) -> Result<(), IntegrityError> {
    if tensor.variable_count() != series.len() {
        return Err(IntegrityError::VariableCount {
            tensor: tensor.variable_count(),
            expected: series.len(),
        });
    }
    for (slot, entry) in series.iter().enumerate() {
        let found = tensor.labels().get(slot).unwrap_or_default();
        if found != entry.label() {
            return Err(IntegrityError::Label {
                slot,
                expected: entry.label().to_string(),
                found: found.to_string(),
            });
        }
        if let Some(axis) = entry.coords().first_mismatch(tensor.coords()) {
            return Err(IntegrityError::Coordinates { axis });
        }
        if let Some(err) = compare_bits(entry.label(), entry.values(), tensor.variable_at(slot)) {
            return Err(err);
        }
    }
    Ok(())
}

/// Consolidates, persists, and optionally proves the archive reloads to the
/// same tensor.
pub fn merge_to_archive<P: AsRef<Path>>(
    series: &[VariableSeries],
    path: P,
    mode: ArchiveMode,
    check: bool,
) -> FieldResult<ConsolidatedTensor> {
    let tensor = consolidate(series)?;
    if check {
        verify(&tensor, series)?;
    }
    archive::save(&tensor, path.as_ref(), mode)?;
    if check {
        archive::round_trip_equal(&tensor, path.as_ref())?;
        info!(path = %path.as_ref().display(), "archive verified against merged tensor");
    }
    Ok(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::{CoordinateIndex, SpatialAxis};
    use ndarray::Array4;

    fn grid() -> CoordinateIndex {
        CoordinateIndex::new([0.0, 0.5, 1.0], [0.0, 1.0], [-1.0, 0.0, 1.0, 2.0]).unwrap()
    }

    fn series(label: &str, offset: f64) -> VariableSeries {
        let values = Array4::from_shape_fn((2, 3, 2, 4), |(t, x, y, z)| {
            offset + (t * 1000 + x * 100 + y * 10 + z) as f64
        });
        VariableSeries::new(label, values, grid()).unwrap()
    }

    #[test]
    fn merge_preserves_order_and_values() {
        let inputs = vec![series("vx", 0.0), series("p", 0.25), series("jz", -7.0)];
        let tensor = consolidate(&inputs).unwrap();
        assert_eq!(tensor.shape(), [2, 3, 2, 4, 3]);
        assert_eq!(tensor.labels().as_slice(), &["vx", "p", "jz"]);
        assert_eq!(tensor.data()[[1, 2, 1, 3, 1]], 0.25 + 1213.0);
        verify(&tensor, &inputs).unwrap();
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(matches!(consolidate(&[]), Err(FieldError::EmptyInput(_))));
    }

    #[test]
    fn snapshot_mismatch_names_offender() {
        let short = VariableSeries::new("du", Array4::zeros((1, 3, 2, 4)), grid()).unwrap();
        match consolidate(&[series("vx", 0.0), short]) {
            Err(FieldError::ShapeMismatch {
                label,
                expected,
                got,
            }) => {
                assert_eq!(label, "du");
                assert_eq!(expected, [2, 3, 2, 4]);
                assert_eq!(got, [1, 3, 2, 4]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn coordinate_mismatch_names_axis() {
        let shifted = CoordinateIndex::new([0.0, 0.5, 1.0], [0.0, 1.0], [-1.0, 0.0, 1.0, 2.5]).unwrap();
        let other = VariableSeries::new("dv", Array4::zeros((2, 3, 2, 4)), shifted).unwrap();
        match consolidate(&[series("vx", 0.0), other]) {
            Err(FieldError::IncompatibleCoordinateIndex { label, axis }) => {
                assert_eq!(label, "dv");
                assert_eq!(axis, SpatialAxis::Z);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn duplicate_labels_are_rejected() {
        assert!(matches!(
            consolidate(&[series("vx", 0.0), series("vx", 1.0)]),
            Err(FieldError::DuplicateLabel { .. })
        ));
    }

    #[test]
    fn verify_detects_foreign_series() {
        let inputs = vec![series("vx", 0.0), series("p", 1.0)];
        let tensor = consolidate(&inputs).unwrap();
        let tampered = vec![series("vx", 0.0), series("p", 1.5)];
        assert!(matches!(
            verify(&tensor, &tampered),
            Err(IntegrityError::Value { ref label, .. }) if label == "p"
        ));
        assert!(matches!(
            verify(&tensor, &inputs[..1]),
            Err(IntegrityError::VariableCount { tensor: 2, expected: 1 })
        ));
    }
}
