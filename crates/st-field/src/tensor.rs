// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Multi-variable `(snapshot, x, y, z, variable)` tensor produced by
//! consolidation.

use crate::coords::CoordinateIndex;
use crate::error::{FieldError, FieldResult, IntegrityError};
use ndarray::{Array5, ArrayView4, ArrayView5, Axis};
use std::collections::HashMap;

/// Ordered variable labels with a reverse lookup. The order is fixed at
/// construction and defines the last-axis slot of every variable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelMap {
    labels: Vec<String>,
    lookup: HashMap<String, usize>,
}

impl LabelMap {
    pub fn new<I, S>(labels: I) -> FieldResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels: Vec<String> = labels.into_iter().map(Into::into).collect();
        if labels.is_empty() {
            return Err(FieldError::EmptyInput("variable labels"));
        }
        let mut lookup = HashMap::with_capacity(labels.len());
        for (slot, label) in labels.iter().enumerate() {
            if lookup.insert(label.clone(), slot).is_some() {
                return Err(FieldError::DuplicateLabel {
                    label: label.clone(),
                });
            }
        }
        Ok(Self { labels, lookup })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn as_slice(&self) -> &[String] {
        &self.labels
    }

    pub fn get(&self, slot: usize) -> Option<&str> {
        self.labels.get(slot).map(String::as_str)
    }

    pub fn index_of(&self, label: &str) -> FieldResult<usize> {
        self.lookup
            .get(label)
            .copied()
            .ok_or_else(|| FieldError::UnknownVariable {
                label: label.to_string(),
                available: self.labels.clone(),
            })
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.labels.iter().map(String::as_str)
    }
}

/// Consolidated field data for one physical case.
#[derive(Clone, Debug)]
pub struct ConsolidatedTensor {
    data: Array5<f64>,
    labels: LabelMap,
    coords: CoordinateIndex,
}

impl ConsolidatedTensor {
    /// Assembles a tensor from already merged parts, checking that the array
    /// extents agree with the labels and the grid.
    pub fn from_parts(
        data: Array5<f64>,
        labels: LabelMap,
        coords: CoordinateIndex,
    ) -> FieldResult<Self> {
        let (t, x, y, z, v) = data.dim();
        if t == 0 {
            return Err(FieldError::EmptyInput("tensor snapshots"));
        }
        if v != labels.len() {
            return Err(FieldError::invalid(
                "consolidated tensor",
                format!("{v} variable slots but {} labels", labels.len()),
            ));
        }
        if [x, y, z] != coords.shape() {
            return Err(FieldError::invalid(
                "consolidated tensor",
                format!(
                    "spatial extent {:?} disagrees with grid {:?}",
                    [x, y, z],
                    coords.shape()
                ),
            ));
        }
        Ok(Self {
            data,
            labels,
            coords,
        })
    }

    pub fn data(&self) -> ArrayView5<'_, f64> {
        self.data.view()
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn coords(&self) -> &CoordinateIndex {
        &self.coords
    }

    /// `[snapshots, n_x, n_y, n_z, n_variables]`
    pub fn shape(&self) -> [usize; 5] {
        let (t, x, y, z, v) = self.data.dim();
        [t, x, y, z, v]
    }

    pub fn snapshot_count(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn variable_count(&self) -> usize {
        self.labels.len()
    }

    /// Read-only `(snapshot, x, y, z)` view of one variable.
    pub fn variable(&self, label: &str) -> FieldResult<ArrayView4<'_, f64>> {
        let slot = self.labels.index_of(label)?;
        Ok(self.variable_at(slot))
    }

    /// Panics when `slot` is outside `0..variable_count()`.
    pub fn variable_at(&self, slot: usize) -> ArrayView4<'_, f64> {
        self.data.index_axis(Axis(4), slot)
    }

    pub fn into_parts(self) -> (Array5<f64>, LabelMap, CoordinateIndex) {
        (self.data, self.labels, self.coords)
    }

    /// Equality of shape, labels, grid, and bit patterns of every value.
    pub fn equivalent(&self, other: &ConsolidatedTensor) -> bool {
        self.first_difference(other).is_none()
    }

    /// First discrepancy between `self` (expected) and `other`, if any.
    pub fn first_difference(&self, other: &ConsolidatedTensor) -> Option<IntegrityError> {
        if self.shape() != other.shape() {
            return Some(IntegrityError::Shape {
                expected: self.shape().to_vec(),
                found: other.shape().to_vec(),
            });
        }
        for (slot, (expected, found)) in self.labels.iter().zip(other.labels.iter()).enumerate() {
            if expected != found {
                return Some(IntegrityError::Label {
                    slot,
                    expected: expected.to_string(),
                    found: found.to_string(),
                });
            }
        }
        if let Some(axis) = self.coords.first_mismatch(&other.coords) {
            return Some(IntegrityError::Coordinates { axis });
        }
        for slot in 0..self.variable_count() {
            let label = self.labels.get(slot).unwrap_or_default();
            if let Some(err) = compare_bits(label, self.variable_at(slot), other.variable_at(slot)) {
                return Some(err);
            }
        }
        None
    }
}

/// Bitwise comparison of two equally shaped 4-D views.
pub(crate) fn compare_bits(
    label: &str,
    expected: ArrayView4<'_, f64>,
    found: ArrayView4<'_, f64>,
) -> Option<IntegrityError> {
    if expected.shape() != found.shape() {
        return Some(IntegrityError::Shape {
            expected: expected.shape().to_vec(),
            found: found.shape().to_vec(),
        });
    }
    expected
        .indexed_iter()
        .zip(found.iter())
        .find(|((_, a), b)| a.to_bits() != b.to_bits())
        .map(|(((t, x, y, z), a), b)| IntegrityError::Value {
            label: label.to_string(),
            index: [t, x, y, z],
            expected: *a,
            found: *b,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tensor(values: Vec<f64>) -> ConsolidatedTensor {
        let coords = CoordinateIndex::new([0.0, 1.0], [0.0], [0.0]).unwrap();
        let data = Array5::from_shape_vec((1, 2, 1, 1, 2), values).unwrap();
        ConsolidatedTensor::from_parts(data, LabelMap::new(["a", "b"]).unwrap(), coords).unwrap()
    }

    #[test]
    fn labels_reject_duplicates() {
        assert!(matches!(
            LabelMap::new(["vx", "vy", "vx"]),
            Err(FieldError::DuplicateLabel { label }) if label == "vx"
        ));
    }

    #[test]
    fn unknown_label_lists_available() {
        let labels = LabelMap::new(["vx", "p"]).unwrap();
        match labels.index_of("jz") {
            Err(FieldError::UnknownVariable { available, .. }) => {
                assert_eq!(available, vec!["vx".to_string(), "p".to_string()]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn variable_view_follows_label_slot() {
        let t = tensor(vec![1.0, 10.0, 2.0, 20.0]);
        assert_eq!(t.variable("b").unwrap()[[0, 1, 0, 0]], 20.0);
        assert_eq!(t.variable("a").unwrap()[[0, 0, 0, 0]], 1.0);
        assert_eq!(t.shape(), [1, 2, 1, 1, 2]);
    }

    #[test]
    fn equivalence_is_bitwise() {
        let a = tensor(vec![1.0, f64::NAN, 0.0, 3.0]);
        assert!(a.equivalent(&a.clone()));
        let b = tensor(vec![1.0, f64::NAN, -0.0, 3.0]);
        match a.first_difference(&b) {
            Some(IntegrityError::Value { label, index, .. }) => {
                assert_eq!(label, "a");
                assert_eq!(index, [0, 1, 0, 0]);
            }
            other => panic!("unexpected difference: {other:?}"),
        }
    }

    #[test]
    fn mismatched_parts_are_rejected() {
        let coords = CoordinateIndex::new([0.0, 1.0], [0.0], [0.0]).unwrap();
        let data = Array5::zeros((1, 2, 1, 1, 3));
        assert!(ConsolidatedTensor::from_parts(data, LabelMap::new(["a"]).unwrap(), coords).is_err());
    }
}
