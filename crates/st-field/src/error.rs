// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use crate::coords::SpatialAxis;
use crate::window::SampleAxis;
use thiserror::Error;

/// Result alias used throughout the crate.
pub type FieldResult<T> = Result<T, FieldError>;

/// Errors emitted by consolidation, archival, windowing and regression.
///
/// Every variant is fatal for the call that produced it; inputs are files on
/// disk, so retrying cannot change the outcome.
#[derive(Debug, Error)]
pub enum FieldError {
    #[error("series `{label}` has shape {got:?}, expected {expected:?}")]
    ShapeMismatch {
        label: String,
        expected: [usize; 4],
        got: [usize; 4],
    },
    #[error("series `{label}` disagrees with the reference grid on the {axis} axis")]
    IncompatibleCoordinateIndex { label: String, axis: SpatialAxis },
    #[error("coordinate {coordinate} is not part of the {axis} axis")]
    InconsistentGrid { axis: SpatialAxis, coordinate: f64 },
    #[error(
        "window on the {axis} axis needs indices {start}..{end} but the extent is 0..{extent}"
    )]
    WindowOutOfBounds {
        axis: SampleAxis,
        start: isize,
        end: isize,
        extent: usize,
    },
    #[error("requested {requested} snapshots but only {available} are available")]
    InsufficientSnapshots { requested: usize, available: usize },
    #[error("feature {feature} has zero variance and no scale floor is configured")]
    DegenerateFeature { feature: usize },
    #[error("{0} must not be empty")]
    EmptyInput(&'static str),
    #[error("unknown variable `{label}`; available: {available:?}")]
    UnknownVariable {
        label: String,
        available: Vec<String>,
    },
    #[error("variable label `{label}` appears more than once")]
    DuplicateLabel { label: String },
    #[error("window shape {shape:?} must contain odd extents >= 1")]
    InvalidWindowShape { shape: [usize; 4] },
    #[error("invalid selection on the {axis} axis: {reason}")]
    InvalidSelection {
        axis: SampleAxis,
        reason: &'static str,
    },
    #[error("invalid value for {label}: {reason}")]
    InvalidValue {
        label: &'static str,
        reason: String,
    },
    #[error("linear solver failed: {0}")]
    Solver(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] bincode::Error),
    #[error("archive header is malformed: {0}")]
    MalformedArchive(String),
    #[error(transparent)]
    Integrity(#[from] IntegrityError),
}

impl FieldError {
    /// Returns `true` when the error signals corrupted data rather than a
    /// usage mistake.
    pub fn is_integrity(&self) -> bool {
        matches!(self, FieldError::Integrity(_))
    }

    pub(crate) fn invalid(label: &'static str, reason: impl Into<String>) -> Self {
        FieldError::InvalidValue {
            label,
            reason: reason.into(),
        }
    }
}

/// Mismatch found while comparing a tensor against its supposed source.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum IntegrityError {
    #[error("tensor holds {tensor} variables but {expected} series were supplied")]
    VariableCount { tensor: usize, expected: usize },
    #[error("label at slot {slot} is `{found}`, expected `{expected}`")]
    Label {
        slot: usize,
        expected: String,
        found: String,
    },
    #[error("shape {found:?} differs from expected {expected:?}")]
    Shape {
        expected: Vec<usize>,
        found: Vec<usize>,
    },
    #[error("coordinate index differs on the {axis} axis")]
    Coordinates { axis: SpatialAxis },
    #[error("variable `{label}` differs at {index:?}: expected {expected}, found {found}")]
    Value {
        label: String,
        index: [usize; 4],
        expected: f64,
        found: f64,
    },
}
