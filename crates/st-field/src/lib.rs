// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Consolidation, archival and windowed sampling of gridded simulation fields.
//!
//! Per-variable snapshot series sampled on a shared `(x, y, z)` grid are merged
//! into one `(snapshot, x, y, z, variable)` tensor, persisted in a fast or a
//! compact archive, optionally cut down to a development prefix, and finally
//! sliced into centred windows that feed a standardised ridge regressor.

pub mod archive;
pub mod consolidate;
pub mod coords;
pub mod error;
pub mod observability;
pub mod regress;
pub mod series;
pub mod subset;
pub mod summary;
pub mod tensor;
pub mod window;

pub use archive::{load, recompress, round_trip_equal, save, ArchiveMode};
pub use consolidate::{consolidate, merge_to_archive, verify};
pub use coords::{AxisIndex, CoordinateIndex, SpatialAxis};
pub use error::{FieldError, FieldResult, IntegrityError};
pub use observability::{
    emit_field_op, scoped_field_op_observer, set_field_op_observer, FieldOpEvent, FieldOpObserver,
};
pub use regress::{
    Evaluation, LinearModel, RegressorConfig, ScalerScope, SparsityReport, StandardizationParams,
    StandardizedRegressor,
};
pub use series::VariableSeries;
pub use subset::{create_dev_archive, extract_snapshots};
pub use summary::TensorSummary;
pub use tensor::{ConsolidatedTensor, LabelMap};
pub use window::{
    input_selection, InputSelection, OutputSelection, SampleAxis, WindowBatch, WindowSampler,
    WindowShape,
};
