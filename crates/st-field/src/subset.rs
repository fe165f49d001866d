// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Reduced-snapshot "development" copies of a consolidated tensor.

use crate::archive::{self, ArchiveMode};
use crate::error::{FieldError, FieldResult};
use crate::observability::emit_field_op;
use crate::tensor::ConsolidatedTensor;
use ndarray::s;
use std::path::Path;
use tracing::info;

/// Keeps snapshots `0..count`. Labels and grid are carried over unchanged.
pub fn extract_snapshots(
    tensor: &ConsolidatedTensor,
    count: usize,
) -> FieldResult<ConsolidatedTensor> {
    if count == 0 {
        return Err(FieldError::invalid("snapshot count", "must be positive"));
    }
    let available = tensor.snapshot_count();
    if count > available {
        return Err(FieldError::InsufficientSnapshots {
            requested: count,
            available,
        });
    }
    let data = tensor.data().slice(s![..count, .., .., .., ..]).to_owned();
    let subset =
        ConsolidatedTensor::from_parts(data, tensor.labels().clone(), tensor.coords().clone())?;
    emit_field_op("extract_snapshots", &tensor.shape(), &subset.shape());
    Ok(subset)
}

/// Loads `input`, keeps the first `count` snapshots and writes the result
/// uncompressed to `output`.
pub fn create_dev_archive(
    input: &Path,
    output: &Path,
    count: usize,
) -> FieldResult<ConsolidatedTensor> {
    let full = archive::load(input)?;
    let subset = extract_snapshots(&full, count)?;
    archive::save(&subset, output, ArchiveMode::Fast)?;
    info!(
        from = full.snapshot_count(),
        to = subset.snapshot_count(),
        output = %output.display(),
        "created development archive"
    );
    Ok(subset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::consolidate;
    use crate::coords::CoordinateIndex;
    use crate::series::VariableSeries;
    use ndarray::Array4;
    use tempfile::tempdir;

    fn tensor(snapshots: usize) -> ConsolidatedTensor {
        let coords = CoordinateIndex::new([0.0, 1.0], [0.0, 1.0], [0.0]).unwrap();
        let a = Array4::from_shape_fn((snapshots, 2, 2, 1), |(t, x, y, _)| (t * 4 + x * 2 + y) as f64);
        let b = a.mapv(|v| -v);
        consolidate(&[
            VariableSeries::new("a", a, coords.clone()).unwrap(),
            VariableSeries::new("b", b, coords).unwrap(),
        ])
        .unwrap()
    }

    #[test]
    fn prefix_matches_source() {
        let source = tensor(6);
        let subset = extract_snapshots(&source, 2).unwrap();
        assert_eq!(subset.shape(), [2, 2, 2, 1, 2]);
        assert_eq!(subset.labels(), source.labels());
        assert_eq!(subset.coords(), source.coords());
        assert_eq!(
            subset.data(),
            source.data().slice(s![..2, .., .., .., ..])
        );
        let all = extract_snapshots(&source, 6).unwrap();
        assert!(all.equivalent(&source));
    }

    #[test]
    fn oversized_request_fails() {
        match extract_snapshots(&tensor(3), 4) {
            Err(FieldError::InsufficientSnapshots {
                requested,
                available,
            }) => {
                assert_eq!(requested, 4);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert!(extract_snapshots(&tensor(3), 0).is_err());
    }

    #[test]
    fn dev_archive_is_written_fast() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("full.stf");
        let output = dir.path().join("dev.stf");
        archive::save(&tensor(5), &input, ArchiveMode::Compact).unwrap();
        let subset = create_dev_archive(&input, &output, 2).unwrap();
        assert_eq!(archive::probe_mode(&output).unwrap(), ArchiveMode::Fast);
        assert!(subset.equivalent(&archive::load(&output).unwrap()));
    }
}
