// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use ndarray::Array4;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use st_field::archive::{self, ArchiveMode};
use st_field::observability::scoped_field_op_observer;
use st_field::{
    consolidate, create_dev_archive, merge_to_archive, verify, CoordinateIndex, FieldError,
    FieldOpEvent, OutputSelection, RegressorConfig, ScalerScope, StandardizedRegressor,
    TensorSummary, VariableSeries, WindowSampler, WindowShape,
};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

const SNAPSHOTS: usize = 12;
const N: usize = 6;

fn grid() -> CoordinateIndex {
    let axis = |scale: f64| (0..N).map(move |i| i as f64 * scale);
    CoordinateIndex::new(axis(0.1), axis(0.2), axis(-0.3)).unwrap()
}

/// A smooth input field and a target that is an exact linear stencil of it.
fn case() -> Vec<VariableSeries> {
    let mut rng = StdRng::seed_from_u64(2025);
    let noise = Array4::from_shape_fn((SNAPSHOTS, N, N, N), |_| rng.gen_range(-1.0..1.0));
    let u = Array4::from_shape_fn((SNAPSHOTS, N, N, N), |(t, x, y, z)| {
        (t as f64 * 0.3).sin() + x as f64 * 0.5 - y as f64 * 0.25 + (z as f64).cos() + noise[[t, x, y, z]]
    });
    let mut p = Array4::zeros((SNAPSHOTS, N, N, N));
    for t in 1..SNAPSHOTS - 1 {
        for x in 1..N - 1 {
            for y in 0..N {
                for z in 0..N {
                    p[[t, x, y, z]] = 2.0 * u[[t, x, y, z]] - 0.5 * u[[t - 1, x, y, z]]
                        + 0.75 * u[[t, x + 1, y, z]]
                        + 1.5;
                }
            }
        }
    }
    let coords = grid();
    vec![
        VariableSeries::new("u", u, coords.clone()).unwrap(),
        VariableSeries::new("p", p, coords).unwrap(),
    ]
}

#[test]
fn archives_reload_identically_in_both_modes() {
    let series = case();
    let tensor = consolidate(&series).unwrap();
    verify(&tensor, &series).unwrap();
    let dir = tempdir().unwrap();
    for mode in [ArchiveMode::Fast, ArchiveMode::Compact] {
        let path = dir.path().join(format!("case_{mode:?}.stf"));
        archive::save(&tensor, &path, mode).unwrap();
        let loaded = archive::load(&path).unwrap();
        assert!(loaded.equivalent(&tensor));
        verify(&loaded, &series).unwrap();
        archive::round_trip_equal(&tensor, &path).unwrap();
        assert_eq!(archive::probe_mode(&path).unwrap(), mode);
    }
}

#[test]
fn full_pipeline_learns_the_stencil() {
    let dir = tempdir().unwrap();
    let merged = dir.path().join("merged.stf");
    let dev = dir.path().join("dev.stf");

    let series = case();
    merge_to_archive(&series, &merged, ArchiveMode::Compact, true).unwrap();
    let subset = create_dev_archive(&merged, &dev, 10).unwrap();
    assert_eq!(subset.snapshot_count(), 10);
    let tensor = archive::load(&dev).unwrap();
    assert!(tensor.equivalent(&subset));

    let summary = TensorSummary::of(&tensor);
    assert_eq!(summary.shape, [10, N, N, N, 2]);

    let sampler = WindowSampler::new(WindowShape::new([3, 3, 1, 1]).unwrap());
    let output = OutputSelection::new(1..9, 1..5, 0..N, 0..N).unwrap();
    let batch = sampler.batch(&tensor, &output, "u", "p").unwrap();
    assert_eq!(batch.len(), 8 * 4 * N * N);
    assert_eq!(batch.window_len(), 9);

    let (train, eval) = batch.split(0.25, Some(3)).unwrap();
    let config = RegressorConfig {
        regularization: 0.0,
        scope: ScalerScope::PerFeature,
        floor: None,
    };
    let mut regressor = StandardizedRegressor::fit(&train, &config).unwrap();
    let scores = regressor.evaluate(&eval).unwrap();
    assert!(scores.r2 > 1.0 - 1e-9, "{scores:?}");

    // Only three of nine stencil taps carry weight.
    let report = regressor.sparsify(1.0 / 3.0).unwrap();
    assert_eq!(report.kept, 3);
    let after = regressor.evaluate(&eval).unwrap();
    assert!(after.r2 > 1.0 - 1e-6, "{after:?}");
}

#[test]
fn dev_subset_larger_than_source_fails() {
    let dir = tempdir().unwrap();
    let merged = dir.path().join("merged.stf");
    merge_to_archive(&case(), &merged, ArchiveMode::Fast, false).unwrap();
    let err = create_dev_archive(&merged, &dir.path().join("dev.stf"), SNAPSHOTS + 1).unwrap_err();
    assert!(matches!(
        err,
        FieldError::InsufficientSnapshots {
            requested: 13,
            available: SNAPSHOTS
        }
    ));
    assert!(!dir.path().join("dev.stf").exists());
}

#[test]
fn observer_sees_each_stage() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _guard = scoped_field_op_observer(Arc::new(move |event: &FieldOpEvent| {
        sink.lock().unwrap().push(event.op_name);
    }));
    let tensor = consolidate(&case()).unwrap();
    let sampler = WindowSampler::new(WindowShape::new([1, 1, 1, 1]).unwrap());
    let output = OutputSelection::new(0..1, 0..1, 0..1, 0..1).unwrap();
    sampler.windows(&tensor, &output, "u").unwrap();
    let names = seen.lock().unwrap().clone();
    assert!(names.contains(&"consolidate"));
    assert!(names.contains(&"window.sample"));
}
