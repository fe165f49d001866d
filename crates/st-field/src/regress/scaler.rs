// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Affine standardisation fit once on a training population.

use crate::error::{FieldError, FieldResult};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use spiral_config::ScalerScopeSetting;

/// Whether one scaler covers every feature or each feature gets its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalerScope {
    /// One mean and scale across all features of the field.
    #[default]
    Global,
    PerFeature,
}

impl From<ScalerScopeSetting> for ScalerScope {
    fn from(value: ScalerScopeSetting) -> Self {
        match value {
            ScalerScopeSetting::Global => ScalerScope::Global,
            ScalerScopeSetting::PerFeature => ScalerScope::PerFeature,
        }
    }
}

/// Mean and scale learned from a population. Scales are strictly positive.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StandardizationParams {
    scope: ScalerScope,
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl StandardizationParams {
    pub fn scope(&self) -> ScalerScope {
        self.scope
    }

    pub fn mean(&self) -> &[f64] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64] {
        &self.scale
    }

    /// Number of columns the parameters apply to, `None` for global scope.
    pub fn width(&self) -> Option<usize> {
        match self.scope {
            ScalerScope::Global => None,
            ScalerScope::PerFeature => Some(self.mean.len()),
        }
    }

    #[inline]
    fn column(&self, index: usize) -> (f64, f64) {
        match self.scope {
            ScalerScope::Global => (self.mean[0], self.scale[0]),
            ScalerScope::PerFeature => (self.mean[index], self.scale[index]),
        }
    }

    fn check_width(&self, cols: usize) -> FieldResult<()> {
        match self.width() {
            Some(width) if width != cols => Err(FieldError::invalid(
                "standardization",
                format!("parameters cover {width} features, input has {cols}"),
            )),
            _ => Ok(()),
        }
    }

    fn map_columns(&self, x: ArrayView2<'_, f64>, f: impl Fn(f64, f64, f64) -> f64) -> FieldResult<Array2<f64>> {
        self.check_width(x.ncols())?;
        let mut out = x.to_owned();
        for (j, mut column) in out.axis_iter_mut(Axis(1)).enumerate() {
            let (mean, scale) = self.column(j);
            column.mapv_inplace(|v| f(v, mean, scale));
        }
        Ok(out)
    }

    /// Scalar values standardised with the first (or only) column.
    pub fn standardize_values(&self, values: ArrayView1<'_, f64>) -> FieldResult<Array1<f64>> {
        self.check_width(1)?;
        let (mean, scale) = self.column(0);
        Ok(values.mapv(|v| (v - mean) / scale))
    }

    pub fn unstandardize_values(&self, values: ArrayView1<'_, f64>) -> FieldResult<Array1<f64>> {
        self.check_width(1)?;
        let (mean, scale) = self.column(0);
        Ok(values.mapv(|v| v * scale + mean))
    }
}

fn population_stats(values: impl Iterator<Item = f64> + Clone) -> (f64, f64, bool) {
    let mut count = 0usize;
    let mut sum = 0.0;
    let mut first = None;
    let mut constant = true;
    for v in values.clone() {
        count += 1;
        sum += v;
        match first {
            None => first = Some(v),
            Some(f) => constant &= f == v,
        }
    }
    let mean = sum / count as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / count as f64;
    (mean, var.sqrt(), constant)
}

fn resolve_scale(std: f64, constant: bool, feature: usize, floor: Option<f64>) -> FieldResult<f64> {
    if !constant && std > 0.0 {
        return Ok(std);
    }
    floor.ok_or(FieldError::DegenerateFeature { feature })
}

/// Fits mean and population standard deviation over `population` (rows are
/// samples). Constant features fail with [`FieldError::DegenerateFeature`]
/// unless `floor` supplies a replacement scale.
pub fn fit_scaler(
    population: ArrayView2<'_, f64>,
    scope: ScalerScope,
    floor: Option<f64>,
) -> FieldResult<StandardizationParams> {
    if population.is_empty() {
        return Err(FieldError::EmptyInput("standardization population"));
    }
    if let Some(f) = floor {
        if !(f.is_finite() && f > 0.0) {
            return Err(FieldError::invalid("scaler floor", format!("{f} must be positive")));
        }
    }
    let (mean, scale) = match scope {
        ScalerScope::Global => {
            let (mean, std, constant) = population_stats(population.iter().copied());
            (vec![mean], vec![resolve_scale(std, constant, 0, floor)?])
        }
        ScalerScope::PerFeature => {
            let mut means = Vec::with_capacity(population.ncols());
            let mut scales = Vec::with_capacity(population.ncols());
            for (feature, column) in population.axis_iter(Axis(1)).enumerate() {
                let (mean, std, constant) = population_stats(column.iter().copied());
                means.push(mean);
                scales.push(resolve_scale(std, constant, feature, floor)?);
            }
            (means, scales)
        }
    };
    Ok(StandardizationParams { scope, mean, scale })
}

/// Fits a single-column scaler for scalar targets.
pub fn fit_target_scaler(values: ArrayView1<'_, f64>, floor: Option<f64>) -> FieldResult<StandardizationParams> {
    fit_scaler(values.insert_axis(Axis(1)), ScalerScope::Global, floor)
}

pub fn standardize(x: ArrayView2<'_, f64>, params: &StandardizationParams) -> FieldResult<Array2<f64>> {
    params.map_columns(x, |v, mean, scale| (v - mean) / scale)
}

pub fn unstandardize(x: ArrayView2<'_, f64>, params: &StandardizationParams) -> FieldResult<Array2<f64>> {
    params.map_columns(x, |v, mean, scale| v * scale + mean)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn population(rng: &mut StdRng, rows: usize) -> Array2<f64> {
        Array::from_shape_fn((rows, 4), |(_, j)| rng.gen_range(-2.0..2.0) * (j + 1) as f64 + j as f64)
    }

    #[test]
    fn round_trip_restores_training_and_held_out_points() {
        let mut rng = StdRng::seed_from_u64(5);
        let train = population(&mut rng, 64);
        let held_out = population(&mut rng, 16);
        for scope in [ScalerScope::Global, ScalerScope::PerFeature] {
            let params = fit_scaler(train.view(), scope, None).unwrap();
            for x in [&train, &held_out] {
                let z = standardize(x.view(), &params).unwrap();
                let back = unstandardize(z.view(), &params).unwrap();
                for (a, b) in back.iter().zip(x.iter()) {
                    assert!((a - b).abs() < 1e-12, "{a} vs {b}");
                }
            }
        }
    }

    #[test]
    fn per_feature_scaling_yields_unit_moments() {
        let mut rng = StdRng::seed_from_u64(9);
        let train = population(&mut rng, 128);
        let params = fit_scaler(train.view(), ScalerScope::PerFeature, None).unwrap();
        let z = standardize(train.view(), &params).unwrap();
        for column in z.axis_iter(Axis(1)) {
            assert!(column.mean().unwrap().abs() < 1e-12);
            assert!((column.std(0.0) - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn global_scope_shares_one_scaler() {
        let x = array![[1.0, 3.0], [5.0, 7.0]];
        let params = fit_scaler(x.view(), ScalerScope::Global, None).unwrap();
        assert_eq!(params.mean(), &[4.0]);
        assert_eq!(params.width(), None);
        let z = standardize(x.view(), &params).unwrap();
        assert_eq!(z[[0, 0]], -z[[1, 1]]);
    }

    #[test]
    fn constant_features_need_a_floor() {
        let x = array![[1.0, 0.1], [2.0, 0.1], [3.0, 0.1]];
        match fit_scaler(x.view(), ScalerScope::PerFeature, None) {
            Err(FieldError::DegenerateFeature { feature }) => assert_eq!(feature, 1),
            other => panic!("unexpected result: {other:?}"),
        }
        let params = fit_scaler(x.view(), ScalerScope::PerFeature, Some(0.5)).unwrap();
        assert_eq!(params.scale()[1], 0.5);
        assert!(fit_scaler(x.view(), ScalerScope::PerFeature, Some(0.0)).is_err());
    }

    #[test]
    fn width_mismatch_is_rejected() {
        let x = array![[1.0, 2.0], [2.0, 5.0]];
        let params = fit_scaler(x.view(), ScalerScope::PerFeature, None).unwrap();
        let wide = array![[1.0, 2.0, 3.0]];
        assert!(standardize(wide.view(), &params).is_err());
        assert!(params.standardize_values(array![1.0].view()).is_err());
    }

    #[test]
    fn target_scaler_round_trips() {
        let y = array![2.0, 4.0, 9.0];
        let params = fit_target_scaler(y.view(), None).unwrap();
        let z = params.standardize_values(y.view()).unwrap();
        let back = params.unstandardize_values(z.view()).unwrap();
        for (a, b) in back.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-12);
        }
    }
}
