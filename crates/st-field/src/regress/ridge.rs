// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Ridge-regularised least squares on dense feature matrices.

use crate::error::{FieldError, FieldResult};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Singular values below this fraction of the largest are treated as zero.
const RANK_TOLERANCE: f64 = 1e-10;

/// Linear map `y = x · weights + intercept`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    weights: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    pub fn new(weights: Vec<f64>, intercept: f64) -> Self {
        Self { weights, intercept }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    pub(crate) fn set_weights(&mut self, weights: Vec<f64>) {
        debug_assert_eq!(weights.len(), self.weights.len());
        self.weights = weights;
    }

    pub fn predict(&self, x: ArrayView2<'_, f64>) -> FieldResult<Array1<f64>> {
        if x.ncols() != self.weights.len() {
            return Err(FieldError::invalid(
                "prediction input",
                format!("{} features supplied, model has {}", x.ncols(), self.weights.len()),
            ));
        }
        let weights = ArrayView1::from(self.weights.as_slice());
        Ok(x.dot(&weights) + self.intercept)
    }
}

/// Solves `(XcᵀXc + λI) w = Xcᵀyc` on mean-centred data; the intercept is
/// recovered from the means so it is never penalised.
///
/// `regularization == 0` is ordinary least squares, solved through an SVD so
/// rank-deficient designs yield the minimum-norm solution.
pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, regularization: f64) -> FieldResult<LinearModel> {
    let (rows, cols) = x.dim();
    if rows == 0 || cols == 0 {
        return Err(FieldError::EmptyInput("regression design matrix"));
    }
    if y.len() != rows {
        return Err(FieldError::invalid(
            "regression targets",
            format!("{} targets for {rows} samples", y.len()),
        ));
    }
    if !(regularization.is_finite() && regularization >= 0.0) {
        return Err(FieldError::invalid(
            "regularization",
            format!("{regularization} must be a non-negative finite value"),
        ));
    }

    let x_mean = x.mean_axis(Axis(0)).ok_or(FieldError::EmptyInput("regression design matrix"))?;
    let y_mean = y.mean().ok_or(FieldError::EmptyInput("regression targets"))?;
    let xc = &x - &x_mean;
    let yc = &y - y_mean;
    let gram = xc.t().dot(&xc);
    let moment = xc.t().dot(&yc);

    let mut lhs = DMatrix::from_fn(cols, cols, |i, j| gram[[i, j]]);
    let rhs = DVector::from_iterator(cols, moment.iter().copied());

    let solution = if regularization > 0.0 {
        for i in 0..cols {
            lhs[(i, i)] += regularization;
        }
        debug!(rows, cols, regularization, solver = "cholesky", "fitting ridge model");
        lhs.cholesky()
            .ok_or_else(|| FieldError::Solver("regularised gram matrix is not positive definite".into()))?
            .solve(&rhs)
    } else {
        debug!(rows, cols, solver = "svd", "fitting least-squares model");
        let svd = lhs.svd(true, true);
        let eps = svd.singular_values.max() * RANK_TOLERANCE;
        svd.solve(&rhs, eps).map_err(|err| FieldError::Solver(err.to_string()))?
    };

    let weights: Vec<f64> = solution.iter().copied().collect();
    let intercept = y_mean - weights.iter().zip(x_mean.iter()).map(|(w, m)| w * m).sum::<f64>();
    Ok(LinearModel { weights, intercept })
}

pub fn predict(model: &LinearModel, x: ArrayView2<'_, f64>) -> FieldResult<Array1<f64>> {
    model.predict(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn design(rows: usize) -> Array2<f64> {
        let mut rng = StdRng::seed_from_u64(17);
        Array2::from_shape_fn((rows, 3), |_| rng.gen_range(-1.0..1.0))
    }

    #[test]
    fn least_squares_recovers_exact_plane() {
        let x = design(40);
        let y = x.dot(&array![2.0, -3.0, 0.25]) + 0.5;
        let model = fit(x.view(), y.view(), 0.0).unwrap();
        for (w, expected) in model.weights().iter().zip([2.0, -3.0, 0.25]) {
            assert!((w - expected).abs() < 1e-9, "{w} vs {expected}");
        }
        assert!((model.intercept() - 0.5).abs() < 1e-9);
        let y_hat = predict(&model, x.view()).unwrap();
        for (a, b) in y_hat.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn regularization_shrinks_weights() {
        let x = design(40);
        let y = x.dot(&array![2.0, -3.0, 0.25]) + 0.5;
        let norm = |m: &LinearModel| m.weights().iter().map(|w| w * w).sum::<f64>();
        let ols = fit(x.view(), y.view(), 0.0).unwrap();
        let ridge = fit(x.view(), y.view(), 10.0).unwrap();
        let heavy = fit(x.view(), y.view(), 1e6).unwrap();
        assert!(norm(&ridge) < norm(&ols));
        assert!(norm(&heavy) < norm(&ridge));
        let mean = y.mean().unwrap();
        assert!((heavy.intercept() - mean).abs() < 0.1);
    }

    #[test]
    fn rank_deficient_design_takes_minimum_norm() {
        let column = array![1.0, 2.0, 3.0, 4.0, 5.0];
        let mut x = Array2::zeros((5, 2));
        x.column_mut(0).assign(&column);
        x.column_mut(1).assign(&column);
        let y = &column * 2.0;
        let model = fit(x.view(), y.view(), 0.0).unwrap();
        assert!((model.weights()[0] - 1.0).abs() < 1e-6);
        assert!((model.weights()[1] - 1.0).abs() < 1e-6);
        assert!(model.intercept().abs() < 1e-6);
    }

    #[test]
    fn invalid_inputs_are_rejected() {
        let x = design(4);
        assert!(fit(x.view(), array![1.0, 2.0].view(), 0.0).is_err());
        assert!(fit(x.view(), array![1.0, 2.0, 3.0, 4.0].view(), -1.0).is_err());
        let model = LinearModel::new(vec![1.0; 2], 0.0);
        assert!(model.predict(x.view()).is_err());
    }
}
