// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

//! Standardised linear regression from flattened windows to a scalar target.
//!
//! Feature and target scalers are fit once on the training batch and reused
//! unchanged for every later prediction, so evaluation data never leaks into
//! the standardisation.

pub mod metrics;
pub mod ridge;
pub mod scaler;
pub mod sparsify;

pub use ridge::LinearModel;
pub use scaler::{
    fit_scaler, fit_target_scaler, standardize, unstandardize, ScalerScope, StandardizationParams,
};
pub use sparsify::{sparsify, SparsityReport};

use crate::error::FieldResult;
use crate::window::WindowBatch;
use ndarray::{Array1, ArrayView1, ArrayView2};
use serde::{Deserialize, Serialize};
use spiral_config::PipelineConfig;
use tracing::info;

/// Fitting options for [`StandardizedRegressor`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegressorConfig {
    /// Ridge penalty; `0.0` is ordinary least squares.
    pub regularization: f64,
    pub scope: ScalerScope,
    /// Replacement scale for constant features.
    pub floor: Option<f64>,
}

impl Default for RegressorConfig {
    fn default() -> Self {
        Self {
            regularization: 1.0,
            scope: ScalerScope::Global,
            floor: None,
        }
    }
}

impl From<&PipelineConfig> for RegressorConfig {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            regularization: config.regularization,
            scope: config.scaler_scope.into(),
            floor: config.scaler_floor,
        }
    }
}

/// Scores of a fitted regressor on a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub rmse: f64,
    pub r2: f64,
}

/// Linear model operating in standardised feature and target space.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardizedRegressor {
    features: StandardizationParams,
    target: StandardizationParams,
    model: LinearModel,
}

impl StandardizedRegressor {
    pub fn fit(batch: &WindowBatch, config: &RegressorConfig) -> FieldResult<Self> {
        Self::fit_arrays(batch.features(), batch.targets(), config)
    }

    pub fn fit_arrays(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        config: &RegressorConfig,
    ) -> FieldResult<Self> {
        let features = fit_scaler(x, config.scope, config.floor)?;
        let target = fit_target_scaler(y, config.floor)?;
        let xs = standardize(x, &features)?;
        let ys = target.standardize_values(y)?;
        let model = ridge::fit(xs.view(), ys.view(), config.regularization)?;
        info!(
            samples = x.nrows(),
            features = x.ncols(),
            regularization = config.regularization,
            scope = ?config.scope,
            "fitted standardized regressor"
        );
        Ok(Self {
            features,
            target,
            model,
        })
    }

    pub fn feature_params(&self) -> &StandardizationParams {
        &self.features
    }

    pub fn target_params(&self) -> &StandardizationParams {
        &self.target
    }

    /// Model in standardised space.
    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    /// Predictions in the original target units.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> FieldResult<Array1<f64>> {
        let xs = standardize(x, &self.features)?;
        let ys = self.model.predict(xs.view())?;
        self.target.unstandardize_values(ys.view())
    }

    pub fn evaluate(&self, batch: &WindowBatch) -> FieldResult<Evaluation> {
        let predicted = self.predict(batch.features())?;
        Ok(Evaluation {
            rmse: metrics::rmse(batch.targets(), predicted.view())?,
            r2: metrics::r2_score(batch.targets(), predicted.view())?,
        })
    }

    /// Zeroes the smallest standardised weights, keeping at least
    /// `keep_ratio` of them. The intercept is left unchanged.
    pub fn sparsify(&mut self, keep_ratio: f64) -> FieldResult<SparsityReport> {
        let (weights, threshold) = sparsify(self.model.weights(), keep_ratio)?;
        let report = SparsityReport::new(keep_ratio, &weights, threshold);
        self.model.set_weights(weights);
        info!(
            kept = report.kept,
            zeroed = report.zeroed,
            threshold = report.threshold,
            "sparsified regressor weights"
        );
        Ok(report)
    }
}
