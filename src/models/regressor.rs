//! Regressor facade over the subprocess training protocol.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ndarray::{Array1, Array2};

use crate::config::{EngineCommand, ParamValue};
use crate::error::{EstimatorError, Result};
use crate::models::base::{self, MvaCore};
use crate::request::ModelKind;

/// Regressor backed by the external engine. Returns the engine's raw score
/// per row, unmodified.
#[derive(Debug, Clone)]
pub struct MvaRegressor {
    core: MvaCore,
}

impl MvaRegressor {
    pub fn new(engine: EngineCommand) -> Self {
        Self {
            core: MvaCore::new(engine),
        }
    }

    /// Engine algorithm method, e.g. `kBDT`.
    pub fn with_method(mut self, method: &str) -> Self {
        self.core.method = method.to_string();
        self
    }

    /// Names for the feature columns, in matrix column order.
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.core.features = Some(features);
        self
    }

    /// Engine factory options, e.g. `!V:!Silent:Color`.
    pub fn with_factory_options(mut self, options: &str) -> Self {
        self.core.factory_options = options.to_string();
        self
    }

    /// Parent directory for the per-operation working directories. Defaults
    /// to the system temporary directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.core.scratch_root = Some(root.into());
        self
    }

    /// The trained formula text, if fitted.
    pub fn formula_xml(&self) -> Option<&str> {
        self.core.formula_xml()
    }

    /// Train on `x` with target values `y` and optional per-row weights.
    pub fn fit(
        &mut self,
        x: &Array2<f32>,
        y: &[f32],
        sample_weight: Option<&[f32]>,
    ) -> Result<&mut Self> {
        base::check_shapes(x, y.len(), sample_weight)?;
        let options = self.core.effective_options("AnalysisType=Regression");
        self.core
            .train(x, y, sample_weight, ModelKind::Regression, options)?;
        Ok(self)
    }

    /// Predict one value per row of `x`.
    pub fn predict(&self, x: &Array2<f32>) -> Result<Vec<f32>> {
        self.core.evaluate(x, ModelKind::Regression, None)
    }

    /// Staged (per-boosting-iteration) predictions are not exposed through
    /// the engine protocol.
    pub fn staged_predict(&self, _x: &Array2<f32>) -> Result<Vec<Vec<f32>>> {
        Err(EstimatorError::UnsupportedOperation("staged_predict"))
    }

    /// Feature importances are not exposed through the engine protocol.
    pub fn feature_importances(&self) -> Result<Array1<f32>> {
        Err(EstimatorError::UnsupportedOperation("feature_importances"))
    }

    /// Set several parameters at once; see [`Self::set_param`].
    pub fn set_params<I>(&mut self, params: I) -> Result<&mut Self>
    where
        I: IntoIterator<Item = (String, ParamValue)>,
    {
        for (name, value) in params {
            self.set_param(&name, value)?;
        }
        Ok(self)
    }

    /// Set one parameter, with the same attribute/passthrough split as the
    /// classifier.
    pub fn set_param(&mut self, name: &str, value: ParamValue) -> Result<&mut Self> {
        match name {
            "method" => self.core.method = base::expect_str(name, value)?,
            "factory_options" => self.core.factory_options = base::expect_str(name, value)?,
            "features" => self.core.features = Some(base::expect_list(name, value)?),
            _ => self.core.store_method_parameter(name, value),
        }
        Ok(self)
    }

    /// The engine passthrough parameters plus the facade's own attributes.
    pub fn get_params(&self) -> BTreeMap<String, ParamValue> {
        self.core.named_params()
    }
}
