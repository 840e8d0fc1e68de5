//! Shared training and inference pipeline for the estimator facades.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use ndarray::Array2;

use crate::config::{EngineCommand, ParamValue};
use crate::error::{EstimatorError, Result};
use crate::process::{self, PREDICT_ROUTINE, TRAIN_ROUTINE};
use crate::request::{
    EngineConfig, ModelKind, PredictionRequest, TrainingRequest, PAYLOAD_VERSION,
};
use crate::staging::{
    self, PREDICTION_FILE, RESULT_FILE, TARGET_COLUMN, TEST_FILE, TEST_TABLE, TRAIN_FILE,
    TRAIN_TABLE, WEIGHT_COLUMN,
};
use crate::workspace::Workspace;

/// Job identifier the engine registers training runs under; part of the
/// weights-file naming contract.
pub const JOB_NAME: &str = "MvaEstimation";
/// Name under which the trained procedure is registered. Doubles as the
/// prediction column name on the way back.
pub const METHOD_NAME: &str = "MvaEstimator";

/// Parameter names accepted by `set_params` but never forwarded, because the
/// engine does not understand them.
pub(crate) const PASS_PARAMETERS: &[&str] = &["random_state"];

/// State and pipeline shared by the classifier and regressor facades.
///
/// Holds the engine launch configuration, the estimator parameters, and the
/// trained formula once a fit has succeeded. The formula is immutable after
/// training; prediction runs only read it, each into its own workspace, so a
/// fitted estimator can serve concurrent predict calls.
#[derive(Debug, Clone)]
pub struct MvaCore {
    pub(crate) engine: EngineCommand,
    pub(crate) method: String,
    pub(crate) factory_options: String,
    pub(crate) features: Option<Vec<String>>,
    pub(crate) method_parameters: BTreeMap<String, ParamValue>,
    pub(crate) scratch_root: Option<PathBuf>,
    formula_xml: Option<String>,
}

impl MvaCore {
    pub(crate) fn new(engine: EngineCommand) -> Self {
        Self {
            engine,
            method: "kBDT".to_string(),
            factory_options: String::new(),
            features: None,
            method_parameters: BTreeMap::new(),
            scratch_root: None,
            formula_xml: None,
        }
    }

    /// The trained formula text, once `fit` has succeeded.
    pub(crate) fn formula_xml(&self) -> Option<&str> {
        self.formula_xml.as_deref()
    }

    fn formula(&self) -> Result<&str> {
        self.formula_xml.as_deref().ok_or_else(|| {
            EstimatorError::Precondition(
                "estimator is not fitted, call `fit` before predicting".to_string(),
            )
        })
    }

    /// Compose the option string for one run without mutating the stored
    /// value, so repeated fits do not accumulate directives.
    pub(crate) fn effective_options(&self, analysis_directive: &str) -> String {
        if self.factory_options.is_empty() {
            analysis_directive.to_string()
        } else {
            format!("{}:{}", self.factory_options, analysis_directive)
        }
    }

    /// Store an engine passthrough parameter. Names in [`PASS_PARAMETERS`]
    /// are accepted and dropped.
    pub(crate) fn store_method_parameter(&mut self, name: &str, value: ParamValue) {
        if PASS_PARAMETERS.contains(&name) {
            return;
        }
        self.method_parameters.insert(name.to_string(), value);
    }

    /// The method-parameters mapping plus the facade's own named attributes.
    pub(crate) fn named_params(&self) -> BTreeMap<String, ParamValue> {
        let mut params = self.method_parameters.clone();
        params.insert("method".to_string(), ParamValue::Str(self.method.clone()));
        params.insert(
            "factory_options".to_string(),
            ParamValue::Str(self.factory_options.clone()),
        );
        if let Some(features) = &self.features {
            params.insert("features".to_string(), ParamValue::List(features.clone()));
        }
        params
    }

    /// Resolve the staged column names: the configured feature list, or
    /// generated positional names. Rejects length mismatches and collisions
    /// with the reserved dataset columns.
    pub(crate) fn resolve_feature_names(&self, n_features: usize) -> Result<Vec<String>> {
        let names = match &self.features {
            Some(names) => {
                if names.len() != n_features {
                    return Err(EstimatorError::Configuration(format!(
                        "{} feature names configured but X has {} columns",
                        names.len(),
                        n_features
                    )));
                }
                names.clone()
            }
            None => (1..=n_features).map(|i| format!("feature_{}", i)).collect(),
        };
        for name in &names {
            if name == WEIGHT_COLUMN || name == TARGET_COLUMN {
                return Err(EstimatorError::Configuration(format!(
                    "feature name '{}' collides with a reserved dataset column",
                    name
                )));
            }
        }
        Ok(names)
    }

    fn engine_config(&self, effective_options: String) -> EngineConfig {
        EngineConfig {
            version: PAYLOAD_VERSION,
            method: self.method.clone(),
            method_name: METHOD_NAME.to_string(),
            factory_options: effective_options,
            method_parameters: self.method_parameters.clone(),
        }
    }

    /// Stage the dataset, run the training routine and recover the formula.
    ///
    /// The estimator transitions to fitted only when staging, the subprocess
    /// handshake and the artifact read-back all succeed. The workspace is
    /// removed on every path out of this function.
    pub(crate) fn train(
        &mut self,
        x: &Array2<f32>,
        target: &[f32],
        sample_weight: Option<&[f32]>,
        kind: ModelKind,
        effective_options: String,
    ) -> Result<()> {
        let feature_names = self.resolve_feature_names(x.ncols())?;

        let uniform;
        let weights = match sample_weight {
            Some(weights) => weights,
            None => {
                uniform = vec![1.0f32; x.nrows()];
                &uniform
            }
        };

        let workspace = Workspace::create(self.scratch_root.as_deref())?;
        let dataset_path = workspace.file(TRAIN_FILE);
        staging::stage_dataset(&dataset_path, &feature_names, x, Some(target), Some(weights))?;

        let request = TrainingRequest {
            version: PAYLOAD_VERSION,
            dataset_path: dataset_path.to_string_lossy().into_owned(),
            dataset_table: TRAIN_TABLE.to_string(),
            weight_column: WEIGHT_COLUMN.to_string(),
            target_column: TARGET_COLUMN.to_string(),
            model_kind: kind,
            features: feature_names,
            job_name: JOB_NAME.to_string(),
            method_name: METHOD_NAME.to_string(),
        };
        let payloads = vec![
            encode_payload(&self.engine_config(effective_options))?,
            encode_payload(&request)?,
        ];
        process::run_engine(&self.engine, TRAIN_ROUTINE, workspace.path(), &payloads)?;

        staging::verify_result_table(&workspace.file(RESULT_FILE))?;

        let weights_path = workspace
            .path()
            .join("weights")
            .join(format!("{}_{}.weights.xml", JOB_NAME, METHOD_NAME));
        let formula = fs::read_to_string(&weights_path).map_err(|e| {
            EstimatorError::ArtifactContract {
                path: weights_path.clone(),
                detail: format!("engine reported success but the weights file is unreadable: {}", e),
            }
        })?;

        log::info!("training finished, recovered a {} byte formula", formula.len());
        self.formula_xml = Some(formula);
        Ok(())
    }

    /// Write the formula out, stage the features, run the inference routine
    /// and read the prediction column back, aligned row for row with `x`.
    pub(crate) fn evaluate(
        &self,
        x: &Array2<f32>,
        kind: ModelKind,
        output_transform: Option<String>,
    ) -> Result<Vec<f32>> {
        let formula = self.formula()?;
        let feature_names = self.resolve_feature_names(x.ncols())?;

        let workspace = Workspace::create(self.scratch_root.as_deref())?;
        let model_path = workspace.file("model.weights.xml");
        fs::write(&model_path, formula).map_err(|e| {
            EstimatorError::Resource(format!(
                "failed to write model file {}: {}",
                model_path.display(),
                e
            ))
        })?;

        let dataset_path = workspace.file(TEST_FILE);
        staging::stage_dataset(&dataset_path, &feature_names, x, None, None)?;

        let request = PredictionRequest {
            version: PAYLOAD_VERSION,
            dataset_path: dataset_path.to_string_lossy().into_owned(),
            dataset_table: TEST_TABLE.to_string(),
            model_path: model_path.to_string_lossy().into_owned(),
            model_kind: kind,
            output_transform,
            features: feature_names,
            method_name: METHOD_NAME.to_string(),
        };
        let payloads = vec![encode_payload(&request)?];
        process::run_engine(&self.engine, PREDICT_ROUTINE, workspace.path(), &payloads)?;

        let prediction_path = workspace.file(PREDICTION_FILE);
        let scores = staging::read_score_column(&prediction_path, METHOD_NAME)?;
        if scores.len() != x.nrows() {
            return Err(EstimatorError::ArtifactContract {
                path: prediction_path,
                detail: format!(
                    "expected {} prediction rows, found {}",
                    x.nrows(),
                    scores.len()
                ),
            });
        }
        Ok(scores)
    }
}

fn encode_payload<T: serde::Serialize>(payload: &T) -> Result<serde_json::Value> {
    serde_json::to_value(payload)
        .map_err(|e| EstimatorError::Resource(format!("failed to encode engine payload: {}", e)))
}

/// Validate that the row counts of X, y and the optional weights agree.
pub(crate) fn check_shapes(
    x: &Array2<f32>,
    target_len: usize,
    sample_weight: Option<&[f32]>,
) -> Result<()> {
    if x.nrows() == 0 {
        return Err(EstimatorError::Configuration(
            "cannot operate on an empty dataset".to_string(),
        ));
    }
    if x.nrows() != target_len {
        return Err(EstimatorError::Configuration(format!(
            "X has {} rows but y has {} entries",
            x.nrows(),
            target_len
        )));
    }
    if let Some(weights) = sample_weight {
        if weights.len() != x.nrows() {
            return Err(EstimatorError::Configuration(format!(
                "X has {} rows but sample_weight has {} entries",
                x.nrows(),
                weights.len()
            )));
        }
    }
    Ok(())
}

/// Extract a string value or reject the parameter with a typed error.
pub(crate) fn expect_str(name: &str, value: ParamValue) -> Result<String> {
    match value {
        ParamValue::Str(value) => Ok(value),
        other => Err(EstimatorError::Configuration(format!(
            "parameter '{}' expects a string value, got '{}'",
            name, other
        ))),
    }
}

/// Extract a list value or reject the parameter with a typed error.
pub(crate) fn expect_list(name: &str, value: ParamValue) -> Result<Vec<String>> {
    match value {
        ParamValue::List(items) => Ok(items),
        other => Err(EstimatorError::Configuration(format!(
            "parameter '{}' expects a list value, got '{}'",
            name, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> MvaCore {
        MvaCore::new(EngineCommand::new("/bin/true"))
    }

    #[test]
    fn generated_feature_names_are_positional() {
        let names = core().resolve_feature_names(3).unwrap();
        assert_eq!(names, vec!["feature_1", "feature_2", "feature_3"]);
    }

    #[test]
    fn configured_feature_names_must_match_the_column_count() {
        let mut core = core();
        core.features = Some(vec!["pt".to_string()]);
        assert!(matches!(
            core.resolve_feature_names(2),
            Err(EstimatorError::Configuration(_))
        ));
    }

    #[test]
    fn reserved_column_names_are_rejected_as_features() {
        let mut core = core();
        core.features = Some(vec![WEIGHT_COLUMN.to_string(), "pt".to_string()]);
        assert!(matches!(
            core.resolve_feature_names(2),
            Err(EstimatorError::Configuration(_))
        ));
    }

    #[test]
    fn shape_mismatches_are_configuration_errors() {
        let x = Array2::from_shape_vec((2, 1), vec![1.0, 2.0]).unwrap();
        assert!(check_shapes(&x, 2, None).is_ok());
        assert!(matches!(
            check_shapes(&x, 3, None),
            Err(EstimatorError::Configuration(_))
        ));
        assert!(matches!(
            check_shapes(&x, 2, Some(&[1.0])),
            Err(EstimatorError::Configuration(_))
        ));
    }

    #[test]
    fn denylisted_parameters_are_accepted_but_dropped() {
        let mut core = core();
        core.store_method_parameter("random_state", ParamValue::Int(42));
        core.store_method_parameter("NTrees", ParamValue::Int(100));
        assert!(!core.method_parameters.contains_key("random_state"));
        assert_eq!(core.method_parameters.get("NTrees"), Some(&ParamValue::Int(100)));
    }

    #[test]
    fn effective_options_do_not_mutate_the_stored_string() {
        let mut core = core();
        core.factory_options = "!V:!Silent".to_string();
        assert_eq!(
            core.effective_options("AnalysisType=Classification"),
            "!V:!Silent:AnalysisType=Classification"
        );
        assert_eq!(core.factory_options, "!V:!Silent");
        core.factory_options = String::new();
        assert_eq!(
            core.effective_options("AnalysisType=Regression"),
            "AnalysisType=Regression"
        );
    }
}
