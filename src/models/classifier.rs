//! Binary classifier facade over the subprocess training protocol.

use std::collections::BTreeMap;
use std::path::PathBuf;

use ndarray::{Array1, Array2};

use crate::config::{EngineCommand, OutputTransform, ParamValue};
use crate::error::{EstimatorError, Result};
use crate::models::base::{self, MvaCore};
use crate::request::ModelKind;

/// Ordered set of the unique class labels observed during `fit`.
///
/// Fixes the probability-matrix column order for the lifetime of the fitted
/// estimator: column `i` belongs to `labels()[i]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassLabelSet {
    labels: Vec<i32>,
}

impl ClassLabelSet {
    pub fn from_labels(y: &[i32]) -> Self {
        let mut labels = y.to_vec();
        labels.sort_unstable();
        labels.dedup();
        Self { labels }
    }

    pub fn labels(&self) -> &[i32] {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn index_of(&self, label: i32) -> Option<usize> {
        self.labels.iter().position(|&known| known == label)
    }
}

/// Binary classifier backed by the external engine.
///
/// Supports exactly two classes; the engine protocol does not expose
/// multiclass training through this adapter.
#[derive(Debug, Clone)]
pub struct MvaClassifier {
    core: MvaCore,
    transform: String,
    classes: Option<ClassLabelSet>,
}

impl MvaClassifier {
    pub fn new(engine: EngineCommand) -> Self {
        Self {
            core: MvaCore::new(engine),
            transform: "bdt".to_string(),
            classes: None,
        }
    }

    /// Engine algorithm method, e.g. `kBDT` or `kMLP`.
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

    /// Score-to-probability transform policy. Validated when predictions are
    /// requested, not here.
    pub fn with_transform(mut self, transform: &str) -> Self {
        self.transform = transform.to_string();
        self
    }

    /// Parent directory for the per-operation working directories. Defaults
    /// to the system temporary directory.
    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.core.scratch_root = Some(root.into());
        self
    }

    /// The label set observed during `fit`, if fitted.
    pub fn classes(&self) -> Option<&ClassLabelSet> {
        self.classes.as_ref()
    }

    /// The trained formula text, if fitted.
    pub fn formula_xml(&self) -> Option<&str> {
        self.core.formula_xml()
    }

    /// Train on `x` with labels `y` and optional per-row weights.
    ///
    /// Exactly two distinct labels are required; anything else is rejected
    /// before a subprocess is spawned. On success the estimator becomes
    /// fitted and stays fitted.
    pub fn fit(
        &mut self,
        x: &Array2<f32>,
        y: &[i32],
        sample_weight: Option<&[f32]>,
    ) -> Result<&mut Self> {
        base::check_shapes(x, y.len(), sample_weight)?;

        let classes = ClassLabelSet::from_labels(y);
        if classes.len() != 2 {
            return Err(EstimatorError::Configuration(format!(
                "binary classification requires exactly 2 classes, data contains {}",
                classes.len()
            )));
        }

        // The engine sees the class index, not the raw label, so the staged
        // target is always 0/1 with 1 marking the second (positive) class.
        let positive = classes.labels()[1];
        let target: Vec<f32> = y
            .iter()
            .map(|&label| if label == positive { 1.0 } else { 0.0 })
            .collect();

        let options = self.core.effective_options("AnalysisType=Classification");
        self.core
            .train(x, &target, sample_weight, ModelKind::Classification, options)?;
        self.classes = Some(classes);
        Ok(self)
    }

    /// Predict the two-column class probability matrix for `x`.
    ///
    /// Column order follows [`Self::classes`]; each row sums to 1. The
    /// configured transform name is parsed here, so an unrecognized value
    /// fails at prediction time.
    pub fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        let transform: OutputTransform = self.transform.parse()?;
        let scores = self
            .core
            .evaluate(x, ModelKind::Classification, Some(transform.directive()))?;
        Ok(to_probability_matrix(&scores, &transform))
    }

    /// Staged (per-boosting-iteration) predictions are not exposed through
    /// the engine protocol.
    pub fn staged_predict_proba(&self, _x: &Array2<f32>) -> Result<Vec<Array2<f32>>> {
        Err(EstimatorError::UnsupportedOperation("staged_predict_proba"))
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

    /// Set one parameter. Names of facade attributes overwrite the
    /// attribute; any other name is forwarded verbatim to the engine, except
    /// a small denylist the engine does not understand, which is accepted
    /// and dropped.
    pub fn set_param(&mut self, name: &str, value: ParamValue) -> Result<&mut Self> {
        match name {
            "method" => self.core.method = base::expect_str(name, value)?,
            "factory_options" => self.core.factory_options = base::expect_str(name, value)?,
            "features" => self.core.features = Some(base::expect_list(name, value)?),
            "transform" => self.transform = base::expect_str(name, value)?,
            _ => self.core.store_method_parameter(name, value),
        }
        Ok(self)
    }

    /// The engine passthrough parameters plus the facade's own attributes.
    pub fn get_params(&self) -> BTreeMap<String, ParamValue> {
        let mut params = self.core.named_params();
        params.insert("transform".to_string(), ParamValue::Str(self.transform.clone()));
        params
    }
}

/// Map raw engine scores to a two-column probability matrix.
///
/// For `sig_eff=<e>` the engine already evaluated its cut at the requested
/// efficiency and the scores are pass/fail indicators; they are binarized at
/// 0.5 and emitted as hard 0/1 rows.
fn to_probability_matrix(scores: &[f32], transform: &OutputTransform) -> Array2<f32> {
    let mut proba = Array2::zeros((scores.len(), 2));
    for (row, &score) in scores.iter().enumerate() {
        let positive = match transform {
            OutputTransform::Identity => score,
            OutputTransform::Sigmoid => 1.0 / (1.0 + (-score).exp()),
            OutputTransform::Bdt => (score + 1.0) / 2.0,
            OutputTransform::SignalEfficiency(_) => {
                if score >= 0.5 {
                    1.0
                } else {
                    0.0
                }
            }
        };
        proba[(row, 0)] = 1.0 - positive;
        proba[(row, 1)] = positive;
    }
    proba
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classifier() -> MvaClassifier {
        MvaClassifier::new(EngineCommand::new("/bin/true"))
    }

    #[test]
    fn label_set_is_ordered_and_deduplicated() {
        let classes = ClassLabelSet::from_labels(&[1, -1, 1, -1, 1]);
        assert_eq!(classes.labels(), &[-1, 1]);
        assert_eq!(classes.index_of(1), Some(1));
        assert_eq!(classes.index_of(0), None);
    }

    #[test]
    fn bdt_transform_rescales_linearly() {
        let proba = to_probability_matrix(&[-1.0, 0.0, 0.5, 1.0], &OutputTransform::Bdt);
        assert_eq!(proba[(0, 1)], 0.0);
        assert_eq!(proba[(1, 1)], 0.5);
        assert_eq!(proba[(2, 1)], 0.75);
        assert_eq!(proba[(3, 1)], 1.0);
        for row in 0..4 {
            assert!((proba[(row, 0)] + proba[(row, 1)] - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn sigmoid_transform_is_logistic() {
        let proba = to_probability_matrix(&[0.0, 2.0, -2.0], &OutputTransform::Sigmoid);
        assert!((proba[(0, 1)] - 0.5).abs() < 1e-6);
        assert!((proba[(1, 1)] - 1.0 / (1.0 + (-2.0f32).exp())).abs() < 1e-6);
        assert!((proba[(2, 1)] - 1.0 / (1.0 + 2.0f32.exp())).abs() < 1e-6);
    }

    #[test]
    fn identity_transform_passes_scores_through() {
        let proba = to_probability_matrix(&[0.2, 0.9], &OutputTransform::Identity);
        assert_eq!(proba[(0, 1)], 0.2);
        assert!((proba[(0, 0)] - 0.8).abs() < 1e-6);
        assert_eq!(proba[(1, 1)], 0.9);
    }

    #[test]
    fn sig_eff_transform_emits_indicator_rows() {
        let transform = OutputTransform::SignalEfficiency(0.4);
        let proba = to_probability_matrix(&[0.0, 1.0, 0.49, 0.51], &transform);
        assert_eq!(proba[(0, 1)], 0.0);
        assert_eq!(proba[(1, 1)], 1.0);
        assert_eq!(proba[(2, 1)], 0.0);
        assert_eq!(proba[(3, 1)], 1.0);
        for row in 0..4 {
            assert_eq!(proba[(row, 0)] + proba[(row, 1)], 1.0);
        }
    }

    #[test]
    fn unknown_transform_fails_at_prediction_time() {
        let clf = classifier().with_transform("softmax");
        let x = Array2::from_shape_vec((1, 1), vec![0.0]).unwrap();
        let err = clf.predict_proba(&x).unwrap_err();
        assert!(matches!(err, EstimatorError::Configuration(_)));
    }

    #[test]
    fn parameter_merge_separates_attributes_from_passthrough() {
        let mut clf = classifier();
        clf.set_param("method", ParamValue::Str("kMLP".to_string())).unwrap();
        clf.set_param("NTrees", ParamValue::Int(100)).unwrap();
        clf.set_param("random_state", ParamValue::Int(42)).unwrap();
        clf.set_param("transform", ParamValue::Str("sigmoid".to_string())).unwrap();

        let params = clf.get_params();
        assert_eq!(params.get("method"), Some(&ParamValue::Str("kMLP".to_string())));
        assert_eq!(params.get("NTrees"), Some(&ParamValue::Int(100)));
        assert_eq!(params.get("transform"), Some(&ParamValue::Str("sigmoid".to_string())));
        assert!(!params.contains_key("random_state"));
    }

    #[test]
    fn attribute_parameters_reject_mistyped_values() {
        let mut clf = classifier();
        let err = clf.set_param("method", ParamValue::Int(3)).unwrap_err();
        assert!(matches!(err, EstimatorError::Configuration(_)));
    }

    #[test]
    fn staged_predictions_are_unsupported() {
        let clf = classifier();
        let x = Array2::from_shape_vec((1, 1), vec![0.0]).unwrap();
        assert!(matches!(
            clf.staged_predict_proba(&x),
            Err(EstimatorError::UnsupportedOperation("staged_predict_proba"))
        ));
        assert!(matches!(
            clf.feature_importances(),
            Err(EstimatorError::UnsupportedOperation("feature_importances"))
        ));
    }
}
