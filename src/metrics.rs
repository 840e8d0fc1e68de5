//! Signal/background quality metrics over predicted probability matrices.
//!
//! Metrics follow the estimator convention used by the model facades:
//! construct, `fit` on the labels (class discovery and weight preparation
//! happen there), then `evaluate` with the probability matrix produced by a
//! classifier. Probability columns must align with the label set the metric
//! discovered during its own `fit`.

use ndarray::Array2;

use crate::error::{EstimatorError, Result};

fn unique_classes(y: &[i32]) -> Vec<i32> {
    let mut classes = y.to_vec();
    classes.sort_unstable();
    classes.dedup();
    classes
}

fn resolve_weights(len: usize, sample_weight: Option<&[f32]>) -> Result<Vec<f32>> {
    match sample_weight {
        Some(weights) if weights.len() != len => Err(EstimatorError::Configuration(format!(
            "y has {} entries but sample_weight has {}",
            len,
            weights.len()
        ))),
        Some(weights) => Ok(weights.to_vec()),
        None => Ok(vec![1.0; len]),
    }
}

/// Weighted ROC curve over the positive-class scores.
///
/// Scores are scanned in descending order; one point is emitted per distinct
/// score value, carrying the cumulative background and signal efficiencies
/// at that threshold. Tied scores collapse into a single point.
fn roc_curve(
    is_signal: &[bool],
    scores: &[f32],
    weights: &[f32],
) -> (Vec<f32>, Vec<f32>, Vec<f32>) {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_unstable_by(|&a, &b| {
        scores[b]
            .partial_cmp(&scores[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut total_signal = 0.0f32;
    let mut total_background = 0.0f32;
    for (index, &signal) in is_signal.iter().enumerate() {
        if signal {
            total_signal += weights[index];
        } else {
            total_background += weights[index];
        }
    }

    let mut background_eff = Vec::new();
    let mut signal_eff = Vec::new();
    let mut thresholds = Vec::new();
    let mut cum_signal = 0.0f32;
    let mut cum_background = 0.0f32;

    let mut position = 0;
    while position < order.len() {
        let threshold = scores[order[position]];
        while position < order.len() && scores[order[position]] == threshold {
            let index = order[position];
            if is_signal[index] {
                cum_signal += weights[index];
            } else {
                cum_background += weights[index];
            }
            position += 1;
        }
        thresholds.push(threshold);
        signal_eff.push(if total_signal > 0.0 {
            cum_signal / total_signal
        } else {
            0.0
        });
        background_eff.push(if total_background > 0.0 {
            cum_background / total_background
        } else {
            0.0
        });
    }

    (background_eff, signal_eff, thresholds)
}

/// Trapezoidal area under a curve starting from the origin.
fn auc_from_curve(background_eff: &[f32], signal_eff: &[f32]) -> f32 {
    let mut auc = 0.0f32;
    let mut prev_b = 0.0f32;
    let mut prev_s = 0.0f32;
    for (&b, &s) in background_eff.iter().zip(signal_eff) {
        auc += (b - prev_b) * (s + prev_s) / 2.0;
        prev_b = b;
        prev_s = s;
    }
    auc
}

#[derive(Debug, Clone)]
struct RocAucState {
    classes: Vec<i32>,
    positive_index: usize,
    is_signal: Vec<bool>,
    weights: Vec<f32>,
}

/// Weighted area under the ROC curve for one class against the rest.
#[derive(Debug, Clone)]
pub struct RocAuc {
    pub positive_label: i32,
    state: Option<RocAucState>,
}

impl RocAuc {
    pub fn new(positive_label: i32) -> Self {
        Self {
            positive_label,
            state: None,
        }
    }

    /// Discover the label set and freeze the per-row weights.
    pub fn fit(&mut self, y: &[i32], sample_weight: Option<&[f32]>) -> Result<&mut Self> {
        let classes = unique_classes(y);
        let positive_index = classes
            .iter()
            .position(|&label| label == self.positive_label)
            .ok_or_else(|| {
                EstimatorError::Configuration(format!(
                    "positive label {} does not occur in y",
                    self.positive_label
                ))
            })?;
        let weights = resolve_weights(y.len(), sample_weight)?;
        let is_signal = y.iter().map(|&label| label == self.positive_label).collect();
        self.state = Some(RocAucState {
            classes,
            positive_index,
            is_signal,
            weights,
        });
        Ok(self)
    }

    pub fn evaluate(&self, proba: &Array2<f32>) -> Result<f32> {
        let state = self.state.as_ref().ok_or_else(|| {
            EstimatorError::Precondition("metric is not fitted, call `fit` first".to_string())
        })?;
        if proba.nrows() != state.is_signal.len() {
            return Err(EstimatorError::Configuration(format!(
                "probability matrix has {} rows but the metric was fitted on {}",
                proba.nrows(),
                state.is_signal.len()
            )));
        }
        if proba.ncols() < state.classes.len() {
            return Err(EstimatorError::Configuration(format!(
                "probability matrix has {} columns but the label set needs {}",
                proba.ncols(),
                state.classes.len()
            )));
        }
        let scores = proba.column(state.positive_index).to_vec();
        let (background_eff, signal_eff, _) = roc_curve(&state.is_signal, &scores, &state.weights);
        Ok(auc_from_curve(&background_eff, &signal_eff))
    }
}

#[derive(Debug, Clone)]
struct LogLossState {
    classes: Vec<i32>,
    class_indices: Vec<usize>,
    weights: Vec<f32>,
}

/// Weighted negative log-likelihood of the true-class probabilities. Also
/// known as logistic loss or cross-entropy.
#[derive(Debug, Clone)]
pub struct LogLoss {
    pub regularization: f32,
    state: Option<LogLossState>,
}

impl Default for LogLoss {
    fn default() -> Self {
        Self {
            regularization: 1e-15,
            state: None,
        }
    }
}

impl LogLoss {
    pub fn new(regularization: f32) -> Self {
        Self {
            regularization,
            state: None,
        }
    }

    /// Discover the label set, map each row to its class column and
    /// normalize the weights to sum to 1.
    pub fn fit(&mut self, y: &[i32], sample_weight: Option<&[f32]>) -> Result<&mut Self> {
        let classes = unique_classes(y);
        let class_indices = y
            .iter()
            .map(|&label| {
                classes
                    .iter()
                    .position(|&known| known == label)
                    .unwrap_or(0)
            })
            .collect();
        let mut weights = resolve_weights(y.len(), sample_weight)?;
        let total: f32 = weights.iter().sum();
        if total > 0.0 {
            for weight in weights.iter_mut() {
                *weight /= total;
            }
        }
        self.state = Some(LogLossState {
            classes,
            class_indices,
            weights,
        });
        Ok(self)
    }

    pub fn evaluate(&self, proba: &Array2<f32>) -> Result<f32> {
        let state = self.state.as_ref().ok_or_else(|| {
            EstimatorError::Precondition("metric is not fitted, call `fit` first".to_string())
        })?;
        if proba.nrows() != state.class_indices.len() {
            return Err(EstimatorError::Configuration(format!(
                "probability matrix has {} rows but the metric was fitted on {}",
                proba.nrows(),
                state.class_indices.len()
            )));
        }
        if proba.ncols() < state.classes.len() {
            return Err(EstimatorError::Configuration(format!(
                "probability matrix has {} columns but the label set needs {}",
                proba.ncols(),
                state.classes.len()
            )));
        }
        let mut loss = 0.0f32;
        for (row, (&class_index, &weight)) in state
            .class_indices
            .iter()
            .zip(&state.weights)
            .enumerate()
        {
            loss -= (proba[(row, class_index)] + self.regularization).ln() * weight;
        }
        Ok(loss)
    }
}

/// Approximate discovery significance `s / sqrt(b)`.
pub fn significance(s: f32, b: f32) -> f32 {
    s / (b + 1e-6).sqrt()
}

/// Regularized approximate median significance with the conventional
/// regularization term of 10.
pub fn ams(s: f32, b: f32) -> f32 {
    ams_with_regularization(s, b, 10.0)
}

/// Regularized approximate median significance.
pub fn ams_with_regularization(s: f32, b: f32, br: f32) -> f32 {
    let radicand = 2.0 * ((s + b + br) * (1.0 + s / (b + br)).ln() - s);
    radicand.max(0.0).sqrt()
}

/// Finds the best cut on the signal-class probability by scanning every ROC
/// threshold with a figure of merit `metric(s, b)`, where `s` and `b` are
/// the signal and background efficiencies scaled by the expected yields.
#[derive(Debug, Clone)]
pub struct OptimalMetric {
    metric: fn(f32, f32) -> f32,
    pub expected_s: f32,
    pub expected_b: f32,
    pub signal_label: i32,
}

impl OptimalMetric {
    pub fn new(metric: fn(f32, f32) -> f32, expected_s: f32, expected_b: f32, signal_label: i32) -> Self {
        Self {
            metric,
            expected_s,
            expected_b,
            signal_label,
        }
    }

    /// Optimal discovery significance for the given expected yields.
    pub fn with_significance(expected_s: f32, expected_b: f32) -> Self {
        Self::new(significance, expected_s, expected_b, 1)
    }

    /// Optimal AMS with the HiggsML challenge yields.
    pub fn with_higgsml_ams() -> Self {
        Self::new(ams, 691.988_6, 410_999.84, 1)
    }

    /// Metric value at every candidate threshold.
    ///
    /// Thresholds are clipped into the observed score range, so the first
    /// and last cut stay usable as actual selections.
    pub fn compute(
        &self,
        y: &[i32],
        proba: &Array2<f32>,
        sample_weight: Option<&[f32]>,
    ) -> Result<(Vec<f32>, Vec<f32>)> {
        if y.is_empty() {
            return Err(EstimatorError::Configuration(
                "cannot scan thresholds without any labels".to_string(),
            ));
        }
        if proba.nrows() != y.len() {
            return Err(EstimatorError::Configuration(format!(
                "probability matrix has {} rows but y has {} entries",
                proba.nrows(),
                y.len()
            )));
        }
        let classes = unique_classes(y);
        let signal_index = classes
            .iter()
            .position(|&label| label == self.signal_label)
            .ok_or_else(|| {
                EstimatorError::Configuration(format!(
                    "signal label {} does not occur in y",
                    self.signal_label
                ))
            })?;
        if proba.ncols() < classes.len() {
            return Err(EstimatorError::Configuration(format!(
                "probability matrix has {} columns but the label set needs {}",
                proba.ncols(),
                classes.len()
            )));
        }
        let weights = resolve_weights(y.len(), sample_weight)?;
        let is_signal: Vec<bool> = y.iter().map(|&label| label == self.signal_label).collect();
        let scores = proba.column(signal_index).to_vec();

        let (background_eff, signal_eff, thresholds) = roc_curve(&is_signal, &scores, &weights);
        let values: Vec<f32> = signal_eff
            .iter()
            .zip(&background_eff)
            .map(|(&s, &b)| (self.metric)(s * self.expected_s, b * self.expected_b))
            .collect();

        let mut min_score = f32::INFINITY;
        let mut max_score = f32::NEG_INFINITY;
        for &score in &scores {
            min_score = min_score.min(score);
            max_score = max_score.max(score);
        }
        let thresholds = thresholds
            .iter()
            .map(|&t| t.clamp(min_score - 1e-6, max_score + 1e-6))
            .collect();

        Ok((thresholds, values))
    }

    /// Best threshold and the metric value it reaches.
    pub fn optimal_cut(
        &self,
        y: &[i32],
        proba: &Array2<f32>,
        sample_weight: Option<&[f32]>,
    ) -> Result<(f32, f32)> {
        let (thresholds, values) = self.compute(y, proba, sample_weight)?;
        let best = values
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(index, _)| index)
            .ok_or_else(|| {
                EstimatorError::Configuration("no thresholds to scan".to_string())
            })?;
        Ok((thresholds[best], values[best]))
    }

    /// The best metric value over all thresholds.
    pub fn evaluate(
        &self,
        y: &[i32],
        proba: &Array2<f32>,
        sample_weight: Option<&[f32]>,
    ) -> Result<f32> {
        self.optimal_cut(y, proba, sample_weight).map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proba_from_scores(scores: &[f32]) -> Array2<f32> {
        let mut proba = Array2::zeros((scores.len(), 2));
        for (row, &score) in scores.iter().enumerate() {
            proba[(row, 0)] = 1.0 - score;
            proba[(row, 1)] = score;
        }
        proba
    }

    #[test]
    fn roc_auc_is_one_for_perfect_separation() {
        let y = [0, 0, 1, 1];
        let proba = proba_from_scores(&[0.1, 0.2, 0.8, 0.9]);
        let mut metric = RocAuc::new(1);
        metric.fit(&y, None).unwrap();
        let auc = metric.evaluate(&proba).unwrap();
        assert!((auc - 1.0).abs() < 1e-6);
    }

    #[test]
    fn roc_auc_is_zero_for_inverted_scores() {
        let y = [0, 0, 1, 1];
        let proba = proba_from_scores(&[0.9, 0.8, 0.2, 0.1]);
        let mut metric = RocAuc::new(1);
        metric.fit(&y, None).unwrap();
        let auc = metric.evaluate(&proba).unwrap();
        assert!(auc.abs() < 1e-6);
    }

    #[test]
    fn roc_auc_is_half_for_constant_scores() {
        let y = [0, 1, 0, 1];
        let proba = proba_from_scores(&[0.5, 0.5, 0.5, 0.5]);
        let mut metric = RocAuc::new(1);
        metric.fit(&y, None).unwrap();
        let auc = metric.evaluate(&proba).unwrap();
        assert!((auc - 0.5).abs() < 1e-6);
    }

    #[test]
    fn roc_auc_respects_sample_weights() {
        // Down-weighting the misranked background row pushes the AUC up.
        let y = [0, 0, 1];
        let proba = proba_from_scores(&[0.1, 0.9, 0.8]);
        let mut unweighted = RocAuc::new(1);
        unweighted.fit(&y, None).unwrap();
        let mut weighted = RocAuc::new(1);
        weighted.fit(&y, Some(&[1.0, 0.1, 1.0])).unwrap();
        assert!(weighted.evaluate(&proba).unwrap() > unweighted.evaluate(&proba).unwrap());
    }

    #[test]
    fn roc_auc_requires_fit_first() {
        let metric = RocAuc::new(1);
        let proba = proba_from_scores(&[0.5]);
        assert!(matches!(
            metric.evaluate(&proba),
            Err(EstimatorError::Precondition(_))
        ));
    }

    #[test]
    fn log_loss_matches_a_hand_computed_value() {
        let y = [0, 1];
        let proba = proba_from_scores(&[0.2, 0.7]);
        let mut metric = LogLoss::default();
        metric.fit(&y, None).unwrap();
        let loss = metric.evaluate(&proba).unwrap();
        let expected = -0.5 * (0.8f32.ln() + 0.7f32.ln());
        assert!((loss - expected).abs() < 1e-5);
    }

    #[test]
    fn log_loss_regularization_keeps_zero_probabilities_finite() {
        let y = [1];
        let proba = proba_from_scores(&[0.0]);
        let mut metric = LogLoss::default();
        metric.fit(&y, None).unwrap();
        let loss = metric.evaluate(&proba).unwrap();
        assert!(loss.is_finite());
    }

    #[test]
    fn narrow_probability_matrix_is_rejected() {
        let y = [0, 1];
        let proba = Array2::zeros((2, 1));
        let mut metric = LogLoss::default();
        metric.fit(&y, None).unwrap();
        assert!(matches!(
            metric.evaluate(&proba),
            Err(EstimatorError::Configuration(_))
        ));
    }

    #[test]
    fn optimal_significance_picks_the_pure_signal_cut() {
        let y = [1, 1, 0, 0];
        let proba = proba_from_scores(&[0.9, 0.8, 0.2, 0.1]);
        let metric = OptimalMetric::with_significance(1.0, 1.0);
        let (cut, value) = metric.optimal_cut(&y, &proba, None).unwrap();
        // All signal and no background passes at 0.8, so s/sqrt(b + 1e-6)
        // peaks there at 1000.
        assert!((cut - 0.8).abs() < 1e-6);
        assert!((value - 1000.0).abs() < 1.0);
    }

    #[test]
    fn ams_matches_a_hand_computed_value() {
        let expected = (2.0f32 * (21.0 * (1.0f32 + 1.0 / 20.0).ln() - 1.0)).sqrt();
        assert!((ams(1.0, 10.0) - expected).abs() < 1e-6);
        assert_eq!(ams_with_regularization(0.0, 5.0, 10.0), 0.0);
    }

    #[test]
    fn significance_is_normalized_signal_over_sqrt_background() {
        assert!((significance(1.0, 1.0) - 1.0 / 1.000_000_5).abs() < 1e-3);
        assert!(significance(0.0, 1.0).abs() < 1e-6);
    }
}
