//! Value objects shipped to the engine subprocess over its input stream.
//!
//! The schema is a flat, versioned mapping of primitive values. It replaces
//! in-process object serialization so that no live resource handles ever
//! cross the process boundary.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::config::ParamValue;

/// Bumped whenever the payload schema changes, together with the routine
/// names in [`crate::process`].
pub const PAYLOAD_VERSION: u32 = 1;

/// What the engine is asked to learn or evaluate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Classification,
    Regression,
}

/// The estimator's full parameter state as the engine sees it.
#[derive(Debug, Clone, Serialize)]
pub struct EngineConfig {
    pub version: u32,
    pub method: String,
    pub method_name: String,
    pub factory_options: String,
    pub method_parameters: BTreeMap<String, ParamValue>,
}

/// Describes one training invocation. Constructed immediately before the
/// subprocess launch, consumed exactly once, never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TrainingRequest {
    pub version: u32,
    pub dataset_path: String,
    pub dataset_table: String,
    pub weight_column: String,
    pub target_column: String,
    pub model_kind: ModelKind,
    pub features: Vec<String>,
    pub job_name: String,
    pub method_name: String,
}

/// Describes one inference invocation over a previously trained formula.
#[derive(Debug, Clone, Serialize)]
pub struct PredictionRequest {
    pub version: u32,
    pub dataset_path: String,
    pub dataset_table: String,
    pub model_path: String,
    pub model_kind: ModelKind,
    /// Classification only: the output-transform directive, forwarded so
    /// cut-based methods can evaluate at the requested signal efficiency.
    pub output_transform: Option<String>,
    pub features: Vec<String>,
    pub method_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_kind_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ModelKind::Classification).unwrap(),
            "\"classification\""
        );
        assert_eq!(
            serde_json::to_string(&ModelKind::Regression).unwrap(),
            "\"regression\""
        );
    }

    #[test]
    fn training_request_is_flat_json() {
        let request = TrainingRequest {
            version: PAYLOAD_VERSION,
            dataset_path: "train.csv".to_string(),
            dataset_table: "train_table".to_string(),
            weight_column: "MVA_Weight__".to_string(),
            target_column: "MVA_Target__".to_string(),
            model_kind: ModelKind::Classification,
            features: vec!["pt".to_string(), "eta".to_string()],
            job_name: "MvaEstimation".to_string(),
            method_name: "MvaEstimator".to_string(),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["version"], 1);
        assert_eq!(value["features"][1], "eta");
        assert_eq!(value["model_kind"], "classification");
    }
}
