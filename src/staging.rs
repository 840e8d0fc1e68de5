//! Columnar dataset staging for the engine subprocess.
//!
//! Datasets cross the process boundary as headed csv tables. Feature columns
//! keep their configured names; sample weight and target label travel under
//! reserved sentinel names that legitimate feature names must not use.

use std::path::Path;

use csv::ReaderBuilder;
use ndarray::Array2;

use crate::error::{EstimatorError, Result};

/// Reserved column name for per-row sample weights.
pub const WEIGHT_COLUMN: &str = "MVA_Weight__";
/// Reserved column name for the training target.
pub const TARGET_COLUMN: &str = "MVA_Target__";

/// Staged training dataset file and its table identifier.
pub const TRAIN_FILE: &str = "train.csv";
pub const TRAIN_TABLE: &str = "train_table";
/// Staged inference dataset file and its table identifier.
pub const TEST_FILE: &str = "test.csv";
pub const TEST_TABLE: &str = "test_table";

/// Training summary table the engine must produce next to the weights file.
pub const RESULT_FILE: &str = "result.csv";
/// Prediction table produced by an inference run.
pub const PREDICTION_FILE: &str = "predictions.csv";

/// Write the feature table to `path`, appending the reserved weight and
/// target columns when given.
///
/// Training runs pass both `target` and `weights`; inference runs pass
/// neither. Lengths are validated by the caller before staging starts.
pub fn stage_dataset(
    path: &Path,
    feature_names: &[String],
    x: &Array2<f32>,
    target: Option<&[f32]>,
    weights: Option<&[f32]>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| {
        EstimatorError::Resource(format!("failed to create dataset file {}: {}", path.display(), e))
    })?;

    let mut header: Vec<&str> = feature_names.iter().map(String::as_str).collect();
    if weights.is_some() {
        header.push(WEIGHT_COLUMN);
    }
    if target.is_some() {
        header.push(TARGET_COLUMN);
    }
    writer
        .write_record(&header)
        .map_err(|e| staging_write_error(path, e))?;

    let mut record = Vec::with_capacity(header.len());
    for row in 0..x.nrows() {
        record.clear();
        for value in x.row(row).iter() {
            record.push(value.to_string());
        }
        if let Some(weights) = weights {
            record.push(weights[row].to_string());
        }
        if let Some(target) = target {
            record.push(target[row].to_string());
        }
        writer
            .write_record(&record)
            .map_err(|e| staging_write_error(path, e))?;
    }
    writer.flush().map_err(|e| {
        EstimatorError::Resource(format!("failed to flush dataset file {}: {}", path.display(), e))
    })?;

    log::debug!(
        "staged {} rows x {} columns to {}",
        x.nrows(),
        header.len(),
        path.display()
    );
    Ok(())
}

fn staging_write_error(path: &Path, err: csv::Error) -> EstimatorError {
    EstimatorError::Resource(format!("failed to write dataset file {}: {}", path.display(), err))
}

/// Read one named column of floating-point scores back, in row order.
///
/// Missing files, missing columns and non-numeric fields are all contract
/// violations: the engine reported success but did not deliver the table it
/// promised.
pub fn read_score_column(path: &Path, column: &str) -> Result<Vec<f32>> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!("cannot open prediction table: {}", e),
        })?;

    let headers = reader
        .headers()
        .map_err(|e| EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!("cannot read prediction table header: {}", e),
        })?
        .clone();

    let column_index = headers.iter().position(|name| name == column).ok_or_else(|| {
        EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!(
                "prediction table has no '{}' column (found: {})",
                column,
                headers.iter().collect::<Vec<_>>().join(", ")
            ),
        }
    })?;

    let mut values = Vec::new();
    for (row, record) in reader.records().enumerate() {
        let record = record.map_err(|e| EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!("row {}: {}", row, e),
        })?;
        let field = record.get(column_index).ok_or_else(|| EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!("row {} is missing the '{}' column", row, column),
        })?;
        let value: f32 = field.trim().parse().map_err(|_| EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!("row {}: '{}' is not a number", row, field),
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Check that a training run left a well-formed summary table behind.
pub fn verify_result_table(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: "training summary table is missing".to_string(),
        });
    }
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .map_err(|e| EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!("training summary table is unreadable: {}", e),
        })?;
    let headers = reader
        .headers()
        .map_err(|e| EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: format!("training summary table has a malformed header: {}", e),
        })?;
    if headers.is_empty() {
        return Err(EstimatorError::ArtifactContract {
            path: path.to_path_buf(),
            detail: "training summary table has no columns".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn toy_matrix() -> Array2<f32> {
        Array2::from_shape_vec((3, 2), vec![0.5, 1.0, 0.25, 2.0, 0.75, 3.0]).unwrap()
    }

    #[test]
    fn staged_training_dataset_round_trips_by_column_name() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TRAIN_FILE);
        let names = vec!["pt".to_string(), "eta".to_string()];
        let target = [1.0, 0.0, 1.0];
        let weights = [1.0, 2.0, 0.5];

        stage_dataset(&path, &names, &toy_matrix(), Some(&target), Some(&weights)).unwrap();

        assert_eq!(read_score_column(&path, "pt").unwrap(), vec![0.5, 0.25, 0.75]);
        assert_eq!(read_score_column(&path, WEIGHT_COLUMN).unwrap(), vec![1.0, 2.0, 0.5]);
        assert_eq!(read_score_column(&path, TARGET_COLUMN).unwrap(), vec![1.0, 0.0, 1.0]);
    }

    #[test]
    fn inference_dataset_has_no_reserved_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(TEST_FILE);
        let names = vec!["pt".to_string(), "eta".to_string()];

        stage_dataset(&path, &names, &toy_matrix(), None, None).unwrap();

        let header = fs::read_to_string(&path).unwrap().lines().next().unwrap().to_string();
        assert_eq!(header, "pt,eta");
    }

    #[test]
    fn unwritable_destination_is_a_resource_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing-subdir").join(TRAIN_FILE);
        let names = vec!["pt".to_string()];
        let x = Array2::from_shape_vec((1, 1), vec![1.0]).unwrap();
        let result = stage_dataset(&path, &names, &x, None, None);
        assert!(matches!(result, Err(EstimatorError::Resource(_))));
    }

    #[test]
    fn missing_prediction_column_is_a_contract_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PREDICTION_FILE);
        fs::write(&path, "other\n0.5\n").unwrap();
        let result = read_score_column(&path, "MvaEstimator");
        assert!(matches!(result, Err(EstimatorError::ArtifactContract { .. })));
    }

    #[test]
    fn non_numeric_prediction_is_a_contract_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PREDICTION_FILE);
        fs::write(&path, "MvaEstimator\nnot-a-number\n").unwrap();
        let result = read_score_column(&path, "MvaEstimator");
        assert!(matches!(result, Err(EstimatorError::ArtifactContract { .. })));
    }

    #[test]
    fn missing_result_table_is_a_contract_error() {
        let dir = TempDir::new().unwrap();
        let result = verify_result_table(&dir.path().join(RESULT_FILE));
        assert!(matches!(result, Err(EstimatorError::ArtifactContract { .. })));
    }

    #[test]
    fn headed_result_table_passes_verification() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(RESULT_FILE);
        fs::write(&path, "iteration,loss\n1,0.25\n").unwrap();
        verify_result_table(&path).unwrap();
    }
}
