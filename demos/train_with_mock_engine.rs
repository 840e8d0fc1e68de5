//! Train a classifier against a mock engine and score it.
//!
//! The mock stands in for a real engine binary: it honors the subprocess
//! contract (routine argument, stdin payloads, weights file, summary table,
//! prediction column) while "predicting" the first feature. Point
//! `EngineCommand` at a real engine binary to run the same pipeline for
//! real.
//!
//! Run with `cargo run --example train_with_mock_engine`.

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use ndarray::Array2;
use rand::Rng;

use mva_estimators::config::{EngineCommand, ParamValue};
use mva_estimators::metrics::{OptimalMetric, RocAuc};
use mva_estimators::models::classifier::MvaClassifier;

fn write_mock_engine(dir: &Path) -> Result<PathBuf> {
    let path = dir.join("mock-engine.sh");
    let script = r#"#!/bin/sh
set -e
routine="$1"
cat > payload.jsonl
if [ "$routine" = "train-v1" ]; then
    mkdir -p weights
    printf '<?xml version="1.0"?>\n<MethodSetup Method="BDT::MvaEstimator"/>\n' > weights/MvaEstimation_MvaEstimator.weights.xml
    printf 'iteration,loss\n1,0.25\n' > result.csv
else
    printf 'MvaEstimator\n' > predictions.csv
    awk -F, 'NR > 1 { print $1 }' test.csv >> predictions.csv
fi
"#;
    fs::write(&path, script).context("failed to write mock engine")?;
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755))
        .context("failed to mark mock engine executable")?;
    Ok(path)
}

/// Two noisy Gaussian-ish blobs: signal concentrated at high values of the
/// first feature, background at low values.
fn synthetic_dataset(n: usize) -> (Array2<f32>, Vec<i32>) {
    let mut rng = rand::thread_rng();
    let mut values = Vec::with_capacity(n * 3);
    let mut labels = Vec::with_capacity(n);
    for row in 0..n {
        let label = (row % 2) as i32;
        let center: f32 = if label == 1 { 0.75 } else { 0.25 };
        let score: f32 = (center + rng.gen_range(-0.2..0.2)).clamp(0.0, 1.0);
        values.extend_from_slice(&[score, rng.gen_range(-1.0..1.0), rng.gen_range(0.0..5.0)]);
        labels.push(label);
    }
    (
        Array2::from_shape_vec((n, 3), values).expect("shape mismatch"),
        labels,
    )
}

fn main() -> Result<()> {
    env_logger::init();

    let dir = tempfile::tempdir().context("failed to create engine directory")?;
    let engine = EngineCommand::new(write_mock_engine(dir.path())?);

    let (x, y) = synthetic_dataset(200);

    let mut clf = MvaClassifier::new(engine)
        .with_method("kBDT")
        .with_features(vec!["score".to_string(), "eta".to_string(), "pt".to_string()])
        .with_transform("identity");
    clf.set_param("NTrees", ParamValue::Int(100))?;
    clf.set_param("BoostType", ParamValue::Str("Grad".to_string()))?;

    clf.fit(&x, &y, None)?;
    let proba = clf.predict_proba(&x)?;

    let mut auc = RocAuc::new(1);
    auc.fit(&y, None)?;
    println!("ROC AUC: {:.4}", auc.evaluate(&proba)?);

    let optimal = OptimalMetric::with_significance(1.0, 1.0);
    let (cut, value) = optimal.optimal_cut(&y, &proba, None)?;
    println!("optimal cut: {:.4} (significance {:.2})", cut, value);

    Ok(())
}
