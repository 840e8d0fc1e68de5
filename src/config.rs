use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EstimatorError;

/// How the external engine binary is launched.
///
/// The program is executed once per `fit`/`predict` with the entry routine
/// name as its single argument and the operation's private working directory
/// as its current directory.
#[derive(Debug, Clone)]
pub struct EngineCommand {
    program: PathBuf,
}

impl EngineCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }
}

/// A passthrough parameter value forwarded verbatim to the engine inside the
/// configuration payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<String>),
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ParamValue::Bool(value) => write!(f, "{}", value),
            ParamValue::Int(value) => write!(f, "{}", value),
            ParamValue::Float(value) => write!(f, "{}", value),
            ParamValue::Str(value) => write!(f, "{}", value),
            ParamValue::List(items) => write!(f, "{}", items.join(",")),
        }
    }
}

impl From<bool> for ParamValue {
    fn from(value: bool) -> Self {
        ParamValue::Bool(value)
    }
}

impl From<i64> for ParamValue {
    fn from(value: i64) -> Self {
        ParamValue::Int(value)
    }
}

impl From<f64> for ParamValue {
    fn from(value: f64) -> Self {
        ParamValue::Float(value)
    }
}

impl From<&str> for ParamValue {
    fn from(value: &str) -> Self {
        ParamValue::Str(value.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(value: String) -> Self {
        ParamValue::Str(value)
    }
}

/// Policy mapping a raw engine score to the positive-class probability.
///
/// * `identity` for methods whose output already is a probability
/// * `sigmoid` for unbounded margin outputs
/// * `bdt` for outputs in `[-1, 1]`
/// * `sig_eff=<value>` for rectangular-cut methods; the value in `[0, 1]` is
///   the target signal efficiency at which the engine evaluates its cut, and
///   the returned pass/fail scores are emitted as hard 0/1 rows
#[derive(Debug, Clone, PartialEq)]
pub enum OutputTransform {
    Identity,
    Sigmoid,
    Bdt,
    SignalEfficiency(f64),
}

impl OutputTransform {
    /// The directive string shipped to the engine inside a prediction
    /// request.
    pub fn directive(&self) -> String {
        match self {
            OutputTransform::Identity => "identity".to_string(),
            OutputTransform::Sigmoid => "sigmoid".to_string(),
            OutputTransform::Bdt => "bdt".to_string(),
            OutputTransform::SignalEfficiency(efficiency) => format!("sig_eff={}", efficiency),
        }
    }
}

impl FromStr for OutputTransform {
    type Err = EstimatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(value) = s.strip_prefix("sig_eff=") {
            let efficiency: f64 = value.trim().parse().map_err(|_| {
                EstimatorError::Configuration(format!(
                    "sig_eff expects a number in [0, 1], got '{}'",
                    value
                ))
            })?;
            if !(0.0..=1.0).contains(&efficiency) {
                return Err(EstimatorError::Configuration(format!(
                    "sig_eff must lie in [0, 1], got {}",
                    efficiency
                )));
            }
            return Ok(OutputTransform::SignalEfficiency(efficiency));
        }
        match s {
            "identity" => Ok(OutputTransform::Identity),
            "sigmoid" => Ok(OutputTransform::Sigmoid),
            "bdt" => Ok(OutputTransform::Bdt),
            _ => Err(EstimatorError::Configuration(format!(
                "output transform must be one of identity, sigmoid, bdt or sig_eff=<value>, got '{}'",
                s
            ))),
        }
    }
}
