use std::error::Error;
use std::fmt;
use std::path::PathBuf;

/// Crate-wide result alias.
pub type Result<T, E = EstimatorError> = std::result::Result<T, E>;

/// Failures surfaced by `fit`/`predict` on the estimator adapters.
///
/// Every variant propagates to the caller; nothing is caught and downgraded
/// internally, and no partial results are ever returned.
#[derive(Debug)]
pub enum EstimatorError {
    /// Invalid configuration caught before the engine is involved: shape
    /// mismatches, bad class counts, unknown transform names.
    Configuration(String),
    /// An operation was called in the wrong lifecycle state.
    Precondition(String),
    /// The engine subprocess failed. Carries its combined captured output
    /// verbatim for diagnosis; the run is never retried.
    ExternalProcess { status: Option<i32>, log: String },
    /// The engine reported success but a promised output file, table or
    /// column is missing or malformed.
    ArtifactContract { path: PathBuf, detail: String },
    /// Temporary-directory or file I/O failure.
    Resource(String),
    /// The operation is not exposed through the subprocess protocol.
    UnsupportedOperation(&'static str),
}

impl fmt::Display for EstimatorError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EstimatorError::Configuration(msg) => write!(f, "configuration error: {}", msg),
            EstimatorError::Precondition(msg) => write!(f, "{}", msg),
            EstimatorError::ExternalProcess { status: Some(code), log } => {
                write!(f, "engine process exited with status {}\n{}", code, log)
            }
            EstimatorError::ExternalProcess { status: None, log } => {
                write!(f, "engine process failed\n{}", log)
            }
            EstimatorError::ArtifactContract { path, detail } => {
                write!(f, "engine output contract broken at {}: {}", path.display(), detail)
            }
            EstimatorError::Resource(msg) => write!(f, "{}", msg),
            EstimatorError::UnsupportedOperation(operation) => {
                write!(f, "{} is not supported by the engine protocol", operation)
            }
        }
    }
}

impl Error for EstimatorError {}
