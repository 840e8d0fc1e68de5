//! Engine subprocess launch and handshake.
//!
//! One subprocess per operation, never reused. The engine binary is invoked
//! as `<program> <routine>` with the operation's private workspace as its
//! current directory. It reads newline-delimited JSON payloads from stdin
//! until end of file, does its work against files in the workspace, and must
//! exit with status 0. Anything it prints on stdout or stderr is captured
//! and attached verbatim to failures.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use crate::config::EngineCommand;
use crate::error::{EstimatorError, Result};

/// Entry routine executed for training runs. Versioned together with the
/// payload schema so a schema change cannot be fed to an older engine
/// silently.
pub const TRAIN_ROUTINE: &str = "train-v1";
/// Entry routine executed for inference runs.
pub const PREDICT_ROUTINE: &str = "predict-v1";

/// Launch the engine, stream `payloads` to its stdin, close the stream and
/// block until the subprocess exits.
///
/// Returns the combined captured stdout/stderr text. A non-zero exit status
/// fails with that text attached; the run is never retried.
pub fn run_engine(
    command: &EngineCommand,
    routine: &str,
    workdir: &Path,
    payloads: &[serde_json::Value],
) -> Result<String> {
    log::debug!(
        "launching {} {} in {}",
        command.program().display(),
        routine,
        workdir.display()
    );

    let mut child = Command::new(command.program())
        .arg(routine)
        .current_dir(workdir)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| EstimatorError::ExternalProcess {
            status: None,
            log: format!("failed to launch engine '{}': {}", command.program().display(), e),
        })?;

    // An engine that dies before draining its input breaks the pipe here.
    // The exit-status check below reports that with the captured log, which
    // is more useful than the bare I/O error.
    let mut stdin_error = None;
    if let Some(mut stdin) = child.stdin.take() {
        for payload in payloads {
            let line = serde_json::to_string(payload).map_err(|e| {
                EstimatorError::Resource(format!("failed to encode engine payload: {}", e))
            })?;
            if let Err(e) = writeln!(stdin, "{}", line) {
                stdin_error = Some(e);
                break;
            }
        }
    }

    let output = child.wait_with_output().map_err(|e| EstimatorError::ExternalProcess {
        status: None,
        log: format!("failed to collect engine output: {}", e),
    })?;
    let log_text = combined_output(&output.stdout, &output.stderr);

    if !output.status.success() {
        return Err(EstimatorError::ExternalProcess {
            status: output.status.code(),
            log: log_text,
        });
    }
    if let Some(e) = stdin_error {
        return Err(EstimatorError::ExternalProcess {
            status: output.status.code(),
            log: format!("engine exited without reading its input ({})\n{}", e, log_text),
        });
    }

    log::debug!("engine routine {} finished", routine);
    Ok(log_text)
}

fn combined_output(stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = String::from_utf8_lossy(stdout).into_owned();
    if !stderr.is_empty() {
        if !text.is_empty() && !text.ends_with('\n') {
            text.push('\n');
        }
        text.push_str(&String::from_utf8_lossy(stderr));
    }
    text
}
