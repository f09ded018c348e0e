//! Subprocess plumbing shared by the tool implementations.

use std::ffi::OsString;
use std::path::Path;
use std::process::Command;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("'{program}' exited with {status}:\n{report}")]
    Failed {
        program: String,
        status: String,
        report: String,
    },
}

/// Run `program` to completion and return its stdout.
///
/// A non-zero exit becomes [`ToolError::Failed`] carrying stderr (or stdout
/// when stderr is empty), which is where compilers put their diagnostics.
/// Anything written to stderr on success is logged as a warning.
pub fn run_capture(
    program: &str,
    args: &[OsString],
    cwd: Option<&Path>,
) -> Result<String, ToolError> {
    let mut command = Command::new(program);
    command.args(args);
    if let Some(dir) = cwd {
        command.current_dir(dir);
    }
    tracing::debug!(program, args = args.len(), "spawning tool");
    let output = command.output().map_err(|source| ToolError::Spawn {
        program: program.to_string(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    if !output.status.success() {
        let report = if stderr.trim().is_empty() {
            stdout
        } else {
            stderr
        };
        return Err(ToolError::Failed {
            program: program.to_string(),
            status: output.status.to_string(),
            report: report.trim_end().to_string(),
        });
    }
    if !stderr.trim().is_empty() {
        tracing::warn!(program, "{}", stderr.trim_end());
    }
    Ok(stdout)
}
