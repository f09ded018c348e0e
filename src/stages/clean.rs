//! Output directory removal.

use super::{BuildContext, StageError};
use crate::graph::TaskOutput;
use std::fs;
use std::io::ErrorKind;

/// Remove the output directory for the current mode. A missing directory is
/// not an error. Returns only once the removal is complete.
pub fn run(ctx: &BuildContext) -> Result<TaskOutput, StageError> {
    let dist = ctx.dist_dir();
    match fs::remove_dir_all(&dist) {
        Ok(()) => tracing::debug!(dir = %dist.display(), "removed output directory"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    Ok(TaskOutput::none())
}
