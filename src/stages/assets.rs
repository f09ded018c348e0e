//! Static asset copy (`copy-assets` task).

use super::{BuildContext, StageError, settle};
use crate::graph::TaskOutput;
use crate::select::{SelectOptions, select};
use rayon::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};

/// Copy every file matching the asset patterns into the output directory,
/// keeping its project-relative path. Existing files are overwritten.
pub fn run(ctx: &BuildContext) -> Result<TaskOutput, StageError> {
    let records = select(&ctx.root, &ctx.config.assets.patterns, &SelectOptions::default())?;
    let dist = ctx.dist_dir();

    let results: Vec<Result<PathBuf, StageError>> = records
        .par_iter()
        .map(|record| {
            let dest = record.destination(&dist);
            copy_file(&record.source, &dest)?;
            Ok(dest)
        })
        .collect();
    let written = settle(results)?;
    tracing::debug!(count = written.len(), dir = %dist.display(), "copied assets");
    Ok(TaskOutput::from_paths(written))
}

fn copy_file(source: &Path, dest: &Path) -> Result<(), StageError> {
    let copy_error = |source| StageError::Copy {
        path: dest.to_path_buf(),
        source,
    };
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(copy_error)?;
    }
    fs::copy(source, dest).map_err(copy_error)?;
    Ok(())
}
