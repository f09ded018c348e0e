//! Stylesheet compilation (`compass` task).
//!
//! Each non-partial source matching the configured patterns is run through
//! the preprocessor, vendor-prefixed for the supported browser matrix and
//! written as `<stem>.css` next to the source.

use super::{BuildContext, StageError, settle, write_output};
use crate::graph::TaskOutput;
use crate::select::{SelectOptions, select};
use crate::tools::{CssStyle, StylePreprocessor, ToolError};
use lightningcss::stylesheet::{MinifyOptions, ParserOptions, PrinterOptions, StyleSheet};
use lightningcss::targets::{Browsers, Targets};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Oldest browsers the generated CSS must work in.
pub fn browser_matrix() -> Browsers {
    Browsers {
        chrome: Some(version(30)),
        safari: Some(version(7)),
        firefox: Some(version(30)),
        ios_saf: Some(version(7)),
        android: Some(version(4) | (4 << 8)),
        ..Browsers::default()
    }
}

fn version(major: u32) -> u32 {
    major << 16
}

/// Source files the stage compiles: everything matching `patterns` except
/// partials (`_name.scss`), which are only ever imported.
pub fn compile_roots(ctx: &BuildContext) -> Result<Vec<PathBuf>, StageError> {
    let records = select(
        &ctx.root,
        &ctx.config.stylesheets.patterns,
        &SelectOptions::default(),
    )?;
    Ok(records
        .into_iter()
        .map(|r| r.source)
        .filter(|p| !is_partial(p))
        .collect())
}

fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

pub fn output_path(source: &Path) -> PathBuf {
    source.with_extension("css")
}

pub fn run(
    ctx: &BuildContext,
    preprocessor: &dyn StylePreprocessor,
) -> Result<TaskOutput, StageError> {
    let sources = compile_roots(ctx)?;
    let style = if ctx.mode.is_pretty() {
        CssStyle::Expanded
    } else {
        CssStyle::Compressed
    };
    let minify = ctx.mode.strips();

    let results: Vec<Result<PathBuf, StageError>> = sources
        .par_iter()
        .map(|source| {
            let css = preprocessor
                .preprocess(source, style)
                .map_err(|e| preprocess_error(source, e))?;
            let prefixed = prefix_css(&css, minify).map_err(|report| StageError::Preprocess {
                path: source.clone(),
                report,
            })?;
            let out = output_path(source);
            write_output(&out, prefixed)?;
            tracing::debug!(source = %source.display(), "compiled stylesheet");
            Ok(out)
        })
        .collect();

    Ok(TaskOutput::from_paths(settle(results)?))
}

fn preprocess_error(path: &Path, error: ToolError) -> StageError {
    let report = match error {
        ToolError::Failed { report, .. } => report,
        other => other.to_string(),
    };
    StageError::Preprocess {
        path: path.to_path_buf(),
        report,
    }
}

/// Add vendor prefixes for [`browser_matrix`]; `minify` selects compact output.
pub fn prefix_css(css: &str, minify: bool) -> Result<String, String> {
    let mut stylesheet =
        StyleSheet::parse(css, ParserOptions::default()).map_err(|e| format!("CSS parse error: {e}"))?;
    stylesheet
        .minify(MinifyOptions {
            targets: browser_matrix().into(),
            ..MinifyOptions::default()
        })
        .map_err(|e| format!("CSS minify error: {e}"))?;
    let result = stylesheet
        .to_css(PrinterOptions {
            minify,
            targets: Targets::from(browser_matrix()),
            ..PrinterOptions::default()
        })
        .map_err(|e| format!("CSS print error: {e}"))?;
    Ok(result.code)
}
