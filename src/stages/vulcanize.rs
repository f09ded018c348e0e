//! Document flattening (`vulcanize-scenes`, `vulcanize-elements` tasks).
//!
//! Scene documents and the shared elements document are flattened, their
//! `<i18n-msg>` elements filled from the default locale, and written under
//! the output directory at the same relative path, together with the
//! companion script collected from their inline scripts.

use super::{BuildContext, StageError, settle, write_output};
use crate::flatten::{ExcludeSet, FlattenError, FlattenOptions, flatten};
use crate::graph::TaskOutput;
use crate::messages::{MessageDictionary, replace_messages};
use crate::select::{SelectOptions, select};
use rayon::prelude::*;
use std::path::Path;

const STAGE: &str = "vulcanize";

fn options(ctx: &BuildContext, name: &str, patterns: &[String]) -> Result<FlattenOptions, StageError> {
    let excludes = ExcludeSet::new(name, patterns).map_err(|source| StageError::Flatten {
        path: ctx.root.clone(),
        source,
    })?;
    Ok(FlattenOptions {
        excludes,
        inline: true,
        csp: true,
        strip: ctx.mode.strips(),
    })
}

/// Flatten every scene document in parallel.
pub fn run_scenes(ctx: &BuildContext) -> Result<TaskOutput, StageError> {
    let options = options(ctx, "scene_excludes", &ctx.config.vulcanize.scene_excludes)?;
    let documents = select(
        &ctx.root,
        &ctx.config.vulcanize.scene_documents,
        &SelectOptions::default(),
    )?;
    if documents.is_empty() {
        tracing::warn!("no scene documents matched {:?}", ctx.config.vulcanize.scene_documents);
        return Ok(TaskOutput::none());
    }
    let dict = ctx.dictionary(STAGE, &ctx.config.vulcanize.default_locale)?;

    let results: Vec<Result<TaskOutput, StageError>> = documents
        .par_iter()
        .map(|doc| vulcanize_document(ctx, &doc.source, &options, &dict))
        .collect();
    Ok(settle(results)?
        .into_iter()
        .fold(TaskOutput::none(), TaskOutput::merge))
}

/// Flatten the shared elements document.
pub fn run_elements(ctx: &BuildContext) -> Result<TaskOutput, StageError> {
    let document = ctx.root.join(&ctx.config.vulcanize.elements_document);
    if !document.is_file() {
        return Err(StageError::SourceNotFound {
            stage: STAGE,
            path: document,
        });
    }
    let options = options(ctx, "elements_excludes", &ctx.config.vulcanize.elements_excludes)?;
    let dict = ctx.dictionary(STAGE, &ctx.config.vulcanize.default_locale)?;
    vulcanize_document(ctx, &document, &options, &dict)
}

/// Flatten one document and write it (plus companion script) under the
/// output directory.
pub fn vulcanize_document(
    ctx: &BuildContext,
    document: &Path,
    options: &FlattenOptions,
    dict: &MessageDictionary,
) -> Result<TaskOutput, StageError> {
    let flatten_error = |source: FlattenError| StageError::Flatten {
        path: document.to_path_buf(),
        source,
    };
    let flattened = flatten(document, options).map_err(flatten_error)?;
    let relative = ctx.relative(document);
    let html = replace_messages(&flattened.html, &relative, dict)?;

    let out = ctx.dist_dir().join(&relative);
    write_output(&out, html)?;
    let mut written = vec![out.clone()];
    if let Some(script) = flattened.script {
        let script_path = out.with_file_name(&flattened.script_name);
        write_output(&script_path, script)?;
        written.push(script_path);
    }
    tracing::debug!(
        document = %relative,
        inlined = flattened.inlined.len(),
        external = ?flattened.external_imports,
        "vulcanized"
    );
    Ok(TaskOutput::from_paths(written))
}
