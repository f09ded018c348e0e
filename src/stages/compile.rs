//! Scene compilation (`compile-scenes` task).
//!
//! Every scene in the config's scene table is compiled independently into
//! `scenes/<name>/<name>-scene.min.js`, wrapped so that its exports land in
//! `scenes.<name>` and nowhere else.

use super::{BuildContext, StageError, settle, write_output};
use crate::config::SceneDescriptor;
use crate::graph::TaskOutput;
use crate::select::{SelectOptions, select};
use crate::tools::compiler::{COMPILATION_LEVEL, LANGUAGE_IN, PROMOTED_WARNINGS};
use crate::tools::{CompileRequest, ScriptCompiler, ToolError};
use rayon::prelude::*;
use std::path::PathBuf;

/// Namespacing template around one scene's compiled code.
pub fn output_wrapper(scene: &str) -> String {
    format!(
        "var scenes = scenes || {{}};\n\
         scenes.{scene} = scenes.{scene} || {{}};\n\
         (function(){{%output%}}).call({{ app: scenes.{scene} }});"
    )
}

/// Where the compiled bundle for `scene` is written.
pub fn output_path(ctx: &BuildContext, scene: &str) -> PathBuf {
    ctx.root
        .join("scenes")
        .join(scene)
        .join(format!("{scene}-scene.min.js"))
}

/// Build the compiler invocation for one scene.
pub fn compile_request(
    ctx: &BuildContext,
    scene: &str,
    descriptor: &SceneDescriptor,
) -> Result<CompileRequest, StageError> {
    let mut sources: Vec<PathBuf> = select(
        &ctx.root,
        &descriptor.source_patterns(scene),
        &SelectOptions::default(),
    )?
    .into_iter()
    .map(|r| r.source)
    .collect();
    if sources.is_empty() {
        return Err(StageError::SourceNotFound {
            stage: "compile-scenes",
            path: ctx.root.join("scenes").join(scene).join("js"),
        });
    }
    let shared = ctx.root.join(&ctx.config.compiler.shared_library);
    if !sources.contains(&shared) {
        sources.push(shared);
    }

    let externs = select(
        &ctx.root,
        &ctx.config.compiler.externs,
        &SelectOptions::default(),
    )?
    .into_iter()
    .map(|r| r.source)
    .collect();

    Ok(CompileRequest {
        scene: scene.to_string(),
        sources,
        externs,
        entry_point: descriptor.entry_point.clone(),
        output_wrapper: output_wrapper(scene),
        compilation_level: COMPILATION_LEVEL.to_string(),
        language_in: LANGUAGE_IN.to_string(),
        process_closure_primitives: true,
        generate_exports: true,
        errors: PROMOTED_WARNINGS.iter().map(|s| s.to_string()).collect(),
        pretty_print: ctx.mode.is_pretty() || descriptor.pretty,
    })
}

/// Compile every configured scene in parallel. All scenes are attempted;
/// the first failure in scene-name order is returned.
pub fn run(ctx: &BuildContext, compiler: &dyn ScriptCompiler) -> Result<TaskOutput, StageError> {
    let scenes: Vec<(&String, &SceneDescriptor)> = ctx.config.scenes.iter().collect();
    let results: Vec<Result<PathBuf, StageError>> = scenes
        .par_iter()
        .map(|(name, descriptor)| compile_scene(ctx, compiler, name, descriptor))
        .collect();
    Ok(TaskOutput::from_paths(settle(results)?))
}

fn compile_scene(
    ctx: &BuildContext,
    compiler: &dyn ScriptCompiler,
    scene: &str,
    descriptor: &SceneDescriptor,
) -> Result<PathBuf, StageError> {
    let request = compile_request(ctx, scene, descriptor)?;
    tracing::debug!(
        scene,
        sources = request.sources.len(),
        externs = request.externs.len(),
        pretty = request.pretty_print,
        "compiling scene"
    );
    let script = compiler.compile(&request).map_err(|e| StageError::Compile {
        scene: scene.to_string(),
        report: match e {
            ToolError::Failed { report, .. } => report,
            other => other.to_string(),
        },
    })?;
    let out = output_path(ctx, scene);
    write_output(&out, script)?;
    Ok(out)
}
