//! End-to-end builds of the fixture project through the public API.
//!
//! The external compiler and Sass are replaced by in-process stand-ins so the
//! test needs neither a JVM nor a Sass install.
//!
//! Run with: cargo test --test pipeline

use scenebuild::config::{self, BuildMode};
use scenebuild::graph::{GraphError, TaskEvent};
use scenebuild::pipeline::{self, declare_build};
use scenebuild::stages::{BuildContext, StageError};
use scenebuild::tools::{CompileRequest, CssStyle, ScriptCompiler, StylePreprocessor, ToolError, Toolchain};
use std::fs;
use std::path::Path;
use std::sync::{Arc, mpsc};
use tempfile::TempDir;

/// Concatenates the request's sources into its output wrapper.
struct ConcatCompiler;

impl ScriptCompiler for ConcatCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<String, ToolError> {
        let mut body = String::new();
        for source in &request.sources {
            let text = fs::read_to_string(source)?;
            if request.pretty_print {
                body.push_str(&text);
            } else {
                body.extend(
                    text.lines()
                        .map(str::trim)
                        .filter(|l| !l.is_empty() && !l.starts_with("//") && !l.starts_with('*') && !l.starts_with("/*")),
                );
            }
        }
        Ok(request.output_wrapper.replace("%output%", &body))
    }
}

/// Hands the source through unchanged (the fixture's SCSS is plain CSS).
struct PassthroughSass;

impl StylePreprocessor for PassthroughSass {
    fn preprocess(&self, path: &Path, _style: CssStyle) -> Result<String, ToolError> {
        Ok(fs::read_to_string(path)?)
    }
}

fn fixture() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let src = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project");
    for entry in walkdir::WalkDir::new(&src) {
        let entry = entry.unwrap();
        let dest = tmp.path().join(entry.path().strip_prefix(&src).unwrap());
        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest).unwrap();
        } else {
            fs::copy(entry.path(), &dest).unwrap();
        }
    }
    fs::write(
        tmp.path().join(config::CONFIG_FILE),
        "[scenes.airport]\nentry_point = \"app.Belt\"\n",
    )
    .unwrap();
    tmp
}

fn context(root: &Path, mode: BuildMode) -> BuildContext {
    let config = config::load_config(root, None).unwrap();
    BuildContext::new(root, config, mode).unwrap()
}

fn tools() -> Arc<Toolchain> {
    Arc::new(Toolchain {
        compiler: Box::new(ConcatCompiler),
        preprocessor: Box::new(PassthroughSass),
    })
}

fn build(root: &Path, mode: BuildMode) -> Result<scenebuild::graph::RunSummary, GraphError> {
    declare_build(Arc::new(context(root, mode)), tools()).run(pipeline::DEFAULT, None)
}

fn read(root: &Path, rel: &str) -> String {
    fs::read_to_string(root.join(rel)).unwrap_or_else(|e| panic!("{rel}: {e}"))
}

#[test]
fn default_target_builds_the_full_bundle() {
    let tmp = fixture();
    let (tx, rx) = mpsc::channel();

    let summary = declare_build(Arc::new(context(tmp.path(), BuildMode::Production)), tools())
        .run(pipeline::DEFAULT, Some(tx))
        .unwrap();

    // Each task ran once, never before its prerequisites.
    let names = summary.task_names();
    assert_eq!(names.len(), 9);
    let pos = |t: &str| names.iter().position(|n| *n == t).unwrap();
    assert!(pos("clean") < pos("vulcanize-scenes"));
    assert!(pos("compile-scenes") < pos("vulcanize-scenes"));
    assert!(pos("vulcanize") < pos("i18n-index"));
    assert!(pos("i18n-index") < pos("copy-assets"));
    assert_eq!(names.last(), Some(&"default"));

    let started = rx
        .try_iter()
        .filter(|e| matches!(e, TaskEvent::Started { .. }))
        .count();
    assert_eq!(started, 9);

    let root = tmp.path();
    let bundle = read(root, "scenes/airport/airport-scene.min.js");
    assert!(bundle.contains("scenes.airport = scenes.airport || {};"));
    assert!(bundle.contains("app.Belt = function() {"));
    assert_eq!(read(root, "dist/scenes/airport/airport-scene.min.js"), bundle);

    let index = read(root, "dist/index_fr.html");
    assert!(index.contains(r#"<html lang="fr">"#));
    assert!(index.contains("<title>Village du Père Noël</title>"));

    let scene = read(root, "dist/scenes/airport/airport-scene.html");
    assert!(scene.contains("Departures board"));
    assert!(scene.contains(r#"<script src="airport-scene.js"></script>"#));
    assert!(scene.contains("-webkit-user-select:none"), "{scene}");
    assert!(read(root, "dist/scenes/airport/airport-scene.js").contains("Polymer('belt-item'"));
    assert!(root.join("dist/elements/elements_en.html").is_file());
    assert!(root.join("dist/sass/main.css").is_file());
}

#[test]
fn pretty_build_keeps_formatting_in_its_own_directory() {
    let tmp = fixture();
    build(tmp.path(), BuildMode::Pretty).unwrap();
    let root = tmp.path();

    assert!(!root.join("dist").exists());
    let scene = read(root, "dist_pretty/scenes/airport/airport-scene.html");
    assert!(scene.contains("<!-- Airport scene"));
    let bundle = read(root, "dist_pretty/scenes/airport/airport-scene.min.js");
    assert!(bundle.contains("// Conveyor belt controller"));

    build(root, BuildMode::Production).unwrap();
    let minified = read(root, "dist/scenes/airport/airport-scene.min.js");
    assert!(!minified.contains("// Conveyor belt controller"));
    assert!(root.join("dist_pretty/index_fr.html").is_file(), "production clean left pretty alone");
}

#[test]
fn rebuilding_is_byte_identical() {
    let tmp = fixture();
    let root = tmp.path();
    build(root, BuildMode::Production).unwrap();
    let first = read(root, "dist/scenes/airport/airport-scene.html");
    let first_index = read(root, "dist/index_fr.html");

    build(root, BuildMode::Production).unwrap();
    assert_eq!(read(root, "dist/scenes/airport/airport-scene.html"), first);
    assert_eq!(read(root, "dist/index_fr.html"), first_index);
}

#[test]
fn locale_without_messages_fails_the_index_task() {
    let tmp = fixture();
    fs::write(
        tmp.path().join(config::CONFIG_FILE),
        "[scenes.airport]\nentry_point = \"app.Belt\"\n\n[locales]\nlocales = [\"fr\", \"de\"]\n",
    )
    .unwrap();

    let err = build(tmp.path(), BuildMode::Production).unwrap_err();

    match err {
        GraphError::TaskFailed { task, source } => {
            assert_eq!(task, "i18n-index");
            assert!(matches!(source, StageError::SourceNotFound { .. }));
        }
        other => panic!("expected TaskFailed, got {other:?}"),
    }
    assert!(!tmp.path().join("dist/index.html").exists(), "copy-assets must not run");
}

#[test]
fn unknown_scene_directory_is_rejected_before_any_task() {
    let tmp = fixture();
    fs::write(
        tmp.path().join(config::CONFIG_FILE),
        "[scenes.airport]\nentry_point = \"app.Belt\"\n\n[scenes.boatload]\nentry_point = \"app.Boat\"\n",
    )
    .unwrap();
    let config = config::load_config(tmp.path(), None).unwrap();

    let err = BuildContext::new(tmp.path(), config, BuildMode::Production).unwrap_err();
    assert!(err.to_string().contains("boatload"), "{err}");
    assert!(!tmp.path().join("scenes/airport/airport-scene.min.js").exists());
}

#[test]
fn single_task_target_runs_only_its_closure() {
    let tmp = fixture();
    let summary = declare_build(Arc::new(context(tmp.path(), BuildMode::Production)), tools())
        .run(pipeline::COMPASS, None)
        .unwrap();

    assert_eq!(summary.task_names(), vec!["compass"]);
    assert!(tmp.path().join("sass/main.css").is_file());
    assert!(!tmp.path().join("scenes/airport/airport-scene.min.js").exists());
}
