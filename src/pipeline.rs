//! The standard build: named tasks wired to stages.
//!
//! ```text
//! clean ─────────────┬──────────────────────┬───────────────┐
//! compass ───────────┼──────────┐           │               │
//! compile-scenes ──► vulcanize-scenes   vulcanize-elements  │
//!                          └───► vulcanize ◄┘               │
//!                                   │                       │
//!                               i18n-index ───────────► copy-assets ──► default
//! ```

use crate::graph::TaskGraph;
use crate::stages::{BuildContext, assets, clean, compile, locale_index, stylesheet, vulcanize};
use crate::tools::Toolchain;
use std::sync::Arc;

pub const CLEAN: &str = "clean";
pub const COMPASS: &str = "compass";
pub const COMPILE_SCENES: &str = "compile-scenes";
pub const VULCANIZE_SCENES: &str = "vulcanize-scenes";
pub const VULCANIZE_ELEMENTS: &str = "vulcanize-elements";
pub const VULCANIZE: &str = "vulcanize";
pub const I18N_INDEX: &str = "i18n-index";
pub const COPY_ASSETS: &str = "copy-assets";
pub const DEFAULT: &str = "default";

/// Tasks that write under the output directory and therefore must run
/// after `clean`.
pub const DIST_WRITERS: [&str; 4] = [VULCANIZE_SCENES, VULCANIZE_ELEMENTS, I18N_INDEX, COPY_ASSETS];

/// Declare every standard task against `ctx` and `tools`.
pub fn declare_build(ctx: Arc<BuildContext>, tools: Arc<Toolchain>) -> TaskGraph {
    let mut graph = TaskGraph::new();

    let c = Arc::clone(&ctx);
    graph.declare(CLEAN, &[], move || clean::run(&c));

    let (c, t) = (Arc::clone(&ctx), Arc::clone(&tools));
    graph.declare(COMPASS, &[], move || stylesheet::run(&c, t.preprocessor.as_ref()));

    let (c, t) = (Arc::clone(&ctx), Arc::clone(&tools));
    graph.declare(COMPILE_SCENES, &[], move || compile::run(&c, t.compiler.as_ref()));

    let c = Arc::clone(&ctx);
    graph.declare(
        VULCANIZE_SCENES,
        &[CLEAN, COMPASS, COMPILE_SCENES],
        move || vulcanize::run_scenes(&c),
    );

    let c = Arc::clone(&ctx);
    graph.declare(VULCANIZE_ELEMENTS, &[CLEAN, COMPASS], move || {
        vulcanize::run_elements(&c)
    });

    graph.declare_group(VULCANIZE, &[VULCANIZE_SCENES, VULCANIZE_ELEMENTS]);

    let c = Arc::clone(&ctx);
    graph.declare(I18N_INDEX, &[VULCANIZE], move || locale_index::run(&c));

    let c = Arc::clone(&ctx);
    graph.declare(COPY_ASSETS, &[CLEAN, VULCANIZE, I18N_INDEX], move || {
        assets::run(&c)
    });

    graph.declare_group(DEFAULT, &[COPY_ASSETS]);
    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BuildMode;
    use crate::graph::{GraphError, TaskEvent};
    use crate::stages::StageError;
    use crate::test_helpers::{fixture_config, fixture_project, list_files};
    use crate::tools::mock::{MockCompiler, MockPreprocessor};
    use std::collections::HashSet;
    use std::fs;
    use std::path::Path;
    use std::sync::mpsc;

    fn mock_tools(compiler: MockCompiler) -> Arc<Toolchain> {
        Arc::new(Toolchain {
            compiler: Box::new(compiler),
            preprocessor: Box::new(MockPreprocessor::new()),
        })
    }

    fn graph_for(root: &Path, mode: BuildMode) -> TaskGraph {
        let ctx = BuildContext::new(root, fixture_config(), mode).unwrap();
        declare_build(Arc::new(ctx), mock_tools(MockCompiler::new()))
    }

    fn transitive_prerequisites(graph: &TaskGraph, task: &str) -> HashSet<String> {
        graph.plan(task).unwrap().into_iter().filter(|t| t != task).collect()
    }

    #[test]
    fn declares_the_standard_tasks() {
        let tmp = fixture_project();
        let graph = graph_for(tmp.path(), BuildMode::Production);
        let declared: Vec<(&str, Vec<&str>)> = graph
            .tasks()
            .map(|(name, prereqs)| (name, prereqs.iter().map(String::as_str).collect()))
            .collect();
        assert_eq!(
            declared,
            vec![
                ("clean", vec![]),
                ("compass", vec![]),
                ("compile-scenes", vec![]),
                ("vulcanize-scenes", vec!["clean", "compass", "compile-scenes"]),
                ("vulcanize-elements", vec!["clean", "compass"]),
                ("vulcanize", vec!["vulcanize-scenes", "vulcanize-elements"]),
                ("i18n-index", vec!["vulcanize"]),
                ("copy-assets", vec!["clean", "vulcanize", "i18n-index"]),
                ("default", vec!["copy-assets"]),
            ]
        );
    }

    #[test]
    fn every_dist_writer_runs_after_clean() {
        let tmp = fixture_project();
        let graph = graph_for(tmp.path(), BuildMode::Production);
        for task in DIST_WRITERS {
            assert!(
                transitive_prerequisites(&graph, task).contains(CLEAN),
                "{task} does not depend on clean"
            );
        }
    }

    #[test]
    fn default_plan_order() {
        let tmp = fixture_project();
        let graph = graph_for(tmp.path(), BuildMode::Production);
        assert_eq!(
            graph.plan(DEFAULT).unwrap(),
            vec![
                "clean",
                "compass",
                "compile-scenes",
                "vulcanize-scenes",
                "vulcanize-elements",
                "vulcanize",
                "i18n-index",
                "copy-assets",
                "default"
            ]
        );
    }

    #[test]
    fn default_build_produces_the_bundle() {
        let tmp = fixture_project();
        let graph = graph_for(tmp.path(), BuildMode::Production);

        let summary = graph.run(DEFAULT, None).unwrap();

        assert_eq!(summary.tasks.len(), 9);
        let dist = list_files(&tmp.path().join("dist"));
        for expected in [
            "elements/elements_en.html",
            "index.html",
            "index_fr.html",
            "scenes/airport/airport-scene.html",
            "scenes/airport/airport-scene.js",
            "scenes/airport/airport-scene.min.js",
            "sass/main.css",
        ] {
            assert!(dist.contains(&expected.to_string()), "missing {expected} in {dist:?}");
        }
        assert!(tmp.path().join("scenes/airport/airport-scene.min.js").is_file());
        assert!(tmp.path().join("scenes/airport/airport.css").is_file());
    }

    #[test]
    fn stale_output_is_removed() {
        let tmp = fixture_project();
        crate::test_helpers::write_file(tmp.path(), "dist/leftover.txt", "old");
        graph_for(tmp.path(), BuildMode::Production)
            .run(DEFAULT, None)
            .unwrap();
        assert!(!tmp.path().join("dist/leftover.txt").exists());
    }

    #[test]
    fn compile_failure_stops_downstream_tasks() {
        let tmp = fixture_project();
        let ctx = BuildContext::new(tmp.path(), fixture_config(), BuildMode::Production).unwrap();
        let graph = declare_build(Arc::new(ctx), mock_tools(MockCompiler::failing_on("airport")));
        let (tx, rx) = mpsc::channel();

        let err = graph.run(DEFAULT, Some(tx)).unwrap_err();

        match err {
            GraphError::TaskFailed { task, source } => {
                assert_eq!(task, "compile-scenes");
                assert!(matches!(source, StageError::Compile { ref scene, .. } if scene == "airport"));
            }
            other => panic!("expected TaskFailed, got {other:?}"),
        }
        let skipped: Vec<String> = rx
            .try_iter()
            .filter_map(|e| match e {
                TaskEvent::Skipped { task } => Some(task),
                _ => None,
            })
            .collect();
        assert!(skipped.contains(&"vulcanize-scenes".to_string()));
        assert!(skipped.contains(&"copy-assets".to_string()));
        assert!(!tmp.path().join("dist/index_fr.html").exists());
    }

    #[test]
    fn pretty_build_writes_elsewhere_and_keeps_comments() {
        let tmp = fixture_project();
        graph_for(tmp.path(), BuildMode::Pretty).run(DEFAULT, None).unwrap();
        graph_for(tmp.path(), BuildMode::Production).run(DEFAULT, None).unwrap();

        let pretty = fs::read_to_string(
            tmp.path().join("dist_pretty/scenes/airport/airport-scene.html"),
        )
        .unwrap();
        let prod =
            fs::read_to_string(tmp.path().join("dist/scenes/airport/airport-scene.html")).unwrap();
        assert!(pretty.contains("<!-- Airport scene"));
        assert!(!prod.contains("<!--"));
    }
}
