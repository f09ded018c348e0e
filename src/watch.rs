//! Watch mode: rebuild stylesheets when their sources change.
//!
//! The project root is watched recursively. Each debounced batch of changes
//! that touches a file matching the stylesheet patterns re-runs the
//! `compass` task; other changes are ignored. A failed rebuild is reported
//! and watching continues.

use crate::graph::{GraphError, TaskGraph};
use crate::output;
use crate::pipeline::COMPASS;
use crate::select::{SelectError, matches_any};
use notify::RecursiveMode;
use notify_debouncer_mini::{DebouncedEventKind, new_debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::channel;
use std::time::Duration;
use thiserror::Error;

pub const DEBOUNCE: Duration = Duration::from_millis(200);

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("failed to initialize file watcher: {0}")]
    WatcherInit(#[source] notify::Error),
    #[error("failed to watch {}: {source}", .path.display())]
    WatchPath {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
    #[error("watch channel closed")]
    ChannelClosed,
    #[error(transparent)]
    Select(#[from] SelectError),
}

/// Changed paths that belong to the stylesheet sources, sorted and deduplicated.
pub fn relevant_changes<S: AsRef<str>>(
    root: &Path,
    patterns: &[S],
    changed: impl IntoIterator<Item = PathBuf>,
) -> Result<Vec<PathBuf>, SelectError> {
    let mut relevant = Vec::new();
    for path in changed {
        if matches_any(root, patterns, &path)? {
            relevant.push(path);
        }
    }
    relevant.sort();
    relevant.dedup();
    Ok(relevant)
}

fn rebuild(graph: &TaskGraph) {
    let (tx, rx) = channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            output::print_task_event(&event);
        }
    });
    let result = graph.run(COMPASS, Some(tx));
    // The sender moved into `run` is dropped by now, so the printer drains and exits.
    let _ = printer.join();
    match result {
        Ok(summary) => output::print_summary(&summary),
        Err(GraphError::TaskFailed { task, source }) => {
            tracing::warn!(task = %task, error = %source, "rebuild failed; still watching");
        }
        Err(e) => eprintln!("{e}"),
    }
}

/// Watch `root` forever, re-running `compass` on stylesheet changes.
pub fn watch(root: &Path, patterns: &[String], graph: &TaskGraph) -> Result<(), WatchError> {
    // Events arrive with canonical paths.
    let root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let (tx, rx) = channel();
    let mut debouncer = new_debouncer(DEBOUNCE, tx).map_err(WatchError::WatcherInit)?;
    debouncer
        .watcher()
        .watch(&root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::WatchPath {
            path: root.clone(),
            source,
        })?;

    rebuild(graph);
    println!("Watching {} for stylesheet changes...", root.display());

    loop {
        match rx.recv() {
            Ok(Ok(events)) => {
                let changed = events
                    .into_iter()
                    .filter(|e| matches!(e.kind, DebouncedEventKind::Any))
                    .map(|e| e.path);
                let relevant = relevant_changes(&root, patterns, changed)?;
                if relevant.is_empty() {
                    continue;
                }
                for path in &relevant {
                    let shown = path.strip_prefix(&root).unwrap_or(path);
                    println!("Changed: {}", shown.display());
                }
                rebuild(graph);
            }
            Ok(Err(error)) => {
                tracing::warn!(?error, "watch error; continuing");
            }
            Err(_) => return Err(WatchError::ChannelClosed),
        }
    }
}
