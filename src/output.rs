//! CLI output formatting for builds.
//!
//! # Task-First Display
//!
//! Output is **task-centric**: every line leads with the task name, with
//! timing and file counts as secondary detail. Individual files are only
//! listed by `tracing` at debug level.
//!
//! # Output Format
//!
//! ## Plan
//!
//! ```text
//! Plan for default
//! 001 clean
//! 002 compass
//! 003 compile-scenes
//! 004 vulcanize-scenes ← clean, compass, compile-scenes
//! ```
//!
//! ## Build
//!
//! ```text
//! ▸ clean
//! ▸ compass
//! ✓ clean (3ms)
//! ✓ compass: 4 files (812ms)
//! ✗ compile-scenes
//!     compiling scene 'airport' failed:
//!     ERROR - app.Belt is undefined
//! - vulcanize-scenes (skipped)
//!
//! Built default: 9 tasks, 42 files in 3.1s
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure.

use crate::graph::{RunSummary, TaskEvent};
use std::time::Duration;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Human-readable duration: milliseconds below one second, seconds above.
pub fn format_duration(elapsed: Duration) -> String {
    if elapsed < Duration::from_secs(1) {
        format!("{}ms", elapsed.as_millis())
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Planning
// ============================================================================

/// Format an execution plan. `prerequisites` looks up a task's direct
/// prerequisites.
pub fn format_plan<'a, F>(target: &str, order: &[String], prerequisites: F) -> Vec<String>
where
    F: Fn(&str) -> &'a [String],
{
    let mut lines = vec![format!("Plan for {target}")];
    for (i, task) in order.iter().enumerate() {
        let prereqs = prerequisites(task);
        if prereqs.is_empty() {
            lines.push(format!("{} {}", format_index(i + 1), task));
        } else {
            lines.push(format!(
                "{} {} \u{2190} {}",
                format_index(i + 1),
                task,
                prereqs.join(", ")
            ));
        }
    }
    lines
}

/// Format the declared task table for `tasks`.
pub fn format_task_list<'a>(tasks: impl Iterator<Item = (&'a str, &'a [String])>) -> Vec<String> {
    let tasks: Vec<(&str, &[String])> = tasks.collect();
    let width = tasks.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    tasks
        .into_iter()
        .map(|(name, prereqs)| {
            if prereqs.is_empty() {
                name.to_string()
            } else {
                format!("{name:<width$}  \u{2190} {}", prereqs.join(", "))
            }
        })
        .collect()
}

// ============================================================================
// Running
// ============================================================================

/// Format a single progress event as display lines.
pub fn format_task_event(event: &TaskEvent) -> Vec<String> {
    match event {
        TaskEvent::Started { task } => vec![format!("\u{25b8} {task}")],
        TaskEvent::Finished {
            task,
            written,
            elapsed,
        } => {
            if *written == 0 {
                vec![format!("\u{2713} {task} ({})", format_duration(*elapsed))]
            } else {
                vec![format!(
                    "\u{2713} {task}: {} ({})",
                    plural(*written, "file"),
                    format_duration(*elapsed)
                )]
            }
        }
        TaskEvent::Failed { task, message } => {
            let mut lines = vec![format!("\u{2717} {task}")];
            lines.extend(message.lines().map(|l| format!("    {l}")));
            lines
        }
        TaskEvent::Skipped { task } => vec![format!("- {task} (skipped)")],
    }
}

/// Format the closing line of a successful build.
pub fn format_summary(summary: &RunSummary) -> Vec<String> {
    vec![
        String::new(),
        format!(
            "Built {}: {}, {} in {}",
            summary.target,
            plural(summary.tasks.len(), "task"),
            plural(summary.files_written(), "file"),
            format_duration(summary.elapsed)
        ),
    ]
}

pub fn print_lines(lines: &[String]) {
    for line in lines {
        println!("{}", line);
    }
}

pub fn print_task_event(event: &TaskEvent) {
    print_lines(&format_task_event(event));
}

pub fn print_summary(summary: &RunSummary) {
    print_lines(&format_summary(summary));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{TaskOutput, TaskRecord};
    use std::path::PathBuf;

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(100), "100");
    }

    #[test]
    fn durations() {
        assert_eq!(format_duration(Duration::from_millis(3)), "3ms");
        assert_eq!(format_duration(Duration::from_millis(999)), "999ms");
        assert_eq!(format_duration(Duration::from_millis(3140)), "3.1s");
    }

    #[test]
    fn plan_lists_prerequisites() {
        let order: Vec<String> = ["clean", "compass", "vulcanize-elements"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let prereqs = vec!["clean".to_string(), "compass".to_string()];
        let none: Vec<String> = Vec::new();
        let lines = format_plan("vulcanize-elements", &order, |task: &str| {
            if task == "vulcanize-elements" {
                &prereqs[..]
            } else {
                &none[..]
            }
        });
        assert_eq!(
            lines,
            vec![
                "Plan for vulcanize-elements",
                "001 clean",
                "002 compass",
                "003 vulcanize-elements \u{2190} clean, compass",
            ]
        );
    }

    #[test]
    fn task_list_aligns_arrows() {
        let a: Vec<String> = vec![];
        let b = vec!["clean".to_string()];
        let lines = format_task_list(vec![("clean", &a[..]), ("copy-assets", &b[..])].into_iter());
        assert_eq!(lines, vec!["clean", "copy-assets  \u{2190} clean"]);
    }

    #[test]
    fn finished_event_with_and_without_files() {
        let event = TaskEvent::Finished {
            task: "compass".into(),
            written: 4,
            elapsed: Duration::from_millis(812),
        };
        assert_eq!(format_task_event(&event), vec!["\u{2713} compass: 4 files (812ms)"]);
        let event = TaskEvent::Finished {
            task: "clean".into(),
            written: 0,
            elapsed: Duration::from_millis(3),
        };
        assert_eq!(format_task_event(&event), vec!["\u{2713} clean (3ms)"]);
    }

    #[test]
    fn failed_event_indents_report() {
        let event = TaskEvent::Failed {
            task: "compile-scenes".into(),
            message: "compiling scene 'airport' failed:\nERROR - bad".into(),
        };
        assert_eq!(
            format_task_event(&event),
            vec![
                "\u{2717} compile-scenes",
                "    compiling scene 'airport' failed:",
                "    ERROR - bad",
            ]
        );
    }

    #[test]
    fn skipped_and_started_events() {
        assert_eq!(
            format_task_event(&TaskEvent::Skipped { task: "vulcanize".into() }),
            vec!["- vulcanize (skipped)"]
        );
        assert_eq!(
            format_task_event(&TaskEvent::Started { task: "clean".into() }),
            vec!["\u{25b8} clean"]
        );
    }

    #[test]
    fn summary_counts_tasks_and_files() {
        let summary = RunSummary {
            target: "default".into(),
            tasks: vec![
                TaskRecord {
                    name: "clean".into(),
                    output: TaskOutput::none(),
                    elapsed: Duration::ZERO,
                },
                TaskRecord {
                    name: "i18n-index".into(),
                    output: TaskOutput::from_paths(vec![PathBuf::from("dist/index_fr.html")]),
                    elapsed: Duration::ZERO,
                },
            ],
            elapsed: Duration::from_millis(1500),
        };
        assert_eq!(
            format_summary(&summary),
            vec!["", "Built default: 2 tasks, 1 file in 1.5s"]
        );
    }
}
