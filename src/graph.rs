//! Task graph driver.
//!
//! Tasks are declared by name with an explicit list of prerequisite names.
//! [`TaskGraph::run`] resolves the transitive prerequisite closure of a
//! target, then executes it:
//!
//! ```text
//! plan    depth-first post-order over prerequisites (UnknownTask / CyclicDependency
//!         are reported here, before any work starts)
//! run     every task whose prerequisites have all *returned* is started on its
//!         own scoped thread; completions release dependents
//! fail    first error stops new starts, in-flight tasks finish, error returned
//! ```
//!
//! A task's work is a blocking closure. Fan-out inside a task (per scene, per
//! locale) is the task's own business; the driver only sees the task return
//! once everything it spawned has settled, so a dependent never observes a
//! partially produced prerequisite.

use crate::stages::StageError;
use std::collections::{HashMap, HashSet, VecDeque};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::mpsc::{self, Sender};
use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("unknown task '{name}'{}", required_by_suffix(.required_by))]
    UnknownTask {
        name: String,
        required_by: Option<String>,
    },
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("task '{task}' failed: {source}")]
    TaskFailed {
        task: String,
        #[source]
        source: StageError,
    },
}

fn required_by_suffix(required_by: &Option<String>) -> String {
    match required_by {
        Some(parent) => format!(" (required by '{parent}')"),
        None => String::new(),
    }
}

/// Files a task wrote. Used for progress output only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskOutput {
    pub written: Vec<PathBuf>,
}

impl TaskOutput {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_paths(written: Vec<PathBuf>) -> Self {
        Self { written }
    }

    pub fn merge(mut self, other: TaskOutput) -> Self {
        self.written.extend(other.written);
        self
    }
}

/// A unit of work. Runs at most once per [`TaskGraph::run`].
pub type Work = Box<dyn Fn() -> Result<TaskOutput, StageError> + Send + Sync>;

struct Task {
    name: String,
    prerequisites: Vec<String>,
    work: Work,
}

/// Progress notifications emitted while a graph runs.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskEvent {
    Started {
        task: String,
    },
    Finished {
        task: String,
        written: usize,
        elapsed: Duration,
    },
    Failed {
        task: String,
        message: String,
    },
    /// Planned but never started because an earlier task failed.
    Skipped {
        task: String,
    },
}

/// One completed task.
#[derive(Debug, Clone)]
pub struct TaskRecord {
    pub name: String,
    pub output: TaskOutput,
    pub elapsed: Duration,
}

/// Result of a successful run, tasks in completion order.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub target: String,
    pub tasks: Vec<TaskRecord>,
    pub elapsed: Duration,
}

impl RunSummary {
    pub fn task_names(&self) -> Vec<&str> {
        self.tasks.iter().map(|t| t.name.as_str()).collect()
    }

    pub fn files_written(&self) -> usize {
        self.tasks.iter().map(|t| t.output.written.len()).sum()
    }
}

/// Named tasks and their prerequisites.
#[derive(Default)]
pub struct TaskGraph {
    tasks: Vec<Task>,
    index: HashMap<String, usize>,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare `name`. Redeclaring a name replaces the earlier task.
    pub fn declare<F>(&mut self, name: &str, prerequisites: &[&str], work: F)
    where
        F: Fn() -> Result<TaskOutput, StageError> + Send + Sync + 'static,
    {
        let task = Task {
            name: name.to_string(),
            prerequisites: prerequisites.iter().map(|p| p.to_string()).collect(),
            work: Box::new(work),
        };
        match self.index.get(name) {
            Some(&i) => self.tasks[i] = task,
            None => {
                self.index.insert(name.to_string(), self.tasks.len());
                self.tasks.push(task);
            }
        }
    }

    /// Declare a task with no work of its own; it only groups prerequisites.
    pub fn declare_group(&mut self, name: &str, prerequisites: &[&str]) {
        self.declare(name, prerequisites, || Ok(TaskOutput::none()));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declared tasks with their direct prerequisites, in declaration order.
    pub fn tasks(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.tasks
            .iter()
            .map(|t| (t.name.as_str(), t.prerequisites.as_slice()))
    }

    fn task(&self, name: &str) -> &Task {
        &self.tasks[self.index[name]]
    }

    /// Transitive prerequisite closure of `target`, prerequisites first,
    /// ending with `target` itself.
    pub fn plan(&self, target: &str) -> Result<Vec<String>, GraphError> {
        if !self.contains(target) {
            return Err(GraphError::UnknownTask {
                name: target.to_string(),
                required_by: None,
            });
        }
        let mut order = Vec::new();
        let mut done = HashSet::new();
        let mut path = Vec::new();
        self.visit(target, &mut path, &mut done, &mut order)?;
        Ok(order)
    }

    fn visit(
        &self,
        name: &str,
        path: &mut Vec<String>,
        done: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), GraphError> {
        if done.contains(name) {
            return Ok(());
        }
        if let Some(pos) = path.iter().position(|n| n == name) {
            let mut cycle = path[pos..].to_vec();
            cycle.push(name.to_string());
            return Err(GraphError::CyclicDependency { cycle });
        }
        path.push(name.to_string());
        for prerequisite in &self.task(name).prerequisites {
            if !self.contains(prerequisite) {
                return Err(GraphError::UnknownTask {
                    name: prerequisite.clone(),
                    required_by: Some(name.to_string()),
                });
            }
            self.visit(prerequisite, path, done, order)?;
        }
        path.pop();
        done.insert(name.to_string());
        order.push(name.to_string());
        Ok(())
    }

    /// Run `target` and everything it depends on.
    ///
    /// Events are sent on `events` when given; a dropped receiver is ignored.
    pub fn run(
        &self,
        target: &str,
        events: Option<Sender<TaskEvent>>,
    ) -> Result<RunSummary, GraphError> {
        let order = self.plan(target)?;
        let run_started = Instant::now();
        tracing::debug!(goal = target, plan = ?order, "resolved task plan");

        let mut waiting: HashMap<&str, usize> = HashMap::new();
        let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();
        for name in &order {
            let prerequisites: HashSet<&str> = self
                .task(name)
                .prerequisites
                .iter()
                .map(String::as_str)
                .collect();
            waiting.insert(name, prerequisites.len());
            for prerequisite in prerequisites {
                dependents.entry(prerequisite).or_default().push(name);
            }
        }
        // Keep release order deterministic: dependents in plan order.
        let position: HashMap<&str, usize> = order
            .iter()
            .enumerate()
            .map(|(i, n)| (n.as_str(), i))
            .collect();
        for list in dependents.values_mut() {
            list.sort_by_key(|n| position[n]);
        }

        let mut ready: VecDeque<&str> = order
            .iter()
            .map(String::as_str)
            .filter(|n| waiting[n] == 0)
            .collect();
        let mut started: HashSet<&str> = HashSet::new();
        let mut completed: Vec<TaskRecord> = Vec::new();
        let mut failure: Option<(String, StageError)> = None;

        let (done_tx, done_rx) = mpsc::channel::<(&str, Result<TaskOutput, StageError>, Duration)>();

        std::thread::scope(|scope| {
            let mut in_flight = 0usize;
            loop {
                if failure.is_none() {
                    while let Some(name) = ready.pop_front() {
                        let task = self.task(name);
                        started.insert(name);
                        in_flight += 1;
                        tracing::info!(task = name, "task started");
                        emit(&events, TaskEvent::Started { task: name.to_string() });
                        let done_tx = done_tx.clone();
                        scope.spawn(move || {
                            let begun = Instant::now();
                            let result = catch_unwind(AssertUnwindSafe(|| (task.work)()))
                                .unwrap_or_else(|panic| Err(StageError::Panicked(panic_message(&*panic))));
                            let _ = done_tx.send((name, result, begun.elapsed()));
                        });
                    }
                }
                if in_flight == 0 {
                    break;
                }
                let Ok((name, result, elapsed)) = done_rx.recv() else {
                    break;
                };
                in_flight -= 1;
                match result {
                    Ok(output) => {
                        tracing::info!(task = name, ?elapsed, files = output.written.len(), "task finished");
                        emit(
                            &events,
                            TaskEvent::Finished {
                                task: name.to_string(),
                                written: output.written.len(),
                                elapsed,
                            },
                        );
                        for &dependent in dependents.get(name).map(Vec::as_slice).unwrap_or(&[]) {
                            if let Some(count) = waiting.get_mut(dependent) {
                                *count -= 1;
                                if *count == 0 {
                                    ready.push_back(dependent);
                                }
                            }
                        }
                        completed.push(TaskRecord {
                            name: name.to_string(),
                            output,
                            elapsed,
                        });
                    }
                    Err(err) => {
                        tracing::error!(task = name, error = %err, "task failed");
                        emit(
                            &events,
                            TaskEvent::Failed {
                                task: name.to_string(),
                                message: err.to_string(),
                            },
                        );
                        if failure.is_none() {
                            failure = Some((name.to_string(), err));
                        }
                    }
                }
            }
        });

        if let Some((task, source)) = failure {
            for name in order.iter().filter(|n| !started.contains(n.as_str())) {
                emit(&events, TaskEvent::Skipped { task: name.clone() });
            }
            return Err(GraphError::TaskFailed { task, source });
        }

        Ok(RunSummary {
            target: target.to_string(),
            tasks: completed,
            elapsed: run_started.elapsed(),
        })
    }
}

fn emit(events: &Option<Sender<TaskEvent>>, event: TaskEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
