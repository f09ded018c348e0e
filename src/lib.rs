//! # scenebuild
//!
//! Build orchestration for a multi-scene web application: turns a source tree
//! of markup fragments, per-scene scripts, stylesheets and translated message
//! bundles into a deployable bundle.
//!
//! # Architecture: Task Graph Over Stages
//!
//! A build is a graph of named tasks. Each task wraps one stage and lists the
//! tasks that must finish before it starts:
//!
//! ```text
//! clean, compass, compile-scenes          (independent, run concurrently)
//! vulcanize-scenes, vulcanize-elements    (need clean + compass [+ compile-scenes])
//! i18n-index                              (needs both vulcanize tasks)
//! copy-assets                             (needs everything above)
//! ```
//!
//! Work that repeats per unit (per stylesheet, per scene, per document, per
//! locale) fans out inside its stage with rayon, so the graph itself stays
//! small and a dependent never sees a half-finished prerequisite.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`graph`] | Task declaration, planning (cycle/unknown detection) and concurrent execution |
//! | [`pipeline`] | The standard task table wired to the stages |
//! | [`stages`] | Clean, stylesheet, compile, vulcanize, locale index and asset copy stages |
//! | [`select`] | Glob + brace expansion file selection |
//! | [`flatten`] | HTML import inlining with exclude sets, CSP script extraction and stripping |
//! | [`messages`] | Chrome-format message tables and `<i18n-msg>` / `{{key}}` substitution |
//! | [`tools`] | External compiler and preprocessor behind traits |
//! | [`config`] | `scenebuild.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting for plans, progress events and summaries |
//! | [`watch`] | Stylesheet rebuilds on file change |
//!
//! # Design Decisions
//!
//! ## Build Mode Is a Value, Not a Global
//!
//! Production and pretty builds differ in output directory, CSS style, script
//! formatting and HTML stripping. The mode is chosen once and carried in
//! [`stages::BuildContext`], so the same process can build both flavours.
//!
//! ## Flattening in Rust
//!
//! Import inlining and message substitution are plain text transforms over a
//! handful of regular expressions. Doing them natively keeps the build down to
//! two external programs (the script compiler and the Sass compiler), both
//! hidden behind traits that tests replace with recording mocks.

pub mod config;
pub mod flatten;
pub mod graph;
pub mod messages;
pub mod output;
pub mod pipeline;
pub mod select;
pub mod stages;
pub mod tools;
pub mod watch;

#[cfg(test)]
pub(crate) mod test_helpers;
