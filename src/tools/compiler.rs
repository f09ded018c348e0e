//! Script compiler interface and the Closure Compiler implementation.

use super::command::{ToolError, run_capture};
use std::ffi::OsString;
use std::path::PathBuf;

/// Whole-program optimization level used for every scene.
pub const COMPILATION_LEVEL: &str = "ADVANCED_OPTIMIZATIONS";
/// Input dialect.
pub const LANGUAGE_IN: &str = "ECMASCRIPT5_STRICT";
/// Diagnostic groups promoted from warnings to errors.
pub const PROMOTED_WARNINGS: [&str; 3] = ["accessControls", "const", "visibility"];

/// Everything the compiler needs to produce one scene bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    /// Scene name, for diagnostics.
    pub scene: String,
    /// Sources to compile, in order.
    pub sources: Vec<PathBuf>,
    /// Declaration-only inputs: type-checked, never emitted.
    pub externs: Vec<PathBuf>,
    pub entry_point: String,
    /// Template wrapped around the output; `%output%` marks the compiled code.
    pub output_wrapper: String,
    pub compilation_level: String,
    pub language_in: String,
    pub process_closure_primitives: bool,
    pub generate_exports: bool,
    /// Diagnostic groups reported as errors.
    pub errors: Vec<String>,
    /// Human-readable output instead of minified.
    pub pretty_print: bool,
}

impl CompileRequest {
    /// Command-line flags in Closure Compiler syntax.
    pub fn to_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--compilation_level".into(),
            self.compilation_level.clone().into(),
            "--language_in".into(),
            self.language_in.clone().into(),
        ];
        if self.process_closure_primitives {
            args.push("--process_closure_primitives".into());
        }
        if self.generate_exports {
            args.push("--generate_exports".into());
        }
        for group in &self.errors {
            args.push("--jscomp_error".into());
            args.push(group.into());
        }
        args.push("--closure_entry_point".into());
        args.push(self.entry_point.clone().into());
        args.push("--output_wrapper".into());
        args.push(self.output_wrapper.clone().into());
        if self.pretty_print {
            args.push("--formatting".into());
            args.push("PRETTY_PRINT".into());
        }
        for externs in &self.externs {
            args.push("--externs".into());
            args.push(externs.into());
        }
        for source in &self.sources {
            args.push("--js".into());
            args.push(source.into());
        }
        args
    }
}

/// A compiler turning a [`CompileRequest`] into a single script buffer.
pub trait ScriptCompiler: Send + Sync {
    fn compile(&self, request: &CompileRequest) -> Result<String, ToolError>;
}

/// Runs the Closure Compiler jar through `java`.
#[derive(Debug, Clone)]
pub struct ClosureCompiler {
    java: String,
    jar: PathBuf,
}

impl ClosureCompiler {
    pub fn new(java: &str, jar: PathBuf) -> Self {
        Self {
            java: java.to_string(),
            jar,
        }
    }
}

impl ScriptCompiler for ClosureCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<String, ToolError> {
        let mut args: Vec<OsString> = vec!["-jar".into(), self.jar.clone().into()];
        args.extend(request.to_args());
        run_capture(&self.java, &args, None)
    }
}
