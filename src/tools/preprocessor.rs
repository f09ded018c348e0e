//! Stylesheet preprocessor interface and the `sass` command implementation.

use super::command::{ToolError, run_capture};
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Output style requested from the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CssStyle {
    Compressed,
    Expanded,
}

impl CssStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            CssStyle::Compressed => "compressed",
            CssStyle::Expanded => "expanded",
        }
    }
}

/// Compiles one stylesheet source to CSS.
pub trait StylePreprocessor: Send + Sync {
    fn preprocess(&self, path: &Path, style: CssStyle) -> Result<String, ToolError>;
}

/// Runs a Sass-compatible command line compiler, reading CSS from stdout.
#[derive(Debug, Clone)]
pub struct SassCommand {
    program: String,
    load_paths: Vec<PathBuf>,
}

impl SassCommand {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            load_paths: Vec::new(),
        }
    }

    pub fn with_load_path(mut self, path: &Path) -> Self {
        self.load_paths.push(path.to_path_buf());
        self
    }

    fn args(&self, path: &Path, style: CssStyle) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "--no-source-map".into(),
            format!("--style={}", style.as_str()).into(),
        ];
        for load_path in &self.load_paths {
            let mut flag = OsString::from("--load-path=");
            flag.push(load_path);
            args.push(flag);
        }
        args.push(path.into());
        args
    }
}

impl StylePreprocessor for SassCommand {
    fn preprocess(&self, path: &Path, style: CssStyle) -> Result<String, ToolError> {
        run_capture(&self.program, &self.args(path, style), None)
    }
}
