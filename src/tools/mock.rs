//! Recording tool doubles for stage tests.
//!
//! Uses Mutex (not RefCell) so the mocks are Sync and work under rayon.

use super::{CompileRequest, CssStyle, ScriptCompiler, StylePreprocessor, ToolError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Concatenates sources into the output wrapper instead of compiling.
///
/// Pretty requests keep the sources verbatim; otherwise comments and line
/// breaks are dropped, roughly what a minifier would leave behind.
#[derive(Default)]
pub struct MockCompiler {
    pub requests: Mutex<Vec<CompileRequest>>,
    pub failing: HashSet<String>,
}

impl MockCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(scene: &str) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failing: HashSet::from([scene.to_string()]),
        }
    }

    pub fn recorded(&self) -> Vec<CompileRequest> {
        let mut requests = self.requests.lock().unwrap().clone();
        requests.sort_by(|a, b| a.scene.cmp(&b.scene));
        requests
    }
}

impl ScriptCompiler for MockCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<String, ToolError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.scene) {
            return Err(ToolError::Failed {
                program: "mock-compiler".to_string(),
                status: "exit status: 1".to_string(),
                report: format!("ERROR - {}: JSC_TYPE_MISMATCH", request.scene),
            });
        }
        let mut body = String::new();
        for source in &request.sources {
            let text = std::fs::read_to_string(source)?;
            if request.pretty_print {
                body.push_str(&text);
            } else {
                for line in text.lines() {
                    let line = line.trim();
                    if !line.is_empty() && !line.starts_with("//") {
                        body.push_str(line);
                    }
                }
            }
        }
        Ok(request.output_wrapper.replace("%output%", &body))
    }
}

/// Treats SCSS as CSS; a source containing `@error` fails like a syntax error.
#[derive(Default)]
pub struct MockPreprocessor {
    pub calls: Mutex<Vec<(PathBuf, CssStyle)>>,
}

impl MockPreprocessor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StylePreprocessor for MockPreprocessor {
    fn preprocess(&self, path: &Path, style: CssStyle) -> Result<String, ToolError> {
        self.calls.lock().unwrap().push((path.to_path_buf(), style));
        let text = std::fs::read_to_string(path)?;
        if text.contains("@error") {
            return Err(ToolError::Failed {
                program: "mock-sass".to_string(),
                status: "exit status: 65".to_string(),
                report: format!("Error: {}:1 invalid syntax", path.display()),
            });
        }
        Ok(text)
    }
}
