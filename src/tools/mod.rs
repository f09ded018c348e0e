//! External tools invoked by the pipeline.
//!
//! | Tool | Trait | Production implementation |
//! |---|---|---|
//! | **Script compiler** | [`ScriptCompiler`] | [`ClosureCompiler`] (`java -jar compiler.jar`) |
//! | **Stylesheet preprocessor** | [`StylePreprocessor`] | [`SassCommand`] (`sass` CLI) |
//!
//! Stages only see the traits, so tests substitute recording mocks and never
//! need a JVM or a Sass install.

pub mod command;
pub mod compiler;
pub mod preprocessor;

#[cfg(test)]
pub(crate) mod mock;

pub use command::ToolError;
pub use compiler::{ClosureCompiler, CompileRequest, ScriptCompiler};
pub use preprocessor::{CssStyle, SassCommand, StylePreprocessor};

/// The external tools a build uses, bundled so stages can share them.
pub struct Toolchain {
    pub compiler: Box<dyn ScriptCompiler>,
    pub preprocessor: Box<dyn StylePreprocessor>,
}

impl Toolchain {
    /// Tools configured from the build config, rooted at the project.
    pub fn from_config(root: &std::path::Path, config: &crate::config::BuildConfig) -> Self {
        Self {
            compiler: Box::new(ClosureCompiler::new(
                &config.compiler.java,
                root.join(&config.compiler.jar),
            )),
            preprocessor: Box::new(
                SassCommand::new(&config.stylesheets.preprocessor).with_load_path(root),
            ),
        }
    }
}
