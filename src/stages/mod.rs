//! Build stages: the work behind each named task.
//!
//! | Stage | Task(s) | Writes to |
//! |---|---|---|
//! | [`clean`] | `clean` | removes the output directory |
//! | [`stylesheet`] | `compass` | `<stem>.css` beside each source |
//! | [`compile`] | `compile-scenes` | `scenes/<name>/<name>-scene.min.js` |
//! | [`vulcanize`] | `vulcanize-scenes`, `vulcanize-elements` | output directory |
//! | [`locale_index`] | `i18n-index` | `<dist>/index_<locale>.html` |
//! | [`assets`] | `copy-assets` | output directory |
//!
//! Every stage takes the shared [`BuildContext`] and returns the files it
//! wrote. Fan-out inside a stage uses rayon; a stage returns only after all
//! of its units have settled.

pub mod assets;
pub mod clean;
pub mod compile;
pub mod locale_index;
pub mod stylesheet;
pub mod vulcanize;

use crate::config::{BuildConfig, BuildMode};
use crate::flatten::FlattenError;
use crate::messages::{MessageDictionary, MessageError};
use crate::select::SelectError;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Select(#[from] SelectError),
    #[error("{stage}: source not found: {}", .path.display())]
    SourceNotFound { stage: &'static str, path: PathBuf },
    #[error("compiling scene '{scene}' failed:\n{report}")]
    Compile { scene: String, report: String },
    #[error("preprocessing {} failed:\n{report}", .path.display())]
    Preprocess { path: PathBuf, report: String },
    #[error("flattening {} failed: {source}", .path.display())]
    Flatten {
        path: PathBuf,
        #[source]
        source: FlattenError,
    },
    #[error(transparent)]
    Messages(#[from] MessageError),
    #[error("copying {} failed: {source}", .path.display())]
    Copy {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing {} failed: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("task panicked: {0}")]
    Panicked(String),
}

/// Everything a stage needs besides its tools: where the project is, how it
/// is configured and which mode the build runs in.
#[derive(Debug, Clone)]
pub struct BuildContext {
    pub root: PathBuf,
    pub config: BuildConfig,
    pub mode: BuildMode,
}

impl BuildContext {
    /// Fails with `SourceNotFound` when a configured scene has no
    /// `scenes/<name>/` directory.
    pub fn new(root: &Path, config: BuildConfig, mode: BuildMode) -> Result<Self, StageError> {
        for name in config.scenes.keys() {
            let dir = root.join("scenes").join(name);
            if !dir.is_dir() {
                return Err(StageError::SourceNotFound {
                    stage: "scenes",
                    path: dir,
                });
            }
        }
        Ok(Self {
            root: root.to_path_buf(),
            config,
            mode,
        })
    }

    /// Output directory for the current mode.
    pub fn dist_dir(&self) -> PathBuf {
        self.root.join(self.mode.dist_dir(&self.config))
    }

    pub fn messages_dir(&self) -> PathBuf {
        self.root.join(&self.config.vulcanize.messages_dir)
    }

    /// Load one locale's messages; a locale without data is a missing source.
    pub fn dictionary(
        &self,
        stage: &'static str,
        locale: &str,
    ) -> Result<MessageDictionary, StageError> {
        MessageDictionary::load(&self.messages_dir(), locale).map_err(|e| match e {
            MessageError::LocaleNotFound { path, .. } => StageError::SourceNotFound { stage, path },
            other => StageError::Messages(other),
        })
    }

    /// Project-relative, `/`-separated form of `path`.
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// Write `contents` to `path`, creating parent directories.
pub(crate) fn write_output(path: &Path, contents: impl AsRef<[u8]>) -> Result<(), StageError> {
    let result = match path.parent() {
        Some(parent) => fs::create_dir_all(parent).and_then(|_| fs::write(path, contents)),
        None => fs::write(path, contents),
    };
    result.map_err(|source| StageError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Split per-unit results into written paths, returning the first error in
/// unit order once every unit has been attempted.
pub(crate) fn settle<T>(results: Vec<Result<T, StageError>>) -> Result<Vec<T>, StageError> {
    let mut ok = Vec::with_capacity(results.len());
    let mut first_error = None;
    for result in results {
        match result {
            Ok(value) => ok.push(value),
            Err(e) if first_error.is_none() => first_error = Some(e),
            Err(e) => tracing::debug!(error = %e, "additional failure in stage"),
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(ok),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SceneDescriptor;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    #[test]
    fn context_rejects_missing_scene_directory() {
        let tmp = TempDir::new().unwrap();
        let mut config = BuildConfig::default();
        config
            .scenes
            .insert("airport".to_string(), SceneDescriptor::new("app.Belt"));

        let err = BuildContext::new(tmp.path(), config.clone(), BuildMode::Production).unwrap_err();
        match err {
            StageError::SourceNotFound { path, .. } => assert!(path.ends_with("scenes/airport")),
            other => panic!("expected SourceNotFound, got {other:?}"),
        }

        write_file(tmp.path(), "scenes/airport/js/belt.js", "");
        assert!(BuildContext::new(tmp.path(), config, BuildMode::Production).is_ok());
    }

    #[test]
    fn dist_dir_follows_mode() {
        let tmp = TempDir::new().unwrap();
        let prod = BuildContext::new(tmp.path(), BuildConfig::default(), BuildMode::Production).unwrap();
        let pretty = BuildContext::new(tmp.path(), BuildConfig::default(), BuildMode::Pretty).unwrap();
        assert_eq!(prod.dist_dir(), tmp.path().join("dist"));
        assert_eq!(pretty.dist_dir(), tmp.path().join("dist_pretty"));
    }

    #[test]
    fn missing_locale_is_source_not_found() {
        let tmp = TempDir::new().unwrap();
        let ctx = BuildContext::new(tmp.path(), BuildConfig::default(), BuildMode::Production).unwrap();
        assert!(matches!(
            ctx.dictionary("i18n-index", "de"),
            Err(StageError::SourceNotFound { stage: "i18n-index", .. })
        ));
    }

    #[test]
    fn settle_reports_first_error_after_all_units() {
        let results: Vec<Result<u32, StageError>> = vec![
            Ok(1),
            Err(StageError::Panicked("a".into())),
            Ok(3),
            Err(StageError::Panicked("b".into())),
        ];
        assert!(matches!(settle(results), Err(StageError::Panicked(m)) if m == "a"));
        assert_eq!(settle::<u32>(vec![Ok(1), Ok(2)]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn write_output_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("dist/a/b/c.txt");
        write_output(&path, "hi").unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "hi");
    }
}
