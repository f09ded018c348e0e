//! Shared test utilities for the scenebuild test suite.
//!
//! Provides a throwaway copy of the fixture project plus small helpers for
//! writing files into temp trees.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = fixture_project();
//! let ctx = BuildContext::new(tmp.path(), fixture_config(), BuildMode::Production).unwrap();
//! write_file(tmp.path(), "scenes/airport/js/extra.js", "var x;");
//! ```

use std::path::Path;
use tempfile::TempDir;

use crate::config::{BuildConfig, SceneDescriptor};

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/project/` to a temp directory and return it.
///
/// The fixture holds one scene (`airport`, entry point `app.Belt`), the
/// shared elements document, `en` and `fr` messages and an index template.
/// Tests get an isolated copy they can mutate freely.
pub fn fixture_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/project");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

/// Stock config with the fixture's scene table.
pub fn fixture_config() -> BuildConfig {
    let mut config = BuildConfig::default();
    config
        .scenes
        .insert("airport".to_string(), SceneDescriptor::new("app.Belt"));
    config
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            std::fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            std::fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// File helpers
// =========================================================================

/// Write `contents` to `root/relative`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, contents).unwrap();
}

/// Every file under `root`, as sorted `/`-separated relative paths.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut files: Vec<String> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| {
            e.path()
                .strip_prefix(root)
                .unwrap()
                .components()
                .map(|c| c.as_os_str().to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join("/")
        })
        .collect();
    files.sort();
    files
}
