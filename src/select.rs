//! File selection: glob patterns → ordered [`FileRecord`]s.
//!
//! Every stage starts here. Patterns are resolved relative to the project
//! root and support:
//!
//! - `{a,b}` brace expansion (nested groups allowed)
//! - `*` and `?` within a single path segment
//! - `**` across any number of segments
//! - `[abc]` character classes
//!
//! Results are sorted lexically by path and de-duplicated, so the output never
//! depends on filesystem enumeration order. A pattern that matches nothing is
//! not an error.

use glob::{MatchOptions, Pattern};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid glob pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// A selected file flowing through a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    /// Absolute (root-joined) path the file was read from.
    pub source: PathBuf,
    /// Path relative to the selection base; used to rebuild the layout at the destination.
    pub relative: PathBuf,
    /// File contents. Empty when selected with `read: false`.
    pub contents: Vec<u8>,
}

impl FileRecord {
    /// Destination path under `root`, mirroring the relative layout.
    pub fn destination(&self, root: &Path) -> PathBuf {
        root.join(&self.relative)
    }

    /// Contents as UTF-8, lossily decoded.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.contents).into_owned()
    }
}

/// Options for [`select`].
#[derive(Debug, Clone, Default)]
pub struct SelectOptions {
    /// Directory (relative to the root) stripped from matches to form
    /// [`FileRecord::relative`]. Defaults to the root itself.
    pub base: Option<PathBuf>,
    /// Load file contents into [`FileRecord::contents`].
    pub read: bool,
}

impl SelectOptions {
    pub fn reading() -> Self {
        Self {
            base: None,
            read: true,
        }
    }
}

fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Expand `{a,b}` groups into every alternative, left to right.
///
/// ```
/// use scenebuild::select::expand_braces;
/// assert_eq!(
///     expand_braces("{scenes,sass}/*.scss"),
///     vec!["scenes/*.scss", "sass/*.scss"]
/// );
/// ```
///
/// Groups without a top-level comma (`{a}`) and unbalanced braces are kept
/// literally.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some((open, close)) = find_brace_group(pattern) else {
        return vec![pattern.to_string()];
    };
    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    split_top_level(&pattern[open + 1..close])
        .into_iter()
        .flat_map(|alt| expand_braces(&format!("{prefix}{alt}{suffix}")))
        .collect()
}

/// Byte offsets of the first balanced `{...}` containing a top-level comma.
fn find_brace_group(pattern: &str) -> Option<(usize, usize)> {
    let bytes = pattern.as_bytes();
    for (open, _) in pattern.match_indices('{') {
        let mut depth = 0usize;
        let mut has_comma = false;
        for (offset, &b) in bytes[open..].iter().enumerate() {
            match b {
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        if has_comma {
                            return Some((open, open + offset));
                        }
                        break;
                    }
                }
                b',' if depth == 1 => has_comma = true,
                _ => {}
            }
        }
    }
    None
}

fn split_top_level(body: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, b) in body.bytes().enumerate() {
        match b {
            b'{' => depth += 1,
            b'}' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    parts
}

fn rooted_pattern(root: &Path, pattern: &str) -> String {
    let root = Pattern::escape(&root.to_string_lossy());
    let pattern = pattern.trim_start_matches("./");
    if root.is_empty() {
        pattern.to_string()
    } else {
        format!("{}/{}", root.trim_end_matches('/'), pattern)
    }
}

/// Resolve `patterns` under `root` into sorted, de-duplicated file records.
pub fn select<S: AsRef<str>>(
    root: &Path,
    patterns: &[S],
    options: &SelectOptions,
) -> Result<Vec<FileRecord>, SelectError> {
    let mut paths = BTreeSet::new();
    for pattern in patterns {
        for expanded in expand_braces(pattern.as_ref()) {
            let full = rooted_pattern(root, &expanded);
            let entries = glob::glob_with(&full, match_options()).map_err(|e| {
                SelectError::InvalidPattern {
                    pattern: pattern.as_ref().to_string(),
                    reason: e.to_string(),
                }
            })?;
            for entry in entries {
                let path = entry.map_err(|e| SelectError::Io(e.into()))?;
                if path.is_file() {
                    paths.insert(path);
                }
            }
        }
    }

    let base = match &options.base {
        Some(base) => root.join(base),
        None => root.to_path_buf(),
    };

    let mut records = Vec::with_capacity(paths.len());
    for path in paths {
        let relative = path
            .strip_prefix(&base)
            .or_else(|_| path.strip_prefix(root))
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.clone());
        let contents = if options.read {
            std::fs::read(&path)?
        } else {
            Vec::new()
        };
        records.push(FileRecord {
            source: path,
            relative,
            contents,
        });
    }
    Ok(records)
}

/// Whether `path` matches any of `patterns` resolved under `root`.
pub fn matches_any<S: AsRef<str>>(
    root: &Path,
    patterns: &[S],
    path: &Path,
) -> Result<bool, SelectError> {
    for pattern in patterns {
        for expanded in expand_braces(pattern.as_ref()) {
            let compiled = Pattern::new(&rooted_pattern(root, &expanded)).map_err(|e| {
                SelectError::InvalidPattern {
                    pattern: pattern.as_ref().to_string(),
                    reason: e.to_string(),
                }
            })?;
            if compiled.matches_path_with(path, match_options()) {
                return Ok(true);
            }
        }
    }
    Ok(false)
}
