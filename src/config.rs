//! Build configuration module.
//!
//! Handles loading, validating, and merging `scenebuild.toml`. The file is
//! optional: stock defaults (which mirror the project layout the pipeline was
//! written for) are used as the base layer and user values are merged on top.
//!
//! ## Config File Location
//!
//! ```text
//! project/
//! ├── scenebuild.toml          # Build config (overrides stock defaults)
//! ├── index.html               # Master index template
//! ├── elements/elements_en.html
//! ├── scenes/
//! │   └── airport/
//! │       ├── airport-scene.html
//! │       └── js/*.js
//! ├── _messages/<locale>/messages.json
//! └── third_party/
//! ```
//!
//! ## Scene Table
//!
//! Scenes are whitelisted into compilation by name:
//!
//! ```toml
//! [scenes.airport]
//! entry_point = "app.Belt"
//! ```
//!
//! The table is deliberately explicit rather than discovered by scanning
//! `scenes/`, so the task graph is the same on every machine. Each entry is
//! checked against the filesystem when the [`BuildContext`](crate::stages::BuildContext)
//! is created.
//!
//! Unknown keys are rejected to catch typos early.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Name of the config file looked up in the project root.
pub const CONFIG_FILE: &str = "scenebuild.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Build-wide output mode.
///
/// Chosen once at startup and passed explicitly to every stage. Pretty mode
/// keeps compiled scripts readable, disables stripping of flattened HTML and
/// writes to a separate output directory so both flavours can coexist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildMode {
    #[default]
    Production,
    Pretty,
}

impl BuildMode {
    pub fn from_pretty_flag(pretty: bool) -> Self {
        if pretty {
            BuildMode::Pretty
        } else {
            BuildMode::Production
        }
    }

    pub fn is_pretty(self) -> bool {
        self == BuildMode::Pretty
    }

    /// Whether comments and insignificant whitespace are removed from output.
    pub fn strips(self) -> bool {
        !self.is_pretty()
    }

    /// Output directory name for this mode.
    pub fn dist_dir(self, config: &BuildConfig) -> &str {
        match self {
            BuildMode::Production => &config.dist_dir,
            BuildMode::Pretty => &config.pretty_dist_dir,
        }
    }
}

/// Build configuration loaded from `scenebuild.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BuildConfig {
    /// Output directory for production builds.
    pub dist_dir: String,
    /// Output directory for `--pretty` builds.
    pub pretty_dist_dir: String,
    /// External JavaScript compiler settings.
    pub compiler: CompilerConfig,
    /// Stylesheet sources and preprocessor command.
    pub stylesheets: StylesheetConfig,
    /// Scene whitelist, keyed by scene name.
    pub scenes: BTreeMap<String, SceneDescriptor>,
    /// HTML flattening settings.
    pub vulcanize: VulcanizeConfig,
    /// Per-locale index generation.
    pub locales: LocaleConfig,
    /// Static assets copied verbatim into the output directory.
    pub assets: AssetsConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            dist_dir: "dist".to_string(),
            pretty_dist_dir: "dist_pretty".to_string(),
            compiler: CompilerConfig::default(),
            stylesheets: StylesheetConfig::default(),
            scenes: BTreeMap::new(),
            vulcanize: VulcanizeConfig::default(),
            locales: LocaleConfig::default(),
            assets: AssetsConfig::default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl BuildConfig {
    /// Validate config values. Does not touch the filesystem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dist_dir.trim().is_empty() || self.pretty_dist_dir.trim().is_empty() {
            return Err(ConfigError::Validation(
                "dist_dir and pretty_dist_dir must not be empty".into(),
            ));
        }
        if self.dist_dir == self.pretty_dist_dir {
            return Err(ConfigError::Validation(
                "dist_dir and pretty_dist_dir must differ".into(),
            ));
        }
        for (name, scene) in &self.scenes {
            if !is_js_identifier(name) {
                return Err(ConfigError::Validation(format!(
                    "scene name '{name}' must be a valid JavaScript identifier"
                )));
            }
            if scene.entry_point.trim().is_empty() {
                return Err(ConfigError::Validation(format!(
                    "scenes.{name}.entry_point must not be empty"
                )));
            }
        }
        for pattern in self
            .vulcanize
            .scene_excludes
            .iter()
            .chain(&self.vulcanize.elements_excludes)
        {
            Regex::new(pattern).map_err(|e| {
                ConfigError::Validation(format!("invalid exclude pattern '{pattern}': {e}"))
            })?;
        }
        // Anything kept out of scene documents must be inlined by the
        // elements document, otherwise it would never be inlined at all.
        if let Some(shared) = self
            .vulcanize
            .scene_excludes
            .iter()
            .find(|p| self.vulcanize.elements_excludes.contains(p))
        {
            return Err(ConfigError::Validation(format!(
                "exclude pattern '{shared}' is in both scene_excludes and elements_excludes"
            )));
        }
        // Locales name directories and output files.
        if let Some(locale) = self
            .locales
            .locales
            .iter()
            .chain(std::iter::once(&self.vulcanize.default_locale))
            .find(|l| !is_locale_id(l))
        {
            return Err(ConfigError::Validation(format!(
                "locale '{locale}' must be non-empty and use only letters, digits, '_' or '-'"
            )));
        }
        Ok(())
    }
}

fn is_locale_id(locale: &str) -> bool {
    !locale.is_empty()
        && locale
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

fn is_js_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

/// External compiler settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    /// Java executable used to launch the compiler jar.
    pub java: String,
    /// Path to the Closure Compiler jar, relative to the project root.
    pub jar: String,
    /// Shared library compiled into every scene (provides `goog.provide` and `@export`).
    pub shared_library: String,
    /// Externs globs: type-checked against, never emitted.
    pub externs: Vec<String>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            java: "java".to_string(),
            jar: "components/closure-compiler/compiler.jar".to_string(),
            shared_library: "third_party/lib/base.js".to_string(),
            externs: vec![
                "third_party/externs/greensock/*.js".to_string(),
                "third_party/externs/jquery/*.js".to_string(),
            ],
        }
    }
}

/// Stylesheet sources and the preprocessor used to build them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StylesheetConfig {
    /// Globs (brace expansion allowed) selecting stylesheet sources.
    pub patterns: Vec<String>,
    /// Sass-compatible command line compiler.
    pub preprocessor: String,
}

impl Default for StylesheetConfig {
    fn default() -> Self {
        Self {
            patterns: vec!["{scenes,sass,elements}/**/*.scss".to_string()],
            preprocessor: "sass".to_string(),
        }
    }
}

/// One entry in the scene whitelist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SceneDescriptor {
    /// Closure entry point symbol, e.g. `app.Belt`.
    pub entry_point: String,
    /// Source globs; defaults to `scenes/<name>/js/*.js`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    /// Always pretty-print this scene, regardless of build mode.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pretty: bool,
}

impl SceneDescriptor {
    pub fn new(entry_point: &str) -> Self {
        Self {
            entry_point: entry_point.to_string(),
            sources: None,
            pretty: false,
        }
    }

    /// Source globs for the scene named `name`.
    pub fn source_patterns(&self, name: &str) -> Vec<String> {
        match &self.sources {
            Some(patterns) => patterns.clone(),
            None => vec![format!("scenes/{name}/js/*.js")],
        }
    }
}

/// HTML flattening settings.
///
/// The two exclude sets are kept apart on purpose: scene documents leave the
/// shared runtime imports external because `elements_document` inlines them
/// once for the whole app.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VulcanizeConfig {
    /// Globs selecting each scene's top-level document.
    pub scene_documents: Vec<String>,
    /// The shared elements document.
    pub elements_document: String,
    /// Import href patterns (regex) left external in scene documents.
    pub scene_excludes: Vec<String>,
    /// Import href patterns (regex) left external in the elements document.
    pub elements_excludes: Vec<String>,
    /// Root of the translated message bundles.
    pub messages_dir: String,
    /// Locale whose messages are substituted into flattened documents.
    pub default_locale: String,
}

impl Default for VulcanizeConfig {
    fn default() -> Self {
        Self {
            scene_documents: vec!["scenes/*/*-scene*.html".to_string()],
            elements_document: "elements/elements_en.html".to_string(),
            scene_excludes: vec![
                "polymer.html$".to_string(),
                "base-scene.html$".to_string(),
                "i18n-msg.html$".to_string(),
            ],
            elements_excludes: Vec::new(),
            messages_dir: "_messages".to_string(),
            default_locale: "en".to_string(),
        }
    }
}

/// Per-locale index generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LocaleConfig {
    /// Master index template containing `{{key}}` placeholders.
    pub index_template: String,
    /// Locales to generate an index document for.
    pub locales: Vec<String>,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            index_template: "index.html".to_string(),
            locales: vec!["fr".to_string()],
        }
    }
}

/// Static assets copied into the output directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AssetsConfig {
    pub patterns: Vec<String>,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            patterns: [
                "index.html",
                "schedule.html",
                "manifest.json",
                "audio/*",
                "images/*.{png,svg,gif,ico}",
                "js/**/*",
                "sass/*.css",
                "scenes/*/*.min.js",
                "scenes/**/img/**/*.{png,svg,gif}",
                "elements/**/img/*.{png,svg,gif}",
                "components/platform/*",
                "components/polymer/*",
                "components/webcomponentsjs/webcomponents.min.js",
            ]
            .iter()
            .map(|p| p.to_string())
            .collect(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers for per-file fan-out.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(BuildConfig::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<BuildConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: BuildConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load the build config for a project.
///
/// `explicit` overrides the default `<root>/scenebuild.toml` location.
pub fn load_config(root: &Path, explicit: Option<&Path>) -> Result<BuildConfig, ConfigError> {
    let path = match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::Validation(format!(
                    "config file not found: {}",
                    path.display()
                )));
            }
            path.to_path_buf()
        }
        None => root.join(CONFIG_FILE),
    };
    let overlay = load_raw_config(&path)?;
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `scenebuild.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# scenebuild configuration
# ========================
# Values shown below are the defaults, except for the [scenes.*] tables,
# which are empty by default and must list every scene to compile.
# Unknown keys will cause an error.

# Output directory for production builds.
dist_dir = "dist"

# Output directory for --pretty builds (readable scripts, unstripped HTML).
pretty_dist_dir = "dist_pretty"

# ---------------------------------------------------------------------------
# Scene whitelist
# ---------------------------------------------------------------------------
# One table per scene. Each scene must have a scenes/<name>/ directory.
# sources defaults to ["scenes/<name>/js/*.js"].
# pretty = true pretty-prints this scene even in production builds.
[scenes.airport]
entry_point = "app.Belt"

# ---------------------------------------------------------------------------
# Script compiler (Closure Compiler)
# ---------------------------------------------------------------------------
[compiler]
java = "java"
jar = "components/closure-compiler/compiler.jar"

# Compiled into every scene for goog.provide/@export support.
shared_library = "third_party/lib/base.js"

# Declaration-only sources, type-checked but never emitted.
externs = ["third_party/externs/greensock/*.js", "third_party/externs/jquery/*.js"]

# ---------------------------------------------------------------------------
# Stylesheets
# ---------------------------------------------------------------------------
[stylesheets]
# Built CSS is written next to each source, not into the output directory.
patterns = ["{scenes,sass,elements}/**/*.scss"]
preprocessor = "sass"

# ---------------------------------------------------------------------------
# HTML flattening
# ---------------------------------------------------------------------------
[vulcanize]
scene_documents = ["scenes/*/*-scene*.html"]
elements_document = "elements/elements_en.html"

# Imports left external in scene documents. They are inlined once, by the
# elements document, so they must not appear in elements_excludes.
scene_excludes = ["polymer.html$", "base-scene.html$", "i18n-msg.html$"]
elements_excludes = []

messages_dir = "_messages"
default_locale = "en"

# ---------------------------------------------------------------------------
# Locale index pages
# ---------------------------------------------------------------------------
[locales]
index_template = "index.html"
locales = ["fr"]

# ---------------------------------------------------------------------------
# Static assets
# ---------------------------------------------------------------------------
[assets]
patterns = [
    "index.html",
    "schedule.html",
    "manifest.json",
    "audio/*",
    "images/*.{png,svg,gif,ico}",
    "js/**/*",
    "sass/*.css",
    "scenes/*/*.min.js",
    "scenes/**/img/**/*.{png,svg,gif}",
    "elements/**/img/*.{png,svg,gif}",
    "components/platform/*",
    "components/polymer/*",
    "components/webcomponentsjs/webcomponents.min.js",
]

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel workers for per-file work.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
