//! HTML import flattening ("vulcanizing").
//!
//! Turns a document and everything it pulls in through
//! `<link rel="import">` into one self-contained file:
//!
//! 1. **Imports**: each import is spliced in place, recursively. A document is
//!    inlined at most once per output; later references to it are dropped,
//!    which also breaks import cycles. Imports matching the [`ExcludeSet`] are
//!    left as external references.
//! 2. **URLs**: relative `src`/`href` attributes and CSS `url()`s inside
//!    inlined documents are rewritten so they resolve from the output
//!    document's directory.
//! 3. **Inline** (optional): local stylesheets become `<style>` blocks and
//!    local script sources are read in.
//! 4. **CSP** (optional): every script is moved, in document order, into a
//!    companion `<stem>.js` loaded by a single `<script src>`. Inline event
//!    handler attributes and `javascript:` URLs are rejected.
//! 5. **Strip** (optional): comments and inter-tag whitespace are removed,
//!    leaving `<script>`, `<style>`, `<pre>` and `<textarea>` bodies alone.
//!
//! Markup inside `<!-- -->` is never interpreted: a commented-out import,
//! script or handler stays inert and goes away with its comment.
//!
//! The pass is purely a function of its inputs, so flattening the same files
//! twice yields byte-identical output.

use regex::{Captures, Regex};
use std::collections::HashSet;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FlattenError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unresolved import '{href}' in {}", .document.display())]
    UnresolvedImport { href: String, document: PathBuf },
    #[error("{}: {construct} is not allowed under a strict content security policy", .document.display())]
    CspViolation { document: PathBuf, construct: String },
    #[error("invalid exclude pattern '{pattern}' in {set}: {source}")]
    InvalidExclude {
        set: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

static LINK_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<link\b[^>]*>").expect("link tag regex"));
static ANY_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<([a-zA-Z][-a-zA-Z0-9]*)\b[^>]*>").expect("tag regex")
});
static ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)([^\s=/>"']+)(?:\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+)))?"#)
        .expect("attribute regex")
});
static URL_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s(?:src|href)\s*=\s*)(?:"([^"]*)"|'([^']*)'|([^\s"'>]+))"#)
        .expect("url attribute regex")
});
static CSS_URL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"url\(\s*(?:"([^"]*)"|'([^']*)'|([^)'"\s]+))\s*\)"#).expect("css url regex")
});
/// Comments, then the raw-text elements, leftmost match first.
static OPAQUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?is)(<!--.*?-->)|(<script\b[^>]*>)(.*?)(</script\s*>)|(<style\b[^>]*>)(.*?)(</style\s*>)|(<pre\b[^>]*>)(.*?)(</pre\s*>)|(<textarea\b[^>]*>)(.*?)(</textarea\s*>)",
    )
    .expect("opaque segment regex")
});
static DOCUMENT_WRAPPER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?is)<!doctype[^>]*>|</?(?:html|head|body)\b[^>]*>").expect("wrapper regex")
});
static BETWEEN_TAGS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r">\s+<").expect("whitespace regex"));
static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace run regex"));

const CSP_SCRIPT_MARKER: &str = "\u{0}scenebuild-csp-script\u{0}";

/// DOM event-handler content attributes, sorted. Custom-element attributes
/// that merely start with `on` (`once`, `onlabel`) are not handlers.
const EVENT_HANDLERS: &[&str] = &[
    "onabort", "onafterprint", "onanimationend", "onanimationiteration", "onanimationstart",
    "onauxclick", "onbeforeinput", "onbeforeprint", "onbeforeunload", "onblur", "oncancel",
    "oncanplay", "oncanplaythrough", "onchange", "onclick", "onclose", "oncontextmenu",
    "oncopy", "oncuechange", "oncut", "ondblclick", "ondrag", "ondragend", "ondragenter",
    "ondragleave", "ondragover", "ondragstart", "ondrop", "ondurationchange", "onemptied",
    "onended", "onerror", "onfocus", "onfocusin", "onfocusout", "onformdata",
    "onhashchange", "oninput", "oninvalid", "onkeydown", "onkeypress", "onkeyup",
    "onlanguagechange", "onload", "onloadeddata", "onloadedmetadata", "onloadstart",
    "onmessage", "onmessageerror", "onmousedown", "onmouseenter", "onmouseleave",
    "onmousemove", "onmouseout", "onmouseover", "onmouseup", "onmousewheel", "onoffline",
    "ononline", "onpagehide", "onpageshow", "onpaste", "onpause", "onplay", "onplaying",
    "onpointercancel", "onpointerdown", "onpointerenter", "onpointerleave",
    "onpointermove", "onpointerout", "onpointerover", "onpointerup", "onpopstate",
    "onprogress", "onratechange", "onrejectionhandled", "onreset", "onresize", "onscroll",
    "onsearch", "onseeked", "onseeking", "onselect", "onselectionchange", "onselectstart",
    "onshow", "onstalled", "onstorage", "onsubmit", "onsuspend", "ontimeupdate",
    "ontoggle", "ontouchcancel", "ontouchend", "ontouchmove", "ontouchstart",
    "ontransitioncancel", "ontransitionend", "ontransitionrun", "ontransitionstart",
    "onunhandledrejection", "onunload", "onvolumechange", "onwaiting", "onwheel",
];

/// Named set of import-href patterns kept external during flattening.
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    name: String,
    patterns: Vec<Regex>,
}

impl ExcludeSet {
    pub fn new<S: AsRef<str>>(name: &str, patterns: &[S]) -> Result<Self, FlattenError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(p.as_ref()).map_err(|source| FlattenError::InvalidExclude {
                    set: name.to_string(),
                    pattern: p.as_ref().to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            name: name.to_string(),
            patterns,
        })
    }

    pub fn empty(name: &str) -> Self {
        Self {
            name: name.to_string(),
            patterns: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn matches(&self, href: &str) -> bool {
        self.patterns.iter().any(|p| p.is_match(href))
    }
}

#[derive(Debug, Clone)]
pub struct FlattenOptions {
    pub excludes: ExcludeSet,
    pub inline: bool,
    pub csp: bool,
    pub strip: bool,
}

/// Output of [`flatten`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlattenedDocument {
    pub html: String,
    /// Companion script collected in CSP mode.
    pub script: Option<String>,
    /// File name the companion script must be written to, next to the document.
    pub script_name: String,
    /// Import hrefs left external because they matched the exclude set.
    pub external_imports: Vec<String>,
    /// Every document spliced into the output, root first.
    pub inlined: Vec<PathBuf>,
}

/// Flatten `document` according to `options`.
pub fn flatten(document: &Path, options: &FlattenOptions) -> Result<FlattenedDocument, FlattenError> {
    let document = normalize(document);
    let out_dir = document.parent().map(Path::to_path_buf).unwrap_or_default();
    let stem = document
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());

    let mut flattener = Flattener {
        out_dir,
        options,
        seen: HashSet::new(),
        inlined: Vec::new(),
        external: Vec::new(),
    };
    let spliced = flattener.inline_document(&document, true)?;
    let script_name = format!("{stem}.js");
    let (mut html, script) = flattener.process_scripts(&spliced, &document, &script_name)?;

    if options.csp {
        check_csp(&html, &document)?;
    }
    if options.strip {
        html = strip(&html);
    }

    tracing::debug!(
        document = %document.display(),
        inlined = flattener.inlined.len(),
        external = flattener.external.len(),
        "flattened document"
    );
    Ok(FlattenedDocument {
        html,
        script,
        script_name,
        external_imports: flattener.external,
        inlined: flattener.inlined,
    })
}

/// Hrefs of every `<link rel="import">` remaining in `html`.
pub fn remaining_imports(html: &str) -> Vec<String> {
    segments(html)
        .into_iter()
        .filter_map(|segment| match segment {
            Segment::Markup(markup) => Some(markup),
            _ => None,
        })
        .flat_map(|markup| LINK_TAG.find_iter(markup))
        .filter_map(|tag| {
            let attrs = parse_attributes(tag.as_str());
            let is_import = attribute(&attrs, "rel")
                .is_some_and(|rel| rel.eq_ignore_ascii_case("import"));
            if is_import {
                attribute(&attrs, "href").map(str::to_string)
            } else {
                None
            }
        })
        .collect()
}

struct Flattener<'a> {
    out_dir: PathBuf,
    options: &'a FlattenOptions,
    seen: HashSet<PathBuf>,
    inlined: Vec<PathBuf>,
    external: Vec<String>,
}

impl Flattener<'_> {
    fn inline_document(&mut self, path: &Path, is_root: bool) -> Result<String, FlattenError> {
        self.seen.insert(path.to_path_buf());
        self.inlined.push(path.to_path_buf());

        let mut text = fs::read_to_string(path)?;
        if !is_root {
            let from_dir = path.parent().unwrap_or(Path::new(""));
            text = DOCUMENT_WRAPPER.replace_all(&text, "").into_owned();
            text = rewrite_document_urls(&text, from_dir, &self.out_dir);
        }

        let mut out = String::with_capacity(text.len());
        for segment in segments(&text) {
            match segment {
                Segment::Markup(markup) => out.push_str(&self.expand_links(markup, path)?),
                Segment::Comment(comment) => out.push_str(comment),
                Segment::Raw { open, body, close } => {
                    out.push_str(open);
                    out.push_str(body);
                    out.push_str(close);
                }
            }
        }
        Ok(out)
    }

    fn expand_links(&mut self, markup: &str, document: &Path) -> Result<String, FlattenError> {
        let mut out = String::with_capacity(markup.len());
        let mut last = 0;
        for tag in LINK_TAG.find_iter(markup) {
            out.push_str(&markup[last..tag.start()]);
            last = tag.end();

            let attrs = parse_attributes(tag.as_str());
            let rel = attribute(&attrs, "rel").map(str::to_ascii_lowercase);
            let Some(href) = attribute(&attrs, "href").filter(|h| !is_external_url(h)) else {
                out.push_str(tag.as_str());
                continue;
            };

            match rel.as_deref() {
                Some("import") if self.options.excludes.matches(href) => {
                    if !self.external.iter().any(|e| e == href) {
                        tracing::debug!(
                            set = self.options.excludes.name(),
                            href,
                            document = %document.display(),
                            "import kept external"
                        );
                        self.external.push(href.to_string());
                        out.push_str(tag.as_str());
                    }
                }
                Some("import") => {
                    let target = self.resolve(href, document)?;
                    if !self.seen.contains(&target) {
                        out.push_str(&self.inline_document(&target, false)?);
                    }
                }
                Some("stylesheet") if self.options.inline => {
                    let target = self.resolve(href, document)?;
                    let css = fs::read_to_string(&target)?;
                    let from_dir = target.parent().unwrap_or(Path::new(""));
                    out.push_str("<style>");
                    out.push_str(&rewrite_css_urls(&css, from_dir, &self.out_dir));
                    out.push_str("</style>");
                }
                _ => out.push_str(tag.as_str()),
            }
        }
        out.push_str(&markup[last..]);
        Ok(out)
    }

    /// Resolve an href (already relative to the output directory) to an existing file.
    fn resolve(&self, href: &str, document: &Path) -> Result<PathBuf, FlattenError> {
        let target = normalize(&self.out_dir.join(strip_query(href)));
        if target.is_file() {
            Ok(target)
        } else {
            Err(FlattenError::UnresolvedImport {
                href: href.to_string(),
                document: document.to_path_buf(),
            })
        }
    }

    fn process_scripts(
        &self,
        html: &str,
        document: &Path,
        script_name: &str,
    ) -> Result<(String, Option<String>), FlattenError> {
        let mut out = String::with_capacity(html.len());
        let mut collected: Vec<String> = Vec::new();

        for segment in segments(html) {
            let (open, body, close) = match segment {
                Segment::Markup(text) | Segment::Comment(text) => {
                    out.push_str(text);
                    continue;
                }
                Segment::Raw { open, body, close } => (open, body, close),
            };
            let attrs = parse_attributes(open);
            let is_script = open[1..].to_ascii_lowercase().starts_with("script");
            if !is_script || !is_javascript(attribute(&attrs, "type")) {
                out.push_str(open);
                out.push_str(body);
                out.push_str(close);
                continue;
            }

            let code = match attribute(&attrs, "src") {
                Some(src) if is_external_url(src) || !self.options.inline => {
                    out.push_str(open);
                    out.push_str(body);
                    out.push_str(close);
                    continue;
                }
                Some(src) => fs::read_to_string(self.resolve(src, document)?)?,
                None => body.to_string(),
            };

            if self.options.csp {
                if collected.is_empty() {
                    out.push_str(CSP_SCRIPT_MARKER);
                }
                collected.push(code.trim().to_string());
            } else {
                out.push_str("<script>");
                out.push_str(&code);
                out.push_str("</script>");
            }
        }

        if collected.is_empty() {
            return Ok((out, None));
        }
        let tag = format!("<script src=\"{script_name}\"></script>");
        let html = out.replacen(CSP_SCRIPT_MARKER, &tag, 1);
        let mut script = collected.join(";\n");
        script.push('\n');
        Ok((html, Some(script)))
    }
}

enum Segment<'a> {
    Markup(&'a str),
    /// `<!-- ... -->`, passed through untouched and dropped by [`strip`].
    Comment(&'a str),
    Raw {
        open: &'a str,
        body: &'a str,
        close: &'a str,
    },
}

/// Split `html` into markup, comments and raw-text elements (script, style,
/// pre, textarea). Tags inside a comment or a raw element are not markup.
fn segments(html: &str) -> Vec<Segment<'_>> {
    let mut out = Vec::new();
    let mut last = 0;
    for caps in OPAQUE.captures_iter(html) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            out.push(Segment::Markup(&html[last..whole.start()]));
        }
        last = whole.end();
        if let Some(comment) = caps.get(1) {
            out.push(Segment::Comment(comment.as_str()));
            continue;
        }
        let group = [2, 5, 8, 11]
            .into_iter()
            .find(|&i| caps.get(i).is_some())
            .unwrap_or(2);
        let part = |i: usize| caps.get(i).map(|m| m.as_str()).unwrap_or("");
        out.push(Segment::Raw {
            open: part(group),
            body: part(group + 1),
            close: part(group + 2),
        });
    }
    if last < html.len() {
        out.push(Segment::Markup(&html[last..]));
    }
    out
}

struct Attribute<'a> {
    name: String,
    value: Option<&'a str>,
}

fn parse_attributes(tag: &str) -> Vec<Attribute<'_>> {
    // Skip "<name"
    let start = tag
        .char_indices()
        .skip(1)
        .find(|(_, c)| c.is_whitespace() || *c == '>' || *c == '/')
        .map(|(i, _)| i)
        .unwrap_or(tag.len());
    let end = tag.rfind('>').unwrap_or(tag.len()).max(start);
    ATTRIBUTE
        .captures_iter(&tag[start..end])
        .filter_map(|caps| {
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps
                .get(2)
                .or_else(|| caps.get(3))
                .or_else(|| caps.get(4))
                .map(|m| m.as_str());
            Some(Attribute { name, value })
        })
        .collect()
}

fn attribute<'a>(attrs: &[Attribute<'a>], name: &str) -> Option<&'a str> {
    attrs.iter().find(|a| a.name == name).and_then(|a| a.value)
}

fn is_javascript(type_attr: Option<&str>) -> bool {
    match type_attr.map(|t| t.trim().to_ascii_lowercase()) {
        None => true,
        Some(t) => t.is_empty() || t == "text/javascript" || t == "application/javascript",
    }
}

/// References that are not files relative to the document.
fn is_external_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.is_empty()
        || lower.starts_with('/')
        || lower.starts_with('#')
        || lower.contains("{{")
        || lower.contains("[[")
        || ["http:", "https:", "data:", "mailto:", "javascript:", "about:"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
}

fn strip_query(href: &str) -> &str {
    href.split(['?', '#']).next().unwrap_or(href)
}

/// Rewrite `url` (relative to `from_dir`) so it resolves from `out_dir`.
fn relocate_url(url: &str, from_dir: &Path, out_dir: &Path) -> String {
    if is_external_url(url) {
        return url.to_string();
    }
    let path_part = strip_query(url);
    let suffix = &url[path_part.len()..];
    let target = normalize(&from_dir.join(path_part));
    format!("{}{}", to_url(&relative_path(out_dir, &target)), suffix)
}

fn rewrite_document_urls(text: &str, from_dir: &Path, out_dir: &Path) -> String {
    if normalize(from_dir) == normalize(out_dir) {
        return text.to_string();
    }
    let rewrite_tags = |markup: &str| {
        URL_ATTRIBUTE
            .replace_all(markup, |caps: &Captures| {
                let value = caps
                    .get(2)
                    .or_else(|| caps.get(3))
                    .or_else(|| caps.get(4))
                    .map(|m| m.as_str())
                    .unwrap_or("");
                format!("{}\"{}\"", &caps[1], relocate_url(value, from_dir, out_dir))
            })
            .into_owned()
    };

    let mut out = String::with_capacity(text.len());
    for segment in segments(text) {
        match segment {
            Segment::Markup(markup) => out.push_str(&rewrite_tags(markup)),
            Segment::Comment(comment) => out.push_str(comment),
            Segment::Raw { open, body, close } => {
                out.push_str(&rewrite_tags(open));
                if open[1..].to_ascii_lowercase().starts_with("style") {
                    out.push_str(&rewrite_css_urls(body, from_dir, out_dir));
                } else {
                    out.push_str(body);
                }
                out.push_str(close);
            }
        }
    }
    out
}

fn rewrite_css_urls(css: &str, from_dir: &Path, out_dir: &Path) -> String {
    if normalize(from_dir) == normalize(out_dir) {
        return css.to_string();
    }
    CSS_URL
        .replace_all(css, |caps: &Captures| {
            let value = caps
                .get(1)
                .or_else(|| caps.get(2))
                .or_else(|| caps.get(3))
                .map(|m| m.as_str())
                .unwrap_or("");
            format!("url(\"{}\")", relocate_url(value, from_dir, out_dir))
        })
        .into_owned()
}

fn check_csp(html: &str, document: &Path) -> Result<(), FlattenError> {
    for segment in segments(html) {
        let markup = match segment {
            Segment::Markup(markup) => markup,
            Segment::Comment(_) => continue,
            Segment::Raw { open, .. } => open,
        };
        for caps in ANY_TAG.captures_iter(markup) {
            let tag_name = caps[1].to_ascii_lowercase();
            for attr in parse_attributes(&caps[0]) {
                if EVENT_HANDLERS.binary_search(&attr.name.as_str()).is_ok() {
                    return Err(FlattenError::CspViolation {
                        document: document.to_path_buf(),
                        construct: format!("inline event handler '{}' on <{tag_name}>", attr.name),
                    });
                }
                let javascript_url = attr
                    .value
                    .is_some_and(|v| v.trim().to_ascii_lowercase().starts_with("javascript:"));
                if javascript_url {
                    return Err(FlattenError::CspViolation {
                        document: document.to_path_buf(),
                        construct: format!("javascript: URL in '{}' on <{tag_name}>", attr.name),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Remove comments and insignificant whitespace outside raw-text elements.
pub fn strip(html: &str) -> String {
    // Dropping a comment joins the markup on either side of it.
    let mut pieces: Vec<(bool, String)> = Vec::new();
    for segment in segments(html) {
        match segment {
            Segment::Comment(_) => {}
            Segment::Markup(markup) => match pieces.last_mut() {
                Some((false, text)) => text.push_str(markup),
                _ => pieces.push((false, markup.to_string())),
            },
            Segment::Raw { open, body, close } => {
                pieces.push((true, format!("{open}{body}{close}")));
            }
        }
    }

    let last = pieces.len().saturating_sub(1);
    let mut out = String::with_capacity(html.len());
    for (i, (raw, text)) in pieces.iter().enumerate() {
        if *raw {
            out.push_str(text);
            continue;
        }
        let markup = BETWEEN_TAGS.replace_all(text, "><");
        let collapsed = WHITESPACE_RUN.replace_all(&markup, " ");
        let mut markup: &str = &collapsed;
        // Raw elements are tags too: whitespace between them and markup tags goes.
        if i > 0 && markup.trim_start().starts_with('<') {
            markup = markup.trim_start();
        }
        if i < last && markup.trim_end().ends_with('>') {
            markup = markup.trim_end();
        }
        out.push_str(markup);
    }
    out.trim().to_string()
}

/// Lexically normalize `.` and `..` components without touching the filesystem.
pub(crate) fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Path from directory `from` to `to`, both normalized.
pub(crate) fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from = normalize(from);
    let to = normalize(to);
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for component in &to[common..] {
        rel.push(component.as_os_str());
    }
    rel
}

fn to_url(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
