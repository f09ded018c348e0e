//! Translated message tables and substitution into documents.
//!
//! Messages live under `<messages_dir>/<locale>/` in the Chrome i18n format:
//!
//! ```text
//! _messages/fr/messages.json                  global table
//! _messages/fr/scenes/airport/airport-scene.html.json   table for one document
//! ```
//!
//! Lookups for a document check its own table first and fall back to the
//! global one.
//!
//! Messages are plain text. Both substitution forms insert them HTML-escaped.

use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;
use walkdir::WalkDir;

pub const GLOBAL_TABLE: &str = "messages.json";

#[derive(Error, Debug)]
pub enum MessageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid message table {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no messages for locale '{locale}' (expected {})", .path.display())]
    LocaleNotFound { locale: String, path: PathBuf },
    #[error("missing translation for '{key}' in {path} (locale {locale})")]
    MissingTranslation {
        path: String,
        key: String,
        locale: String,
    },
}

static MESSAGE_ELEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)<i18n-msg\b[^>]*?\bmsgid\s*=\s*(?:"([^"]*)"|'([^']*)')[^>]*>.*?</i18n-msg\s*>"#)
        .expect("i18n-msg regex")
});
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.]*)\s*\}\}").expect("placeholder regex")
});

#[derive(Debug, Deserialize)]
struct MessageEntry {
    message: String,
}

type Table = HashMap<String, String>;

/// All message tables for one locale.
#[derive(Debug, Clone, Default)]
pub struct MessageDictionary {
    locale: String,
    global: Table,
    /// Keyed by document path relative to the project root, `/`-separated.
    documents: BTreeMap<String, Table>,
}

impl MessageDictionary {
    pub fn load(messages_dir: &Path, locale: &str) -> Result<Self, MessageError> {
        let dir = messages_dir.join(locale);
        if !dir.is_dir() {
            return Err(MessageError::LocaleNotFound {
                locale: locale.to_string(),
                path: dir,
            });
        }

        let mut dict = MessageDictionary {
            locale: locale.to_string(),
            ..Default::default()
        };
        for entry in WalkDir::new(&dir).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            let path = entry.path();
            if !entry.file_type().is_file()
                || path.extension().and_then(|e| e.to_str()) != Some("json")
            {
                continue;
            }
            let table = read_table(path)?;
            let relative = path.strip_prefix(&dir).unwrap_or(path);
            if relative == Path::new(GLOBAL_TABLE) {
                dict.global = table;
            } else {
                let key = to_key(&relative.with_extension(""));
                dict.documents.insert(key, table);
            }
        }

        tracing::debug!(
            locale,
            global = dict.global.len(),
            documents = dict.documents.len(),
            "loaded messages"
        );
        Ok(dict)
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn lookup(&self, path: &str, key: &str) -> Option<&str> {
        self.documents
            .get(path)
            .and_then(|t| t.get(key))
            .or_else(|| self.global.get(key))
            .map(String::as_str)
    }

    fn require(&self, path: &str, key: &str) -> Result<&str, MessageError> {
        self.lookup(path, key)
            .ok_or_else(|| MessageError::MissingTranslation {
                path: path.to_string(),
                key: key.to_string(),
                locale: self.locale.clone(),
            })
    }
}

fn read_table(path: &Path) -> Result<Table, MessageError> {
    let text = fs::read_to_string(path)?;
    let entries: HashMap<String, MessageEntry> =
        serde_json::from_str(&text).map_err(|source| MessageError::Json {
            path: path.to_path_buf(),
            source,
        })?;
    Ok(entries.into_iter().map(|(k, v)| (k, v.message)).collect())
}

fn to_key(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// Replace every `<i18n-msg msgid="key">…</i18n-msg>` element with its
/// HTML-escaped translation.
pub fn replace_messages(
    document: &str,
    relative_path: &str,
    dict: &MessageDictionary,
) -> Result<String, MessageError> {
    replace_all(&MESSAGE_ELEMENT, document, |caps| {
        let key = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");
        dict.require(relative_path, key).map(escape_html)
    })
}

/// Replace every `{{key}}` placeholder in `template` with its HTML-escaped
/// translation.
pub fn substitute_placeholders(
    template: &str,
    path: &str,
    dict: &MessageDictionary,
) -> Result<String, MessageError> {
    replace_all(&PLACEHOLDER, template, |caps| {
        dict.require(path, &caps[1]).map(escape_html)
    })
}

/// Fallible counterpart of `Regex::replace_all`.
fn replace_all<F>(re: &Regex, text: &str, mut replacement: F) -> Result<String, MessageError>
where
    F: FnMut(&Captures) -> Result<String, MessageError>,
{
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in re.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        out.push_str(&text[last..whole.start()]);
        out.push_str(&replacement(&caps)?);
        last = whole.end();
    }
    out.push_str(&text[last..]);
    Ok(out)
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::write_file;
    use tempfile::TempDir;

    fn messages_fixture() -> TempDir {
        let tmp = TempDir::new().unwrap();
        write_file(
            tmp.path(),
            "_messages/fr/messages.json",
            r#"{
                "greeting": {"message": "Bonjour", "description": "Index greeting"},
                "title": {"message": "Village du Père Noël"},
                "app.name": {"message": "Suivez & jouez"}
            }"#,
        );
        write_file(
            tmp.path(),
            "_messages/fr/scenes/airport/airport-scene.html.json",
            r#"{"title": {"message": "Aéroport <ouvert>"}}"#,
        );
        tmp
    }

    fn fr(tmp: &TempDir) -> MessageDictionary {
        MessageDictionary::load(&tmp.path().join("_messages"), "fr").unwrap()
    }

    #[test]
    fn document_table_shadows_global() {
        let tmp = messages_fixture();
        let dict = fr(&tmp);
        assert_eq!(dict.locale(), "fr");
        assert_eq!(
            dict.lookup("scenes/airport/airport-scene.html", "title"),
            Some("Aéroport <ouvert>")
        );
        assert_eq!(dict.lookup("index.html", "title"), Some("Village du Père Noël"));
        assert_eq!(
            dict.lookup("scenes/airport/airport-scene.html", "greeting"),
            Some("Bonjour")
        );
        assert_eq!(dict.lookup("index.html", "nope"), None);
    }

    #[test]
    fn missing_locale_directory() {
        let tmp = messages_fixture();
        let err = MessageDictionary::load(&tmp.path().join("_messages"), "de").unwrap_err();
        assert!(matches!(err, MessageError::LocaleNotFound { ref locale, .. } if locale == "de"));
    }

    #[test]
    fn malformed_table_names_file() {
        let tmp = messages_fixture();
        write_file(tmp.path(), "_messages/fr/broken.json", "{ not json");
        let err = MessageDictionary::load(&tmp.path().join("_messages"), "fr").unwrap_err();
        match err {
            MessageError::Json { path, .. } => assert!(path.ends_with("broken.json")),
            other => panic!("expected Json error, got {other:?}"),
        }
    }

    #[test]
    fn placeholders_are_substituted() {
        let tmp = messages_fixture();
        let out = substitute_placeholders(
            "<h1>{{greeting}}</h1><p>{{ app.name }}</p>",
            "index.html",
            &fr(&tmp),
        )
        .unwrap();
        assert_eq!(out, "<h1>Bonjour</h1><p>Suivez &amp; jouez</p>");
    }

    #[test]
    fn missing_placeholder_key_fails() {
        let tmp = messages_fixture();
        let err = substitute_placeholders("{{farewell}}", "index.html", &fr(&tmp)).unwrap_err();
        match err {
            MessageError::MissingTranslation { path, key, locale } => {
                assert_eq!((path.as_str(), key.as_str(), locale.as_str()), ("index.html", "farewell", "fr"));
            }
            other => panic!("expected MissingTranslation, got {other:?}"),
        }
    }

    #[test]
    fn polymer_bindings_are_not_placeholders() {
        let tmp = messages_fixture();
        let text = "<p>{{ 1 + 2 }}</p><p>{{-x}}</p>";
        assert_eq!(substitute_placeholders(text, "index.html", &fr(&tmp)).unwrap(), text);
    }

    #[test]
    fn message_elements_are_replaced_and_escaped() {
        let tmp = messages_fixture();
        let doc = r#"<h2><i18n-msg msgid="title">Airport</i18n-msg></h2><i18n-msg msgid='greeting'></i18n-msg>"#;
        let out = replace_messages(doc, "scenes/airport/airport-scene.html", &fr(&tmp)).unwrap();
        assert_eq!(out, "<h2>Aéroport &lt;ouvert&gt;</h2>Bonjour");
    }

    #[test]
    fn missing_message_element_key_fails() {
        let tmp = messages_fixture();
        let doc = r#"<i18n-msg msgid="missing">x</i18n-msg>"#;
        assert!(matches!(
            replace_messages(doc, "a.html", &fr(&tmp)),
            Err(MessageError::MissingTranslation { .. })
        ));
    }
}
