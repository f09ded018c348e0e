//! Per-locale entry pages (`i18n-index` task).

use super::{BuildContext, StageError, settle, write_output};
use crate::graph::TaskOutput;
use crate::messages::substitute_placeholders;
use crate::select::{SelectOptions, select};
use glob::Pattern;
use rayon::prelude::*;
use regex::Regex;
use std::path::PathBuf;
use std::sync::LazyLock;

const STAGE: &str = "i18n-index";

static HTML_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)<html\b([^>]*)>").expect("html tag regex"));
static LANG_ATTRIBUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\slang\s*=\s*(?:"[^"]*"|'[^']*'|[^\s>]+)"#).expect("lang regex")
});

pub fn output_path(ctx: &BuildContext, locale: &str) -> PathBuf {
    ctx.dist_dir().join(format!("index_{locale}.html"))
}

/// Set (or replace) the `lang` attribute of the document's `<html>` element.
pub fn set_lang(html: &str, locale: &str) -> String {
    let Some(caps) = HTML_TAG.captures(html) else {
        return html.to_string();
    };
    let (Some(whole), Some(attrs)) = (caps.get(0), caps.get(1)) else {
        return html.to_string();
    };
    let lang = format!(" lang=\"{locale}\"");
    let attrs = if LANG_ATTRIBUTE.is_match(attrs.as_str()) {
        LANG_ATTRIBUTE.replace(attrs.as_str(), lang.as_str()).into_owned()
    } else {
        format!("{lang}{}", attrs.as_str())
    };
    format!(
        "{}<html{attrs}>{}",
        &html[..whole.start()],
        &html[whole.end()..]
    )
}

/// Render the index template once per configured locale.
pub fn run(ctx: &BuildContext) -> Result<TaskOutput, StageError> {
    let pattern = [Pattern::escape(&ctx.config.locales.index_template)];
    let Some(record) = select(&ctx.root, &pattern, &SelectOptions::reading())?.pop() else {
        return Err(StageError::SourceNotFound {
            stage: STAGE,
            path: ctx.root.join(&ctx.config.locales.index_template),
        });
    };
    let template = record.text();
    let relative = ctx.relative(&record.source);

    let results: Vec<Result<PathBuf, StageError>> = ctx
        .config
        .locales
        .locales
        .par_iter()
        .map(|locale| {
            let dict = ctx.dictionary(STAGE, locale)?;
            let html = substitute_placeholders(&template, &relative, &dict)?;
            let out = output_path(ctx, locale);
            write_output(&out, set_lang(&html, locale))?;
            tracing::debug!(locale = %locale, "wrote locale index");
            Ok(out)
        })
        .collect();
    Ok(TaskOutput::from_paths(settle(results)?))
}
