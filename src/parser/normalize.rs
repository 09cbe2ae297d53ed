//! Body normalization for comparing live objects with their source scripts

use std::sync::LazyLock;

use regex::Regex;

use super::tokenizer::strip_comments;
use crate::model::{ObjectType, Script};

static VIEW_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)CREATE\s+OR\s+REPLACE\s+(?:SECURE\s+)?(?:RECURSIVE\s+)?VIEW\s+[\w.${}"]+(?:\s*\([^)]+\))?(?:\s+COMMENT\s*=\s*'[^']*')?\s+AS\s+(?P<body>.+)$"#,
    )
    .unwrap()
});

static FUNCTION_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)CREATE\s+OR\s+REPLACE\s+(?:SECURE\s+)?FUNCTION\s+[\w.${}"]+.*?\bAS\s+(?:'|\$\$)\s*(?P<body>.+)(?:'|\$\$)\s*;?\s*$"#,
    )
    .unwrap()
});

static PROCEDURE_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)CREATE\s+OR\s+REPLACE\s+(?:SECURE\s+)?PROCEDURE\s+[\w.${}"]+.*?\bAS\s+(?:'|\$\$)\s*(?P<body>.+)(?:'|\$\$)\s*;?\s*$"#,
    )
    .unwrap()
});

static FILE_FORMAT_BODY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?is)CREATE\s+OR\s+REPLACE\s+FILE\s+FORMAT\s+[\w.${}"]+(?P<body>.*)$"#).unwrap()
});

fn body_pattern(object_type: ObjectType) -> Option<&'static Regex> {
    match object_type {
        ObjectType::Views => Some(&*VIEW_BODY_RE),
        ObjectType::Functions => Some(&*FUNCTION_BODY_RE),
        ObjectType::Procedures => Some(&*PROCEDURE_BODY_RE),
        ObjectType::FileFormats => Some(&*FILE_FORMAT_BODY_RE),
        _ => None,
    }
}

/// Extract the comparable body of `content` for the given object type.
///
/// Comments are dropped, doubled quotes collapsed, whitespace runs
/// reduced to a single space and a trailing `;` removed. Content that does
/// not match the type's `CREATE` shape is compared whole.
pub fn normalize_body(object_type: ObjectType, content: &str) -> String {
    let text = strip_comments(content).replace("''", "'");
    let body = body_pattern(object_type)
        .and_then(|re| re.captures(&text))
        .and_then(|caps| caps.name("body"))
        .map(|m| m.as_str())
        .unwrap_or(text.as_str());

    let collapsed = body.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .strip_suffix(';')
        .map(|s| s.trim_end().to_string())
        .unwrap_or(collapsed)
}

/// Body of a view (its query) or routine (text between the delimiters),
/// comments removed and without the trailing `;`.
pub(crate) fn definition_body(object_type: ObjectType, content: &str) -> Option<String> {
    let text = strip_comments(content).replace("''", "'");
    let caps = body_pattern(object_type)?.captures(&text)?;
    let body = caps.name("body")?.as_str().trim();
    Some(body.strip_suffix(';').unwrap_or(body).trim_end().to_string())
}

pub fn normalize_for_comparison(script: &Script) -> String {
    normalize_body(script.object_type(), script.content())
}

/// Whether two scripts define the same object body
pub fn scripts_equivalent(a: &Script, b: &Script) -> bool {
    normalize_for_comparison(a) == normalize_for_comparison(b)
}
