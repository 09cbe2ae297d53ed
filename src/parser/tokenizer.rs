//! Comment/literal stripping and qualified-name scanning
//!
//! Everything here works on raw script text without a SQL grammar. Each pass
//! is a single forward scan, and later passes only ever see text that the
//! earlier ones already cleaned, so a `--` inside a string never starts a
//! comment and a name inside a comment never becomes a dependency.

use std::collections::BTreeSet;
use std::fmt;

use crate::util::{ends_with_ci, find_ci_from};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum ScanState {
    Normal,
    LineComment,
    BlockComment,
    SingleQuote,
    DoubleQuote,
}

/// Scanner state after the byte `b` (followed by `next`), and the number of
/// bytes consumed.
pub(super) fn scan_step(state: ScanState, b: u8, next: Option<u8>) -> (ScanState, usize) {
    match state {
        ScanState::Normal => match (b, next) {
            (b'-', Some(b'-')) | (b'/', Some(b'/')) => (ScanState::LineComment, 2),
            (b'/', Some(b'*')) => (ScanState::BlockComment, 2),
            (b'\'', _) => (ScanState::SingleQuote, 1),
            (b'"', _) => (ScanState::DoubleQuote, 1),
            _ => (ScanState::Normal, 1),
        },
        ScanState::LineComment if b == b'\n' => (ScanState::Normal, 1),
        ScanState::BlockComment if b == b'*' && next == Some(b'/') => (ScanState::Normal, 2),
        ScanState::SingleQuote => match b {
            b'\\' => (ScanState::SingleQuote, 2),
            b'\'' => (ScanState::Normal, 1),
            _ => (ScanState::SingleQuote, 1),
        },
        ScanState::DoubleQuote if b == b'"' => (ScanState::Normal, 1),
        _ => (state, 1),
    }
}

/// Remove `--`, `//` and `/* */` comments, leaving quoted text untouched.
///
/// The newline that ends a line comment is kept so line structure survives.
/// An unterminated block comment swallows the rest of the text.
pub fn strip_comments(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut state = ScanState::Normal;
    let mut kept_from = 0;
    let mut i = 0;

    while i < bytes.len() {
        let (next_state, width) = scan_step(state, bytes[i], bytes.get(i + 1).copied());
        match (state, next_state) {
            (ScanState::Normal, ScanState::LineComment | ScanState::BlockComment) => {
                out.push_str(&sql[kept_from..i]);
            }
            (ScanState::LineComment, ScanState::Normal) => kept_from = i,
            (ScanState::BlockComment, ScanState::Normal) => kept_from = i + width,
            _ => {}
        }
        state = next_state;
        i += width;
    }

    if !matches!(state, ScanState::LineComment | ScanState::BlockComment) {
        out.push_str(&sql[kept_from.min(sql.len())..]);
    }
    out
}

/// Replace every single-quoted literal with `''`.
///
/// A literal that directly follows the `AS` keyword holds an executable body
/// (`CREATE FUNCTION ... AS '...'`) and is copied unchanged. Double-quoted
/// identifiers are skipped over. An unterminated literal is left as-is.
pub fn strip_string_literals(sql: &str) -> String {
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len());
    let mut kept_from = 0;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'"' => {
                i = match sql[i + 1..].find('"') {
                    Some(offset) => i + offset + 2,
                    None => bytes.len(),
                };
            }
            b'\'' => {
                let Some(end) = literal_end(bytes, i) else {
                    break;
                };
                if !follows_as_keyword(&sql[..i]) {
                    out.push_str(&sql[kept_from..i]);
                    out.push_str("''");
                    kept_from = end;
                }
                i = end;
            }
            _ => i += 1,
        }
    }

    out.push_str(&sql[kept_from..]);
    out
}

/// Byte offset just past the quote closing the literal opened at `start`
fn literal_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut j = start + 1;
    while j < bytes.len() {
        match bytes[j] {
            b'\\' => j += 2,
            b'\'' if bytes.get(j + 1) == Some(&b'\'') => j += 2,
            b'\'' => return Some(j + 1),
            _ => j += 1,
        }
    }
    None
}

/// True when `prefix` ends in whitespace + `AS` + whitespace
fn follows_as_keyword(prefix: &str) -> bool {
    let trimmed = prefix.trim_end_matches(|c: char| c.is_ascii_whitespace());
    if trimmed.len() == prefix.len() || !ends_with_ci(trimmed, "as") {
        return false;
    }
    let before = &trimmed.as_bytes()[..trimmed.len() - 2];
    before.last().is_some_and(|b| b.is_ascii_whitespace())
}

/// Characters that may precede a name (or its qualifier chain)
fn is_start_boundary(b: u8) -> bool {
    matches!(
        b,
        b'=' | b'(' | b')' | b'[' | b']' | b',' | b'.' | b'"' | b'\''
    ) || b.is_ascii_whitespace()
}

/// Characters that may follow a name
fn is_end_boundary(b: u8) -> bool {
    b == b';' || is_start_boundary(b)
}

fn is_segment_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$' | b'{' | b'}')
}

/// A possibly partially qualified reference found in script text.
/// All parts are uppercase with quotes removed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QualifiedName {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub name: String,
}

impl QualifiedName {
    /// Resolve against a default database and schema into `DB.SCHEMA.NAME`
    pub fn resolve(&self, database: &str, schema: &str) -> String {
        format!(
            "{}.{}.{}",
            self.database.as_deref().unwrap_or(database),
            self.schema.as_deref().unwrap_or(schema),
            self.name
        )
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(database) = &self.database {
            write!(f, "{}.", database)?;
        }
        if let Some(schema) = &self.schema {
            write!(f, "{}.", schema)?;
        }
        f.write_str(&self.name)
    }
}

/// Comments and literals removed; the text every name scan runs on
pub fn clean_sql(sql: &str) -> String {
    strip_string_literals(&strip_comments(sql))
}

/// Every distinct qualified reference to `name` in `sql`, in textual order.
pub fn qualified_occurrences(name: &str, sql: &str) -> Vec<QualifiedName> {
    occurrences_in_clean(name, &clean_sql(sql))
}

/// Like [`qualified_occurrences`] for text already passed through [`clean_sql`]
pub fn occurrences_in_clean(name: &str, clean: &str) -> Vec<QualifiedName> {
    let mut found: Vec<QualifiedName> = Vec::new();
    for occurrence in scan_occurrences(name, clean) {
        if !found.contains(&occurrence) {
            found.push(occurrence);
        }
    }
    found
}

/// Qualified references to `name` in `sql` rendered as `SEG.SEG.NAME`.
pub fn find_qualified_occurrences(name: &str, sql: &str) -> BTreeSet<String> {
    let clean = clean_sql(sql);
    scan_occurrences(name, &clean)
        .map(|occurrence| occurrence.to_string())
        .collect()
}

/// The first qualified reference to `name` in `sql`
pub fn first_qualified_occurrence(name: &str, sql: &str) -> Option<QualifiedName> {
    let clean = clean_sql(sql);
    let first = scan_occurrences(name, &clean).next();
    first
}

fn scan_occurrences<'a>(name: &'a str, text: &'a str) -> impl Iterator<Item = QualifiedName> + 'a {
    let bytes = text.as_bytes();
    let mut from = 0;
    std::iter::from_fn(move || {
        while let Some(pos) = find_ci_from(text, name, from) {
            from = pos + 1;
            let mut start = pos;
            let mut end = pos + name.len();
            if start > 0 && bytes[start - 1] == b'"' {
                start -= 1;
            }
            if end < bytes.len() && bytes[end] == b'"' {
                end += 1;
            }
            if end < bytes.len() && !is_end_boundary(bytes[end]) {
                continue;
            }

            let segments = qualifier_segments(text, start);
            // Longest qualifier chain whose first segment starts on a boundary
            let kept = (0..=segments.len()).rev().find(|&n| {
                // an opening quote consumed above is itself a boundary
                if n == 0 && start < pos {
                    return true;
                }
                let chain_start = if n == 0 { start } else { segments[n - 1].0 };
                chain_start == 0 || is_start_boundary(bytes[chain_start - 1])
            });
            let Some(kept) = kept else {
                continue;
            };

            let mut qualifiers = segments.into_iter().take(kept).map(|(_, s)| s.to_uppercase());
            let schema = qualifiers.next();
            let database = qualifiers.next();
            return Some(QualifiedName {
                database,
                schema,
                name: name.to_uppercase(),
            });
        }
        None
    })
}

/// Up to two dotted qualifier segments immediately before `pos`, nearest
/// first, as `(segment start, unquoted text)`.
fn qualifier_segments(text: &str, mut pos: usize) -> Vec<(usize, String)> {
    let bytes = text.as_bytes();
    let mut segments = Vec::with_capacity(2);
    while segments.len() < 2 && pos > 0 && bytes[pos - 1] == b'.' {
        let seg_end = pos - 1;
        let seg_start = if seg_end > 0 && bytes[seg_end - 1] == b'"' {
            match text[..seg_end - 1].rfind('"') {
                Some(open) if open + 1 < seg_end - 1 => open,
                _ => break,
            }
        } else {
            let mut s = seg_end;
            while s > 0 && is_segment_byte(bytes[s - 1]) {
                s -= 1;
            }
            if s == seg_end {
                break;
            }
            s
        };
        segments.push((seg_start, text[seg_start..seg_end].trim_matches('"').to_string()));
        pos = seg_start;
    }
    segments
}
