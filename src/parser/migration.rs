//! Versioned migration file parsing
//!
//! A migration file is a sequence of units, each opened by a header line:
//!
//! ```text
//! ---version: 1, author: jane
//! ALTER TABLE ORDERS ADD COLUMN NOTE VARCHAR;
//! ---rollback: ALTER TABLE ORDERS DROP COLUMN NOTE;
//! ---verify: SELECT NOTE FROM ORDERS LIMIT 1;
//! ```
//!
//! The optional `---rollback:` and `---verify:` directives are the last
//! non-blank lines of their unit and stay part of its content.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::SchemaSyncError;
use crate::model::MigrationUnit;

/// Lines opening a unit; other `---` lines are plain comments
static HEADER_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*---\s*version\s*:\s*\d").unwrap());

static HEADER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*---\s*version\s*:\s*(\d+)\s*(?:,\s*author\s*:\s*(\w+)\s*)?$").unwrap()
});

static ROLLBACK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*---\s*rollback\s*:(.*)$").unwrap());

static VERIFY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*---\s*verify\s*:(.*)$").unwrap());

/// A header line with its byte range in the source text
struct Header {
    line: usize,
    start: usize,
    version: u64,
    author: Option<String>,
}

/// Split migration file content into its versioned units.
pub fn split_migration_units(content: &str) -> Result<Vec<MigrationUnit>, SchemaSyncError> {
    let mut headers: Vec<Header> = Vec::new();
    let mut seen_versions = BTreeSet::new();
    let mut pos = 0;

    for (index, raw_line) in content.split_inclusive('\n').enumerate() {
        let line_number = index + 1;
        let line = raw_line.trim_end_matches(['\n', '\r']);

        if HEADER_START_RE.is_match(line) {
            let caps = HEADER_RE
                .captures(line)
                .ok_or_else(|| SchemaSyncError::InvalidMigration {
                    line: line_number,
                    message: format!("malformed version header '{}'", line.trim()),
                })?;
            let version = caps[1]
                .parse::<u64>()
                .map_err(|e| SchemaSyncError::InvalidMigration {
                    line: line_number,
                    message: format!("invalid version number '{}': {}", &caps[1], e),
                })?;
            if !seen_versions.insert(version) {
                return Err(SchemaSyncError::DuplicateMigrationVersion {
                    line: line_number,
                    version,
                });
            }
            headers.push(Header {
                line: line_number,
                start: pos,
                version,
                author: caps.get(2).map(|m| m.as_str().to_string()),
            });
        } else if headers.is_empty() {
            let trimmed = line.trim();
            if !trimmed.is_empty() && !trimmed.starts_with("--") {
                return Err(SchemaSyncError::InvalidMigration {
                    line: line_number,
                    message: "content found before the first version header".to_string(),
                });
            }
        }

        pos += raw_line.len();
    }

    let mut units = Vec::with_capacity(headers.len());
    for (i, header) in headers.iter().enumerate() {
        let end = headers.get(i + 1).map_or(content.len(), |next| next.start);
        let body = content[header.start..end].trim();
        let (rollback, verify) = trailing_directives(body);
        tracing::trace!(version = header.version, line = header.line, "parsed migration unit");
        units.push(MigrationUnit {
            version: header.version,
            author: header.author.clone(),
            content: body.to_string(),
            rollback,
            verify,
        });
    }

    Ok(units)
}

/// `(rollback, verify)` from the last non-blank lines of a unit
fn trailing_directives(unit: &str) -> (Option<String>, Option<String>) {
    let mut rollback = None;
    let mut verify = None;
    let mut seen_rollback = false;
    let mut seen_verify = false;

    // Skip the header itself so a one-line unit has no directives
    for line in unit.lines().collect::<Vec<_>>().into_iter().skip(1).rev().filter(|l| !l.trim().is_empty()).take(2) {
        if !seen_verify && !seen_rollback {
            if let Some(caps) = VERIFY_RE.captures(line) {
                verify = directive_value(&caps[1]);
                seen_verify = true;
                continue;
            }
        }
        if !seen_rollback {
            if let Some(caps) = ROLLBACK_RE.captures(line) {
                rollback = directive_value(&caps[1]);
                seen_rollback = true;
                continue;
            }
        }
        break;
    }

    (rollback, verify)
}

fn directive_value(raw: &str) -> Option<String> {
    let value = raw.trim();
    (!value.is_empty()).then(|| value.to_string())
}
