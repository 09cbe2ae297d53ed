//! Splitting a schema DDL dump into per-object scripts

use std::sync::LazyLock;

use regex::Regex;

use super::tokenizer::{scan_step, strip_comments, ScanState};
use crate::model::{ObjectType, Script};

/// `CREATE OR REPLACE [modifier] <type> <name>`
static CREATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+OR\s+REPLACE\s+(?:(?:TRANSIENT|HYBRID|SECURE|TEMPORARY)\s+)?(FILE\s+FORMAT|DYNAMIC\s+TABLE|\w+)\s+([^\s(]+)"#,
    )
    .unwrap()
});

/// Split `ddl` on statement terminators that sit outside quotes, comments
/// and `$$` bodies.
///
/// Returned statements are trimmed and keep their terminating `;`.
pub fn split_statements(ddl: &str) -> Vec<String> {
    let bytes = ddl.as_bytes();
    let mut statements = Vec::new();
    let mut state = ScanState::Normal;
    let mut in_dollar_body = false;
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        if in_dollar_body {
            if b == b'$' && next == Some(b'$') {
                in_dollar_body = false;
                i += 2;
            } else {
                i += 1;
            }
            continue;
        }
        if state == ScanState::Normal {
            match (b, next) {
                (b'$', Some(b'$')) => {
                    in_dollar_body = true;
                    i += 2;
                    continue;
                }
                (b';', _) => {
                    push_statement(&mut statements, &ddl[start..=i]);
                    start = i + 1;
                    i += 1;
                    continue;
                }
                _ => {}
            }
        }
        let (next_state, width) = scan_step(state, b, next);
        state = next_state;
        i += width;
    }

    if start < ddl.len() {
        push_statement(&mut statements, &ddl[start..]);
    }
    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() && trimmed != ";" {
        statements.push(trimmed.to_string());
    }
}

/// Object type, name and `;`-terminated text of one `CREATE OR REPLACE`
/// statement. Statements for object kinds without a script directory
/// (schemas, grants, ...) yield `None`.
pub fn classify_statement(statement: &str) -> Option<(ObjectType, String, String)> {
    let clean = strip_comments(statement);
    let Some(caps) = CREATE_RE.captures(&clean) else {
        tracing::debug!(statement = %first_line(statement), "skipping non-CREATE statement");
        return None;
    };
    let Some(object_type) = ObjectType::from_singular(&caps[1]) else {
        tracing::debug!(kind = &caps[1], "skipping unsupported object kind");
        return None;
    };
    let object_name = object_name_of(&caps[2]);
    let statement = statement.trim();
    let content = if statement.ends_with(';') {
        statement.to_string()
    } else {
        format!("{};", statement)
    };
    Some((object_type, object_name, content))
}

/// Turn a schema DDL dump into scripts owned by `database.schema`.
///
/// State objects keep their statement as content; migration objects become a
/// version-0 migration.
pub fn split_batch_ddl(ddl: &str, database: &str, schema: &str) -> Vec<Script> {
    split_statements(ddl)
        .iter()
        .filter_map(|statement| classify_statement(statement))
        .map(|(object_type, object_name, content)| {
            if object_type.is_migration() {
                Script::initial_migration(database, schema, object_type, &object_name, &content)
            } else {
                Script::state(database, schema, object_type, &object_name, &content)
            }
        })
        .collect()
}

/// Last dotted segment of a possibly qualified, possibly quoted name
fn object_name_of(qualified: &str) -> String {
    qualified
        .rsplit('.')
        .next()
        .unwrap_or(qualified)
        .trim_matches('"')
        .to_string()
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or_default()
}
