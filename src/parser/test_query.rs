//! Assertion query generation for companion test scripts
//!
//! A test file is a `WITH` query whose CTEs mock the tables the subject
//! reads, plus one CTE named `EXPECTED_DATA`. The subject's own query is
//! rewritten to read from the mocks and diffed against the expectation; the
//! generated query returns rows only when the two differ.

use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{visit_relations_mut, Ident, ObjectName, Query, Statement};
use sqlparser::dialect::SnowflakeDialect;
use sqlparser::parser::Parser;

use super::normalize::definition_body;
use crate::error::SchemaSyncError;
use crate::model::{ObjectType, TestScript};

pub const EXPECTED_DATA: &str = "EXPECTED_DATA";
pub const ACTUAL_DATA: &str = "ACTUAL_DATA";

const ASSERTION: &str = "SELECT COUNT(1) AS RESULT, 'rows missing from actual data' AS MESSAGE \
     FROM (SELECT * FROM ACTUAL_DATA EXCEPT SELECT * FROM EXPECTED_DATA) HAVING RESULT > 0 \
     UNION ALL \
     SELECT COUNT(1) AS RESULT, 'rows missing from expected data' AS MESSAGE \
     FROM (SELECT * FROM EXPECTED_DATA EXCEPT SELECT * FROM ACTUAL_DATA) HAVING RESULT > 0";

/// A named CTE taken from a test file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockTable {
    pub name: String,
    pub query: String,
}

fn query_error(test: &TestScript, message: impl Into<String>) -> SchemaSyncError {
    SchemaSyncError::TestQueryError {
        id: test.id(),
        message: message.into(),
    }
}

fn parse_query(test: &TestScript, sql: &str) -> Result<Box<Query>, SchemaSyncError> {
    let mut statements = Parser::parse_sql(&SnowflakeDialect {}, sql)
        .map_err(|e| query_error(test, e.to_string()))?;
    match statements.pop() {
        Some(Statement::Query(query)) if statements.is_empty() => Ok(query),
        _ => Err(query_error(test, "expected a single query")),
    }
}

/// Mock CTEs (in file order) and the `EXPECTED_DATA` query of a test file
pub fn parse_test_ctes(test: &TestScript) -> Result<(Vec<MockTable>, String), SchemaSyncError> {
    let query = parse_query(test, test.content())?;
    let with = query
        .with
        .as_ref()
        .ok_or_else(|| query_error(test, "test script must start with a WITH clause"))?;

    let mut mocks = Vec::new();
    let mut expected = None;
    for cte in &with.cte_tables {
        let name = cte.alias.name.value.to_uppercase();
        let body = cte.query.to_string();
        if name == EXPECTED_DATA {
            expected = Some(body);
        } else {
            mocks.push(MockTable { name, query: body });
        }
    }

    let expected = expected.ok_or_else(|| query_error(test, "missing EXPECTED_DATA CTE"))?;
    Ok((mocks, expected))
}

/// The query whose rows the subject object produces
fn subject_query(test: &TestScript) -> Result<Box<Query>, SchemaSyncError> {
    let subject = test.subject();
    match subject.object_type() {
        ObjectType::Views => {
            let body = definition_body(ObjectType::Views, subject.content())
                .ok_or_else(|| query_error(test, "cannot locate the view query"))?;
            parse_query(test, &body)
        }
        ObjectType::Functions => {
            let body = definition_body(ObjectType::Functions, subject.content())
                .ok_or_else(|| query_error(test, "cannot locate the function body"))?;
            parse_query(test, &format!("SELECT ({}) AS RETURN FROM MOCK_DATA", body))
        }
        other => Err(query_error(
            test,
            format!("tests are not supported for {}", other),
        )),
    }
}

/// Point qualified references whose last part names a mock at the mock CTE
fn replace_mock_references(query: &mut Query, mocks: &[MockTable]) {
    let names: BTreeSet<&str> = mocks.iter().map(|m| m.name.as_str()).collect();
    let _ = visit_relations_mut(query, |relation: &mut ObjectName| {
        let mock = relation
            .0
            .last()
            .map(|ident| ident.value.to_uppercase())
            .filter(|last| relation.0.len() > 1 && names.contains(last.as_str()));
        if let Some(mock) = mock {
            *relation = ObjectName(vec![Ident::new(mock)]);
        }
        ControlFlow::<()>::Continue(())
    });
}

/// Build the self-contained assertion query for `test`.
pub fn generate_test_query(test: &TestScript) -> Result<String, SchemaSyncError> {
    let (mocks, expected) = parse_test_ctes(test)?;
    let mut actual = subject_query(test)?;
    replace_mock_references(&mut actual, &mocks);

    let mut sql = String::from("WITH ");
    for mock in &mocks {
        sql.push_str(&format!("{} AS (\n\t{}\n),\n", mock.name, mock.query));
    }
    sql.push_str(&format!("{} AS (\n\t{}\n),\n", EXPECTED_DATA, expected));
    sql.push_str(&format!("{} AS (\n\t{}\n),\n", ACTUAL_DATA, actual));
    sql.push_str(&format!("ASSERTION AS (\n\t{}\n)\nSELECT * FROM ASSERTION;", ASSERTION));

    tracing::debug!(test = %test, "generated test query");
    Ok(sql)
}
