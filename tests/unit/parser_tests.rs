//! Unit tests for script text handling across parser modules

use pretty_assertions::assert_eq;

use rust_schemasync::model::{ObjectType, TestScript};
use rust_schemasync::parser::{
    generate_test_query, parse_test_ctes, scripts_equivalent, split_batch_ddl, split_migration_units,
};
use rust_schemasync::{ParameterInjector, SchemaSyncError, Script};

const DUMP: &str = "create or replace schema SC;\n\
create or replace view DB.SC.V1 as select * from DB.SC.T1;\n\
create or replace TABLE DB.SC.T1 (ID NUMBER, NOTE VARCHAR DEFAULT ';');\n\
create or replace function DB.SC.F1() returns number language sql as $$ select 1; $$;\n\
create or replace file format DB.SC.CSV_FMT type = csv;\n";

// ============================================================================
// DDL dumps
// ============================================================================

#[test]
fn test_batch_ddl_becomes_scripts() {
    let scripts = split_batch_ddl(DUMP, "db", "sc");
    let summary: Vec<(String, ObjectType)> = scripts.iter().map(|s| (s.id(), s.object_type())).collect();
    assert_eq!(
        summary,
        vec![
            ("DB.SC.V1".to_string(), ObjectType::Views),
            ("DB.SC.T1:0".to_string(), ObjectType::Tables),
            ("DB.SC.F1".to_string(), ObjectType::Functions),
            ("DB.SC.CSV_FMT".to_string(), ObjectType::FileFormats),
        ]
    );
    assert!(scripts[2].content().ends_with("$$ select 1; $$;"));
}

#[test]
fn test_batch_table_is_initial_migration() {
    let scripts = split_batch_ddl(DUMP, "DB", "SC");
    let table = &scripts[1];
    let info = table.migration_info().unwrap();
    assert_eq!(info.version, 0);
    assert_eq!(info.rollback.as_deref(), Some("DROP TABLE IF EXISTS DB.SC.T1;"));
    assert_eq!(info.verify.as_deref(), Some("SHOW TABLES LIKE 'DB.SC.T1';"));

    // the generated file parses back into the same single unit
    let units = split_migration_units(table.content()).unwrap();
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].rollback, info.rollback);
}

// ============================================================================
// Migration files
// ============================================================================

#[test]
fn test_migration_file_with_leading_comment() {
    let content = "-- orders table\n\
                   ---version: 0, author: jane\n\
                   CREATE TABLE DB.SC.ORDERS (ID INT);\n\
                   ---rollback: DROP TABLE DB.SC.ORDERS;\n\
                   \n\
                   ---version: 1\n\
                   ALTER TABLE DB.SC.ORDERS ADD COLUMN NOTE VARCHAR;\n\
                   ---verify: SELECT NOTE FROM DB.SC.ORDERS LIMIT 1;\n";
    let units = split_migration_units(content).unwrap();
    assert_eq!(units.len(), 2);
    assert_eq!(units[0].author.as_deref(), Some("jane"));
    assert_eq!(units[0].rollback.as_deref(), Some("DROP TABLE DB.SC.ORDERS;"));
    assert_eq!(units[0].verify, None);
    assert_eq!(units[1].author, None);
    assert_eq!(units[1].rollback, None);
    assert_eq!(units[1].verify.as_deref(), Some("SELECT NOTE FROM DB.SC.ORDERS LIMIT 1;"));
}

#[test]
fn test_migration_file_errors() {
    let err = split_migration_units("CREATE TABLE T (ID INT);\n---version: 0\n").unwrap_err();
    assert!(matches!(err, SchemaSyncError::InvalidMigration { line: 1, .. }));

    let err = split_migration_units("---version: 0\nSELECT 1;\n---version: 0\nSELECT 2;\n").unwrap_err();
    assert!(matches!(
        err,
        SchemaSyncError::DuplicateMigrationVersion { line: 3, version: 0 }
    ));
}

// ============================================================================
// Parameters and comparison
// ============================================================================

#[test]
fn test_live_view_templates_back_to_source() {
    let parameters = [("db", "PROD_DB"), ("env", "prod")]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    let injector = ParameterInjector::new(parameters);

    let source = Script::state(
        "${DB}",
        "SC",
        ObjectType::Views,
        "V1",
        "CREATE OR REPLACE VIEW ${db}.SC.V1 AS SELECT * FROM ${db}.SC.T1 WHERE ENV = '${env}';",
    );
    let mut deployed = source.clone();
    injector.inject_script(&mut deployed);
    assert_eq!(
        deployed.content(),
        "CREATE OR REPLACE VIEW PROD_DB.SC.V1 AS SELECT * FROM PROD_DB.SC.T1 WHERE ENV = 'prod';"
    );
    assert_eq!(deployed.hash(), source.hash());

    let mut live = Script::state("PROD_DB", "SC", ObjectType::Views, "V1", deployed.content());
    injector.parametrize_script(&mut live, true);
    assert_eq!(live.id(), source.id());
    assert!(scripts_equivalent(&live, &source));
}

// ============================================================================
// Test queries
// ============================================================================

fn view_test(view: &str, test: &str) -> TestScript {
    TestScript::new(Script::state("DB", "SC", ObjectType::Views, "V1", view), test)
}

#[test]
fn test_test_query_reads_from_mocks() {
    let test = view_test(
        "CREATE OR REPLACE VIEW DB.SC.V1 AS SELECT ID FROM DB.SC.SOURCE_TABLE WHERE ID > 1;",
        "WITH SOURCE_TABLE AS (SELECT 1 AS ID UNION ALL SELECT 2 AS ID), EXPECTED_DATA AS (SELECT 2 AS ID) SELECT * FROM EXPECTED_DATA",
    );

    let (mocks, expected) = parse_test_ctes(&test).unwrap();
    assert_eq!(mocks.len(), 1);
    assert_eq!(mocks[0].name, "SOURCE_TABLE");
    assert_eq!(expected, "SELECT 2 AS ID");

    let query = generate_test_query(&test).unwrap();
    assert!(query.starts_with("WITH SOURCE_TABLE AS ("));
    assert!(query.contains("SELECT ID FROM SOURCE_TABLE WHERE ID > 1"));
    assert!(!query.contains("DB.SC.SOURCE_TABLE"));
    assert!(query.ends_with("SELECT * FROM ASSERTION;"));
}

#[test]
fn test_test_query_requires_expected_data() {
    let test = view_test(
        "CREATE OR REPLACE VIEW DB.SC.V1 AS SELECT 1 AS ID;",
        "WITH MOCK AS (SELECT 1 AS ID) SELECT * FROM MOCK",
    );
    let err = generate_test_query(&test).unwrap_err();
    match err {
        SchemaSyncError::TestQueryError { id, message } => {
            assert_eq!(id, "DB.SC.V1_TEST");
            assert!(message.contains("EXPECTED_DATA"));
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
