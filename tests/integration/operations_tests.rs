//! Integration tests for lineage, companion tests and cleanup

use pretty_assertions::assert_eq;

use rust_schemasync::model::{ChangeType, SyncStatus, TestResult};
use rust_schemasync::project::Config;
use rust_schemasync::{InMemoryRepository, SchemaSyncError};

use crate::common::*;

// ============================================================================
// Lineage
// ============================================================================

#[test]
fn test_lineage_records_object_edges() {
    let ctx = sales_project();
    ctx.script("SALES", "TABLES", "ORDERS", &format!("{}{}", ORDERS, ORDERS_V1));
    let mut manager = ctx.manager(Config::default(), InMemoryRepository::new(DATABASE));

    assert_eq!(manager.create_lineage().unwrap(), 3);

    let edges: Vec<(String, String)> = manager
        .repository()
        .lineage()
        .iter()
        .map(|d| (d.object_name.clone(), d.dependency_name.clone()))
        .collect();
    assert_eq!(
        edges,
        vec![
            ("TEST_DB.SALES.ORDER_SUMMARY".to_string(), "TEST_DB.SALES.CUSTOMERS".to_string()),
            ("TEST_DB.SALES.ORDER_SUMMARY".to_string(), "TEST_DB.SALES.ORDERS".to_string()),
            ("TEST_DB.SALES.REVENUE".to_string(), "TEST_DB.SALES.ORDER_SUMMARY".to_string()),
        ]
    );

    let sync = manager.repository().change_syncs().last().unwrap();
    assert_eq!(sync.change_type, ChangeType::CreateLineage);
    assert_eq!(sync.change_count, Some(3));
}

#[test]
fn test_lineage_includes_overrides() {
    let ctx = sales_project();
    let config = config(
        "dependencyOverride:\n  - script: TEST_DB.SALES.REVENUE\n    dependencies:\n      - TEST_DB.SALES.CUSTOMERS\n",
    );
    let mut manager = ctx.manager(config, InMemoryRepository::new(DATABASE));

    assert_eq!(manager.create_lineage().unwrap(), 4);
    assert!(manager
        .repository()
        .lineage()
        .iter()
        .any(|d| d.object_name == "TEST_DB.SALES.REVENUE" && d.dependency_name == "TEST_DB.SALES.CUSTOMERS"));
}

// ============================================================================
// Companion tests
// ============================================================================

const ACTIVE_CUSTOMERS: &str =
    "CREATE OR REPLACE VIEW TEST_DB.SALES.ACTIVE_CUSTOMERS AS SELECT ID, FULL_NAME FROM TEST_DB.SALES.CUSTOMERS WHERE FLAG = 1;";

const ACTIVE_CUSTOMERS_TEST: &str = "WITH CUSTOMERS AS (SELECT 1 AS ID, 'ann' AS FULL_NAME, 1 AS FLAG),\n\
EXPECTED_DATA AS (SELECT 1 AS ID, 'ann' AS FULL_NAME)\n\
SELECT * FROM EXPECTED_DATA";

fn tested_project() -> TestContext {
    let ctx = sales_project();
    ctx.script("SALES", "VIEWS", "ACTIVE_CUSTOMERS", ACTIVE_CUSTOMERS)
        .test_script("SALES", "VIEWS", "ACTIVE_CUSTOMERS", ACTIVE_CUSTOMERS_TEST);
    ctx
}

#[test]
fn test_companion_tests_run_against_mocks() {
    let ctx = tested_project();
    let mut manager = ctx.manager(Config::default(), InMemoryRepository::new(DATABASE));

    let report = manager.test().unwrap();
    assert_eq!(report.outcomes.len(), 1);
    assert!(report.is_success());
    assert_eq!(report.outcomes[0].test_id, "TEST_DB.SALES.ACTIVE_CUSTOMERS_TEST");

    let execution = &manager.repository().executions()[0];
    assert_eq!(execution.script_id, "TEST_DB.SALES.ACTIVE_CUSTOMERS_TEST");
    assert!(execution.sql.contains("ACTUAL_DATA"));
    assert!(!execution.sql.contains("TEST_DB.SALES.CUSTOMERS"));

    let sync = manager.repository().change_syncs().last().unwrap();
    assert_eq!(sync.change_type, ChangeType::Test);
    assert_eq!(sync.change_count, Some(1));
}

#[test]
fn test_failed_assertions_are_reported() {
    let ctx = tested_project();
    let repository = InMemoryRepository::new(DATABASE).with_test_results(
        "TEST_DB.SALES.ACTIVE_CUSTOMERS_TEST",
        vec![TestResult::new("1", "rows missing from actual data")],
    );
    let mut manager = ctx.manager(Config::default(), repository);

    let report = manager.test().unwrap();
    assert!(!report.is_success());
    assert_eq!(report.failed().count(), 1);
    assert_eq!(manager.repository().change_syncs().last().unwrap().status, SyncStatus::Success);
}

#[test]
fn test_unparseable_test_becomes_failed_outcome() {
    let ctx = tested_project();
    ctx.test_script("SALES", "VIEWS", "REVENUE", "SELECT 1");
    let mut manager = ctx.manager(Config::default(), InMemoryRepository::new(DATABASE));

    let report = manager.test().unwrap();
    assert_eq!(report.outcomes.len(), 2);
    assert_eq!(report.passed(), 1);
    let failed: Vec<&str> = report.failed().map(|o| o.test_id.as_str()).collect();
    assert_eq!(failed, vec!["TEST_DB.SALES.REVENUE_TEST"]);
    assert_eq!(report.outcomes[1].results[0].result, "ERROR");
}

#[test]
fn test_excluded_objects_are_not_tested() {
    let ctx = tested_project();
    let config = config("scriptExclusion:\n  - TEST_DB.SALES.ACTIVE_CUSTOMERS\n");
    let mut manager = ctx.manager(config, InMemoryRepository::new(DATABASE));
    assert!(manager.test().unwrap().outcomes.is_empty());
}

// ============================================================================
// Cleanup
// ============================================================================

#[test]
fn test_cleanup_lists_objects_missing_from_source() {
    let ctx = sales_project();
    let repository = InMemoryRepository::new(DATABASE).with_schema_ddl(
        "SALES",
        "create or replace view TEST_DB.SALES.STALE as select 1 as ONE;",
    );
    let mut manager = ctx.manager(Config::default(), repository);
    manager.deploy(false).unwrap();

    let missing = manager.cleanup().unwrap();
    assert_eq!(missing, vec!["TEST_DB.SALES.STALE"]);

    let sync = manager.repository().change_syncs().last().unwrap();
    assert_eq!(sync.change_type, ChangeType::Cleanup);
    assert_eq!(sync.status, SyncStatus::Success);
    assert_eq!(sync.change_count, Some(5));
}

#[test]
fn test_cleanup_compares_parametrized_names() {
    let ctx = TestContext::new();
    ctx.script(
        "SALES",
        "VIEWS",
        "REVENUE",
        "CREATE OR REPLACE VIEW ${db}.SALES.REVENUE AS SELECT 1 AS TOTAL;",
    );
    let repository = InMemoryRepository::new(DATABASE).with_schema_ddl(
        "SALES",
        "create or replace view TEST_DB.SALES.REVENUE as select 1 as TOTAL;\n\
         create or replace view TEST_DB.SALES.OLD_REVENUE as select 0 as TOTAL;",
    );
    let mut manager = ctx.manager_with(Config::default(), parameters(&[("db", DATABASE)]), repository);

    assert_eq!(manager.cleanup().unwrap(), vec!["${DB}.SALES.OLD_REVENUE"]);
}

#[test]
fn test_cleanup_source_roots() {
    let ctx = TestContext::new();
    std::fs::remove_dir(ctx.path("main")).unwrap();
    let mut manager = ctx.manager(Config::default(), InMemoryRepository::new(DATABASE));
    // an empty root is a valid (empty) source
    assert!(manager.cleanup().unwrap().is_empty());

    let missing_root = TestContext::new();
    let source_root = missing_root.path("does-not-exist");
    let mut manager = rust_schemasync::ChangeManager::new(
        Config::default(),
        rust_schemasync::ParameterInjector::default(),
        rust_schemasync::FileScriptSource::new(source_root),
        InMemoryRepository::new(DATABASE),
    );
    let err = manager.cleanup().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::InvalidScriptPath { .. })
    ));
}
