//! Integration tests for verify

use pretty_assertions::assert_eq;

use rust_schemasync::model::{ChangeType, SyncStatus};
use rust_schemasync::project::Config;
use rust_schemasync::{InMemoryRepository, SchemaSyncError};

use crate::common::*;

#[test]
fn test_verify_after_deploy() {
    let (ctx, repository) = deployed_sales_project(Config::default());
    let mut manager = ctx.manager(Config::default(), repository);

    let report = manager.verify().unwrap();
    assert_eq!(report.checked, 4);
    assert!(report.failures.is_empty());

    let verified: Vec<&str> = manager
        .repository()
        .executions()
        .iter()
        .skip(4)
        .map(|e| e.sql.as_str())
        .collect();
    assert_eq!(
        verified,
        vec![
            "SELECT * FROM TEST_DB.SALES.CUSTOMERS LIMIT 1;",
            "SELECT * FROM TEST_DB.SALES.ORDERS LIMIT 1;"
        ]
    );

    let sync = manager.repository().change_syncs().last().unwrap();
    assert_eq!(sync.change_type, ChangeType::Verify);
    assert_eq!(sync.message, "Successfully completed VERIFY");
}

#[test]
fn test_verify_runs_latest_migration_version_only() {
    let (ctx, repository) = deployed_sales_project(Config::default());
    ctx.script("SALES", "TABLES", "ORDERS", &format!("{}{}", ORDERS, ORDERS_V1));
    let mut manager = ctx.manager(Config::default(), repository);
    manager.deploy(false).unwrap();
    let before = manager.repository().executions().len();

    manager.verify().unwrap();
    let sql: Vec<String> = manager.repository().executions()[before..]
        .iter()
        .map(|e| e.sql.clone())
        .collect();
    assert!(sql.contains(&"SELECT NOTE FROM TEST_DB.SALES.ORDERS LIMIT 1;".to_string()));
    assert!(!sql.contains(&"SELECT * FROM TEST_DB.SALES.ORDERS LIMIT 1;".to_string()));
}

#[test]
fn test_verify_detects_drifted_view() {
    let (ctx, repository) = deployed_sales_project(Config::default());
    ctx.script(
        "SALES",
        "VIEWS",
        "REVENUE",
        "CREATE OR REPLACE VIEW TEST_DB.SALES.REVENUE AS SELECT AVG(TOTAL) AS TOTAL FROM TEST_DB.SALES.ORDER_SUMMARY;",
    );
    let mut manager = ctx.manager(Config::default(), repository);

    let err = manager.verify().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::VerificationFailed { failed: 1 })
    ));
    let sync = manager.repository().change_syncs().last().unwrap();
    assert_eq!(sync.status, SyncStatus::Error);
    assert_eq!(sync.message, "1 scripts failed to verify.");
}

#[test]
fn test_verify_ignores_whitespace_and_comments() {
    let (ctx, repository) = deployed_sales_project(Config::default());
    ctx.script(
        "SALES",
        "VIEWS",
        "REVENUE",
        "-- total revenue\nCREATE OR REPLACE VIEW TEST_DB.SALES.REVENUE AS\n    SELECT SUM(TOTAL) AS TOTAL\n    FROM TEST_DB.SALES.ORDER_SUMMARY;",
    );
    let mut manager = ctx.manager(Config::default(), repository);
    assert!(manager.verify().unwrap().failures.is_empty());
}

#[test]
fn test_verify_reports_objects_missing_from_source() {
    let (ctx, repository) = deployed_sales_project(Config::default());
    ctx.remove(&format!("main/{}/SALES/VIEWS/REVENUE.sql", DATABASE));
    let mut manager = ctx.manager(Config::default(), repository);

    let err = manager.verify().unwrap_err();
    assert!(err.to_string().contains("1 scripts failed to verify."));
}

#[test]
fn test_verify_statement_failure() {
    let (ctx, mut repository) = deployed_sales_project(Config::default());
    repository.fail_on(CUSTOMERS_ID);
    let mut manager = ctx.manager(Config::default(), repository);

    let err = manager.verify().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::VerificationFailed { failed: 1 })
    ));
}

#[test]
fn test_verify_counts_every_kind_of_failure() {
    let (ctx, mut repository) = deployed_sales_project(Config::default());
    // live REVENUE has no source, ORDER_SUMMARY drifted, CUSTOMERS verify fails
    ctx.remove(&format!("main/{}/SALES/VIEWS/REVENUE.sql", DATABASE));
    ctx.script(
        "SALES",
        "VIEWS",
        "ORDER_SUMMARY",
        "CREATE OR REPLACE VIEW TEST_DB.SALES.ORDER_SUMMARY AS SELECT O.ID FROM TEST_DB.SALES.ORDERS O \
         JOIN TEST_DB.SALES.CUSTOMERS C ON C.ID = O.CUSTOMER_ID;",
    );
    repository.fail_on(CUSTOMERS_ID);
    let mut manager = ctx.manager(Config::default(), repository);

    let err = manager.verify().unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::VerificationFailed { failed: 3 })
    ));

    // the ORDERS verify statement still ran after the CUSTOMERS failure
    let last = manager.repository().executions().last().unwrap();
    assert_eq!(last.sql, "SELECT * FROM TEST_DB.SALES.ORDERS LIMIT 1;");

    let sync = manager.repository().change_syncs().last().unwrap();
    assert_eq!(sync.status, SyncStatus::Error);
    assert_eq!(sync.message, "3 scripts failed to verify.");
}

#[test]
fn test_verify_skips_excluded_objects() {
    let ctx = sales_project();
    let repository = InMemoryRepository::new(DATABASE).with_schema_ddl(
        "SALES",
        "create or replace view TEST_DB.SALES.LEGACY as select 1 as ONE;",
    );
    let config = config("scriptExclusion:\n  - TEST_DB.SALES.LEGACY\n");
    let mut manager = ctx.manager(config, repository);
    manager.deploy(false).unwrap();

    let report = manager.verify().unwrap();
    assert_eq!(report.checked, 4);
}
