//! Integration tests for opening a project from disk

use pretty_assertions::assert_eq;

use rust_schemasync::project::Config;
use rust_schemasync::{
    check_project, open_change_manager, SchemaSyncError, Script, ScriptRepository, SyncOptions,
};

use crate::common::*;

fn options(ctx: &TestContext) -> SyncOptions {
    SyncOptions {
        script_root: ctx.root.clone(),
        profile: "dev".to_string(),
        state_file: None,
    }
}

#[test]
fn test_open_deploy_and_reopen() {
    let ctx = sales_project();
    ctx.write("parameter-dev.properties", "db=TEST_DB\n")
        .write("config.yaml", "continueOnFailure: false\n");

    let mut manager = open_change_manager(&options(&ctx)).unwrap();
    assert_eq!(manager.deploy(false).unwrap(), 4);
    manager.repository().save().unwrap();
    assert!(ctx.exists(".schemasync-state.json"));

    let mut reopened = open_change_manager(&options(&ctx)).unwrap();
    assert_eq!(reopened.deploy(false).unwrap(), 0);
    assert_eq!(reopened.repository().change_syncs().len(), 2);
    assert_eq!(reopened.repository().history().len(), 4);
}

#[test]
fn test_explicit_state_file() {
    let ctx = sales_project();
    ctx.write("parameter-uat.properties", "db=UAT_DB\n");
    let state = ctx.path("state/uat.json");
    std::fs::create_dir_all(state.parent().unwrap()).unwrap();

    let options = SyncOptions {
        script_root: ctx.root.clone(),
        profile: "UAT".to_string(),
        state_file: Some(state.clone()),
    };
    let mut manager = open_change_manager(&options).unwrap();
    manager.deploy(true).unwrap();
    manager.repository().save().unwrap();

    assert!(state.is_file());
    assert!(!ctx.exists(".schemasync-state.json"));
}

#[test]
fn test_database_from_connection_settings() {
    let ctx = sales_project();
    ctx.write("parameter-dev.properties", "region=EU\n")
        .write("config.yaml", "connection:\n  db: CONN_DB\n");

    let manager = open_change_manager(&options(&ctx)).unwrap();
    assert_eq!(manager.repository().database_name(), "CONN_DB");
}

#[test]
fn test_missing_database_name() {
    let ctx = sales_project();
    ctx.write("parameter-dev.properties", "region=EU\n");

    let err = open_change_manager(&options(&ctx)).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::InvalidConfig { .. })
    ));
}

#[test]
fn test_missing_parameter_file() {
    let ctx = sales_project();
    let err = open_change_manager(&options(&ctx)).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::ParameterFileError { .. })
    ));
}

#[test]
fn test_invalid_config_file() {
    let ctx = sales_project();
    ctx.write("parameter-dev.properties", "db=TEST_DB\n")
        .write("config.yaml", "scriptExclusion: [unterminated\n");
    let err = open_change_manager(&options(&ctx)).err().unwrap();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::ConfigParseError { .. })
    ));
}

#[test]
fn test_check_project_orders_all_scripts() {
    let ctx = sales_project();
    ctx.script("SALES", "TABLES", "ORDERS", &format!("{}{}", ORDERS, ORDERS_V1));

    let ids: Vec<String> = check_project(&ctx.root, &Config::default())
        .unwrap()
        .iter()
        .map(Script::id)
        .collect();
    assert_eq!(ids.len(), 5);
    assert!(position(&ids, ORDERS_ID) < position(&ids, "TEST_DB.SALES.ORDERS:1"));
    assert!(position(&ids, ORDERS_ID) < position(&ids, ORDER_SUMMARY_ID));
    assert!(position(&ids, ORDER_SUMMARY_ID) < position(&ids, REVENUE_ID));
}

#[test]
fn test_check_project_reports_cycles() {
    let ctx = TestContext::new();
    ctx.script(
        "SALES",
        "VIEWS",
        "V_A",
        "CREATE OR REPLACE VIEW TEST_DB.SALES.V_A AS SELECT * FROM TEST_DB.SALES.V_B;",
    )
    .script(
        "SALES",
        "VIEWS",
        "V_B",
        "CREATE OR REPLACE VIEW TEST_DB.SALES.V_B AS SELECT * FROM TEST_DB.SALES.V_A;",
    )
    .script(
        "SALES",
        "VIEWS",
        "V_C",
        "CREATE OR REPLACE VIEW TEST_DB.SALES.V_C AS SELECT 1 AS ONE;",
    );

    let err = check_project(&ctx.root, &Config::default()).unwrap_err();
    match err.downcast_ref::<SchemaSyncError>() {
        Some(SchemaSyncError::CyclicDependency { stuck }) => {
            let ids: Vec<&str> = stuck.iter().map(|s| s.id.as_str()).collect();
            assert_eq!(ids, vec!["TEST_DB.SALES.V_A", "TEST_DB.SALES.V_B"]);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_check_project_follows_deploy_exclusions_and_overrides() {
    let ctx = sales_project();
    let config = config(
        "scriptExclusion:\n  - TEST_DB.SALES.REVENUE\n\
         dependencyOverride:\n  - script: TEST_DB.SALES.REVENUE\n    dependencies:\n      - TEST_DB.SALES.CUSTOMERS\n",
    );

    let ids: Vec<String> = check_project(&ctx.root, &config).unwrap().iter().map(Script::id).collect();
    assert_eq!(ids.len(), 3);
    assert!(!ids.contains(&REVENUE_ID.to_string()));
}

#[test]
fn test_check_project_rejects_unknown_override_script() {
    let ctx = sales_project();
    let config = config(
        "dependencyOverride:\n  - script: TEST_DB.SALES.MISSING\n    dependencies:\n      - TEST_DB.SALES.CUSTOMERS\n",
    );

    let err = check_project(&ctx.root, &config).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<SchemaSyncError>(),
        Some(SchemaSyncError::UnresolvedOverride { dependency, .. }) if dependency == "TEST_DB.SALES.MISSING"
    ));
}
