//! Integration tests for generating scripts from live objects

use pretty_assertions::assert_eq;

use rust_schemasync::model::{ChangeType, SyncStatus};
use rust_schemasync::project::Config;
use rust_schemasync::{InMemoryRepository, Script, ScriptSource};

use crate::common::*;

const SALES_DDL: &str = "create or replace schema SALES;\n\
create or replace TABLE TEST_DB.SALES.SETTINGS (K VARCHAR, V VARCHAR);\n\
create or replace view TEST_DB.SALES.ACTIVE_SETTINGS as select * from TEST_DB.SALES.SETTINGS where V is not null;\n";

const AUDIT_DDL: &str = "create or replace view TEST_DB.AUDIT.EVENTS as select 1 as ID;";

fn live_repository() -> InMemoryRepository {
    InMemoryRepository::new(DATABASE)
        .with_schema_ddl("SALES", SALES_DDL)
        .with_schema_ddl("AUDIT", AUDIT_DDL)
        .with_config_rows(
            "TEST_DB.SALES.SETTINGS",
            vec![
                vec![Some("mode".to_string()), Some("on".to_string())],
                vec![Some("limit".to_string()), None],
            ],
        )
}

#[test]
fn test_create_scripts_for_every_schema() {
    let ctx = TestContext::new();
    let mut manager = ctx.manager_with(
        Config::default(),
        parameters(&[("db", DATABASE)]),
        live_repository(),
    );

    assert_eq!(manager.create_scripts_from_db(None).unwrap(), 3);

    assert_eq!(file_names(&ctx.path("main/${DB}")), vec!["AUDIT", "SALES"]);
    assert_eq!(
        ctx.read("main/${DB}/SALES/VIEWS/ACTIVE_SETTINGS.SQL"),
        "create or replace view ${db}.SALES.ACTIVE_SETTINGS as select * from ${db}.SALES.SETTINGS where V is not null;"
    );
    assert_eq!(
        ctx.read("main/${DB}/SALES/TABLES/SETTINGS.SQL"),
        "---version: 0, author: schemasync\n\
         create or replace TABLE ${db}.SALES.SETTINGS (K VARCHAR, V VARCHAR);\n\
         ---rollback: DROP TABLE IF EXISTS ${db}.SALES.SETTINGS;\n\
         ---verify: SHOW TABLES LIKE '${db}.SALES.SETTINGS';"
    );

    let sync = manager.repository().change_syncs().last().unwrap();
    assert_eq!(sync.change_type, ChangeType::CreateScript);
    assert_eq!(sync.status, SyncStatus::Success);
    assert_eq!(sync.change_count, Some(3));
}

#[test]
fn test_create_scripts_for_selected_schemas() {
    let ctx = TestContext::new();
    let mut manager = ctx.manager(Config::default(), live_repository());

    let schemas = vec!["audit".to_string()];
    assert_eq!(manager.create_scripts_from_db(Some(&schemas)).unwrap(), 1);
    assert!(ctx.exists("main/TEST_DB/AUDIT/VIEWS/EVENTS.SQL"));
    assert!(!ctx.exists("main/TEST_DB/SALES"));
}

#[test]
fn test_config_tables_export_their_rows() {
    let ctx = TestContext::new();
    let config = config("configTables:\n  - ${db}.SALES.SETTINGS\n");
    let mut manager = ctx.manager_with(config, parameters(&[("db", DATABASE)]), live_repository());

    manager.create_scripts_from_db(None).unwrap();
    let content = ctx.read("main/${DB}/SALES/TABLES/SETTINGS.SQL");
    assert!(content.ends_with(
        "---version: 1, author: schemasync\n\
         INSERT INTO ${db}.SALES.SETTINGS values('mode', 'on'), ('limit', null);\n\
         ---rollback: DELETE FROM ${db}.SALES.SETTINGS;\n\
         ---verify: SELECT COUNT(*) FROM ${db}.SALES.SETTINGS;"
    ));
}

#[test]
fn test_created_scripts_read_back_as_source() {
    let ctx = TestContext::new();
    let config = config("configTables:\n  - ${db}.SALES.SETTINGS\n");
    let mut manager = ctx.manager_with(config, parameters(&[("db", DATABASE)]), live_repository());
    manager.create_scripts_from_db(Some(&["SALES".to_string()])).unwrap();

    let ids: Vec<String> = ctx.source().list_all_scripts().unwrap().iter().map(Script::id).collect();
    assert_eq!(
        ids,
        vec![
            "${DB}.SALES.SETTINGS:0",
            "${DB}.SALES.SETTINGS:1",
            "${DB}.SALES.ACTIVE_SETTINGS"
        ]
    );
}
