//! Live database access and deployment bookkeeping

mod memory;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use crate::model::{
    ChangeType, ObjectType, Script, ScriptDependency, SyncStatus, TestResult, TestScript,
    GENERATED_AUTHOR,
};

pub use memory::{Execution, InMemoryRepository, LiveObject};

/// One row of a config table; `None` is SQL `NULL`
pub type Row = Vec<Option<String>>;

/// Operations the change manager needs from a database.
///
/// Every object step (`create_or_replace`, `execute_rollback`,
/// `execute_verify`) runs in its own transaction and records a SUCCESS or
/// ERROR script event against the current change sync.
pub trait ScriptRepository {
    fn database_name(&self) -> &str;

    /// Load the recorded source hash of every deployed script, returning
    /// the recorded ids.
    fn load_deployed_hashes(&mut self) -> Result<BTreeSet<String>>;

    /// Hashes loaded by the last [`load_deployed_hashes`](Self::load_deployed_hashes)
    fn deployed_hashes(&self) -> &BTreeMap<String, String>;

    fn is_changed(&self, script: &Script) -> bool {
        self.deployed_hashes().get(&script.id()).map(String::as_str) != Some(script.hash())
    }

    fn is_version_deployed(&self, script: &Script) -> bool {
        self.deployed_hashes().contains_key(&script.id())
    }

    /// Execute the script (unless `hash_only`) and record its hashes.
    fn create_or_replace(&mut self, script: &Script, hash_only: bool) -> Result<()>;

    /// Run a migration's rollback statement and forget its hash record.
    fn execute_rollback(&mut self, script: &Script) -> Result<()>;

    /// Run a migration's verify statement. Execution errors yield `false`.
    fn execute_verify(&mut self, script: &Script) -> Result<bool>;

    /// User schemas of the database
    fn list_schemas(&mut self) -> Result<Vec<String>>;

    /// Live object definitions of one schema. Migration-style objects come
    /// back as version-0 migrations.
    fn list_live_objects(&mut self, schema: &str) -> Result<Vec<Script>>;

    /// `DB.SCHEMA.OBJECT` of every live object
    fn list_live_object_names(&mut self) -> Result<Vec<String>>;

    /// Rebuild recorded migrations by id, skipping non-migration records
    fn load_migration_history(&mut self, ids: &BTreeSet<String>) -> Result<Vec<Script>>;

    /// Rows of a table, as text
    fn config_table_rows(&mut self, full_name: &str) -> Result<Vec<Row>>;

    fn record_sync_start(&mut self, change_type: ChangeType, message: &str) -> Result<u64>;

    fn record_sync_end(
        &mut self,
        change_type: ChangeType,
        status: SyncStatus,
        message: &str,
        change_count: Option<u64>,
    ) -> Result<()>;

    fn insert_lineage(&mut self, dependencies: &[ScriptDependency]) -> Result<()>;

    /// Run a generated assertion query. Query failures come back as a
    /// single `ERROR` result row.
    fn run_test_query(&mut self, test: &TestScript, query: &str) -> Result<Vec<TestResult>>;
}

fn quote_value(value: &Option<String>) -> String {
    match value {
        Some(v) => format!("'{}'", v.replace('\'', "''")),
        None => "null".to_string(),
    }
}

/// Append the rows of a config table to its script as a version-1 data
/// migration. Non-table scripts and empty tables are left unchanged.
pub fn append_config_data(script: &mut Script, rows: &[Row]) {
    if script.object_type() != ObjectType::Tables || rows.is_empty() {
        return;
    }
    let full_name = script.full_object_name();
    let values = rows
        .iter()
        .map(|row| format!("({})", row.iter().map(quote_value).collect::<Vec<_>>().join(", ")))
        .collect::<Vec<_>>()
        .join(", ");
    let content = format!(
        "{}\n\n---version: 1, author: {}\nINSERT INTO {} values{};\n---rollback: DELETE FROM {};\n---verify: SELECT COUNT(*) FROM {};",
        script.content(),
        GENERATED_AUTHOR,
        full_name,
        values,
        full_name,
        full_name
    );
    script.set_content(&content);
}
