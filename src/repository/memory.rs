//! In-memory repository for dry runs and tests
//!
//! Holds live object definitions and the bookkeeping tables in memory and
//! can persist them to a JSON state file between CLI invocations. Statements
//! are recorded rather than executed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Row, ScriptRepository};
use crate::error::SchemaSyncError;
use crate::model::{
    ChangeSync, ChangeType, ObjectType, Script, ScriptDependency, ScriptEvent, ScriptHistory,
    ScriptKind, SyncStatus, TestResult, TestScript,
};
use crate::parser::{classify_statement, split_statements};

/// Schemas every database has that never hold user objects
const SYSTEM_SCHEMAS: [&str; 2] = ["INFORMATION_SCHEMA", "PUBLIC"];

/// Definition of one object in the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveObject {
    pub schema: String,
    pub name: String,
    pub object_type: ObjectType,
    /// `CREATE` statement of the object
    pub ddl: String,
}

/// A statement the repository was asked to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub script_id: String,
    pub sql: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RepositoryState {
    schemas: BTreeSet<String>,
    /// Keyed by `SCHEMA.OBJECT`
    objects: BTreeMap<String, LiveObject>,
    history: BTreeMap<String, ScriptHistory>,
    change_syncs: Vec<ChangeSync>,
    events: Vec<ScriptEvent>,
    lineage: Vec<ScriptDependency>,
    config_tables: BTreeMap<String, Vec<Row>>,
}

#[derive(Debug)]
pub struct InMemoryRepository {
    database: String,
    state: RepositoryState,
    hashes: BTreeMap<String, String>,
    current_sync: Option<u64>,
    /// Script ids or full names whose statements fail
    failing: BTreeSet<String>,
    test_results: BTreeMap<String, Vec<TestResult>>,
    executions: Vec<Execution>,
    state_path: Option<PathBuf>,
}

fn state_error(path: &Path, err: impl std::fmt::Display) -> SchemaSyncError {
    SchemaSyncError::RepositoryError {
        message: format!("{}: {}", path.display(), err),
    }
}

/// Statement text of a migration without its header and directive lines
fn migration_body(content: &str) -> String {
    content
        .lines()
        .filter(|line| !line.trim_start().starts_with("---"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

impl InMemoryRepository {
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_uppercase(),
            state: RepositoryState::default(),
            hashes: BTreeMap::new(),
            current_sync: None,
            failing: BTreeSet::new(),
            test_results: BTreeMap::new(),
            executions: Vec::new(),
            state_path: None,
        }
    }

    /// Open a repository persisted at `path`, starting empty when the file
    /// does not exist yet.
    pub fn open(database: &str, path: &Path) -> Result<Self> {
        let mut repository = Self::new(database);
        if path.is_file() {
            let content = std::fs::read_to_string(path).map_err(|e| state_error(path, e))?;
            repository.state = serde_json::from_str(&content).map_err(|e| state_error(path, e))?;
            tracing::debug!(path = %path.display(), "loaded repository state");
        }
        repository.state_path = Some(path.to_path_buf());
        Ok(repository)
    }

    /// Write the state file, if the repository was opened from one
    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(&self.state)?;
        std::fs::write(path, json).map_err(|e| state_error(path, e))?;
        tracing::debug!(path = %path.display(), "saved repository state");
        Ok(())
    }

    /// Load the objects of a schema from a DDL dump
    pub fn with_schema_ddl(mut self, schema: &str, ddl: &str) -> Self {
        let schema = schema.to_uppercase();
        self.state.schemas.insert(schema.clone());
        for statement in split_statements(ddl) {
            if let Some((object_type, name, ddl)) = classify_statement(&statement) {
                let name = name.to_uppercase();
                let key = format!("{}.{}", schema, name);
                self.state.objects.insert(
                    key,
                    LiveObject {
                        schema: schema.clone(),
                        name,
                        object_type,
                        ddl,
                    },
                );
            }
        }
        self
    }

    pub fn with_config_rows(mut self, full_name: &str, rows: Vec<Row>) -> Self {
        self.state.config_tables.insert(full_name.to_uppercase(), rows);
        self
    }

    pub fn with_test_results(mut self, test_id: &str, results: Vec<TestResult>) -> Self {
        self.test_results.insert(test_id.to_string(), results);
        self
    }

    /// Make every statement of a script (by id or full name) fail
    pub fn fail_on(&mut self, name: &str) {
        self.failing.insert(name.to_uppercase());
    }

    pub fn change_syncs(&self) -> &[ChangeSync] {
        &self.state.change_syncs
    }

    pub fn events(&self) -> &[ScriptEvent] {
        &self.state.events
    }

    pub fn lineage(&self) -> &[ScriptDependency] {
        &self.state.lineage
    }

    pub fn history(&self) -> &BTreeMap<String, ScriptHistory> {
        &self.state.history
    }

    pub fn executions(&self) -> &[Execution] {
        &self.executions
    }

    pub fn live_object(&self, schema: &str, name: &str) -> Option<&LiveObject> {
        self.state
            .objects
            .get(&format!("{}.{}", schema.to_uppercase(), name.to_uppercase()))
    }

    fn fails(&self, script: &Script) -> bool {
        self.failing.contains(&script.id()) || self.failing.contains(&script.full_object_name())
    }

    fn sync_id(&self) -> u64 {
        self.current_sync.unwrap_or_default()
    }

    fn record_event(&mut self, script: &Script, status: SyncStatus, message: &str) {
        tracing::debug!(script = %script, status = %status, message, "script event");
        let event = ScriptEvent {
            id: Uuid::new_v4().to_string(),
            script_id: script.id(),
            object_name: script.full_object_name(),
            script_hash: script.hash().to_string(),
            status,
            message: message.to_string(),
            change_sync_id: self.sync_id(),
            created_at: Utc::now(),
        };
        self.state.events.push(event);
    }

    /// Record an ERROR event and build the matching execution error
    fn fail(&mut self, script: &Script, sql: &str) -> SchemaSyncError {
        let message = format!("statement rejected by database: {}", sql.lines().next().unwrap_or_default());
        tracing::error!(script = %script, error = %message, "error while executing script");
        self.record_event(script, SyncStatus::Error, &message);
        SchemaSyncError::ExecutionError {
            id: script.id(),
            message,
        }
    }

    fn execute(&mut self, script: &Script, sql: &str) {
        self.executions.push(Execution {
            script_id: script.id(),
            sql: sql.to_string(),
        });
    }

    fn apply_to_live(&mut self, script: &Script) {
        let key = format!("{}.{}", script.schema(), script.object_name());
        self.state.schemas.insert(script.schema().to_string());
        let ddl = match script.kind() {
            ScriptKind::State => script.content().to_string(),
            ScriptKind::Migration(_) => {
                if self.state.objects.contains_key(&key) {
                    return;
                }
                migration_body(script.content())
            }
        };
        self.state.objects.insert(
            key,
            LiveObject {
                schema: script.schema().to_string(),
                name: script.object_name().to_string(),
                object_type: script.object_type(),
                ddl,
            },
        );
    }

    fn update_history(&mut self, script: &Script) {
        let record = ScriptHistory {
            script_id: script.id(),
            object_name: script.full_object_name(),
            object_type: script.object_type(),
            rollback: script.migration_info().and_then(|m| m.rollback.clone()),
            script_hash: script.hash().to_string(),
            deployed_hash: script.deployed_hash(),
            change_sync_id: self.sync_id(),
            updated_at: Utc::now(),
        };
        self.state.history.insert(record.script_id.clone(), record);
    }
}

impl ScriptRepository for InMemoryRepository {
    fn database_name(&self) -> &str {
        &self.database
    }

    fn load_deployed_hashes(&mut self) -> Result<BTreeSet<String>> {
        self.hashes = self
            .state
            .history
            .values()
            .map(|h| (h.script_id.clone(), h.script_hash.clone()))
            .collect();
        tracing::debug!(count = self.hashes.len(), "script hashes loaded");
        Ok(self.hashes.keys().cloned().collect())
    }

    fn deployed_hashes(&self) -> &BTreeMap<String, String> {
        &self.hashes
    }

    fn create_or_replace(&mut self, script: &Script, hash_only: bool) -> Result<()> {
        if !hash_only {
            if self.fails(script) {
                return Err(self.fail(script, script.content()).into());
            }
            self.execute(script, script.content());
            self.apply_to_live(script);
        }
        self.update_history(script);
        self.record_event(script, SyncStatus::Success, "Successfully deployed object");
        tracing::info!(script = %script, "successfully deployed object");
        Ok(())
    }

    fn execute_rollback(&mut self, script: &Script) -> Result<()> {
        let rollback = script
            .migration_info()
            .and_then(|m| m.rollback.clone())
            .filter(|r| !r.trim().is_empty());
        if let Some(sql) = &rollback {
            if self.fails(script) {
                return Err(self.fail(script, sql).into());
            }
            self.execute(script, sql);
            if script.version() == Some(0) {
                let key = format!("{}.{}", script.schema(), script.object_name());
                self.state.objects.remove(&key);
            }
        }
        self.state.history.remove(&script.id());
        self.record_event(script, SyncStatus::Success, "Successfully rolled back object");
        tracing::info!(script = %script, "successfully rolled back object");
        Ok(())
    }

    fn execute_verify(&mut self, script: &Script) -> Result<bool> {
        let verify = script
            .migration_info()
            .and_then(|m| m.verify.clone())
            .filter(|v| !v.trim().is_empty());
        if let Some(sql) = &verify {
            if self.fails(script) {
                self.fail(script, sql);
                return Ok(false);
            }
            self.execute(script, sql);
        }
        self.record_event(script, SyncStatus::Success, "Successfully verified object");
        Ok(true)
    }

    fn list_schemas(&mut self) -> Result<Vec<String>> {
        tracing::info!(database = %self.database, "reading all schemas in database");
        Ok(self
            .state
            .schemas
            .iter()
            .filter(|s| !SYSTEM_SCHEMAS.iter().any(|system| s.eq_ignore_ascii_case(system)))
            .cloned()
            .collect())
    }

    fn list_live_objects(&mut self, schema: &str) -> Result<Vec<Script>> {
        let mut objects: Vec<&LiveObject> = self
            .state
            .objects
            .values()
            .filter(|o| o.schema.eq_ignore_ascii_case(schema))
            .collect();
        objects.sort_by(|a, b| (a.object_type, &a.name).cmp(&(b.object_type, &b.name)));

        Ok(objects
            .into_iter()
            .map(|o| {
                if o.object_type.is_migration() {
                    Script::initial_migration(&self.database, &o.schema, o.object_type, &o.name, &o.ddl)
                } else {
                    Script::state(&self.database, &o.schema, o.object_type, &o.name, &o.ddl)
                }
            })
            .collect())
    }

    fn list_live_object_names(&mut self) -> Result<Vec<String>> {
        Ok(self
            .state
            .objects
            .values()
            .map(|o| format!("{}.{}.{}", self.database, o.schema, o.name))
            .collect())
    }

    fn load_migration_history(&mut self, ids: &BTreeSet<String>) -> Result<Vec<Script>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.state.history.get(id))
            .filter_map(ScriptHistory::to_migration)
            .collect())
    }

    fn config_table_rows(&mut self, full_name: &str) -> Result<Vec<Row>> {
        Ok(self
            .state
            .config_tables
            .get(&full_name.to_uppercase())
            .cloned()
            .unwrap_or_default())
    }

    fn record_sync_start(&mut self, change_type: ChangeType, message: &str) -> Result<u64> {
        let id = self.state.change_syncs.len() as u64 + 1;
        self.state.change_syncs.push(ChangeSync {
            id,
            change_type,
            status: SyncStatus::InProgress,
            message: message.to_string(),
            change_count: None,
            start_time: Utc::now(),
            end_time: None,
        });
        self.current_sync = Some(id);
        Ok(id)
    }

    fn record_sync_end(
        &mut self,
        change_type: ChangeType,
        status: SyncStatus,
        message: &str,
        change_count: Option<u64>,
    ) -> Result<()> {
        let id = self.current_sync.ok_or_else(|| SchemaSyncError::RepositoryError {
            message: format!("{} ended without being started", change_type),
        })?;
        let sync = self
            .state
            .change_syncs
            .iter_mut()
            .find(|s| s.id == id)
            .ok_or_else(|| SchemaSyncError::RepositoryError {
                message: format!("change sync {} not found", id),
            })?;
        sync.change_type = change_type;
        sync.status = status;
        sync.message = message.to_string();
        sync.change_count = change_count;
        sync.end_time = Some(Utc::now());
        Ok(())
    }

    fn insert_lineage(&mut self, dependencies: &[ScriptDependency]) -> Result<()> {
        tracing::info!(count = dependencies.len(), "inserting dependency lineage");
        self.state.lineage = dependencies.to_vec();
        Ok(())
    }

    fn run_test_query(&mut self, test: &TestScript, query: &str) -> Result<Vec<TestResult>> {
        tracing::debug!(test = %test, "running test script");
        self.executions.push(Execution {
            script_id: test.id(),
            sql: query.to_string(),
        });
        if self.fails(test.subject()) {
            return Ok(vec![TestResult::from_error(format!("test query for {} failed", test))]);
        }
        Ok(self.test_results.get(&test.id()).cloned().unwrap_or_default())
    }
}
