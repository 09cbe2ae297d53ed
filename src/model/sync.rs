//! Bookkeeping records written around every operation

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MigrationUnit, ObjectType, Script};

/// Operation recorded in the change-sync log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Deploy,
    Rollback,
    Verify,
    CreateScript,
    CreateLineage,
    Test,
    Cleanup,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Deploy => "DEPLOY",
            ChangeType::Rollback => "ROLLBACK",
            ChangeType::Verify => "VERIFY",
            ChangeType::CreateScript => "CREATE_SCRIPT",
            ChangeType::CreateLineage => "CREATE_LINEAGE",
            ChangeType::Test => "TEST",
            ChangeType::Cleanup => "CLEANUP",
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    InProgress,
    Success,
    Error,
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncStatus::InProgress => "IN_PROGRESS",
            SyncStatus::Success => "SUCCESS",
            SyncStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// One row of the change-sync log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeSync {
    pub id: u64,
    pub change_type: ChangeType,
    pub status: SyncStatus,
    pub message: String,
    pub change_count: Option<u64>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

/// Outcome of a single per-object step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptEvent {
    pub id: String,
    pub script_id: String,
    pub object_name: String,
    pub script_hash: String,
    pub status: SyncStatus,
    pub message: String,
    pub change_sync_id: u64,
    pub created_at: DateTime<Utc>,
}

/// Last recorded deployment of a script
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptHistory {
    pub script_id: String,
    pub object_name: String,
    pub object_type: ObjectType,
    pub rollback: Option<String>,
    /// Hash of the source text
    pub script_hash: String,
    /// Hash of the text actually executed
    pub deployed_hash: String,
    pub change_sync_id: u64,
    pub updated_at: DateTime<Utc>,
}

impl ScriptHistory {
    /// Rebuild a migration from its history record, for rolling back
    /// versions that no longer exist in source. The content is empty.
    pub fn to_migration(&self) -> Option<Script> {
        if !self.object_type.is_migration() {
            return None;
        }
        let (_, version) = self.script_id.rsplit_once(':')?;
        let version = version.parse().ok()?;
        let mut parts = self.object_name.splitn(3, '.');
        let (database, schema, name) = (parts.next()?, parts.next()?, parts.next()?);
        let unit = MigrationUnit {
            version,
            author: None,
            content: String::new(),
            rollback: self.rollback.clone(),
            verify: None,
        };
        Some(Script::migration(database, schema, self.object_type, name, unit))
    }
}

/// One row returned by a test assertion query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestResult {
    pub result: String,
    pub message: String,
}

impl TestResult {
    pub fn new(result: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            result: result.into(),
            message: message.into(),
        }
    }

    /// Result row for a query that failed to execute
    pub fn from_error(message: impl Into<String>) -> Self {
        Self::new("ERROR", message)
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.result, self.message)
    }
}
