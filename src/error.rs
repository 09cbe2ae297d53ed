//! Error types for rust-schemasync

use std::path::PathBuf;
use thiserror::Error;

/// A script left unsorted by a dependency cycle, with the dependencies still
/// blocking it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckScript {
    pub id: String,
    pub unresolved: Vec<String>,
}

impl std::fmt::Display for StuckScript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} <- [{}]", self.id, self.unresolved.join(", "))
    }
}

/// Errors that can occur while loading, sequencing and syncing scripts
#[derive(Error, Debug)]
pub enum SchemaSyncError {
    #[error("Failed to read config file: {path}")]
    ConfigReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {path}")]
    ConfigParseError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to read parameter file: {path}")]
    ParameterFileError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Dependency override for {script} references unknown script {dependency}")]
    UnresolvedOverride { script: String, dependency: String },

    #[error("Failed to read script file: {path}")]
    ScriptReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write script file: {path}")]
    ScriptWriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid script path {path}: {message}")]
    InvalidScriptPath { path: PathBuf, message: String },

    #[error("Unknown object type directory: {name}")]
    UnknownObjectType { name: String },

    #[error("Invalid migration script at line {line}: {message}")]
    InvalidMigration { line: usize, message: String },

    #[error("Duplicate migration version {version} at line {line}")]
    DuplicateMigrationVersion { line: usize, version: u64 },

    #[error(
        "Cyclic dependency detected, {} scripts could not be sequenced: {}",
        .stuck.len(),
        .stuck.iter().map(|s| s.to_string()).collect::<Vec<_>>().join("; ")
    )]
    CyclicDependency { stuck: Vec<StuckScript> },

    #[error("Migration {id} was already deployed and its content has changed")]
    ImmutableMigration { id: String },

    #[error("Failed to execute script {id}: {message}")]
    ExecutionError { id: String, message: String },

    #[error("Deployment incomplete, {} scripts failed: {}", .failed.len(), .failed.join(", "))]
    DeployIncomplete { failed: Vec<String> },

    #[error("{failed} scripts failed to verify.")]
    VerificationFailed { failed: usize },

    #[error("Failed to generate test query for {id}: {message}")]
    TestQueryError { id: String, message: String },

    #[error("Repository error: {message}")]
    RepositoryError { message: String },
}

impl From<serde_json::Error> for SchemaSyncError {
    fn from(err: serde_json::Error) -> Self {
        SchemaSyncError::RepositoryError {
            message: err.to_string(),
        }
    }
}
