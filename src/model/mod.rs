//! Script, lineage and bookkeeping types

mod dependency;
mod script;
mod sync;

pub use dependency::ScriptDependency;
pub use script::{
    MigrationInfo, MigrationUnit, ObjectType, Script, ScriptKind, TestScript, GENERATED_AUTHOR,
};
pub use sync::{ChangeSync, ChangeType, ScriptEvent, ScriptHistory, SyncStatus, TestResult};
