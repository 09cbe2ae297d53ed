//! Lineage edges between scripts

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::{ObjectType, Script};

/// `object` depends on `dependency`.
///
/// Equality and ordering only look at the two full object names, so the
/// edges of every version of a migration object collapse into one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScriptDependency {
    pub object_name: String,
    pub object_type: ObjectType,
    pub dependency_name: String,
    pub dependency_type: ObjectType,
}

impl ScriptDependency {
    pub fn new(object: &Script, dependency: &Script) -> Self {
        Self {
            object_name: object.full_object_name(),
            object_type: object.object_type(),
            dependency_name: dependency.full_object_name(),
            dependency_type: dependency.object_type(),
        }
    }

    fn key(&self) -> (&str, &str) {
        (&self.object_name, &self.dependency_name)
    }
}

impl PartialEq for ScriptDependency {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for ScriptDependency {}

impl PartialOrd for ScriptDependency {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScriptDependency {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl fmt::Display for ScriptDependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.object_name, self.dependency_name)
    }
}
