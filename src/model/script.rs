//! Deployable script types

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::util::content_hash;

/// Author recorded on migrations synthesized from a live database.
pub const GENERATED_AUTHOR: &str = "schemasync";

/// Kind of database object a script defines.
///
/// The variant names double as the directory names of the script tree
/// (`VIEWS`, `FILE_FORMATS`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObjectType {
    Views,
    Functions,
    Procedures,
    FileFormats,
    Tables,
    Streams,
    Sequences,
    Stages,
    Tasks,
    Streamlits,
    Pipes,
    Alerts,
    DynamicTables,
}

impl ObjectType {
    pub const ALL: [ObjectType; 13] = [
        ObjectType::Views,
        ObjectType::Functions,
        ObjectType::Procedures,
        ObjectType::FileFormats,
        ObjectType::Tables,
        ObjectType::Streams,
        ObjectType::Sequences,
        ObjectType::Stages,
        ObjectType::Tasks,
        ObjectType::Streamlits,
        ObjectType::Pipes,
        ObjectType::Alerts,
        ObjectType::DynamicTables,
    ];

    /// Directory name in the script tree (plural, underscore separated)
    pub fn dir_name(&self) -> &'static str {
        match self {
            ObjectType::Views => "VIEWS",
            ObjectType::Functions => "FUNCTIONS",
            ObjectType::Procedures => "PROCEDURES",
            ObjectType::FileFormats => "FILE_FORMATS",
            ObjectType::Tables => "TABLES",
            ObjectType::Streams => "STREAMS",
            ObjectType::Sequences => "SEQUENCES",
            ObjectType::Stages => "STAGES",
            ObjectType::Tasks => "TASKS",
            ObjectType::Streamlits => "STREAMLITS",
            ObjectType::Pipes => "PIPES",
            ObjectType::Alerts => "ALERTS",
            ObjectType::DynamicTables => "DYNAMIC_TABLES",
        }
    }

    /// Keyword used in DDL (`CREATE OR REPLACE <singular> ...`)
    pub fn singular(&self) -> &'static str {
        match self {
            ObjectType::Views => "VIEW",
            ObjectType::Functions => "FUNCTION",
            ObjectType::Procedures => "PROCEDURE",
            ObjectType::FileFormats => "FILE FORMAT",
            ObjectType::Tables => "TABLE",
            ObjectType::Streams => "STREAM",
            ObjectType::Sequences => "SEQUENCE",
            ObjectType::Stages => "STAGE",
            ObjectType::Tasks => "TASK",
            ObjectType::Streamlits => "STREAMLIT",
            ObjectType::Pipes => "PIPE",
            ObjectType::Alerts => "ALERT",
            ObjectType::DynamicTables => "DYNAMIC TABLE",
        }
    }

    /// Plural keyword used by `SHOW <plural> LIKE ...`
    pub fn plural(&self) -> &'static str {
        match self {
            ObjectType::FileFormats => "FILE FORMATS",
            ObjectType::DynamicTables => "DYNAMIC TABLES",
            other => other.dir_name(),
        }
    }

    /// Migration-style objects are versioned and append-only; the rest are
    /// replaced wholesale on every deploy.
    pub fn is_migration(&self) -> bool {
        matches!(
            self,
            ObjectType::Tables
                | ObjectType::Streams
                | ObjectType::Sequences
                | ObjectType::Stages
                | ObjectType::Tasks
                | ObjectType::Alerts
                | ObjectType::DynamicTables
        )
    }

    pub fn from_dir_name(name: &str) -> Option<ObjectType> {
        ObjectType::ALL
            .into_iter()
            .find(|t| t.dir_name().eq_ignore_ascii_case(name))
    }

    /// Match a DDL keyword, tolerating any run of whitespace in two-word types.
    pub fn from_singular(keyword: &str) -> Option<ObjectType> {
        let normalized = keyword.split_whitespace().collect::<Vec<_>>().join(" ");
        ObjectType::ALL
            .into_iter()
            .find(|t| t.singular().eq_ignore_ascii_case(&normalized))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// One parsed unit of a migration file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationUnit {
    pub version: u64,
    pub author: Option<String>,
    /// Header line through the trailing directives, trimmed
    pub content: String,
    pub rollback: Option<String>,
    pub verify: Option<String>,
}

/// Version metadata carried by migration scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationInfo {
    pub version: u64,
    pub author: Option<String>,
    pub rollback: Option<String>,
    pub verify: Option<String>,
}

/// Identity and lifecycle rules of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    /// Fully replaced on every deploy; identity is the qualified name
    State,
    /// Versioned change; identity is `name:version`
    Migration(MigrationInfo),
}

/// One deployable version of a database object.
#[derive(Debug, Clone)]
pub struct Script {
    database: String,
    schema: String,
    object_name: String,
    object_type: ObjectType,
    content: String,
    hash: String,
    path: Option<PathBuf>,
    kind: ScriptKind,
}

impl Script {
    fn new(
        database: &str,
        schema: &str,
        object_type: ObjectType,
        object_name: &str,
        content: &str,
        kind: ScriptKind,
    ) -> Self {
        let content = content.trim().to_string();
        let hash = content_hash(&content);
        Self {
            database: database.to_uppercase(),
            schema: schema.to_uppercase(),
            object_name: object_name.to_uppercase(),
            object_type,
            content,
            hash,
            path: None,
            kind,
        }
    }

    /// Create a state script (views, functions, procedures, ...)
    pub fn state(
        database: &str,
        schema: &str,
        object_type: ObjectType,
        object_name: &str,
        content: &str,
    ) -> Self {
        Self::new(database, schema, object_type, object_name, content, ScriptKind::State)
    }

    /// Create a migration script from one parsed unit of a migration file
    pub fn migration(
        database: &str,
        schema: &str,
        object_type: ObjectType,
        object_name: &str,
        unit: MigrationUnit,
    ) -> Self {
        let kind = ScriptKind::Migration(MigrationInfo {
            version: unit.version,
            author: unit.author,
            rollback: unit.rollback,
            verify: unit.verify,
        });
        Self::new(database, schema, object_type, object_name, &unit.content, kind)
    }

    /// Wrap a plain `CREATE` statement as a version-0 migration with a drop
    /// rollback and a `SHOW ... LIKE` verify statement.
    pub fn initial_migration(
        database: &str,
        schema: &str,
        object_type: ObjectType,
        object_name: &str,
        ddl: &str,
    ) -> Self {
        let qualified = format!("{}.{}.{}", database, schema, object_name).to_uppercase();
        let rollback = format!("DROP {} IF EXISTS {};", object_type.singular(), qualified);
        let verify = format!("SHOW {} LIKE '{}';", object_type.plural(), qualified);
        let content = format!(
            "---version: 0, author: {}\n{}\n---rollback: {}\n---verify: {}",
            GENERATED_AUTHOR,
            ddl.trim(),
            rollback,
            verify
        );
        let unit = MigrationUnit {
            version: 0,
            author: Some(GENERATED_AUTHOR.to_string()),
            content,
            rollback: Some(rollback),
            verify: Some(verify),
        };
        Self::migration(database, schema, object_type, object_name, unit)
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn object_name(&self) -> &str {
        &self.object_name
    }

    pub fn object_type(&self) -> ObjectType {
        self.object_type
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    /// Hash of the content as it was read from source. Parameter injection
    /// does not change it.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Hash of the current (possibly injected) content
    pub fn deployed_hash(&self) -> String {
        content_hash(&self.content)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn kind(&self) -> &ScriptKind {
        &self.kind
    }

    pub fn migration_info(&self) -> Option<&MigrationInfo> {
        match &self.kind {
            ScriptKind::Migration(info) => Some(info),
            ScriptKind::State => None,
        }
    }

    pub fn migration_info_mut(&mut self) -> Option<&mut MigrationInfo> {
        match &mut self.kind {
            ScriptKind::Migration(info) => Some(info),
            ScriptKind::State => None,
        }
    }

    pub fn version(&self) -> Option<u64> {
        self.migration_info().map(|m| m.version)
    }

    pub fn is_migration(&self) -> bool {
        matches!(self.kind, ScriptKind::Migration(_))
    }

    pub fn set_content(&mut self, content: &str) {
        self.content = content.trim().to_string();
    }

    pub fn set_database(&mut self, database: &str) {
        self.database = database.to_uppercase();
    }

    pub fn set_schema(&mut self, schema: &str) {
        self.schema = schema.to_uppercase();
    }

    /// `DATABASE.SCHEMA.OBJECT`
    pub fn full_object_name(&self) -> String {
        format!("{}.{}.{}", self.database, self.schema, self.object_name)
    }

    /// Identity used for hash bookkeeping
    pub fn id(&self) -> String {
        match &self.kind {
            ScriptKind::State => self.full_object_name(),
            ScriptKind::Migration(info) => format!("{}:{}", self.full_object_name(), info.version),
        }
    }
}

impl PartialEq for Script {
    fn eq(&self, other: &Self) -> bool {
        self.object_type == other.object_type && self.id() == other.id()
    }
}

impl Eq for Script {}

impl Hash for Script {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}

/// Companion test for a state script
#[derive(Debug, Clone)]
pub struct TestScript {
    subject: Script,
    content: String,
    path: Option<PathBuf>,
}

impl TestScript {
    pub fn new(subject: Script, content: &str) -> Self {
        Self {
            subject,
            content: content.trim().to_string(),
            path: None,
        }
    }

    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn subject(&self) -> &Script {
        &self.subject
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn id(&self) -> String {
        format!("{}_TEST", self.subject.id())
    }
}

impl fmt::Display for TestScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}
