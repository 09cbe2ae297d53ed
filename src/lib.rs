//! rust-schemasync: dependency-ordered deployment of database schema scripts
//!
//! This library reads a tree of object scripts, orders them by the
//! dependencies found in their SQL and syncs them to a database, tracking
//! what was deployed by content hash.

pub mod change;
pub mod dependency;
pub mod error;
pub mod model;
pub mod parser;
pub mod project;
pub mod repository;
pub mod util;

use std::path::{Path, PathBuf};

use anyhow::Result;

pub use change::{ChangeManager, TestOutcome, TestReport, VerifyReport};
pub use dependency::DependencyGraph;
pub use error::SchemaSyncError;
pub use model::{ObjectType, Script};
pub use parser::ParameterInjector;
pub use project::{Config, FileScriptSource, Project, ScriptSource};
pub use repository::{InMemoryRepository, ScriptRepository};

/// Name of the repository state file written next to the scripts
pub const DEFAULT_STATE_FILE: &str = ".schemasync-state.json";

/// Parameter (or connection key) naming the target database
const DATABASE_KEY: &str = "db";

/// Options for opening a script project
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Root of the script tree (holds `config.yaml` and parameter files)
    pub script_root: PathBuf,
    /// Parameter profile, e.g. "dev"
    pub profile: String,
    /// Repository state file (defaults to `<root>/.schemasync-state.json`)
    pub state_file: Option<PathBuf>,
}

impl SyncOptions {
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.script_root.join(DEFAULT_STATE_FILE))
    }
}

/// Change manager over the file tree and the file-backed repository
pub type FileChangeManager = ChangeManager<FileScriptSource, InMemoryRepository>;

/// Target database from the profile parameters, falling back to the
/// connection settings.
fn database_name(project: &Project) -> Result<String> {
    project
        .parameters
        .get(DATABASE_KEY)
        .or_else(|| project.config.connection.get(DATABASE_KEY))
        .cloned()
        .ok_or_else(|| {
            SchemaSyncError::InvalidConfig {
                message: format!(
                    "no '{}' parameter in profile '{}' and no '{}' connection setting",
                    DATABASE_KEY, project.profile, DATABASE_KEY
                ),
            }
            .into()
        })
}

/// Load the project at `options.script_root` and open its repository.
pub fn open_change_manager(options: &SyncOptions) -> Result<FileChangeManager> {
    let project = Project::load(&options.script_root, &options.profile)?;
    let database = database_name(&project)?;
    let state_path = options.state_path();
    tracing::info!(database = %database, state = %state_path.display(), "opening repository");

    let repository = InMemoryRepository::open(&database, &state_path)?;
    let source = project.script_source();
    let injector = ParameterInjector::new(project.parameters);
    Ok(ChangeManager::new(project.config, injector, source, repository))
}

/// Read every script under `root` and make sure the deployable set can be
/// sequenced. Returns the non-excluded scripts in deployment order.
pub fn check_project(root: &Path, config: &Config) -> Result<Vec<Script>> {
    let all = FileScriptSource::new(root).list_all_scripts()?;
    config.validate_overrides(&all)?;
    let scripts: Vec<Script> = all.into_iter().filter(|s| !config.is_excluded(s)).collect();
    tracing::info!(count = scripts.len(), "checking script dependencies");

    let mut graph = DependencyGraph::new(config.overrides_within(&scripts));
    graph.add_nodes(scripts)?;
    let ordered = graph.topological_sort()?;

    tracing::info!(count = ordered.len(), "all scripts can be sequenced");
    Ok(ordered)
}
