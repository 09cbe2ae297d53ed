//! Script project: configuration, profile parameters and the script tree

mod config;
mod parameters;
mod script_source;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

pub use config::{Config, DependencyOverride};
pub use parameters::{load_parameters, parameter_file_path, parse_properties, DEFAULT_PROFILE};
pub use script_source::{FileScriptSource, ScriptSource};

/// Name of the configuration file at the script root
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Everything loaded from a script root for one profile
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub profile: String,
    pub config: Config,
    pub parameters: BTreeMap<String, String>,
}

impl Project {
    /// Load `config.yaml` (optional) and the profile's parameter file
    /// (required) from `root`.
    pub fn load(root: &Path, profile: &str) -> Result<Self> {
        let profile = profile.to_lowercase();
        let config_path = root.join(CONFIG_FILE_NAME);
        let config = if config_path.is_file() {
            Config::load(&config_path)?
        } else {
            tracing::debug!(path = %config_path.display(), "no config file, using defaults");
            Config::default()
        };
        let parameters = load_parameters(root, &profile)?;

        tracing::info!(root = %root.display(), profile = %profile, "loaded project");
        Ok(Self {
            root: root.to_path_buf(),
            profile,
            config,
            parameters,
        })
    }

    pub fn script_source(&self) -> FileScriptSource {
        FileScriptSource::new(&self.root)
    }
}
