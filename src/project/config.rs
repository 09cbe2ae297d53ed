//! `config.yaml` loading

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::error::SchemaSyncError;
use crate::model::Script;

/// Extra edges for dependencies the extractor cannot see (dynamic SQL,
/// procedure calls, ...). Names are `DB.SCHEMA.OBJECT` and may carry
/// parameter placeholders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyOverride {
    pub script: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
}

/// Project configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Full object names (`DB.SCHEMA.OBJECT`) that are never deployed,
    /// verified or tested
    pub script_exclusion: Vec<String>,
    pub dependency_override: Vec<DependencyOverride>,
    /// Tables whose rows are exported as data migrations by create-scripts
    pub config_tables: Vec<String>,
    /// Keep deploying independent scripts after a failure
    pub continue_on_failure: bool,
    /// Connection properties handed to the repository
    pub connection: BTreeMap<String, String>,
}

impl Config {
    /// Load a config file. Connection keys are overridden by environment
    /// variables of the same name.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SchemaSyncError::ConfigReadError {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config = Self::parse(&content).map_err(|e| SchemaSyncError::ConfigParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        for (key, value) in config.connection.iter_mut() {
            if let Ok(env_value) = std::env::var(key) {
                *value = env_value;
            }
        }

        tracing::debug!(
            path = %path.display(),
            exclusions = config.script_exclusion.len(),
            overrides = config.dependency_override.len(),
            "loaded config"
        );
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, serde_yaml::Error> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content)
    }

    /// Whether the script's object is listed in `scriptExclusion`
    pub fn is_excluded(&self, script: &Script) -> bool {
        let name = script.full_object_name();
        self.script_exclusion
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(&name))
    }

    /// Every override must name scripts that exist in `scripts`
    pub fn validate_overrides(&self, scripts: &[Script]) -> Result<(), SchemaSyncError> {
        let names: BTreeSet<String> = scripts.iter().map(Script::full_object_name).collect();
        let known = |name: &str| names.contains(&name.to_uppercase());
        for dependency_override in &self.dependency_override {
            let unknown = std::iter::once(&dependency_override.script)
                .chain(&dependency_override.dependencies)
                .find(|name| !known(name.as_str()));
            if let Some(unknown) = unknown {
                tracing::error!(script = %dependency_override.script, dependency = %unknown, "invalid dependency override");
                return Err(SchemaSyncError::UnresolvedOverride {
                    script: dependency_override.script.clone(),
                    dependency: unknown.clone(),
                });
            }
        }
        Ok(())
    }

    /// Overrides restricted to edges between `scripts`
    pub fn overrides_within(&self, scripts: &[Script]) -> Vec<DependencyOverride> {
        let names: BTreeSet<String> = scripts.iter().map(Script::full_object_name).collect();
        self.dependency_override
            .iter()
            .filter(|o| names.contains(&o.script.to_uppercase()))
            .map(|o| DependencyOverride {
                script: o.script.clone(),
                dependencies: o
                    .dependencies
                    .iter()
                    .filter(|d| names.contains(&d.to_uppercase()))
                    .cloned()
                    .collect(),
            })
            .collect()
    }
}
