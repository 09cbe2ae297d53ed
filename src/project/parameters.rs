//! Profile parameter files (`parameter-<profile>.properties`)

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Result;

use crate::error::SchemaSyncError;

/// Profile used when none is given
pub const DEFAULT_PROFILE: &str = "dev";

/// Location of the parameter file for `profile` under the script root
pub fn parameter_file_path(root: &Path, profile: &str) -> PathBuf {
    root.join(format!("parameter-{}.properties", profile.to_lowercase()))
}

/// Parse `key=value` / `key: value` lines. `#` and `!` start comment lines;
/// later keys win.
pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .filter_map(|line| {
            let split = line.find(['=', ':'])?;
            let key = line[..split].trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), line[split + 1..].trim().to_string()))
        })
        .collect()
}

/// Load the parameters of `profile`. Environment variables replace the
/// value of keys that already exist in the file.
pub fn load_parameters(root: &Path, profile: &str) -> Result<BTreeMap<String, String>> {
    let path = parameter_file_path(root, profile);
    let content = std::fs::read_to_string(&path).map_err(|e| SchemaSyncError::ParameterFileError {
        path: path.clone(),
        source: e,
    })?;

    let mut parameters = parse_properties(&content);
    for (key, value) in parameters.iter_mut() {
        if let Ok(env_value) = std::env::var(key) {
            tracing::debug!(key = %key, "parameter overridden from environment");
            *value = env_value;
        }
    }

    tracing::debug!(path = %path.display(), count = parameters.len(), "loaded parameters");
    Ok(parameters)
}
