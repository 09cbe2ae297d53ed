//! Script tree on disk
//!
//! ```text
//! <root>/main/<DB>/<SCHEMA>/<TYPE>/<NAME>.sql
//! <root>/test/<DB>/<SCHEMA>/<TYPE>/<NAME>_TEST.sql
//! ```
//!
//! `main/` is optional; without it the database directories sit directly
//! under the root.

use std::path::{Path, PathBuf};

use anyhow::Result;
use encoding_rs::WINDOWS_1252;
use walkdir::{DirEntry, WalkDir};

use crate::error::SchemaSyncError;
use crate::model::{ObjectType, Script, TestScript};
use crate::parser::{first_qualified_occurrence, split_migration_units};

/// Where scripts are read from and written to
pub trait ScriptSource {
    /// Every script in the source, migration files expanded to one script
    /// per version
    fn list_all_scripts(&self) -> Result<Vec<Script>>;

    /// Companion tests of `scripts`; scripts without one are skipped
    fn list_test_scripts_for(&self, scripts: &[Script]) -> Result<Vec<TestScript>>;

    /// Persist scripts at their canonical location
    fn write_scripts(&self, scripts: &[Script]) -> Result<()>;
}

/// Read a file as UTF-8, falling back to Windows-1252
fn read_file_with_encoding_fallback(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(err) => {
            let bytes = err.into_bytes();
            let (decoded, _, had_errors) = WINDOWS_1252.decode(&bytes);
            if had_errors {
                Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    "File contains invalid characters",
                ))
            } else {
                Ok(decoded.into_owned())
            }
        }
    }
}

fn is_sql_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("sql"))
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry.depth() > 0 && entry.file_name().to_str().is_some_and(|name| name.starts_with('.'))
}

/// Script source backed by a directory tree
#[derive(Debug, Clone)]
pub struct FileScriptSource {
    main_dir: PathBuf,
    test_dir: PathBuf,
}

impl FileScriptSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let main = root.join("main");
        let main_dir = if main.is_dir() { main } else { root.clone() };
        tracing::debug!(root = %root.display(), main = %main_dir.display(), "script source initialized");
        Self {
            main_dir,
            test_dir: root.join("test"),
        }
    }

    pub fn main_dir(&self) -> &Path {
        &self.main_dir
    }

    pub fn test_dir(&self) -> &Path {
        &self.test_dir
    }

    /// Build the scripts defined by one file
    fn read_script_file(&self, path: &Path, object_type: ObjectType) -> Result<Vec<Script>> {
        let content = read_file_with_encoding_fallback(path).map_err(|e| SchemaSyncError::ScriptReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let object_name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(str::to_uppercase)
            .ok_or_else(|| SchemaSyncError::InvalidScriptPath {
                path: path.to_path_buf(),
                message: "file name is not valid UTF-8".to_string(),
            })?;

        let qualified = first_qualified_occurrence(&object_name, &content).ok_or_else(|| {
            tracing::error!(path = %path.display(), "object name and file name mismatch");
            SchemaSyncError::InvalidScriptPath {
                path: path.to_path_buf(),
                message: format!("{} is not defined in the file", object_name),
            }
        })?;
        let (database, schema) = match (qualified.database, qualified.schema) {
            (Some(database), Some(schema)) => (database, schema),
            _ => {
                tracing::error!(path = %path.display(), "database or schema not specified");
                return Err(SchemaSyncError::InvalidScriptPath {
                    path: path.to_path_buf(),
                    message: "database, schema and object name must be provided".to_string(),
                }
                .into());
            }
        };

        if !object_type.is_migration() {
            let script = Script::state(&database, &schema, object_type, &object_name, &content).with_path(path);
            return Ok(vec![script]);
        }

        let units = split_migration_units(&content).inspect_err(|e| {
            tracing::error!(path = %path.display(), error = %e, "invalid migration file");
        })?;
        Ok(units
            .into_iter()
            .map(|unit| Script::migration(&database, &schema, object_type, &object_name, unit).with_path(path))
            .collect())
    }

    /// Path of the companion test for a script read from `script_path`
    fn test_path_for(&self, script_path: &Path) -> Option<PathBuf> {
        let relative = script_path.strip_prefix(&self.main_dir).ok()?;
        let stem = relative.file_stem()?.to_str()?;
        let extension = relative.extension().and_then(|e| e.to_str()).unwrap_or("sql");
        let file_name = format!("{}_TEST.{}", stem, extension);
        Some(self.test_dir.join(relative).with_file_name(file_name))
    }

    /// Canonical location of a script
    pub fn script_path(&self, script: &Script) -> PathBuf {
        self.main_dir
            .join(script.database())
            .join(script.schema())
            .join(script.object_type().dir_name())
            .join(format!("{}.SQL", script.object_name()))
    }
}

impl ScriptSource for FileScriptSource {
    fn list_all_scripts(&self) -> Result<Vec<Script>> {
        if !self.main_dir.is_dir() {
            tracing::error!(path = %self.main_dir.display(), "invalid script source path");
            return Err(SchemaSyncError::InvalidScriptPath {
                path: self.main_dir.clone(),
                message: "script root does not exist".to_string(),
            }
            .into());
        }

        let mut scripts = Vec::new();
        let walker = WalkDir::new(&self.main_dir)
            .min_depth(1)
            .max_depth(4)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !is_hidden(e) && e.path() != self.test_dir);

        for entry in walker {
            let entry = entry.map_err(|e| {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| self.main_dir.clone());
                SchemaSyncError::ScriptReadError {
                    path,
                    source: e.into(),
                }
            })?;
            let path = entry.path();

            match entry.depth() {
                1 if entry.file_type().is_dir() => {
                    tracing::info!(database = %entry.file_name().to_string_lossy(), "reading database");
                }
                // config and parameter files live next to the database directories
                1 => {}
                2 | 3 if !entry.file_type().is_dir() => {
                    tracing::warn!(path = %path.display(), "script file found outside object type directory");
                }
                2 => tracing::debug!(schema = %entry.file_name().to_string_lossy(), "reading schema"),
                3 if entry.file_type().is_dir() => {
                    let type_name = entry.file_name().to_string_lossy();
                    if ObjectType::from_dir_name(&type_name).is_none() {
                        return Err(SchemaSyncError::UnknownObjectType {
                            name: type_name.to_string(),
                        }
                        .into());
                    }
                }
                4 if entry.file_type().is_file() => {
                    if !is_sql_file(path) {
                        tracing::warn!(path = %path.display(), "script skipped, file not SQL");
                        continue;
                    }
                    let type_name = path
                        .parent()
                        .and_then(Path::file_name)
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    let object_type = ObjectType::from_dir_name(&type_name)
                        .ok_or(SchemaSyncError::UnknownObjectType { name: type_name })?;
                    scripts.extend(self.read_script_file(path, object_type)?);
                }
                _ => {}
            }
        }

        tracing::info!(count = scripts.len(), "read scripts from source");
        Ok(scripts)
    }

    fn list_test_scripts_for(&self, scripts: &[Script]) -> Result<Vec<TestScript>> {
        let mut tests = Vec::new();
        for script in scripts {
            let Some(test_path) = script.path().and_then(|p| self.test_path_for(p)) else {
                continue;
            };
            if !test_path.is_file() {
                continue;
            }
            tracing::info!(path = %test_path.display(), "test script file found");
            let content = read_file_with_encoding_fallback(&test_path).map_err(|e| SchemaSyncError::ScriptReadError {
                path: test_path.clone(),
                source: e,
            })?;
            tests.push(TestScript::new(script.clone(), &content).with_path(test_path));
        }
        Ok(tests)
    }

    fn write_scripts(&self, scripts: &[Script]) -> Result<()> {
        for script in scripts {
            let path = self.script_path(script);
            let write = |path: &Path| -> std::io::Result<()> {
                if let Some(dir) = path.parent() {
                    std::fs::create_dir_all(dir)?;
                }
                std::fs::write(path, script.content())
            };
            write(&path).map_err(|e| {
                tracing::error!(path = %path.display(), error = %e, "error creating script file");
                SchemaSyncError::ScriptWriteError {
                    path: path.clone(),
                    source: e,
                }
            })?;
            tracing::debug!(path = %path.display(), "script file created");
        }
        Ok(())
    }
}
