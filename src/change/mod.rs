//! Deployment orchestration
//!
//! [`ChangeManager`] walks the dependency-sorted script set for each
//! operation. Every public operation is bracketed by one change-sync start
//! record and one terminal SUCCESS or ERROR record.

mod report;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::Result;

use crate::dependency::DependencyGraph;
use crate::error::SchemaSyncError;
use crate::model::{ChangeType, ObjectType, Script, SyncStatus, TestResult, TestScript};
use crate::parser::{generate_test_query, scripts_equivalent, ParameterInjector};
use crate::project::{Config, ScriptSource};
use crate::repository::{append_config_data, ScriptRepository};

pub use report::{TestOutcome, TestReport, VerifyReport};

/// Runs deploy, rollback, verify and the other operations against a script
/// source and a repository.
pub struct ChangeManager<S: ScriptSource, R: ScriptRepository> {
    config: Config,
    injector: ParameterInjector,
    source: S,
    repository: R,
}

impl<S: ScriptSource, R: ScriptRepository> ChangeManager<S, R> {
    pub fn new(config: Config, injector: ParameterInjector, source: S, repository: R) -> Self {
        Self {
            config,
            injector,
            source,
            repository,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn repository_mut(&mut self) -> &mut R {
        &mut self.repository
    }

    pub fn into_repository(self) -> R {
        self.repository
    }

    /// Record the start of `change_type`, run `op` and record its outcome.
    /// `op` returns its result and the change count.
    fn bracketed<T>(
        &mut self,
        change_type: ChangeType,
        op: impl FnOnce(&mut Self) -> Result<(T, u64)>,
    ) -> Result<T> {
        self.repository
            .record_sync_start(change_type, &format!("{} started.", change_type))?;
        match op(self) {
            Ok((value, count)) => {
                self.repository.record_sync_end(
                    change_type,
                    SyncStatus::Success,
                    &format!("Successfully completed {}", change_type),
                    Some(count),
                )?;
                Ok(value)
            }
            Err(err) => {
                self.repository
                    .record_sync_end(change_type, SyncStatus::Error, &err.to_string(), None)?;
                Err(err)
            }
        }
    }

    fn injected(&self, script: &Script) -> Script {
        let mut script = script.clone();
        self.injector.inject_script(&mut script);
        script
    }

    /// Source scripts that differ from their recorded hash, as a graph
    fn changed_graph(&mut self) -> Result<DependencyGraph> {
        self.repository.load_deployed_hashes()?;
        let all = self.source.list_all_scripts()?;
        self.config.validate_overrides(&all)?;

        let changed: Vec<Script> = all
            .into_iter()
            .filter(|s| !self.config.is_excluded(s))
            .filter(|s| self.repository.is_changed(s))
            .collect();

        let mut graph = DependencyGraph::new(self.config.overrides_within(&changed));
        graph.add_nodes(changed)?;
        Ok(graph)
    }

    /// Deployed migrations can never change
    fn validate_migrations(&self, graph: &DependencyGraph) -> Result<()> {
        for script in graph.nodes() {
            if script.is_migration() && self.repository.is_version_deployed(script) {
                tracing::error!(script = %script, "migration script changed since it was deployed");
                return Err(SchemaSyncError::ImmutableMigration { id: script.id() }.into());
            }
        }
        Ok(())
    }

    /// Changed scripts in deployment order, without touching the database
    pub fn plan(&mut self) -> Result<Vec<Script>> {
        let graph = self.changed_graph()?;
        self.validate_migrations(&graph)?;
        Ok(graph.topological_sort()?)
    }

    /// Deploy every changed script in dependency order. With `only_hashes`,
    /// hashes are recorded without executing anything.
    pub fn deploy(&mut self, only_hashes: bool) -> Result<usize> {
        tracing::info!(only_hashes, "started deploying");
        self.bracketed(ChangeType::Deploy, |this| {
            let deployed = this.deploy_changed(only_hashes)?;
            Ok((deployed, deployed as u64))
        })
    }

    fn deploy_changed(&mut self, only_hashes: bool) -> Result<usize> {
        let graph = self.changed_graph()?;
        let order = graph.topological_order()?;
        self.validate_migrations(&graph)?;

        let size = order.len();
        tracing::info!(count = size, "deploying change scripts");
        let mut blocked: BTreeSet<usize> = BTreeSet::new();
        let mut failed = Vec::new();
        let mut deployed = 0;

        for (step, &index) in order.iter().enumerate() {
            let source = graph.node(index);
            if let Some(&cause) = graph.dependencies_of(index).iter().find(|d| blocked.contains(d)) {
                tracing::warn!(script = %source, dependency = %graph.node(cause), "skipped, dependency failed");
                blocked.insert(index);
                continue;
            }

            tracing::info!("{} of {}: deploying object {}", step + 1, size, source);
            let script = self.injected(source);
            match self.repository.create_or_replace(&script, only_hashes) {
                Ok(()) => deployed += 1,
                Err(err) if self.config.continue_on_failure => {
                    tracing::error!(script = %source, error = %err, "deploy failed, continuing with independent scripts");
                    blocked.insert(index);
                    failed.push(source.id());
                }
                Err(err) => return Err(err),
            }
        }

        if !failed.is_empty() {
            return Err(SchemaSyncError::DeployIncomplete { failed }.into());
        }
        Ok(deployed)
    }

    /// Undo deployed migrations that left the source and restore changed
    /// state objects from source, in reverse dependency order.
    pub fn rollback(&mut self) -> Result<usize> {
        tracing::info!("starting rollback");
        self.bracketed(ChangeType::Rollback, |this| {
            let count = this.rollback_changed()?;
            Ok((count, count as u64))
        })
    }

    fn rollback_changed(&mut self) -> Result<usize> {
        let mut removed = self.repository.load_deployed_hashes()?;
        let all = self.source.list_all_scripts()?;
        self.config.validate_overrides(&all)?;
        for script in &all {
            removed.remove(&script.id());
        }
        let migrations = self.repository.load_migration_history(&removed)?;

        let changed: Vec<Script> = all
            .into_iter()
            .filter(|s| !self.config.is_excluded(s))
            .filter(|s| !s.object_type().is_migration())
            .filter(|s| self.repository.is_changed(s))
            .collect();

        let mut involved = migrations.clone();
        involved.extend(changed.iter().cloned());
        let mut graph = DependencyGraph::new(self.config.overrides_within(&involved));
        graph.add_nodes(migrations)?;
        graph.add_nodes(changed)?;
        let sequence = graph.topological_sort()?;

        let size = sequence.len();
        for (step, source) in sequence.iter().rev().enumerate() {
            tracing::info!("{} of {}: rolling back object {}", step + 1, size, source);
            let script = self.injected(source);
            if script.is_migration() {
                self.repository.execute_rollback(&script)?;
            } else {
                self.repository.create_or_replace(&script, false)?;
            }
        }
        Ok(size)
    }

    /// Compare live state objects with source and run the verify statement
    /// of the latest version of every migration object.
    pub fn verify(&mut self) -> Result<VerifyReport> {
        tracing::info!("started verify");
        self.bracketed(ChangeType::Verify, |this| {
            let report = this.verify_all()?;
            let checked = report.checked as u64;
            Ok((report, checked))
        })
    }

    fn verify_all(&mut self) -> Result<VerifyReport> {
        self.repository.load_deployed_hashes()?;
        let sources: Vec<Script> = self
            .source
            .list_all_scripts()?
            .into_iter()
            .filter(|s| !self.config.is_excluded(s))
            .collect();
        let mut report = VerifyReport::default();

        for schema in self.repository.list_schemas()? {
            for mut live in self.repository.list_live_objects(&schema)? {
                if live.is_migration() || self.config.is_excluded(&live) {
                    continue;
                }
                self.injector.parametrize_script(&mut live, true);
                if self.config.is_excluded(&live) {
                    continue;
                }
                report.checked += 1;
                match sources.iter().find(|s| **s == live) {
                    None => {
                        tracing::error!(script = %live, "script is not found in source");
                        report.failures.push(live.id());
                    }
                    Some(source) if !scripts_equivalent(&live, source) => {
                        tracing::error!(script = %live, live = %live.content(), "source script differs from database object");
                        report.failures.push(live.id());
                    }
                    Some(_) => tracing::info!(script = %live, "verified"),
                }
            }
        }

        let mut latest: BTreeMap<(ObjectType, String), &Script> = BTreeMap::new();
        for script in sources.iter().filter(|s| s.is_migration()) {
            let key = (script.object_type(), script.full_object_name());
            let newer = latest.get(&key).map_or(true, |current| script.version() > current.version());
            if newer {
                latest.insert(key, script);
            }
        }
        for source in latest.into_values() {
            report.checked += 1;
            let script = self.injected(source);
            if self.repository.execute_verify(&script)? {
                tracing::info!(script = %script, "verified");
            } else {
                tracing::error!(
                    script = %script,
                    verify = script.migration_info().and_then(|m| m.verify.as_deref()).unwrap_or_default(),
                    "verify statement failed"
                );
                report.failures.push(script.id());
            }
        }

        if !report.failures.is_empty() {
            tracing::error!(failed = report.failures.len(), "verification failed");
            return Err(SchemaSyncError::VerificationFailed {
                failed: report.failures.len(),
            }
            .into());
        }
        tracing::info!(checked = report.checked, "all scripts verified");
        Ok(report)
    }

    /// Write the live objects of `target_schemas` (or of every schema) to the
    /// script source, templated with the profile parameters.
    pub fn create_scripts_from_db(&mut self, target_schemas: Option<&[String]>) -> Result<usize> {
        tracing::info!("started create scripts");
        self.bracketed(ChangeType::CreateScript, |this| {
            let count = this.export_schemas(target_schemas)?;
            Ok((count, count as u64))
        })
    }

    fn export_schemas(&mut self, target_schemas: Option<&[String]>) -> Result<usize> {
        let config_tables: BTreeSet<String> = self
            .injector
            .inject_names(&self.config.config_tables)
            .into_iter()
            .map(|name| name.to_uppercase())
            .collect();
        let schemas = match target_schemas {
            Some(schemas) => schemas.iter().map(|s| s.trim().to_uppercase()).collect(),
            None => self.repository.list_schemas()?,
        };

        let mut count = 0;
        for schema in schemas {
            let mut scripts = self.repository.list_live_objects(&schema)?;
            for script in scripts.iter_mut() {
                if config_tables.contains(&script.full_object_name()) {
                    let rows = self.repository.config_table_rows(&script.full_object_name())?;
                    tracing::debug!(table = %script, rows = rows.len(), "exporting config table data");
                    append_config_data(script, &rows);
                }
                self.injector.parametrize_script(script, true);
            }
            count += scripts.len();
            self.source.write_scripts(&scripts)?;
            tracing::info!(schema = %schema, count = scripts.len(), "created scripts");
        }
        Ok(count)
    }

    /// Persist the object-level dependency edges of every source script,
    /// configured overrides included.
    pub fn create_lineage(&mut self) -> Result<usize> {
        tracing::info!("started lineage graph");
        self.bracketed(ChangeType::CreateLineage, |this| {
            let all = this.source.list_all_scripts()?;
            this.config.validate_overrides(&all)?;
            let mut graph = DependencyGraph::new(this.config.overrides_within(&all));
            graph.add_nodes(all)?;
            let edges = graph.dependency_list();
            this.repository.insert_lineage(&edges)?;
            Ok((edges.len(), edges.len() as u64))
        })
    }

    /// Run the companion test of every state script that has one.
    pub fn test(&mut self) -> Result<TestReport> {
        tracing::info!("started test module");
        self.bracketed(ChangeType::Test, |this| {
            let report = this.run_tests()?;
            let count = report.outcomes.len() as u64;
            Ok((report, count))
        })
    }

    fn run_tests(&mut self) -> Result<TestReport> {
        let scripts: Vec<Script> = self
            .source
            .list_all_scripts()?
            .iter()
            .filter(|s| !self.config.is_excluded(s))
            .filter(|s| !s.object_type().is_migration())
            .map(|s| self.injected(s))
            .collect();
        let tests = self.source.list_test_scripts_for(&scripts)?;

        let size = tests.len();
        let mut report = TestReport::default();
        for (step, test) in tests.into_iter().enumerate() {
            tracing::info!("{} of {}: testing object {}", step + 1, size, test);
            let content = self.injector.inject(test.content());
            let mut injected = TestScript::new(test.subject().clone(), &content);
            if let Some(path) = test.path() {
                injected = injected.with_path(path);
            }
            let test = injected;

            let results = match generate_test_query(&test) {
                Ok(query) => {
                    tracing::debug!(test = %test, query = %query, "testing query");
                    self.repository.run_test_query(&test, &query)?
                }
                Err(err) => {
                    tracing::error!(test = %test, error = %err, "cannot build test query");
                    vec![TestResult::from_error(err.to_string())]
                }
            };

            if results.is_empty() {
                tracing::info!(test = %test, "test passed");
            } else {
                let summary = results.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("; ");
                tracing::error!(test = %test, results = %summary, "test failed");
            }
            report.outcomes.push(TestOutcome {
                test_id: test.id(),
                results,
            });
        }
        Ok(report)
    }

    /// Names of live objects that have no script in source. Findings are
    /// logged; the operation itself never fails on them.
    pub fn cleanup(&mut self) -> Result<Vec<String>> {
        tracing::info!("started cleanup module");
        self.bracketed(ChangeType::Cleanup, |this| {
            let live = this.repository.list_live_object_names()?;
            let known: BTreeSet<String> = this
                .source
                .list_all_scripts()?
                .iter()
                .map(Script::full_object_name)
                .collect();

            let missing: Vec<String> = live
                .iter()
                .map(|name| this.injector.parametrize_object_name(name).to_uppercase())
                .filter(|name| !known.contains(name))
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect();

            if missing.is_empty() {
                tracing::info!("no missing objects found");
            } else {
                tracing::warn!(count = missing.len(), "objects missing from script source");
                for name in &missing {
                    tracing::warn!("  - {}", name);
                }
            }
            let count = live.len() as u64;
            Ok((missing, count))
        })
    }
}
