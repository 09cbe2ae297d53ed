//! Dependency DAG and deterministic topological sort

use std::collections::BTreeSet;

use crate::error::{SchemaSyncError, StuckScript};
use crate::model::{Script, ScriptDependency};
use crate::project::DependencyOverride;

use super::extractor::extract_dependencies;

/// Scripts arranged by their inferred and configured dependencies.
///
/// Nodes live in an arena and are referred to by their index. Forward edges
/// point from a dependency to the scripts that need it.
#[derive(Debug, Default)]
pub struct DependencyGraph {
    nodes: Vec<Script>,
    /// dependency -> dependents
    dependents: Vec<BTreeSet<usize>>,
    /// dependent -> dependencies
    dependencies: Vec<BTreeSet<usize>>,
    in_degree: Vec<usize>,
    /// Zero in-degree nodes, popped from the back
    ready: Vec<usize>,
    overrides: Vec<DependencyOverride>,
}

impl DependencyGraph {
    pub fn new(overrides: Vec<DependencyOverride>) -> Self {
        Self {
            overrides,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: usize) -> &Script {
        &self.nodes[index]
    }

    pub fn nodes(&self) -> &[Script] {
        &self.nodes
    }

    /// Indices of the scripts `index` depends on
    pub fn dependencies_of(&self, index: usize) -> &BTreeSet<usize> {
        &self.dependencies[index]
    }

    /// Add scripts to the graph and wire them to every node already present.
    pub fn add_nodes(&mut self, scripts: Vec<Script>) -> Result<(), SchemaSyncError> {
        tracing::info!(count = scripts.len(), "building dependency graph");
        let first_new = self.nodes.len();
        self.nodes.extend(scripts);
        self.dependencies.resize_with(self.nodes.len(), BTreeSet::new);

        for index in first_new..self.nodes.len() {
            let found = extract_dependencies(&self.nodes[index], &self.nodes);
            self.dependencies[index].extend(found);
        }
        // Earlier nodes may depend on the ones just added
        if first_new > 0 {
            let (old, new) = self.nodes.split_at(first_new);
            for (index, script) in old.iter().enumerate() {
                let found = extract_dependencies(script, new);
                self.dependencies[index].extend(found.into_iter().map(|i| i + first_new));
            }
        }

        for index in 0..self.nodes.len() {
            let extra = self.override_targets(index)?;
            self.dependencies[index].extend(extra);
        }

        self.rebuild_edges();
        tracing::debug!(nodes = self.nodes.len(), ready = self.ready.len(), "dependency graph built");
        Ok(())
    }

    /// Nodes named as configured dependencies of node `index`
    fn override_targets(&self, index: usize) -> Result<Vec<usize>, SchemaSyncError> {
        let name = self.nodes[index].full_object_name();
        let mut targets = Vec::new();
        for dependency_override in self
            .overrides
            .iter()
            .filter(|o| o.script.eq_ignore_ascii_case(&name))
        {
            for dependency in &dependency_override.dependencies {
                let matched: Vec<usize> = self
                    .nodes
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| s.full_object_name().eq_ignore_ascii_case(dependency))
                    .map(|(i, _)| i)
                    .collect();
                if matched.is_empty() {
                    return Err(SchemaSyncError::UnresolvedOverride {
                        script: dependency_override.script.clone(),
                        dependency: dependency.clone(),
                    });
                }
                targets.extend(matched.into_iter().filter(|&i| i != index));
            }
        }
        Ok(targets)
    }

    fn rebuild_edges(&mut self) {
        let count = self.nodes.len();
        self.dependents = vec![BTreeSet::new(); count];
        for (dependent, deps) in self.dependencies.iter().enumerate() {
            for &dependency in deps {
                self.dependents[dependency].insert(dependent);
            }
        }
        self.in_degree = self.dependencies.iter().map(BTreeSet::len).collect();
        // Reverse order so the first added ready node is popped first
        self.ready = (0..count).rev().filter(|&i| self.in_degree[i] == 0).collect();
    }

    /// Node indices in dependency order (Kahn's algorithm).
    ///
    /// Fails with every script left unsorted when the graph has a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>, SchemaSyncError> {
        let mut in_degree = self.in_degree.clone();
        let mut ready = self.ready.clone();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(current) = ready.pop() {
            order.push(current);
            for &dependent in self.dependents[current].iter().rev() {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push(dependent);
                }
            }
        }

        if order.len() != self.nodes.len() {
            let sorted: BTreeSet<usize> = order.iter().copied().collect();
            let stuck: Vec<StuckScript> = (0..self.nodes.len())
                .filter(|i| !sorted.contains(i))
                .map(|i| StuckScript {
                    id: self.nodes[i].id(),
                    unresolved: self.dependencies[i]
                        .iter()
                        .filter(|d| !sorted.contains(d))
                        .map(|&d| self.nodes[d].id())
                        .collect(),
                })
                .collect();
            tracing::error!(
                input = self.nodes.len(),
                sorted = order.len(),
                "cyclic dependency detected"
            );
            return Err(SchemaSyncError::CyclicDependency { stuck });
        }

        tracing::debug!(count = order.len(), "sorted scripts");
        Ok(order)
    }

    /// Consume the graph, returning its scripts in dependency order.
    pub fn topological_sort(self) -> Result<Vec<Script>, SchemaSyncError> {
        let order = self.topological_order()?;
        let mut slots: Vec<Option<Script>> = self.nodes.into_iter().map(Some).collect();
        Ok(order.into_iter().filter_map(|i| slots[i].take()).collect())
    }

    /// Distinct object-level edges, without the links between versions of
    /// the same migration object.
    pub fn dependency_list(&self) -> Vec<ScriptDependency> {
        let mut edges = BTreeSet::new();
        for (index, deps) in self.dependencies.iter().enumerate() {
            let node = &self.nodes[index];
            for &dependency in deps {
                let dependency = &self.nodes[dependency];
                if dependency.full_object_name() != node.full_object_name() {
                    edges.insert(ScriptDependency::new(node, dependency));
                }
            }
        }
        edges.into_iter().collect()
    }
}
