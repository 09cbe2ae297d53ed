//! Dependency inference and ordering

mod extractor;
mod graph;

pub use extractor::extract_dependencies;
pub use graph::DependencyGraph;
