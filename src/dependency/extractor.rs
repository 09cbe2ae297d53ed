//! Static dependency inference between scripts

use std::collections::BTreeSet;
use std::sync::LazyLock;

use rayon::prelude::*;
use regex::Regex;

use crate::model::{ObjectType, Script};
use crate::parser::{clean_sql, occurrences_in_clean};

/// Minimum pool size to benefit from a parallel candidate scan.
/// Below this threshold, sequential scanning is faster due to rayon overhead.
const PARALLEL_THRESHOLD: usize = 8;

static LANGUAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bLANGUAGE\s+(\w+)").unwrap());

/// Functions written in JavaScript, Python, Java, ... cannot reference other
/// database objects by name.
fn is_foreign_language_function(script: &Script, clean: &str) -> bool {
    script.object_type() == ObjectType::Functions
        && LANGUAGE_RE
            .captures(clean)
            .is_some_and(|caps| !caps[1].eq_ignore_ascii_case("SQL"))
}

/// Does `clean` (the subject's cleaned content) name `candidate`?
fn references(candidate: &Script, subject: &Script, clean: &str) -> bool {
    let target = candidate.full_object_name();
    occurrences_in_clean(candidate.object_name(), clean)
        .iter()
        .any(|name| name.resolve(subject.database(), subject.schema()) == target)
}

/// Indices into `pool` of the scripts `script` depends on.
///
/// A pool script is a dependency when the subject references it by name,
/// resolving unqualified parts against the subject's own database and
/// schema. A migration also depends on every earlier version of itself.
pub fn extract_dependencies(script: &Script, pool: &[Script]) -> BTreeSet<usize> {
    let own_name = script.full_object_name();
    let clean = clean_sql(script.content());

    let mut dependencies: BTreeSet<usize> = if is_foreign_language_function(script, &clean) {
        BTreeSet::new()
    } else if pool.len() >= PARALLEL_THRESHOLD {
        pool.par_iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.full_object_name() != own_name)
            .filter(|(_, candidate)| references(candidate, script, &clean))
            .map(|(i, _)| i)
            .collect()
    } else {
        pool.iter()
            .enumerate()
            .filter(|(_, candidate)| candidate.full_object_name() != own_name)
            .filter(|(_, candidate)| references(candidate, script, &clean))
            .map(|(i, _)| i)
            .collect()
    };

    if let Some(version) = script.version() {
        dependencies.extend(
            pool.iter()
                .enumerate()
                .filter(|(_, candidate)| {
                    candidate.object_type() == script.object_type()
                        && candidate.full_object_name() == own_name
                        && candidate.version().is_some_and(|v| v < version)
                })
                .map(|(i, _)| i),
        );
    }

    tracing::trace!(script = %script, count = dependencies.len(), "extracted dependencies");
    dependencies
}
