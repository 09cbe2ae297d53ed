//! `${name}` placeholder injection and its inverse

use std::collections::{BTreeMap, BTreeSet};

use crate::model::Script;
use crate::util::find_ci_from;

/// Characters allowed immediately before a parametrized value
fn is_value_start_boundary(b: u8) -> bool {
    matches!(b, b'(' | b')' | b',' | b'.' | b'\'' | b'"' | b'@') || b.is_ascii_whitespace()
}

/// Characters allowed immediately after a parametrized value
fn is_value_end_boundary(b: u8) -> bool {
    matches!(b, b'(' | b')' | b',' | b';' | b'.' | b'\'' | b'"') || b.is_ascii_whitespace()
}

/// Replace every case-insensitive occurrence of `needle` with `replacement`.
/// With `bounded`, only occurrences delimited by value boundaries are replaced.
fn replace_ci(text: &str, needle: &str, replacement: &str, bounded: bool) -> String {
    let bytes = text.as_bytes();
    let mut out = String::with_capacity(text.len());
    let mut kept_from = 0;
    let mut from = 0;

    while let Some(pos) = find_ci_from(text, needle, from) {
        let end = pos + needle.len();
        let accepted = !bounded
            || ((pos == 0 || is_value_start_boundary(bytes[pos - 1]))
                && (end == bytes.len() || is_value_end_boundary(bytes[end])));
        if accepted {
            out.push_str(&text[kept_from..pos]);
            out.push_str(replacement);
            kept_from = end;
            from = end;
        } else {
            from = pos + 1;
        }
    }

    out.push_str(&text[kept_from..]);
    out
}

/// Substitutes profile parameters into scripts and templates live DDL back.
#[derive(Debug, Clone, Default)]
pub struct ParameterInjector {
    parameters: BTreeMap<String, String>,
}

impl ParameterInjector {
    pub fn new(parameters: BTreeMap<String, String>) -> Self {
        tracing::debug!(count = parameters.len(), "parameter injector initialized");
        Self { parameters }
    }

    pub fn parameters(&self) -> &BTreeMap<String, String> {
        &self.parameters
    }

    fn placeholder(name: &str) -> String {
        format!("${{{}}}", name)
    }

    /// Replace every `${name}` placeholder (any case) with its value.
    pub fn inject(&self, content: &str) -> String {
        self.parameters
            .iter()
            .fold(content.to_string(), |text, (name, value)| {
                replace_ci(&text, &Self::placeholder(name), value, false)
            })
    }

    /// Inject content plus the rollback and verify statements of migrations.
    pub fn inject_script(&self, script: &mut Script) {
        let injected = self.inject(script.content());
        script.set_content(&injected);
        if let Some(info) = script.migration_info_mut() {
            info.rollback = info.rollback.as_deref().map(|r| self.inject(r));
            info.verify = info.verify.as_deref().map(|v| self.inject(v));
        }
        tracing::trace!(script = %script, "parameters injected");
    }

    /// Replace token-bounded parameter values with their placeholders.
    ///
    /// Parameters are applied in name order so overlapping values resolve the
    /// same way every time.
    pub fn parametrize(&self, content: &str) -> String {
        self.parameters
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .fold(content.to_string(), |text, (name, value)| {
                replace_ci(&text, value, &Self::placeholder(name), true)
            })
    }

    fn parametrize_segment(&self, segment: &str) -> String {
        self.parameters
            .iter()
            .filter(|(_, value)| !value.is_empty())
            .fold(segment.to_string(), |text, (name, value)| {
                replace_ci(&text, value, &Self::placeholder(name), false)
            })
    }

    /// Template the database and schema of a script. The object name is
    /// never parametrized.
    pub fn parametrize_object_identity(&self, script: &mut Script) {
        let old_name = script.full_object_name();
        let database = self.parametrize_segment(script.database());
        let schema = self.parametrize_segment(script.schema());
        script.set_database(&database);
        script.set_schema(&schema);
        tracing::debug!(from = %old_name, to = %script.full_object_name(), "parametrized object name");
    }

    /// Template the content and, optionally, the identity of a script.
    pub fn parametrize_script(&self, script: &mut Script, with_identity: bool) {
        let parametrized = self.parametrize(script.content());
        script.set_content(&parametrized);
        if with_identity {
            self.parametrize_object_identity(script);
        }
    }

    /// Same as [`parametrize_object_identity`](Self::parametrize_object_identity)
    /// for a `DB.SCHEMA.OBJECT` string.
    pub fn parametrize_object_name(&self, full_name: &str) -> String {
        let parts: Vec<&str> = full_name.splitn(3, '.').collect();
        match parts.as_slice() {
            [database, schema, object] => format!(
                "{}.{}.{}",
                self.parametrize_segment(database),
                self.parametrize_segment(schema),
                object
            ),
            _ => full_name.to_string(),
        }
    }

    /// Inject placeholders into configured object names.
    pub fn inject_names<'a>(&self, names: impl IntoIterator<Item = &'a String>) -> BTreeSet<String> {
        names.into_iter().map(|name| self.inject(name)).collect()
    }
}
