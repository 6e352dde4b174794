//! Shared key/value environment that carries stage outputs forward.
//!
//! Keys are namespaced by the stage that produces them, for example
//! `prepareStep.tempDirectory`. Entries are only ever added or overwritten.

use std::collections::BTreeMap;

use crate::error::{ShipError, ShipResult};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Variables {
    entries: BTreeMap<String, String>,
}

impl Variables {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> ShipResult<&str> {
        self.entries
            .get(key)
            .map(String::as_str)
            .ok_or_else(|| ShipError::MissingVariable {
                key: key.to_string(),
            })
    }

    /// Copy every entry of `other` into this environment.
    pub fn merge(&mut self, other: Variables) {
        self.entries.extend(other.entries);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace every `${namespace.key}` placeholder in `template`.
    ///
    /// Placeholders without a `.` (such as `${HOME}`) belong to the shell and
    /// are copied through unchanged. Substituted values are not scanned
    /// again.
    pub fn substitute(&self, template: &str) -> ShipResult<String> {
        let mut expanded = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${") {
            expanded.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                return Err(ShipError::Execution(format!(
                    "unterminated placeholder in '{template}'"
                )));
            };
            let name = &after[..end];
            if is_stage_variable(name) {
                expanded.push_str(self.get(name)?);
            } else {
                expanded.push_str("${");
                expanded.push_str(name);
                expanded.push('}');
            }
            rest = &after[end + 1..];
        }
        expanded.push_str(rest);
        Ok(expanded)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Variables {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Variables {
            entries: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Names of the placeholders in `template` that refer to stage variables.
///
/// Returns an error for an unterminated `${`.
pub fn placeholders(template: &str) -> Result<Vec<&str>, String> {
    let mut names = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let end = after
            .find('}')
            .ok_or_else(|| format!("unterminated placeholder in '{template}'"))?;
        let name = &after[..end];
        if is_stage_variable(name) {
            names.push(name);
        }
        rest = &after[end + 1..];
    }
    Ok(names)
}

fn is_stage_variable(name: &str) -> bool {
    match name.split_once('.') {
        Some((namespace, key)) => {
            !namespace.is_empty()
                && !key.is_empty()
                && name
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_')
        }
        None => false,
    }
}
