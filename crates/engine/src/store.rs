//! Variable bindings captured during a session.
//!
//! Sensitivity travels with the value: a [`BoundValue::Sensitive`] wraps a
//! [`SecretValue`] whose `Debug`, `Display`, and `Serialize` implementations
//! all emit the redaction marker. Code that needs the real text has to call
//! [`SecretValue::expose`] explicitly, so forgetting a flag check cannot leak
//! a secret into a log line or a serialized artifact.

use std::collections::HashMap;
use std::fmt;

use hacksmith_types::blueprint::validation::anchored_pattern;
use hacksmith_types::{REDACTION_MARKER, VariableSpec};
use indexmap::IndexMap;
use regex::Regex;
use serde::{Serialize, Serializer};
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Text that must never be rendered outside the credentials artifact.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Returns the plaintext. Call sites are the only places secrets escape.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "SecretValue({REDACTION_MARKER})")
    }
}

impl fmt::Display for SecretValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(REDACTION_MARKER)
    }
}

impl Serialize for SecretValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTION_MARKER)
    }
}

/// A bound value tagged with its sensitivity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoundValue {
    Plain(String),
    Sensitive(SecretValue),
}

impl BoundValue {
    pub fn is_sensitive(&self) -> bool {
        matches!(self, BoundValue::Sensitive(_))
    }

    /// Real text, including secrets.
    pub fn expose(&self) -> &str {
        match self {
            BoundValue::Plain(value) => value,
            BoundValue::Sensitive(secret) => secret.expose(),
        }
    }

    /// Text safe for summaries: secrets become the redaction marker.
    pub fn masked(&self) -> &str {
        match self {
            BoundValue::Plain(value) => value,
            BoundValue::Sensitive(_) => REDACTION_MARKER,
        }
    }
}

impl Serialize for BoundValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.masked())
    }
}

/// Bound values plus the declared metadata that governs them.
#[derive(Debug, Clone, Default)]
pub struct VariableStore {
    specs: IndexMap<String, VariableSpec>,
    patterns: HashMap<String, Regex>,
    bindings: IndexMap<String, BoundValue>,
}

impl VariableStore {
    /// Builds an empty store for the declared variables, compiling their patterns.
    pub fn new(specs: &IndexMap<String, VariableSpec>) -> EngineResult<Self> {
        let mut patterns = HashMap::new();
        for (name, spec) in specs {
            if let Some(pattern) = &spec.validation {
                let regex = anchored_pattern(pattern).map_err(|error| {
                    EngineError::malformed(format!("variable '{name}' has an invalid validation pattern '{pattern}': {error}"))
                })?;
                patterns.insert(name.clone(), regex);
            }
        }

        Ok(Self {
            specs: specs.clone(),
            patterns,
            bindings: IndexMap::new(),
        })
    }

    /// Declared spec for `name`, if any.
    pub fn spec(&self, name: &str) -> Option<&VariableSpec> {
        self.specs.get(name)
    }

    /// Declared specs in authoring order.
    pub fn specs(&self) -> impl Iterator<Item = (&String, &VariableSpec)> {
        self.specs.iter()
    }

    /// Checks `value` against the declared rules for `name` without storing it.
    pub fn check(&self, name: &str, value: &str) -> EngineResult<()> {
        let spec = self.specs.get(name);
        if value.is_empty() && spec.is_some_and(|spec| spec.required) {
            return Err(EngineError::Validation {
                variable: name.to_string(),
                pattern: None,
                reason: "a value is required".to_string(),
            });
        }

        if let Some(regex) = self.patterns.get(name)
            && !regex.is_match(value)
        {
            let pattern = spec.and_then(|spec| spec.validation.clone());
            return Err(EngineError::Validation {
                variable: name.to_string(),
                reason: format!("value must match the pattern {}", pattern.as_deref().unwrap_or_default()),
                pattern,
            });
        }

        Ok(())
    }

    /// Validates and stores a value using the declared sensitivity.
    pub fn bind(&mut self, name: &str, value: impl Into<String>) -> EngineResult<()> {
        self.bind_with(name, value, false)
    }

    /// Validates and stores a value that must be treated as sensitive.
    pub fn bind_sensitive(&mut self, name: &str, value: impl Into<String>) -> EngineResult<()> {
        self.bind_with(name, value, true)
    }

    /// Validates and stores a value. Sensitivity is the union of `sensitive`,
    /// the declared spec, and any previous binding, so it never downgrades.
    pub fn bind_with(&mut self, name: &str, value: impl Into<String>, sensitive: bool) -> EngineResult<()> {
        let value = value.into();
        self.check(name, &value)?;

        let sensitive = sensitive
            || self.specs.get(name).is_some_and(|spec| spec.sensitive)
            || self.bindings.get(name).is_some_and(BoundValue::is_sensitive);

        let bound = if sensitive {
            BoundValue::Sensitive(SecretValue::new(value))
        } else {
            BoundValue::Plain(value)
        };
        debug!(variable = %name, sensitive, "variable bound");
        self.bindings.insert(name.to_string(), bound);
        Ok(())
    }

    /// Value bound under exactly `name`.
    pub fn get(&self, name: &str) -> Option<&BoundValue> {
        self.bindings.get(name)
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Whether every variable declared `required` has a binding.
    pub fn all_required_bound(&self) -> bool {
        self.missing_required().is_empty()
    }

    /// Required variables without a binding, in declaration order.
    pub fn missing_required(&self) -> Vec<String> {
        self.specs
            .iter()
            .filter(|(name, spec)| spec.required && !self.bindings.contains_key(name.as_str()))
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// Bindings in the order they were first made.
    pub fn bindings(&self) -> impl Iterator<Item = (&String, &BoundValue)> {
        self.bindings.iter()
    }

    /// Replaces every occurrence of a sensitive value in `text` with the redaction marker.
    ///
    /// Matching is by substring, so a short secret also masks unrelated text
    /// that happens to contain it. Only apply this to collaborator output that
    /// may echo a secret; templates mask substitutions on their own.
    pub fn scrub(&self, text: &str) -> String {
        let mut secrets: Vec<&str> = self
            .bindings
            .values()
            .filter(|value| value.is_sensitive())
            .map(BoundValue::expose)
            .filter(|secret| !secret.is_empty())
            .collect();
        // Longest first so a secret that contains another is replaced whole.
        secrets.sort_by_key(|secret| std::cmp::Reverse(secret.len()));

        let mut scrubbed = text.to_string();
        for secret in secrets {
            scrubbed = scrubbed.replace(secret, REDACTION_MARKER);
        }
        scrubbed
    }
}
