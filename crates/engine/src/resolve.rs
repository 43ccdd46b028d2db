//! # Dotted Path Resolution
//!
//! Templates and `when` conditions both address data with dotted paths such as
//! `environment_id`, `sdk.language`, or `slugs.dynamic.dashboard`. This module
//! owns the single lookup routine they share so the two can never disagree.
//!
//! Resolution order:
//!
//! 1. **Bindings**: the longest dotted prefix of the path that names a bound
//!    variable. Bindings are flat strings, so a prefix match only counts when
//!    it consumes the whole path.
//! 2. **Declared but unbound variables**: reported as [`Resolution::Unbound`]
//!    so callers can apply their own policy (fail, skip, or leave verbatim).
//! 3. **Static document fields**: sequential key traversal into the blueprint
//!    tree, to arbitrary depth.

use hacksmith_types::BlueprintDocument;
use serde_json::Value;

use crate::store::{BoundValue, VariableStore};

/// Outcome of resolving a dotted path.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    /// A session binding.
    Bound { name: &'a str, value: &'a BoundValue },
    /// A declared variable that has no value yet.
    Unbound { name: String, required: bool },
    /// A field of the blueprint document.
    Static(&'a Value),
    /// Nothing answers to this path.
    Missing,
}

/// Read-only view over the session bindings and the blueprint document.
#[derive(Debug, Clone, Copy)]
pub struct PathResolver<'a> {
    store: &'a VariableStore,
    document: &'a BlueprintDocument,
}

impl<'a> PathResolver<'a> {
    pub fn new(store: &'a VariableStore, document: &'a BlueprintDocument) -> Self {
        Self { store, document }
    }

    pub fn store(&self) -> &'a VariableStore {
        self.store
    }

    pub fn document(&self) -> &'a BlueprintDocument {
        self.document
    }

    /// Resolves `path` following the binding-then-document order.
    pub fn resolve(&self, path: &str) -> Resolution<'a> {
        let Some(segments) = split_path(path) else {
            return Resolution::Missing;
        };

        for prefix_length in (1..=segments.len()).rev() {
            let candidate = segments[..prefix_length].join(".");
            if let Some((name, value)) = self.store.bindings().find(|(name, _)| **name == candidate) {
                if prefix_length == segments.len() {
                    return Resolution::Bound { name, value };
                }
                return Resolution::Missing;
            }
        }

        let declared = [segments.join("."), segments[0].to_string()]
            .into_iter()
            .find_map(|name| self.store.spec(&name).map(|spec| (name, spec.required)));
        if let Some((name, required)) = declared {
            return Resolution::Unbound { name, required };
        }

        match self.document.lookup(&segments) {
            Some(value) => Resolution::Static(value),
            None => Resolution::Missing,
        }
    }
}

/// Splits a dotted path into segments, rejecting empty or malformed ones.
pub fn split_path(path: &str) -> Option<Vec<&str>> {
    let trimmed = path.trim();
    if trimmed.is_empty() {
        return None;
    }
    let segments: Vec<&str> = trimmed.split('.').collect();
    if segments.iter().all(|segment| is_valid_segment(segment)) {
        Some(segments)
    } else {
        None
    }
}

/// Whether `path` is syntactically a dotted path.
pub fn is_valid_path(path: &str) -> bool {
    split_path(path).is_some()
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty() && segment.chars().all(is_identifier_character)
}

fn is_identifier_character(character: char) -> bool {
    character.is_ascii_alphanumeric() || character == '_' || character == '-'
}
