//! `when` guard expressions.
//!
//! The grammar is deliberately tiny: `<dotted.path> == '<literal>'`. The
//! literal is single quoted and compared case-sensitively against the exact
//! resolved text. Parsing happens once at load time; evaluation never fails.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::resolve::{PathResolver, Resolution, is_valid_path};

/// Reasons a `when` expression is rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConditionSyntaxError {
    #[error("condition cannot be empty")]
    Empty,
    #[error("condition must have the form <path> == '<literal>'")]
    MissingOperator,
    #[error("'{0}' is not a dotted path")]
    InvalidPath(String),
    #[error("right-hand side must be a single-quoted literal, found {0}")]
    UnquotedLiteral(String),
}

/// A parsed equality guard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    path: String,
    expected: String,
}

impl Condition {
    pub fn parse(expression: &str) -> Result<Self, ConditionSyntaxError> {
        let trimmed = expression.trim();
        if trimmed.is_empty() {
            return Err(ConditionSyntaxError::Empty);
        }

        let (left, right) = trimmed.split_once("==").ok_or(ConditionSyntaxError::MissingOperator)?;
        let path = left.trim();
        if !is_valid_path(path) {
            return Err(ConditionSyntaxError::InvalidPath(path.to_string()));
        }

        let right = right.trim();
        let expected = right
            .strip_prefix('\'')
            .and_then(|rest| rest.strip_suffix('\''))
            .filter(|literal| !literal.contains('\''))
            .ok_or_else(|| ConditionSyntaxError::UnquotedLiteral(right.to_string()))?;

        Ok(Self {
            path: path.to_string(),
            expected: expected.to_string(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn expected(&self) -> &str {
        &self.expected
    }

    /// True only when the path resolves to text equal to the literal.
    ///
    /// Unbound and unknown paths are false. Static scalars compare through
    /// their string form, so `enabled == 'true'` works against a boolean.
    pub fn evaluate(&self, paths: &PathResolver<'_>) -> bool {
        match paths.resolve(&self.path) {
            Resolution::Bound { value, .. } => value.expose() == self.expected,
            Resolution::Static(serde_json::Value::String(text)) => *text == self.expected,
            Resolution::Static(value @ (serde_json::Value::Bool(_) | serde_json::Value::Number(_))) => {
                value.to_string() == self.expected
            }
            Resolution::Static(_) | Resolution::Unbound { .. } | Resolution::Missing => false,
        }
    }
}

impl FromStr for Condition {
    type Err = ConditionSyntaxError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        Self::parse(expression)
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{} == '{}'", self.path, self.expected)
    }
}
