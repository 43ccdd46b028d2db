//! Engine error kinds.
//!
//! Validation failures are absorbed by the step that raised them (the user is
//! asked again). Every other variant propagates to the session boundary
//! carrying enough context for a UI to explain what went wrong. A user cancel
//! is not an error; it is reported as `SessionOutcome::Aborted`.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias used across the engine.
pub type EngineResult<T> = Result<T, EngineError>;

/// Failures surfaced by blueprint loading, step execution, and artifact output.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Missing top-level keys, unknown step type, or a malformed step payload.
    #[error("malformed blueprint{}: {message}", step_suffix(.step_id))]
    MalformedBlueprint { step_id: Option<String>, message: String },

    /// A value failed its declared pattern, or a choice was not one of the options.
    #[error("invalid value for '{variable}': {reason}")]
    Validation {
        variable: String,
        pattern: Option<String>,
        reason: String,
    },

    /// The input retry cap was reached without a valid value.
    #[error("step '{step_id}' gave up on '{variable}' after {attempts} invalid attempts")]
    RetryLimitExceeded { step_id: String, variable: String, attempts: u32 },

    /// A template referenced required or static data that is not available.
    #[error("unresolved template reference '{path}' while rendering {target}")]
    UnresolvedVariable { path: String, target: String },

    /// The flow reached its end with required variables unbound.
    #[error("flow '{flow_id}' cannot complete; required variables are unbound: {}", .missing.join(", "))]
    IncompleteFlow { flow_id: String, missing: Vec<String> },

    /// Blueprint read or artifact write failure.
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The encryption collaborator failed or is not configured.
    #[error("credential sealing failed: {message}")]
    Sealing { message: String },

    /// An injected I/O collaborator failed.
    #[error("collaborator failed during step '{step_id}': {source}")]
    Collaborator {
        step_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The requested flow is not declared by the blueprint.
    #[error("unknown flow '{flow_id}'")]
    UnknownFlow { flow_id: String },

    /// The operation is not valid for the session's current state.
    #[error("invalid session operation: {0}")]
    InvalidSession(String),
}

impl EngineError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        EngineError::MalformedBlueprint {
            step_id: None,
            message: message.into(),
        }
    }

    pub(crate) fn malformed_step(step_id: &str, message: impl Into<String>) -> Self {
        EngineError::MalformedBlueprint {
            step_id: Some(step_id.to_string()),
            message: message.into(),
        }
    }

    pub(crate) fn collaborator(step_id: &str, source: anyhow::Error) -> Self {
        EngineError::Collaborator {
            step_id: step_id.to_string(),
            source,
        }
    }
}

fn step_suffix(step_id: &Option<String>) -> String {
    step_id.as_ref().map(|id| format!(" (step '{id}')")).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_message_includes_step() {
        let error = EngineError::malformed_step("capture-env-id", "pattern does not compile");
        assert_eq!(
            error.to_string(),
            "malformed blueprint (step 'capture-env-id'): pattern does not compile"
        );
    }

    #[test]
    fn incomplete_flow_lists_missing_variables() {
        let error = EngineError::IncompleteFlow {
            flow_id: "onboarding".into(),
            missing: vec!["client_id".into(), "client_secret".into()],
        };
        assert!(error.to_string().ends_with("client_id, client_secret"));
    }
}
