//! Shared type definitions for Hacksmith blueprints and sessions.

pub mod blueprint;
pub mod session;

pub use blueprint::{
    AiPromptStep, BlueprintDocument, BlueprintPreview, ChoiceStep, ContextifactConfig, FlowDefinition, InfoStep, InputField, InputStep,
    InputValidation, NavigateStep, OutputConfig, STEP_TYPES, SecurityConfig, ShowCommandsStep, StepDefinition, StepKind, VariableSpec,
};
pub use session::{ArtifactKind, ArtifactRecord, SessionEvent, SessionState, StepRecord, StepStatus};

/// Fixed marker written in place of a sensitive value.
pub const REDACTION_MARKER: &str = "[REDACTED]";
