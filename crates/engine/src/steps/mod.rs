//! Step handlers, one per step type.
//!
//! Every handler validates its own payload once at load time and executes
//! against a read-only view of the session. Handlers never mutate the store;
//! they return [`HandlerOutcome::Bind`] and the flow engine applies the
//! bindings. Dispatch is an exhaustive match over [`StepKind`], so adding a
//! step type fails to compile until it has a handler.

mod ai_prompt;
mod choice;
mod commands;
mod info;
mod input;
mod navigate;

use hacksmith_types::blueprint::validation::anchored_pattern;
use hacksmith_types::{BlueprintDocument, StepDefinition, StepKind};
use regex::Regex;

use crate::error::{EngineError, EngineResult};
use crate::io::StepIo;
use crate::resolve::PathResolver;
use crate::store::{BoundValue, VariableStore};
use crate::templates::{MissingPolicy, SecretMode, TemplateResolver, first_invalid_placeholder};

/// A value a handler wants bound once it returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingBinding {
    pub name: String,
    pub value: BoundValue,
}

/// What the engine should do after a handler returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerOutcome {
    Advance,
    Bind(Vec<PendingBinding>),
    /// A navigation step was acknowledged at `url`.
    Visited { url: String },
    /// Advisory text from the AI collaborator, already scrubbed of secrets.
    Advice { text: String },
    Abort,
}

/// Read-only view handed to a handler.
pub struct StepContext<'a> {
    pub step: &'a StepDefinition,
    pub store: &'a VariableStore,
    pub document: &'a BlueprintDocument,
    pub io: &'a dyn StepIo,
    /// `None` re-prompts until a valid value arrives.
    pub max_input_attempts: Option<u32>,
}

impl<'a> StepContext<'a> {
    pub fn templates(&self) -> TemplateResolver<'a> {
        TemplateResolver::new(PathResolver::new(self.store, self.document))
    }

    /// Renders display copy: secrets masked, unresolved placeholders kept.
    pub fn render_display(&self, text: &str) -> EngineResult<String> {
        self.templates()
            .render(text, SecretMode::Masked, MissingPolicy::Lenient, &self.target())
    }

    pub fn target(&self) -> String {
        format!("step '{}'", self.step.id)
    }

    pub fn collaborator_failed(&self, error: anyhow::Error) -> EngineError {
        EngineError::collaborator(&self.step.id, error)
    }

    /// Whether another attempt is allowed after `failures` rejections.
    fn retry_exhausted(&self, failures: u32) -> bool {
        self.max_input_attempts.is_some_and(|limit| failures >= limit)
    }
}

/// Shared contract for step types.
#[async_trait::async_trait]
pub trait StepHandler: Send + Sync {
    /// Checks the payload before any step executes.
    fn validate(&self, step: &StepDefinition, document: &BlueprintDocument) -> EngineResult<()>;

    /// Runs the step.
    async fn execute(&self, context: &StepContext<'_>) -> EngineResult<HandlerOutcome>;

    /// Whether the step suspends on the user.
    fn awaits_user(&self) -> bool {
        false
    }
}

/// Handler for a step's payload.
pub fn handler_for(kind: &StepKind) -> &dyn StepHandler {
    match kind {
        StepKind::Info(step) => step,
        StepKind::Navigate(step) => step,
        StepKind::Input(step) => step,
        StepKind::Choice(step) => step,
        StepKind::ShowCommands(step) => step,
        StepKind::AiPrompt(step) => step,
    }
}

fn check_placeholders<'t>(step: &StepDefinition, texts: impl IntoIterator<Item = &'t str>) -> EngineResult<()> {
    for text in texts {
        if let Some(expression) = first_invalid_placeholder(text) {
            return Err(EngineError::malformed_step(
                &step.id,
                format!("placeholder '{{{{ {expression} }}}}' is not a dotted path"),
            ));
        }
    }
    Ok(())
}

fn compile_pattern(step: &StepDefinition, pattern: &str) -> EngineResult<Regex> {
    anchored_pattern(pattern)
        .map_err(|error| EngineError::malformed_step(&step.id, format!("invalid pattern '{pattern}': {error}")))
}

fn require_text(step: &StepDefinition, value: &str, field: &str) -> EngineResult<()> {
    if value.trim().is_empty() {
        return Err(EngineError::malformed_step(&step.id, format!("'{field}' must not be empty")));
    }
    Ok(())
}
