//! AI-assisted integration advice.
//!
//! The prompt is rendered with real secret values because the collaborator
//! needs them to produce working instructions. The render never leaves this
//! handler: the response is scrubbed before it is shown, and the persisted
//! contextifact is re-rendered with masking by the output writer.

use hacksmith_types::{AiPromptStep, BlueprintDocument, StepDefinition};
use tracing::info;

use super::{HandlerOutcome, StepContext, StepHandler, check_placeholders, require_text};
use crate::error::EngineResult;
use crate::io::{AiRequest, Reply};
use crate::templates::{MissingPolicy, SecretMode};

#[async_trait::async_trait]
impl StepHandler for AiPromptStep {
    fn validate(&self, step: &StepDefinition, _document: &BlueprintDocument) -> EngineResult<()> {
        require_text(step, &self.prompt_template, "prompt_template")?;
        check_placeholders(step, [self.prompt_template.as_str()])
    }

    async fn execute(&self, context: &StepContext<'_>) -> EngineResult<HandlerOutcome> {
        let prompt = context.templates().render(
            &self.prompt_template,
            SecretMode::Verbatim,
            MissingPolicy::Strict,
            &context.target(),
        )?;
        let request = AiRequest {
            step_id: context.step.id.clone(),
            provider: self.provider.clone(),
            model: self.model.clone(),
            prompt,
        };
        info!(step_id = %context.step.id, provider = ?request.provider, "requesting integration advice");

        let reply = context
            .io
            .generate_ai_response(&request)
            .await
            .map_err(|error| context.collaborator_failed(error))?;
        let Reply::Answer(response) = reply else {
            return Ok(HandlerOutcome::Abort);
        };
        let advice = context.store.scrub(&response);

        context
            .io
            .show_advice(context.step.label(), &advice)
            .await
            .map_err(|error| context.collaborator_failed(error))?;
        Ok(HandlerOutcome::Advice { text: advice })
    }

    fn awaits_user(&self) -> bool {
        true
    }
}
