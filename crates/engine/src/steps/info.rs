use hacksmith_types::{BlueprintDocument, InfoStep, StepDefinition};

use super::{HandlerOutcome, StepContext, StepHandler, check_placeholders, require_text};
use crate::error::EngineResult;

#[async_trait::async_trait]
impl StepHandler for InfoStep {
    fn validate(&self, step: &StepDefinition, _document: &BlueprintDocument) -> EngineResult<()> {
        require_text(step, &self.markdown, "markdown")?;
        check_placeholders(step, [self.markdown.as_str()])
    }

    async fn execute(&self, context: &StepContext<'_>) -> EngineResult<HandlerOutcome> {
        let markdown = context.render_display(&self.markdown)?;
        context
            .io
            .show_info(context.step.label(), &markdown)
            .await
            .map_err(|error| context.collaborator_failed(error))?;
        Ok(HandlerOutcome::Advance)
    }
}
