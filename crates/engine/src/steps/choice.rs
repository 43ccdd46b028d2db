use std::collections::HashSet;

use hacksmith_types::{BlueprintDocument, ChoiceStep, StepDefinition};
use tracing::warn;

use super::{HandlerOutcome, PendingBinding, StepContext, StepHandler};
use crate::error::{EngineError, EngineResult};
use crate::io::{ChoiceRequest, Reply};
use crate::store::BoundValue;

#[async_trait::async_trait]
impl StepHandler for ChoiceStep {
    fn validate(&self, step: &StepDefinition, _document: &BlueprintDocument) -> EngineResult<()> {
        if self.save_to.trim().is_empty() {
            return Err(EngineError::malformed_step(&step.id, "choice step needs 'save_to'"));
        }
        if self.options.is_empty() {
            return Err(EngineError::malformed_step(&step.id, "choice step needs at least one option"));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = self.options.iter().find(|option| !seen.insert(option.as_str())) {
            return Err(EngineError::malformed_step(&step.id, format!("option '{duplicate}' is listed twice")));
        }
        Ok(())
    }

    async fn execute(&self, context: &StepContext<'_>) -> EngineResult<HandlerOutcome> {
        let mut hint = None;
        let mut failures = 0u32;

        loop {
            let request = ChoiceRequest {
                step_id: context.step.id.clone(),
                variable: self.save_to.clone(),
                title: context.step.label().to_string(),
                options: self.options.clone(),
                hint: hint.take(),
                attempt: failures + 1,
            };
            let reply = context
                .io
                .present_choice(&request)
                .await
                .map_err(|error| context.collaborator_failed(error))?;
            let Reply::Answer(selection) = reply else {
                return Ok(HandlerOutcome::Abort);
            };

            let selection = selection.trim();
            let rejection = if !self.options.iter().any(|option| option == selection) {
                format!("choose one of: {}", self.options.join(", "))
            } else {
                match context.store.check(&self.save_to, selection) {
                    Ok(()) => {
                        return Ok(HandlerOutcome::Bind(vec![PendingBinding {
                            name: self.save_to.clone(),
                            value: BoundValue::Plain(selection.to_string()),
                        }]));
                    }
                    Err(EngineError::Validation { reason, .. }) => reason,
                    Err(other) => return Err(other),
                }
            };

            failures += 1;
            warn!(step_id = %context.step.id, selection = %selection, "selection rejected");
            if context.retry_exhausted(failures) {
                return Err(EngineError::RetryLimitExceeded {
                    step_id: context.step.id.clone(),
                    variable: self.save_to.clone(),
                    attempts: failures,
                });
            }
            hint = Some(rejection);
        }
    }

    fn awaits_user(&self) -> bool {
        true
    }
}
