//! Free-text capture.
//!
//! A step either binds a single `save_to` variable or walks its `inputs[]`
//! fields in order. Each value must satisfy the step (or field) pattern and the
//! declared variable pattern; a rejected value is reported back to the user as
//! a hint and asked for again.

use hacksmith_types::{BlueprintDocument, InputStep, InputValidation, StepDefinition};
use regex::Regex;
use tracing::{debug, warn};

use super::{HandlerOutcome, PendingBinding, StepContext, StepHandler, check_placeholders, compile_pattern};
use crate::error::{EngineError, EngineResult};
use crate::io::{Reply, TextRequest};
use crate::store::{BoundValue, SecretValue};

/// One value the step will ask for.
struct FieldPlan<'a> {
    variable: &'a str,
    sensitive: bool,
    description: Option<String>,
    validation: Option<&'a InputValidation>,
}

/// Fields to capture, in prompt order.
fn plan<'a>(step: &'a InputStep, context: &StepContext<'_>) -> Vec<FieldPlan<'a>> {
    let declared_sensitive = |name: &str| {
        context.store.spec(name).is_some_and(|spec| spec.sensitive)
            || context.store.get(name).is_some_and(BoundValue::is_sensitive)
    };
    let declared_description = |name: &str| context.store.spec(name).and_then(|spec| spec.description.clone());

    match &step.save_to {
        Some(variable) => vec![FieldPlan {
            variable,
            sensitive: declared_sensitive(variable),
            description: step.prompt.clone().or_else(|| declared_description(variable)),
            validation: step.validate.as_ref(),
        }],
        None => step
            .inputs
            .iter()
            .map(|field| FieldPlan {
                variable: &field.name,
                sensitive: field.sensitive || declared_sensitive(&field.name),
                description: field.description.clone().or_else(|| declared_description(&field.name)),
                validation: field.validate.as_ref().or(step.validate.as_ref()),
            })
            .collect(),
    }
}

#[async_trait::async_trait]
impl StepHandler for InputStep {
    fn validate(&self, step: &StepDefinition, _document: &BlueprintDocument) -> EngineResult<()> {
        let has_target = self.save_to.as_deref().is_some_and(|name| !name.trim().is_empty());
        match (has_target, self.inputs.is_empty()) {
            (true, false) => {
                return Err(EngineError::malformed_step(&step.id, "declare either 'save_to' or 'inputs', not both"));
            }
            (false, true) => {
                return Err(EngineError::malformed_step(&step.id, "input step needs 'save_to' or 'inputs'"));
            }
            _ => {}
        }

        let mut seen = std::collections::HashSet::new();
        for field in &self.inputs {
            if field.name.trim().is_empty() {
                return Err(EngineError::malformed_step(&step.id, "input field name must not be empty"));
            }
            if !seen.insert(field.name.as_str()) {
                return Err(EngineError::malformed_step(&step.id, format!("input field '{}' is declared twice", field.name)));
            }
        }

        let validations = self.validate.iter().chain(self.inputs.iter().filter_map(|field| field.validate.as_ref()));
        for validation in validations {
            compile_pattern(step, &validation.pattern)?;
        }

        check_placeholders(step, self.prompt.as_deref())
    }

    async fn execute(&self, context: &StepContext<'_>) -> EngineResult<HandlerOutcome> {
        let mut bindings = Vec::new();
        for field in plan(self, context) {
            let pattern = field
                .validation
                .map(|validation| compile_pattern(context.step, &validation.pattern))
                .transpose()?;
            match capture(context, &field, pattern.as_ref()).await? {
                Reply::Answer(value) => {
                    let value = if field.sensitive {
                        BoundValue::Sensitive(SecretValue::new(value))
                    } else {
                        BoundValue::Plain(value)
                    };
                    bindings.push(PendingBinding {
                        name: field.variable.to_string(),
                        value,
                    });
                }
                Reply::Abort => return Ok(HandlerOutcome::Abort),
            }
        }
        Ok(HandlerOutcome::Bind(bindings))
    }

    fn awaits_user(&self) -> bool {
        true
    }
}

async fn capture(context: &StepContext<'_>, field: &FieldPlan<'_>, pattern: Option<&Regex>) -> EngineResult<Reply<String>> {
    let mut hint = None;
    let mut failures = 0u32;

    loop {
        let request = TextRequest {
            step_id: context.step.id.clone(),
            variable: field.variable.to_string(),
            title: context.step.label().to_string(),
            description: field.description.clone(),
            hint: hint.take(),
            sensitive: field.sensitive,
            attempt: failures + 1,
        };
        let reply = context
            .io
            .acquire_text(&request)
            .await
            .map_err(|error| context.collaborator_failed(error))?;
        let Reply::Answer(raw) = reply else {
            return Ok(Reply::Abort);
        };

        let value = raw.trim().to_string();
        match check_value(context, field, pattern, &value) {
            Ok(()) => {
                debug!(step_id = %context.step.id, variable = %field.variable, "input accepted");
                return Ok(Reply::Answer(value));
            }
            Err(reason) => {
                failures += 1;
                warn!(step_id = %context.step.id, variable = %field.variable, attempt = failures, "input rejected");
                if context.retry_exhausted(failures) {
                    return Err(EngineError::RetryLimitExceeded {
                        step_id: context.step.id.clone(),
                        variable: field.variable.to_string(),
                        attempts: failures,
                    });
                }
                hint = Some(reason);
            }
        }
    }
}

/// Returns the hint to show when `value` is rejected.
fn check_value(context: &StepContext<'_>, field: &FieldPlan<'_>, pattern: Option<&Regex>, value: &str) -> Result<(), String> {
    if let Some(pattern) = pattern
        && !pattern.is_match(value)
    {
        let validation = field.validation;
        return Err(validation
            .and_then(|validation| validation.message.clone())
            .unwrap_or_else(|| format!("value must match {}", validation.map(|v| v.pattern.as_str()).unwrap_or_default())));
    }

    context.store.check(field.variable, value).map_err(|error| match error {
        EngineError::Validation { reason, .. } => field
            .validation
            .and_then(|validation| validation.message.clone())
            .unwrap_or(reason),
        other => other.to_string(),
    })
}
