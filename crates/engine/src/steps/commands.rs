use hacksmith_types::{BlueprintDocument, ShowCommandsStep, StepDefinition};

use super::{HandlerOutcome, StepContext, StepHandler, check_placeholders};
use crate::error::{EngineError, EngineResult};

#[async_trait::async_trait]
impl StepHandler for ShowCommandsStep {
    fn validate(&self, step: &StepDefinition, _document: &BlueprintDocument) -> EngineResult<()> {
        if self.commands.iter().all(|command| command.trim().is_empty()) {
            return Err(EngineError::malformed_step(&step.id, "show_commands step needs at least one command"));
        }
        check_placeholders(step, self.commands.iter().map(String::as_str))
    }

    async fn execute(&self, context: &StepContext<'_>) -> EngineResult<HandlerOutcome> {
        let commands = self
            .commands
            .iter()
            .filter(|command| !command.trim().is_empty())
            .map(|command| context.render_display(command))
            .collect::<EngineResult<Vec<_>>>()?;

        context
            .io
            .show_commands(context.step.label(), &commands)
            .await
            .map_err(|error| context.collaborator_failed(error))?;
        Ok(HandlerOutcome::Advance)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Interaction, ScriptedIo};
    use crate::steps::test_support::{document, step};
    use crate::store::VariableStore;
    use hacksmith_types::{REDACTION_MARKER, StepKind};
    use serde_json::json;

    #[tokio::test]
    async fn masks_secrets_in_commands() {
        let document = document();
        let mut store = VariableStore::new(&document.variables).unwrap();
        store.bind("client_secret", "hunter2").unwrap();
        let definition = step(json!({
            "id": "install-node",
            "type": "show_commands",
            "title": "Install the SDK",
            "commands": ["npm i @demo/sdk", "export DEMO_SECRET={{ client_secret }}"]
        }));
        let StepKind::ShowCommands(commands) = &definition.kind else { panic!("show_commands step") };
        let io = ScriptedIo::default();
        let context = StepContext {
            step: &definition,
            store: &store,
            document: &document,
            io: &io,
            max_input_attempts: None,
        };

        commands.execute(&context).await.unwrap();
        assert_eq!(
            io.transcript(),
            vec![Interaction::Commands {
                title: "Install the SDK".into(),
                commands: vec!["npm i @demo/sdk".into(), format!("export DEMO_SECRET={REDACTION_MARKER}")]
            }]
        );
    }

    #[test]
    fn requires_commands() {
        let definition = step(json!({ "id": "install", "type": "show_commands", "commands": [] }));
        let StepKind::ShowCommands(commands) = &definition.kind else { panic!("show_commands step") };
        assert!(commands.validate(&definition, &document()).is_err());
    }
}
