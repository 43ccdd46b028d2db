use hacksmith_types::{BlueprintDocument, NavigateStep, StepDefinition};
use tracing::warn;
use url::Url;

use super::{HandlerOutcome, StepContext, StepHandler, check_placeholders, require_text};
use crate::error::EngineResult;
use crate::io::{NavigationRequest, Reply};

#[async_trait::async_trait]
impl StepHandler for NavigateStep {
    fn validate(&self, step: &StepDefinition, _document: &BlueprintDocument) -> EngineResult<()> {
        require_text(step, &self.url, "url")?;
        check_placeholders(step, std::iter::once(self.url.as_str()).chain(self.instructions.iter().map(String::as_str)))
    }

    async fn execute(&self, context: &StepContext<'_>) -> EngineResult<HandlerOutcome> {
        let url = context.render_display(&self.url)?;
        if !url.contains("{{")
            && let Err(error) = Url::parse(&url)
        {
            warn!(step_id = %context.step.id, url = %url, error = %error, "navigation target is not an absolute URL");
        }

        let instructions = self
            .instructions
            .iter()
            .map(|line| context.render_display(line))
            .collect::<EngineResult<Vec<_>>>()?;

        let request = NavigationRequest {
            step_id: context.step.id.clone(),
            title: context.step.label().to_string(),
            url: url.clone(),
            instructions,
        };
        let reply = context
            .io
            .acknowledge_navigation(&request)
            .await
            .map_err(|error| context.collaborator_failed(error))?;

        Ok(match reply {
            Reply::Answer(()) => HandlerOutcome::Visited { url },
            Reply::Abort => HandlerOutcome::Abort,
        })
    }

    fn awaits_user(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Interaction, ScriptedIo};
    use crate::steps::test_support::{document, step};
    use crate::store::VariableStore;
    use hacksmith_types::StepKind;
    use serde_json::json;

    fn dashboard_step() -> StepDefinition {
        step(json!({
            "id": "open-dashboard",
            "type": "navigate",
            "url": "{{ slugs.base_url }}{{ slugs.dynamic.dashboard }}",
            "instructions": ["Sign in", "Copy the id for {{ environment_id }}"]
        }))
    }

    #[tokio::test]
    async fn keeps_placeholders_for_uncaptured_values() {
        let document = document();
        let store = VariableStore::new(&document.variables).unwrap();
        let definition = dashboard_step();
        let StepKind::Navigate(navigate) = &definition.kind else { panic!("navigate step") };
        let io = ScriptedIo::default();
        let context = StepContext {
            step: &definition,
            store: &store,
            document: &document,
            io: &io,
            max_input_attempts: None,
        };

        let outcome = navigate.execute(&context).await.unwrap();
        assert_eq!(
            outcome,
            HandlerOutcome::Visited {
                url: "https://app.example.com/ws/environments/{{ environment_id }}/quick-start".into()
            }
        );
    }

    #[tokio::test]
    async fn renders_captured_values_into_url() {
        let document = document();
        let mut store = VariableStore::new(&document.variables).unwrap();
        store.bind("environment_id", "env_3").unwrap();
        let definition = dashboard_step();
        let StepKind::Navigate(navigate) = &definition.kind else { panic!("navigate step") };
        let io = ScriptedIo::default();
        let context = StepContext {
            step: &definition,
            store: &store,
            document: &document,
            io: &io,
            max_input_attempts: None,
        };

        navigate.execute(&context).await.unwrap();
        assert_eq!(
            io.transcript(),
            vec![Interaction::Navigation {
                step_id: "open-dashboard".into(),
                url: "https://app.example.com/ws/environments/env_3/quick-start".into()
            }]
        );
    }

    #[test]
    fn requires_url() {
        let definition = step(json!({ "id": "nav", "type": "navigate" }));
        let StepKind::Navigate(navigate) = &definition.kind else { panic!("navigate step") };
        assert!(navigate.validate(&definition, &document()).is_err());
    }
}
