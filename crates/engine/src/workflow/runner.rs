//! Flow execution.
//!
//! [`FlowEngine`] walks one flow's steps in declaration order. For each step
//! it evaluates the `when` guard, dispatches to the step's handler, applies
//! the handler's bindings to the session store, and streams lifecycle events
//! to an optional observer. After the last step it checks that every required
//! variable is bound, writes the artifacts, and only then marks the session
//! `Completed`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use hacksmith_types::{
    ArtifactRecord, BlueprintDocument, BlueprintPreview, SessionEvent, SessionState, StepDefinition, StepRecord, StepStatus,
};
use hacksmith_util::{HacksmithSettings, expand_tilde};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::condition::Condition;
use crate::error::{EngineError, EngineResult};
use crate::io::StepIo;
use crate::output::{CredentialSealer, OUTPUT_STAGE, OutputWriter};
use crate::resolve::PathResolver;
use crate::steps::{HandlerOutcome, StepContext, handler_for};
use crate::store::VariableStore;
use crate::workflow::document::validate_blueprint;
use crate::workflow::session::Session;

/// Result of a completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReport {
    pub flow_id: String,
    pub artifacts: Vec<ArtifactRecord>,
    /// Sensitive values were captured but the plaintext gate was declined.
    pub credentials_withheld: bool,
}

/// How a run ended. Errors are returned separately as [`EngineError`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed(CompletionReport),
    /// The user cancelled at `step_id`. Bindings made so far stay in the session.
    Aborted { step_id: String },
}

impl SessionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, SessionOutcome::Completed(_))
    }
}

/// Interprets a validated blueprint.
pub struct FlowEngine {
    document: BlueprintDocument,
    io: Arc<dyn StepIo>,
    output_dir: Option<PathBuf>,
    max_input_attempts: Option<u32>,
    sealer: Option<Arc<dyn CredentialSealer>>,
    events: Option<UnboundedSender<SessionEvent>>,
}

impl FlowEngine {
    /// Validates `document` and builds an engine around it.
    pub fn new(document: BlueprintDocument, io: Arc<dyn StepIo>) -> EngineResult<Self> {
        validate_blueprint(&document)?;
        Ok(Self {
            document,
            io,
            output_dir: None,
            max_input_attempts: None,
            sealer: None,
            events: None,
        })
    }

    /// Applies the user's output directory and retry cap.
    pub fn with_settings(mut self, settings: &HacksmithSettings) -> Self {
        if let Some(dir) = settings.output_dir() {
            self.output_dir = Some(dir);
        }
        self.with_max_input_attempts(settings.max_input_attempts)
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// `None` re-prompts invalid input indefinitely.
    pub fn with_max_input_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_input_attempts = attempts.filter(|attempts| *attempts > 0);
        self
    }

    pub fn with_sealer(mut self, sealer: Arc<dyn CredentialSealer>) -> Self {
        self.sealer = Some(sealer);
        self
    }

    pub fn with_events(mut self, events: UnboundedSender<SessionEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn document(&self) -> &BlueprintDocument {
        &self.document
    }

    /// The landing-page summary, when the blueprint enables one.
    pub fn preview(&self) -> Option<&BlueprintPreview> {
        self.document.preview.as_ref().filter(|preview| preview.enabled)
    }

    /// Directory the artifacts are written to.
    pub fn output_dir(&self) -> PathBuf {
        self.output_dir
            .clone()
            .unwrap_or_else(|| expand_tilde(&self.document.output.storage_path))
    }

    /// Creates a session for `flow_id`, or for the first flow when `None`.
    pub fn start(&self, flow_id: Option<&str>) -> EngineResult<Session> {
        let flow = match flow_id {
            Some(flow_id) => self.document.flow(flow_id).ok_or_else(|| EngineError::UnknownFlow {
                flow_id: flow_id.to_string(),
            })?,
            None => self
                .document
                .flows
                .first()
                .ok_or_else(|| EngineError::malformed("blueprint declares no flows"))?,
        };
        let store = VariableStore::new(&self.document.variables)?;
        Ok(Session::new(flow.id.clone(), store))
    }

    /// Runs the session's remaining steps.
    ///
    /// Returns `Ok(Aborted)` on user cancellation. Any error leaves the session
    /// at the failing step in `RunningStep`, with earlier bindings intact.
    pub async fn run(&self, session: &mut Session) -> EngineResult<SessionOutcome> {
        if session.is_finished() {
            return Err(EngineError::InvalidSession(format!(
                "session for flow '{}' is already {}",
                session.flow_id, session.state
            )));
        }
        let flow = self.document.flow(&session.flow_id).ok_or_else(|| EngineError::UnknownFlow {
            flow_id: session.flow_id.clone(),
        })?;

        if session.state == SessionState::NotStarted {
            info!(flow = %flow.id, blueprint = %self.document.name, "session started");
            self.emit(SessionEvent::SessionStarted {
                flow_id: flow.id.clone(),
                at: session.started_at,
            });
        }
        self.transition(session, SessionState::RunningStep);

        while let Some(step) = flow.steps.get(session.step_index) {
            let index = session.step_index;

            if !self.guard_allows(step, &session.store)? {
                debug!(step_id = %step.id, "condition false; step skipped");
                self.record(session, step, StepStatus::Skipped);
                self.emit(SessionEvent::StepSkipped {
                    index,
                    step_id: step.id.clone(),
                });
                session.step_index += 1;
                continue;
            }

            self.emit(SessionEvent::StepStarted {
                index,
                step_id: step.id.clone(),
                label: step.title.clone(),
            });
            debug!(step_id = %step.id, step_type = step.kind.type_name(), "executing step");

            let handler = handler_for(&step.kind);
            if handler.awaits_user() {
                self.transition(session, SessionState::WaitingForInput);
            }
            let outcome = {
                let context = StepContext {
                    step,
                    store: &session.store,
                    document: &self.document,
                    io: self.io.as_ref(),
                    max_input_attempts: self.max_input_attempts,
                };
                handler.execute(&context).await
            };
            self.transition(session, SessionState::RunningStep);

            match outcome? {
                HandlerOutcome::Advance => {}
                HandlerOutcome::Bind(bindings) => {
                    for binding in bindings {
                        session
                            .store
                            .bind_with(&binding.name, binding.value.expose(), binding.value.is_sensitive())?;
                    }
                }
                HandlerOutcome::Visited { url } => session.visited_urls.push(url),
                HandlerOutcome::Advice { text } => {
                    session.advice = Some(text);
                    session.ai_step_id = Some(step.id.clone());
                }
                HandlerOutcome::Abort => {
                    info!(flow = %flow.id, step_id = %step.id, "session aborted by user");
                    self.record(session, step, StepStatus::Aborted);
                    self.emit(SessionEvent::StepFinished {
                        index,
                        step_id: step.id.clone(),
                        status: StepStatus::Aborted,
                    });
                    self.finish(session, SessionState::Aborted);
                    return Ok(SessionOutcome::Aborted { step_id: step.id.clone() });
                }
            }

            self.record(session, step, StepStatus::Executed);
            self.emit(SessionEvent::StepFinished {
                index,
                step_id: step.id.clone(),
                status: StepStatus::Executed,
            });
            session.step_index += 1;
        }

        let missing = session.store.missing_required();
        if !missing.is_empty() {
            return Err(EngineError::IncompleteFlow {
                flow_id: flow.id.clone(),
                missing,
            });
        }

        let Some(report) = self.writer().write_all(session, self.io.as_ref()).await? else {
            info!(flow = %flow.id, "session aborted at the credentials gate");
            self.finish(session, SessionState::Aborted);
            return Ok(SessionOutcome::Aborted {
                step_id: OUTPUT_STAGE.to_string(),
            });
        };
        for artifact in &report.artifacts {
            self.emit(SessionEvent::ArtifactWritten {
                kind: artifact.kind,
                path: artifact.path.clone(),
            });
        }
        session.artifacts = report.artifacts.clone();
        self.finish(session, SessionState::Completed);
        info!(flow = %flow.id, artifacts = report.artifacts.len(), "session completed");

        Ok(SessionOutcome::Completed(CompletionReport {
            flow_id: flow.id.clone(),
            artifacts: report.artifacts,
            credentials_withheld: report.credentials_withheld,
        }))
    }

    /// Writes config and mission brief for an unfinished session.
    pub fn checkpoint(&self, session: &Session) -> EngineResult<Vec<ArtifactRecord>> {
        let artifacts = self.writer().write_checkpoint(session)?;
        for artifact in &artifacts {
            self.emit(SessionEvent::ArtifactWritten {
                kind: artifact.kind,
                path: artifact.path.clone(),
            });
        }
        Ok(artifacts)
    }

    fn writer(&self) -> OutputWriter<'_> {
        OutputWriter::new(&self.document, self.output_dir()).with_sealer(self.sealer.as_deref())
    }

    fn guard_allows(&self, step: &StepDefinition, store: &VariableStore) -> EngineResult<bool> {
        let Some(expression) = &step.when else {
            return Ok(true);
        };
        let condition = Condition::parse(expression)
            .map_err(|error| EngineError::malformed_step(&step.id, format!("invalid condition '{expression}': {error}")))?;
        Ok(condition.evaluate(&PathResolver::new(store, &self.document)))
    }

    fn record(&self, session: &mut Session, step: &StepDefinition, status: StepStatus) {
        session.history.push(StepRecord {
            step_id: step.id.clone(),
            step_type: step.kind.type_name().to_string(),
            status,
        });
    }

    fn transition(&self, session: &mut Session, state: SessionState) {
        if session.state != state {
            session.state = state;
            self.emit(SessionEvent::StateChanged { state });
        }
    }

    fn finish(&self, session: &mut Session, state: SessionState) {
        self.transition(session, state);
        self.emit(SessionEvent::SessionFinished { state, at: Utc::now() });
    }

    fn emit(&self, event: SessionEvent) {
        if let Some(events) = &self.events {
            let _ = events.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::{Reply, ScriptedIo};
    use crate::workflow::document::document_from_tree;
    use serde_json::json;
    use tokio::sync::mpsc::unbounded_channel;

    fn blueprint(storage: &str) -> BlueprintDocument {
        document_from_tree(json!({
            "schema_version": "1.0",
            "name": "Demo",
            "provider": "demo",
            "variables": {
                "environment_id": { "required": true, "validation": "^env_[0-9]+$" }
            },
            "output": { "storage_path": storage },
            "flows": [{
                "id": "onboarding",
                "steps": [
                    { "id": "welcome", "type": "info", "markdown": "Hello" },
                    { "id": "capture-env-id", "type": "input", "save_to": "environment_id" },
                    { "id": "choose-sdk", "type": "choice", "save_to": "sdk.language", "options": ["node", "go"] },
                    { "id": "install-node", "type": "show_commands", "when": "sdk.language == 'node'", "commands": ["npm i demo"] },
                    { "id": "install-go", "type": "show_commands", "when": "sdk.language == 'go'", "commands": ["go get demo"] }
                ]
            }]
        }))
        .expect("blueprint")
    }

    #[tokio::test]
    async fn runs_to_completion_and_streams_events() {
        let dir = tempfile::tempdir().unwrap();
        let io = Arc::new(ScriptedIo::new(["env_1", "node"]));
        let (tx, mut rx) = unbounded_channel();
        let engine = FlowEngine::new(blueprint(&dir.path().display().to_string()), io.clone())
            .unwrap()
            .with_events(tx);

        let mut session = engine.start(None).unwrap();
        let outcome = engine.run(&mut session).await.unwrap();

        assert!(outcome.is_completed());
        assert_eq!(session.state(), SessionState::Completed);
        assert_eq!(session.steps_with_status(StepStatus::Skipped), vec!["install-go"]);
        assert_eq!(session.artifacts().len(), 2);

        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(SessionEvent::SessionStarted { .. })));
        assert!(matches!(
            events.last(),
            Some(SessionEvent::SessionFinished {
                state: SessionState::Completed,
                ..
            })
        ));
        assert!(events.contains(&SessionEvent::StateChanged {
            state: SessionState::WaitingForInput
        }));
    }

    #[tokio::test]
    async fn abort_keeps_bindings_and_skips_output() {
        let dir = tempfile::tempdir().unwrap();
        let io = Arc::new(ScriptedIo::from_replies([Reply::Answer("env_5".into()), Reply::Abort]));
        let engine = FlowEngine::new(blueprint(&dir.path().display().to_string()), io).unwrap();

        let mut session = engine.start(Some("onboarding")).unwrap();
        let outcome = engine.run(&mut session).await.unwrap();

        assert_eq!(
            outcome,
            SessionOutcome::Aborted {
                step_id: "choose-sdk".into()
            }
        );
        assert_eq!(session.state(), SessionState::Aborted);
        assert_eq!(session.store().get("environment_id").map(|value| value.expose()), Some("env_5"));
        assert!(session.artifacts().is_empty());
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
        assert!(matches!(engine.run(&mut session).await, Err(EngineError::InvalidSession(_))));
    }

    #[test]
    fn unknown_flow_is_rejected() {
        let engine = FlowEngine::new(blueprint("/unused"), Arc::new(ScriptedIo::default())).unwrap();
        assert!(matches!(engine.start(Some("missing")), Err(EngineError::UnknownFlow { .. })));
    }

    #[test]
    fn settings_supply_output_dir_and_retry_cap() {
        let settings = HacksmithSettings {
            output_dir: Some("/tmp/hacksmith-out".into()),
            max_input_attempts: Some(3),
            ..HacksmithSettings::default()
        };
        let engine = FlowEngine::new(blueprint("/unused"), Arc::new(ScriptedIo::default()))
            .unwrap()
            .with_settings(&settings);
        assert_eq!(engine.output_dir(), PathBuf::from("/tmp/hacksmith-out"));
        assert_eq!(engine.max_input_attempts, Some(3));
    }

    #[tokio::test]
    async fn zero_attempt_cap_in_settings_means_unlimited() {
        let dir = tempfile::tempdir().unwrap();
        let settings = HacksmithSettings {
            max_input_attempts: Some(0),
            ..HacksmithSettings::default()
        };
        let io = Arc::new(ScriptedIo::new(["env_bad", "env_1", "node"]));
        let engine = FlowEngine::new(blueprint(&dir.path().display().to_string()), io)
            .unwrap()
            .with_settings(&settings);
        assert_eq!(engine.max_input_attempts, None);

        let mut session = engine.start(None).unwrap();
        assert!(engine.run(&mut session).await.unwrap().is_completed());
        assert_eq!(session.store().get("environment_id").map(|value| value.expose()), Some("env_1"));
    }

    fn advice_blueprint(storage: &str) -> BlueprintDocument {
        document_from_tree(json!({
            "schema_version": "1.0",
            "name": "Demo",
            "provider": "demo",
            "variables": {
                "api_key": { "required": true, "sensitive": true }
            },
            "output": { "storage_path": storage },
            "flows": [{
                "id": "onboarding",
                "steps": [
                    { "id": "capture-key", "type": "input", "save_to": "api_key" },
                    { "id": "advice", "type": "ai_prompt", "prompt_template": "Call the API with {{ api_key }}" }
                ]
            }]
        }))
        .expect("blueprint")
    }

    #[tokio::test]
    async fn cancel_during_ai_request_aborts_the_session() {
        let dir = tempfile::tempdir().unwrap();
        let io = Arc::new(ScriptedIo::new(["key-1"]).with_ai_cancelled());
        let engine = FlowEngine::new(advice_blueprint(&dir.path().display().to_string()), io).unwrap();

        let mut session = engine.start(None).unwrap();
        let outcome = engine.run(&mut session).await.unwrap();

        assert_eq!(outcome, SessionOutcome::Aborted { step_id: "advice".into() });
        assert_eq!(session.state(), SessionState::Aborted);
        assert!(session.store().is_bound("api_key"));
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn cancel_at_credentials_gate_aborts_without_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let io = Arc::new(ScriptedIo::new(["key-1"]).with_plaintext_cancelled());
        let engine = FlowEngine::new(advice_blueprint(&dir.path().display().to_string()), io).unwrap();

        let mut session = engine.start(None).unwrap();
        let outcome = engine.run(&mut session).await.unwrap();

        assert_eq!(
            outcome,
            SessionOutcome::Aborted {
                step_id: OUTPUT_STAGE.into()
            }
        );
        assert_eq!(session.state(), SessionState::Aborted);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn choice_failing_variable_pattern_is_asked_again() {
        let dir = tempfile::tempdir().unwrap();
        let document = document_from_tree(json!({
            "schema_version": "1.0",
            "name": "Demo",
            "provider": "demo",
            "variables": {
                "region": { "required": true, "validation": "^us-.*$" }
            },
            "output": { "storage_path": dir.path().display().to_string() },
            "flows": [{
                "id": "onboarding",
                "steps": [
                    { "id": "pick-region", "type": "choice", "save_to": "region", "options": ["us-east", "eu-west"] }
                ]
            }]
        }))
        .expect("blueprint");
        let io = Arc::new(ScriptedIo::new(["eu-west", "us-east"]));
        let engine = FlowEngine::new(document, io.clone()).unwrap();

        let mut session = engine.start(None).unwrap();
        assert!(engine.run(&mut session).await.unwrap().is_completed());
        assert_eq!(session.store().get("region").map(|value| value.expose()), Some("us-east"));
        assert_eq!(io.remaining(), 0);
    }
}
