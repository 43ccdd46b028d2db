//! Per-run session state.
//!
//! A [`Session`] is an explicit value owned by the caller and threaded through
//! [`crate::FlowEngine`] operations, so independent sessions never share
//! mutable state.

use chrono::{DateTime, Utc};
use hacksmith_types::{ArtifactRecord, SessionState, StepRecord, StepStatus};

use crate::store::VariableStore;

/// One run of one flow.
#[derive(Debug, Clone)]
pub struct Session {
    pub(crate) flow_id: String,
    pub(crate) step_index: usize,
    pub(crate) state: SessionState,
    pub(crate) store: VariableStore,
    pub(crate) history: Vec<StepRecord>,
    pub(crate) visited_urls: Vec<String>,
    pub(crate) advice: Option<String>,
    pub(crate) ai_step_id: Option<String>,
    pub(crate) artifacts: Vec<ArtifactRecord>,
    pub(crate) started_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(flow_id: String, store: VariableStore) -> Self {
        Self {
            flow_id,
            step_index: 0,
            state: SessionState::NotStarted,
            store,
            history: Vec::new(),
            visited_urls: Vec::new(),
            advice: None,
            ai_step_id: None,
            artifacts: Vec::new(),
            started_at: Utc::now(),
        }
    }

    pub fn flow_id(&self) -> &str {
        &self.flow_id
    }

    /// Index of the next step to run.
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn store(&self) -> &VariableStore {
        &self.store
    }

    pub fn history(&self) -> &[StepRecord] {
        &self.history
    }

    pub fn visited_urls(&self) -> &[String] {
        &self.visited_urls
    }

    /// Latest scrubbed AI advice.
    pub fn advice(&self) -> Option<&str> {
        self.advice.as_deref()
    }

    /// Id of the `ai_prompt` step that produced [`Session::advice`].
    pub fn ai_step_id(&self) -> Option<&str> {
        self.ai_step_id.as_deref()
    }

    pub fn artifacts(&self) -> &[ArtifactRecord] {
        &self.artifacts
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn is_finished(&self) -> bool {
        self.state.is_terminal()
    }

    /// Ids of steps with the given status, in execution order.
    pub fn steps_with_status(&self, status: StepStatus) -> Vec<&str> {
        self.history
            .iter()
            .filter(|record| record.status == status)
            .map(|record| record.step_id.as_str())
            .collect()
    }
}
