//! Session lifecycle types shared between the engine and its callers.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of a single flow run.
///
/// `NotStarted -> RunningStep -> (WaitingForInput | Completed | Aborted)`, with
/// `WaitingForInput` returning to `RunningStep` once the collaborator answers.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    NotStarted,
    RunningStep,
    WaitingForInput,
    Completed,
    Aborted,
}

impl SessionState {
    /// Terminal states accept no further steps.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Aborted)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SessionState::NotStarted => "not started",
            SessionState::RunningStep => "running",
            SessionState::WaitingForInput => "waiting for input",
            SessionState::Completed => "completed",
            SessionState::Aborted => "aborted",
        };
        formatter.write_str(label)
    }
}

/// How a step was handled.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The `when` guard evaluated to false; no handler ran.
    Skipped,
    /// The handler ran to completion.
    Executed,
    /// The user cancelled while the step was waiting.
    Aborted,
}

/// Ordered history entry for a step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StepRecord {
    pub step_id: String,
    pub step_type: String,
    pub status: StepStatus,
}

/// The four files produced at completion.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Config,
    Credentials,
    MissionBrief,
    Contextifact,
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ArtifactKind::Config => "config",
            ArtifactKind::Credentials => "credentials",
            ArtifactKind::MissionBrief => "mission-brief",
            ArtifactKind::Contextifact => "contextifact",
        };
        formatter.write_str(label)
    }
}

/// A written artifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub kind: ArtifactKind,
    pub path: PathBuf,
}

/// Lifecycle events streamed to an optional observer while a session runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted {
        flow_id: String,
        at: DateTime<Utc>,
    },
    StateChanged {
        state: SessionState,
    },
    StepStarted {
        index: usize,
        step_id: String,
        label: Option<String>,
    },
    StepSkipped {
        index: usize,
        step_id: String,
    },
    StepFinished {
        index: usize,
        step_id: String,
        status: StepStatus,
    },
    ArtifactWritten {
        kind: ArtifactKind,
        path: PathBuf,
    },
    SessionFinished {
        state: SessionState,
        at: DateTime<Utc>,
    },
}
