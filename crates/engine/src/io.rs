//! Collaborators the engine delegates user interaction to.
//!
//! The engine never touches a terminal, browser, or AI backend itself. Each
//! suspension point is a method on [`StepIo`]; a UI layer implements it and
//! hands an `Arc<dyn StepIo>` to the [`crate::FlowEngine`].

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

/// Answer from a suspension point: a value, or an explicit cancellation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply<T> {
    Answer(T),
    Abort,
}

/// Request for one line of free text bound to `variable`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextRequest {
    pub step_id: String,
    pub variable: String,
    pub title: String,
    pub description: Option<String>,
    /// Set after a rejected attempt.
    pub hint: Option<String>,
    /// The UI should not echo the answer.
    pub sensitive: bool,
    /// 1-based.
    pub attempt: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceRequest {
    pub step_id: String,
    pub variable: String,
    pub title: String,
    pub options: Vec<String>,
    pub hint: Option<String>,
    pub attempt: u32,
}

/// A URL the user should open, with rendered instructions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationRequest {
    pub step_id: String,
    pub title: String,
    pub url: String,
    pub instructions: Vec<String>,
}

/// Prompt for the AI collaborator. The prompt may contain real secrets, so
/// `Debug` prints only its length.
#[derive(Clone, PartialEq, Eq)]
pub struct AiRequest {
    pub step_id: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub prompt: String,
}

impl fmt::Debug for AiRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AiRequest")
            .field("step_id", &self.step_id)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("prompt_len", &self.prompt.len())
            .finish()
    }
}

/// Gate shown before credentials are written in clear text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationRequest {
    pub provider: String,
    pub path: PathBuf,
    pub variables: Vec<String>,
}

/// User-facing side of a session.
///
/// Errors returned here are wrapped as collaborator failures and end the run;
/// cancellation is expressed with [`Reply::Abort`] instead.
#[async_trait::async_trait]
pub trait StepIo: Send + Sync {
    async fn acquire_text(&self, request: &TextRequest) -> Result<Reply<String>>;

    async fn present_choice(&self, request: &ChoiceRequest) -> Result<Reply<String>>;

    async fn acknowledge_navigation(&self, request: &NavigationRequest) -> Result<Reply<()>>;

    /// Produces advisory text. The engine masks secrets in the response
    /// before showing or persisting it. The user may cancel while waiting.
    async fn generate_ai_response(&self, request: &AiRequest) -> Result<Reply<String>>;

    async fn show_info(&self, title: &str, markdown: &str) -> Result<()>;

    async fn show_commands(&self, title: &str, commands: &[String]) -> Result<()>;

    async fn show_advice(&self, title: &str, advice: &str) -> Result<()>;

    /// `Answer(true)` when the user allows plaintext credentials on disk.
    async fn confirm_sensitive_write(&self, request: &ConfirmationRequest) -> Result<Reply<bool>>;
}

/// What a [`ScriptedIo`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Text { step_id: String, variable: String, hint: Option<String> },
    Choice { step_id: String, variable: String, options: Vec<String> },
    Navigation { step_id: String, url: String },
    Ai { step_id: String, prompt: String },
    Info { title: String, markdown: String },
    Commands { title: String, commands: Vec<String> },
    Advice { title: String, advice: String },
    Confirmation { path: PathBuf },
}

/// Collaborator that replays canned answers.
///
/// Text and choice prompts consume answers in order; once the queue is empty
/// every prompt aborts. Navigation is always acknowledged. Useful for tests,
/// previews, and unattended runs.
#[derive(Debug)]
pub struct ScriptedIo {
    answers: Mutex<VecDeque<Reply<String>>>,
    ai_response: Reply<String>,
    plaintext_consent: Reply<bool>,
    transcript: Mutex<Vec<Interaction>>,
}

impl ScriptedIo {
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_replies(answers.into_iter().map(|answer| Reply::Answer(answer.into())))
    }

    pub fn from_replies(replies: impl IntoIterator<Item = Reply<String>>) -> Self {
        Self {
            answers: Mutex::new(replies.into_iter().collect()),
            ai_response: Reply::Answer(String::new()),
            plaintext_consent: Reply::Answer(true),
            transcript: Mutex::new(Vec::new()),
        }
    }

    /// Text returned by every AI request.
    pub fn with_ai_response(mut self, response: impl Into<String>) -> Self {
        self.ai_response = Reply::Answer(response.into());
        self
    }

    /// Cancels the session while the AI response is pending.
    pub fn with_ai_cancelled(mut self) -> Self {
        self.ai_response = Reply::Abort;
        self
    }

    /// Answer for the plaintext credentials gate. Defaults to `true`.
    pub fn with_plaintext_consent(mut self, allow: bool) -> Self {
        self.plaintext_consent = Reply::Answer(allow);
        self
    }

    /// Cancels the session at the plaintext credentials gate.
    pub fn with_plaintext_cancelled(mut self) -> Self {
        self.plaintext_consent = Reply::Abort;
        self
    }

    /// Snapshot of every interaction so far.
    pub fn transcript(&self) -> Vec<Interaction> {
        self.transcript.lock().map(|entries| entries.clone()).unwrap_or_default()
    }

    /// Answers that were never consumed.
    pub fn remaining(&self) -> usize {
        self.answers.lock().map(|answers| answers.len()).unwrap_or_default()
    }

    fn next_reply(&self) -> Result<Reply<String>> {
        let mut answers = self.answers.lock().map_err(|_| anyhow!("scripted answer queue is poisoned"))?;
        Ok(answers.pop_front().unwrap_or(Reply::Abort))
    }

    fn record(&self, interaction: Interaction) -> Result<()> {
        self.transcript
            .lock()
            .map_err(|_| anyhow!("scripted transcript is poisoned"))?
            .push(interaction);
        Ok(())
    }
}

impl Default for ScriptedIo {
    fn default() -> Self {
        Self::from_replies(Vec::new())
    }
}

#[async_trait::async_trait]
impl StepIo for ScriptedIo {
    async fn acquire_text(&self, request: &TextRequest) -> Result<Reply<String>> {
        self.record(Interaction::Text {
            step_id: request.step_id.clone(),
            variable: request.variable.clone(),
            hint: request.hint.clone(),
        })?;
        self.next_reply()
    }

    async fn present_choice(&self, request: &ChoiceRequest) -> Result<Reply<String>> {
        self.record(Interaction::Choice {
            step_id: request.step_id.clone(),
            variable: request.variable.clone(),
            options: request.options.clone(),
        })?;
        self.next_reply()
    }

    async fn acknowledge_navigation(&self, request: &NavigationRequest) -> Result<Reply<()>> {
        self.record(Interaction::Navigation {
            step_id: request.step_id.clone(),
            url: request.url.clone(),
        })?;
        Ok(Reply::Answer(()))
    }

    async fn generate_ai_response(&self, request: &AiRequest) -> Result<Reply<String>> {
        self.record(Interaction::Ai {
            step_id: request.step_id.clone(),
            prompt: request.prompt.clone(),
        })?;
        Ok(self.ai_response.clone())
    }

    async fn show_info(&self, title: &str, markdown: &str) -> Result<()> {
        self.record(Interaction::Info {
            title: title.to_string(),
            markdown: markdown.to_string(),
        })
    }

    async fn show_commands(&self, title: &str, commands: &[String]) -> Result<()> {
        self.record(Interaction::Commands {
            title: title.to_string(),
            commands: commands.to_vec(),
        })
    }

    async fn show_advice(&self, title: &str, advice: &str) -> Result<()> {
        self.record(Interaction::Advice {
            title: title.to_string(),
            advice: advice.to_string(),
        })
    }

    async fn confirm_sensitive_write(&self, request: &ConfirmationRequest) -> Result<Reply<bool>> {
        self.record(Interaction::Confirmation {
            path: request.path.clone(),
        })?;
        Ok(self.plaintext_consent.clone())
    }
}
