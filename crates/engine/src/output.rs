//! Artifact emission.
//!
//! Four files come out of a completed session:
//!
//! - **config**: non-sensitive declared variables and runtime selections, JSON.
//! - **credentials**: every sensitive binding, JSON. Sealed through a
//!   [`CredentialSealer`] when `security.encrypt_credentials` is on, otherwise
//!   written in clear text behind the confirmation gate.
//! - **mission brief**: human-readable summary with secrets redacted.
//! - **contextifact**: the AI integration prompt rendered with secrets masked,
//!   followed by the scrubbed advice.
//!
//! All artifacts are rendered before any file is written, so a template error
//! or a cancel at the confirmation gate never leaves a partial set on disk. Each file is staged and renamed into
//! place by [`hacksmith_util::write_atomic`].

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use hacksmith_types::{ArtifactKind, ArtifactRecord, BlueprintDocument, StepKind};
use hacksmith_util::{FileMode, KeychainSealer, PersistError, write_atomic};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};
use crate::io::{ConfirmationRequest, Reply, StepIo};
use crate::resolve::PathResolver;
use crate::store::{BoundValue, SecretValue};
use crate::templates::{MissingPolicy, SecretMode, TemplateResolver};
use crate::workflow::session::Session;

/// Encryption collaborator for the credentials artifact.
///
/// Implementations return the text to persist in place of the secret. It must
/// not contain the plaintext.
pub trait CredentialSealer: Send + Sync {
    fn seal(&self, name: &str, secret: &SecretValue) -> anyhow::Result<String>;
}

impl CredentialSealer for KeychainSealer {
    fn seal(&self, name: &str, secret: &SecretValue) -> anyhow::Result<String> {
        Ok(KeychainSealer::seal(self, name, secret.expose())?)
    }
}

/// Step id reported for failures and cancellations at the output stage.
pub const OUTPUT_STAGE: &str = "output";

/// Files written by [`OutputWriter::write_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteReport {
    pub artifacts: Vec<ArtifactRecord>,
    /// Sensitive values exist but the plaintext gate was declined.
    pub credentials_withheld: bool,
}

#[derive(Serialize)]
struct ConfigArtifact<'a> {
    schema_version: &'a str,
    blueprint: &'a str,
    blueprint_version: Option<&'a str>,
    provider: &'a str,
    flow: &'a str,
    generated_at: DateTime<Utc>,
    variables: IndexMap<&'a str, &'a BoundValue>,
    selections: IndexMap<&'a str, &'a BoundValue>,
}

#[derive(Serialize)]
struct CredentialsArtifact<'a> {
    provider: &'a str,
    generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expires_at: Option<DateTime<Utc>>,
    encrypted: bool,
    credentials: IndexMap<&'a str, String>,
}

/// Rendered credentials plus whether they still need the plaintext gate.
struct RenderedCredentials {
    content: String,
    plaintext: bool,
    names: Vec<String>,
}

pub struct OutputWriter<'a> {
    document: &'a BlueprintDocument,
    output_dir: PathBuf,
    sealer: Option<&'a dyn CredentialSealer>,
    generated_at: DateTime<Utc>,
}

impl<'a> OutputWriter<'a> {
    pub fn new(document: &'a BlueprintDocument, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            document,
            output_dir: output_dir.into(),
            sealer: None,
            generated_at: Utc::now(),
        }
    }

    pub fn with_sealer(mut self, sealer: Option<&'a dyn CredentialSealer>) -> Self {
        self.sealer = sealer;
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn path_for(&self, kind: ArtifactKind) -> PathBuf {
        let output = &self.document.output;
        let file_name = match kind {
            ArtifactKind::Config => &output.config_filename,
            ArtifactKind::Credentials => &output.credentials_filename,
            ArtifactKind::MissionBrief => &output.mission_brief_filename,
            ArtifactKind::Contextifact => &output.contextifact_filename,
        };
        self.output_dir.join(file_name)
    }

    /// Renders and writes every artifact for a completed flow.
    ///
    /// Returns `None` when the user cancels at the plaintext confirmation
    /// gate; nothing is written in that case.
    pub async fn write_all(&self, session: &Session, io: &dyn StepIo) -> EngineResult<Option<WriteReport>> {
        let config = self.render_config(session)?;
        let brief = self.render_mission_brief(session, MissingPolicy::Strict)?;
        let contextifact = self.render_contextifact(session)?;
        let credentials = self.render_credentials(session)?;

        let mut report = WriteReport::default();
        let credentials = match credentials {
            Some(rendered) if rendered.plaintext && self.document.security.require_confirmation_for_sensitive => {
                let request = ConfirmationRequest {
                    provider: self.document.provider.clone(),
                    path: self.path_for(ArtifactKind::Credentials),
                    variables: rendered.names.clone(),
                };
                let reply = io
                    .confirm_sensitive_write(&request)
                    .await
                    .map_err(|error| EngineError::collaborator(OUTPUT_STAGE, error))?;
                let Reply::Answer(allowed) = reply else {
                    info!("cancelled at the plaintext credentials gate; no artifacts written");
                    return Ok(None);
                };
                if allowed {
                    Some(rendered)
                } else {
                    warn!(path = %request.path.display(), "plaintext credentials declined; credentials artifact not written");
                    report.credentials_withheld = true;
                    None
                }
            }
            other => other,
        };

        report.artifacts.push(self.persist(ArtifactKind::Config, &config, FileMode::Standard)?);
        if let Some(credentials) = credentials {
            report
                .artifacts
                .push(self.persist(ArtifactKind::Credentials, &credentials.content, FileMode::Private)?);
        }
        report
            .artifacts
            .push(self.persist(ArtifactKind::MissionBrief, &brief, FileMode::Standard)?);
        if let Some(contextifact) = contextifact {
            report
                .artifacts
                .push(self.persist(ArtifactKind::Contextifact, &contextifact, FileMode::Standard)?);
        }

        info!(dir = %self.output_dir.display(), count = report.artifacts.len(), "artifacts written");
        Ok(Some(report))
    }

    /// Writes the config and mission brief for a session that has not finished.
    pub fn write_checkpoint(&self, session: &Session) -> EngineResult<Vec<ArtifactRecord>> {
        if session.is_finished() {
            return Err(EngineError::InvalidSession(format!(
                "{} sessions cannot be checkpointed",
                session.state()
            )));
        }
        let config = self.render_config(session)?;
        let brief = self.render_mission_brief(session, MissingPolicy::Lenient)?;
        Ok(vec![
            self.persist(ArtifactKind::Config, &config, FileMode::Standard)?,
            self.persist(ArtifactKind::MissionBrief, &brief, FileMode::Standard)?,
        ])
    }

    pub fn render_config(&self, session: &Session) -> EngineResult<String> {
        let store = session.store();
        let mut variables = IndexMap::new();
        for (name, _) in store.specs() {
            if let Some(value) = store.get(name)
                && !value.is_sensitive()
            {
                variables.insert(name.as_str(), value);
            }
        }
        let selections = store
            .bindings()
            .filter(|(name, value)| store.spec(name).is_none() && !value.is_sensitive())
            .map(|(name, value)| (name.as_str(), value))
            .collect();

        let artifact = ConfigArtifact {
            schema_version: &self.document.schema_version,
            blueprint: &self.document.name,
            blueprint_version: self.document.version.as_deref(),
            provider: &self.document.provider,
            flow: session.flow_id(),
            generated_at: self.generated_at,
            variables,
            selections,
        };
        serde_json::to_string_pretty(&artifact).map_err(|error| self.io_error(ArtifactKind::Config, error))
    }

    fn render_credentials(&self, session: &Session) -> EngineResult<Option<RenderedCredentials>> {
        let secrets: Vec<(&str, &SecretValue)> = session
            .store()
            .bindings()
            .filter_map(|(name, value)| match value {
                BoundValue::Sensitive(secret) => Some((name.as_str(), secret)),
                BoundValue::Plain(_) => None,
            })
            .collect();
        if secrets.is_empty() {
            debug!("no sensitive bindings; credentials artifact skipped");
            return Ok(None);
        }

        let security = &self.document.security;
        let encrypted = security.encrypt_credentials;
        let mut credentials = IndexMap::new();
        for (name, secret) in &secrets {
            let stored = if encrypted {
                self.seal(name, secret)?
            } else {
                secret.expose().to_string()
            };
            credentials.insert(*name, stored);
        }

        let expires_at = (security.credential_expiry_days > 0)
            .then(|| TimeDelta::try_days(i64::from(security.credential_expiry_days)))
            .flatten()
            .and_then(|delta| self.generated_at.checked_add_signed(delta));

        let artifact = CredentialsArtifact {
            provider: &self.document.provider,
            generated_at: self.generated_at,
            expires_at,
            encrypted,
            credentials,
        };
        let content =
            serde_json::to_string_pretty(&artifact).map_err(|error| self.io_error(ArtifactKind::Credentials, error))?;
        Ok(Some(RenderedCredentials {
            content,
            plaintext: !encrypted,
            names: secrets.iter().map(|(name, _)| name.to_string()).collect(),
        }))
    }

    fn seal(&self, name: &str, secret: &SecretValue) -> EngineResult<String> {
        let sealer = self.sealer.ok_or_else(|| EngineError::Sealing {
            message: "encrypt_credentials is enabled but no credential sealer is configured".into(),
        })?;
        let sealed = sealer.seal(name, secret).map_err(|error| EngineError::Sealing {
            message: format!("could not seal '{name}': {error:#}"),
        })?;
        if !secret.expose().is_empty() && sealed.contains(secret.expose()) {
            return Err(EngineError::Sealing {
                message: format!("sealer returned plaintext for '{name}'"),
            });
        }
        Ok(sealed)
    }

    /// Summary text. `missing` governs placeholders in static copy.
    pub fn render_mission_brief(&self, session: &Session, missing: MissingPolicy) -> EngineResult<String> {
        let document = self.document;
        let store = session.store();
        let templates = TemplateResolver::new(PathResolver::new(store, document));
        let render = |text: &str| templates.render(text, SecretMode::Masked, missing, "mission brief");

        let mut brief = String::new();
        let flow_title = document
            .flow(session.flow_id())
            .and_then(|flow| flow.title.as_deref())
            .unwrap_or(session.flow_id());
        let _ = writeln!(brief, "# {} mission brief", document.name);
        let _ = writeln!(brief);
        let _ = writeln!(brief, "Provider: {}", document.provider);
        let _ = writeln!(brief, "Flow: {flow_title}");
        let _ = writeln!(brief, "Generated: {}", self.generated_at.to_rfc3339());
        if let Some(description) = &document.description {
            let _ = writeln!(brief, "\n{}", render(description)?.trim_end());
        }

        if let Some(preview) = document.preview.as_ref().filter(|preview| preview.enabled) {
            let _ = writeln!(brief, "\n## {}", preview.title.as_deref().unwrap_or("Preview"));
            if let Some(estimate) = &preview.estimated_time {
                let _ = writeln!(brief, "Estimated time: {estimate}");
            }
            for step in &preview.steps {
                let _ = writeln!(brief, "- {}", render(step)?);
            }
        }

        let _ = writeln!(brief, "\n## Variables");
        for (name, spec) in store.specs() {
            let value = store.get(name).map(BoundValue::masked).unwrap_or("(not captured)");
            match &spec.description {
                Some(description) => {
                    let _ = writeln!(brief, "- {name}: {value} ({description})");
                }
                None => {
                    let _ = writeln!(brief, "- {name}: {value}");
                }
            }
        }

        let selections: Vec<_> = store.bindings().filter(|(name, _)| store.spec(name).is_none()).collect();
        if !selections.is_empty() {
            let _ = writeln!(brief, "\n## Selections");
            for (name, value) in selections {
                let _ = writeln!(brief, "- {name}: {}", value.masked());
            }
        }

        if !session.visited_urls().is_empty() {
            let _ = writeln!(brief, "\n## Visited");
            for url in session.visited_urls() {
                let _ = writeln!(brief, "- {url}");
            }
        }

        let mut links = Vec::new();
        if let Some(context) = document.tree().get("context") {
            string_leaves("context", context, &mut links);
        }
        if !links.is_empty() {
            let _ = writeln!(brief, "\n## Reference links");
            for (path, text) in links {
                let _ = writeln!(brief, "- {path}: {}", render(text)?);
            }
        }

        Ok(brief)
    }

    /// The AI prompt with secrets masked, plus advice. `None` when the
    /// blueprint has no prompt to record.
    pub fn render_contextifact(&self, session: &Session) -> EngineResult<Option<String>> {
        let executed_template = session.ai_step_id().and_then(|step_id| {
            self.document
                .flow(session.flow_id())?
                .steps
                .iter()
                .find(|step| step.id == step_id)
                .and_then(|step| match &step.kind {
                    StepKind::AiPrompt(ai) => Some(ai.prompt_template.as_str()),
                    _ => None,
                })
        });
        let fallback = self
            .document
            .contextifact
            .as_ref()
            .map(|contextifact| contextifact.prompt_template.as_str())
            .filter(|template| !template.trim().is_empty());
        let Some(template) = executed_template.or(fallback) else {
            debug!("no prompt template; contextifact skipped");
            return Ok(None);
        };

        let store = session.store();
        let templates = TemplateResolver::new(PathResolver::new(store, self.document));
        let mut contextifact = templates.render(template, SecretMode::Masked, MissingPolicy::Strict, "contextifact")?;
        if let Some(advice) = session.advice().filter(|advice| !advice.trim().is_empty()) {
            let _ = write!(contextifact, "\n\n## Advice\n\n{}", advice.trim_end());
        }
        if !contextifact.ends_with('\n') {
            contextifact.push('\n');
        }
        Ok(Some(contextifact))
    }

    fn persist(&self, kind: ArtifactKind, content: &str, mode: FileMode) -> EngineResult<ArtifactRecord> {
        self.persist_with(kind, content, mode, write_atomic)
    }

    /// Writes through `write`, retrying a failed attempt once.
    fn persist_with<W>(&self, kind: ArtifactKind, content: &str, mode: FileMode, write: W) -> EngineResult<ArtifactRecord>
    where
        W: Fn(&Path, &[u8], FileMode) -> Result<(), PersistError>,
    {
        let path = self.path_for(kind);
        if let Err(error) = write(&path, content.as_bytes(), mode) {
            warn!(artifact = %kind, path = %path.display(), error = %error, "artifact write failed; retrying once");
            write(&path, content.as_bytes(), mode).map_err(|error| EngineError::Io {
                path: path.clone(),
                source: Box::new(error),
            })?;
        }
        debug!(artifact = %kind, path = %path.display(), "artifact written");
        Ok(ArtifactRecord { kind, path })
    }

    fn io_error(&self, kind: ArtifactKind, error: serde_json::Error) -> EngineError {
        EngineError::Io {
            path: self.path_for(kind),
            source: Box::new(error),
        }
    }
}

fn string_leaves<'v>(prefix: &str, value: &'v Value, out: &mut Vec<(String, &'v str)>) {
    match value {
        Value::String(text) => out.push((prefix.to_string(), text)),
        Value::Object(map) => {
            for (key, child) in map {
                string_leaves(&format!("{prefix}.{key}"), child, out);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter().enumerate() {
                string_leaves(&format!("{prefix}.{index}"), child, out);
            }
        }
        _ => {}
    }
}
