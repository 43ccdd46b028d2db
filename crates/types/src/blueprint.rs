//! Strongly typed blueprint schema definitions shared across the engine and CLI.
//!
//! A blueprint describes the variables an onboarding session captures, the
//! ordered flows that capture them, and the artifacts written at the end. The
//! models preserve authoring order (via `IndexMap`) so prompts and summaries
//! render in the sequence the author wrote them.
//!
//! Sections such as `auth`, `slugs`, `context`, and `sdk` are free-form. They
//! are not modelled as structs; instead the document keeps the full parsed tree
//! and exposes [`BlueprintDocument::lookup`] for dotted-path access.

pub mod validation;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Step `type` discriminators understood by the engine.
pub const STEP_TYPES: [&str; 6] = ["info", "navigate", "input", "choice", "show_commands", "ai_prompt"];

/// Parsed, immutable onboarding blueprint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BlueprintDocument {
    /// Blueprint schema revision (for example, `1.0`).
    pub schema_version: String,
    /// Author-controlled content version.
    #[serde(default)]
    pub version: Option<String>,
    /// Human-readable blueprint name.
    pub name: String,
    /// Provider slug the blueprint onboards to.
    pub provider: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub preview: Option<BlueprintPreview>,
    /// Declared variables keyed by name, preserving author order.
    #[serde(default)]
    pub variables: IndexMap<String, VariableSpec>,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub contextifact: Option<ContextifactConfig>,
    /// Ordered flows; the engine runs one at a time.
    pub flows: Vec<FlowDefinition>,
    /// Full document tree used for static dotted-path lookups.
    #[serde(skip)]
    tree: JsonValue,
}

impl BlueprintDocument {
    /// Deserializes a document from a generic JSON tree and retains the tree
    /// for static lookups.
    pub fn from_tree(tree: JsonValue) -> Result<Self, serde_json::Error> {
        let mut document: BlueprintDocument = serde_json::from_value(tree.clone())?;
        document.tree = tree;
        Ok(document)
    }

    /// Walks the document tree one key at a time. Numeric segments index arrays.
    pub fn lookup<'a, S: AsRef<str>>(&'a self, segments: &[S]) -> Option<&'a JsonValue> {
        let mut current = &self.tree;
        for segment in segments {
            let segment = segment.as_ref();
            current = match current {
                JsonValue::Object(map) => map.get(segment)?,
                JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Raw access to the parsed tree.
    pub fn tree(&self) -> &JsonValue {
        &self.tree
    }

    /// Finds a flow by identifier.
    pub fn flow(&self, flow_id: &str) -> Option<&FlowDefinition> {
        self.flows.iter().find(|flow| flow.id == flow_id)
    }

    /// Returns the variable spec declared for `name`, if any.
    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables.get(name)
    }
}

/// Landing-page summary shown before a session starts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct BlueprintPreview {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub estimated_time: Option<String>,
    #[serde(default)]
    pub steps: Vec<String>,
}

/// Declared metadata for a captured value. Never mutated at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VariableSpec {
    #[serde(default)]
    pub description: Option<String>,
    /// Whether the flow may complete without this value.
    #[serde(default)]
    pub required: bool,
    /// Whether the value must be kept out of non-credential artifacts.
    #[serde(default)]
    pub sensitive: bool,
    /// Pattern the whole value must match.
    #[serde(default)]
    pub validation: Option<String>,
}

/// Artifact naming and placement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OutputConfig {
    #[serde(default = "default_storage_path")]
    pub storage_path: String,
    #[serde(default = "default_config_filename")]
    pub config_filename: String,
    #[serde(default = "default_credentials_filename")]
    pub credentials_filename: String,
    #[serde(default = "default_mission_brief_filename")]
    pub mission_brief_filename: String,
    #[serde(default = "default_contextifact_filename")]
    pub contextifact_filename: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            storage_path: default_storage_path(),
            config_filename: default_config_filename(),
            credentials_filename: default_credentials_filename(),
            mission_brief_filename: default_mission_brief_filename(),
            contextifact_filename: default_contextifact_filename(),
        }
    }
}

fn default_storage_path() -> String {
    "~/.config/hacksmith".to_string()
}

fn default_config_filename() -> String {
    "onboarding.config.json".to_string()
}

fn default_credentials_filename() -> String {
    "credentials.secrets.json".to_string()
}

fn default_mission_brief_filename() -> String {
    "mission-brief.txt".to_string()
}

fn default_contextifact_filename() -> String {
    "contextifact.txt".to_string()
}

/// Handling rules for sensitive values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SecurityConfig {
    #[serde(default)]
    pub encrypt_credentials: bool,
    /// Zero means the credentials never expire.
    #[serde(default)]
    pub credential_expiry_days: u32,
    #[serde(default = "default_require_confirmation")]
    pub require_confirmation_for_sensitive: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            encrypt_credentials: false,
            credential_expiry_days: 0,
            require_confirmation_for_sensitive: default_require_confirmation(),
        }
    }
}

fn default_require_confirmation() -> bool {
    true
}

/// Fallback prompt persisted as the contextifact.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ContextifactConfig {
    #[serde(default)]
    pub prompt_template: String,
}

/// Named, ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlowDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub steps: Vec<StepDefinition>,
}

/// One unit of a flow, optionally gated by a `when` condition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepDefinition {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    /// Equality guard such as `sdk.language == 'node'`.
    #[serde(default)]
    pub when: Option<String>,
    #[serde(flatten)]
    pub kind: StepKind,
}

impl StepDefinition {
    /// Title when present, otherwise the step identifier.
    pub fn label(&self) -> &str {
        self.title.as_deref().unwrap_or(&self.id)
    }
}

/// Step payload keyed by the `type` field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StepKind {
    Info(InfoStep),
    Navigate(NavigateStep),
    Input(InputStep),
    Choice(ChoiceStep),
    ShowCommands(ShowCommandsStep),
    AiPrompt(AiPromptStep),
}

impl StepKind {
    /// The `type` discriminator as authored.
    pub fn type_name(&self) -> &'static str {
        match self {
            StepKind::Info(_) => "info",
            StepKind::Navigate(_) => "navigate",
            StepKind::Input(_) => "input",
            StepKind::Choice(_) => "choice",
            StepKind::ShowCommands(_) => "show_commands",
            StepKind::AiPrompt(_) => "ai_prompt",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InfoStep {
    #[serde(default)]
    pub markdown: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct NavigateStep {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub instructions: Vec<String>,
}

/// Captures either a single value (`save_to`) or several (`inputs`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InputStep {
    #[serde(default)]
    pub save_to: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputField>,
    #[serde(default)]
    pub validate: Option<InputValidation>,
    /// Optional prompt copy; defaults to the step title.
    #[serde(default)]
    pub prompt: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InputField {
    pub name: String,
    #[serde(default)]
    pub sensitive: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub validate: Option<InputValidation>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct InputValidation {
    pub pattern: String,
    /// Hint shown when a value is rejected.
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ChoiceStep {
    #[serde(default)]
    pub save_to: String,
    #[serde(default)]
    pub options: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ShowCommandsStep {
    #[serde(default)]
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AiPromptStep {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub prompt_template: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_tree() -> JsonValue {
        json!({
            "schema_version": "1.0",
            "name": "Demo",
            "provider": "demo",
            "auth": { "callback_path": "/auth/callback" },
            "context": { "github_samples": { "sample_apps": ["https://github.com/example/app"] } },
            "variables": {
                "environment_id": { "required": true, "validation": "^env_[0-9]+$" }
            },
            "flows": [{
                "id": "onboarding",
                "steps": [
                    { "id": "welcome", "type": "info", "markdown": "hi" },
                    { "id": "stack", "type": "choice", "save_to": "sdk.language", "options": ["node", "go"] },
                    { "id": "node", "type": "show_commands", "when": "sdk.language == 'node'", "commands": ["npm i"] }
                ]
            }]
        })
    }

    #[test]
    fn deserializes_tagged_steps() {
        let document = BlueprintDocument::from_tree(sample_tree()).expect("parse");
        let steps = &document.flows[0].steps;
        assert!(matches!(steps[0].kind, StepKind::Info(ref info) if info.markdown == "hi"));
        assert!(matches!(steps[1].kind, StepKind::Choice(ref choice) if choice.options.len() == 2));
        assert_eq!(steps[2].when.as_deref(), Some("sdk.language == 'node'"));
        assert_eq!(steps[2].kind.type_name(), "show_commands");
    }

    #[test]
    fn applies_output_and_security_defaults() {
        let document = BlueprintDocument::from_tree(sample_tree()).expect("parse");
        assert_eq!(document.output.config_filename, "onboarding.config.json");
        assert!(document.security.require_confirmation_for_sensitive);
        assert!(!document.security.encrypt_credentials);
    }

    #[test]
    fn looks_up_nested_static_fields() {
        let document = BlueprintDocument::from_tree(sample_tree()).expect("parse");
        assert_eq!(document.lookup(&["auth", "callback_path"]), Some(&json!("/auth/callback")));
        assert_eq!(
            document.lookup(&["context", "github_samples", "sample_apps", "0"]),
            Some(&json!("https://github.com/example/app"))
        );
        assert!(document.lookup(&["auth", "missing"]).is_none());
    }

    #[test]
    fn rejects_unknown_step_type() {
        let mut tree = sample_tree();
        tree["flows"][0]["steps"][0]["type"] = json!("teleport");
        assert!(BlueprintDocument::from_tree(tree).is_err());
    }
}
