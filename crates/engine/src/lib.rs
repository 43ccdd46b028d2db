//! # Hacksmith Engine
//!
//! The Hacksmith Engine interprets onboarding blueprints: declarative documents
//! that describe the variables to capture, the conditional steps that guide a
//! user through integrating a third-party product, and the artifacts produced
//! at the end.
//!
//! ## Key Features
//!
//! - **Blueprint Parsing**: TOML, JSON, or YAML, validated before any step runs
//! - **Template Interpolation**: `{{ dotted.path }}` placeholders resolved against
//!   captured values and static document fields
//! - **Conditional Steps**: `when: "<path> == '<literal>'"` guards
//! - **Sensitive Values**: secrets carry their sensitivity and render as
//!   `[REDACTED]` everywhere except the credentials artifact
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use hacksmith_engine::{FlowEngine, ScriptedIo, parse_blueprint_file};
//!
//! let temp_dir = tempfile::tempdir()?;
//! let blueprint_path = temp_dir.path().join("demo.blueprint.toml");
//! std::fs::write(&blueprint_path, r#"
//! schema_version = "1.0"
//! name = "Demo"
//! provider = "demo"
//!
//! [[flows]]
//! id = "onboarding"
//!
//! [[flows.steps]]
//! id = "welcome"
//! type = "info"
//! markdown = "Hello"
//! "#)?;
//!
//! let document = parse_blueprint_file(&blueprint_path)?;
//! let engine = FlowEngine::new(document, Arc::new(ScriptedIo::default()))?;
//! let session = engine.start(None)?;
//! println!("Flow: {}", session.flow_id());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! - **`store`**: bound values and their declared rules
//! - **`resolve`** / **`templates`** / **`condition`**: dotted-path lookup and
//!   the two consumers built on it
//! - **`steps`**: one handler per step type
//! - **`workflow`**: loading, session state, and the flow runner
//! - **`output`**: artifact rendering and atomic writes
//! - **`io`**: collaborator traits the UI layer implements

use std::{fs, path::Path};

pub mod condition;
pub mod error;
pub mod io;
pub mod output;
pub mod resolve;
pub mod steps;
pub mod store;
pub mod templates;
pub mod workflow;

// Re-export commonly used types for convenience
pub use condition::{Condition, ConditionSyntaxError};
pub use error::{EngineError, EngineResult};
pub use io::{AiRequest, ChoiceRequest, ConfirmationRequest, Interaction, NavigationRequest, Reply, ScriptedIo, StepIo, TextRequest};
pub use output::{CredentialSealer, OUTPUT_STAGE, OutputWriter, WriteReport};
pub use resolve::{PathResolver, Resolution};
pub use steps::{HandlerOutcome, PendingBinding, StepContext, StepHandler, handler_for};
pub use store::{BoundValue, SecretValue, VariableStore};
pub use templates::{MissingPolicy, SecretMode, TemplateResolver, extract_placeholders};
pub use workflow::document::{BlueprintFormat, parse_blueprint_str, validate_blueprint};
pub use workflow::runner::{CompletionReport, FlowEngine, SessionOutcome};
pub use workflow::session::Session;

use hacksmith_types::BlueprintDocument;

/// Loads a blueprint from the filesystem with format detection by extension.
///
/// `.toml` and `.json` files use their own parsers; anything else is read as
/// YAML. The document is validated before it is returned.
///
/// # Errors
///
/// - [`EngineError::Io`] when the file cannot be read
/// - [`EngineError::MalformedBlueprint`] when it does not parse, lacks a
///   required top-level key, names an unknown step type, or fails load-time
///   validation
pub fn parse_blueprint_file(file_path: impl AsRef<Path>) -> EngineResult<BlueprintDocument> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).map_err(|error| EngineError::Io {
        path: file_path.to_path_buf(),
        source: Box::new(error),
    })?;
    let format = BlueprintFormat::from_extension(file_path.extension().and_then(|extension| extension.to_str()));
    parse_blueprint_str(&content, format)
}
