//! Blueprint loading and load-time validation.
//!
//! A blueprint is parsed into a generic JSON tree first so structural problems
//! (missing top-level keys, unknown step types) can be reported with the step
//! that caused them, before serde's typed deserialization produces a less
//! specific message. Every check here runs before any step executes.

use std::collections::HashSet;

use hacksmith_types::{BlueprintDocument, STEP_TYPES, StepDefinition};
use serde_json::Value;

use crate::condition::Condition;
use crate::error::{EngineError, EngineResult};
use crate::steps::handler_for;
use crate::store::VariableStore;

/// Top-level keys every blueprint declares.
pub const REQUIRED_KEYS: [&str; 4] = ["schema_version", "name", "provider", "flows"];

/// Serialization formats accepted on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlueprintFormat {
    Toml,
    Json,
    Yaml,
}

impl BlueprintFormat {
    /// Picks a format from a file extension; anything unrecognised is YAML.
    pub fn from_extension(extension: Option<&str>) -> Self {
        match extension.map(str::to_ascii_lowercase).as_deref() {
            Some("toml") => BlueprintFormat::Toml,
            Some("json") => BlueprintFormat::Json,
            _ => BlueprintFormat::Yaml,
        }
    }
}

/// Parses and validates a blueprint from text.
pub fn parse_blueprint_str(content: &str, format: BlueprintFormat) -> EngineResult<BlueprintDocument> {
    let tree: Value = match format {
        BlueprintFormat::Toml => toml::from_str(content).map_err(|error| EngineError::malformed(error.to_string()))?,
        BlueprintFormat::Json => serde_json::from_str(content).map_err(|error| EngineError::malformed(error.to_string()))?,
        BlueprintFormat::Yaml => serde_yaml::from_str(content).map_err(|error| EngineError::malformed(error.to_string()))?,
    };
    document_from_tree(tree)
}

/// Checks the raw structure, deserializes, and validates.
pub fn document_from_tree(tree: Value) -> EngineResult<BlueprintDocument> {
    check_structure(&tree)?;
    let document = BlueprintDocument::from_tree(tree).map_err(|error| EngineError::malformed(error.to_string()))?;
    validate_blueprint(&document)?;
    Ok(document)
}

fn check_structure(tree: &Value) -> EngineResult<()> {
    let Some(root) = tree.as_object() else {
        return Err(EngineError::malformed("blueprint must be a table of keys"));
    };

    let missing: Vec<&str> = REQUIRED_KEYS.iter().copied().filter(|key| !root.contains_key(*key)).collect();
    if !missing.is_empty() {
        return Err(EngineError::malformed(format!("missing required keys: {}", missing.join(", "))));
    }

    let Some(flows) = root.get("flows").and_then(Value::as_array) else {
        return Err(EngineError::malformed("'flows' must be a list"));
    };

    for step in flows.iter().filter_map(|flow| flow.get("steps")).filter_map(Value::as_array).flatten() {
        let step_id = step.get("id").and_then(Value::as_str).map(str::to_string);
        let error = |message: String| EngineError::MalformedBlueprint {
            step_id: step_id.clone(),
            message,
        };
        match step.get("type").and_then(Value::as_str) {
            None => return Err(error("step is missing its 'type'".to_string())),
            Some(step_type) if !STEP_TYPES.contains(&step_type) => {
                return Err(error(format!(
                    "unknown step type '{step_type}'; expected one of {}",
                    STEP_TYPES.join(", ")
                )));
            }
            Some(_) => {}
        }
    }

    Ok(())
}

/// Validates flows, steps, conditions, and patterns of a typed document.
pub fn validate_blueprint(document: &BlueprintDocument) -> EngineResult<()> {
    VariableStore::new(&document.variables)?;

    if document.flows.is_empty() {
        return Err(EngineError::malformed("blueprint declares no flows"));
    }

    let mut flow_ids = HashSet::new();
    for flow in &document.flows {
        let flow_id = flow.id.trim();
        if flow_id.is_empty() {
            return Err(EngineError::malformed("flow id must not be empty"));
        }
        if !flow_ids.insert(flow_id) {
            return Err(EngineError::malformed(format!("flow '{flow_id}' is declared twice")));
        }
        if flow.steps.is_empty() {
            return Err(EngineError::malformed(format!("flow '{flow_id}' has no steps")));
        }

        let mut step_ids = HashSet::new();
        for step in &flow.steps {
            if step.id.trim().is_empty() {
                return Err(EngineError::malformed(format!("flow '{flow_id}' has a step without an id")));
            }
            if !step_ids.insert(step.id.as_str()) {
                return Err(EngineError::malformed_step(&step.id, format!("step id is repeated in flow '{flow_id}'")));
            }
            validate_step(step, document)?;
        }
    }

    if let Some(contextifact) = &document.contextifact
        && let Some(expression) = crate::templates::first_invalid_placeholder(&contextifact.prompt_template)
    {
        return Err(EngineError::malformed(format!(
            "contextifact prompt has an invalid placeholder '{expression}'"
        )));
    }

    Ok(())
}

fn validate_step(step: &StepDefinition, document: &BlueprintDocument) -> EngineResult<()> {
    if let Some(expression) = &step.when {
        Condition::parse(expression)
            .map_err(|error| EngineError::malformed_step(&step.id, format!("invalid condition '{expression}': {error}")))?;
    }
    handler_for(&step.kind).validate(step, document)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
schema_version = "1.0"
name = "Demo"
provider = "demo"

[variables.environment_id]
required = true
validation = "^env_[0-9]+$"

[[flows]]
id = "onboarding"

[[flows.steps]]
id = "capture-env-id"
type = "input"
save_to = "environment_id"
"#;

    #[test]
    fn parses_toml_blueprints() {
        let document = parse_blueprint_str(MINIMAL, BlueprintFormat::Toml).expect("parse");
        assert_eq!(document.flows[0].steps[0].id, "capture-env-id");
        assert!(document.variable("environment_id").is_some_and(|spec| spec.required));
    }

    #[test]
    fn parses_yaml_and_json_blueprints() {
        let yaml = r#"
schema_version: "1.0"
name: Demo
provider: demo
flows:
  - id: onboarding
    steps:
      - id: welcome
        type: info
        markdown: Hello
"#;
        assert!(parse_blueprint_str(yaml, BlueprintFormat::Yaml).is_ok());

        let json = r#"{"schema_version":"1.0","name":"Demo","provider":"demo","flows":[{"id":"f","steps":[{"id":"s","type":"info","markdown":"Hi"}]}]}"#;
        assert!(parse_blueprint_str(json, BlueprintFormat::Json).is_ok());
    }

    #[test]
    fn detects_format_from_extension() {
        assert_eq!(BlueprintFormat::from_extension(Some("TOML")), BlueprintFormat::Toml);
        assert_eq!(BlueprintFormat::from_extension(Some("json")), BlueprintFormat::Json);
        assert_eq!(BlueprintFormat::from_extension(Some("yml")), BlueprintFormat::Yaml);
        assert_eq!(BlueprintFormat::from_extension(None), BlueprintFormat::Yaml);
    }

    #[test]
    fn reports_missing_top_level_keys() {
        let error = parse_blueprint_str("name = \"Demo\"\nflows = []\n", BlueprintFormat::Toml).expect_err("missing keys");
        assert!(error.to_string().contains("schema_version, provider"));
    }

    #[test]
    fn reports_unknown_step_type_with_step_id() {
        let content = MINIMAL.replace("type = \"input\"", "type = \"teleport\"");
        let error = parse_blueprint_str(&content, BlueprintFormat::Toml).expect_err("unknown type");
        assert!(matches!(
            error,
            EngineError::MalformedBlueprint { step_id: Some(ref id), ref message } if id == "capture-env-id" && message.contains("teleport")
        ));
    }

    #[test]
    fn rejects_invalid_conditions_at_load_time() {
        let content = format!("{MINIMAL}when = \"sdk.language = node\"\n");
        let error = parse_blueprint_str(&content, BlueprintFormat::Toml).expect_err("bad condition");
        assert!(matches!(error, EngineError::MalformedBlueprint { step_id: Some(_), .. }));
    }

    #[test]
    fn rejects_duplicate_step_ids() {
        let content = format!("{MINIMAL}\n[[flows.steps]]\nid = \"capture-env-id\"\ntype = \"info\"\nmarkdown = \"again\"\n");
        assert!(parse_blueprint_str(&content, BlueprintFormat::Toml).is_err());
    }

    #[test]
    fn rejects_invalid_variable_patterns() {
        let content = MINIMAL.replace("^env_[0-9]+$", "(");
        assert!(parse_blueprint_str(&content, BlueprintFormat::Toml).is_err());
    }

    #[test]
    fn rejects_flows_without_steps() {
        let content = "schema_version = \"1.0\"\nname = \"Demo\"\nprovider = \"demo\"\n\n[[flows]]\nid = \"empty\"\n";
        assert!(parse_blueprint_str(content, BlueprintFormat::Toml).is_err());
    }
}
