//! `{{ dotted.path }}` template rendering.
//!
//! Rendering is pure: the same template against an unchanged store always
//! yields the same text. Two knobs control a render:
//!
//! - [`SecretMode`] decides whether sensitive bindings render verbatim (for the
//!   in-memory AI prompt) or as the redaction marker (everything persisted or
//!   shown on screen).
//! - [`MissingPolicy`] decides what happens to a placeholder that cannot be
//!   resolved. `Strict` fails for required variables and unknown static paths;
//!   `Lenient` leaves the placeholder text in place so display copy can be
//!   shown before the data it mentions has been captured.
//!
//! Static document values may themselves contain placeholders (for example
//! `slugs.dynamic.dashboard`); they are rendered recursively up to
//! [`MAX_TEMPLATE_DEPTH`].

use serde_json::Value;

use crate::error::{EngineError, EngineResult};
use crate::resolve::{PathResolver, Resolution, is_valid_path};

/// Nesting limit for placeholders found inside static document values.
pub const MAX_TEMPLATE_DEPTH: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretMode {
    Verbatim,
    Masked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingPolicy {
    Strict,
    Lenient,
}

/// Extracts placeholder expressions from a template.
///
/// Returned expressions do not include the `{{` or `}}` delimiters.
pub fn extract_placeholders(template: &str) -> Vec<String> {
    let mut expressions = Vec::new();
    let mut remainder = template;

    while let Some(start) = remainder.find("{{") {
        let after_start = &remainder[start + 2..];
        let Some(end) = after_start.find("}}") else {
            break;
        };
        expressions.push(after_start[..end].trim().to_string());
        remainder = &after_start[end + 2..];
    }

    expressions
}

/// Returns the first placeholder in `template` that is not a valid dotted path.
pub fn first_invalid_placeholder(template: &str) -> Option<String> {
    extract_placeholders(template)
        .into_iter()
        .find(|expression| !is_valid_path(expression))
}

/// Renders templates against a [`PathResolver`].
#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver<'a> {
    paths: PathResolver<'a>,
}

impl<'a> TemplateResolver<'a> {
    pub fn new(paths: PathResolver<'a>) -> Self {
        Self { paths }
    }

    /// Renders every placeholder in `template`.
    ///
    /// `target` names what is being rendered and is carried into
    /// [`EngineError::UnresolvedVariable`] so callers can explain the failure.
    pub fn render(&self, template: &str, secrets: SecretMode, missing: MissingPolicy, target: &str) -> EngineResult<String> {
        self.render_at_depth(template, secrets, missing, target, 0)
    }

    fn render_at_depth(
        &self,
        template: &str,
        secrets: SecretMode,
        missing: MissingPolicy,
        target: &str,
        depth: usize,
    ) -> EngineResult<String> {
        if depth > MAX_TEMPLATE_DEPTH {
            return Err(EngineError::malformed(format!(
                "template nesting deeper than {MAX_TEMPLATE_DEPTH} levels while rendering {target}"
            )));
        }

        let mut output = String::with_capacity(template.len());
        let mut remaining = template;

        while let Some(start) = remaining.find("{{") {
            let (before, from_start) = remaining.split_at(start);
            output.push_str(before);

            let Some(end) = from_start.find("}}") else {
                // Unterminated placeholder is literal text.
                output.push_str(from_start);
                return Ok(output);
            };

            let placeholder = &from_start[..end + 2];
            let expression = from_start[2..end].trim();
            match self.resolve_placeholder(expression, secrets, missing, target, depth)? {
                Some(rendered) => output.push_str(&rendered),
                None => output.push_str(placeholder),
            }
            remaining = &from_start[end + 2..];
        }

        output.push_str(remaining);
        Ok(output)
    }

    /// `Ok(None)` means "leave the placeholder text as written".
    fn resolve_placeholder(
        &self,
        expression: &str,
        secrets: SecretMode,
        missing: MissingPolicy,
        target: &str,
        depth: usize,
    ) -> EngineResult<Option<String>> {
        let unresolved = || EngineError::UnresolvedVariable {
            path: expression.to_string(),
            target: target.to_string(),
        };

        match self.paths.resolve(expression) {
            Resolution::Bound { value, .. } => Ok(Some(match secrets {
                SecretMode::Verbatim => value.expose().to_string(),
                SecretMode::Masked => value.masked().to_string(),
            })),
            Resolution::Static(Value::String(text)) => self
                .render_at_depth(text, secrets, missing, target, depth + 1)
                .map(Some),
            Resolution::Static(Value::Null) => match missing {
                MissingPolicy::Strict => Err(unresolved()),
                MissingPolicy::Lenient => Ok(None),
            },
            Resolution::Static(other) => Ok(Some(other.to_string())),
            Resolution::Unbound { required: false, .. } => match missing {
                MissingPolicy::Strict => Ok(Some(String::new())),
                MissingPolicy::Lenient => Ok(None),
            },
            Resolution::Unbound { required: true, .. } | Resolution::Missing => match missing {
                MissingPolicy::Strict => Err(unresolved()),
                MissingPolicy::Lenient => Ok(None),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::VariableStore;
    use hacksmith_types::{BlueprintDocument, REDACTION_MARKER, VariableSpec};
    use indexmap::indexmap;
    use serde_json::json;

    fn document() -> BlueprintDocument {
        BlueprintDocument::from_tree(json!({
            "schema_version": "1.0",
            "name": "Demo",
            "provider": "demo",
            "auth": { "callback_path": "/auth/callback", "login_url": "https://auth.example.com/login" },
            "slugs": {
                "base_url": "https://app.example.com",
                "dynamic": { "dashboard": "/ws/environments/{{ environment_id }}/quick-start" }
            },
            "loop": { "a": "{{ loop.b }}", "b": "{{ loop.a }}" },
            "flows": []
        }))
        .expect("document")
    }

    fn store() -> VariableStore {
        VariableStore::new(&indexmap! {
            "environment_id".to_string() => VariableSpec { required: true, ..VariableSpec::default() },
            "client_secret".to_string() => VariableSpec { required: true, sensitive: true, ..VariableSpec::default() },
            "nickname".to_string() => VariableSpec::default(),
        })
        .expect("store")
    }

    #[test]
    fn extracts_placeholders() {
        assert_eq!(
            extract_placeholders("{{ slugs.base_url }}{{slugs.dynamic.dashboard}} and {{ broken"),
            vec!["slugs.base_url", "slugs.dynamic.dashboard"]
        );
        assert_eq!(first_invalid_placeholder("{{ a.b }} {{ not valid }}"), Some("not valid".to_string()));
    }

    #[test]
    fn renders_nested_static_templates() {
        let document = document();
        let mut store = store();
        store.bind("environment_id", "env_7").unwrap();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));

        let rendered = templates
            .render("{{ slugs.base_url }}{{ slugs.dynamic.dashboard }}", SecretMode::Masked, MissingPolicy::Strict, "url")
            .expect("render");
        assert_eq!(rendered, "https://app.example.com/ws/environments/env_7/quick-start");
    }

    #[test]
    fn strict_mode_fails_on_unbound_required_variable() {
        let document = document();
        let store = store();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));

        let error = templates
            .render("Env: {{ environment_id }}", SecretMode::Masked, MissingPolicy::Strict, "config")
            .expect_err("unbound required");
        assert!(matches!(error, EngineError::UnresolvedVariable { ref path, .. } if path == "environment_id"));
    }

    #[test]
    fn strict_mode_fails_on_unknown_static_path() {
        let document = document();
        let store = store();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));

        assert!(templates
            .render("{{ auth.nope }}", SecretMode::Masked, MissingPolicy::Strict, "config")
            .is_err());
    }

    #[test]
    fn strict_mode_renders_unbound_optional_as_empty() {
        let document = document();
        let store = store();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));

        let rendered = templates
            .render("[{{ nickname }}]", SecretMode::Masked, MissingPolicy::Strict, "brief")
            .expect("render");
        assert_eq!(rendered, "[]");
    }

    #[test]
    fn lenient_mode_leaves_unresolved_placeholders() {
        let document = document();
        let store = store();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));

        let rendered = templates
            .render("{{ slugs.base_url }}{{ slugs.dynamic.dashboard }}", SecretMode::Masked, MissingPolicy::Lenient, "url")
            .expect("render");
        assert_eq!(rendered, "https://app.example.com/ws/environments/{{ environment_id }}/quick-start");
    }

    #[test]
    fn secret_mode_controls_sensitive_rendering() {
        let document = document();
        let mut store = store();
        store.bind("client_secret", "hunter2").unwrap();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));

        let verbatim = templates
            .render("{{ client_secret }}", SecretMode::Verbatim, MissingPolicy::Strict, "prompt")
            .unwrap();
        let masked = templates
            .render("{{ client_secret }}", SecretMode::Masked, MissingPolicy::Strict, "prompt")
            .unwrap();
        assert_eq!(verbatim, "hunter2");
        assert_eq!(masked, REDACTION_MARKER);
    }

    #[test]
    fn rendering_is_idempotent() {
        let document = document();
        let mut store = store();
        store.bind("environment_id", "env_9").unwrap();
        store.bind("client_secret", "hunter2").unwrap();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));
        let template = "Env {{ environment_id }} at {{ slugs.dynamic.dashboard }} with {{ client_secret }} via {{ auth.callback_path }}";

        let first = templates
            .render(template, SecretMode::Masked, MissingPolicy::Strict, "brief")
            .unwrap();
        let second = templates
            .render(template, SecretMode::Masked, MissingPolicy::Strict, "brief")
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn self_referencing_static_values_are_rejected() {
        let document = document();
        let store = store();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));

        let error = templates
            .render("{{ loop.a }}", SecretMode::Masked, MissingPolicy::Lenient, "loop")
            .expect_err("cycle");
        assert!(matches!(error, EngineError::MalformedBlueprint { .. }));
    }

    #[test]
    fn text_without_placeholders_is_unchanged() {
        let document = document();
        let store = store();
        let templates = TemplateResolver::new(PathResolver::new(&store, &document));
        assert_eq!(
            templates
                .render("npm i @vendor/sdk", SecretMode::Masked, MissingPolicy::Strict, "command")
                .unwrap(),
            "npm i @vendor/sdk"
        );
    }
}
