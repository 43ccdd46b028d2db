//! User settings for the Hacksmith CLI and engine.
//!
//! Settings live in a small JSON file in the standard configuration directory
//! (`~/.config/hacksmith/settings.json` on most platforms). A missing file
//! yields defaults; an unparsable file is logged and ignored. A handful of
//! environment variables override individual fields for CI usage.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use dirs_next::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::expand_tilde;
use crate::keystore::SecretsBackend;

/// Environment variable allowing callers to override the settings file path.
pub const SETTINGS_PATH_ENV: &str = "HACKSMITH_SETTINGS_PATH";

/// Overrides the artifact directory declared by the blueprint.
pub const OUTPUT_DIR_ENV: &str = "HACKSMITH_OUTPUT_DIR";

/// Caps how many times an input step re-prompts after invalid values.
pub const MAX_INPUT_ATTEMPTS_ENV: &str = "HACKSMITH_MAX_INPUT_ATTEMPTS";

/// Default filename for the JSON payload.
pub const SETTINGS_FILE_NAME: &str = "settings.json";

/// Error surfaced when reading or writing settings fails.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// I/O failure (for example, permissions or missing directory).
    #[error("settings I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization or deserialization failure.
    #[error("settings serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Persisted settings values.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HacksmithSettings {
    /// Directory that replaces the blueprint's `output.storage_path`.
    #[serde(default)]
    pub output_dir: Option<String>,
    /// `None` re-prompts indefinitely.
    #[serde(default)]
    pub max_input_attempts: Option<u32>,
    #[serde(default)]
    pub secrets_backend: SecretsBackend,
}

impl HacksmithSettings {
    /// Loads settings from the default location and applies environment overrides.
    pub fn load() -> Result<Self, SettingsError> {
        Self::load_from(&default_settings_path())
    }

    /// Loads settings from `path` and applies environment overrides.
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        let mut settings = load_payload(path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Persists the settings as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Expanded output directory override, if configured.
    pub fn output_dir(&self) -> Option<PathBuf> {
        self.output_dir
            .as_deref()
            .map(str::trim)
            .filter(|dir| !dir.is_empty())
            .map(expand_tilde)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(dir) = env::var(OUTPUT_DIR_ENV)
            && !dir.trim().is_empty()
        {
            self.output_dir = Some(dir);
        }

        if let Ok(raw_attempts) = env::var(MAX_INPUT_ATTEMPTS_ENV) {
            match raw_attempts.trim().parse::<u32>() {
                Ok(0) => self.max_input_attempts = None,
                Ok(attempts) => self.max_input_attempts = Some(attempts),
                Err(error) => warn!(
                    value = %raw_attempts,
                    error = %error,
                    "Ignoring invalid {}", MAX_INPUT_ATTEMPTS_ENV
                ),
            }
        }
    }
}

/// Resolves the settings path, honouring [`SETTINGS_PATH_ENV`].
pub fn default_settings_path() -> PathBuf {
    if let Ok(path) = env::var(SETTINGS_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return expand_tilde(trimmed);
        }
    }

    config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("hacksmith")
        .join(SETTINGS_FILE_NAME)
}

fn load_payload(path: &Path) -> Result<HacksmithSettings, SettingsError> {
    match fs::read_to_string(path) {
        Ok(data) => match serde_json::from_str(&data) {
            Ok(payload) => Ok(payload),
            Err(error) => {
                warn!(
                    path = %path.display(),
                    error = %error,
                    "Failed to parse settings file; using defaults"
                );
                Ok(HacksmithSettings::default())
            }
        },
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(HacksmithSettings::default()),
        Err(error) => Err(SettingsError::Io(error)),
    }
}
