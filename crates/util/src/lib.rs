//! Filesystem, configuration, and secret-storage helpers for Hacksmith.

pub mod keystore;
pub mod path_processing;
pub mod persistence;
pub mod settings;

pub use keystore::{KeychainSealer, SealError, SecretsBackend};
pub use path_processing::expand_tilde;
pub use persistence::{FileMode, PersistError, write_atomic};
pub use settings::{HacksmithSettings, SettingsError};
