//! Atomic artifact persistence.
//!
//! Artifacts are staged in a sibling temporary file, flushed to disk, and then
//! renamed over the destination. A crash mid-write leaves at most a stray
//! `.tmp` file; readers never observe a half-written artifact.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use thiserror::Error;
use tracing::{debug, warn};

/// Permission profile applied to the staged file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    /// Default permissions for the platform.
    Standard,
    /// Owner read/write only on unix (`0600`).
    Private,
}

/// Errors surfaced by [`write_atomic`].
#[derive(Debug, Error)]
pub enum PersistError {
    #[error("failed to create directory {path}: {source}")]
    CreateDirectory { path: PathBuf, source: io::Error },
    #[error("failed to stage {path}: {source}")]
    Stage { path: PathBuf, source: io::Error },
    #[error("failed to move {from} into place at {to}: {source}")]
    Rename { from: PathBuf, to: PathBuf, source: io::Error },
}

/// Writes `content` to `path` atomically, creating parent directories as needed.
pub fn write_atomic(path: &Path, content: &[u8], mode: FileMode) -> Result<(), PersistError> {
    let parent_directory = path.parent().filter(|parent| !parent.as_os_str().is_empty()).unwrap_or(Path::new("."));
    fs::create_dir_all(parent_directory).map_err(|source| PersistError::CreateDirectory {
        path: parent_directory.to_path_buf(),
        source,
    })?;

    let staged_path = build_staged_path(parent_directory, path);
    if let Err(source) = stage_file(&staged_path, content, mode) {
        discard_staged(&staged_path);
        return Err(PersistError::Stage {
            path: staged_path,
            source,
        });
    }

    if let Err(source) = fs::rename(&staged_path, path) {
        discard_staged(&staged_path);
        return Err(PersistError::Rename {
            from: staged_path,
            to: path.to_path_buf(),
            source,
        });
    }

    debug!(path = %path.display(), bytes = content.len(), "artifact persisted");
    Ok(())
}

fn stage_file(staged_path: &Path, content: &[u8], mode: FileMode) -> io::Result<()> {
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    if mode == FileMode::Private {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    #[cfg(not(unix))]
    let _ = mode;

    let mut staged_file: File = options.open(staged_path)?;
    staged_file.write_all(content)?;
    staged_file.sync_all()?;
    Ok(())
}

fn discard_staged(staged_path: &Path) {
    if let Err(error) = fs::remove_file(staged_path)
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(path = %staged_path.display(), error = %error, "failed to remove staged artifact");
    }
}

fn build_staged_path(parent_directory: &Path, destination: &Path) -> PathBuf {
    let process_identifier = std::process::id();
    let timestamp_nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_nanos())
        .unwrap_or_default();
    let file_name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    parent_directory.join(format!(".{file_name}-{process_identifier}-{timestamp_nanos}.tmp"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_replaces_content() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("nested").join("config.json");

        write_atomic(&path, b"first", FileMode::Standard).expect("first write");
        write_atomic(&path, b"second", FileMode::Standard).expect("second write");

        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
    }

    #[test]
    fn leaves_no_staged_files_behind() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("brief.txt");

        write_atomic(&path, b"brief", FileMode::Standard).expect("write");

        let leftovers: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn private_mode_restricts_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("credentials.secrets.json");

        write_atomic(&path, b"{}", FileMode::Private).expect("write");

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }
}
