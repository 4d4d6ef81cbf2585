use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot not found: {0}")]
    Missing(PathBuf),
    #[error("failed to read {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("malformed snapshot {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("failed to write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Load a whole-file JSON snapshot.
pub fn load<T: DeserializeOwned>(path: &Path) -> Result<T, SnapshotError> {
    let raw = fs::read_to_string(path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            SnapshotError::Missing(path.to_path_buf())
        } else {
            SnapshotError::Read {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Rewrite a snapshot wholesale. The JSON goes to a sibling temp file first
/// and is renamed over the target, so readers see either the old or the new file.
pub fn save<T: Serialize>(path: &Path, value: &T) -> Result<(), SnapshotError> {
    let write_err = |source: io::Error| SnapshotError::Write {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_err)?;
    }

    let json = serde_json::to_string_pretty(value)
        .map_err(|e| write_err(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, json).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}

/// Like [`load`], but a missing or unreadable side table degrades to its default.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match load(path) {
        Ok(value) => value,
        Err(SnapshotError::Missing(_)) => {
            tracing::warn!("Snapshot {} not found, continuing without it", path.display());
            T::default()
        }
        Err(e) => {
            tracing::error!("{}; continuing without it", e);
            T::default()
        }
    }
}

// ── Tests ──
