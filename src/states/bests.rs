//! Local best score and distance, kept across launches in a small JSON file.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const BESTS_FILE: &str = "save/bests.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedBests {
    #[serde(default)]
    pub best_score: u32,
    #[serde(default)]
    pub best_distance: u32,
}

#[derive(Debug, Error)]
pub enum BestsStoreError {
    #[error("failed to access `{}`: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse `{}`: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// `Ok(None)` when nothing has been saved yet.
pub fn load_saved_bests(path: &Path) -> Result<Option<SavedBests>, BestsStoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(BestsStoreError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| BestsStoreError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

pub fn write_saved_bests(path: &Path, bests: &SavedBests) -> Result<(), BestsStoreError> {
    let io_error = |source| BestsStoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    let raw = serde_json::to_string_pretty(bests).map_err(|source| BestsStoreError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, raw).map_err(io_error)
}
