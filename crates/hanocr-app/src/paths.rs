//! Filesystem path helpers (XDG-aware) for caches and downloaded artifacts.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use thiserror::Error;

use crate::constants::{BOOK_CACHE_FILE, TOKEN_CACHE_FILE};

#[derive(Debug, Error)]
pub enum PathError {
    #[error("unable to determine project directories")]
    MissingProjectDirs,
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Container providing filesystem paths for the application. In production this is
/// rooted at `$XDG_DATA_HOME/hanocr`; tests may construct custom instances.
#[derive(Debug, Clone)]
pub struct AppPaths {
    base_dir: PathBuf,
}

impl AppPaths {
    /// Construct paths rooted under `$XDG_DATA_HOME/hanocr`.
    pub fn from_project_dirs() -> Result<Self, PathError> {
        let dirs =
            ProjectDirs::from("dev", "hanocr", "hanocr").ok_or(PathError::MissingProjectDirs)?;
        Self::new(dirs.data_dir())
    }

    /// Construct paths rooted under the provided directory, ensuring it exists.
    pub fn new<P: AsRef<Path>>(base: P) -> Result<Self, PathError> {
        let base = base.as_ref().to_path_buf();
        ensure_dir(&base)?;
        Ok(Self { base_dir: base })
    }

    /// Base data directory.
    pub fn data_dir(&self) -> PathBuf {
        self.base_dir.clone()
    }

    /// Flat JSON file caching the bearer token and its expiry.
    pub fn token_cache_path(&self) -> PathBuf {
        self.base_dir.join(TOKEN_CACHE_FILE)
    }

    /// Flat JSON file mapping `title::author` keys to remote book ids.
    pub fn book_cache_path(&self) -> PathBuf {
        self.base_dir.join(BOOK_CACHE_FILE)
    }

    /// Default directory for downloaded OCR artifacts (`.../downloads`).
    pub fn downloads_dir(&self) -> Result<PathBuf, PathError> {
        ensure_dir(&self.base_dir.join("downloads"))
    }
}

fn ensure_dir(path: &Path) -> Result<PathBuf, PathError> {
    if let Err(err) = fs::create_dir_all(path) {
        if err.kind() != io::ErrorKind::AlreadyExists {
            return Err(PathError::CreateDir {
                path: path.to_path_buf(),
                source: err,
            });
        }
    }
    Ok(path.to_path_buf())
}
