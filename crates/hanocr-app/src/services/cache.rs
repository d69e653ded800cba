//! Flat JSON caches for the bearer token and the book-id mapping.
//!
//! Reads treat an absent file as empty; a malformed file is a fatal error by
//! design. Writes replace the whole file through a temp-file-then-rename
//! finalize so a crash never leaves a torn cache behind.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to read cache file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed cache file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to write cache file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Current time as whole seconds since the Unix epoch.
pub fn now_epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Bearer token plus the instant it stops being trusted.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: u64,
}

impl CachedToken {
    /// A token is only usable strictly before its recorded expiry.
    pub fn is_valid_at(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

/// Store for `token_cache.json`.
#[derive(Debug, Clone)]
pub struct TokenCache {
    path: PathBuf,
}

impl TokenCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load the cached token, `None` when the file does not exist.
    pub fn load(&self) -> Result<Option<CachedToken>, CacheError> {
        read_json(&self.path)
    }

    /// Load the cached token and discard it when expired at `now`.
    pub fn fresh(&self, now: u64) -> Result<Option<CachedToken>, CacheError> {
        Ok(self.load()?.filter(|token| token.is_valid_at(now)))
    }

    pub fn store(&self, token: &CachedToken) -> Result<(), CacheError> {
        write_json(&self.path, token)
    }
}

/// Key for the book cache: `title::author`.
pub fn book_key(title: &str, author: &str) -> String {
    format!("{title}::{author}")
}

/// Store for `book_cache.json`, mapping `title::author` keys to remote ids.
#[derive(Debug, Clone)]
pub struct BookCache {
    path: PathBuf,
}

impl BookCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn load(&self) -> Result<BTreeMap<String, u64>, CacheError> {
        Ok(read_json(&self.path)?.unwrap_or_default())
    }

    pub fn get(&self, key: &str) -> Result<Option<u64>, CacheError> {
        Ok(self.load()?.get(key).copied())
    }

    /// Read-modify-write the whole mapping with `key` set to `id`.
    pub fn insert(&self, key: &str, id: u64) -> Result<(), CacheError> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), id);
        write_json(&self.path, &entries)
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CacheError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(CacheError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| CacheError::Parse {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CacheError> {
    let write_err = |source| CacheError::Write {
        path: path.to_path_buf(),
        source,
    };

    let encoded = serde_json::to_vec_pretty(value).map_err(|source| CacheError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    // Temp file lands in the same directory so the rename stays on one filesystem.
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, &encoded).map_err(write_err)?;
    fs::rename(&tmp, path).map_err(write_err)?;
    Ok(())
}
