//! Result identifier handling: fetch and persist the text/JSON/image
//! artifacts of one finished OCR page, and rename previously downloaded
//! files to the configured naming scheme.

use std::fs;
use std::path::PathBuf;

use thiserror::Error;
use tracing::{debug, info};

use crate::constants::DEFAULT_NAME_TEMPLATE;
use crate::naming::{RenameMap, ensure_unique_path, render_basename};
use crate::services::client::{ApiError, AscdcClient};

#[derive(Debug, Error)]
pub enum ResultError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to encode JSON for {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Naming and destination options for saved artifacts.
#[derive(Debug, Clone, bon::Builder)]
pub struct SaveOptions {
    #[builder(into)]
    pub dir: PathBuf,
    #[builder(into, default = DEFAULT_NAME_TEMPLATE.to_string())]
    pub template: String,
    #[builder(default)]
    pub rename_map: RenameMap,
    /// Preview renames without touching the filesystem.
    #[builder(default = false)]
    pub dry_run: bool,
}

/// Paths produced by [`ResultIdentifier::save_results`].
#[derive(Debug, Clone)]
pub struct SavedResult {
    pub text_path: PathBuf,
    pub json_path: PathBuf,
    pub lines: usize,
}

/// A planned or performed rename of an existing download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamedFile {
    pub from: PathBuf,
    pub to: PathBuf,
}

/// Identifier of one completed OCR page. Independent of any book or upload;
/// operators may fetch results for ids obtained out of band.
#[derive(Debug, Clone)]
pub struct ResultIdentifier {
    pub guid: u64,
    /// Base name (extension stripped) of the originating upload, when known.
    pub original: Option<String>,
    /// 1-based position within the originating file's output set.
    pub index: Option<usize>,
}

impl ResultIdentifier {
    pub fn new(guid: u64) -> Self {
        Self {
            guid,
            original: None,
            index: None,
        }
    }

    pub fn with_origin(guid: u64, original: String, index: usize) -> Self {
        Self {
            guid,
            original: Some(original),
            index: Some(index),
        }
    }

    fn basename(&self, options: &SaveOptions) -> String {
        render_basename(
            &options.template,
            self.guid,
            self.original.as_deref(),
            self.index,
            &options.rename_map,
        )
    }

    /// Fetch the structured text result and write `<basename>.txt` (one line
    /// of text per record) plus `<basename>.json` (full structure).
    pub async fn save_results(
        &self,
        client: &AscdcClient,
        options: &SaveOptions,
    ) -> Result<SavedResult, ResultError> {
        let lines = client.get_result(self.guid).await?;
        fs::create_dir_all(&options.dir).map_err(|source| ResultError::Io {
            path: options.dir.clone(),
            source,
        })?;

        let basename = self.basename(options);

        let text_path = ensure_unique_path(&options.dir.join(format!("{basename}.txt")));
        let mut text = String::new();
        for line in &lines {
            text.push_str(&line.text);
            text.push('\n');
        }
        fs::write(&text_path, text).map_err(|source| ResultError::Io {
            path: text_path.clone(),
            source,
        })?;

        let json_path = ensure_unique_path(&options.dir.join(format!("{basename}.json")));
        let encoded = serde_json::to_vec_pretty(&lines).map_err(|source| ResultError::Json {
            path: json_path.clone(),
            source,
        })?;
        fs::write(&json_path, encoded).map_err(|source| ResultError::Io {
            path: json_path.clone(),
            source,
        })?;

        info!(
            guid = self.guid,
            text = %text_path.display(),
            json = %json_path.display(),
            "saved OCR result"
        );
        Ok(SavedResult {
            text_path,
            json_path,
            lines: lines.len(),
        })
    }

    /// Fetch the page image and write it verbatim to `<basename>.jpg`.
    pub async fn save_image(
        &self,
        client: &AscdcClient,
        options: &SaveOptions,
    ) -> Result<PathBuf, ResultError> {
        let bytes = client.get_image(self.guid).await?;
        fs::create_dir_all(&options.dir).map_err(|source| ResultError::Io {
            path: options.dir.clone(),
            source,
        })?;

        let basename = self.basename(options);
        let image_path = ensure_unique_path(&options.dir.join(format!("{basename}.jpg")));
        fs::write(&image_path, bytes).map_err(|source| ResultError::Io {
            path: image_path.clone(),
            source,
        })?;

        info!(guid = self.guid, image = %image_path.display(), "saved OCR image");
        Ok(image_path)
    }

    /// Rename files already present in the download directory that loosely
    /// match this identifier (stem ending in the guid digits, or containing a
    /// `guid<id>` token) to the computed basename, keeping each file's
    /// extension. In dry-run mode the planned renames are only logged.
    pub fn rename_existing_downloads(
        &self,
        options: &SaveOptions,
    ) -> Result<Vec<RenamedFile>, ResultError> {
        if !options.dir.is_dir() {
            debug!(dir = %options.dir.display(), "download directory absent; nothing to rename");
            return Ok(Vec::new());
        }

        let basename = self.basename(options);
        let guid_digits = self.guid.to_string();
        let guid_token = format!("guid{}", self.guid);

        let mut renamed = Vec::new();
        let entries = fs::read_dir(&options.dir).map_err(|source| ResultError::Io {
            path: options.dir.clone(),
            source,
        })?;
        for entry in entries {
            let entry = entry.map_err(|source| ResultError::Io {
                path: options.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }

            let stem = match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(stem) => stem,
                None => continue,
            };
            if !(stem.ends_with(&guid_digits) || stem.contains(&guid_token)) {
                continue;
            }

            let target_name = match path.extension().and_then(|ext| ext.to_str()) {
                Some(ext) => format!("{basename}.{ext}"),
                None => basename.clone(),
            };
            if path.file_name().and_then(|name| name.to_str()) == Some(target_name.as_str()) {
                debug!(path = %path.display(), "already named correctly; skipping");
                continue;
            }

            let target = if options.dry_run {
                options.dir.join(&target_name)
            } else {
                ensure_unique_path(&options.dir.join(&target_name))
            };

            if options.dry_run {
                info!(
                    from = %path.display(),
                    to = %target.display(),
                    "dry-run: would rename download"
                );
            } else {
                fs::rename(&path, &target).map_err(|source| ResultError::Io {
                    path: path.clone(),
                    source,
                })?;
                info!(from = %path.display(), to = %target.display(), "renamed download");
            }
            renamed.push(RenamedFile {
                from: path,
                to: target,
            });
        }

        Ok(renamed)
    }
}
