//! One uploadable file: validation, submission, and waiting for its OCR
//! results to come off the queue.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use crate::constants::STATUS_OK;
use crate::services::client::{ApiError, AscdcClient};
use crate::services::results::ResultIdentifier;
use crate::services::wire::server_message;

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload of {path} was rejected with status {status}: {message}")]
    Rejected {
        path: PathBuf,
        status: i64,
        message: String,
    },
    #[error("{path} has not been uploaded yet; no queue to wait on")]
    NotUploaded { path: PathBuf },
    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Per-unit OCR options transmitted with the upload.
#[derive(Debug, Clone, bon::Builder)]
pub struct UploadOptions {
    /// Reading direction for page layout, e.g. `TBRL` (top-to-bottom,
    /// right-to-left). Uppercased before transmission.
    #[builder(into, default = "TBRL".to_string())]
    pub block_order: String,
    #[builder(default = 1)]
    pub language: i64,
    #[builder(default = 2)]
    pub orientation: i64,
    #[builder(default = -1)]
    pub correction: i64,
    #[builder(default = 1)]
    pub pages_per_img: u64,
    #[builder(default = -1)]
    pub remove_margin: i64,
    #[builder(default = false)]
    pub has_mark: bool,
    #[builder(default = false)]
    pub has_alphabet: bool,
    #[builder(default = false)]
    pub remove_anno: bool,
    #[builder(default = false)]
    pub is_inverted: bool,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A local file bound for one remote book, tracking its queue id once
/// submitted.
#[derive(Debug, Clone)]
pub struct UploadUnit {
    path: PathBuf,
    bookid: u64,
    options: UploadOptions,
    queue_id: Option<u64>,
}

impl UploadUnit {
    pub fn new(path: PathBuf, bookid: u64, options: UploadOptions) -> Self {
        Self {
            path,
            bookid,
            options,
            queue_id: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn queue_id(&self) -> Option<u64> {
        self.queue_id
    }

    /// Base name with the extension stripped, used to label result outputs.
    pub fn file_stem(&self) -> String {
        self.path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Submit the file and record the queue id the service assigned.
    pub async fn upload(&mut self, client: &AscdcClient) -> Result<u64, UploadError> {
        let response = client
            .upload_file(&self.path, self.bookid, &self.options)
            .await?;
        if response.status != STATUS_OK {
            return Err(UploadError::Rejected {
                path: self.path.clone(),
                status: response.status,
                message: server_message(response.message),
            });
        }
        let queue_id = response.queue_id.ok_or(ApiError::MissingField {
            endpoint: "upload",
            field: "queue_id",
        })?;
        info!(path = %self.path.display(), queue_id, "file uploaded");
        self.queue_id = Some(queue_id);
        Ok(queue_id)
    }

    /// Block on the queue until this file's pages are finished, then wrap each
    /// guid with the originating file name and its 1-based position.
    pub async fn wait_for_ocr(
        &self,
        client: &AscdcClient,
    ) -> Result<Vec<ResultIdentifier>, UploadError> {
        let queue_id = self.queue_id.ok_or_else(|| UploadError::NotUploaded {
            path: self.path.clone(),
        })?;
        let entries = client.poll_queue(queue_id).await?;
        let stem = self.file_stem();
        let identifiers: Vec<ResultIdentifier> = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| {
                ResultIdentifier::with_origin(entry.guid, stem.clone(), position + 1)
            })
            .collect();
        info!(
            queue_id,
            guids = identifiers.len(),
            "OCR completed for upload"
        );
        Ok(identifiers)
    }
}
