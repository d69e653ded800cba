//! Application-level error type shared across the binary and services.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::AppConfigError;
use crate::naming::NamingError;
use crate::paths::PathError;
use crate::services::book::BookError;
use crate::services::cache::CacheError;
use crate::services::client::ApiError;
use crate::services::results::ResultError;
use crate::services::upload::UploadError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] AppConfigError),
    #[error(transparent)]
    Paths(#[from] PathError),
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Book(#[from] BookError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Results(#[from] ResultError),
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no files or guids to process; nothing to do")]
    NothingToDo,
    #[error("a book must be selected or created before uploading files")]
    MissingBook,
}
