//! Book resolution: map a (title, author) pair or an explicit id to a remote
//! book, creating at most one remote book per distinct key across runs.

use thiserror::Error;
use tracing::info;

use crate::constants::STATUS_OK;
use crate::services::cache::{BookCache, CacheError, book_key};
use crate::services::client::{ApiError, AscdcClient};
use crate::services::wire::server_message;

#[derive(Debug, Error)]
pub enum BookError {
    #[error("title and author must be provided when no book id is specified")]
    MissingTitleAuthor,
    #[error("book creation failed with status {status}: {message}")]
    Creation { status: i64, message: String },
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Selection parameters for a book: an explicit remote id, or a
/// (title, author) pair resolved through the cache.
#[derive(Debug, Clone, bon::Builder)]
pub struct BookSpec {
    #[builder(into)]
    pub title: Option<String>,
    #[builder(into)]
    pub author: Option<String>,
    pub id: Option<u64>,
    #[builder(default = 0)]
    pub public: u8,
    #[builder(default = 2)]
    pub orientation: u8,
}

impl BookSpec {
    fn key(&self) -> Option<String> {
        match (self.title.as_deref(), self.author.as_deref()) {
            (Some(title), Some(author)) => Some(book_key(title, author)),
            _ => None,
        }
    }
}

/// A resolved remote book.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Book {
    pub id: u64,
    pub title: Option<String>,
    pub author: Option<String>,
}

/// Resolve `spec` to a remote book id.
///
/// An explicit id is trusted as-is and back-filled into the cache when a
/// title/author key is also available. Otherwise the cache decides whether a
/// creation call happens at all, making repeated runs idempotent.
pub async fn resolve_book(
    client: &AscdcClient,
    cache: &BookCache,
    spec: &BookSpec,
) -> Result<Book, BookError> {
    if let Some(id) = spec.id {
        if let Some(key) = spec.key()
            && cache.get(&key)?.is_none()
        {
            cache.insert(&key, id)?;
            info!(book_id = id, key = %key, "cached manually provided book id");
        }
        info!(book_id = id, "using existing book id");
        return Ok(Book {
            id,
            title: spec.title.clone(),
            author: spec.author.clone(),
        });
    }

    let key = spec.key().ok_or(BookError::MissingTitleAuthor)?;
    if let Some(id) = cache.get(&key)? {
        info!(book_id = id, key = %key, "book already known");
        return Ok(Book {
            id,
            title: spec.title.clone(),
            author: spec.author.clone(),
        });
    }

    let title = spec.title.as_deref().unwrap_or_default();
    let author = spec.author.as_deref().unwrap_or_default();
    let response = client
        .create_book(title, author, spec.public, spec.orientation)
        .await?;
    if response.status != STATUS_OK {
        return Err(BookError::Creation {
            status: response.status,
            message: server_message(response.message),
        });
    }
    let id = response.bookid.ok_or(ApiError::MissingField {
        endpoint: "create_book",
        field: "bookid",
    })?;

    cache.insert(&key, id)?;
    info!(book_id = id, key = %key, "book created");
    Ok(Book {
        id,
        title: spec.title.clone(),
        author: spec.author.clone(),
    })
}
