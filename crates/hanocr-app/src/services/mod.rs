//! IO-bound service layer: the remote API client and the entities built on
//! top of it. Pure helpers (naming, templates) live in `crate::naming` so the
//! request/response plumbing stays localized here.

pub mod book;
pub mod cache;
pub mod client;
pub mod results;
pub mod upload;
pub mod wire;

pub use book::{Book, BookError, BookSpec, resolve_book};
pub use cache::{BookCache, CacheError, CachedToken, TokenCache, book_key, now_epoch_secs};
pub use client::{ApiError, AscdcClient, ClientOptions, PollPolicy, UploadMime};
pub use results::{RenamedFile, ResultError, ResultIdentifier, SaveOptions, SavedResult};
pub use upload::{UploadError, UploadOptions, UploadUnit};
pub use wire::{
    CreateBookResponse, GuidEntry, ImageResponse, LoginResponse, QueryResponse, QueueResponse,
    TextLine, UploadResponse,
};
