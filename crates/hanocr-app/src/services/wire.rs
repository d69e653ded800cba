//! Wire types for the ASCDC OCR API. Every endpoint answers a JSON envelope
//! with an integer `status` field; 200 means success, 103 means the queue is
//! still processing, anything else carries a `message`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Envelope of `auth.php`.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
}

/// Envelope of `create_book.php`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub bookid: Option<u64>,
}

/// Envelope of `upload.php`.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub queue_id: Option<u64>,
}

/// Envelope of `queue.php`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueueResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub guids: Option<Vec<GuidEntry>>,
}

/// One finished page reported by the queue.
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct GuidEntry {
    pub guid: u64,
}

/// Envelope of `query.php`.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<Vec<TextLine>>,
}

/// One recognized line. The service attaches layout metadata beyond the text
/// itself; the extra fields are kept verbatim so the JSON artifact loses
/// nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextLine {
    pub text: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Envelope of `get_image.php`; `result` is the base64-encoded JPEG.
#[derive(Debug, Clone, Deserialize)]
pub struct ImageResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
}

/// Server message for an error envelope, falling back to a placeholder so
/// diagnostics never lose the status code.
pub fn server_message(message: Option<String>) -> String {
    message.unwrap_or_else(|| "(no message)".to_string())
}
