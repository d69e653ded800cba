//! Cross-cutting application constants.

/// Default base URL of the ASCDC OCR web API.
pub const DEFAULT_BASE_URL: &str = "https://ocr.ascdc.tw/web_api/";

/// Fixed session headers expected by the service.
pub const SESSION_USER_AGENT: &str = "Mozilla/5.0";
pub const SESSION_REFERER: &str = "https://ocr.ascdc.tw/";
pub const SESSION_ORIGIN: &str = "https://ocr.ascdc.tw";

/// Endpoint paths, joined onto the base URL.
pub const AUTH_ENDPOINT: &str = "auth.php";
pub const CREATE_BOOK_ENDPOINT: &str = "create_book.php";
pub const UPLOAD_ENDPOINT: &str = "upload.php";
pub const QUEUE_ENDPOINT: &str = "queue.php";
pub const QUERY_ENDPOINT: &str = "query.php";
pub const GET_IMAGE_ENDPOINT: &str = "get_image.php";

/// Envelope status codes used by every endpoint.
pub const STATUS_OK: i64 = 200;
pub const STATUS_PROCESSING: i64 = 103;

/// Lifetime recorded for a freshly issued token.
pub const TOKEN_TTL_SECS: u64 = 86_400;

/// Cache file names under the application data directory.
pub const TOKEN_CACHE_FILE: &str = "token_cache.json";
pub const BOOK_CACHE_FILE: &str = "book_cache.json";

/// Queue polling defaults: one probe per minute, give up after about an hour.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_POLL_MAX_ATTEMPTS: usize = 60;

/// HTTP request timeout applied to every call.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Basename template applied when the operator configures nothing else.
pub const DEFAULT_NAME_TEMPLATE: &str = "{original}_{guid}";
