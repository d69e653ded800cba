//! HTTP client for the ASCDC OCR web API.
//!
//! One `reqwest::Client` with the fixed session header set backs every call.
//! Login, book creation, and upload pass the token as a form field; the
//! queue/query/image endpoints send it as a bearer header. Responses are
//! decoded defensively: a body that fails to parse is logged with its HTTP
//! status and raw content before the error propagates.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use backon::{ConstantBuilder, Retryable};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use regex::Regex;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, ORIGIN, REFERER};
use reqwest::multipart::{Form, Part};
use reqwest::{Client as HttpClient, Url};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::constants::{
    AUTH_ENDPOINT, CREATE_BOOK_ENDPOINT, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_POLL_MAX_ATTEMPTS, GET_IMAGE_ENDPOINT, QUERY_ENDPOINT, QUEUE_ENDPOINT,
    SESSION_ORIGIN, SESSION_REFERER, SESSION_USER_AGENT, STATUS_OK, STATUS_PROCESSING,
    TOKEN_TTL_SECS, UPLOAD_ENDPOINT,
};
use crate::services::cache::{CacheError, CachedToken, TokenCache, now_epoch_secs};
use crate::services::upload::UploadOptions;
use crate::services::wire::{
    CreateBookResponse, GuidEntry, ImageResponse, LoginResponse, QueryResponse, QueueResponse,
    TextLine, UploadResponse, server_message,
};

/// Allow-list for upload file names.
fn filename_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z0-9_\-.]+$").expect("valid filename pattern"))
}

/// Errors produced by the API client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid base url `{0}`")]
    InvalidBaseUrl(String),
    #[error("{endpoint} request failed: {source}")]
    Request {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to decode {endpoint} response: {source}")]
    Decode {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{endpoint} failed with status {status}: {message}")]
    Api {
        endpoint: &'static str,
        status: i64,
        message: String,
    },
    #[error("{endpoint} response is missing the `{field}` field")]
    MissingField {
        endpoint: &'static str,
        field: &'static str,
    },
    #[error("illegal file name `{name}`: only A-Z, a-z, 0-9, '_', '-', and '.' are allowed")]
    IllegalFilename { name: String },
    #[error("unsupported MIME type for `{name}`; allowed types are JPEG, PNG, PDF, and ZIP")]
    UnsupportedMime { name: String },
    #[error("queue {queue_id} still processing")]
    Processing { queue_id: u64 },
    #[error("queue {queue_id} did not finish after {attempts} poll attempts (~{waited_secs}s)")]
    PollTimeout {
        queue_id: u64,
        attempts: usize,
        waited_secs: u64,
    },
    #[error("failed to decode image payload for guid {guid}: {source}")]
    ImageDecode {
        guid: u64,
        #[source]
        source: base64::DecodeError,
    },
    #[error("not authenticated; obtain a token before calling this endpoint")]
    NotAuthenticated,
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("failed to read upload file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// MIME types the upload endpoint accepts, derived from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadMime {
    Jpeg,
    Png,
    Pdf,
    Zip,
}

impl UploadMime {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Pdf => "application/pdf",
            Self::Zip => "application/zip",
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "pdf" => Some(Self::Pdf),
            "zip" => Some(Self::Zip),
            _ => None,
        }
    }
}

/// Whether a directory entry passes the upload name and MIME filters.
pub fn is_allowed_upload(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(OsStr::to_str) else {
        return false;
    };
    filename_pattern().is_match(name) && UploadMime::from_path(path).is_some()
}

/// Bounded policy driving the queue polling loop.
#[derive(Debug, Clone, bon::Builder)]
pub struct PollPolicy {
    #[builder(default = Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS))]
    pub interval: Duration,
    #[builder(default = DEFAULT_POLL_MAX_ATTEMPTS)]
    pub max_attempts: usize,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Connection parameters for [`AscdcClient`].
#[derive(Debug, Clone, bon::Builder)]
pub struct ClientOptions {
    #[builder(into)]
    pub base_url: String,
    #[builder(into)]
    pub account: String,
    #[builder(into)]
    pub password: String,
    #[builder(default)]
    pub poll: PollPolicy,
    #[builder(default = Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS))]
    pub timeout: Duration,
}

pub struct AscdcClient {
    http: HttpClient,
    base_url: Url,
    account: String,
    password: String,
    poll: PollPolicy,
    token_cache: TokenCache,
    token: Option<String>,
}

impl AscdcClient {
    pub fn new(options: ClientOptions, token_cache: TokenCache) -> Result<Self, ApiError> {
        let mut base = options.base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        let base_url =
            Url::parse(&base).map_err(|_| ApiError::InvalidBaseUrl(options.base_url.clone()))?;

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(REFERER, HeaderValue::from_static(SESSION_REFERER));
        headers.insert(ORIGIN, HeaderValue::from_static(SESSION_ORIGIN));

        let http = HttpClient::builder()
            .user_agent(SESSION_USER_AGENT)
            .default_headers(headers)
            .timeout(options.timeout)
            .build()
            .map_err(|source| ApiError::Request {
                endpoint: "build_client",
                source,
            })?;

        Ok(Self {
            http,
            base_url,
            account: options.account,
            password: options.password,
            poll: options.poll,
            token_cache,
            token: None,
        })
    }

    fn endpoint_url(&self, endpoint: &'static str) -> Result<Url, ApiError> {
        self.base_url
            .join(endpoint)
            .map_err(|_| ApiError::InvalidBaseUrl(self.base_url.to_string()))
    }

    /// Token for endpoints that require prior authentication.
    fn bearer(&self) -> Result<&str, ApiError> {
        self.token.as_deref().ok_or(ApiError::NotAuthenticated)
    }

    /// Reuse an unexpired cached token or perform a fresh login.
    pub async fn ensure_token(&mut self) -> Result<String, ApiError> {
        if let Some(token) = self.token.clone() {
            return Ok(token);
        }
        if let Some(cached) = self.token_cache.fresh(now_epoch_secs())? {
            info!("using cached token");
            self.token = Some(cached.token.clone());
            return Ok(cached.token);
        }
        self.login().await
    }

    /// Authenticate and persist the token with a fixed 24h expiry.
    pub async fn login(&mut self) -> Result<String, ApiError> {
        let url = self.endpoint_url(AUTH_ENDPOINT)?;
        let form = [
            ("account", self.account.as_str()),
            ("password", self.password.as_str()),
        ];
        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: "auth",
                source,
            })?;

        let decoded: LoginResponse = decode_json("auth", response).await?;
        if decoded.status != STATUS_OK {
            return Err(ApiError::Api {
                endpoint: "auth",
                status: decoded.status,
                message: server_message(decoded.message),
            });
        }

        let token = decoded.access_token.ok_or(ApiError::MissingField {
            endpoint: "auth",
            field: "access_token",
        })?;
        self.token_cache.store(&CachedToken {
            token: token.clone(),
            expires_at: now_epoch_secs() + TOKEN_TTL_SECS,
        })?;
        info!("login successful");
        self.token = Some(token.clone());
        Ok(token)
    }

    /// Create a remote book; the envelope is returned for the caller to
    /// interpret.
    pub async fn create_book(
        &self,
        title: &str,
        author: &str,
        public: u8,
        orientation: u8,
    ) -> Result<CreateBookResponse, ApiError> {
        let url = self.endpoint_url(CREATE_BOOK_ENDPOINT)?;
        let token = self.bearer()?;
        let public = public.to_string();
        let orientation = orientation.to_string();
        let form = [
            ("token", token),
            ("title", title),
            ("author", author),
            ("public", public.as_str()),
            ("orientation", orientation.as_str()),
        ];
        let response = self
            .http
            .post(url)
            .form(&form)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: "create_book",
                source,
            })?;

        decode_json("create_book", response).await
    }

    /// Upload one local file into a book. The file name and its
    /// extension-derived MIME type are validated before any network call.
    pub async fn upload_file(
        &self,
        path: &Path,
        bookid: u64,
        options: &UploadOptions,
    ) -> Result<UploadResponse, ApiError> {
        let name = path
            .file_name()
            .and_then(OsStr::to_str)
            .ok_or_else(|| ApiError::IllegalFilename {
                name: path.display().to_string(),
            })?;
        if !filename_pattern().is_match(name) {
            return Err(ApiError::IllegalFilename {
                name: name.to_string(),
            });
        }
        let mime = UploadMime::from_path(path).ok_or_else(|| ApiError::UnsupportedMime {
            name: name.to_string(),
        })?;

        let token = self.bearer()?.to_string();
        let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let part = Part::bytes(bytes)
            .file_name(name.to_string())
            .mime_str(mime.as_str())
            .map_err(|source| ApiError::Request {
                endpoint: "upload",
                source,
            })?;
        let form = Form::new()
            .part("page", part)
            .text("token", token)
            .text("bookid", bookid.to_string())
            .text("block_order", options.block_order.to_uppercase())
            .text("language", options.language.to_string())
            .text("orientation", options.orientation.to_string())
            .text("correction", options.correction.to_string())
            .text("pages_per_img", options.pages_per_img.to_string())
            .text("remove_margin", options.remove_margin.to_string())
            .text("has_mark", flag(options.has_mark))
            .text("has_alphabet", flag(options.has_alphabet))
            .text("remove_anno", flag(options.remove_anno))
            .text("is_inverted", flag(options.is_inverted));

        let url = self.endpoint_url(UPLOAD_ENDPOINT)?;
        let response = self
            .http
            .post(url)
            .multipart(form)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: "upload",
                source,
            })?;

        decode_json("upload", response).await
    }

    /// Poll the queue until it reports finished pages, the server reports a
    /// failure, or the poll policy is exhausted.
    pub async fn poll_queue(&self, queue_id: u64) -> Result<Vec<GuidEntry>, ApiError> {
        let policy = self.poll.clone();
        debug_assert!(policy.max_attempts >= 1, "poll policy must allow one probe");
        let backoff = ConstantBuilder::default()
            .with_delay(policy.interval)
            .with_max_times(policy.max_attempts.saturating_sub(1));

        let attempt = || async { self.poll_queue_once(queue_id).await };
        attempt
            .retry(backoff)
            .sleep(sleep)
            .when(|err: &ApiError| matches!(err, ApiError::Processing { .. }))
            .notify(|_: &ApiError, delay: Duration| {
                info!(
                    queue_id,
                    delay_secs = delay.as_secs(),
                    "OCR still processing; waiting before next poll"
                );
            })
            .await
            .map_err(|err| match err {
                ApiError::Processing { queue_id } => ApiError::PollTimeout {
                    queue_id,
                    attempts: policy.max_attempts,
                    waited_secs: policy.interval.as_secs()
                        * policy.max_attempts.saturating_sub(1) as u64,
                },
                other => other,
            })
    }

    async fn poll_queue_once(&self, queue_id: u64) -> Result<Vec<GuidEntry>, ApiError> {
        let url = self.endpoint_url(QUEUE_ENDPOINT)?;
        let token = self.bearer()?;
        let form = [("queue_id", queue_id.to_string())];
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .form(&form)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: "queue",
                source,
            })?;

        let decoded: QueueResponse = decode_json("queue", response).await?;
        match decoded.status {
            STATUS_PROCESSING => Err(ApiError::Processing { queue_id }),
            STATUS_OK => decoded.guids.ok_or(ApiError::MissingField {
                endpoint: "queue",
                field: "guids",
            }),
            status => Err(ApiError::Api {
                endpoint: "queue",
                status,
                message: server_message(decoded.message),
            }),
        }
    }

    /// Fetch the structured per-line text result for one finished page.
    pub async fn get_result(&self, guid: u64) -> Result<Vec<TextLine>, ApiError> {
        let url = self.endpoint_url(QUERY_ENDPOINT)?;
        let token = self.bearer()?;
        let form = [("guid", guid.to_string())];
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .form(&form)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: "query",
                source,
            })?;

        let decoded: QueryResponse = decode_json("query", response).await?;
        if decoded.status != STATUS_OK {
            return Err(ApiError::Api {
                endpoint: "query",
                status: decoded.status,
                message: server_message(decoded.message),
            });
        }
        decoded.result.ok_or(ApiError::MissingField {
            endpoint: "query",
            field: "result",
        })
    }

    /// Fetch the raw page image for one finished page.
    pub async fn get_image(&self, guid: u64) -> Result<Vec<u8>, ApiError> {
        let url = self.endpoint_url(GET_IMAGE_ENDPOINT)?;
        let token = self.bearer()?;
        let form = [("guid", guid.to_string())];
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .form(&form)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: "get_image",
                source,
            })?;

        let decoded: ImageResponse = decode_json("get_image", response).await?;
        if decoded.status != STATUS_OK {
            return Err(ApiError::Api {
                endpoint: "get_image",
                status: decoded.status,
                message: server_message(decoded.message),
            });
        }
        let payload = decoded.result.ok_or(ApiError::MissingField {
            endpoint: "get_image",
            field: "result",
        })?;
        BASE64_STANDARD
            .decode(payload.as_bytes())
            .map_err(|source| ApiError::ImageDecode { guid, source })
    }
}

fn flag(value: bool) -> &'static str {
    if value { "1" } else { "0" }
}

/// Decode a JSON envelope, logging the HTTP status and best-effort UTF-8 body
/// when parsing fails so problems against the external API stay debuggable.
async fn decode_json<T: DeserializeOwned>(
    endpoint: &'static str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let http_status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|source| ApiError::Request { endpoint, source })?;

    match serde_json::from_slice(&body) {
        Ok(decoded) => {
            debug!(endpoint, http_status = http_status.as_u16(), "decoded response");
            Ok(decoded)
        }
        Err(source) => {
            warn!(
                endpoint,
                http_status = http_status.as_u16(),
                body = %String::from_utf8_lossy(&body),
                "failed to decode API response"
            );
            Err(ApiError::Decode { endpoint, source })
        }
    }
}
