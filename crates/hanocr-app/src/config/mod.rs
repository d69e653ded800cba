//! Configuration loading: defaults, optional settings file, `HANOCR__*` env.

use std::path::PathBuf;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_HTTP_TIMEOUT_SECS, DEFAULT_NAME_TEMPLATE,
    DEFAULT_POLL_INTERVAL_SECS, DEFAULT_POLL_MAX_ATTEMPTS,
};

const CONFIG_FILE: &str = "config/settings";
const CONFIG_PATH_ENV: &str = "HANOCR_CONFIG";

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error(transparent)]
    Build(#[from] config::ConfigError),
    #[error("account credentials are not configured; set account.account and account.password")]
    MissingCredentials,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub account: AccountConfig,
    pub api: ApiConfig,
    pub book: BookConfig,
    pub upload: UploadConfig,
    pub download: DownloadConfig,
    pub pacing: PacingConfig,
}

impl AppConfig {
    /// Fail fast when the operator has not supplied credentials.
    pub fn require_credentials(&self) -> Result<(), AppConfigError> {
        if self.account.account.trim().is_empty() || self.account.password.trim().is_empty() {
            return Err(AppConfigError::MissingCredentials);
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AccountConfig {
    pub account: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: usize,
}

/// Book selection defaults; CLI flags override these per invocation.
#[derive(Debug, Deserialize, Clone)]
pub struct BookConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub id: Option<u64>,
    pub public: u8,
    pub orientation: u8,
}

/// Per-upload OCR options sent along with every file.
#[derive(Debug, Deserialize, Clone)]
pub struct UploadConfig {
    pub block_order: String,
    pub language: i64,
    pub orientation: i64,
    pub correction: i64,
    pub pages_per_img: u64,
    pub remove_margin: i64,
    pub has_mark: bool,
    pub has_alphabet: bool,
    pub remove_anno: bool,
    pub is_inverted: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    /// Output directory; defaults to the app data `downloads` dir when unset.
    #[serde(default)]
    pub dir: Option<PathBuf>,
    pub template: String,
    #[serde(default)]
    pub rename_map: Option<PathBuf>,
    pub images: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
    pub settle_secs: u64,
    pub bulk_settle_secs: u64,
}

pub fn load() -> Result<AppConfig, AppConfigError> {
    let config_file = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| CONFIG_FILE.to_string());

    let builder = Config::builder()
        .set_default("account.account", "")?
        .set_default("account.password", "")?
        .set_default("api.base_url", DEFAULT_BASE_URL)?
        .set_default("api.timeout_secs", DEFAULT_HTTP_TIMEOUT_SECS as i64)?
        .set_default("api.poll_interval_secs", DEFAULT_POLL_INTERVAL_SECS as i64)?
        .set_default("api.poll_max_attempts", DEFAULT_POLL_MAX_ATTEMPTS as i64)?
        .set_default("book.public", 0)?
        .set_default("book.orientation", 2)?
        .set_default("upload.block_order", "TBRL")?
        .set_default("upload.language", 1)?
        .set_default("upload.orientation", 2)?
        .set_default("upload.correction", -1)?
        .set_default("upload.pages_per_img", 1)?
        .set_default("upload.remove_margin", -1)?
        .set_default("upload.has_mark", false)?
        .set_default("upload.has_alphabet", false)?
        .set_default("upload.remove_anno", false)?
        .set_default("upload.is_inverted", false)?
        .set_default("download.template", DEFAULT_NAME_TEMPLATE)?
        .set_default("download.images", false)?
        .set_default("pacing.jitter_min_ms", 500)?
        .set_default("pacing.jitter_max_ms", 1500)?
        .set_default("pacing.settle_secs", 10)?
        .set_default("pacing.bulk_settle_secs", 30)?
        .add_source(File::with_name(&config_file).required(false))
        .add_source(Environment::with_prefix("HANOCR").separator("__"));

    let cfg = builder.build()?.try_deserialize()?;
    Ok(cfg)
}
