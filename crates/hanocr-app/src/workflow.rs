//! Sequential orchestration of the full upload → poll → download workflow.
//!
//! Everything runs one request at a time; the only suspension points are the
//! jitter sleeps between steps and the fixed-interval queue polls inside the
//! client. The first error aborts the run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use indicatif::ProgressBar;
use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::AppError;
use crate::services::book::{Book, BookSpec, resolve_book};
use crate::services::cache::BookCache;
use crate::services::client::{AscdcClient, is_allowed_upload};
use crate::services::results::{ResultIdentifier, SaveOptions};
use crate::services::upload::{UploadOptions, UploadUnit};

/// How many identifiers count as a bulk download that needs extra settling.
const BULK_GUID_THRESHOLD: usize = 4;

/// Delays between workflow steps.
#[derive(Debug, Clone, bon::Builder)]
pub struct PacingPolicy {
    #[builder(default = Duration::from_millis(500))]
    pub jitter_min: Duration,
    #[builder(default = Duration::from_millis(1500))]
    pub jitter_max: Duration,
    /// Pause after uploads complete, before the first result fetch.
    #[builder(default = Duration::from_secs(10))]
    pub settle: Duration,
    /// Additional pause when many pages finished at once.
    #[builder(default = Duration::from_secs(30))]
    pub bulk_settle: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Explicit inputs for one workflow run; nothing is read from globals.
#[derive(Clone, bon::Builder)]
pub struct RunOptions {
    /// Local files to upload, in order.
    #[builder(default)]
    pub files: Vec<PathBuf>,
    /// Result identifiers to download directly, independent of any upload.
    #[builder(default)]
    pub guids: Vec<u64>,
    /// Book to upload into; required whenever `files` is non-empty.
    pub book: Option<BookSpec>,
    #[builder(default)]
    pub upload: UploadOptions,
    pub save: SaveOptions,
    #[builder(default = true)]
    pub download_results: bool,
    #[builder(default = false)]
    pub download_images: bool,
    #[builder(default)]
    pub pacing: PacingPolicy,
    /// Progress bar for the download loop; log lines are used when absent.
    pub progress: Option<ProgressBar>,
}

/// Counters reported after a successful run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub uploaded: usize,
    pub guids: usize,
    pub renamed: usize,
    pub saved_results: usize,
    pub saved_images: usize,
}

/// Run the workflow: resolve the book, upload every file, wait for the OCR
/// queues, rename previously downloaded files, then fetch the artifacts.
pub async fn run(
    client: &mut AscdcClient,
    book_cache: &BookCache,
    options: RunOptions,
) -> Result<RunSummary, AppError> {
    client.ensure_token().await?;

    if options.files.is_empty() && options.guids.is_empty() {
        return Err(AppError::NothingToDo);
    }

    let book = match options.book.as_ref() {
        Some(spec) => {
            let book = resolve_book(client, book_cache, spec).await?;
            pace(&options.pacing, "after book").await;
            Some(book)
        }
        None => None,
    };

    let mut summary = RunSummary::default();

    let mut units = Vec::with_capacity(options.files.len());
    if !options.files.is_empty() {
        let Book { id: bookid, .. } = book.as_ref().ok_or(AppError::MissingBook)?;
        for path in &options.files {
            let mut unit = UploadUnit::new(path.clone(), *bookid, options.upload.clone());
            unit.upload(client).await?;
            summary.uploaded += 1;
            pace(&options.pacing, "after upload").await;
            units.push(unit);
        }
    }

    let mut identifiers: Vec<ResultIdentifier> = Vec::new();
    for unit in &units {
        identifiers.extend(unit.wait_for_ocr(client).await?);
    }
    identifiers.extend(options.guids.iter().copied().map(ResultIdentifier::new));
    summary.guids = identifiers.len();

    if identifiers.is_empty() {
        info!("no result identifiers produced; check the uploads or supplied guids");
        return Ok(summary);
    }

    if !units.is_empty() && (options.download_results || options.download_images) {
        debug!(
            settle_secs = options.pacing.settle.as_secs(),
            "letting uploaded results settle"
        );
        sleep(options.pacing.settle).await;
        if identifiers.len() > BULK_GUID_THRESHOLD {
            debug!(
                bulk_settle_secs = options.pacing.bulk_settle.as_secs(),
                "many pages finished; settling longer"
            );
            sleep(options.pacing.bulk_settle).await;
        }
    }

    if !options.save.rename_map.is_empty() {
        for identifier in &identifiers {
            summary.renamed += identifier.rename_existing_downloads(&options.save)?.len();
        }
    }

    if options.download_results || options.download_images {
        if let Some(pb) = options.progress.as_ref() {
            pb.set_length(identifiers.len() as u64);
        }
        for identifier in &identifiers {
            pace(&options.pacing, "before result fetch").await;
            if options.download_results {
                let saved = identifier.save_results(client, &options.save).await?;
                summary.saved_results += 1;
                if let Some(pb) = options.progress.as_ref() {
                    pb.set_message(format!(
                        "saved {} ({} lines)",
                        saved.text_path.display(),
                        saved.lines
                    ));
                }
            }
            if options.download_images {
                identifier.save_image(client, &options.save).await?;
                summary.saved_images += 1;
            }
            if let Some(pb) = options.progress.as_ref() {
                pb.inc(1);
            }
        }
        if let Some(pb) = options.progress.as_ref() {
            pb.finish_with_message(format!(
                "downloaded {} result(s), {} image(s)",
                summary.saved_results, summary.saved_images
            ));
        }
    }

    debug_assert!(
        summary.saved_results <= summary.guids,
        "cannot save more results than identifiers"
    );
    info!(
        uploaded = summary.uploaded,
        guids = summary.guids,
        renamed = summary.renamed,
        saved_results = summary.saved_results,
        saved_images = summary.saved_images,
        "workflow complete"
    );
    Ok(summary)
}

/// Collect uploadable files from a source folder, applying the same name and
/// MIME filters the upload endpoint enforces. Entries are returned in name
/// order for deterministic upload sequences.
pub fn collect_upload_targets(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = std::fs::read_dir(dir).map_err(|source| AppError::Io {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| AppError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if is_allowed_upload(&path) {
            files.push(path);
        } else {
            debug!(path = %path.display(), "skipping file that fails upload filters");
        }
    }

    files.sort();
    Ok(files)
}

/// Sleep a randomized delay between the configured jitter bounds.
async fn pace(policy: &PacingPolicy, label: &str) {
    let min = policy.jitter_min.as_millis() as u64;
    let max = policy.jitter_max.as_millis() as u64;
    let delay_ms = if max > min {
        let mut rng = rand::thread_rng();
        rng.gen_range(min..=max)
    } else {
        min
    };
    debug!(delay_ms, label, "pacing");
    sleep(Duration::from_millis(delay_ms)).await;
}
