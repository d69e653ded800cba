use std::path::PathBuf;

use clap::{ArgAction, Args, CommandFactory, Parser, Subcommand};

/// Top-level CLI entry point.
#[derive(Debug, Parser)]
#[command(
    name = "hanocr",
    version,
    author,
    about = "Client for the ASCDC OCR web service"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    /// Increase logging verbosity (-v, -vv, -vvv).
    #[arg(global = true, short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn print_help() {
        let mut cmd = Cli::command();
        let _ = cmd.print_help();
        println!();
    }
}

/// Supported subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload files, wait for OCR, and download the resulting artifacts.
    Run(RunArgs),
    /// Download results for known guids without uploading anything.
    Fetch(FetchArgs),
    /// Resolve or create a book and print its id.
    Book(BookArgs),
    /// Rename previously downloaded files to the configured naming scheme.
    Rename(RenameArgs),
    /// Force a fresh login and refresh the cached token.
    Login,
}

/// Full upload → poll → download workflow.
#[derive(Debug, Args)]
pub struct RunArgs {
    /// Files to upload (JPEG, PNG, PDF, or ZIP).
    #[arg(value_name = "FILE")]
    pub files: Vec<PathBuf>,
    /// Upload every eligible file from this folder instead of listing files.
    #[arg(long, value_name = "DIR", conflicts_with = "files")]
    pub source_dir: Option<PathBuf>,
    /// Book title (paired with --author) when creating or reusing a book.
    #[arg(long)]
    pub title: Option<String>,
    /// Book author (paired with --title).
    #[arg(long)]
    pub author: Option<String>,
    /// Existing remote book id; skips the creation call.
    #[arg(long = "book-id")]
    pub book_id: Option<u64>,
    /// Additional result identifiers to download alongside the uploads.
    #[arg(long = "guid", value_name = "GUID")]
    pub guids: Vec<u64>,
    /// Directory for downloaded artifacts.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
    /// Upload only; skip downloading results.
    #[arg(long)]
    pub no_download: bool,
    /// Also download the page images.
    #[arg(long)]
    pub images: bool,
    /// Preview renames without touching the filesystem.
    #[arg(long)]
    pub dry_run: bool,
}

/// Direct download of existing result identifiers.
#[derive(Debug, Args)]
pub struct FetchArgs {
    /// Result identifiers to download.
    #[arg(required = true, value_name = "GUID")]
    pub guids: Vec<u64>,
    /// Also download the page images.
    #[arg(long)]
    pub images: bool,
    /// Directory for downloaded artifacts.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
}

/// Resolve or create a book.
#[derive(Debug, Args)]
pub struct BookArgs {
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub author: Option<String>,
    /// Existing remote book id to record in the cache.
    #[arg(long = "book-id")]
    pub book_id: Option<u64>,
    /// Visibility flag passed to the creation call (0 = private).
    #[arg(long)]
    pub public: Option<u8>,
    /// Page orientation passed to the creation call.
    #[arg(long)]
    pub orientation: Option<u8>,
}

/// Rename existing downloads for the given identifiers.
#[derive(Debug, Args)]
pub struct RenameArgs {
    /// Result identifiers whose files should be renamed.
    #[arg(required = true, value_name = "GUID")]
    pub guids: Vec<u64>,
    /// Directory holding the downloads.
    #[arg(long, value_name = "DIR")]
    pub download_dir: Option<PathBuf>,
    /// Log intended renames without touching the filesystem.
    #[arg(long)]
    pub dry_run: bool,
}
