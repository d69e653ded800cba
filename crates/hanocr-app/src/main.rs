use std::path::PathBuf;
use std::process;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tracing_subscriber::{filter::LevelFilter, fmt};

use hanocr_app::cli::{BookArgs, Cli, Commands, FetchArgs, RenameArgs, RunArgs};
use hanocr_app::config::{self, AppConfig, UploadConfig};
use hanocr_app::error::AppError;
use hanocr_app::naming::RenameMap;
use hanocr_app::paths::AppPaths;
use hanocr_app::services::{
    AscdcClient, BookCache, BookSpec, ClientOptions, PollPolicy, ResultIdentifier, SaveOptions,
    TokenCache, UploadOptions, resolve_book,
};
use hanocr_app::workflow::{self, PacingPolicy, RunOptions, collect_upload_targets};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli).await {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.verbose {
        0 => LevelFilter::OFF,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    let verbosity = cli.verbose;

    match cli.command {
        Some(Commands::Run(args)) => {
            run_workflow(args, verbosity).await?;
        }
        Some(Commands::Fetch(args)) => {
            run_fetch(args, verbosity).await?;
        }
        Some(Commands::Book(args)) => {
            run_book(args).await?;
        }
        Some(Commands::Rename(args)) => {
            run_rename(args)?;
        }
        Some(Commands::Login) => {
            run_login().await?;
        }
        None => {
            Cli::print_help();
        }
    }

    Ok(())
}

/// Config, paths, caches, and an authenticated-capable client for the
/// network-facing subcommands.
struct Runtime {
    config: AppConfig,
    paths: AppPaths,
    client: AscdcClient,
    book_cache: BookCache,
}

fn build_runtime() -> Result<Runtime, AppError> {
    let config = config::load()?;
    config.require_credentials()?;
    let paths = AppPaths::from_project_dirs()?;

    let poll = PollPolicy::builder()
        .interval(Duration::from_secs(config.api.poll_interval_secs))
        .max_attempts(config.api.poll_max_attempts)
        .build();
    let options = ClientOptions::builder()
        .base_url(config.api.base_url.clone())
        .account(config.account.account.clone())
        .password(config.account.password.clone())
        .poll(poll)
        .timeout(Duration::from_secs(config.api.timeout_secs))
        .build();

    let client = AscdcClient::new(options, TokenCache::new(paths.token_cache_path()))?;
    let book_cache = BookCache::new(paths.book_cache_path());

    Ok(Runtime {
        config,
        paths,
        client,
        book_cache,
    })
}

fn build_save_options(
    config: &AppConfig,
    paths: &AppPaths,
    download_dir: Option<PathBuf>,
    dry_run: bool,
) -> Result<SaveOptions, AppError> {
    let dir = match download_dir.or_else(|| config.download.dir.clone()) {
        Some(dir) => dir,
        None => paths.downloads_dir()?,
    };
    let rename_map = match config.download.rename_map.as_deref() {
        Some(path) => RenameMap::load(path)?,
        None => RenameMap::default(),
    };

    Ok(SaveOptions::builder()
        .dir(dir)
        .template(config.download.template.clone())
        .rename_map(rename_map)
        .dry_run(dry_run)
        .build())
}

fn upload_options_from(config: &UploadConfig) -> UploadOptions {
    UploadOptions::builder()
        .block_order(config.block_order.clone())
        .language(config.language)
        .orientation(config.orientation)
        .correction(config.correction)
        .pages_per_img(config.pages_per_img)
        .remove_margin(config.remove_margin)
        .has_mark(config.has_mark)
        .has_alphabet(config.has_alphabet)
        .remove_anno(config.remove_anno)
        .is_inverted(config.is_inverted)
        .build()
}

/// Merge CLI book flags over the configured defaults. `None` when neither an
/// id nor a complete (title, author) pair is available.
fn book_spec_from(
    config: &AppConfig,
    title: Option<String>,
    author: Option<String>,
    id: Option<u64>,
    public: Option<u8>,
    orientation: Option<u8>,
) -> Option<BookSpec> {
    let title = title.or_else(|| config.book.title.clone());
    let author = author.or_else(|| config.book.author.clone());
    let id = id.or(config.book.id);

    if id.is_none() && (title.is_none() || author.is_none()) {
        return None;
    }

    Some(
        BookSpec::builder()
            .maybe_title(title)
            .maybe_author(author)
            .maybe_id(id)
            .public(public.unwrap_or(config.book.public))
            .orientation(orientation.unwrap_or(config.book.orientation))
            .build(),
    )
}

fn pacing_from(config: &AppConfig) -> PacingPolicy {
    PacingPolicy::builder()
        .jitter_min(Duration::from_millis(config.pacing.jitter_min_ms))
        .jitter_max(Duration::from_millis(config.pacing.jitter_max_ms))
        .settle(Duration::from_secs(config.pacing.settle_secs))
        .bulk_settle(Duration::from_secs(config.pacing.bulk_settle_secs))
        .build()
}

async fn run_workflow(args: RunArgs, verbosity: u8) -> Result<(), AppError> {
    let mut rt = build_runtime()?;

    let files = match args.source_dir.as_deref() {
        Some(dir) => collect_upload_targets(dir)?,
        None => args.files,
    };
    let book = book_spec_from(&rt.config, args.title, args.author, args.book_id, None, None);
    let save = build_save_options(&rt.config, &rt.paths, args.download_dir, args.dry_run)?;
    let progress = (verbosity == 0).then(make_progress_bar);

    let options = RunOptions::builder()
        .files(files)
        .guids(args.guids)
        .maybe_book(book)
        .upload(upload_options_from(&rt.config.upload))
        .save(save)
        .download_results(!args.no_download)
        .download_images(args.images || rt.config.download.images)
        .pacing(pacing_from(&rt.config))
        .maybe_progress(progress)
        .build();

    let summary = workflow::run(&mut rt.client, &rt.book_cache, options).await?;
    println!(
        "uploaded {} file(s); {} guid(s); saved {} result(s) and {} image(s); renamed {} file(s)",
        summary.uploaded, summary.guids, summary.saved_results, summary.saved_images,
        summary.renamed
    );
    Ok(())
}

async fn run_fetch(args: FetchArgs, verbosity: u8) -> Result<(), AppError> {
    let mut rt = build_runtime()?;

    let save = build_save_options(&rt.config, &rt.paths, args.download_dir, false)?;
    let progress = (verbosity == 0).then(make_progress_bar);

    let options = RunOptions::builder()
        .guids(args.guids)
        .upload(upload_options_from(&rt.config.upload))
        .save(save)
        .download_results(true)
        .download_images(args.images || rt.config.download.images)
        .pacing(pacing_from(&rt.config))
        .maybe_progress(progress)
        .build();

    let summary = workflow::run(&mut rt.client, &rt.book_cache, options).await?;
    println!(
        "saved {} result(s) and {} image(s)",
        summary.saved_results, summary.saved_images
    );
    Ok(())
}

async fn run_book(args: BookArgs) -> Result<(), AppError> {
    let mut rt = build_runtime()?;

    let spec = book_spec_from(
        &rt.config,
        args.title,
        args.author,
        args.book_id,
        args.public,
        args.orientation,
    )
    .ok_or(AppError::MissingBook)?;

    rt.client.ensure_token().await?;
    let book = resolve_book(&rt.client, &rt.book_cache, &spec).await?;
    println!("book {}", book.id);
    Ok(())
}

fn run_rename(args: RenameArgs) -> Result<(), AppError> {
    // Purely local: no credentials or network needed.
    let config = config::load()?;
    let paths = AppPaths::from_project_dirs()?;
    let save = build_save_options(&config, &paths, args.download_dir, args.dry_run)?;

    let mut total = 0usize;
    for guid in args.guids {
        let identifier = ResultIdentifier::new(guid);
        for renamed in identifier.rename_existing_downloads(&save)? {
            let verb = if args.dry_run { "would rename" } else { "renamed" };
            println!(
                "{verb} {} -> {}",
                renamed.from.display(),
                renamed.to.display()
            );
            total += 1;
        }
    }
    if total == 0 {
        println!("no matching downloads found");
    }
    Ok(())
}

async fn run_login() -> Result<(), AppError> {
    let mut rt = build_runtime()?;
    rt.client.login().await?;
    println!("login successful; token cached");
    Ok(())
}

fn make_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {pos}/{len} pages ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
