mod backfill;
mod catalog;
mod checkpoint;
mod config;
mod diagnostics;
mod filename_allocator;
mod judge;
mod ledger;
mod pipeline;
mod report;
mod shutdown;
mod source_links;
mod url_resolver;
mod validation;
mod wiki_client;
mod wiki_url;

use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use log::{error, info};

use backfill::{backfill_file, BackfillOutcome};
use catalog::Catalog;
use checkpoint::CheckpointStore;
use config::{default_config_path, load_config, Config};
use diagnostics::ErrorLog;
use judge::{AnthropicJudge, RetryingJudge};
use ledger::LedgerWriter;
use pipeline::FetchPipeline;
use shutdown::{install_interrupt_handler, StopFlag, ThreadSleeper};
use validation::{ValidationDriver, ValidationSetup};
use wiki_client::{UreqTransport, WikipediaClient};

#[derive(Parser, Debug)]
#[command(
    name = "wikifetch",
    about = "Fetch Wikipedia articles for catalog books, retry failures and validate matches"
)]
struct Cli {
    /// Config file (defaults to wikifetch.toml in the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download every article listed in the link file, resuming from progress
    Fetch,
    /// Re-attempt failed downloads with diagnostics
    Retry,
    /// Ask the judge whether each saved article matches its book
    Validate,
    /// Add a wikipedia_url column to legacy tab-separated result files
    BackfillUrls {
        /// Files to update (defaults to validation.legacy_results)
        files: Vec<PathBuf>,
    },
}

type RunResult = Result<(), Box<dyn std::error::Error>>;

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}

fn fetch_pipeline<'a>(
    config: &Config,
    client: &'a WikipediaClient<UreqTransport, &'a ThreadSleeper>,
    sleeper: &'a ThreadSleeper,
    stop: &StopFlag,
) -> FetchPipeline<&'a WikipediaClient<UreqTransport, &'a ThreadSleeper>, &'a ThreadSleeper> {
    FetchPipeline::new(
        client,
        sleeper,
        CheckpointStore::load(&config.paths.progress_file),
        ErrorLog::new(&config.paths.error_log),
        &config.paths.articles_dir,
    )
    .with_stop_flag(stop.clone())
    .with_throttle(Duration::from_millis(config.fetch.request_delay_ms))
}

fn build_wiki_client<'a>(
    config: &Config,
    sleeper: &'a ThreadSleeper,
) -> WikipediaClient<UreqTransport, &'a ThreadSleeper> {
    let transport = UreqTransport::new(
        config.fetch.user_agent.clone(),
        config.fetch.request_timeout_secs,
    );
    WikipediaClient::new(transport, sleeper)
        .with_api_url_template(config.fetch.api_url_template.clone())
        .with_retry_delays(secs(&config.fetch.retry_delays_secs))
}

fn run_fetch(config: &Config, stop: &StopFlag) -> RunResult {
    info!("Wikipedia Article Scraper Started");
    let records = source_links::load_records(&config.paths.input_file)?;
    let sleeper = ThreadSleeper::new(stop.clone());
    let client = build_wiki_client(config, &sleeper);
    let stats = fetch_pipeline(config, &client, &sleeper, stop).run_fetch(&records)?;
    let summary = stats.summary(chrono::Local::now());
    report::write_summary(&config.paths.summary_file, &summary);
    Ok(())
}

fn run_retry(config: &Config, stop: &StopFlag) -> RunResult {
    info!("Retry Failed Wikipedia Articles");
    let sleeper = ThreadSleeper::new(stop.clone());
    let client = build_wiki_client(config, &sleeper);
    fetch_pipeline(config, &client, &sleeper, stop).run_retry(&config.paths.retry_results)?;
    Ok(())
}

fn run_validate(config: &Config, stop: &StopFlag) -> RunResult {
    info!("Wikipedia Article Validation System");
    let started = Instant::now();
    let settings = &config.validation;
    let judge = AnthropicJudge::from_env(
        settings.model.clone(),
        settings.max_tokens,
        settings.request_timeout_secs,
    )?;
    let catalog = Catalog::load(&settings.catalog_path)?;
    let links = source_links::load_index(&config.paths.input_file)?;
    info!("Loaded URLs for {} books", links.len());

    let sleeper = ThreadSleeper::new(stop.clone());
    let judge = RetryingJudge::new(judge, &sleeper).with_schedule(
        settings.judge_attempts,
        secs(&settings.judge_retry_delays_secs),
    );
    let setup = ValidationSetup {
        catalog,
        links,
        checkpoint: CheckpointStore::load(&settings.progress_file),
        matches: LedgerWriter::create(&settings.matches_file)?,
        mismatches: LedgerWriter::create(&settings.mismatches_file)?,
        error_log: ErrorLog::new(&settings.error_log),
        articles_dir: config.paths.articles_dir.clone(),
    };
    let stats = ValidationDriver::new(judge, &sleeper, setup)
        .with_stop_flag(stop.clone())
        .with_throttle(Duration::from_millis(settings.request_delay_ms))
        .with_excerpt_chars(settings.excerpt_chars)
        .run()?;

    let summary = stats.summary(chrono::Local::now(), started.elapsed());
    report::write_summary(&settings.summary_file, &summary);
    info!("Matches: {}", settings.matches_file.display());
    info!("Mismatches: {}", settings.mismatches_file.display());
    info!("Errors: {}", settings.error_log.display());
    Ok(())
}

fn run_backfill(config: &Config, files: Vec<PathBuf>) -> RunResult {
    let links = source_links::load_index(&config.paths.input_file)?;
    info!("Loaded URLs for {} books", links.len());
    let files = if files.is_empty() {
        config.validation.legacy_results.clone()
    } else {
        files
    };
    let mut updated = 0usize;
    for path in &files {
        if let BackfillOutcome::Updated { .. } = backfill_file(path, &links)? {
            updated += 1;
        }
    }
    info!(
        "Done! {} of {} file(s) updated, originals backed up with .backup extension",
        updated,
        files.len()
    );
    Ok(())
}

fn main() -> RunResult {
    let cli = Cli::parse();

    let mut clog = colog::default_builder();
    clog.filter(
        None,
        if cli.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        },
    );
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_path = cli.config.unwrap_or_else(default_config_path);
    let config = load_config(&config_path);

    let stop = StopFlag::new();
    install_interrupt_handler(stop.clone());

    let result = match cli.command {
        Command::Fetch => run_fetch(&config, &stop),
        Command::Retry => run_retry(&config, &stop),
        Command::Validate => run_validate(&config, &stop),
        Command::BackfillUrls { files } => run_backfill(&config, files),
    };
    if let Err(err) = &result {
        error!("{}", err);
    }
    result
}
