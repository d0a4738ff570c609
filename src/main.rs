//! crawl-engine main entry point
//!
//! This is the command-line interface for running and inspecting crawl jobs.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use crawl_engine::config::{load_config_with_hash, Config};
use crawl_engine::engine::CrawlContext;
use crawl_engine::fetcher::HttpLauncher;
use crawl_engine::job::{CrawlOptions, FieldSelector};
use crawl_engine::storage::{JobStore, SqliteStore};
use crawl_engine::{CrawlJob, CrawlSupervisor, JobId, JobStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// How often the crawl command re-reads job progress
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// crawl-engine: bounded breadth-first crawl jobs
///
/// Crawls a site breadth-first from a seed URL within a depth and page
/// limit, storing one result per attempted page in SQLite.
#[derive(Parser, Debug)]
#[command(name = "crawl-engine")]
#[command(version)]
#[command(about = "Bounded breadth-first crawl jobs", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a crawl job in the foreground; Ctrl-C cancels it
    Crawl {
        /// Page to start from
        seed_url: String,

        /// Link depth limit (0 crawls only the seed)
        #[arg(long)]
        max_depth: Option<u32>,

        /// Page limit
        #[arg(long)]
        max_pages: Option<u32>,

        /// Extract a field: NAME=CSS or NAME=CSS@ATTRIBUTE
        #[arg(long = "select", value_name = "RULE")]
        select: Vec<String>,

        /// Extract every match of a field: NAME=CSS or NAME=CSS@ATTRIBUTE
        #[arg(long = "select-all", value_name = "RULE")]
        select_all: Vec<String>,

        /// Extra request header: NAME=VALUE
        #[arg(long = "header", value_name = "HEADER")]
        header: Vec<String>,
    },

    /// Show a job record
    Status {
        job_id: String,
    },

    /// Show one page of a job's results
    Results {
        job_id: String,

        /// 1-based page number
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Results per page (at most 100)
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },

    /// List recent jobs
    Jobs {
        /// Only list jobs in this status (pending, running, completed, failed, cancelled)
        #[arg(long, value_parser = parse_status)]
        status: Option<JobStatus>,

        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::debug!("Configuration loaded (hash: {})", config_hash);

    let store = Arc::new(
        SqliteStore::new(Path::new(&config.output.database_path))
            .context("failed to open database")?,
    );

    match cli.command {
        Command::Crawl {
            seed_url,
            max_depth,
            max_pages,
            select,
            select_all,
            header,
        } => {
            let options = build_options(&select, &select_all, &header)?;
            let max_depth = max_depth.unwrap_or(config.crawler.default_max_depth);
            let max_pages = max_pages.unwrap_or(config.crawler.default_max_pages);
            handle_crawl(&config, store, &seed_url, max_depth, max_pages, options).await
        }
        Command::Status { job_id } => handle_status(store.as_ref(), &JobId::from(job_id)).await,
        Command::Results {
            job_id,
            page,
            limit,
        } => handle_results(&config, store, &JobId::from(job_id), page, limit).await,
        Command::Jobs { status, limit } => handle_jobs(store.as_ref(), status, limit).await,
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("crawl_engine=info,warn"),
            1 => EnvFilter::new("crawl_engine=debug,info"),
            2 => EnvFilter::new("crawl_engine=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn supervisor(config: &Config, store: Arc<SqliteStore>) -> CrawlSupervisor {
    let launcher = Arc::new(HttpLauncher::new(&config.user_agent));
    CrawlSupervisor::new(CrawlContext::new(
        store,
        launcher,
        config.engine_settings(),
    ))
}

/// Runs one job to completion, cancelling it on Ctrl-C
async fn handle_crawl(
    config: &Config,
    store: Arc<SqliteStore>,
    seed_url: &str,
    max_depth: u32,
    max_pages: u32,
    options: CrawlOptions,
) -> anyhow::Result<()> {
    let job = CrawlJob::new(seed_url, max_depth, max_pages, options)?;
    let job_id = job.id.clone();
    store.save_job(&job).await?;

    let supervisor = supervisor(config, Arc::clone(&store));
    supervisor.submit(job).await?;
    println!("Job {} submitted", job_id);

    let mut cancelled = false;
    let job = loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !cancelled => {
                signal.context("failed to listen for Ctrl-C")?;
                tracing::info!("Interrupt received, cancelling job {}", job_id);
                supervisor.cancel(&job_id).await;
                cancelled = true;
            }
            _ = tokio::time::sleep(POLL_INTERVAL) => {}
        }

        // Read before the record: the engine saves its final state first
        let tracked = supervisor.is_tracked(&job_id);
        let job = supervisor.job(&job_id).await?;
        if job.status.is_terminal() {
            break job;
        }
        if !tracked {
            bail!(
                "job {} ended without saving a final state (last stored status: {})",
                job_id,
                job.status
            );
        }
    };

    print_job(&job);
    Ok(())
}

async fn handle_status(store: &SqliteStore, job_id: &JobId) -> anyhow::Result<()> {
    match store.get_job(job_id).await? {
        Some(job) => {
            print_job(&job);
            Ok(())
        }
        None => bail!("job {} not found", job_id),
    }
}

async fn handle_results(
    config: &Config,
    store: Arc<SqliteStore>,
    job_id: &JobId,
    page: u32,
    limit: u32,
) -> anyhow::Result<()> {
    let supervisor = supervisor(config, store);
    let results = supervisor.results_page(job_id, page, limit).await?;
    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

async fn handle_jobs(
    store: &SqliteStore,
    status: Option<JobStatus>,
    limit: u32,
) -> anyhow::Result<()> {
    let jobs = store.list_jobs(status, limit).await?;
    if jobs.is_empty() {
        println!("No jobs found");
        return Ok(());
    }

    for job in jobs {
        println!(
            "{}  {:<9}  {:>4} pages  {}",
            job.id, job.status, job.progress.pages_processed, job.seed_url
        );
    }
    Ok(())
}

fn print_job(job: &CrawlJob) {
    println!("=== Job {} ===\n", job.id);
    println!("  Seed URL: {}", job.seed_url);
    println!("  Status: {}", job.status);
    println!("  Max depth: {}", job.max_depth);
    println!("  Max pages: {}", job.max_pages);
    println!("  Pages processed: {}", job.progress.pages_processed);
    println!("  Pages successful: {}", job.progress.pages_successful);
    println!("  Pages failed: {}", job.progress.pages_failed);
    if let Some(count) = job.result_count {
        println!("  Stored results: {}", count);
    }
    if let Some(message) = &job.error_message {
        println!("  Error: {}", message);
    }
    println!("  Created: {}", job.created_at.to_rfc3339());
    if let Some(started) = job.started_at {
        println!("  Started: {}", started.to_rfc3339());
    }
    if let Some(finished) = job.finished_at {
        println!("  Finished: {}", finished.to_rfc3339());
    }
}

/// Builds per-job options from `--select`, `--select-all` and `--header`
fn build_options(
    select: &[String],
    select_all: &[String],
    headers: &[String],
) -> anyhow::Result<CrawlOptions> {
    let mut options = CrawlOptions::default();

    let rules = select
        .iter()
        .map(|rule| (rule, false))
        .chain(select_all.iter().map(|rule| (rule, true)));
    for (rule, multiple) in rules {
        let (name, selector) = parse_selector_rule(rule, multiple)?;
        options.selectors.insert(name, selector);
    }

    for header in headers {
        let Some((name, value)) = header.split_once('=') else {
            bail!("header '{}' must look like NAME=VALUE", header);
        };
        options
            .headers
            .insert(name.trim().to_string(), value.trim().to_string());
    }

    Ok(options)
}

fn parse_selector_rule(rule: &str, multiple: bool) -> anyhow::Result<(String, FieldSelector)> {
    let Some((name, spec)) = rule.split_once('=') else {
        bail!("selector '{}' must look like NAME=CSS or NAME=CSS@ATTRIBUTE", rule);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("selector '{}' has an empty name", rule);
    }

    let (css, attribute) = match spec.rsplit_once('@') {
        Some((css, attr)) if !attr.trim().is_empty() => (css, Some(attr.trim().to_string())),
        _ => (spec, None),
    };

    Ok((
        name.to_string(),
        FieldSelector {
            selector: css.trim().to_string(),
            attribute,
            multiple,
        },
    ))
}

fn parse_status(s: &str) -> Result<JobStatus, String> {
    JobStatus::from_db_string(&s.to_ascii_lowercase())
        .ok_or_else(|| format!("unknown job status '{}'", s))
}
