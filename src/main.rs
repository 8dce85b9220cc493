//! Tidemark main entry point
//!
//! This is the command-line interface for the Tidemark post archiver.

use chrono::NaiveDate;
use clap::builder::BoolishValueParser;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tidemark::browser::{BrowserLauncher, WebDriverLauncher};
use tidemark::config::{load_config_with_hash, validate, Config, ConfigOverrides};
use tidemark::crawler::{CrawlContext, CrawlReport, CrawlScheduler};
use tidemark::output::{load_statistics, print_report, print_statistics, total_archived};
use tidemark::proxy::{CircuitRotator, TorCircuit};
use tidemark::state::{parse_date, CrawlWindow};
use tidemark::storage::{discover_owners, Checkpoint, Ledger, Owner, OwnerPaths};
use tidemark::ArchiveError;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Tidemark: an incremental archiver for a social account's posts
///
/// Tidemark walks an account's public posts one day at a time through a
/// WebDriver-controlled browser, optionally over a rotating Tor circuit,
/// and keeps a deduplicated ledger and a resumable checkpoint per account.
#[derive(Parser, Debug)]
#[command(name = "tidemark")]
#[command(version = "1.0.0")]
#[command(about = "An incremental archiver for a social account's posts", long_about = None)]
struct Cli {
    /// Account to archive; every account under the data directory if omitted
    #[arg(value_name = "OWNER")]
    owner: Option<String>,

    /// First day to crawl (YYYY-MM-DD); defaults to the checkpoint or join date
    #[arg(value_name = "START")]
    start: Option<String>,

    /// Last day to crawl (YYYY-MM-DD); defaults to today
    #[arg(value_name = "END")]
    end: Option<String>,

    /// Path to TOML configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Route the browser through a Tor circuit
    #[arg(long = "tor", env = "USE_TOR", value_parser = BoolishValueParser::new())]
    use_tor: bool,

    /// Path or name of the tor executable
    #[arg(long, env = "TOR_CMD", value_name = "PATH")]
    tor_cmd: Option<String>,

    /// Directory holding one folder per archived account
    #[arg(long, env = "DATA_DIR", value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Run the browser without a window (true/false)
    #[arg(long, env = "HEADLESS", value_name = "BOOL", value_parser = BoolishValueParser::new())]
    headless: Option<bool>,

    /// WebDriver server to drive the browser through
    #[arg(long, env = "WEBDRIVER_URL", value_name = "URL")]
    webdriver_url: Option<String>,

    /// Ignore an existing checkpoint when choosing the start date
    #[arg(long, env = "IGNORE_LOCK", value_parser = BoolishValueParser::new())]
    ignore_lock: bool,

    /// Same as -v
    #[arg(long, env = "DEBUG", value_parser = BoolishValueParser::new())]
    debug: bool,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Show archive statistics and exit
    #[arg(long)]
    stats: bool,
}

impl Cli {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            use_tor: self.use_tor.then_some(true),
            tor_command: self.tor_cmd.clone(),
            data_dir: self.data_dir.clone(),
            headless: self.headless,
            webdriver_url: self.webdriver_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let verbose = if cli.debug { cli.verbose.max(1) } else { cli.verbose };
    setup_logging(verbose, cli.quiet);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_interrupt() => {
            tracing::info!("Interrupted, exiting");
            ExitCode::SUCCESS
        }
        Err(e @ ArchiveError::InvalidInput(_)) => {
            tracing::error!("{}", e);
            ExitCode::from(2)
        }
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidemark=info,warn"),
            1 => EnvFilter::new("tidemark=debug,info"),
            2 => EnvFilter::new("tidemark=trace,debug"),
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

async fn run(cli: Cli) -> tidemark::Result<()> {
    let mut config = match &cli.config {
        Some(path) => {
            tracing::info!("Loading configuration from: {}", path.display());
            let (config, hash) = load_config_with_hash(path)?;
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            config
        }
        None => Config::default(),
    };
    config.apply(cli.overrides());
    validate(&config)?;

    // Dates are checked before anything is started
    let start = cli.start.as_deref().map(parse_date).transpose()?;
    let end = match cli.end.as_deref() {
        Some(s) => parse_date(s)?,
        None => chrono::Local::now().date_naive(),
    };
    if let Some(start) = start {
        CrawlWindow::new(start, end)?;
    }

    let owners = resolve_owners(cli.owner.as_deref(), &config.output.data_dir)?;

    if cli.stats {
        return handle_stats(&owners, &config);
    }

    handle_crawl(config, owners, start, end, cli.ignore_lock).await
}

/// Normalizes the given owner, or lists every owner under the data directory
fn resolve_owners(owner: Option<&str>, data_dir: &Path) -> tidemark::Result<Vec<Owner>> {
    if let Some(owner) = owner {
        return Ok(vec![Owner::parse(owner)?]);
    }

    let owners = discover_owners(data_dir)?;
    if owners.is_empty() {
        return Err(ArchiveError::NoOwner(data_dir.display().to_string()));
    }
    tracing::info!("No owner given, found {} under {}", owners.len(), data_dir.display());
    Ok(owners)
}

/// Handles the --stats mode: shows statistics from each owner's archive
fn handle_stats(owners: &[Owner], config: &Config) -> tidemark::Result<()> {
    println!("Data directory: {}\n", config.output.data_dir.display());

    for owner in owners {
        let paths = OwnerPaths::new(&config.output.data_dir, owner);
        let checkpoint = Checkpoint::new(paths.checkpoint.clone());
        let ledger = Ledger::open(paths)?;

        let stats = load_statistics(owner, &ledger, &checkpoint)?;
        print_statistics(&stats);
    }

    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(
    config: Config,
    owners: Vec<Owner>,
    start: Option<NaiveDate>,
    end: NaiveDate,
    ignore_checkpoint: bool,
) -> tidemark::Result<()> {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::warn!("Interrupt received, shutting down");
                    cancel.cancel();
                }
                Err(e) => tracing::error!("Failed to wait for Ctrl+C: {}", e),
            }
        });
    }

    let circuit = if config.proxy.enabled {
        let started = tokio::select! {
            started = TorCircuit::start(&config.proxy) => started?,
            _ = cancel.cancelled() => return Err(ArchiveError::Interrupted),
        };
        Some(Arc::new(started))
    } else {
        None
    };

    let result = crawl_owners(
        &config,
        &owners,
        start,
        end,
        ignore_checkpoint,
        &cancel,
        circuit.clone(),
    )
    .await;

    if let Some(circuit) = &circuit {
        circuit.stop().await;
    }

    let reports = result?;
    tracing::info!("Finished! {} record(s) archived in total", total_archived(&reports));
    Ok(())
}

/// Crawls owners one after another, sharing the launcher and circuit
async fn crawl_owners(
    config: &Config,
    owners: &[Owner],
    start: Option<NaiveDate>,
    end: NaiveDate,
    ignore_checkpoint: bool,
    cancel: &CancellationToken,
    circuit: Option<Arc<TorCircuit>>,
) -> tidemark::Result<Vec<CrawlReport>> {
    let proxy = circuit.as_ref().map(|c| c.socks_proxy());
    let launcher: Arc<dyn BrowserLauncher> =
        Arc::new(WebDriverLauncher::new(&config.browser, proxy)?);
    let rotator = circuit.map(|c| c as Arc<dyn CircuitRotator>);

    let mut reports = Vec::new();
    for owner in owners {
        tracing::info!("Owner: @{}", owner);

        let ctx = CrawlContext::open(
            owner.clone(),
            config,
            launcher.clone(),
            rotator.clone(),
            cancel.clone(),
        )?;
        let mut scheduler = CrawlScheduler::new(ctx, start, end, ignore_checkpoint)?;
        let result = scheduler.run().await;
        scheduler.into_context().close().await;

        let report = result?;
        print_report(&report);
        reports.push(report);
    }

    Ok(reports)
}
