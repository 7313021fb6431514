//! FeedDigest - rate-limited X feed collector with LLM summaries
//!
//! Polls the authenticated user's home timeline on a fixed cadence,
//! accumulates posts in a durable collection file, and when enough posts
//! are collected hands them to an Ollama model for analysis. Reports are
//! delivered through a mail relay and archived alongside the collection.
//!
//! Exit codes:
//!   0 - Clean termination (runtime ceiling, operator stop, one-shot done)
//!   1 - Invalid arguments or configuration

mod analysis;
mod cli;
mod collector;
mod config;
mod feed;
mod models;
mod ratelimit;
mod report;
mod store;

use analysis::{AnalysisOutcome, OllamaAnalyzer};
use anyhow::{Context, Result};
use cli::Args;
use collector::{Collector, CollectorSettings, TerminationReason};
use config::{Config, Credentials, CONFIG_FILE};
use feed::XClient;
use ratelimit::RateLimiter;
use report::ReportNotifier;
use std::path::PathBuf;
use store::CollectionStore;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    // Load config before logging; general.verbose feeds the log level.
    let (mut config, source) = match load_config(&args) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);

    // Initialize logging
    init_logging(args.log_level(config.general.verbose));

    info!("FeedDigest v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    source.log();

    if let Err(e) = config.validate() {
        error!("Configuration error: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    let credentials = Credentials::from_env();
    debug!("Credentials: {:?}", credentials);

    let result = if let Some(ref username) = args.lookup_user {
        lookup_user(&config, &credentials, username).await
    } else if args.once {
        run_once(&config, &credentials).await
    } else {
        run_collection(&config, &credentials).await
    };

    if let Err(e) = result {
        error!("Startup failed: {:#}", e);
        eprintln!("\n❌ Error: {:#}", e);
        std::process::exit(1);
    }

    Ok(())
}

/// Handle --init-config: generate a default .feeddigest.toml.
fn handle_init_config() -> Result<()> {
    let path = std::path::Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to set the recipient, mail relay, model and quotas.");
    Ok(())
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Where the configuration came from, reported once logging is up.
enum ConfigSource {
    Explicit(PathBuf),
    DefaultFile,
    BuiltIn,
    Fallback(anyhow::Error),
}

impl ConfigSource {
    fn log(&self) {
        match self {
            Self::Explicit(path) => info!("Loaded config from: {}", path.display()),
            Self::DefaultFile => info!("Loaded default config from {}", CONFIG_FILE),
            Self::BuiltIn => debug!("No config file found, using defaults"),
            Self::Fallback(e) => warn!("Failed to load config: {:#}", e),
        }
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<(Config, ConfigSource)> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        let config = Config::load(config_path)?;
        return Ok((config, ConfigSource::Explicit(config_path.clone())));
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => Ok((config, ConfigSource::DefaultFile)),
        Ok(None) => Ok((Config::default(), ConfigSource::BuiltIn)),
        Err(e) => Ok((Config::default(), ConfigSource::Fallback(e))),
    }
}

type DefaultCollector = Collector<XClient, OllamaAnalyzer, ReportNotifier>;

/// Wire the collector from configuration.
fn build_collector(
    config: &Config,
    credentials: &Credentials,
    shutdown: watch::Receiver<bool>,
) -> Result<DefaultCollector> {
    let fetcher = XClient::new(config.feed.clone(), credentials.x_bearer_token.clone())
        .context("Cannot create X API client")?;
    let analyzer =
        OllamaAnalyzer::new(config.model.clone()).context("Cannot create model client")?;
    let notifier = ReportNotifier::new(
        &config.email,
        credentials,
        config.general.reports_dir.clone(),
    )?;

    if config.email.recipient.is_empty() {
        warn!("No report recipient configured; reports will only be saved to disk");
    }

    let store = CollectionStore::open(
        config.general.collection_file.clone(),
        config.general.archive_dir.clone(),
    );
    let limiter = RateLimiter::from(&config.rate_limit);

    Ok(Collector::new(
        CollectorSettings::from(config),
        store,
        limiter,
        fetcher,
        analyzer,
        notifier,
        shutdown,
    ))
}

/// Run the continuous collection loop until the ceiling or an interrupt.
async fn run_collection(config: &Config, credentials: &Credentials) -> Result<()> {
    let (tx, rx) = watch::channel(false);
    let mut collector = build_collector(config, credentials, rx)?;

    tokio::spawn(collector::forward_shutdown_signal(tx));

    println!("📥 Collecting into {}", config.general.collection_file.display());
    println!("   Target: {} posts", config.collector.target_count);
    println!("   Interval: {} minutes", config.collector.interval_minutes);
    println!("   Max runtime: {} minutes", config.collector.max_runtime_minutes);
    println!("   Model: {}", config.model.name);

    let summary = collector.run().await;
    debug!("Collector finished in state {}", collector.state());

    let reason = match summary.reason {
        TerminationReason::CeilingReached => "runtime limit reached",
        TerminationReason::Interrupted => "stopped by user",
    };
    println!("\n📊 Collection Summary:");
    println!("   Cycles: {}", summary.cycles);
    println!("   Analysis passes: {}", summary.analyses);
    println!(
        "   Pending posts: {} (in {})",
        collector.store().total_posts(),
        collector.store().path().display()
    );
    println!(
        "   Runtime: {}",
        collector::collector_loop::format_duration(summary.elapsed)
    );
    println!("\n✅ Collection ended ({}). Script completed successfully.", reason);

    Ok(())
}

/// Fetch one batch and analyze immediately.
async fn run_once(config: &Config, credentials: &Credentials) -> Result<()> {
    let (_tx, rx) = watch::channel(false);
    let mut collector = build_collector(config, credentials, rx)?;

    println!("🔬 Fetching and analyzing X feed data...");
    match collector.run_once().await {
        Ok(Some(AnalysisOutcome::Delivered { archive })) => {
            println!("\n✅ Analysis delivered. Posts archived to {}", archive.display());
        }
        Ok(Some(AnalysisOutcome::Failed { snapshot })) => {
            println!("\n⚠️  Analysis failed. Collection saved to {}", snapshot.display());
        }
        Ok(Some(AnalysisOutcome::NothingToAnalyze)) | Ok(None) => {
            println!("\nℹ️  No posts to analyze.");
        }
        Err(e) => {
            error!("One-shot run failed: {:#}", e);
            println!("\n⚠️  Run failed: {:#}", e);
        }
    }

    Ok(())
}

/// Print the recent posts of one user.
async fn lookup_user(config: &Config, credentials: &Credentials, username: &str) -> Result<()> {
    let client = XClient::new(config.feed.clone(), credentials.x_bearer_token.clone())
        .context("Cannot create X API client")?;
    let mut limiter = RateLimiter::from(&config.rate_limit);

    match client.user_recent_posts(&mut limiter, username).await {
        Ok(author) => {
            println!(
                "\nSuccessfully fetched posts from {} (@{})",
                author.display_name, author.username
            );
            println!("\nRecent posts:");
            for (i, post) in author.posts.iter().enumerate() {
                println!("\n{}. Posted at: {}", i + 1, post.created_at.to_rfc3339());
                println!("Text: {}", post.text);
                let metrics: Vec<String> = post
                    .metrics
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect();
                println!("Metrics: {}", metrics.join(", "));
            }
        }
        Err(e) => {
            error!("Lookup failed: {}", e);
            println!("\nError: {}", e);
        }
    }

    Ok(())
}
