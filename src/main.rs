//! freshscan CLI
//!
//! Check whether the produce inference service is up, submit photos to it,
//! and browse the local scan history.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use freshscan::api::{ApiState, start_api_server};
use freshscan::config::Config;
use freshscan::readiness::{
    Notice, NoticeLevel, NoticeSink, ReadinessMonitor, ReadinessState, watch_notices,
};
use freshscan::scan::{
    CaptureSession, CapturedImage, HistorySummary, JsonlScanStore, ScanPipeline, SubmissionOutcome,
};

/// Configuration file picked up when `--config` is not given
const DEFAULT_CONFIG_PATH: &str = "freshscan.yaml";

/// How long to let pending notices drain before exiting
const NOTICE_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

/// freshscan - produce freshness scanner client
#[derive(Debug, Parser)]
#[command(name = "freshscan")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output logs as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Path to configuration file (defaults to ./freshscan.yaml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Base URL of the inference service, overriding the config file
    #[arg(long, global = true, env = "FRESHSCAN_API_URL")]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Wait until the service is ready or the retry budget runs out
    Status,

    /// Submit a photo for analysis
    Scan {
        /// Image file to submit
        #[arg(short, long)]
        image: PathBuf,

        /// Record the scan under this user instead of the configured one
        #[arg(short, long)]
        user: Option<String>,

        /// Submit immediately instead of waiting for the readiness checks
        #[arg(long)]
        no_wait: bool,
    },

    /// Show recorded scans
    History {
        /// Only show scans for this user (defaults to the configured user)
        #[arg(short, long)]
        user: Option<String>,

        /// Show scans from every user
        #[arg(long, conflicts_with = "user")]
        all: bool,

        /// Maximum number of scans to list
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },

    /// Run the local status API until Ctrl+C
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value_t = 8080)]
        port: u16,
    },

    /// Generate a default configuration file
    Init {
        /// Output file path
        #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,
    },

    /// Validate a configuration file
    Validate,
}

fn setup_logging(verbose: bool, json: bool) {
    let env_filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.json);

    let config_path = cli.config.as_deref();
    let api_url = cli.api_url.as_deref();

    match cli.command {
        Commands::Status => run_status(&load_config(config_path, api_url)?).await,

        Commands::Scan {
            image,
            user,
            no_wait,
        } => run_scan(&load_config(config_path, api_url)?, &image, user, no_wait).await,

        Commands::History { user, all, limit } => {
            show_history(&load_config(config_path, api_url)?, user, all, limit).await
        }

        Commands::Serve { port } => run_server(&load_config(config_path, api_url)?, port).await,

        Commands::Init { output } => init_config(&output),

        Commands::Validate => validate_config(config_path, api_url),
    }
}

/// Read the config file (if any) and apply the URL override
fn load_config(path: Option<&Path>, api_url: Option<&str>) -> Result<Config> {
    let mut config = match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Config::from_file(DEFAULT_CONFIG_PATH)
            .with_context(|| format!("Failed to load config from {DEFAULT_CONFIG_PATH}"))?,
        None => Config::default_config(),
    };

    if let Some(url) = api_url {
        config.service.base_url = url.to_string();
    }

    config.validate().context("Invalid configuration")?;
    tracing::debug!(base_url = %config.service.base_url, "Configuration loaded");
    Ok(config)
}

/// Prints notices to stderr
struct ConsoleNotices;

impl NoticeSink for ConsoleNotices {
    fn notify(&self, notice: Notice) {
        let marker = match notice.level() {
            NoticeLevel::Info => "i",
            NoticeLevel::Error => "!",
        };
        eprintln!("[{marker}] {}: {}", notice.title(), notice.message());
    }
}

/// Monitor plus the task forwarding its notices to the console
struct Session {
    monitor: ReadinessMonitor,
    pipeline: ScanPipeline,
    notices: JoinHandle<()>,
}

impl Session {
    fn new(config: &Config, user_id: String) -> Result<Self> {
        let client = config
            .service
            .to_client()
            .context("Failed to create inference client")?;
        let policy = config
            .readiness
            .to_retry_policy()
            .context("Invalid retry policy")?;

        let monitor = ReadinessMonitor::new(Arc::new(client.clone()), policy);
        let notices = tokio::spawn(watch_notices(
            monitor.subscribe(),
            config.readiness.notice_debounce,
            ConsoleNotices,
        ));

        let store = Arc::new(JsonlScanStore::new(&config.scan.history_path));
        let pipeline = ScanPipeline::new(client, monitor.clone(), store, user_id)
            .with_record_timeout(config.scan.record_timeout);

        Ok(Self {
            monitor,
            pipeline,
            notices,
        })
    }

    /// Finish pending recordings, stop probing and let already-decided notices print
    async fn finish(self) {
        self.pipeline.flush_records().await;
        self.monitor.shutdown();
        drop(self.monitor);
        drop(self.pipeline);
        let _ = tokio::time::timeout(NOTICE_DRAIN_TIMEOUT, self.notices).await;
    }
}

/// Wait for the readiness checks to settle
async fn run_status(config: &Config) -> Result<()> {
    let session = Session::new(config, config.scan.user_id.clone())?;

    tracing::info!(base_url = %config.service.base_url, "Checking service readiness");
    session.monitor.start();
    let state = session.monitor.wait_settled().await;
    let snapshot = session.monitor.snapshot();
    session.finish().await;

    println!(
        "{}: {} (attempt {}/{})",
        config.service.base_url, state, snapshot.attempt, snapshot.max_attempts
    );

    if state == ReadinessState::Unreachable {
        anyhow::bail!("Service unreachable after {} attempts", snapshot.attempt);
    }
    Ok(())
}

/// Load an image and submit it
async fn run_scan(config: &Config, image: &Path, user: Option<String>, no_wait: bool) -> Result<()> {
    let mut capture = CaptureSession::new();
    let held = CapturedImage::from_file(image)
        .await
        .with_context(|| format!("Failed to load image {}", image.display()))?;
    capture.hold(held);

    let user_id = user.unwrap_or_else(|| config.scan.user_id.clone());
    let session = Session::new(config, user_id)?;
    session.monitor.start();
    if !no_wait {
        let state = session.monitor.wait_settled().await;
        tracing::debug!(%state, "Readiness settled, submitting");
    }

    let outcome = match capture.image() {
        Some(image) => session.pipeline.submit(image).await,
        None => anyhow::bail!("No image captured"),
    };
    session.finish().await;

    match outcome {
        SubmissionOutcome::Success(result) => {
            println!("{result}");
            if let Some(confidence) = result.subject_confidence() {
                println!("Identified as {} ({confidence:.1}%)", result.subject_label());
            }
            capture.show_result(result);
            Ok(())
        }
        SubmissionOutcome::Failure(reason) => {
            eprintln!("{}", reason.user_message());
            capture.reset();
            Err(anyhow::Error::new(reason).context("Scan failed"))
        }
    }
}

/// List recorded scans
async fn show_history(config: &Config, user: Option<String>, all: bool, limit: usize) -> Result<()> {
    let store = JsonlScanStore::new(&config.scan.history_path);
    let mut records = if all {
        let mut records = store.load().await?;
        records.reverse();
        records
    } else {
        let user_id = user.unwrap_or_else(|| config.scan.user_id.clone());
        store.history_for(&user_id).await?
    };

    let summary = HistorySummary::from_records(&records);
    records.truncate(limit);

    if records.is_empty() {
        println!("No scans recorded yet.");
        return Ok(());
    }

    for record in &records {
        println!(
            "{}  {:7} {:5.1}%  {}",
            record.recorded_at.format("%Y-%m-%d %H:%M"),
            record.classification.to_string(),
            record.confidence,
            record.subject_label
        );
    }

    println!();
    println!(
        "Total: {}  Fresh: {}  Rotten: {}  Unknown: {}",
        summary.total, summary.fresh, summary.rotten, summary.unknown
    );
    if let Some(average) = summary.average_confidence {
        println!("Average confidence: {average:.1}%");
    }

    Ok(())
}

/// Serve the status API
async fn run_server(config: &Config, port: u16) -> Result<()> {
    let session = Session::new(config, config.scan.user_id.clone())?;
    session.monitor.start();

    let state = ApiState::new(session.pipeline.clone());
    start_api_server(port, state)
        .await
        .map_err(|e| anyhow::anyhow!(e))
        .context("API server error")?;

    session.finish().await;
    Ok(())
}

/// Generate a default configuration file
fn init_config(output: &Path) -> Result<()> {
    let config = Config::default_config();
    let yaml = config.to_yaml().context("Failed to serialize config")?;

    std::fs::write(output, &yaml)
        .with_context(|| format!("Failed to write config to {}", output.display()))?;

    tracing::info!(path = %output.display(), "Configuration file created");
    println!("Created {}", output.display());
    println!();
    println!("Edit the file to point at your inference service, then run:");
    println!("  freshscan --config {} status", output.display());

    Ok(())
}

/// Validate a configuration file
fn validate_config(path: Option<&Path>, api_url: Option<&str>) -> Result<()> {
    let config = load_config(path, api_url)?;

    println!("Configuration is valid!");
    println!();
    println!("Service: {}", config.service.base_url);
    println!(
        "  probe timeout {:?}, upload timeout {:?}",
        config.service.probe_timeout, config.service.upload_timeout
    );

    let policy = config.readiness.to_retry_policy()?;
    println!(
        "Readiness: {} attempts, waits {:?} (total {:?})",
        policy.max_attempts(),
        policy.schedule(),
        policy.total_wait()
    );
    println!("History: {}", config.scan.history_path.display());
    println!("User: {}", config.scan.user_id);

    Ok(())
}
