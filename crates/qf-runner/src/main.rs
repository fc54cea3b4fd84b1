//! # qf-runner
//!
//! Diagnostic entry point for the quote feed.
//!
//! Loads a JSON configuration file, starts the feed, logs ingestion stats
//! periodically and stops cleanly on Ctrl+C.
//!
//! # Usage
//!
//! ```bash
//! qf-runner config.json --log-level info --stats-interval-s 10 --export /tmp/quotes.json
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use qf_core::config::FeedConfig;
use qf_md::{MdModule, QuoteFeed};
use tracing::{debug, error, info};

/// Real-time quote feed runner.
#[derive(Parser)]
#[command(name = "qf-runner", about = "Real-time quote feed runner")]
struct Cli {
    /// Configuration file path (JSON).
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Optional log directory for file output. Overrides `Module.log_path`.
    #[arg(long)]
    log_dir: Option<String>,

    /// Seconds between stats log lines. `0` disables them.
    #[arg(long, default_value_t = 10)]
    stats_interval_s: u64,

    /// Write a JSON dump of stats and the quote snapshot here on exit.
    #[arg(long)]
    export: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1. Load configuration
    let config = qf_core::config::load_config(&cli.config)?;
    let module_name = config.module_name();

    // 2. Initialize logging
    let log_dir = cli.log_dir.clone().or_else(|| config.log_path());
    qf_core::logging::init_logging(&cli.log_level, log_dir.as_deref(), &module_name)?;
    info!("qf-runner starting, config={}, log_level={}", cli.config.display(), cli.log_level);

    // 3. Build and start the feed
    let feed_config = FeedConfig::from_section(&config.feed)?;
    let mut feed = QuoteFeed::new(feed_config);
    let handle = feed.handle();
    handle.subscribe(|q| {
        debug!("{q}");
        Ok(())
    });

    MdModule::start(&mut feed).await?;
    info!("module '{}' started, press Ctrl+C to stop", feed.name());

    // 4. Log stats until the shutdown signal
    let mut ticker = (cli.stats_interval_s > 0)
        .then(|| tokio::time::interval(Duration::from_secs(cli.stats_interval_s)));
    loop {
        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r?;
                info!("shutdown signal received");
                break;
            }
            _ = async {
                match ticker.as_mut() {
                    Some(t) => { t.tick().await; }
                    None => std::future::pending::<()>().await,
                }
            } => {
                info!("[{}] {}", feed.name(), handle.stats());
            }
        }
    }

    // 5. Stop and optionally export
    MdModule::stop(&mut feed).await;
    info!("[{}] final stats: {}", feed.name(), handle.stats());

    if let Some(path) = cli.export {
        match handle.export_json(&path) {
            Ok(()) => info!("exported snapshot to {}", path.display()),
            Err(e) => error!("export to {} failed: {e:#}", path.display()),
        }
    }

    info!("qf-runner stopped");
    Ok(())
}
