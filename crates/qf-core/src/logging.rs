//! Process-wide `tracing` setup.
//!
//! Console output is human-readable with targets and thread ids. When a log
//! directory is given, a second layer writes one JSON object per event to a
//! daily-rotating file named after the module, for later grepping with `jq`.
//!
//! `RUST_LOG` wins over the level passed in.

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Fails if one is already installed.
///
/// - `log_level`: default filter when `RUST_LOG` is unset, e.g. `"info"`
///   or `"qf_md=debug,info"`
/// - `log_dir`: optional directory for the rolling JSON files
/// - `module_name`: file prefix, e.g. `"quote_feed"`
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> anyhow::Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(f) => f,
        Err(_) => EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level {log_level:?}"))?,
    };

    let console_layer = fmt::layer().with_target(true).with_thread_ids(true);

    let file_layer = log_dir.map(|dir| {
        fmt::layer()
            .json()
            .with_writer(tracing_appender::rolling::daily(dir, format!("{module_name}.log")))
            .with_ansi(false)
            .with_thread_ids(true)
    });

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("tracing subscriber already installed")?;
    Ok(())
}
