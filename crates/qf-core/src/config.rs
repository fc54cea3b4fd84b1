//! Configuration parsing for the quote feed.
//!
//! Settings come from a single JSON config file. The top-level structure
//! contains logging metadata and a `feed` section describing the upstream
//! endpoint and the pipeline bounds. Every field of the section is optional in
//! the file; [`FeedConfig::from_section`] fills in defaults and validates.
//!
//! # Example config
//!
//! ```json
//! {
//!   "Module": { "module_name": "quote_feed", "log_path": "/tmp/log" },
//!   "feed": {
//!     "host": "10.0.0.8", "port": 9000, "credential": "token",
//!     "idle_threshold_s": 60, "retry_ceiling": 5,
//!     "subscribe_preamble": "SUBSCRIBE_ALL"
//!   }
//! }
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::FeedError;

pub const DEFAULT_CONNECT_TIMEOUT_S: u64 = 10;
pub const DEFAULT_READ_TIMEOUT_S: u64 = 30;
pub const DEFAULT_IDLE_THRESHOLD_S: u64 = 60;
/// 1 MiB. Some upstream deployments need 10 MiB; raise it in the config.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1024 * 1024;
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 10_000;
pub const DEFAULT_RETRY_BASE_S: u64 = 2;
pub const DEFAULT_RETRY_MAX_S: u64 = 60;
pub const DEFAULT_RETRY_CEILING: u32 = 5;
pub const DEFAULT_HANDSHAKE_GRACE_MS: u64 = 2_000;
pub const DEFAULT_STOP_TIMEOUT_S: u64 = 5;
pub const DEFAULT_SOCKET_BUFFER_BYTES: u32 = 256 * 1024;
pub const DEFAULT_PRICE_ALERT_THRESHOLD: f64 = 1_000.0;

/// Top-level application config, deserialized from a JSON file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Module metadata (name, log path).
    #[serde(rename = "Module")]
    pub module: Option<ModuleMeta>,

    /// Upstream feed settings.
    pub feed: FeedSection,
}

impl AppConfig {
    /// Returns the module name, defaulting to `"quote_feed"`.
    pub fn module_name(&self) -> String {
        self.module
            .as_ref()
            .and_then(|m| m.module_name.clone())
            .unwrap_or_else(|| "quote_feed".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.module.as_ref().and_then(|m| m.log_path.clone())
    }
}

/// Module metadata block.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// The `feed` section as written in the file. Nothing is required here;
/// required-ness is checked when resolving into a [`FeedConfig`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedSection {
    /// Label used as the log prefix (default: `"quote_feed"`).
    pub label: Option<String>,

    /// Upstream host name or IP.
    pub host: Option<String>,
    /// Upstream TCP port.
    pub port: Option<u16>,
    /// Opaque token sent verbatim after connecting. May be empty.
    pub credential: Option<String>,

    pub connect_timeout_s: Option<u64>,
    pub read_timeout_s: Option<u64>,
    /// Longest gap without a frame before the session is declared dead.
    pub idle_threshold_s: Option<u64>,
    /// Ceiling for the announced frame length.
    pub max_frame_bytes: Option<usize>,

    /// Latest-value cache bound (entries).
    pub cache_capacity: Option<usize>,
    /// Pull-queue bound (quotes).
    pub queue_capacity: Option<usize>,

    pub retry_base_s: Option<u64>,
    pub retry_max_s: Option<u64>,
    /// Failed attempts tolerated between two established sessions.
    pub retry_ceiling: Option<u32>,

    /// Bytes sent after the credential, e.g. `"SUBSCRIBE_ALL"`.
    pub subscribe_preamble: Option<String>,
    /// Frames carry a checksum block after the length header.
    pub enable_checksum: Option<bool>,

    /// Heartbeat period. Absent means heartbeating is off.
    pub heartbeat_interval_s: Option<u64>,
    pub handshake_grace_ms: Option<u64>,
    pub stop_timeout_s: Option<u64>,
    /// SO_RCVBUF / SO_SNDBUF.
    pub socket_buffer_bytes: Option<u32>,
    pub reset_stats_on_start: Option<bool>,
    /// Quotes priced above this are flagged (not dropped).
    pub price_alert_threshold: Option<f64>,
    /// Keep the source payload on each quote.
    pub keep_raw: Option<bool>,
}

/// Resolved, validated feed configuration.
#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub label: String,
    pub host: String,
    pub port: u16,
    pub credential: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub idle_threshold: Duration,
    pub max_frame_bytes: usize,
    pub cache_capacity: usize,
    pub queue_capacity: usize,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub retry_ceiling: u32,
    pub subscribe_preamble: Option<Vec<u8>>,
    pub enable_checksum: bool,
    pub heartbeat_interval: Option<Duration>,
    pub handshake_grace: Duration,
    pub stop_timeout: Duration,
    pub socket_buffer_bytes: u32,
    pub reset_stats_on_start: bool,
    pub price_alert_threshold: f64,
    pub keep_raw: bool,
}

impl FeedConfig {
    /// A config for `host:port` with every other knob at its default.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            label: "quote_feed".to_string(),
            host: host.into(),
            port,
            credential: String::new(),
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_S),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_S),
            idle_threshold: Duration::from_secs(DEFAULT_IDLE_THRESHOLD_S),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            retry_base: Duration::from_secs(DEFAULT_RETRY_BASE_S),
            retry_max: Duration::from_secs(DEFAULT_RETRY_MAX_S),
            retry_ceiling: DEFAULT_RETRY_CEILING,
            subscribe_preamble: None,
            enable_checksum: false,
            heartbeat_interval: None,
            handshake_grace: Duration::from_millis(DEFAULT_HANDSHAKE_GRACE_MS),
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_S),
            socket_buffer_bytes: DEFAULT_SOCKET_BUFFER_BYTES,
            reset_stats_on_start: true,
            price_alert_threshold: DEFAULT_PRICE_ALERT_THRESHOLD,
            keep_raw: false,
        }
    }

    /// Resolve a file section into a validated config.
    pub fn from_section(s: &FeedSection) -> Result<Self, FeedError> {
        let host = s
            .host
            .clone()
            .ok_or_else(|| FeedError::Config("missing feed.host".into()))?;
        let port = s
            .port
            .ok_or_else(|| FeedError::Config("missing feed.port".into()))?;

        let mut cfg = Self::new(host, port);
        if let Some(ref label) = s.label {
            cfg.label = label.clone();
        }
        cfg.credential = s.credential.clone().unwrap_or_default();

        let secs = |v: Option<u64>, d: Duration| v.map(Duration::from_secs).unwrap_or(d);
        cfg.connect_timeout = secs(s.connect_timeout_s, cfg.connect_timeout);
        cfg.read_timeout = secs(s.read_timeout_s, cfg.read_timeout);
        cfg.idle_threshold = secs(s.idle_threshold_s, cfg.idle_threshold);
        cfg.retry_base = secs(s.retry_base_s, cfg.retry_base);
        cfg.retry_max = secs(s.retry_max_s, cfg.retry_max);
        cfg.stop_timeout = secs(s.stop_timeout_s, cfg.stop_timeout);
        cfg.heartbeat_interval = s.heartbeat_interval_s.map(Duration::from_secs);
        if let Some(ms) = s.handshake_grace_ms {
            cfg.handshake_grace = Duration::from_millis(ms);
        }

        cfg.max_frame_bytes = s.max_frame_bytes.unwrap_or(cfg.max_frame_bytes);
        cfg.cache_capacity = s.cache_capacity.unwrap_or(cfg.cache_capacity);
        cfg.queue_capacity = s.queue_capacity.unwrap_or(cfg.queue_capacity);
        cfg.retry_ceiling = s.retry_ceiling.unwrap_or(cfg.retry_ceiling);
        cfg.subscribe_preamble = s
            .subscribe_preamble
            .as_ref()
            .filter(|p| !p.is_empty())
            .map(|p| p.as_bytes().to_vec());
        cfg.enable_checksum = s.enable_checksum.unwrap_or(false);
        cfg.socket_buffer_bytes = s.socket_buffer_bytes.unwrap_or(cfg.socket_buffer_bytes);
        cfg.reset_stats_on_start = s.reset_stats_on_start.unwrap_or(true);
        cfg.price_alert_threshold = s.price_alert_threshold.unwrap_or(cfg.price_alert_threshold);
        cfg.keep_raw = s.keep_raw.unwrap_or(false);

        cfg.validate()?;
        Ok(cfg)
    }

    /// Check the settings a session cannot run without.
    pub fn validate(&self) -> Result<(), FeedError> {
        if self.host.trim().is_empty() {
            return Err(FeedError::Config("feed.host is empty".into()));
        }
        if self.port == 0 {
            return Err(FeedError::Config("feed.port must be non-zero".into()));
        }
        if self.max_frame_bytes == 0 {
            return Err(FeedError::Config("feed.max_frame_bytes must be positive".into()));
        }
        if self.cache_capacity == 0 || self.queue_capacity == 0 {
            return Err(FeedError::Config("cache and queue capacities must be positive".into()));
        }
        if self.read_timeout.is_zero() || self.idle_threshold.is_zero() {
            return Err(FeedError::Config("read timeout and idle threshold must be positive".into()));
        }
        if self.heartbeat_interval.is_some_and(|d| d.is_zero()) {
            return Err(FeedError::Config("feed.heartbeat_interval_s must be positive".into()));
        }
        Ok(())
    }

    /// `host:port` for the connect call.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Load and parse a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: AppConfig = serde_json::from_str(&content)?;
    Ok(config)
}
