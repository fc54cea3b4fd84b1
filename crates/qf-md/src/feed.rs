//! The public face of the ingestion core.
//!
//! [`QuoteFeed`] owns the supervisor task and is the only thing that can
//! start or stop it. [`FeedHandle`] is a cheap clone for readers: cache
//! lookups, subscriptions, the pull queue and stats work from any thread,
//! with or without a runtime.
//!
//! ```ignore
//! let mut feed = QuoteFeed::new(FeedConfig::from_section(&app.feed)?);
//! feed.handle().subscribe(|q| { println!("{q}"); Ok(()) });
//! feed.start().await?;
//! // ...
//! feed.stop().await;
//! ```

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use qf_core::config::FeedConfig;
use qf_core::error::FeedError;
use qf_core::{ConnectionState, IngestionStats, Quote};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::MdModule;
use crate::dispatcher::SubscriberId;
use crate::export;
use crate::pipeline::Pipeline;
use crate::supervisor;

/// Read-side access to a running (or stopped) feed.
#[derive(Clone)]
pub struct FeedHandle {
    pipeline: Arc<Pipeline>,
}

impl FeedHandle {
    pub fn get_quote(&self, code: &str) -> Option<Arc<Quote>> {
        self.pipeline.cache.get(code)
    }

    /// Shallow copy of the whole cache.
    pub fn get_all_quotes(&self) -> HashMap<String, Arc<Quote>> {
        self.pipeline.cache.snapshot()
    }

    /// Register a callback for every subsequent quote. Runs on the ingestion
    /// task, so it must return quickly and never block.
    pub fn subscribe<F>(&self, cb: F) -> SubscriberId
    where
        F: Fn(&Quote) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.pipeline.dispatcher.subscribe(Arc::new(cb))
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.pipeline.dispatcher.unsubscribe(id)
    }

    pub fn stats(&self) -> IngestionStats {
        self.pipeline.stats()
    }

    pub fn state(&self) -> ConnectionState {
        self.pipeline.state.get()
    }

    /// Blocking wait on the pull queue. Call from a plain thread or
    /// `spawn_blocking`, not from async code.
    pub fn poll(&self, timeout: Duration) -> Option<Arc<Quote>> {
        self.pipeline.dispatcher.poll(timeout)
    }

    pub fn try_poll(&self) -> Option<Arc<Quote>> {
        self.pipeline.dispatcher.try_poll()
    }

    /// Observe every `(from, to)` state transition. Must not block.
    pub fn on_state_change<F>(&self, cb: F)
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        self.pipeline.state.observe(Arc::new(cb));
    }

    /// Write stats plus the cache snapshot as pretty JSON.
    pub fn export_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        export::write_dump(path.as_ref(), &self.stats(), &self.get_all_quotes())
    }
}

/// Owner of the supervisor task.
pub struct QuoteFeed {
    handle: FeedHandle,
    shutdown_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl QuoteFeed {
    pub fn new(config: FeedConfig) -> Self {
        Self {
            handle: FeedHandle { pipeline: Arc::new(Pipeline::new(config)) },
            shutdown_tx: None,
            task: None,
        }
    }

    pub fn handle(&self) -> FeedHandle {
        self.handle.clone()
    }

    pub fn config(&self) -> &FeedConfig {
        &self.handle.pipeline.config
    }

    /// Spawn the supervisor. Idempotent while it is running; after `failed`
    /// it starts over with a fresh retry budget.
    pub async fn start(&mut self) -> Result<bool, FeedError> {
        if self.task.as_ref().is_some_and(|t| !t.is_finished()) {
            return Ok(true);
        }
        let pipeline = Arc::clone(&self.handle.pipeline);
        pipeline.config.validate()?;

        if pipeline.config.reset_stats_on_start {
            pipeline.counters.reset();
        }

        pipeline.state.set(ConnectionState::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        info!("[{}] starting feed for {}", pipeline.label(), pipeline.config.addr());
        self.task = Some(tokio::spawn(supervisor::run(pipeline, shutdown_rx)));
        self.shutdown_tx = Some(shutdown_tx);
        Ok(true)
    }

    /// Signal shutdown and wait up to `stop_timeout` for the supervisor.
    /// Idempotent; always leaves the feed `disconnected`.
    pub async fn stop(&mut self) {
        let label = self.handle.pipeline.label().to_string();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(true);
        }
        if let Some(mut task) = self.task.take() {
            let limit = self.handle.pipeline.config.stop_timeout;
            match tokio::time::timeout(limit, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("[{label}] supervisor task ended abnormally: {e}"),
                Err(_) => {
                    warn!("[{label}] supervisor did not stop within {limit:?}, aborting");
                    task.abort();
                }
            }
            info!("[{label}] feed stopped");
        }
        self.handle.pipeline.state.set(ConnectionState::Disconnected);
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub fn get_quote(&self, code: &str) -> Option<Arc<Quote>> {
        self.handle.get_quote(code)
    }

    pub fn get_all_quotes(&self) -> HashMap<String, Arc<Quote>> {
        self.handle.get_all_quotes()
    }

    pub fn subscribe<F>(&self, cb: F) -> SubscriberId
    where
        F: Fn(&Quote) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.handle.subscribe(cb)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.handle.unsubscribe(id)
    }

    pub fn stats(&self) -> IngestionStats {
        self.handle.stats()
    }

    pub fn poll(&self, timeout: Duration) -> Option<Arc<Quote>> {
        self.handle.poll(timeout)
    }

    pub fn try_poll(&self) -> Option<Arc<Quote>> {
        self.handle.try_poll()
    }
}

#[async_trait]
impl MdModule for QuoteFeed {
    fn name(&self) -> &str {
        self.handle.pipeline.label()
    }

    async fn start(&mut self) -> Result<bool, FeedError> {
        QuoteFeed::start(self).await
    }

    async fn stop(&mut self) {
        QuoteFeed::stop(self).await
    }
}
