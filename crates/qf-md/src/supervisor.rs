//! Connection lifecycle: run sessions, back off, give up after the ceiling.
//!
//! ```text
//! disconnected ─► connecting ─► authenticating ─► connected
//!                     ▲                               │ EOF / error
//!                     │ backoff elapsed               ▼
//!                     └────────────────────────── reconnecting ─► failed
//! ```
//!
//! The consecutive-failure counter only resets when a session received at
//! least one frame, so an upstream that accepts and then drops or stays
//! silent still runs into the retry ceiling.

use std::sync::Arc;
use std::time::Duration;

use qf_core::ConnectionState;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::pipeline::Pipeline;
use crate::session::{SessionEnd, run_session, shutdown_requested};

/// Ceiling on the backoff exponent; keeps `base * 2^n` far from overflow.
const MAX_BACKOFF_EXP: u32 = 16;

/// `min(max, base × 2^attempt)`.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    base.saturating_mul(1u32 << attempt.min(MAX_BACKOFF_EXP)).min(max)
}

/// Supervisor task body. Returns on shutdown or once retries are exhausted.
pub async fn run(pipeline: Arc<Pipeline>, mut shutdown_rx: watch::Receiver<bool>) {
    let cfg = &pipeline.config;
    let label = pipeline.label();
    let mut attempt: u32 = 0;
    let mut is_reconnect = false;

    loop {
        if shutdown_requested(&shutdown_rx) {
            break;
        }

        pipeline.state.set(ConnectionState::Connecting);
        let report = run_session(&pipeline, is_reconnect, &mut shutdown_rx).await;
        if report.established {
            attempt = 0;
        }
        let fatal = match report.result {
            Ok(SessionEnd::Shutdown) => break,
            Ok(SessionEnd::Eof) => {
                warn!("[{label}] session ended by upstream");
                false
            }
            Err(e) => {
                error!("[{label}] session failed: {e}");
                !e.is_transient()
            }
        };
        if shutdown_requested(&shutdown_rx) {
            break;
        }

        // `failed` is only ever entered from `reconnecting`.
        pipeline.state.set(ConnectionState::Reconnecting);
        if fatal || attempt >= cfg.retry_ceiling {
            if fatal {
                error!("[{label}] unrecoverable session error; call start() to retry");
            } else {
                error!(
                    "[{label}] giving up after {attempt} consecutive failed reconnects; call start() to retry"
                );
            }
            pipeline.state.set(ConnectionState::Failed);
            return;
        }

        let delay = backoff_delay(cfg.retry_base, cfg.retry_max, attempt);
        attempt += 1;
        is_reconnect = true;
        warn!("[{label}] reconnecting in {delay:?} (attempt {attempt}/{})", cfg.retry_ceiling);

        tokio::select! {
            _ = tokio::time::sleep(delay) => {},
            _ = shutdown_rx.changed() => {},
        }
    }

    info!("[{label}] supervisor stopped");
    pipeline.state.set(ConnectionState::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use tokio::io::AsyncWriteExt;

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(60);
        assert_eq!(backoff_delay(base, max, 0), Duration::from_secs(2));
        assert_eq!(backoff_delay(base, max, 1), Duration::from_secs(4));
        assert_eq!(backoff_delay(base, max, 4), Duration::from_secs(32));
        assert_eq!(backoff_delay(base, max, 5), Duration::from_secs(60));
        assert_eq!(backoff_delay(base, max, u32::MAX), Duration::from_secs(60));
        assert_eq!(
            backoff_delay(base, Duration::from_secs(300), 7),
            Duration::from_secs(256)
        );
    }

    #[tokio::test]
    async fn unreachable_upstream_ends_in_failed() {
        let (listener, port) = bind().await;
        drop(listener);
        let mut cfg = test_config(port);
        cfg.retry_ceiling = 2;
        let pipeline = Arc::new(Pipeline::new(cfg));
        let (_tx, rx) = watch::channel(false);

        tokio::time::timeout(Duration::from_secs(5), run(Arc::clone(&pipeline), rx))
            .await
            .expect("supervisor gives up");

        let s = pipeline.stats();
        assert_eq!(s.connection_state, ConnectionState::Failed);
        assert_eq!(s.connect_attempts, 3);
        assert_eq!(s.reconnects, 0);
    }

    #[tokio::test]
    async fn failed_is_entered_from_reconnecting() {
        let (listener, port) = bind().await;
        drop(listener);
        let mut cfg = test_config(port);
        cfg.retry_ceiling = 0;
        let pipeline = Arc::new(Pipeline::new(cfg));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pipeline.state.observe(Arc::new(move |from, to| sink.lock().unwrap().push((from, to))));
        let (_tx, rx) = watch::channel(false);

        run(Arc::clone(&pipeline), rx).await;

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (ConnectionState::Disconnected, ConnectionState::Connecting),
                (ConnectionState::Connecting, ConnectionState::Reconnecting),
                (ConnectionState::Reconnecting, ConnectionState::Failed),
            ]
        );
    }

    #[tokio::test]
    async fn silent_upstream_exhausts_retry_budget() {
        let (listener, port) = bind().await;
        let mut cfg = test_config(port);
        cfg.read_timeout = Duration::from_millis(50);
        cfg.idle_threshold = Duration::from_millis(100);
        cfg.handshake_grace = Duration::from_millis(20);
        cfg.retry_ceiling = 2;
        let pipeline = Arc::new(Pipeline::new(cfg));
        let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pipeline.state.observe(Arc::new(move |_, to| sink.lock().unwrap().push(to)));
        let (_tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            let mut held = Vec::new();
            loop {
                let (sock, _) = listener.accept().await.unwrap();
                held.push(sock);
            }
        });

        tokio::time::timeout(Duration::from_secs(3), run(Arc::clone(&pipeline), rx))
            .await
            .expect("supervisor gives up on a silent upstream");

        let s = pipeline.stats();
        assert_eq!(s.connection_state, ConnectionState::Failed);
        assert_eq!(s.connect_attempts, 3);
        assert_eq!(s.reconnects, 0);
        assert_eq!(s.frames_received, 0);

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen[seen.len() - 2..], [ConnectionState::Reconnecting, ConnectionState::Failed]);
    }

    #[tokio::test]
    async fn oversize_frame_triggers_reconnect() {
        let (listener, port) = bind().await;
        let mut cfg = test_config(port);
        cfg.max_frame_bytes = 1024;
        let pipeline = Arc::new(Pipeline::new(cfg));
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            first.write_all(&(10 * 1024u32).to_le_bytes()).await.unwrap();
            let (mut second, _) = listener.accept().await.unwrap();
            second
                .write_all(&frame(b"SH600000$PuFa$0$9.9$10.1$9.8$10.0$500$5000"))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(first);
        });

        let sup = tokio::spawn(run(Arc::clone(&pipeline), rx));
        let p = Arc::clone(&pipeline);
        assert!(wait_for(Duration::from_secs(3), || p.cache.get("SH600000").is_some()).await);

        let s = pipeline.stats();
        assert_eq!(s.reconnects, 1);
        assert_eq!(s.connect_attempts, 2);
        assert_eq!(s.connection_state, ConnectionState::Connected);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), sup).await.unwrap().unwrap();
        assert_eq!(pipeline.state.get(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn idle_upstream_is_replaced() {
        let (listener, port) = bind().await;
        let mut cfg = test_config(port);
        cfg.read_timeout = Duration::from_millis(50);
        cfg.idle_threshold = Duration::from_millis(150);
        let pipeline = Arc::new(Pipeline::new(cfg));
        let (tx, rx) = watch::channel(false);

        tokio::spawn(async move {
            let (mut first, _) = listener.accept().await.unwrap();
            first.write_all(&frame(b"")).await.unwrap();
            let (mut second, _) = listener.accept().await.unwrap();
            second.write_all(&frame(b"SZ000002$Vanke$0$8$8$8$8$1$8")).await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(first);
        });

        let sup = tokio::spawn(run(Arc::clone(&pipeline), rx));
        let p = Arc::clone(&pipeline);
        assert!(wait_for(Duration::from_secs(3), || p.cache.get("SZ000002").is_some()).await);
        assert_eq!(pipeline.stats().reconnects, 1);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(2), sup).await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn shutdown_interrupts_backoff() {
        let (listener, port) = bind().await;
        drop(listener);
        let mut cfg = test_config(port);
        cfg.retry_base = Duration::from_secs(30);
        cfg.retry_max = Duration::from_secs(30);
        let pipeline = Arc::new(Pipeline::new(cfg));
        let (tx, rx) = watch::channel(false);

        let sup = tokio::spawn(run(Arc::clone(&pipeline), rx));
        let p = Arc::clone(&pipeline);
        assert!(
            wait_for(Duration::from_secs(2), || p.state.get() == ConnectionState::Reconnecting)
                .await
        );

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), sup).await.unwrap().unwrap();
        assert_eq!(pipeline.state.get(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn dropped_sender_stops_supervisor() {
        let (listener, port) = bind().await;
        drop(listener);
        let pipeline = Arc::new(Pipeline::new(test_config(port)));
        let (tx, rx) = watch::channel(false);
        drop(tx);

        tokio::time::timeout(Duration::from_secs(1), run(Arc::clone(&pipeline), rx))
            .await
            .unwrap();
        assert_eq!(pipeline.stats().connect_attempts, 0);
    }
}
