//! Mock upstream helpers shared by the session, supervisor and feed tests.

use std::time::Duration;

use qf_core::config::FeedConfig;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};

use crate::framer::{FrameLayout, encode_frame};

/// Local config with millisecond-scale timeouts.
pub(crate) fn test_config(port: u16) -> FeedConfig {
    let mut cfg = FeedConfig::new("127.0.0.1", port);
    cfg.label = "test".into();
    cfg.connect_timeout = Duration::from_secs(1);
    cfg.read_timeout = Duration::from_millis(200);
    cfg.idle_threshold = Duration::from_secs(2);
    cfg.retry_base = Duration::from_millis(20);
    cfg.retry_max = Duration::from_millis(100);
    cfg.handshake_grace = Duration::from_millis(100);
    cfg.stop_timeout = Duration::from_secs(2);
    cfg
}

/// Listener on an ephemeral loopback port.
pub(crate) async fn bind() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Plain-layout frame.
pub(crate) fn frame(payload: &[u8]) -> Vec<u8> {
    encode_frame(payload, FrameLayout::Plain)
}

/// Read exactly `n` bytes or panic after a second.
pub(crate) async fn read_exact_n(sock: &mut TcpStream, n: usize) -> Vec<u8> {
    let mut buf = vec![0u8; n];
    tokio::time::timeout(Duration::from_secs(1), sock.read_exact(&mut buf))
        .await
        .expect("handshake bytes in time")
        .unwrap();
    buf
}

/// Poll `cond` every 10ms until it holds or `limit` passes.
pub(crate) async fn wait_for(limit: Duration, cond: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}
