//! One connection attempt, from TCP connect to termination.
//!
//! A session:
//! 1. Connects (keepalive, `TCP_NODELAY`, enlarged socket buffers, bounded
//!    connect time).
//! 2. Sends the credential as bare UTF-8 bytes, then the optional
//!    subscription preamble (best effort).
//! 3. Runs the receive loop: framer → [`Pipeline::process_frame`], with
//!    optional heartbeats and an idle watchdog.
//!
//! Every exit is reported to the supervisor as a [`SessionReport`]. Frame
//! level problems never end a session; see [`crate::pipeline`].

use std::io;

use qf_core::ConnectionState;
use qf_core::config::FeedConfig;
use qf_core::error::{FeedError, ProtocolError};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpSocket, TcpStream};
use tokio::sync::watch;
use tokio::time::error::Elapsed;
use tokio::time::{Instant, Interval};
use tracing::{debug, info, trace, warn};

use crate::framer::{FrameLayout, Framer, RawFrame, encode_frame};
use crate::pipeline::Pipeline;
use crate::stats::FeedCounters;

/// Payload of the client heartbeat control frame.
pub const HEARTBEAT_PAYLOAD: &[u8] = br#"{"type":"heartbeat"}"#;

/// How a session ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Shutdown was requested.
    Shutdown,
    /// The upstream closed the stream.
    Eof,
}

#[derive(Debug)]
pub struct SessionReport {
    /// The upstream accepted the handshake, i.e. at least one frame arrived.
    pub established: bool,
    pub result: Result<SessionEnd, FeedError>,
}

/// `true` once stop was requested or the feed owning the sender is gone.
pub fn shutdown_requested(rx: &watch::Receiver<bool>) -> bool {
    *rx.borrow() || rx.has_changed().is_err()
}

/// Run one session to completion.
pub async fn run_session(
    pipeline: &Pipeline,
    is_reconnect: bool,
    shutdown_rx: &mut watch::Receiver<bool>,
) -> SessionReport {
    let mut session = Session { pipeline, got_frame: false };
    let result = session.run(is_reconnect, shutdown_rx).await;
    SessionReport { established: session.got_frame, result }
}

enum Event {
    Shutdown,
    HeartbeatDue,
    Read(Result<Result<Option<RawFrame>, FeedError>, Elapsed>),
}

struct Session<'a> {
    pipeline: &'a Pipeline,
    got_frame: bool,
}

impl Session<'_> {
    /// Error for a session that ended without any frame: the upstream never
    /// answered the credential, so treat it as a rejection.
    fn silent_end(&self, err: ProtocolError) -> FeedError {
        if self.got_frame { err.into() } else { ProtocolError::HandshakeRejected.into() }
    }

    async fn run(
        &mut self,
        is_reconnect: bool,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> Result<SessionEnd, FeedError> {
        let pipeline = self.pipeline;
        let cfg = &pipeline.config;
        let label = cfg.label.as_str();

        if shutdown_requested(shutdown_rx) {
            return Ok(SessionEnd::Shutdown);
        }

        FeedCounters::incr(&pipeline.counters.connect_attempts);
        info!("[{label}] connecting to {}", cfg.addr());
        let stream = tokio::select! {
            r = connect(cfg) => r?,
            _ = shutdown_rx.changed() => return Ok(SessionEnd::Shutdown),
        };

        // Handshake: bare credential, then the optional preamble.
        pipeline.state.set(ConnectionState::Authenticating);
        let (read_half, mut write_half) = stream.into_split();
        write_half.write_all(cfg.credential.as_bytes()).await?;
        if let Some(ref preamble) = cfg.subscribe_preamble {
            match write_half.write_all(preamble).await {
                Ok(()) => debug!("[{label}] subscription preamble sent ({} bytes)", preamble.len()),
                Err(e) => warn!("[{label}] subscription preamble failed: {e}"),
            }
        }

        // Stays `Authenticating` until the first frame or the grace period.
        let handshake_deadline = Instant::now() + cfg.handshake_grace;
        let mut confirmed = false;

        let layout = FrameLayout::from_flag(cfg.enable_checksum);
        let mut framer = Framer::new(read_half, layout, cfg.max_frame_bytes);
        let heartbeat_frame = encode_frame(HEARTBEAT_PAYLOAD, layout);
        let mut heartbeat = cfg
            .heartbeat_interval
            .map(|d| tokio::time::interval_at(Instant::now() + d, d));
        let mut last_frame = Instant::now();

        loop {
            let idle_left = cfg.idle_threshold.saturating_sub(last_frame.elapsed());
            if idle_left.is_zero() {
                return Err(self.silent_end(ProtocolError::Idle(cfg.idle_threshold)));
            }
            let mut wait = cfg.read_timeout.min(idle_left);
            if !confirmed {
                wait = wait.min(handshake_deadline.saturating_duration_since(Instant::now()));
            }

            let event = tokio::select! {
                _ = shutdown_rx.changed() => Event::Shutdown,
                _ = next_tick(&mut heartbeat) => Event::HeartbeatDue,
                r = tokio::time::timeout(wait, framer.next_frame()) => Event::Read(r),
            };

            match event {
                Event::Shutdown => {
                    info!("[{label}] shutdown signal received");
                    return Ok(SessionEnd::Shutdown);
                }
                Event::HeartbeatDue => {
                    write_half.write_all(&heartbeat_frame).await?;
                    trace!("[{label}] heartbeat sent");
                }
                Event::Read(Err(_)) => {
                    if !confirmed && Instant::now() >= handshake_deadline {
                        confirmed = true;
                        pipeline.state.set(ConnectionState::Connected);
                        info!("[{label}] connected, waiting for first frame");
                        continue;
                    }
                    let idle = last_frame.elapsed();
                    if idle >= cfg.idle_threshold {
                        return Err(self.silent_end(ProtocolError::Idle(cfg.idle_threshold)));
                    }
                    if framer.has_partial() {
                        return Err(ProtocolError::MidFrameTimeout.into());
                    }
                    debug!("[{label}] no data for {wait:?} (idle {idle:?})");
                }
                Event::Read(Ok(Err(e))) => return Err(e),
                Event::Read(Ok(Ok(None))) => {
                    if !self.got_frame {
                        return Err(ProtocolError::HandshakeRejected.into());
                    }
                    info!("[{label}] upstream closed the stream");
                    return Ok(SessionEnd::Eof);
                }
                Event::Read(Ok(Ok(Some(frame)))) => {
                    if !self.got_frame {
                        self.got_frame = true;
                        if !confirmed {
                            confirmed = true;
                            pipeline.state.set(ConnectionState::Connected);
                        }
                        if is_reconnect {
                            FeedCounters::incr(&pipeline.counters.reconnects);
                        }
                        info!("[{label}] session established");
                    }
                    last_frame = Instant::now();
                    if shutdown_requested(shutdown_rx) {
                        return Ok(SessionEnd::Shutdown);
                    }
                    pipeline.process_frame(frame);
                }
            }
        }
    }
}

/// Resolve, configure and connect the socket within `connect_timeout`.
async fn connect(cfg: &FeedConfig) -> Result<TcpStream, FeedError> {
    let addr = cfg.addr();
    match tokio::time::timeout(cfg.connect_timeout, open_socket(&addr, cfg.socket_buffer_bytes)).await {
        Ok(r) => r,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect to {addr} timed out after {:?}", cfg.connect_timeout),
        )
        .into()),
    }
}

async fn open_socket(addr: &str, buffer_bytes: u32) -> Result<TcpStream, FeedError> {
    let sock_addr = tokio::net::lookup_host(addr)
        .await?
        .next()
        .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no address for {addr}")))?;

    let socket = if sock_addr.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
    socket.set_keepalive(true)?;
    socket.set_recv_buffer_size(buffer_bytes)?;
    socket.set_send_buffer_size(buffer_bytes)?;

    let stream = socket.connect(sock_addr).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

async fn next_tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
