//! Enumerations used throughout the quote feed.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market segments
// ---------------------------------------------------------------------------

/// Market segment a quote belongs to.
///
/// Each segment arrives in its own on-wire dialect, so the tag also tells
/// downstream code which dialect produced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Market {
    /// Shanghai / Shenzhen main boards, `$`-delimited dialect.
    MainA,
    /// Beijing stock exchange, JSON dialect.
    NorthExchange,
}

impl std::fmt::Display for Market {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MainA => write!(f, "MAIN_A"),
            Self::NorthExchange => write!(f, "NORTH_EXCHANGE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Connection state
// ---------------------------------------------------------------------------

/// Lifecycle state of the upstream connection.
///
/// The discriminants are stable so the state can live in an `AtomicU8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ConnectionState {
    #[default]
    Disconnected = 0,
    Connecting = 1,
    Authenticating = 2,
    Connected = 3,
    Reconnecting = 4,
    Failed = 5,
}

impl ConnectionState {
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Inverse of [`as_u8`](Self::as_u8). Unknown values map to `Disconnected`.
    #[inline]
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Connecting,
            2 => Self::Authenticating,
            3 => Self::Connected,
            4 => Self::Reconnecting,
            5 => Self::Failed,
            _ => Self::Disconnected,
        }
    }

    /// `true` while a session is live or the supervisor is still retrying.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Authenticating | Self::Connected | Self::Reconnecting
        )
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}
