//! Connection lifecycle state.

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// ConnectionState
// ============================================================================

/// Lifecycle state of a transport connection.
///
/// ```text
/// Closed ──connect──► Connecting ──open──► Open ──close/error──► Closed
///                         │                 │
///                         └──error──► Closed└──remote close──► Closing ──► Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No socket, no attempt in flight.
    #[default]
    Closed,
    /// An attempt is in flight.
    Connecting,
    /// Socket is open; frames flow both ways.
    Open,
    /// Remote close handshake in progress.
    Closing,
}

impl ConnectionState {
    /// Returns the lowercase name used on status indicators.
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closing => "closing",
        }
    }

    /// Returns `true` if frames can be sent.
    #[inline]
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Tests
// ============================================================================
