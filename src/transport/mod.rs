//! WebSocket transport layer.
//!
//! This module owns the socket: it opens it, keeps it alive with a
//! heartbeat, and reopens it with exponential backoff after unexpected
//! closes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐                          ┌─────────────────┐
//! │  Connection (Rust)   │                          │  Feed server    │
//! │                      │        WebSocket         │                 │
//! │  state machine       │◄────────────────────────►│                 │
//! │  → socket task       │     ws://host/ws         │                 │
//! │  → reconnect timer   │                          │                 │
//! └──────────────────────┘                          └─────────────────┘
//! ```
//!
//! # Connection Lifecycle
//!
//! 1. `Connection::connect` - Dial through the [`Connector`]
//! 2. Socket task starts, heartbeat armed
//! 3. Inbound text frames go to the frame handler
//! 4. Unexpected close - reconnect with backoff until the budget is spent
//! 5. `Connection::disconnect` - Normal closure, no reconnect
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `connection` | State machine, socket task, reconnect scheduling |
//! | `connector` | Socket factory trait and tokio-tungstenite implementation |
//! | `heartbeat` | Periodic ping source |
//! | `reconnect` | Backoff policy and retry counter |
//! | `state` | [`ConnectionState`] |

// ============================================================================
// Submodules
// ============================================================================

/// State machine, socket task and reconnect scheduling.
pub mod connection;

/// Socket factory seam.
pub mod connector;

/// Periodic liveness pings.
pub mod heartbeat;

/// Backoff policy.
pub mod reconnect;

/// Connection lifecycle state.
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

// ============================================================================
// Re-exports
// ============================================================================

pub use connection::{Connection, DELIBERATE_CLOSE_REASON, FrameHandler};
pub use connector::{Connector, Socket, TungsteniteConnector, WsSink, WsStream};
pub use heartbeat::Heartbeat;
pub use reconnect::ReconnectState;
pub use state::ConnectionState;
