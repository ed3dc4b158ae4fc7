//! Wire protocol message types.
//!
//! Every message on the socket is one JSON text [`Frame`]:
//!
//! ```json
//! { "type": "price_update", "payload": { ... }, "timestamp": "2025-01-01T00:00:00Z" }
//! ```
//!
//! # Message Types
//!
//! | Type | Direction | Payload |
//! |------|-----------|---------|
//! | `subscribe_prices` | Client → Server | [`SubscribePrices`] |
//! | `ping` | Client → Server | [`Ping`] |
//! | `price_update` | Server → Client | [`PriceUpdate`] |
//! | `trade_update` | Server → Client | opaque |
//! | `portfolio_update` | Server → Client | opaque |
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame` | The [`Frame`] envelope |
//! | `message` | Typed payloads and message type names |

// ============================================================================
// Submodules
// ============================================================================

/// The frame envelope.
pub mod frame;

/// Typed payloads and message type names.
pub mod message;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::Frame;
pub use message::{Ping, PriceUpdate, SubscribePrices, message_type};
