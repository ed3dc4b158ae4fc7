//! Inbound frame routing.
//!
//! The router turns raw text into [`Frame`]s and fans each one out to the
//! callbacks registered for its type.
//!
//! # Dispatch Rules
//!
//! - Malformed text is logged and dropped; nothing else happens.
//! - Callbacks run in registration order over a snapshot of the list, so
//!   a callback may subscribe or unsubscribe (itself included) safely.
//! - An entry unsubscribed mid-dispatch is skipped. The check happens
//!   just before each call, so an unsubscribe racing in from another
//!   thread may still let one call that already passed the check run.
//! - A panicking callback is caught and logged; its siblings still run.

// ============================================================================
// Imports
// ============================================================================

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::{error, trace, warn};

use crate::protocol::Frame;
use crate::subscription::SubscriptionRegistry;
use crate::transport::FrameHandler;

// ============================================================================
// MessageRouter
// ============================================================================

/// Parses inbound frames and fans them out to subscribers.
///
/// Cloning yields another router over the same registry.
#[derive(Debug, Clone, Default)]
pub struct MessageRouter {
    /// Where subscribers are looked up.
    registry: SubscriptionRegistry,
}

impl MessageRouter {
    /// Creates a router over `registry`.
    #[inline]
    #[must_use]
    pub fn new(registry: SubscriptionRegistry) -> Self {
        Self { registry }
    }

    /// Returns the registry this router reads.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// Parses one text message and dispatches it.
    ///
    /// Returns the number of callbacks that completed. Malformed input is
    /// logged and yields 0.
    pub fn route_text(&self, text: &str) -> usize {
        match Frame::parse(text) {
            Ok(frame) => self.dispatch(&frame),
            Err(e) => {
                warn!(error = %e, len = text.len(), "Failed to parse WebSocket message");
                0
            }
        }
    }

    /// Delivers `frame.payload` to every live subscriber of `frame.frame_type`.
    ///
    /// Returns the number of callbacks that completed without panicking.
    pub fn dispatch(&self, frame: &Frame) -> usize {
        let subscribers = self.registry.snapshot(&frame.frame_type);

        if subscribers.is_empty() {
            trace!(frame_type = %frame.frame_type, "No subscribers for frame");
            return 0;
        }

        let mut delivered = 0;

        for subscriber in subscribers {
            if !subscriber.is_active() {
                continue;
            }

            let handler = &subscriber.handler;
            match catch_unwind(AssertUnwindSafe(|| handler(&frame.payload))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    error!(
                        frame_type = %frame.frame_type,
                        subscription = %subscriber.id,
                        panic = panic_message(panic.as_ref()),
                        "Error in WebSocket message handler"
                    );
                }
            }
        }

        delivered
    }

    /// Wraps this router as a transport frame handler.
    #[must_use]
    pub fn frame_handler(&self) -> FrameHandler {
        let router = self.clone();
        Arc::new(move |text: &str| {
            router.route_text(text);
        })
    }
}

/// Best-effort text of a panic payload.
fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

// ============================================================================
// Tests
// ============================================================================
