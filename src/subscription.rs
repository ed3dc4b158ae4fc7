//! Subscription registry.
//!
//! Maps message types to ordered lists of callbacks. Membership follows
//! set semantics keyed on callback identity: registering the same
//! `Arc` handler twice for one type returns the existing registration.
//!
//! # Example
//!
//! ```
//! use market_feed::SubscriptionRegistry;
//!
//! let registry = SubscriptionRegistry::new();
//! let subscription = registry.subscribe("trade_update", |payload| {
//!     println!("trade: {payload}");
//! });
//!
//! assert_eq!(registry.subscriber_count("trade_update"), 1);
//! subscription.unsubscribe();
//! subscription.unsubscribe(); // no-op
//! assert!(registry.is_empty());
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::identifiers::SubscriptionId;

// ============================================================================
// Types
// ============================================================================

/// Subscriber callback. Receives the frame payload.
pub type Handler = dyn Fn(&Value) + Send + Sync;

/// Subscriber lists by message type, in registration order.
type TopicMap = FxHashMap<String, Vec<Arc<Subscriber>>>;

// ============================================================================
// Subscriber
// ============================================================================

/// One registered callback.
pub(crate) struct Subscriber {
    /// Registration ID.
    pub(crate) id: SubscriptionId,
    /// The callback.
    pub(crate) handler: Arc<Handler>,
    /// Cleared on unsubscribe, before the entry leaves the map.
    active: AtomicBool,
}

impl Subscriber {
    /// Returns `false` once unsubscribed.
    #[inline]
    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }
}

/// Identity comparison that ignores vtable pointers.
#[inline]
fn same_handler(a: &Arc<Handler>, b: &Arc<Handler>) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

// ============================================================================
// SubscriptionRegistry
// ============================================================================

/// Shared state behind a registry handle.
#[derive(Default)]
pub(crate) struct RegistryInner {
    /// Subscribers by message type.
    topics: Mutex<TopicMap>,
}

/// Tracks which callbacks want which message types.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct SubscriptionRegistry {
    /// Shared inner state.
    inner: Arc<RegistryInner>,
}

impl fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("subscriptions", &self.len())
            .finish()
    }
}

impl SubscriptionRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback for `message_type`.
    pub fn subscribe<F>(&self, message_type: impl Into<String>, callback: F) -> Subscription
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe_handler(message_type, Arc::new(callback))
    }

    /// Registers a shared handler for `message_type`.
    ///
    /// If this exact handler is already registered for the type, no new
    /// entry is created and the returned handle refers to the existing one.
    pub fn subscribe_handler(
        &self,
        message_type: impl Into<String>,
        handler: Arc<Handler>,
    ) -> Subscription {
        let message_type = message_type.into();
        let mut topics = self.inner.topics.lock();
        let bucket = topics.entry(message_type.clone()).or_default();

        if let Some(existing) = bucket.iter().find(|s| same_handler(&s.handler, &handler)) {
            debug!(%message_type, id = %existing.id, "Handler already subscribed");
            return Subscription::new(&self.inner, message_type, existing.id);
        }

        let id = SubscriptionId::next();
        bucket.push(Arc::new(Subscriber {
            id,
            handler,
            active: AtomicBool::new(true),
        }));

        debug!(%message_type, %id, "Subscribed");
        Subscription::new(&self.inner, message_type, id)
    }

    /// Registers a callback that receives payloads decoded as `T`.
    ///
    /// Payloads that do not decode are logged and skipped for this
    /// callback only.
    pub fn subscribe_typed<T, F>(&self, message_type: impl Into<String>, callback: F) -> Subscription
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let message_type = message_type.into();
        let label = message_type.clone();

        self.subscribe(message_type, move |payload: &Value| {
            match T::deserialize(payload) {
                Ok(decoded) => callback(decoded),
                Err(e) => warn!(message_type = %label, error = %e, "Dropping undecodable payload"),
            }
        })
    }

    /// Removes one registration. Returns `true` if it was present.
    pub fn unsubscribe(&self, message_type: &str, id: SubscriptionId) -> bool {
        self.inner.remove(message_type, id)
    }

    /// Number of callbacks registered for `message_type`.
    #[must_use]
    pub fn subscriber_count(&self, message_type: &str) -> usize {
        self.inner
            .topics
            .lock()
            .get(message_type)
            .map_or(0, Vec::len)
    }

    /// Total number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.topics.lock().values().map(Vec::len).sum()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.topics.lock().is_empty()
    }

    /// Message types with at least one subscriber, sorted.
    #[must_use]
    pub fn message_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.inner.topics.lock().keys().cloned().collect();
        types.sort();
        types
    }

    /// Removes every registration.
    pub fn clear(&self) {
        let drained: Vec<_> = self.inner.topics.lock().drain().collect();
        for (_, bucket) in drained {
            for subscriber in bucket {
                subscriber.active.store(false, Ordering::Release);
            }
        }
    }

    /// Copies the current subscriber list for one type.
    pub(crate) fn snapshot(&self, message_type: &str) -> Vec<Arc<Subscriber>> {
        self.inner
            .topics
            .lock()
            .get(message_type)
            .cloned()
            .unwrap_or_default()
    }
}

impl RegistryInner {
    /// Deactivates and removes one entry; drops the bucket when empty.
    fn remove(&self, message_type: &str, id: SubscriptionId) -> bool {
        let mut topics = self.topics.lock();
        let Some(bucket) = topics.get_mut(message_type) else {
            return false;
        };
        let Some(index) = bucket.iter().position(|s| s.id == id) else {
            return false;
        };

        let subscriber = bucket.remove(index);
        subscriber.active.store(false, Ordering::Release);

        if bucket.is_empty() {
            topics.remove(message_type);
        }

        debug!(%message_type, %id, "Unsubscribed");
        true
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// Handle to one registration.
///
/// Dropping the handle does not unsubscribe. Call [`unsubscribe`](Self::unsubscribe).
#[must_use = "dropping a Subscription keeps the callback registered"]
pub struct Subscription {
    /// Registry the entry lives in.
    registry: Weak<RegistryInner>,
    /// Message type of the entry.
    message_type: String,
    /// Entry ID.
    id: SubscriptionId,
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("message_type", &self.message_type)
            .field("id", &self.id)
            .finish()
    }
}

impl Subscription {
    fn new(registry: &Arc<RegistryInner>, message_type: String, id: SubscriptionId) -> Self {
        Self {
            registry: Arc::downgrade(registry),
            message_type,
            id,
        }
    }

    /// Registration ID.
    #[inline]
    #[must_use]
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Message type this handle listens to.
    #[inline]
    #[must_use]
    pub fn message_type(&self) -> &str {
        &self.message_type
    }

    /// Removes the callback. Safe to call repeatedly.
    ///
    /// Returns `true` only on the call that actually removed it. Once this
    /// returns, no dispatch on the calling task starts the callback again,
    /// and dispatches that begin afterward on any thread skip it. A
    /// dispatch already running on another thread may finish one call it
    /// had cleared just before the removal.
    pub fn unsubscribe(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(&self.message_type, self.id))
    }

    /// Returns `true` while the registration exists.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.registry.upgrade().is_some_and(|registry| {
            registry
                .topics
                .lock()
                .get(&self.message_type)
                .is_some_and(|bucket| bucket.iter().any(|s| s.id == self.id))
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
