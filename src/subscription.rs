use crate::error::Channel;
use crate::protocol::{InboundMethod, Notification, ParamUpdate};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Callback invoked with the parameter name and the full update object
pub type Callback = Arc<dyn Fn(&str, &ParamUpdate) + Send + Sync>;

/// Routing table from parameter name to its single callback
#[derive(Default)]
pub struct SubscriptionTable {
    entries: Mutex<HashMap<String, Callback>>,
}

impl SubscriptionTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback, returning the one it replaced
    pub fn insert(&self, param: impl Into<String>, callback: Callback) -> Option<Callback> {
        self.lock().insert(param.into(), callback)
    }

    /// Undo an `insert` of `current`, unless another callback has replaced it since
    pub fn restore(&self, param: &str, current: &Callback, previous: Option<Callback>) {
        let mut entries = self.lock();
        if !entries.get(param).is_some_and(|cb| Arc::ptr_eq(cb, current)) {
            return;
        }
        match previous {
            Some(previous) => {
                entries.insert(param.to_string(), previous);
            }
            None => {
                entries.remove(param);
            }
        }
    }

    /// Drop the callback for a parameter; returns whether there was one
    pub fn remove(&self, param: &str) -> bool {
        self.lock().remove(param).is_some()
    }

    /// Whether a callback is registered for this parameter
    pub fn contains(&self, param: &str) -> bool {
        self.lock().contains_key(param)
    }

    /// Number of subscribed parameters
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget every subscription
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lookup(&self, param: &str) -> Option<Callback> {
        self.lock().get(param).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Callback>> {
        // A panicking callback never runs under this lock, so the map is intact.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Decode one line or datagram and deliver it; returns the number of callbacks invoked
    pub fn dispatch(&self, bytes: &[u8], channel: Channel) -> usize {
        match Notification::parse(bytes) {
            Ok(message) => self.route(&message, channel),
            Err(e) => {
                tracing::error!("Failed to decode {} message: {}", channel, e);
                0
            }
        }
    }

    /// Deliver a decoded message to the subscribed callbacks
    pub fn route(&self, message: &Notification, channel: Channel) -> usize {
        if message.carries_values() {
            let mut delivered = 0;
            for update in message.updates() {
                let callback = self.lookup(update.param());
                tracing::debug!(
                    "Received {} update for param: {}, subscribed: {}",
                    channel,
                    update.param(),
                    callback.is_some()
                );
                if let Some(callback) = callback {
                    callback(update.param(), &update);
                    delivered += 1;
                }
            }
            delivered
        } else if message.method == Some(InboundMethod::Error) {
            tracing::error!("Error from AZM: {}", message.params);
            0
        } else {
            tracing::debug!("Ignoring {} message with method {:?}", channel, message.method);
            0
        }
    }
}
