//! Entity adapters mapping device parameters onto controllable widgets.
//!
//! Each adapter owns the parameters of one zone or one source, so a
//! parameter is only ever subscribed once per device. Capabilities are
//! expressed as small traits rather than a class hierarchy.

pub mod convert;
mod names;
mod source;
mod zone;

pub use names::SourceNames;
pub use source::{SourceAdapter, SourceState};
pub use zone::{PowerState, ZoneAdapter, ZoneState};

use crate::client::AzmClient;
use crate::config::GainScale;
use crate::error::Result;
use crate::protocol::ParamRequest;
use crate::types::EntryId;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;

/// Notification that an adapter applied a device update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityEvent {
    pub unique_id: String,
    pub param: String,
}

/// What every adapter shares for one device
#[derive(Clone)]
pub struct EntityContext {
    pub entry_id: EntryId,
    pub client: Arc<AzmClient>,
    pub scale: GainScale,
    pub events: broadcast::Sender<EntityEvent>,
}

impl EntityContext {
    pub fn new(entry_id: EntryId, client: Arc<AzmClient>) -> Self {
        let (events, _) = broadcast::channel(100);
        let scale = client.config().gain_scale;
        Self {
            entry_id,
            client,
            scale,
            events,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<EntityEvent> {
        self.events.subscribe()
    }
}

/// Lifecycle shared by all adapters
#[allow(async_fn_in_trait)]
pub trait Entity {
    fn unique_id(&self) -> String;

    /// Display name as last reported by the device
    fn name(&self) -> String;

    /// Parameters this adapter subscribes to
    fn subscriptions(&self) -> Vec<ParamRequest>;

    /// Subscribe and prime initial state
    async fn activate(&self) -> Result<()>;

    /// Best-effort unsubscribe of every parameter; never fails
    async fn deactivate(&self);
}

/// Gain slider
#[allow(async_fn_in_trait)]
pub trait GainControl {
    /// Current gain in device units (dB or percent)
    fn gain(&self) -> f64;

    /// Current gain as 0..1
    fn fraction(&self) -> f64;

    async fn set_gain(&self, value: f64) -> Result<()>;

    async fn set_fraction(&self, fraction: f64) -> Result<()>;

    /// Relative step up or down
    async fn step(&self, up: bool) -> Result<()>;
}

/// Mute switch
#[allow(async_fn_in_trait)]
pub trait MuteControl {
    fn is_muted(&self) -> bool;

    async fn set_muted(&self, muted: bool) -> Result<()>;
}

/// Input source selector
#[allow(async_fn_in_trait)]
pub trait SourceSelect {
    fn source(&self) -> Option<String>;

    fn source_list(&self) -> Vec<String>;

    async fn select_source(&self, source: &str) -> Result<()>;
}

/// Read-only level meter
pub trait LevelSensor {
    /// Last level in dBFS
    fn level(&self) -> f64;
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

pub(crate) async fn unsubscribe_all(client: &AzmClient, params: &[ParamRequest]) {
    for p in params {
        client.unsubscribe(&p.param, p.fmt).await;
    }
}
