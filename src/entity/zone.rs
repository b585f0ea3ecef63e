use super::{
    lock, unsubscribe_all, Entity, EntityContext, EntityEvent, GainControl, MuteControl,
    SourceNames, SourceSelect,
};
use crate::config::GainScale;
use crate::entity::convert::is_truthy;
use crate::error::{AzmError, Result};
use crate::protocol::{Format, ParamRequest, ParamUpdate};
use crate::types::{Index, ZoneParams};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Zone output state as a media player sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    On,
    /// A muted zone is reported as off
    Off,
}

/// Last known values of a zone
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneState {
    pub name: String,
    /// Gain in device units
    pub gain: f64,
    pub muted: bool,
    /// None until the device reports a valid source
    pub source_index: Option<Index>,
}

struct ZoneInner {
    unique_id: String,
    params: ZoneParams,
    scale: GainScale,
    state: Mutex<ZoneState>,
    events: broadcast::Sender<EntityEvent>,
}

impl ZoneInner {
    fn default_name(&self) -> String {
        format!("Zone {}", self.params.index)
    }

    fn apply(&self, param: &str, update: &ParamUpdate) {
        {
            let mut state = lock(&self.state);
            if param == self.params.name {
                state.name = update
                    .str()
                    .map(str::to_string)
                    .unwrap_or_else(|| self.default_name());
            } else if param == self.params.gain {
                state.gain = match self.scale {
                    GainScale::Db => update.val(),
                    GainScale::Pct => update.pct(),
                }
                .unwrap_or_else(|| self.scale.initial_value());
            } else if param == self.params.mute {
                state.muted = is_truthy(update.val());
            } else if param == self.params.source {
                state.source_index = update
                    .val()
                    .filter(|v| v.is_finite() && *v >= 0.0)
                    .map(|v| v as Index);
            } else {
                return;
            }
        }

        let _ = self.events.send(EntityEvent {
            unique_id: self.unique_id.clone(),
            param: param.to_string(),
        });
    }
}

/// One output zone: media player, zone gain and zone mute
///
/// Volume is the zone gain expressed as a fraction; a muted zone reports
/// [`PowerState::Off`]. The source list is shared with the device's source
/// adapters, which keep it filled with the names the device reports.
pub struct ZoneAdapter {
    ctx: EntityContext,
    inner: Arc<ZoneInner>,
    sources: SourceNames,
}

impl ZoneAdapter {
    pub fn new(ctx: EntityContext, params: ZoneParams, sources: SourceNames) -> Self {
        let state = ZoneState {
            name: format!("Zone {}", params.index),
            gain: ctx.scale.initial_value(),
            muted: false,
            source_index: None,
        };
        let inner = Arc::new(ZoneInner {
            unique_id: format!("{}_zone_{}", ctx.entry_id, params.index),
            params,
            scale: ctx.scale,
            state: Mutex::new(state),
            events: ctx.events.clone(),
        });
        Self {
            ctx,
            inner,
            sources,
        }
    }

    pub fn index(&self) -> Index {
        self.inner.params.index
    }

    pub fn params(&self) -> &ZoneParams {
        &self.inner.params
    }

    pub fn state(&self) -> ZoneState {
        lock(&self.inner.state).clone()
    }

    /// Name of the zone's mute switch
    pub fn mute_name(&self) -> String {
        format!("{} Mute", self.name())
    }

    pub fn power_state(&self) -> PowerState {
        if self.is_muted() {
            PowerState::Off
        } else {
            PowerState::On
        }
    }

    pub async fn turn_on(&self) -> Result<()> {
        self.set_muted(false).await
    }

    pub async fn turn_off(&self) -> Result<()> {
        self.set_muted(true).await
    }

    /// Feed one device update as if it came from the client
    pub fn handle_update(&self, update: &ParamUpdate) {
        self.inner.apply(update.param(), update);
    }
}

impl Entity for ZoneAdapter {
    fn unique_id(&self) -> String {
        self.inner.unique_id.clone()
    }

    fn name(&self) -> String {
        lock(&self.inner.state).name.clone()
    }

    fn subscriptions(&self) -> Vec<ParamRequest> {
        let p = &self.inner.params;
        vec![
            ParamRequest::new(&p.name, Format::Str),
            ParamRequest::new(&p.gain, self.ctx.scale.format()),
            ParamRequest::new(&p.mute, Format::Val),
            ParamRequest::new(&p.source, Format::Val),
        ]
    }

    async fn activate(&self) -> Result<()> {
        let params = self.subscriptions();
        let inner = self.inner.clone();
        self.ctx
            .client
            .subscribe_multiple(&params, move |param: &str, update: &ParamUpdate| {
                inner.apply(param, update)
            })
            .await?;

        for p in &params {
            self.ctx.client.get(&p.param, p.fmt).await?;
        }
        Ok(())
    }

    async fn deactivate(&self) {
        unsubscribe_all(&self.ctx.client, &self.subscriptions()).await;
    }
}

impl GainControl for ZoneAdapter {
    fn gain(&self) -> f64 {
        lock(&self.inner.state).gain
    }

    fn fraction(&self) -> f64 {
        self.ctx.scale.to_fraction(self.gain())
    }

    async fn set_gain(&self, value: f64) -> Result<()> {
        let scale = self.ctx.scale;
        self.ctx
            .client
            .set(
                &self.inner.params.gain,
                scale.wire_value(scale.clamp(value)),
                scale.format(),
            )
            .await
    }

    async fn set_fraction(&self, fraction: f64) -> Result<()> {
        self.set_gain(self.ctx.scale.from_fraction(fraction)).await
    }

    async fn step(&self, up: bool) -> Result<()> {
        let scale = self.ctx.scale;
        let delta = if up { scale.step() } else { -scale.step() };
        self.ctx
            .client
            .bump(&self.inner.params.gain, scale.wire_value(delta), scale.format())
            .await
    }
}

impl MuteControl for ZoneAdapter {
    fn is_muted(&self) -> bool {
        lock(&self.inner.state).muted
    }

    async fn set_muted(&self, muted: bool) -> Result<()> {
        self.ctx
            .client
            .set(&self.inner.params.mute, u8::from(muted), Format::Val)
            .await
    }
}

impl SourceSelect for ZoneAdapter {
    fn source(&self) -> Option<String> {
        let index = lock(&self.inner.state).source_index?;
        self.sources.get(index)
    }

    fn source_list(&self) -> Vec<String> {
        self.sources.list()
    }

    async fn select_source(&self, source: &str) -> Result<()> {
        let index = self
            .sources
            .position(source)
            .ok_or_else(|| AzmError::UnknownSource(source.to_string()))?;
        self.ctx
            .client
            .set(&self.inner.params.source, index as u64, Format::Val)
            .await
    }
}
