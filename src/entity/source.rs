use super::{
    lock, unsubscribe_all, Entity, EntityContext, EntityEvent, GainControl, LevelSensor,
    MuteControl, SourceNames,
};
use crate::config::GainScale;
use crate::entity::convert::{is_truthy, MIN_DB};
use crate::error::Result;
use crate::protocol::{Format, ParamRequest, ParamUpdate};
use crate::types::{GainDb, Index, SourceParams};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Last known values of an input source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceState {
    pub name: String,
    pub gain: f64,
    pub muted: bool,
    /// Meter level in dBFS
    pub level: GainDb,
}

struct SourceInner {
    unique_id: String,
    params: SourceParams,
    scale: GainScale,
    state: Mutex<SourceState>,
    names: SourceNames,
    events: broadcast::Sender<EntityEvent>,
}

impl SourceInner {
    fn apply(&self, param: &str, update: &ParamUpdate) {
        {
            let mut state = lock(&self.state);
            if param == self.params.name {
                let name = update
                    .str()
                    .map(str::to_string)
                    .unwrap_or_else(|| SourceNames::placeholder(self.params.index));
                self.names.set(self.params.index, name.clone());
                state.name = name;
            } else if param == self.params.gain {
                state.gain = match self.scale {
                    GainScale::Db => update.val(),
                    GainScale::Pct => update.pct(),
                }
                .unwrap_or_else(|| self.scale.initial_value());
            } else if param == self.params.mute {
                state.muted = is_truthy(update.val());
            } else if param == self.params.meter {
                // usually delivered over UDP
                state.level = update.val().unwrap_or(MIN_DB);
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

/// One input source: source gain, source mute and level meter.
pub struct SourceAdapter {
    ctx: EntityContext,
    inner: Arc<SourceInner>,
}

impl SourceAdapter {
    pub fn new(ctx: EntityContext, params: SourceParams, names: SourceNames) -> Self {
        let state = SourceState {
            name: SourceNames::placeholder(params.index),
            gain: ctx.scale.initial_value(),
            muted: false,
            level: MIN_DB,
        };
        let inner = Arc::new(SourceInner {
            unique_id: format!("{}_source_{}", ctx.entry_id, params.index),
            params,
            scale: ctx.scale,
            state: Mutex::new(state),
            names,
            events: ctx.events.clone(),
        });
        Self { ctx, inner }
    }

    pub fn index(&self) -> Index {
        self.inner.params.index
    }

    pub fn params(&self) -> &SourceParams {
        &self.inner.params
    }

    pub fn state(&self) -> SourceState {
        lock(&self.inner.state).clone()
    }

    pub fn mute_name(&self) -> String {
        format!("{} Mute", self.name())
    }

    pub fn level_name(&self) -> String {
        format!("{} Level", self.name())
    }

    pub fn handle_update(&self, update: &ParamUpdate) {
        self.inner.apply(update.param(), update);
    }
}

impl Entity for SourceAdapter {
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
            ParamRequest::new(&p.meter, Format::Val),
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

impl GainControl for SourceAdapter {
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

impl MuteControl for SourceAdapter {
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

impl LevelSensor for SourceAdapter {
    fn level(&self) -> f64 {
        lock(&self.inner.state).level
    }
}
