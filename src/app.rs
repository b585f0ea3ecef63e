use crate::client::AzmClient;
use crate::config::DeviceConfig;
use crate::coordinator::HealthCoordinator;
use crate::entity::{
    Entity, EntityContext, EntityEvent, SourceAdapter, SourceNames, ZoneAdapter,
};
use crate::error::{AzmError, Result};
use crate::types::{EntryId, ParameterTable};
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Everything set up for one configured device
pub struct Device {
    entry_id: EntryId,
    config: DeviceConfig,
    client: Arc<AzmClient>,
    table: ParameterTable,
    coordinator: HealthCoordinator,
    context: EntityContext,
    sources: Vec<SourceAdapter>,
    zones: Vec<ZoneAdapter>,
    source_names: SourceNames,
}

impl Device {
    pub fn entry_id(&self) -> EntryId {
        self.entry_id
    }

    pub fn title(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<AzmClient> {
        &self.client
    }

    pub fn table(&self) -> &ParameterTable {
        &self.table
    }

    pub fn coordinator(&self) -> &HealthCoordinator {
        &self.coordinator
    }

    pub fn sources(&self) -> &[SourceAdapter] {
        &self.sources
    }

    pub fn zones(&self) -> &[ZoneAdapter] {
        &self.zones
    }

    pub fn source_names(&self) -> &SourceNames {
        &self.source_names
    }

    /// Receive a notification after every applied entity update
    pub fn subscribe_events(&self) -> broadcast::Receiver<EntityEvent> {
        self.context.subscribe_events()
    }

    async fn teardown(mut self) {
        for zone in &self.zones {
            zone.deactivate().await;
        }
        for source in &self.sources {
            source.deactivate().await;
        }
        self.coordinator.stop().await;
        self.client.disconnect().await;
        tracing::info!("Unloaded {} ({})", self.config.name, self.entry_id);
    }
}

/// Owner of all configured devices
///
/// # Example
///
/// ```no_run
/// use atlas_azm::{Application, DeviceConfig, MuteControl};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut app = Application::new();
///     let config = DeviceConfig::new("192.168.1.50");
///     Application::validate(&config).await?;
///
///     let id = app.setup(config).await?;
///     if let Some(zone) = app.device(id).and_then(|d| d.zones().first()) {
///         zone.set_muted(true).await?;
///     }
///
///     app.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Default)]
pub struct Application {
    devices: BTreeMap<EntryId, Device>,
}

impl Application {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check that the device is reachable; returns the entry title
    pub async fn validate(config: &DeviceConfig) -> Result<String> {
        let client = AzmClient::new(config.clone());
        if let Err(e) = client.connect().await {
            tracing::debug!("Validation of {} failed: {}", config.host, e);
            return Err(AzmError::CannotConnect(config.host.clone()));
        }
        client.disconnect().await;
        Ok(config.name.clone())
    }

    /// Connect to a device and bring up its entities
    pub async fn setup(&mut self, config: DeviceConfig) -> Result<EntryId> {
        self.setup_with_table(config, ParameterTable::standard()).await
    }

    /// Like [`Application::setup`] with a non-standard parameter layout
    pub async fn setup_with_table(
        &mut self,
        config: DeviceConfig,
        table: ParameterTable,
    ) -> Result<EntryId> {
        if self.devices.values().any(|d| d.config.host == config.host) {
            return Err(AzmError::AlreadyConfigured(config.host));
        }

        let client = Arc::new(AzmClient::new(config.clone()));
        if client.connect().await.is_err() {
            return Err(AzmError::NotReady(config.host));
        }

        let entry_id = Uuid::new_v4();
        let context = EntityContext::new(entry_id, client.clone());
        let source_names = SourceNames::new();

        let sources: Vec<SourceAdapter> = table
            .sources()
            .iter()
            .map(|p| SourceAdapter::new(context.clone(), p.clone(), source_names.clone()))
            .collect();
        let zones: Vec<ZoneAdapter> = table
            .zones()
            .iter()
            .map(|p| ZoneAdapter::new(context.clone(), p.clone(), source_names.clone()))
            .collect();

        tracing::info!(
            "Set up {} sources and {} zones for {}",
            sources.len(),
            zones.len(),
            config.host
        );

        let mut coordinator =
            HealthCoordinator::new(client.clone(), config.health_check_interval());
        coordinator.start().await;

        let device = Device {
            entry_id,
            config,
            client,
            table,
            coordinator,
            context,
            sources,
            zones,
            source_names,
        };

        if let Err(e) = activate_all(&device).await {
            tracing::error!("Failed to activate entities for {}: {}", device.config.host, e);
            device.teardown().await;
            return Err(e);
        }

        self.devices.insert(entry_id, device);
        Ok(entry_id)
    }

    /// Tear down one device
    pub async fn unload(&mut self, entry_id: EntryId) -> Result<()> {
        let device = self
            .devices
            .remove(&entry_id)
            .ok_or(AzmError::UnknownEntry(entry_id))?;
        device.teardown().await;
        Ok(())
    }

    /// Tear down every device
    pub async fn shutdown(&mut self) {
        let devices = std::mem::take(&mut self.devices);
        join_all(devices.into_values().map(Device::teardown)).await;
    }

    pub fn device(&self, entry_id: EntryId) -> Option<&Device> {
        self.devices.get(&entry_id)
    }

    pub fn entry_ids(&self) -> Vec<EntryId> {
        self.devices.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

// Sources first, so zone source lists fill in as names arrive.
async fn activate_all(device: &Device) -> Result<()> {
    for source in &device.sources {
        source.activate().await?;
    }
    for zone in &device.zones {
        zone.activate().await?;
    }
    Ok(())
}
