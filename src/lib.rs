//! Rust library for controlling Atlas AZM4/AZM8 zone mixers
//!
//! This library provides an async API for the mixer's JSON-RPC 2.0 control
//! protocol. It supports:
//!
//! - A TCP control channel and a UDP meter channel to one device
//! - Set, bump and one-shot get of named device parameters
//! - Push updates routed to one callback per subscribed parameter
//! - Keepalive pings under the device's idle timeout
//! - Zone and source adapters (gain, mute, source selection, level meter)
//! - Connection health checks and multi-device setup/teardown
//!
//! # Quick Start
//!
//! ```no_run
//! use atlas_azm::{AzmClient, DeviceConfig, Format};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = AzmClient::open(DeviceConfig::new("192.168.1.50")).await?;
//!
//!     client
//!         .subscribe("ZoneGain_0", Format::Val, |param, update| {
//!             println!("{} is now {:?} dB", param, update.val());
//!         })
//!         .await?;
//!     client.get("ZoneGain_0", Format::Val).await?;
//!
//!     client.set("ZoneMute_0", 0, Format::Val).await?;
//!     client.bump("ZoneGain_0", 1.0, Format::Val).await?;
//!
//!     client.disconnect().await;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Application**: owns one client, parameter table and adapter set per device
//! - **Entity**: adapters turning device parameters into widget state
//! - **Coordinator**: periodic connection health checks
//! - **Client**: subscribe/get/set/bump API over one device link
//! - **Connection**: TCP + UDP transport, listeners and keepalive
//! - **Subscription**: parameter name to callback routing
//! - **Protocol**: JSON message structures

mod app;
mod client;
mod config;
mod connection;
mod coordinator;
pub mod entity;
mod error;
mod protocol;
mod subscription;
mod types;

// Public exports
pub use app::{Application, Device};
pub use client::AzmClient;
pub use config::{
    DeviceConfig, DeviceConfigBuilder, GainScale, DEFAULT_HEALTH_CHECK_MS, DEFAULT_KEEPALIVE_MS,
    DEFAULT_NAME, DEFAULT_SETTLE_DELAY_MS, DEFAULT_TCP_PORT, DEFAULT_UDP_PORT,
};
pub use connection::{Endpoint, KEEPALIVE_PARAM};
pub use coordinator::{HealthCoordinator, HealthStatus};
pub use entity::{
    Entity, EntityEvent, GainControl, LevelSensor, MuteControl, PowerState, SourceAdapter,
    SourceNames, SourceSelect, ZoneAdapter,
};
pub use error::{AzmError, Channel, Result};
pub use protocol::{Format, InboundMethod, Notification, ParamRequest, ParamUpdate, Request};
pub use subscription::{Callback, SubscriptionTable};
pub use types::{EntryId, GainDb, Index, ParameterTable, SourceParams, ZoneParams};
