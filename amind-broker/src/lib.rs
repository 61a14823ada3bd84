//! The `amind-broker` crate defines the transport layer for the asset-minder
//! system: a single long-lived MQTT session to the configured broker, the
//! topic routing table that turns raw publishes into typed telemetry
//! messages, and the outbound command path back to devices.
//!
//! Responsibilities:
//! 1. Own the broker connection lifecycle via [`ConnectionManager`]:
//!    connect (optionally over TLS), authenticate, disconnect, and
//!    reconnect with a bounded retry policy. Connection parameters are
//!    read through the [`ConfigStore`] seam on every attempt so that
//!    credential rotation takes effect on the next reconnect.
//! 2. Route inbound messages with [`TopicTable`]: each subscription
//!    pattern maps to a [`Route`] carrying the asset or device id
//!    extracted from the topic path. Unroutable topics are logged and
//!    dropped, never fatal.
//! 3. Parse payloads into typed [`TelemetryMessage`] values and stream
//!    them, in broker-delivery order, over an unbounded channel to the
//!    subscribing ingest layer (see the `amindb` crate).
//! 4. Publish command messages for assets via [`CommandClient`], sharing
//!    the session owned by the listener loop.
//!
//! # Examples
//! ```rust,no_run
//! use amind_broker::{BrokerConfig, MqttListener, StaticConfigStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let (telemetry_tx, mut telemetry_rx) = tokio::sync::mpsc::unbounded_channel();
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!
//!     let store = StaticConfigStore::new(BrokerConfig::default());
//!     let (mut listener, _commands) =
//!         MqttListener::new(Box::new(store), telemetry_tx, shutdown_rx);
//!
//!     tokio::spawn(async move { listener.run().await });
//!
//!     while let Some(msg) = telemetry_rx.recv().await {
//!         log::info!("telemetry {msg:?}");
//!     }
//!     shutdown_tx.send(true).ok();
//!     Ok(())
//! }
//! ```

mod broker;
mod config;
mod connection;
mod message;
mod publisher;
mod router;

pub use broker::{BrokerError, MqttListener};
pub use config::{
    BrokerConfig, ConfigError, ConfigStore, LastWillConfig, StaticConfigStore, TomlConfigStore,
};
pub use connection::{
    ConnectError, ConnectionManager, ConnectionProbe, ConnectionStats, Session,
};
pub use message::{
    CommandMessage, DeviceHeartbeat, DeviceRegistration, DiagnosticReport, HealthReport,
    ParseError, PerformanceReport, StatusReport, TelemetryMessage,
};
pub use publisher::{CommandClient, OutboundCommand};
pub use router::{MessageLog, RawMessage, Route, TopicTable};

/// Numeric identifier of a monitored asset, extracted from
/// `assets/{id}/...` topic paths
pub type AssetId = i64;

/// String identifier of an IoT sensor/controller, extracted from
/// `devices/{id}/...` topic paths
pub type DeviceId = String;

// Number of raw inbound messages retained for debugging/replay
const MESSAGE_LOG_CAPACITY: usize = 256;

// Number of recent connect latencies kept in the rolling stats window
const LATENCY_WINDOW: usize = 50;
