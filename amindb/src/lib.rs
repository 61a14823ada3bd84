//! The `amindb` crate holds the persistence and pipeline layer of the
//! asset-minder system. It consumes the typed telemetry stream produced
//! by the `amind-broker` crate and does the following:
//!    1. Record / track assets, devices, and the append-only history of
//!       telemetry and lifecycle events, via [`AssetDatabaseHandler`],
//!       an [`actix::Actor`] owning the SQLite connection (diesel)
//!    2. Derive health scores and categorical health status from
//!       performance, environmental, and diagnostic readings
//!       ([`health`]) - a pure, deterministic unit
//!    3. Drive asset status transitions and rate-limited critical-health
//!       alerts from freshly recorded data ([`StateAlertTrigger`])
//!    4. Maintain the realtime snapshot cache dashboards read
//!       ([`RealtimeCache`])
//!
//! The [`TelemetryIngestor`] ties these together: one worker task that
//! applies each inbound [`amind_broker::TelemetryMessage`] in delivery
//! order, containing every per-message failure so the pipeline never
//! stops on bad input.

mod db;
mod health;
mod ingest;
mod models;
mod schema;
mod snapshot;
mod trigger;

pub use db::{
    ActivateBrokerConfig, ActiveBrokerConfig, AnomalyCount, AssetDatabaseHandler,
    AverageHealthScore, ChangeAssetStatus, CreateAsset, DatabaseError, DbConfigStore, GetAsset,
    GetDevice, LatestEventOfType, RecordEvent, StatusTransition, TouchDevice, UpsertDevice,
};
pub use health::{diagnostic_anomaly, diagnostic_severity, health_score, HealthInputs};
pub use ingest::{IngestError, TelemetryIngestor};
pub use models::{
    AssetRecord, AssetStatus, BrokerConfigRecord, DataSource, DeviceRecord, DeviceStatus,
    EventType, HealthStatus, HistoryEventRecord, NewAsset, NewBrokerConfig, NewDevice,
    NewHistoryEvent, Severity,
};
pub use snapshot::{AssetSnapshot, RealtimeCache};
pub use trigger::{AlertPolicy, AlertSink, CriticalHealthAlert, StateAlertTrigger};

/// Seconds without a heartbeat or registration before a device reads as
/// offline regardless of its last reported status
pub const DEVICE_STALE_SECS: i64 = 300;
