use actix::prelude::*;
use diesel::prelude::*;
use diesel::sqlite::SqliteConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use thiserror::Error;

use amind_broker::{BrokerConfig, ConfigError, ConfigStore, DeviceRegistration};

use crate::models::{
    AssetRecord, AssetStatus, BrokerConfigRecord, DataSource, DeviceRecord, DeviceStatus,
    EventType, HistoryEventRecord, NewAsset, NewBrokerConfig, NewDevice, NewHistoryEvent,
    Severity,
};

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!();

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection Error")]
    Connection(#[from] diesel::ConnectionError),
    #[error("Query Error")]
    Query(#[from] diesel::result::Error),
    #[error("Migration Error: {0}")]
    Migration(String),
    #[error("Unknown asset {0}")]
    UnknownAsset(i64),
    #[error("Unknown device {0}")]
    UnknownDevice(String),
}

/// Owns the SQLite connection for the asset / device / history store.
/// All pipeline writes go through this actor, one message per operation,
/// so handler code never touches the connection directly. History is
/// append-only: there is no update or delete message for events.
pub struct AssetDatabaseHandler {
    conn: SqliteConnection,
}

impl AssetDatabaseHandler {
    pub fn new(database_url: &str) -> Result<Self, DatabaseError> {
        let mut conn = SqliteConnection::establish(database_url)?;
        conn.run_pending_migrations(MIGRATIONS)
            .map_err(|e| DatabaseError::Migration(e.to_string()))?;
        Ok(Self { conn })
    }

    fn find_asset(&mut self, asset_id: i64) -> Result<Option<AssetRecord>, DatabaseError> {
        use crate::schema::assets::dsl as assets;
        Ok(assets::assets
            .filter(assets::id.eq(asset_id))
            .select(AssetRecord::as_select())
            .first(&mut self.conn)
            .optional()?)
    }

    fn find_device(&mut self, device_id: &str) -> Result<Option<DeviceRecord>, DatabaseError> {
        use crate::schema::devices::dsl as devices;
        Ok(devices::devices
            .filter(devices::device_id.eq(device_id))
            .select(DeviceRecord::as_select())
            .first(&mut self.conn)
            .optional()?)
    }

    fn append_event(
        &mut self,
        mut event: NewHistoryEvent,
    ) -> Result<HistoryEventRecord, DatabaseError> {
        use crate::schema::history_events::dsl as events;
        // the recorder assigns the timestamp, not the caller
        event.created_at = chrono::Local::now().naive_local();
        Ok(diesel::insert_into(events::history_events)
            .values(&event)
            .returning(HistoryEventRecord::as_returning())
            .get_result(&mut self.conn)?)
    }
}

impl Actor for AssetDatabaseHandler {
    type Context = Context<Self>;
}

/// Append one immutable history event; returns the persisted record
#[derive(Message)]
#[rtype(result = "RecordEventResponse")]
pub struct RecordEvent(pub NewHistoryEvent);
type RecordEventResponse = Result<HistoryEventRecord, DatabaseError>;

impl Handler<RecordEvent> for AssetDatabaseHandler {
    type Result = RecordEventResponse;

    fn handle(&mut self, msg: RecordEvent, _ctx: &mut Self::Context) -> Self::Result {
        if self.find_asset(msg.0.asset_id)?.is_none() {
            return Err(DatabaseError::UnknownAsset(msg.0.asset_id));
        }
        self.append_event(msg.0)
    }
}

#[derive(Message)]
#[rtype(result = "GetAssetResponse")]
pub struct GetAsset {
    pub asset_id: i64,
}
type GetAssetResponse = Result<Option<AssetRecord>, DatabaseError>;

impl Handler<GetAsset> for AssetDatabaseHandler {
    type Result = GetAssetResponse;

    fn handle(&mut self, msg: GetAsset, _ctx: &mut Self::Context) -> Self::Result {
        self.find_asset(msg.asset_id)
    }
}

/// Seed/tooling surface; day-to-day asset CRUD lives in the admin layer
#[derive(Message)]
#[rtype(result = "CreateAssetResponse")]
pub struct CreateAsset(pub NewAsset);
type CreateAssetResponse = Result<AssetRecord, DatabaseError>;

impl Handler<CreateAsset> for AssetDatabaseHandler {
    type Result = CreateAssetResponse;

    fn handle(&mut self, msg: CreateAsset, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::assets::dsl as assets;
        Ok(diesel::insert_into(assets::assets)
            .values(&msg.0)
            .returning(AssetRecord::as_returning())
            .get_result(&mut self.conn)?)
    }
}

/// A recorded status transition: the updated column plus the
/// `status_change` event that documents it
#[derive(Debug, Clone)]
pub struct StatusTransition {
    pub previous: AssetStatus,
    pub current: AssetStatus,
    pub event: HistoryEventRecord,
}

/// Transition an asset's operational status, recording previous/current
/// and the supplied reason. A message naming the current status is a
/// no-op (`Ok(None)`): transitions are recorded, never duplicated.
#[derive(Message)]
#[rtype(result = "ChangeAssetStatusResponse")]
pub struct ChangeAssetStatus {
    pub asset_id: i64,
    pub new_status: AssetStatus,
    pub reason: String,
    pub source: DataSource,
    pub automated: bool,
}
type ChangeAssetStatusResponse = Result<Option<StatusTransition>, DatabaseError>;

impl Handler<ChangeAssetStatus> for AssetDatabaseHandler {
    type Result = ChangeAssetStatusResponse;

    fn handle(&mut self, msg: ChangeAssetStatus, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::assets::dsl as assets;

        let asset = self
            .find_asset(msg.asset_id)?
            .ok_or(DatabaseError::UnknownAsset(msg.asset_id))?;

        if asset.status == msg.new_status {
            return Ok(None);
        }

        diesel::update(assets::assets.filter(assets::id.eq(msg.asset_id)))
            .set((
                assets::status.eq(msg.new_status),
                assets::updated_at.eq(chrono::Local::now().naive_local()),
            ))
            .execute(&mut self.conn)?;

        let severity = if msg.new_status == AssetStatus::Emergency {
            Severity::Critical
        } else {
            Severity::Normal
        };

        let mut event =
            NewHistoryEvent::automated(msg.asset_id, EventType::StatusChange, msg.source);
        event.previous_status = Some(asset.status);
        event.current_status = Some(msg.new_status);
        event.severity = severity;
        event.automated = msg.automated;
        event.notes = Some(msg.reason);

        let event = self.append_event(event)?;
        log::info!(
            "Asset {} status {} -> {}",
            msg.asset_id,
            asset.status,
            msg.new_status
        );

        Ok(Some(StatusTransition {
            previous: asset.status,
            current: msg.new_status,
            event,
        }))
    }
}

/// Idempotent device registration keyed by the device identifier. The
/// raw registration payload is stored verbatim for audit.
#[derive(Message)]
#[rtype(result = "UpsertDeviceResponse")]
pub struct UpsertDevice {
    pub registration: DeviceRegistration,
    pub raw: serde_json::Value,
}
type UpsertDeviceResponse = Result<DeviceRecord, DatabaseError>;

impl Handler<UpsertDevice> for AssetDatabaseHandler {
    type Result = UpsertDeviceResponse;

    fn handle(&mut self, msg: UpsertDevice, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::devices::dsl as devices;

        let reg = msg.registration;
        if self.find_asset(reg.asset_id)?.is_none() {
            return Err(DatabaseError::UnknownAsset(reg.asset_id));
        }

        let now = chrono::Local::now().naive_local();
        let capabilities = if reg.capabilities.is_empty() {
            None
        } else {
            serde_json::to_string(&reg.capabilities).ok()
        };
        let raw = serde_json::to_string(&msg.raw).ok();

        let existing = self.find_device(&reg.device_id)?;
        let record = match existing {
            Some(device) => diesel::update(devices::devices.filter(devices::id.eq(device.id)))
                .set((
                    devices::asset_id.eq(reg.asset_id),
                    devices::device_type
                        .eq(reg.device_type.clone().unwrap_or(device.device_type)),
                    devices::status.eq(DeviceStatus::Online),
                    devices::last_seen.eq(Some(now)),
                    devices::capabilities.eq(capabilities),
                    devices::registration.eq(raw),
                    devices::active.eq(true),
                ))
                .returning(DeviceRecord::as_returning())
                .get_result(&mut self.conn)?,
            None => {
                let new_device = NewDevice {
                    device_id: reg.device_id.clone(),
                    asset_id: reg.asset_id,
                    device_type: reg.device_type.clone().unwrap_or_else(|| "sensor".to_string()),
                    status: DeviceStatus::Online,
                    last_seen: Some(now),
                    battery_level: None,
                    signal_strength: None,
                    capabilities,
                    registration: raw,
                    active: true,
                    created_at: now,
                };
                diesel::insert_into(devices::devices)
                    .values(&new_device)
                    .returning(DeviceRecord::as_returning())
                    .get_result(&mut self.conn)?
            }
        };

        Ok(record)
    }
}

/// Heartbeat bookkeeping: refresh last-seen, status, battery and signal
/// for a known device. `Ok(None)` when the device has never registered.
#[derive(Message)]
#[rtype(result = "TouchDeviceResponse")]
pub struct TouchDevice {
    pub device_id: String,
    pub status: DeviceStatus,
    pub battery_level: Option<f64>,
    pub signal_strength: Option<f64>,
}
type TouchDeviceResponse = Result<Option<DeviceRecord>, DatabaseError>;

impl Handler<TouchDevice> for AssetDatabaseHandler {
    type Result = TouchDeviceResponse;

    fn handle(&mut self, msg: TouchDevice, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::devices::dsl as devices;

        let Some(device) = self.find_device(&msg.device_id)? else {
            return Ok(None);
        };

        let record = diesel::update(devices::devices.filter(devices::id.eq(device.id)))
            .set((
                devices::status.eq(msg.status),
                devices::last_seen.eq(Some(chrono::Local::now().naive_local())),
                devices::battery_level
                    .eq(msg.battery_level.map(|b| b as f32).or(device.battery_level)),
                devices::signal_strength.eq(msg
                    .signal_strength
                    .map(|s| s as f32)
                    .or(device.signal_strength)),
            ))
            .returning(DeviceRecord::as_returning())
            .get_result(&mut self.conn)?;

        Ok(Some(record))
    }
}

#[derive(Message)]
#[rtype(result = "GetDeviceResponse")]
pub struct GetDevice {
    pub device_id: String,
}
type GetDeviceResponse = Result<Option<DeviceRecord>, DatabaseError>;

impl Handler<GetDevice> for AssetDatabaseHandler {
    type Result = GetDeviceResponse;

    fn handle(&mut self, msg: GetDevice, _ctx: &mut Self::Context) -> Self::Result {
        self.find_device(&msg.device_id)
    }
}

/// Mean of the health scores recorded for an asset within the trailing
/// window; `None` when no scored event exists in the window
#[derive(Message)]
#[rtype(result = "AverageHealthScoreResponse")]
pub struct AverageHealthScore {
    pub asset_id: i64,
    pub window: chrono::Duration,
}
type AverageHealthScoreResponse = Result<Option<f64>, DatabaseError>;

impl Handler<AverageHealthScore> for AssetDatabaseHandler {
    type Result = AverageHealthScoreResponse;

    fn handle(&mut self, msg: AverageHealthScore, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::history_events::dsl as events;

        let cutoff = chrono::Local::now().naive_local() - msg.window;
        let scores: Vec<Option<f32>> = events::history_events
            .filter(events::asset_id.eq(msg.asset_id))
            .filter(events::created_at.ge(cutoff))
            .filter(events::health_score.is_not_null())
            .select(events::health_score)
            .load(&mut self.conn)?;

        let scores: Vec<f32> = scores.into_iter().flatten().collect();
        if scores.is_empty() {
            return Ok(None);
        }
        let sum: f64 = scores.iter().map(|s| f64::from(*s)).sum();
        Ok(Some(sum / scores.len() as f64))
    }
}

/// Number of anomalous events for an asset within the trailing window
#[derive(Message)]
#[rtype(result = "AnomalyCountResponse")]
pub struct AnomalyCount {
    pub asset_id: i64,
    pub window: chrono::Duration,
}
type AnomalyCountResponse = Result<i64, DatabaseError>;

impl Handler<AnomalyCount> for AssetDatabaseHandler {
    type Result = AnomalyCountResponse;

    fn handle(&mut self, msg: AnomalyCount, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::history_events::dsl as events;

        let cutoff = chrono::Local::now().naive_local() - msg.window;
        Ok(events::history_events
            .filter(events::asset_id.eq(msg.asset_id))
            .filter(events::created_at.ge(cutoff))
            .filter(events::anomaly_detected.eq(true))
            .count()
            .get_result(&mut self.conn)?)
    }
}

/// Most recent event of a given kind for an asset
#[derive(Message)]
#[rtype(result = "LatestEventOfTypeResponse")]
pub struct LatestEventOfType {
    pub asset_id: i64,
    pub event_type: EventType,
}
type LatestEventOfTypeResponse = Result<Option<HistoryEventRecord>, DatabaseError>;

impl Handler<LatestEventOfType> for AssetDatabaseHandler {
    type Result = LatestEventOfTypeResponse;

    fn handle(&mut self, msg: LatestEventOfType, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::history_events::dsl as events;

        Ok(events::history_events
            .filter(events::asset_id.eq(msg.asset_id))
            .filter(events::event_type.eq(msg.event_type))
            .order((events::created_at.desc(), events::id.desc()))
            .select(HistoryEventRecord::as_select())
            .first(&mut self.conn)
            .optional()?)
    }
}

/// The single active broker configuration, if any
#[derive(Message)]
#[rtype(result = "ActiveBrokerConfigResponse")]
pub struct ActiveBrokerConfig;
type ActiveBrokerConfigResponse = Result<Option<BrokerConfigRecord>, DatabaseError>;

impl Handler<ActiveBrokerConfig> for AssetDatabaseHandler {
    type Result = ActiveBrokerConfigResponse;

    fn handle(&mut self, _msg: ActiveBrokerConfig, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::broker_configs::dsl as configs;

        Ok(configs::broker_configs
            .filter(configs::active.eq(true))
            .order(configs::id.desc())
            .select(BrokerConfigRecord::as_select())
            .first(&mut self.conn)
            .optional()?)
    }
}

/// Install a broker configuration as the active one, deactivating the
/// rest. Seed/tooling surface mirroring the external admin panel.
#[derive(Message)]
#[rtype(result = "ActivateBrokerConfigResponse")]
pub struct ActivateBrokerConfig(pub NewBrokerConfig);
type ActivateBrokerConfigResponse = Result<BrokerConfigRecord, DatabaseError>;

impl Handler<ActivateBrokerConfig> for AssetDatabaseHandler {
    type Result = ActivateBrokerConfigResponse;

    fn handle(&mut self, msg: ActivateBrokerConfig, _ctx: &mut Self::Context) -> Self::Result {
        use crate::schema::broker_configs::dsl as configs;

        diesel::update(configs::broker_configs)
            .set(configs::active.eq(false))
            .execute(&mut self.conn)?;

        let mut config = msg.0;
        config.active = true;
        Ok(diesel::insert_into(configs::broker_configs)
            .values(&config)
            .returning(BrokerConfigRecord::as_returning())
            .get_result(&mut self.conn)?)
    }
}

/// [`ConfigStore`] backed by the `broker_configs` table, so the
/// connection manager picks up admin-side changes on its next reconnect
pub struct DbConfigStore {
    db: Addr<AssetDatabaseHandler>,
}

impl DbConfigStore {
    pub fn new(db: Addr<AssetDatabaseHandler>) -> Self {
        Self { db }
    }
}

#[async_trait::async_trait]
impl ConfigStore for DbConfigStore {
    async fn active_config(&self) -> Result<BrokerConfig, ConfigError> {
        let record = self
            .db
            .send(ActiveBrokerConfig)
            .await
            .map_err(|e| ConfigError::Store(e.to_string()))?
            .map_err(|e| ConfigError::Store(e.to_string()))?
            .ok_or(ConfigError::NoActiveConfig)?;

        let config = record.to_broker_config();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::HealthStatus;

    fn start_handler() -> Addr<AssetDatabaseHandler> {
        AssetDatabaseHandler::new(":memory:")
            .expect("in-memory database")
            .start()
    }

    async fn seed_asset(db: &Addr<AssetDatabaseHandler>) -> AssetRecord {
        db.send(CreateAsset(NewAsset::new("CNC Press 4", "press")))
            .await
            .expect("mailbox")
            .expect("create asset")
    }

    #[actix::test]
    async fn record_event_assigns_timestamp_and_persists() {
        let db = start_handler();
        let asset = seed_asset(&db).await;

        let mut event =
            NewHistoryEvent::automated(asset.id, EventType::PerformanceReading, DataSource::IotDevice);
        event.health_score = Some(82.0);
        event.health_status = Some(HealthStatus::Good);

        let record = db.send(RecordEvent(event)).await.expect("mailbox").expect("record");
        assert_eq!(record.asset_id, asset.id);
        assert_eq!(record.event_type, EventType::PerformanceReading);
        assert_eq!(record.health_score, Some(82.0));

        let latest = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::PerformanceReading,
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert_eq!(latest, Some(record));
    }

    #[actix::test]
    async fn record_event_rejects_unknown_asset() {
        let db = start_handler();
        let event =
            NewHistoryEvent::automated(404, EventType::PerformanceReading, DataSource::IotDevice);
        match db.send(RecordEvent(event)).await.expect("mailbox") {
            Err(DatabaseError::UnknownAsset(404)) => {}
            other => panic!("expected unknown asset, got {other:?}"),
        }
    }

    #[actix::test]
    async fn status_change_records_exactly_one_transition_event() {
        let db = start_handler();
        let asset = seed_asset(&db).await;

        db.send(ChangeAssetStatus {
            asset_id: asset.id,
            new_status: AssetStatus::Maintenance,
            reason: "planned service".to_string(),
            source: DataSource::Manual,
            automated: false,
        })
        .await
        .expect("mailbox")
        .expect("transition")
        .expect("some transition");

        let transition = db
            .send(ChangeAssetStatus {
                asset_id: asset.id,
                new_status: AssetStatus::Operational,
                reason: "IoT device update".to_string(),
                source: DataSource::IotDevice,
                automated: true,
            })
            .await
            .expect("mailbox")
            .expect("transition")
            .expect("some transition");

        assert_eq!(transition.previous, AssetStatus::Maintenance);
        assert_eq!(transition.current, AssetStatus::Operational);
        assert_eq!(transition.event.event_type, EventType::StatusChange);
        assert_eq!(transition.event.previous_status, Some(AssetStatus::Maintenance));
        assert_eq!(transition.event.current_status, Some(AssetStatus::Operational));
        assert_eq!(transition.event.notes.as_deref(), Some("IoT device update"));

        let asset = db
            .send(GetAsset { asset_id: asset.id })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("asset");
        assert_eq!(asset.status, AssetStatus::Operational);
    }

    #[actix::test]
    async fn status_change_to_same_status_is_a_noop() {
        let db = start_handler();
        let asset = seed_asset(&db).await;

        let transition = db
            .send(ChangeAssetStatus {
                asset_id: asset.id,
                new_status: AssetStatus::Operational,
                reason: "IoT device update".to_string(),
                source: DataSource::IotDevice,
                automated: true,
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert!(transition.is_none());

        let latest = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::StatusChange,
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert!(latest.is_none());
    }

    #[actix::test]
    async fn average_health_score_covers_scored_events_only() {
        let db = start_handler();
        let asset = seed_asset(&db).await;

        for score in [80.0_f32, 60.0, 40.0] {
            let mut event = NewHistoryEvent::automated(
                asset.id,
                EventType::IotHealthUpdate,
                DataSource::IotDevice,
            );
            event.health_score = Some(score);
            db.send(RecordEvent(event)).await.expect("mailbox").expect("record");
        }
        // unscored event must not drag the average
        let event =
            NewHistoryEvent::automated(asset.id, EventType::DiagnosticScan, DataSource::IotDevice);
        db.send(RecordEvent(event)).await.expect("mailbox").expect("record");

        let average = db
            .send(AverageHealthScore {
                asset_id: asset.id,
                window: chrono::Duration::hours(2),
            })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("average");
        assert!((average - 60.0).abs() < f64::EPSILON);

        let empty = db
            .send(AverageHealthScore {
                asset_id: asset.id + 1,
                window: chrono::Duration::hours(2),
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert!(empty.is_none());
    }

    #[actix::test]
    async fn anomaly_count_tracks_flagged_events() {
        let db = start_handler();
        let asset = seed_asset(&db).await;

        let mut event =
            NewHistoryEvent::automated(asset.id, EventType::DiagnosticScan, DataSource::IotDevice);
        event.anomaly_detected = true;
        event.severity = Severity::Critical;
        db.send(RecordEvent(event)).await.expect("mailbox").expect("record");

        let count = db
            .send(AnomalyCount {
                asset_id: asset.id,
                window: chrono::Duration::hours(2),
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert_eq!(count, 1);
    }

    #[actix::test]
    async fn device_registration_is_idempotent() {
        let db = start_handler();
        let asset = seed_asset(&db).await;

        let registration = DeviceRegistration {
            device_id: "press-tmp-01".to_string(),
            asset_id: asset.id,
            device_type: Some("temperature".to_string()),
            capabilities: vec!["temperature".to_string()],
            config: None,
        };
        let raw = serde_json::json!({"device_id": "press-tmp-01", "asset_id": asset.id});

        let first = db
            .send(UpsertDevice {
                registration: registration.clone(),
                raw: raw.clone(),
            })
            .await
            .expect("mailbox")
            .expect("upsert");
        let second = db
            .send(UpsertDevice { registration, raw })
            .await
            .expect("mailbox")
            .expect("upsert");

        assert_eq!(first.id, second.id);
        assert_eq!(second.status, DeviceStatus::Online);
        assert!(second.registration.is_some());
    }

    #[actix::test]
    async fn touch_device_is_a_noop_for_unknown_devices() {
        let db = start_handler();
        let touched = db
            .send(TouchDevice {
                device_id: "ghost".to_string(),
                status: DeviceStatus::Online,
                battery_level: Some(0.9),
                signal_strength: None,
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert!(touched.is_none());
    }

    #[actix::test]
    async fn touch_device_keeps_last_known_battery() {
        let db = start_handler();
        let asset = seed_asset(&db).await;

        let registration = DeviceRegistration {
            device_id: "press-vib-02".to_string(),
            asset_id: asset.id,
            device_type: None,
            capabilities: vec![],
            config: None,
        };
        db.send(UpsertDevice {
            registration,
            raw: serde_json::json!({}),
        })
        .await
        .expect("mailbox")
        .expect("upsert");

        db.send(TouchDevice {
            device_id: "press-vib-02".to_string(),
            status: DeviceStatus::Online,
            battery_level: Some(0.8),
            signal_strength: Some(-60.0),
        })
        .await
        .expect("mailbox")
        .expect("touch")
        .expect("device");

        let device = db
            .send(TouchDevice {
                device_id: "press-vib-02".to_string(),
                status: DeviceStatus::Online,
                battery_level: None,
                signal_strength: None,
            })
            .await
            .expect("mailbox")
            .expect("touch")
            .expect("device");
        assert_eq!(device.battery_level, Some(0.8));
        assert_eq!(device.signal_strength, Some(-60.0));
    }

    #[actix::test]
    async fn active_broker_config_round_trips_through_the_store() {
        let db = start_handler();
        assert!(db
            .send(ActiveBrokerConfig)
            .await
            .expect("mailbox")
            .expect("query")
            .is_none());

        let mut seed = NewBrokerConfig::named("factory");
        seed.host = "broker.plant.local".to_string();
        seed.topic_prefix = "factory/east".to_string();
        db.send(ActivateBrokerConfig(seed)).await.expect("mailbox").expect("activate");

        let store = DbConfigStore::new(db.clone());
        let config = store.active_config().await.expect("active config");
        assert_eq!(config.host, "broker.plant.local");
        assert_eq!(config.topic_prefix, "factory/east");

        // activating a replacement deactivates the first
        let mut replacement = NewBrokerConfig::named("factory-v2");
        replacement.host = "broker2.plant.local".to_string();
        db.send(ActivateBrokerConfig(replacement))
            .await
            .expect("mailbox")
            .expect("activate");
        let config = store.active_config().await.expect("active config");
        assert_eq!(config.host, "broker2.plant.local");
    }
}
