use chrono::NaiveDateTime;
use diesel::deserialize::FromSql;
use diesel::serialize::ToSql;
use diesel::{deserialize::FromSqlRow, expression::AsExpression, prelude::*};

use diesel::{
    backend::Backend,
    deserialize, serialize,
    sql_types::Text,
    sqlite::Sqlite,
};

use amind_broker::BrokerConfig;

/// Operational state of an [`AssetRecord`]. Stored as `Text`; transitions
/// only happen through the recorded status-change path, never by a bare
/// column update.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, AsExpression, FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum AssetStatus {
    Operational,
    Maintenance,
    Offline,
    Emergency,
    Decommissioned,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssetStatus::Operational => "operational",
            AssetStatus::Maintenance => "maintenance",
            AssetStatus::Offline => "offline",
            AssetStatus::Emergency => "emergency",
            AssetStatus::Decommissioned => "decommissioned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "operational" => Some(AssetStatus::Operational),
            "maintenance" => Some(AssetStatus::Maintenance),
            "offline" => Some(AssetStatus::Offline),
            "emergency" => Some(AssetStatus::Emergency),
            "decommissioned" => Some(AssetStatus::Decommissioned),
            _ => None,
        }
    }

    /// The subset devices may request over the status topic.
    /// Decommissioning is an administrative act, never a device message.
    pub fn device_settable(s: &str) -> Option<Self> {
        match Self::parse(s)? {
            AssetStatus::Decommissioned => None,
            status => Some(status),
        }
    }
}

impl std::fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql<Text, Sqlite> for AssetStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        AssetStatus::parse(&s).ok_or_else(|| format!("unknown asset status {s:?}").into())
    }
}

impl ToSql<Text, Sqlite> for AssetStatus {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

/// Kind of one append-only [`HistoryEventRecord`]
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, AsExpression, FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum EventType {
    StatusChange,
    PerformanceReading,
    DiagnosticScan,
    ShiftReport,
    IotHealthUpdate,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::StatusChange => "status_change",
            EventType::PerformanceReading => "performance_reading",
            EventType::DiagnosticScan => "diagnostic_scan",
            EventType::ShiftReport => "shift_report",
            EventType::IotHealthUpdate => "iot_health_update",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "status_change" => Some(EventType::StatusChange),
            "performance_reading" => Some(EventType::PerformanceReading),
            "diagnostic_scan" => Some(EventType::DiagnosticScan),
            "shift_report" => Some(EventType::ShiftReport),
            "iot_health_update" => Some(EventType::IotHealthUpdate),
            _ => None,
        }
    }
}

impl FromSql<Text, Sqlite> for EventType {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        EventType::parse(&s).ok_or_else(|| format!("unknown event type {s:?}").into())
    }
}

impl ToSql<Text, Sqlite> for EventType {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

/// Categorical banding of a 0-100 health score, derived in
/// [`health`](crate::health)
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, AsExpression, FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum HealthStatus {
    Excellent,
    Good,
    Fair,
    Poor,
    Critical,
}

impl HealthStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            HealthStatus::Excellent => "excellent",
            HealthStatus::Good => "good",
            HealthStatus::Fair => "fair",
            HealthStatus::Poor => "poor",
            HealthStatus::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "excellent" => Some(HealthStatus::Excellent),
            "good" => Some(HealthStatus::Good),
            "fair" => Some(HealthStatus::Fair),
            "poor" => Some(HealthStatus::Poor),
            "critical" => Some(HealthStatus::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromSql<Text, Sqlite> for HealthStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        HealthStatus::parse(&s).ok_or_else(|| format!("unknown health status {s:?}").into())
    }
}

impl ToSql<Text, Sqlite> for HealthStatus {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

/// Severity attached to a history event, derived for diagnostic scans
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug, AsExpression, FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum Severity {
    Normal,
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Normal => "normal",
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "normal" => Some(Severity::Normal),
            "info" => Some(Severity::Info),
            "warning" => Some(Severity::Warning),
            "critical" => Some(Severity::Critical),
            _ => None,
        }
    }
}

impl FromSql<Text, Sqlite> for Severity {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        Severity::parse(&s).ok_or_else(|| format!("unknown severity {s:?}").into())
    }
}

impl ToSql<Text, Sqlite> for Severity {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

/// Where a history event came from
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, AsExpression, FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum DataSource {
    Sensor,
    Manual,
    System,
    IotDevice,
}

impl DataSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Sensor => "sensor",
            DataSource::Manual => "manual",
            DataSource::System => "system",
            DataSource::IotDevice => "iot_device",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sensor" => Some(DataSource::Sensor),
            "manual" => Some(DataSource::Manual),
            "system" => Some(DataSource::System),
            "iot_device" => Some(DataSource::IotDevice),
            _ => None,
        }
    }
}

impl FromSql<Text, Sqlite> for DataSource {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        DataSource::parse(&s).ok_or_else(|| format!("unknown data source {s:?}").into())
    }
}

impl ToSql<Text, Sqlite> for DataSource {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

/// Connectivity state last reported by a device. The effective state also
/// folds in last-seen staleness, see [`DeviceRecord::effective_status`].
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, AsExpression, FromSqlRow)]
#[diesel(sql_type = diesel::sql_types::Text)]
pub enum DeviceStatus {
    Online,
    Offline,
    Error,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Online => "online",
            DeviceStatus::Offline => "offline",
            DeviceStatus::Error => "error",
            DeviceStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "online" => Some(DeviceStatus::Online),
            "offline" => Some(DeviceStatus::Offline),
            "error" => Some(DeviceStatus::Error),
            "maintenance" => Some(DeviceStatus::Maintenance),
            _ => None,
        }
    }
}

impl FromSql<Text, Sqlite> for DeviceStatus {
    fn from_sql(bytes: <Sqlite as Backend>::RawValue<'_>) -> deserialize::Result<Self> {
        let s = <String as FromSql<Text, Sqlite>>::from_sql(bytes)?;
        DeviceStatus::parse(&s).ok_or_else(|| format!("unknown device status {s:?}").into())
    }
}

impl ToSql<Text, Sqlite> for DeviceStatus {
    fn to_sql<'b>(&'b self, out: &mut serialize::Output<'b, '_, Sqlite>) -> serialize::Result {
        out.set_value(self.as_str().to_string());
        Ok(serialize::IsNull::No)
    }
}

/// One monitored piece of equipment
#[derive(Queryable, Selectable, Clone, PartialEq, Debug)]
#[diesel(table_name = crate::schema::assets)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct AssetRecord {
    pub id: i64,
    pub name: String,
    pub asset_type: String,
    pub status: AssetStatus,
    pub active: bool,
    pub site_id: Option<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = crate::schema::assets)]
pub struct NewAsset {
    pub name: String,
    pub asset_type: String,
    pub status: AssetStatus,
    pub active: bool,
    pub site_id: Option<i64>,
}

impl NewAsset {
    pub fn new(name: &str, asset_type: &str) -> Self {
        Self {
            name: name.to_string(),
            asset_type: asset_type.to_string(),
            status: AssetStatus::Operational,
            active: true,
            site_id: None,
        }
    }
}

/// One registered IoT sensor/controller attached to an asset
#[derive(Queryable, Selectable, Clone, PartialEq, Debug)]
#[diesel(table_name = crate::schema::devices)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DeviceRecord {
    pub id: i64,
    pub device_id: String,
    pub asset_id: i64,
    pub device_type: String,
    pub status: DeviceStatus,
    pub last_seen: Option<NaiveDateTime>,
    pub battery_level: Option<f32>,
    pub signal_strength: Option<f32>,
    pub capabilities: Option<String>,
    pub registration: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

impl DeviceRecord {
    /// Connectivity as the rest of the system should see it: a device
    /// whose last report is older than `stale_after` is offline no
    /// matter what it last claimed
    pub fn effective_status(&self, now: NaiveDateTime, stale_after: chrono::Duration) -> DeviceStatus {
        match self.last_seen {
            Some(seen) if now - seen <= stale_after => self.status,
            _ => DeviceStatus::Offline,
        }
    }
}

#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = crate::schema::devices)]
pub struct NewDevice {
    pub device_id: String,
    pub asset_id: i64,
    pub device_type: String,
    pub status: DeviceStatus,
    pub last_seen: Option<NaiveDateTime>,
    pub battery_level: Option<f32>,
    pub signal_strength: Option<f32>,
    pub capabilities: Option<String>,
    pub registration: Option<String>,
    pub active: bool,
    pub created_at: NaiveDateTime,
}

/// One immutable telemetry/lifecycle occurrence for an asset
#[derive(Queryable, Selectable, Clone, PartialEq, Debug)]
#[diesel(table_name = crate::schema::history_events)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct HistoryEventRecord {
    pub id: i64,
    pub asset_id: i64,
    pub event_type: EventType,
    pub previous_status: Option<AssetStatus>,
    pub current_status: Option<AssetStatus>,
    pub payload: Option<String>,
    pub health_score: Option<f32>,
    pub health_status: Option<HealthStatus>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub vibration: Option<f32>,
    pub anomaly_detected: bool,
    pub anomaly_description: Option<String>,
    pub severity: Severity,
    pub source: DataSource,
    pub automated: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = crate::schema::history_events)]
pub struct NewHistoryEvent {
    pub asset_id: i64,
    pub event_type: EventType,
    pub previous_status: Option<AssetStatus>,
    pub current_status: Option<AssetStatus>,
    pub payload: Option<String>,
    pub health_score: Option<f32>,
    pub health_status: Option<HealthStatus>,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub vibration: Option<f32>,
    pub anomaly_detected: bool,
    pub anomaly_description: Option<String>,
    pub severity: Severity,
    pub source: DataSource,
    pub automated: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

impl NewHistoryEvent {
    /// Baseline automated event; callers fill in the fields their event
    /// kind carries. The recorder re-stamps `created_at` at append time.
    pub fn automated(asset_id: i64, event_type: EventType, source: DataSource) -> Self {
        Self {
            asset_id,
            event_type,
            previous_status: None,
            current_status: None,
            payload: None,
            health_score: None,
            health_status: None,
            temperature: None,
            humidity: None,
            vibration: None,
            anomaly_detected: false,
            anomaly_description: None,
            severity: Severity::Normal,
            source,
            automated: true,
            notes: None,
            created_at: chrono::Local::now().naive_local(),
        }
    }
}

/// Broker connection parameters administered externally (admin panel or
/// seed tooling); exactly one row is active at a time
#[derive(Queryable, Selectable, Clone, PartialEq, Debug)]
#[diesel(table_name = crate::schema::broker_configs)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct BrokerConfigRecord {
    pub id: i64,
    pub name: String,
    pub host: String,
    pub port: i32,
    pub use_tls: bool,
    pub ca_cert_path: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub topic_prefix: String,
    pub qos: i32,
    pub keep_alive_secs: i32,
    pub connect_timeout_secs: i32,
    pub clean_session: bool,
    pub max_reconnect_attempts: i32,
    pub reconnect_delay_secs: i32,
    pub will_topic: Option<String>,
    pub will_payload: Option<String>,
    pub will_retain: bool,
    pub active: bool,
}

impl BrokerConfigRecord {
    pub fn to_broker_config(&self) -> BrokerConfig {
        BrokerConfig {
            host: self.host.clone(),
            port: self.port as u16,
            client_id: self.client_id.clone(),
            use_tls: self.use_tls,
            ca_cert_path: self.ca_cert_path.clone().map(std::path::PathBuf::from),
            username: self.username.clone(),
            password: self.password.clone(),
            topic_prefix: self.topic_prefix.clone(),
            qos: self.qos as u8,
            retain_commands: false,
            keep_alive_secs: self.keep_alive_secs as u64,
            connect_timeout_secs: self.connect_timeout_secs as u64,
            clean_session: self.clean_session,
            max_reconnect_attempts: self.max_reconnect_attempts as u32,
            reconnect_delay_secs: self.reconnect_delay_secs as u64,
            last_will: self.will_topic.as_ref().map(|topic| {
                amind_broker::LastWillConfig {
                    topic: topic.clone(),
                    payload: self.will_payload.clone().unwrap_or_default(),
                    retain: self.will_retain,
                }
            }),
        }
    }
}

#[derive(Insertable, Clone, Debug)]
#[diesel(table_name = crate::schema::broker_configs)]
pub struct NewBrokerConfig {
    pub name: String,
    pub host: String,
    pub port: i32,
    pub use_tls: bool,
    pub ca_cert_path: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub topic_prefix: String,
    pub qos: i32,
    pub keep_alive_secs: i32,
    pub connect_timeout_secs: i32,
    pub clean_session: bool,
    pub max_reconnect_attempts: i32,
    pub reconnect_delay_secs: i32,
    pub will_topic: Option<String>,
    pub will_payload: Option<String>,
    pub will_retain: bool,
    pub active: bool,
}

impl NewBrokerConfig {
    /// Start from the transport defaults; callers override what differs
    pub fn named(name: &str) -> Self {
        let defaults = BrokerConfig::default();
        Self {
            name: name.to_string(),
            host: defaults.host,
            port: i32::from(defaults.port),
            use_tls: defaults.use_tls,
            ca_cert_path: None,
            username: None,
            password: None,
            client_id: defaults.client_id,
            topic_prefix: defaults.topic_prefix,
            qos: i32::from(defaults.qos),
            keep_alive_secs: defaults.keep_alive_secs as i32,
            connect_timeout_secs: defaults.connect_timeout_secs as i32,
            clean_session: defaults.clean_session,
            max_reconnect_attempts: defaults.max_reconnect_attempts as i32,
            reconnect_delay_secs: defaults.reconnect_delay_secs as i32,
            will_topic: None,
            will_payload: None,
            will_retain: false,
            active: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_strings_round_trip() {
        for status in [
            AssetStatus::Operational,
            AssetStatus::Maintenance,
            AssetStatus::Offline,
            AssetStatus::Emergency,
            AssetStatus::Decommissioned,
        ] {
            assert_eq!(AssetStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AssetStatus::parse("retired"), None);
    }

    #[test]
    fn decommissioned_is_not_device_settable() {
        assert_eq!(
            AssetStatus::device_settable("maintenance"),
            Some(AssetStatus::Maintenance)
        );
        assert_eq!(AssetStatus::device_settable("decommissioned"), None);
        assert_eq!(AssetStatus::device_settable("bogus"), None);
    }

    #[test]
    fn stale_device_reads_as_offline() {
        let now = chrono::Local::now().naive_local();
        let device = DeviceRecord {
            id: 1,
            device_id: "d-1".to_string(),
            asset_id: 1,
            device_type: "sensor".to_string(),
            status: DeviceStatus::Online,
            last_seen: Some(now - chrono::Duration::seconds(600)),
            battery_level: None,
            signal_strength: None,
            capabilities: None,
            registration: None,
            active: true,
            created_at: now,
        };
        let stale_after = chrono::Duration::seconds(300);
        assert_eq!(device.effective_status(now, stale_after), DeviceStatus::Offline);

        let fresh = DeviceRecord {
            last_seen: Some(now - chrono::Duration::seconds(30)),
            ..device.clone()
        };
        assert_eq!(fresh.effective_status(now, stale_after), DeviceStatus::Online);

        let never_seen = DeviceRecord {
            last_seen: None,
            ..device
        };
        assert_eq!(
            never_seen.effective_status(now, stale_after),
            DeviceStatus::Offline
        );
    }

    #[test]
    fn broker_config_record_maps_to_transport_config() {
        let record = BrokerConfigRecord {
            id: 1,
            name: "factory".to_string(),
            host: "broker.plant.local".to_string(),
            port: 8883,
            use_tls: true,
            ca_cert_path: Some("/etc/asset-minder/ca.pem".to_string()),
            username: Some("minder".to_string()),
            password: Some("hunter2".to_string()),
            client_id: "asset-minder".to_string(),
            topic_prefix: "factory/east".to_string(),
            qos: 2,
            keep_alive_secs: 30,
            connect_timeout_secs: 5,
            clean_session: true,
            max_reconnect_attempts: 3,
            reconnect_delay_secs: 2,
            will_topic: Some("factory/east/listener/status".to_string()),
            will_payload: Some("offline".to_string()),
            will_retain: true,
            active: true,
        };
        let config = record.to_broker_config();
        assert_eq!(config.broker_addr(), "broker.plant.local:8883");
        assert_eq!(config.qos, 2);
        assert_eq!(config.max_reconnect_attempts, 3);
        let will = config.last_will.as_ref().expect("last will");
        assert_eq!(will.payload, "offline");
        assert!(config.validate().is_ok());
    }
}
