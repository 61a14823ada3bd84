use actix::prelude::*;
use futures::prelude::*;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_stream::wrappers::UnboundedReceiverStream;

use amind_broker::{
    DeviceHeartbeat, DeviceRegistration, DiagnosticReport, HealthReport, PerformanceReport,
    TelemetryMessage,
};

use crate::db::{
    AssetDatabaseHandler, AverageHealthScore, ChangeAssetStatus, DatabaseError, GetAsset,
    RecordEvent, TouchDevice, UpsertDevice,
};
use crate::health::{diagnostic_anomaly, diagnostic_severity, health_score, HealthInputs};
use crate::models::{
    AssetRecord, AssetStatus, DataSource, DeviceStatus, EventType, HealthStatus, NewHistoryEvent,
};
use crate::snapshot::{AssetSnapshot, RealtimeCache};
use crate::trigger::StateAlertTrigger;

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Unknown asset {0}")]
    UnknownAsset(i64),
    #[error("Unknown device {0}")]
    UnknownDevice(String),
    #[error("Unsupported status value {0:?}")]
    InvalidStatus(String),
    #[error("Database Error")]
    Database(#[from] DatabaseError),
    #[error("Actix mailbox Error")]
    MailError(#[from] MailboxError),
    #[error("Serialization Error")]
    Serde(#[from] serde_json::Error),
}

/// Consumes the broker's telemetry stream and applies the per-message
/// semantics: validate, score, append history, publish snapshots, and
/// let the trigger drive transitions and alerts. One worker task, so
/// messages for the same asset apply in delivery order.
pub struct TelemetryIngestor {
    ingest_handle: Option<tokio::task::JoinHandle<()>>,
}

impl TelemetryIngestor {
    pub fn new(
        db: Addr<AssetDatabaseHandler>,
        trigger: StateAlertTrigger,
        cache: Arc<RealtimeCache>,
        telemetry_rx: UnboundedReceiver<TelemetryMessage>,
    ) -> Self {
        let worker = IngestWorker { db, trigger, cache };
        let handle = tokio::spawn(async move {
            worker.run(UnboundedReceiverStream::new(telemetry_rx)).await;
        });
        Self {
            ingest_handle: Some(handle),
        }
    }

    /// Await the worker; it exits once the telemetry channel closes,
    /// after finishing in-flight work
    pub async fn exec(&mut self) {
        if let Some(handle) = self.ingest_handle.take() {
            handle.await.ok();
        }
    }
}

impl Drop for TelemetryIngestor {
    fn drop(&mut self) {
        if let Some(handle) = &self.ingest_handle {
            handle.abort();
        }
    }
}

struct IngestWorker {
    db: Addr<AssetDatabaseHandler>,
    trigger: StateAlertTrigger,
    cache: Arc<RealtimeCache>,
}

impl IngestWorker {
    async fn run(mut self, mut stream: UnboundedReceiverStream<TelemetryMessage>) {
        while let Some(msg) = stream.next().await {
            if let Err(e) = self.dispatch(msg).await {
                // contained per message: the loop always continues
                match e {
                    IngestError::UnknownAsset(_)
                    | IngestError::UnknownDevice(_)
                    | IngestError::InvalidStatus(_) => {
                        log::warn!("Dropping message: {e:}");
                    }
                    e => log::error!("Dropping message after processing error: {e:}"),
                }
            }
        }
        log::warn!("Telemetry stream closed, ingest worker exiting");
    }

    async fn dispatch(&mut self, msg: TelemetryMessage) -> Result<(), IngestError> {
        match msg {
            TelemetryMessage::Performance { asset_id, report } => {
                self.handle_performance(asset_id, report).await
            }
            TelemetryMessage::Status { asset_id, report } => {
                self.handle_status(asset_id, report.status, report.reason).await
            }
            TelemetryMessage::Health { asset_id, report } => {
                self.handle_health(asset_id, report).await
            }
            TelemetryMessage::Diagnostic { asset_id, report } => {
                self.handle_diagnostic(asset_id, report).await
            }
            TelemetryMessage::Register { registration, raw } => {
                self.handle_register(registration, raw).await
            }
            TelemetryMessage::Heartbeat { device_id, report } => {
                self.handle_heartbeat(device_id, report).await
            }
        }
    }

    async fn asset(&self, asset_id: i64) -> Result<AssetRecord, IngestError> {
        self.db
            .send(GetAsset { asset_id })
            .await??
            .filter(|asset| asset.active)
            .ok_or(IngestError::UnknownAsset(asset_id))
    }

    async fn handle_performance(
        &mut self,
        asset_id: i64,
        report: PerformanceReport,
    ) -> Result<(), IngestError> {
        let asset = self.asset(asset_id).await?;

        let score = health_score(&HealthInputs::from(&report));
        let status = HealthStatus::from_score(score);

        let mut event =
            NewHistoryEvent::automated(asset_id, EventType::PerformanceReading, DataSource::IotDevice);
        event.payload = Some(serde_json::to_string(&report)?);
        event.health_score = Some(score as f32);
        event.health_status = Some(status);
        event.temperature = report
            .ambient_temperature
            .or(report.temperature)
            .map(|t| t as f32);
        event.humidity = report.humidity.map(|h| h as f32);
        event.vibration = report.vibration.map(|v| v as f32);

        let record = self.db.send(RecordEvent(event)).await??;
        log::debug!(
            "Performance reading for asset {asset_id}: score {score:.1} ({status})"
        );

        self.cache.publish(AssetSnapshot {
            asset_id,
            health_score: Some(score),
            health_status: Some(status),
            readings: serde_json::to_value(&report)?,
            recorded_at: record.created_at,
        });

        self.evaluate_scored(&asset, score).await
    }

    async fn handle_status(
        &mut self,
        asset_id: i64,
        status: String,
        reason: Option<String>,
    ) -> Result<(), IngestError> {
        self.asset(asset_id).await?;

        let Some(new_status) = AssetStatus::device_settable(&status) else {
            return Err(IngestError::InvalidStatus(status));
        };
        let reason = reason.unwrap_or_else(|| "IoT device update".to_string());

        let transition = self
            .db
            .send(ChangeAssetStatus {
                asset_id,
                new_status,
                reason,
                source: DataSource::IotDevice,
                automated: true,
            })
            .await??;
        if transition.is_none() {
            log::debug!("Asset {asset_id} already {new_status}, no transition recorded");
        }
        Ok(())
    }

    async fn handle_health(
        &mut self,
        asset_id: i64,
        report: HealthReport,
    ) -> Result<(), IngestError> {
        let asset = self.asset(asset_id).await?;

        let score = report.health_score;
        let mut event =
            NewHistoryEvent::automated(asset_id, EventType::IotHealthUpdate, DataSource::IotDevice);
        event.payload = Some(serde_json::to_string(&report)?);
        event.health_score = Some(score as f32);
        event.health_status = Some(HealthStatus::from_score(score));

        self.db.send(RecordEvent(event)).await??;

        self.evaluate_scored(&asset, score).await
    }

    async fn handle_diagnostic(
        &mut self,
        asset_id: i64,
        report: DiagnosticReport,
    ) -> Result<(), IngestError> {
        self.asset(asset_id).await?;

        let severity = diagnostic_severity(&report);
        let anomaly = diagnostic_anomaly(&report);

        let mut event =
            NewHistoryEvent::automated(asset_id, EventType::DiagnosticScan, DataSource::IotDevice);
        event.payload = Some(serde_json::to_string(&report)?);
        event.anomaly_detected = anomaly;
        if anomaly {
            event.anomaly_description = Some(if report.error_codes.is_empty() {
                format!("{} warnings reported", report.warnings.len())
            } else {
                format!("error codes: {}", report.error_codes.join(", "))
            });
        }
        event.severity = severity;

        self.db.send(RecordEvent(event)).await??;
        log::debug!(
            "Diagnostic scan for asset {asset_id}: severity {}, anomaly {anomaly}",
            severity.as_str()
        );
        Ok(())
    }

    async fn handle_register(
        &mut self,
        registration: DeviceRegistration,
        raw: serde_json::Value,
    ) -> Result<(), IngestError> {
        match self.db.send(UpsertDevice { registration, raw }).await? {
            Ok(device) => {
                log::info!(
                    "Device {} registered for asset {}",
                    device.device_id,
                    device.asset_id
                );
                Ok(())
            }
            Err(DatabaseError::UnknownAsset(asset_id)) => Err(IngestError::UnknownAsset(asset_id)),
            Err(e) => Err(e.into()),
        }
    }

    async fn handle_heartbeat(
        &mut self,
        device_id: String,
        report: DeviceHeartbeat,
    ) -> Result<(), IngestError> {
        let status = match &report.status {
            Some(s) => {
                DeviceStatus::parse(s).ok_or_else(|| IngestError::InvalidStatus(s.clone()))?
            }
            None => DeviceStatus::Online,
        };

        let touched = self
            .db
            .send(TouchDevice {
                device_id: device_id.clone(),
                status,
                battery_level: report.battery_level,
                signal_strength: report.signal_strength,
            })
            .await??;

        match touched {
            Some(device) => {
                log::trace!("Heartbeat from {} (asset {})", device.device_id, device.asset_id);
                Ok(())
            }
            None => Err(IngestError::UnknownDevice(device_id)),
        }
    }

    /// Runs after every event write that carries a health score: the
    /// critical-alert path on the reading itself, then the transition
    /// policy on the trailing average
    async fn evaluate_scored(
        &mut self,
        asset: &AssetRecord,
        score: f64,
    ) -> Result<(), IngestError> {
        let now = chrono::Local::now().naive_local();
        self.trigger
            .maybe_alert(asset, score, DataSource::IotDevice, now);

        let average = self
            .db
            .send(AverageHealthScore {
                asset_id: asset.id,
                window: self.trigger.policy().average_window,
            })
            .await??;

        if let Some((next, reason)) = self.trigger.planned_transition(asset.status, average) {
            let transition = self
                .db
                .send(ChangeAssetStatus {
                    asset_id: asset.id,
                    new_status: next,
                    reason,
                    source: DataSource::System,
                    automated: true,
                })
                .await??;
            if let Some(t) = transition {
                log::info!(
                    "Health policy moved asset {} {} -> {}",
                    asset.id,
                    t.previous,
                    t.current
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{CreateAsset, GetDevice, LatestEventOfType};
    use crate::models::{NewAsset, Severity};
    use crate::trigger::{AlertPolicy, CriticalHealthAlert};
    use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};

    struct Harness {
        db: Addr<AssetDatabaseHandler>,
        cache: Arc<RealtimeCache>,
        telemetry_tx: UnboundedSender<TelemetryMessage>,
        alert_rx: tokio::sync::mpsc::UnboundedReceiver<CriticalHealthAlert>,
        ingestor: TelemetryIngestor,
    }

    fn harness() -> Harness {
        let db = AssetDatabaseHandler::new(":memory:")
            .expect("in-memory database")
            .start();
        let cache = Arc::new(RealtimeCache::new(chrono::Duration::seconds(60), 16));
        let (alert_tx, alert_rx) = unbounded_channel();
        let (telemetry_tx, telemetry_rx) = unbounded_channel();
        let trigger = StateAlertTrigger::new(AlertPolicy::default(), alert_tx);
        let ingestor = TelemetryIngestor::new(db.clone(), trigger, cache.clone(), telemetry_rx);
        Harness {
            db,
            cache,
            telemetry_tx,
            alert_rx,
            ingestor,
        }
    }

    impl Harness {
        async fn seed_asset(&self) -> AssetRecord {
            self.db
                .send(CreateAsset(NewAsset::new("Conveyor 7", "conveyor")))
                .await
                .expect("mailbox")
                .expect("create asset")
        }

        /// Close the channel and drain the worker so every sent message
        /// has fully applied before assertions run
        async fn drain(mut self) -> (Addr<AssetDatabaseHandler>, Arc<RealtimeCache>, tokio::sync::mpsc::UnboundedReceiver<CriticalHealthAlert>) {
            drop(self.telemetry_tx);
            self.ingestor.exec().await;
            (self.db, self.cache, self.alert_rx)
        }
    }

    #[actix::test]
    async fn performance_message_records_event_and_snapshot() {
        let h = harness();
        let asset = h.seed_asset().await;

        h.telemetry_tx
            .send(TelemetryMessage::Performance {
                asset_id: asset.id,
                report: PerformanceReport {
                    efficiency: Some(80.0),
                    temperature: Some(30.0),
                    vibration: Some(2.0),
                    humidity: Some(40.0),
                    ..Default::default()
                },
            })
            .expect("send");
        let (db, cache, _alerts) = h.drain().await;

        let event = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::PerformanceReading,
            })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("event");
        // 100 - (90 - 80) * 2 = 80
        assert_eq!(event.health_score, Some(80.0));
        assert_eq!(event.health_status, Some(HealthStatus::Good));
        assert_eq!(event.humidity, Some(40.0));
        assert_eq!(event.source, DataSource::IotDevice);
        assert!(event.automated);

        let now = chrono::Local::now().naive_local();
        let snapshot = cache.latest(asset.id, now).expect("snapshot");
        assert_eq!(snapshot.health_score, Some(80.0));
        assert_eq!(snapshot.readings["efficiency"], 80.0);
    }

    #[actix::test]
    async fn status_message_records_exactly_one_transition() {
        let h = harness();
        let asset = h.seed_asset().await;
        h.db.send(ChangeAssetStatus {
            asset_id: asset.id,
            new_status: AssetStatus::Maintenance,
            reason: "bearing swap".to_string(),
            source: DataSource::Manual,
            automated: false,
        })
        .await
        .expect("mailbox")
        .expect("seed transition");

        h.telemetry_tx
            .send(TelemetryMessage::Status {
                asset_id: asset.id,
                report: amind_broker::StatusReport {
                    status: "operational".to_string(),
                    reason: None,
                },
            })
            .expect("send");
        let (db, _cache, _alerts) = h.drain().await;

        let event = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::StatusChange,
            })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("event");
        assert_eq!(event.previous_status, Some(AssetStatus::Maintenance));
        assert_eq!(event.current_status, Some(AssetStatus::Operational));
        assert_eq!(event.notes.as_deref(), Some("IoT device update"));

        let asset = db
            .send(GetAsset { asset_id: asset.id })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("asset");
        assert_eq!(asset.status, AssetStatus::Operational);
    }

    #[actix::test]
    async fn invalid_status_value_writes_nothing() {
        let h = harness();
        let asset = h.seed_asset().await;

        h.telemetry_tx
            .send(TelemetryMessage::Status {
                asset_id: asset.id,
                report: amind_broker::StatusReport {
                    status: "decommissioned".to_string(),
                    reason: None,
                },
            })
            .expect("send");
        h.telemetry_tx
            .send(TelemetryMessage::Status {
                asset_id: asset.id,
                report: amind_broker::StatusReport {
                    status: "exploded".to_string(),
                    reason: None,
                },
            })
            .expect("send");
        let (db, _cache, _alerts) = h.drain().await;

        let event = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::StatusChange,
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert!(event.is_none());
    }

    #[actix::test]
    async fn low_health_alerts_once_per_window_and_degrades_status() {
        let h = harness();
        let asset = h.seed_asset().await;

        for score in [20.0, 22.0, 19.0] {
            h.telemetry_tx
                .send(TelemetryMessage::Health {
                    asset_id: asset.id,
                    report: HealthReport {
                        health_score: score,
                        performance_score: None,
                        diagnostics: None,
                    },
                })
                .expect("send");
        }
        let (db, _cache, mut alerts) = h.drain().await;

        // three qualifying scores inside the cooldown window: one alert
        let alert = alerts.try_recv().expect("one alert");
        assert_eq!(alert.asset_id, asset.id);
        assert_eq!(alert.health_score, 20.0);
        assert!(alerts.try_recv().is_err());

        // trailing average 20.3 is under the maintenance threshold
        let asset = db
            .send(GetAsset { asset_id: asset.id })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("asset");
        assert_eq!(asset.status, AssetStatus::Maintenance);

        let transition = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::StatusChange,
            })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("transition event");
        assert_eq!(transition.source, DataSource::System);
        assert_eq!(transition.current_status, Some(AssetStatus::Maintenance));
    }

    #[actix::test]
    async fn recovered_average_returns_asset_to_operational() {
        let h = harness();
        let asset = h.seed_asset().await;

        h.telemetry_tx
            .send(TelemetryMessage::Health {
                asset_id: asset.id,
                report: HealthReport {
                    health_score: 20.0,
                    performance_score: None,
                    diagnostics: None,
                },
            })
            .expect("send");
        for _ in 0..5 {
            h.telemetry_tx
                .send(TelemetryMessage::Health {
                    asset_id: asset.id,
                    report: HealthReport {
                        health_score: 100.0,
                        performance_score: None,
                        diagnostics: None,
                    },
                })
                .expect("send");
        }
        let (db, _cache, _alerts) = h.drain().await;

        // average climbs to (20 + 5 * 100) / 6 = 86.7, past recovery
        let asset = db
            .send(GetAsset { asset_id: asset.id })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("asset");
        assert_eq!(asset.status, AssetStatus::Operational);
    }

    #[actix::test]
    async fn diagnostic_errors_mark_critical_anomaly() {
        let h = harness();
        let asset = h.seed_asset().await;

        h.telemetry_tx
            .send(TelemetryMessage::Diagnostic {
                asset_id: asset.id,
                report: DiagnosticReport {
                    error_codes: vec!["E21".to_string()],
                    warnings: vec!["w1".to_string()],
                    ..Default::default()
                },
            })
            .expect("send");
        let (db, _cache, _alerts) = h.drain().await;

        let event = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::DiagnosticScan,
            })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("event");
        assert!(event.anomaly_detected);
        assert_eq!(event.severity, Severity::Critical);
        assert_eq!(event.anomaly_description.as_deref(), Some("error codes: E21"));
        assert_eq!(event.health_score, None);
    }

    #[actix::test]
    async fn registration_then_heartbeat_tracks_the_device() {
        let h = harness();
        let asset = h.seed_asset().await;

        let raw = serde_json::json!({
            "device_id": "conv-temp-01",
            "asset_id": asset.id,
            "device_type": "temperature",
        });
        h.telemetry_tx
            .send(TelemetryMessage::Register {
                registration: serde_json::from_value(raw.clone()).expect("registration"),
                raw,
            })
            .expect("send");
        h.telemetry_tx
            .send(TelemetryMessage::Heartbeat {
                device_id: "conv-temp-01".to_string(),
                report: DeviceHeartbeat {
                    status: None,
                    battery_level: Some(0.75),
                    signal_strength: Some(-55.0),
                },
            })
            .expect("send");
        let (db, _cache, _alerts) = h.drain().await;

        let device = db
            .send(GetDevice {
                device_id: "conv-temp-01".to_string(),
            })
            .await
            .expect("mailbox")
            .expect("query")
            .expect("device");
        assert_eq!(device.asset_id, asset.id);
        assert_eq!(device.status, DeviceStatus::Online);
        assert_eq!(device.battery_level, Some(0.75));
        assert!(device.last_seen.is_some());
    }

    #[actix::test]
    async fn heartbeat_for_unknown_device_is_a_noop() {
        let h = harness();
        h.seed_asset().await;

        h.telemetry_tx
            .send(TelemetryMessage::Heartbeat {
                device_id: "ghost".to_string(),
                report: DeviceHeartbeat::default(),
            })
            .expect("send");
        let (db, _cache, _alerts) = h.drain().await;

        let device = db
            .send(GetDevice {
                device_id: "ghost".to_string(),
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert!(device.is_none());
    }

    #[actix::test]
    async fn unknown_asset_messages_do_not_stall_the_worker() {
        let h = harness();
        let asset = h.seed_asset().await;

        // unknown asset first: must be dropped, not kill the loop
        h.telemetry_tx
            .send(TelemetryMessage::Performance {
                asset_id: asset.id + 100,
                report: PerformanceReport::default(),
            })
            .expect("send");
        h.telemetry_tx
            .send(TelemetryMessage::Performance {
                asset_id: asset.id,
                report: PerformanceReport::default(),
            })
            .expect("send");
        let (db, _cache, _alerts) = h.drain().await;

        let event = db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type: EventType::PerformanceReading,
            })
            .await
            .expect("mailbox")
            .expect("query");
        assert!(event.is_some());
    }
}
