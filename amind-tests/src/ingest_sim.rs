//! Drives the full ingest pipeline over an in-memory database with
//! synthetic telemetry, then prints the recorded history. Run with
//! `RUST_LOG=debug` to watch each handler fire.

use actix::Actor;
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;

use amind_broker::{
    DeviceHeartbeat, DiagnosticReport, HealthReport, PerformanceReport, StatusReport,
    TelemetryMessage,
};
use amindb::{
    AlertPolicy, AssetDatabaseHandler, AverageHealthScore, CreateAsset, EventType, GetAsset,
    GetDevice, LatestEventOfType, NewAsset, RealtimeCache, StateAlertTrigger, TelemetryIngestor,
    DEVICE_STALE_SECS,
};

#[actix::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    log::info!("Initializing in-memory database");
    let db = AssetDatabaseHandler::new(":memory:")?.start();
    let asset = db
        .send(CreateAsset(NewAsset::new("Stamping Press 1", "press")))
        .await??;
    log::info!("Seeded asset {} ({})", asset.id, asset.name);

    let cache = Arc::new(RealtimeCache::new(chrono::Duration::seconds(120), 16));
    let (alert_tx, mut alert_rx) = unbounded_channel();
    let (telemetry_tx, telemetry_rx) = unbounded_channel();

    let trigger = StateAlertTrigger::new(AlertPolicy::default(), alert_tx);
    let mut ingestor = TelemetryIngestor::new(db.clone(), trigger, cache.clone(), telemetry_rx);

    let registration = serde_json::json!({
        "device_id": "press-tmp-01",
        "asset_id": asset.id,
        "device_type": "temperature",
        "capabilities": ["temperature", "vibration"],
    });
    let messages = vec![
        TelemetryMessage::Register {
            registration: serde_json::from_value(registration.clone())?,
            raw: registration,
        },
        TelemetryMessage::Heartbeat {
            device_id: "press-tmp-01".to_string(),
            report: DeviceHeartbeat {
                status: None,
                battery_level: Some(0.93),
                signal_strength: Some(-48.0),
            },
        },
        TelemetryMessage::Performance {
            asset_id: asset.id,
            report: PerformanceReport {
                efficiency: Some(72.0),
                temperature: Some(48.0),
                vibration: Some(6.5),
                humidity: Some(35.0),
                rpm: Some(1440.0),
                ..Default::default()
            },
        },
        TelemetryMessage::Diagnostic {
            asset_id: asset.id,
            report: DiagnosticReport {
                error_codes: vec!["E12".to_string()],
                warnings: vec!["belt-wear".to_string()],
                ..Default::default()
            },
        },
        TelemetryMessage::Health {
            asset_id: asset.id,
            report: HealthReport {
                health_score: 21.0,
                performance_score: Some(34.0),
                diagnostics: None,
            },
        },
        // unknown device: must be logged and dropped, never fatal
        TelemetryMessage::Heartbeat {
            device_id: "ghost-device".to_string(),
            report: DeviceHeartbeat::default(),
        },
        TelemetryMessage::Status {
            asset_id: asset.id,
            report: StatusReport {
                status: "offline".to_string(),
                reason: Some("end of shift".to_string()),
            },
        },
    ];

    for msg in messages {
        telemetry_tx.send(msg)?;
    }
    drop(telemetry_tx);
    ingestor.exec().await;

    let asset = db
        .send(GetAsset { asset_id: asset.id })
        .await??
        .expect("seeded asset");
    log::info!("Final asset status: {}", asset.status);

    for event_type in [
        EventType::PerformanceReading,
        EventType::DiagnosticScan,
        EventType::IotHealthUpdate,
        EventType::StatusChange,
    ] {
        match db
            .send(LatestEventOfType {
                asset_id: asset.id,
                event_type,
            })
            .await??
        {
            Some(event) => log::info!(
                "{}: score {:?} severity {} anomaly {} notes {:?}",
                event.event_type.as_str(),
                event.health_score,
                event.severity.as_str(),
                event.anomaly_detected,
                event.notes
            ),
            None => log::warn!("No {} event recorded", event_type.as_str()),
        }
    }

    let average = db
        .send(AverageHealthScore {
            asset_id: asset.id,
            window: chrono::Duration::hours(2),
        })
        .await??;
    log::info!("Trailing average health: {average:?}");

    let device = db
        .send(GetDevice {
            device_id: "press-tmp-01".to_string(),
        })
        .await??
        .expect("registered device");
    let now = chrono::Local::now().naive_local();
    log::info!(
        "Device {} battery {:?} signal {:?} effective status {}",
        device.device_id,
        device.battery_level,
        device.signal_strength,
        device
            .effective_status(now, chrono::Duration::seconds(DEVICE_STALE_SECS))
            .as_str()
    );

    while let Ok(alert) = alert_rx.try_recv() {
        log::info!(
            "Alert emitted: asset {} score {:.1}",
            alert.asset_id,
            alert.health_score
        );
    }

    let now = chrono::Local::now().naive_local();
    log::info!("Recent snapshots: {}", cache.recent(now).len());

    Ok(())
}
