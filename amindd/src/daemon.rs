use actix::Actor;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::{mpsc::unbounded_channel, watch};
use tokio::time::Duration;

use amind_broker::{BrokerConfig, ConfigError, ConfigStore, MqttListener, StaticConfigStore};
use amindb::{
    AlertPolicy, AssetDatabaseHandler, CriticalHealthAlert, DbConfigStore, RealtimeCache,
    StateAlertTrigger, TelemetryIngestor,
};

use crate::{AssetMinderError, AssetMinderResult};

fn default_snapshot_ttl_secs() -> i64 {
    120
}

fn default_snapshot_recent_capacity() -> usize {
    64
}

/// Daemon configuration file: where the store lives and where the broker
/// parameters come from. With `broker_config_from_db` the active row of
/// the `broker_configs` table wins (so admin-side edits apply on the next
/// reconnect); otherwise the inline `[broker]` table is used as-is.
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    pub database_url: String,
    #[serde(default)]
    pub broker_config_from_db: bool,
    #[serde(default)]
    pub broker: Option<BrokerConfig>,
    #[serde(default = "default_snapshot_ttl_secs")]
    pub snapshot_ttl_secs: i64,
    #[serde(default = "default_snapshot_recent_capacity")]
    pub snapshot_recent_capacity: usize,
}

impl DaemonConfig {
    pub fn load(path: &std::path::Path) -> AssetMinderResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&raw)?)
    }
}

/// Run the listener until a termination signal, the optional timeout
/// (0 = run forever), or a fatal broker condition. In-flight handler
/// work finishes before the process winds down.
pub async fn run(config: DaemonConfig, timeout_secs: u64) -> AssetMinderResult<()> {
    let db = AssetDatabaseHandler::new(&config.database_url)?.start();

    let store: Box<dyn ConfigStore> = if config.broker_config_from_db {
        Box::new(DbConfigStore::new(db.clone()))
    } else {
        let broker: BrokerConfig = config.broker.ok_or(ConfigError::NoActiveConfig)?;
        Box::new(StaticConfigStore::new(broker))
    };

    let cache = Arc::new(RealtimeCache::new(
        chrono::Duration::seconds(config.snapshot_ttl_secs),
        config.snapshot_recent_capacity,
    ));

    let (alert_tx, mut alert_rx) = unbounded_channel::<CriticalHealthAlert>();
    let (telemetry_tx, telemetry_rx) = unbounded_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // default notification sink: structured log entries. Real fan-out
    // (in-app notification, email, emergency task creation) subscribes
    // to this channel instead.
    let alert_drain = tokio::spawn(async move {
        while let Some(alert) = alert_rx.recv().await {
            log::error!(
                "CRITICAL HEALTH asset {} ({}) site {:?} score {:.1} at {}",
                alert.asset_id,
                alert.asset_name,
                alert.site_id,
                alert.health_score,
                alert.recorded_at
            );
        }
    });

    let trigger = StateAlertTrigger::new(AlertPolicy::default(), alert_tx);
    let mut ingestor = TelemetryIngestor::new(db.clone(), trigger, cache.clone(), telemetry_rx);

    let (mut listener, _commands) = MqttListener::new(store, telemetry_tx, shutdown_rx);
    let mut listener_handle = tokio::spawn(async move { listener.run().await });

    tokio::select! {
        signal = shutdown_signal() => {
            if let Err(e) = signal {
                log::error!("Signal handler failed: {e:}");
            }
            log::info!("Termination signal received, finishing in-flight work");
        }
        _ = run_timeout(timeout_secs) => {
            log::info!("Run timeout of {timeout_secs}s reached, shutting down");
        }
        joined = &mut listener_handle => {
            // the listener only ends on its own for fatal conditions
            // (reconnect exhaustion, subscribe failure)
            ingestor.exec().await;
            alert_drain.await.ok();
            return match joined {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => {
                    log::error!("Listener failed: {e:}");
                    Err(e.into())
                }
                Err(e) => {
                    log::error!("Listener task died: {e:}");
                    Err(AssetMinderError::ListenerDied)
                }
            };
        }
    };

    shutdown_tx.send(true).ok();
    match listener_handle.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            log::error!("Listener exited with error during shutdown: {e:}");
            ingestor.exec().await;
            return Err(e.into());
        }
        Err(e) => {
            log::error!("Listener task died during shutdown: {e:}");
            return Err(AssetMinderError::ListenerDied);
        }
    }

    // the listener dropped its telemetry sender; the worker drains what
    // is queued and exits
    ingestor.exec().await;
    alert_drain.await.ok();
    log::info!("asset-minder listener stopped cleanly");
    Ok(())
}

async fn run_timeout(timeout_secs: u64) {
    if timeout_secs == 0 {
        std::future::pending::<()>().await;
    } else {
        tokio::time::sleep(Duration::from_secs(timeout_secs)).await;
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
