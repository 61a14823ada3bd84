use chrono::NaiveDateTime;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, LastWill, MqttOptions, Packet,
    TlsConfiguration, Transport,
};
use std::collections::VecDeque;
use thiserror::Error;
use tokio::time::{Duration, Instant};

use crate::{BrokerConfig, ConfigError, ConfigStore, LATENCY_WINDOW};

#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Network error: {0}")]
    Network(String),
    #[error("Broker refused credentials: {0:?}")]
    Auth(ConnectReturnCode),
    #[error("TLS error: {0}")]
    Tls(String),
    #[error("Timed out waiting for broker handshake")]
    Timeout,
    #[error("Configuration Error")]
    Config(#[from] ConfigError),
    #[error("Reconnect attempts exhausted after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<ConnectError>,
    },
}

/// Rolling connection statistics kept by the [`ConnectionManager`] for
/// observability: counts, last-connected / last-error markers, and a
/// capped window of recent connect latencies
#[derive(Debug, Default, Clone)]
pub struct ConnectionStats {
    pub success_count: u64,
    pub error_count: u64,
    pub last_connected_at: Option<NaiveDateTime>,
    pub last_error_at: Option<NaiveDateTime>,
    pub last_error: Option<String>,
    latency_ms: VecDeque<u128>,
}

impl ConnectionStats {
    fn record_success(&mut self, latency: Duration) {
        self.success_count += 1;
        self.last_connected_at = Some(chrono::Local::now().naive_local());
        if self.latency_ms.len() == LATENCY_WINDOW {
            self.latency_ms.pop_front();
        }
        self.latency_ms.push_back(latency.as_millis());
    }

    fn record_error(&mut self, message: String) {
        self.error_count += 1;
        self.last_error_at = Some(chrono::Local::now().naive_local());
        self.last_error = Some(message);
    }

    pub fn recent_latency_ms(&self) -> impl Iterator<Item = u128> + '_ {
        self.latency_ms.iter().copied()
    }

    pub fn last_latency_ms(&self) -> Option<u128> {
        self.latency_ms.back().copied()
    }
}

/// Result surface of the connection health/test endpoint
#[derive(Debug, Clone)]
pub struct ConnectionProbe {
    pub success: bool,
    pub latency_ms: Option<u128>,
    pub broker: String,
    pub error: Option<String>,
}

/// An established broker session. The session is exclusively owned by the
/// listener loop; only the [`ConnectionManager`] opens one and only the
/// owner tears it down.
pub struct Session {
    pub(crate) client: AsyncClient,
    pub(crate) event_loop: EventLoop,
    config: BrokerConfig,
    connected: bool,
}

impl Session {
    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    pub fn client(&self) -> AsyncClient {
        self.client.clone()
    }

    /// Graceful teardown. Idempotent: calling on an already-closed
    /// session is a no-op.
    pub async fn disconnect(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Err(e) = self.client.disconnect().await {
            log::debug!("Disconnect on closed session {e:}");
        }
    }
}

/// Owns connect / disconnect / reconnect for the single broker session.
/// Configuration is re-read through the [`ConfigStore`] seam on every
/// attempt, which covers credential rotation between attempts.
pub struct ConnectionManager {
    store: Box<dyn ConfigStore>,
    stats: ConnectionStats,
}

impl ConnectionManager {
    pub fn new(store: Box<dyn ConfigStore>) -> Self {
        Self {
            store,
            stats: ConnectionStats::default(),
        }
    }

    pub fn stats(&self) -> &ConnectionStats {
        &self.stats
    }

    pub async fn connect(&mut self) -> Result<Session, ConnectError> {
        let config = self.store.active_config().await?;
        let started = Instant::now();
        match Self::open_session(config).await {
            Ok(session) => {
                self.stats.record_success(started.elapsed());
                log::info!(
                    "Connected to broker {} as {}",
                    session.config.broker_addr(),
                    session.config.client_id
                );
                Ok(session)
            }
            Err(e) => {
                self.stats.record_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Bounded retry after unexpected session loss: fixed delay between
    /// attempts, at most `max_reconnect_attempts` of them, each attempt
    /// re-reading the active configuration. Exhaustion is fatal and
    /// surfaced to the caller, never swallowed.
    pub async fn reconnect(&mut self) -> Result<Session, ConnectError> {
        let policy = self.store.active_config().await?;
        let delay = Duration::from_secs(policy.reconnect_delay_secs);
        let max_attempts = policy.max_reconnect_attempts;

        let mut last = ConnectError::Timeout;
        for attempt in 1..=max_attempts {
            tokio::time::sleep(delay).await;
            log::info!("Reconnect attempt {attempt}/{max_attempts}");
            match self.connect().await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    log::warn!("Reconnect attempt {attempt}/{max_attempts} failed: {e:}");
                    last = e;
                }
            }
        }

        log::error!("Reconnect attempts exhausted, giving up");
        Err(ConnectError::Exhausted {
            attempts: max_attempts,
            last: Box::new(last),
        })
    }

    /// Connection test surface: one connect / disconnect cycle reporting
    /// latency and failure detail
    pub async fn probe(&mut self) -> ConnectionProbe {
        let broker = match self.store.active_config().await {
            Ok(config) => config.broker_addr(),
            Err(e) => {
                return ConnectionProbe {
                    success: false,
                    latency_ms: None,
                    broker: String::new(),
                    error: Some(e.to_string()),
                }
            }
        };
        match self.connect().await {
            Ok(mut session) => {
                session.disconnect().await;
                ConnectionProbe {
                    success: true,
                    latency_ms: self.stats.last_latency_ms(),
                    broker,
                    error: None,
                }
            }
            Err(e) => ConnectionProbe {
                success: false,
                latency_ms: None,
                broker,
                error: Some(e.to_string()),
            },
        }
    }

    async fn open_session(config: BrokerConfig) -> Result<Session, ConnectError> {
        config.validate()?;

        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));
        options.set_clean_session(config.clean_session);
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            options.set_credentials(user.clone(), pass.clone());
        }
        if let Some(will) = &config.last_will {
            options.set_last_will(LastWill::new(
                &will.topic,
                will.payload.clone().into_bytes(),
                config.qos(),
                will.retain,
            ));
        }
        if config.use_tls {
            let transport = match &config.ca_cert_path {
                Some(path) => {
                    let ca = tokio::fs::read(path)
                        .await
                        .map_err(|e| ConnectError::Tls(format!("reading CA {path:?}: {e:}")))?;
                    Transport::Tls(TlsConfiguration::Simple {
                        ca,
                        alpn: None,
                        client_auth: None,
                    })
                }
                None => Transport::tls_with_default_config(),
            };
            options.set_transport(transport);
        }

        let (client, mut event_loop) = AsyncClient::new(options, 64);

        let timeout = Duration::from_secs(config.connect_timeout_secs);
        tokio::time::timeout(timeout, Self::await_connack(&mut event_loop))
            .await
            .map_err(|_| ConnectError::Timeout)??;

        Ok(Session {
            client,
            event_loop,
            config,
            connected: true,
        })
    }

    async fn await_connack(event_loop: &mut EventLoop) -> Result<(), ConnectError> {
        loop {
            match event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                    return match ack.code {
                        ConnectReturnCode::Success => Ok(()),
                        ConnectReturnCode::BadUserNamePassword
                        | ConnectReturnCode::NotAuthorized => Err(ConnectError::Auth(ack.code)),
                        other => {
                            Err(ConnectError::Network(format!("broker refused: {other:?}")))
                        }
                    };
                }
                Ok(_) => continue,
                Err(e) => return Err(classify_connection_error(e)),
            }
        }
    }
}

fn classify_connection_error(e: rumqttc::ConnectionError) -> ConnectError {
    use rumqttc::ConnectionError;
    match e {
        ConnectionError::ConnectionRefused(code) => match code {
            ConnectReturnCode::BadUserNamePassword | ConnectReturnCode::NotAuthorized => {
                ConnectError::Auth(code)
            }
            other => ConnectError::Network(format!("broker refused: {other:?}")),
        },
        ConnectionError::Tls(e) => ConnectError::Tls(e.to_string()),
        ConnectionError::Io(e) => ConnectError::Network(e.to_string()),
        other => ConnectError::Network(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::StaticConfigStore;

    fn unroutable_config(max_attempts: u32) -> BrokerConfig {
        let mut config = BrokerConfig::default();
        // reserved TEST-NET-1 address, nothing listens there
        config.host = "192.0.2.1".to_string();
        config.port = 1883;
        config.connect_timeout_secs = 1;
        config.reconnect_delay_secs = 0;
        config.max_reconnect_attempts = max_attempts;
        config
    }

    #[tokio::test]
    async fn connect_failure_is_recorded_in_stats() {
        let mut manager =
            ConnectionManager::new(Box::new(StaticConfigStore::new(unroutable_config(1))));
        assert!(manager.connect().await.is_err());
        assert_eq!(manager.stats().error_count, 1);
        assert_eq!(manager.stats().success_count, 0);
        assert!(manager.stats().last_error.is_some());
    }

    #[tokio::test]
    async fn reconnect_exhausts_after_max_attempts() {
        let mut manager =
            ConnectionManager::new(Box::new(StaticConfigStore::new(unroutable_config(2))));
        match manager.reconnect().await {
            Err(ConnectError::Exhausted { attempts, .. }) => assert_eq!(attempts, 2),
            Err(e) => panic!("expected exhaustion, got {e:?}"),
            Ok(_) => panic!("unexpectedly connected"),
        }
        // one stats entry per failed attempt
        assert_eq!(manager.stats().error_count, 2);
    }

    #[tokio::test]
    async fn probe_reports_failure_detail() {
        let mut manager =
            ConnectionManager::new(Box::new(StaticConfigStore::new(unroutable_config(1))));
        let probe = manager.probe().await;
        assert!(!probe.success);
        assert_eq!(probe.broker, "192.0.2.1:1883");
        assert!(probe.error.is_some());
    }
}
