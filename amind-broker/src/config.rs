use rumqttc::QoS;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Config Parse Error")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid broker configuration: {0}")]
    Invalid(String),
    #[error("No active broker configuration")]
    NoActiveConfig,
    #[error("Configuration store unavailable: {0}")]
    Store(String),
}

/// Last-will message registered with the broker at connect time so that
/// subscribers can observe an ungraceful listener death
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastWillConfig {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub retain: bool,
}

/// Connection parameters for the MQTT broker. Exactly one configuration
/// is active at a time; the [`ConfigStore`] trait is the seam through
/// which the [`ConnectionManager`](crate::ConnectionManager) re-reads it
/// on every connect and reconnect attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub client_id: String,
    pub use_tls: bool,
    /// Trust anchor for the broker certificate. Self-signed broker certs
    /// are supported by listing the cert itself here; when unset the
    /// platform root store is used.
    pub ca_cert_path: Option<std::path::PathBuf>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topic_prefix: String,
    /// Delivery guarantee for subscriptions and command publishes (0-2)
    pub qos: u8,
    pub retain_commands: bool,
    pub keep_alive_secs: u64,
    pub connect_timeout_secs: u64,
    pub clean_session: bool,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay_secs: u64,
    pub last_will: Option<LastWillConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            client_id: "asset-minder".to_string(),
            use_tls: false,
            ca_cert_path: None,
            username: None,
            password: None,
            topic_prefix: "asset-minder".to_string(),
            qos: 1,
            retain_commands: false,
            keep_alive_secs: 15,
            connect_timeout_secs: 10,
            clean_session: true,
            max_reconnect_attempts: 5,
            reconnect_delay_secs: 5,
            last_will: None,
        }
    }
}

impl BrokerConfig {
    pub fn broker_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn qos(&self) -> QoS {
        match self.qos {
            2 => QoS::ExactlyOnce,
            1 => QoS::AtLeastOnce,
            _ => QoS::AtMostOnce,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::Invalid("host must not be empty".to_string()));
        }
        if self.client_id.is_empty() {
            return Err(ConfigError::Invalid(
                "client_id must not be empty".to_string(),
            ));
        }
        if self.qos > 2 {
            return Err(ConfigError::Invalid(format!(
                "qos must be 0, 1 or 2, got {}",
                self.qos
            )));
        }
        if self.keep_alive_secs == 0 {
            return Err(ConfigError::Invalid(
                "keep_alive_secs must be non-zero".to_string(),
            ));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(ConfigError::Invalid(
                "username and password must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

/// Source of the active [`BrokerConfig`]. Implementations re-read their
/// backing store on every call so that configuration changes take effect
/// on the next reconnect, not live.
#[async_trait::async_trait]
pub trait ConfigStore: Send + Sync {
    async fn active_config(&self) -> Result<BrokerConfig, ConfigError>;
}

/// File-backed [`ConfigStore`] reading a TOML rendition of
/// [`BrokerConfig`] on each call
pub struct TomlConfigStore {
    path: std::path::PathBuf,
}

impl TomlConfigStore {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl ConfigStore for TomlConfigStore {
    async fn active_config(&self) -> Result<BrokerConfig, ConfigError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let config: BrokerConfig = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }
}

/// Fixed in-memory [`ConfigStore`], used by tests and by deployments
/// that pass the full broker configuration on the command line
pub struct StaticConfigStore {
    config: BrokerConfig,
}

impl StaticConfigStore {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ConfigStore for StaticConfigStore {
    async fn active_config(&self) -> Result<BrokerConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config.clone())
    }
}
