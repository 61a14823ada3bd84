//! Listener daemon for the asset-minder system: connects to the broker,
//! subscribes to asset and device topics, and runs the telemetry ingest
//! pipeline until told to stop (signal or `--timeout`).

pub mod daemon;

use amind_broker::{BrokerError, ConfigError, ConnectError};
use amindb::DatabaseError;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum AssetMinderError {
    #[error("I/O Error")]
    Io(#[from] std::io::Error),
    #[error("Broker Error")]
    Broker(#[from] BrokerError),
    #[error("Connection Error")]
    Connect(#[from] ConnectError),
    #[error("Configuration Error")]
    Config(#[from] ConfigError),
    #[error("Config Parse Error")]
    ConfigParse(#[from] toml::de::Error),
    #[error("Database Error")]
    Database(#[from] DatabaseError),
    #[error("Listener task failed")]
    ListenerDied,
}

pub type AssetMinderResult<T> = std::result::Result<T, AssetMinderError>;
