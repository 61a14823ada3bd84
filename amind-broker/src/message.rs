use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AssetId, DeviceId, Route};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Malformed payload")]
    Json(#[from] serde_json::Error),
}

/// Sensor and environmental readings published on `assets/+/data`.
/// Everything is optional: absent readings contribute nothing downstream,
/// only a payload that fails to decode at all is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceReport {
    pub efficiency: Option<f64>,
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub vibration: Option<f64>,
    pub rpm: Option<f64>,
    pub voltage: Option<f64>,
    pub current: Option<f64>,
    pub power: Option<f64>,
    pub ambient_temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub noise_level: Option<f64>,
}

/// Operational status reported on `assets/+/status`. The `status` field
/// is required; value validation against the asset state machine happens
/// in the ingest layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Device-computed health summary on `assets/+/health`. A numeric
/// `health_score` is the one required field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub health_score: f64,
    #[serde(default)]
    pub performance_score: Option<f64>,
    #[serde(default)]
    pub diagnostics: Option<serde_json::Value>,
}

/// Self-test results on `assets/+/diagnostic`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticReport {
    pub error_codes: Vec<String>,
    pub warnings: Vec<String>,
    pub error_count: Option<u32>,
    pub system_info: Option<serde_json::Value>,
    pub sensor_status: Option<serde_json::Value>,
}

impl DiagnosticReport {
    /// Number of hard errors reported: the explicit count when present,
    /// otherwise the number of error codes
    pub fn errors(&self) -> u32 {
        self.error_count.unwrap_or(self.error_codes.len() as u32)
    }
}

/// Registration announcement on `devices/register`. `device_id` and
/// `asset_id` are required; the full payload is also kept verbatim for
/// audit by the ingest layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRegistration {
    pub device_id: DeviceId,
    pub asset_id: AssetId,
    #[serde(default)]
    pub device_type: Option<String>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub config: Option<serde_json::Value>,
}

/// Liveness ping on `devices/+/heartbeat`; the device id comes from the
/// topic, not the payload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceHeartbeat {
    pub status: Option<String>,
    pub battery_level: Option<f64>,
    pub signal_strength: Option<f64>,
}

/// One routed, parsed inbound message, forwarded to the ingest layer in
/// broker-delivery order
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryMessage {
    Performance {
        asset_id: AssetId,
        report: PerformanceReport,
    },
    Status {
        asset_id: AssetId,
        report: StatusReport,
    },
    Health {
        asset_id: AssetId,
        report: HealthReport,
    },
    Diagnostic {
        asset_id: AssetId,
        report: DiagnosticReport,
    },
    Register {
        registration: DeviceRegistration,
        raw: serde_json::Value,
    },
    Heartbeat {
        device_id: DeviceId,
        report: DeviceHeartbeat,
    },
}

impl TelemetryMessage {
    /// Decode the payload for a matched route. Missing required fields
    /// and malformed JSON both surface as [`ParseError`]; the caller
    /// logs and drops, no partial value escapes.
    pub fn parse(route: Route, payload: &[u8]) -> Result<Self, ParseError> {
        match route {
            Route::AssetData(asset_id) => Ok(Self::Performance {
                asset_id,
                report: serde_json::from_slice(payload)?,
            }),
            Route::AssetStatus(asset_id) => Ok(Self::Status {
                asset_id,
                report: serde_json::from_slice(payload)?,
            }),
            Route::AssetHealth(asset_id) => Ok(Self::Health {
                asset_id,
                report: serde_json::from_slice(payload)?,
            }),
            Route::AssetDiagnostic(asset_id) => Ok(Self::Diagnostic {
                asset_id,
                report: serde_json::from_slice(payload)?,
            }),
            Route::DeviceRegister => {
                let raw: serde_json::Value = serde_json::from_slice(payload)?;
                let registration: DeviceRegistration = serde_json::from_value(raw.clone())?;
                Ok(Self::Register { registration, raw })
            }
            Route::DeviceHeartbeat(device_id) => Ok(Self::Heartbeat {
                device_id,
                report: serde_json::from_slice(payload)?,
            }),
        }
    }
}

/// Outbound command published to `{prefix}/assets/{id}/commands`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandMessage {
    pub command: String,
    pub parameters: serde_json::Value,
    pub issued_at: i64,
}
