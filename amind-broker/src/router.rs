use chrono::NaiveDateTime;
use std::collections::VecDeque;

use crate::{AssetId, DeviceId, MESSAGE_LOG_CAPACITY};

/// Destination of one inbound message, with the asset/device id path
/// parameter extracted from the topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    AssetData(AssetId),
    AssetStatus(AssetId),
    AssetHealth(AssetId),
    AssetDiagnostic(AssetId),
    DeviceRegister,
    DeviceHeartbeat(DeviceId),
}

/// Explicit routing table mapping the subscribed topic patterns to
/// [`Route`]s. Routing is independent of the transport so it can be
/// exercised without a broker.
#[derive(Debug, Clone)]
pub struct TopicTable {
    prefix: String,
}

impl TopicTable {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_matches('/').to_string(),
        }
    }

    /// Wildcard patterns to subscribe, in registration order
    pub fn subscriptions(&self) -> Vec<String> {
        [
            "assets/+/data",
            "assets/+/status",
            "assets/+/health",
            "assets/+/diagnostic",
            "devices/register",
            "devices/+/heartbeat",
        ]
        .iter()
        .map(|pattern| self.prefixed(pattern))
        .collect()
    }

    pub fn command_topic(&self, asset_id: AssetId) -> String {
        self.prefixed(&format!("assets/{asset_id}/commands"))
    }

    fn prefixed(&self, suffix: &str) -> String {
        if self.prefix.is_empty() {
            suffix.to_string()
        } else {
            format!("{}/{}", self.prefix, suffix)
        }
    }

    /// Match a concrete topic against the table. Topics outside the
    /// prefix, with non-numeric asset ids, or with an unknown shape
    /// return `None` and are dropped by the caller.
    pub fn route(&self, topic: &str) -> Option<Route> {
        let rest = if self.prefix.is_empty() {
            topic
        } else {
            topic
                .strip_prefix(self.prefix.as_str())?
                .strip_prefix('/')?
        };

        let segments: Vec<&str> = rest.split('/').collect();
        match segments.as_slice() {
            ["assets", id, kind] => {
                let asset_id: AssetId = id.parse().ok()?;
                match *kind {
                    "data" => Some(Route::AssetData(asset_id)),
                    "status" => Some(Route::AssetStatus(asset_id)),
                    "health" => Some(Route::AssetHealth(asset_id)),
                    "diagnostic" => Some(Route::AssetDiagnostic(asset_id)),
                    _ => None,
                }
            }
            ["devices", "register"] => Some(Route::DeviceRegister),
            ["devices", id, "heartbeat"] if !id.is_empty() => {
                Some(Route::DeviceHeartbeat((*id).to_string()))
            }
            _ => None,
        }
    }
}

/// One raw inbound message as delivered by the broker
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub topic: String,
    pub payload: Vec<u8>,
    pub received_at: NaiveDateTime,
}

/// Short-lived ring of raw inbound messages, appended before handler
/// dispatch, kept for debugging/replay
#[derive(Debug)]
pub struct MessageLog {
    entries: VecDeque<RawMessage>,
    capacity: usize,
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(MESSAGE_LOG_CAPACITY)
    }
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, topic: String, payload: Vec<u8>) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(RawMessage {
            topic,
            payload,
            received_at: chrono::Local::now().naive_local(),
        });
    }

    pub fn recent(&self) -> impl Iterator<Item = &RawMessage> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
