//! Realtime snapshot cache: the latest performance/health reading per
//! asset plus a capped recent-updates list, consumed by dashboards.
//! Entries expire after a short TTL so a quiet asset drops off rather
//! than presenting stale data as live.

use chrono::NaiveDateTime;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::models::HealthStatus;

/// One dashboard-facing reading
#[derive(Debug, Clone)]
pub struct AssetSnapshot {
    pub asset_id: i64,
    pub health_score: Option<f64>,
    pub health_status: Option<HealthStatus>,
    pub readings: serde_json::Value,
    pub recorded_at: NaiveDateTime,
}

struct CacheInner {
    latest: HashMap<i64, AssetSnapshot>,
    recent: VecDeque<AssetSnapshot>,
}

pub struct RealtimeCache {
    inner: Mutex<CacheInner>,
    ttl: chrono::Duration,
    recent_capacity: usize,
}

impl RealtimeCache {
    pub fn new(ttl: chrono::Duration, recent_capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner {
                latest: HashMap::new(),
                recent: VecDeque::with_capacity(recent_capacity),
            }),
            ttl,
            recent_capacity,
        }
    }

    pub fn publish(&self, snapshot: AssetSnapshot) {
        let mut inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if inner.recent.len() == self.recent_capacity {
            inner.recent.pop_front();
        }
        inner.recent.push_back(snapshot.clone());
        inner.latest.insert(snapshot.asset_id, snapshot);
    }

    /// Latest reading for one asset, if it is fresh enough
    pub fn latest(&self, asset_id: i64, now: NaiveDateTime) -> Option<AssetSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner
            .latest
            .get(&asset_id)
            .filter(|snapshot| now - snapshot.recorded_at <= self.ttl)
            .cloned()
    }

    /// Recent updates across all assets, oldest first, expired entries
    /// filtered out
    pub fn recent(&self, now: NaiveDateTime) -> Vec<AssetSnapshot> {
        let inner = self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        inner
            .recent
            .iter()
            .filter(|snapshot| now - snapshot.recorded_at <= self.ttl)
            .cloned()
            .collect()
    }
}
