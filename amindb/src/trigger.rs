//! State/alert trigger: turns freshly recorded health data into asset
//! status transitions and rate-limited critical-health alerts.

use chrono::NaiveDateTime;
use std::collections::HashMap;
use tokio::sync::mpsc::UnboundedSender;

use crate::models::{AssetRecord, AssetStatus, DataSource};

/// Thresholds and windows driving the trigger. Defaults follow the
/// alerting policy: degrade below 28, escalate below 15, recover at 75,
/// alert below 30, judged over a trailing two-hour average, with one
/// alert per asset per fifteen minutes.
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    pub maintenance_threshold: f64,
    pub emergency_threshold: f64,
    pub recovery_threshold: f64,
    pub alert_threshold: f64,
    pub average_window: chrono::Duration,
    pub alert_cooldown: chrono::Duration,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            maintenance_threshold: 28.0,
            emergency_threshold: 15.0,
            recovery_threshold: 75.0,
            alert_threshold: 30.0,
            average_window: chrono::Duration::hours(2),
            alert_cooldown: chrono::Duration::minutes(15),
        }
    }
}

/// Critical-health alert record handed to the external notification
/// sink (in-app notification, email, emergency task creation all live
/// downstream of the channel)
#[derive(Debug, Clone)]
pub struct CriticalHealthAlert {
    pub asset_id: i64,
    pub asset_name: String,
    pub site_id: Option<i64>,
    pub health_score: f64,
    pub recorded_at: NaiveDateTime,
    pub source: DataSource,
}

pub type AlertSink = UnboundedSender<CriticalHealthAlert>;

/// Evaluates policy after every scored history write and after explicit
/// status messages. Owns the per-asset last-alert clock used to collapse
/// alert storms.
pub struct StateAlertTrigger {
    policy: AlertPolicy,
    alerts: AlertSink,
    last_alert: HashMap<i64, NaiveDateTime>,
}

impl StateAlertTrigger {
    pub fn new(policy: AlertPolicy, alerts: AlertSink) -> Self {
        Self {
            policy,
            alerts,
            last_alert: HashMap::new(),
        }
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    /// The status the asset should move to given its trailing average,
    /// with the reason to record. Score-driven transitions only fire
    /// from `operational` (degradation) or `maintenance` (recovery);
    /// operator-selected states are never overridden.
    pub fn planned_transition(
        &self,
        current: AssetStatus,
        rolling_average: Option<f64>,
    ) -> Option<(AssetStatus, String)> {
        let average = rolling_average?;
        match current {
            AssetStatus::Operational if average < self.policy.emergency_threshold => Some((
                AssetStatus::Emergency,
                format!(
                    "Average health {average:.1} below emergency threshold {:.1}",
                    self.policy.emergency_threshold
                ),
            )),
            AssetStatus::Operational if average < self.policy.maintenance_threshold => Some((
                AssetStatus::Maintenance,
                format!(
                    "Average health {average:.1} below maintenance threshold {:.1}",
                    self.policy.maintenance_threshold
                ),
            )),
            AssetStatus::Maintenance if average >= self.policy.recovery_threshold => Some((
                AssetStatus::Operational,
                format!(
                    "Average health {average:.1} recovered past {:.1}",
                    self.policy.recovery_threshold
                ),
            )),
            _ => None,
        }
    }

    /// Emit a critical-health alert for a qualifying score, collapsing
    /// repeats for the same asset inside the cooldown window. Returns
    /// whether an alert actually went out.
    pub fn maybe_alert(
        &mut self,
        asset: &AssetRecord,
        score: f64,
        source: DataSource,
        now: NaiveDateTime,
    ) -> bool {
        if score >= self.policy.alert_threshold {
            return false;
        }

        if let Some(last) = self.last_alert.get(&asset.id) {
            if now - *last < self.policy.alert_cooldown {
                log::debug!(
                    "Suppressing repeat critical-health alert for asset {} (score {score:.1})",
                    asset.id
                );
                return false;
            }
        }

        self.last_alert.insert(asset.id, now);
        let alert = CriticalHealthAlert {
            asset_id: asset.id,
            asset_name: asset.name.clone(),
            site_id: asset.site_id,
            health_score: score,
            recorded_at: now,
            source,
        };
        log::warn!(
            "Critical health alert for asset {} ({}): score {score:.1}",
            asset.id,
            asset.name
        );
        if let Err(e) = self.alerts.send(alert) {
            log::error!("Alert sink closed, dropping alert {e:}");
            return false;
        }
        true
    }
}
