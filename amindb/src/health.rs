//! Health scoring engine: pure, deterministic derivation of a 0-100
//! score and its categorical banding from performance, environmental,
//! and diagnostic readings. No I/O, no clock, no side effects.

use amind_broker::{DiagnosticReport, PerformanceReport};

use crate::models::{HealthStatus, Severity};

// Penalty constants. Each penalty is independent and additive; the final
// clamp is the only place negative accumulation is corrected.
const EFFICIENCY_FLOOR: f64 = 90.0;
const EFFICIENCY_PENALTY_PER_POINT: f64 = 2.0;
const TEMP_HARD_RANGE: (f64, f64) = (-10.0, 60.0);
const TEMP_SOFT_RANGE: (f64, f64) = (0.0, 45.0);
const TEMP_HARD_PENALTY: f64 = 15.0;
const TEMP_SOFT_PENALTY: f64 = 5.0;
const VIBRATION_HARD_LIMIT: f64 = 10.0;
const VIBRATION_SOFT_LIMIT: f64 = 5.0;
const VIBRATION_HARD_PENALTY: f64 = 20.0;
const VIBRATION_SOFT_PENALTY: f64 = 10.0;
const ERROR_PENALTY_EACH: f64 = 5.0;
const ERROR_PENALTY_CAP: f64 = 30.0;

/// The readings the score is derived from. Absent readings contribute no
/// penalty.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct HealthInputs {
    pub efficiency: Option<f64>,
    pub temperature: Option<f64>,
    pub vibration: Option<f64>,
    pub error_count: u32,
}

impl From<&PerformanceReport> for HealthInputs {
    fn from(report: &PerformanceReport) -> Self {
        Self {
            efficiency: report.efficiency,
            // the machine reading feeds the penalty; ambient temperature
            // is environmental context only
            temperature: report.temperature,
            vibration: report.vibration,
            error_count: 0,
        }
    }
}

/// Derive the health score: start at 100, apply independent additive
/// penalties, clamp to [0, 100] at the end
pub fn health_score(inputs: &HealthInputs) -> f64 {
    let mut score = 100.0;

    if let Some(efficiency) = inputs.efficiency {
        if efficiency < EFFICIENCY_FLOOR {
            score -= (EFFICIENCY_FLOOR - efficiency) * EFFICIENCY_PENALTY_PER_POINT;
        }
    }

    if let Some(temperature) = inputs.temperature {
        if !(TEMP_HARD_RANGE.0..=TEMP_HARD_RANGE.1).contains(&temperature) {
            score -= TEMP_HARD_PENALTY;
        } else if !(TEMP_SOFT_RANGE.0..=TEMP_SOFT_RANGE.1).contains(&temperature) {
            score -= TEMP_SOFT_PENALTY;
        }
    }

    if let Some(vibration) = inputs.vibration {
        if vibration > VIBRATION_HARD_LIMIT {
            score -= VIBRATION_HARD_PENALTY;
        } else if vibration > VIBRATION_SOFT_LIMIT {
            score -= VIBRATION_SOFT_PENALTY;
        }
    }

    if inputs.error_count > 0 {
        score -= (f64::from(inputs.error_count) * ERROR_PENALTY_EACH).min(ERROR_PENALTY_CAP);
    }

    score.clamp(0.0, 100.0)
}

impl HealthStatus {
    /// Categorize a score. The bands are a monotonic step function:
    /// >=90 excellent, >=75 good, >=60 fair, >=40 poor, else critical.
    pub fn from_score(score: f64) -> Self {
        if score >= 90.0 {
            HealthStatus::Excellent
        } else if score >= 75.0 {
            HealthStatus::Good
        } else if score >= 60.0 {
            HealthStatus::Fair
        } else if score >= 40.0 {
            HealthStatus::Poor
        } else {
            HealthStatus::Critical
        }
    }
}

/// Severity of a diagnostic scan, in priority order: any error code is
/// critical, more than three warnings is warning, any warning is info,
/// otherwise normal
pub fn diagnostic_severity(report: &DiagnosticReport) -> Severity {
    if !report.error_codes.is_empty() {
        Severity::Critical
    } else if report.warnings.len() > 3 {
        Severity::Warning
    } else if !report.warnings.is_empty() {
        Severity::Info
    } else {
        Severity::Normal
    }
}

/// A scan is anomalous when it carries any error code or more than two
/// warnings
pub fn diagnostic_anomaly(report: &DiagnosticReport) -> bool {
    !report.error_codes.is_empty() || report.warnings.len() > 2
}
