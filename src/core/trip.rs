use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::event::{Location, Severity};

/// Trip lifecycle status
///
/// Transitions are one-directional: `Pending -> Active -> {Completed,
/// Cancelled}`. The terminal states never transition away.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

/// Category of a raised alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    SpeedViolation,
    DeviceError,
    FuelLow,
    BatteryLow,
    SignalLost,
}

/// One alert record, appended to a trip when an alert event is reduced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub timestamp: DateTime<Utc>,
    pub severity: Severity,
    pub message: String,
    pub vehicle_id: String,
    pub trip_id: String,
}

/// Derived, observable state of one trip
///
/// Built exclusively by folding the event stream; `route_path` and `alerts`
/// are append-only, and `progress` never decreases while the trip is active
/// (completion forces it to 100).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripState {
    pub trip_id: String,
    pub vehicle_id: String,
    pub status: TripStatus,

    /// 0-100, clamped
    pub progress: f64,
    pub distance_travelled_km: f64,
    pub planned_distance_km: f64,

    pub current_location: Option<Location>,
    pub current_speed_kmh: f64,
    pub route_path: Vec<Location>,

    /// Last-known values, each updated independently
    pub fuel_level: Option<f64>,
    pub battery_level: Option<f64>,
    pub signal_quality: Option<String>,

    pub alerts: Vec<Alert>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub cancellation_reason: Option<String>,
}

impl TripState {
    /// Fresh state for a trip seen for the first time
    pub fn new(trip_id: String, vehicle_id: String) -> Self {
        Self {
            trip_id,
            vehicle_id,
            status: TripStatus::Pending,
            progress: 0.0,
            distance_travelled_km: 0.0,
            planned_distance_km: 0.0,
            current_location: None,
            current_speed_kmh: 0.0,
            route_path: Vec::new(),
            fuel_level: None,
            battery_level: None,
            signal_quality: None,
            alerts: Vec::new(),
            start_time: None,
            end_time: None,
            cancellation_reason: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, TripStatus::Completed | TripStatus::Cancelled)
    }
}
