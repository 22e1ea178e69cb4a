use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A geographic position reported by a vehicle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

/// Movement block carried by location pings and telemetry frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Movement {
    pub speed_kmh: Option<f64>,
}

/// Tracking-device health block
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatus {
    pub battery_level: Option<f64>,
}

/// Vehicle sensor readings carried by telemetry frames
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub fuel_level_percent: Option<f64>,
}

/// Alert severity as reported by the event source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Moderate,
    Critical,
}

/// Event payload, discriminated by the `event_type` tag on the wire.
///
/// Payload fields are optional because source logs omit them freely; the
/// reducer decides per field whether absence means "keep the prior value"
/// or "use a default". Tags this crate does not recognize deserialize to
/// [`EventKind::Unknown`] and are ignored downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EventKind {
    TripStarted {
        planned_distance_km: Option<f64>,
        location: Option<Location>,
    },
    LocationPing {
        location: Option<Location>,
        movement: Option<Movement>,
        distance_travelled_km: Option<f64>,
        signal_quality: Option<String>,
        device: Option<DeviceStatus>,
    },
    VehicleTelemetry {
        location: Option<Location>,
        movement: Option<Movement>,
        distance_travelled_km: Option<f64>,
        signal_quality: Option<String>,
        device: Option<DeviceStatus>,
        telemetry: Option<TelemetryReading>,
    },
    TripCompleted {
        total_distance_km: Option<f64>,
        location: Option<Location>,
    },
    TripCancelled {
        distance_completed_km: Option<f64>,
        cancellation_reason: Option<String>,
        location: Option<Location>,
    },
    SpeedViolation {
        violation_amount_kmh: Option<f64>,
        severity: Option<Severity>,
    },
    DeviceError {
        error_message: Option<String>,
        severity: Option<Severity>,
    },
    FuelLevelLow {
        fuel_level_percent: Option<f64>,
    },
    RefuelingCompleted {
        fuel_level_after_refuel: Option<f64>,
    },
    BatteryLow {
        battery_level_percent: Option<f64>,
    },
    SignalLost,
    SignalRecovered {
        signal_quality_after_recovery: Option<String>,
        signal_quality: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl EventKind {
    /// Wire-format tag for this kind
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::TripStarted { .. } => "trip_started",
            EventKind::LocationPing { .. } => "location_ping",
            EventKind::VehicleTelemetry { .. } => "vehicle_telemetry",
            EventKind::TripCompleted { .. } => "trip_completed",
            EventKind::TripCancelled { .. } => "trip_cancelled",
            EventKind::SpeedViolation { .. } => "speed_violation",
            EventKind::DeviceError { .. } => "device_error",
            EventKind::FuelLevelLow { .. } => "fuel_level_low",
            EventKind::RefuelingCompleted { .. } => "refueling_completed",
            EventKind::BatteryLow { .. } => "battery_low",
            EventKind::SignalLost => "signal_lost",
            EventKind::SignalRecovered { .. } => "signal_recovered",
            EventKind::Unknown => "unknown",
        }
    }

    /// True for the events that end a trip
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EventKind::TripCompleted { .. } | EventKind::TripCancelled { .. }
        )
    }
}

/// A single telemetry event
///
/// `trip_id` and `vehicle_id` identify the trip the event belongs to;
/// `timestamp` is the source of ordering truth. Events are immutable once
/// produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub trip_id: String,
    pub vehicle_id: String,

    /// Absolute instant in UTC
    pub timestamp: DateTime<Utc>,

    #[serde(flatten)]
    pub kind: EventKind,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_payload() {
        let json = r#"{
            "trip_id": "trip_1",
            "vehicle_id": "VH_001",
            "timestamp": "2025-11-03T09:00:00Z",
            "event_type": "trip_started",
            "planned_distance_km": 420.5,
            "location": {"lat": 40.7, "lng": -74.0}
        }"#;

        let event: TelemetryEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.trip_id, "trip_1");
        match event.kind {
            EventKind::TripStarted {
                planned_distance_km,
                location,
            } => {
                assert_eq!(planned_distance_km, Some(420.5));
                assert_eq!(location.unwrap().lat, 40.7);
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn unrecognized_tag_maps_to_unknown() {
        let json = r#"{
            "trip_id": "trip_1",
            "vehicle_id": "VH_001",
            "timestamp": "2025-11-03T09:00:00Z",
            "event_type": "weather_report",
            "temperature_c": -4.0
        }"#;

        let event: TelemetryEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind, EventKind::Unknown);
        assert_eq!(event.kind.name(), "unknown");
    }

    #[test]
    fn missing_payload_fields_are_none() {
        let json = r#"{
            "trip_id": "trip_1",
            "vehicle_id": "VH_001",
            "timestamp": "2025-11-03T09:05:00Z",
            "event_type": "location_ping",
            "location": {"lat": 1.0, "lng": 2.0}
        }"#;

        let event: TelemetryEvent = serde_json::from_str(json).unwrap();
        match event.kind {
            EventKind::LocationPing {
                movement,
                distance_travelled_km,
                ..
            } => {
                assert!(movement.is_none());
                assert!(distance_travelled_km.is_none());
            }
            other => panic!("unexpected kind: {:?}", other),
        }
    }
}
