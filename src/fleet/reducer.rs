use std::collections::HashMap;

use tracing::debug;

use crate::core::{
    Alert, AlertKind, DeviceStatus, EventKind, Location, Movement, Severity, TelemetryEvent,
    TelemetryReading, TripState, TripStatus,
};
use crate::fleet::FleetMetrics;

/// Event-sourced fleet state
///
/// Folds the delivered event stream into one [`TripState`] per trip, keyed
/// by trip id. The fold is pure: a given event sequence always produces the
/// same final state, however dispatch slices it. Applying an event to an
/// unseen trip implicitly creates its state with defaults.
pub struct FleetTracker {
    trips: HashMap<String, TripState>,
    metrics: FleetMetrics,
}

impl FleetTracker {
    pub fn new() -> Self {
        Self {
            trips: HashMap::new(),
            metrics: FleetMetrics::default(),
        }
    }

    /// Apply one event to its trip's state
    pub fn process_event(&mut self, event: &TelemetryEvent) {
        let trip = self
            .trips
            .entry(event.trip_id.clone())
            .or_insert_with(|| TripState::new(event.trip_id.clone(), event.vehicle_id.clone()));

        match &event.kind {
            EventKind::TripStarted {
                planned_distance_km,
                location,
            } => {
                trip.status = TripStatus::Active;
                trip.start_time = Some(event.timestamp);
                trip.planned_distance_km = planned_distance_km.unwrap_or(0.0);
                trip.current_location = *location;
            }
            EventKind::LocationPing {
                location,
                movement,
                distance_travelled_km,
                signal_quality,
                device,
            } => {
                apply_position_update(
                    trip,
                    location.as_ref(),
                    movement.as_ref(),
                    *distance_travelled_km,
                    signal_quality.as_deref(),
                    device.as_ref(),
                    None,
                );
            }
            EventKind::VehicleTelemetry {
                location,
                movement,
                distance_travelled_km,
                signal_quality,
                device,
                telemetry,
            } => {
                apply_position_update(
                    trip,
                    location.as_ref(),
                    movement.as_ref(),
                    *distance_travelled_km,
                    signal_quality.as_deref(),
                    device.as_ref(),
                    telemetry.as_ref(),
                );
            }
            EventKind::TripCompleted {
                total_distance_km,
                location,
            } => {
                trip.status = TripStatus::Completed;
                trip.end_time = Some(event.timestamp);
                trip.distance_travelled_km = total_distance_km.unwrap_or(0.0);
                trip.current_location = *location;
                trip.progress = 100.0;
            }
            EventKind::TripCancelled {
                distance_completed_km,
                cancellation_reason,
                location,
            } => {
                trip.status = TripStatus::Cancelled;
                trip.end_time = Some(event.timestamp);
                trip.distance_travelled_km = distance_completed_km.unwrap_or(0.0);
                trip.current_location = *location;
                trip.cancellation_reason = cancellation_reason.clone();
            }
            EventKind::SpeedViolation {
                violation_amount_kmh,
                severity,
            } => {
                let message = match violation_amount_kmh {
                    Some(amount) => format!("Speed violation: {} km/h over limit", amount),
                    None => "Speed violation".to_string(),
                };
                push_alert(
                    trip,
                    event,
                    AlertKind::SpeedViolation,
                    severity.unwrap_or(Severity::Moderate),
                    message,
                );
            }
            EventKind::DeviceError {
                error_message,
                severity,
            } => {
                let message = error_message
                    .clone()
                    .unwrap_or_else(|| "Device error detected".to_string());
                push_alert(
                    trip,
                    event,
                    AlertKind::DeviceError,
                    severity.unwrap_or(Severity::Warning),
                    message,
                );
            }
            EventKind::FuelLevelLow { fuel_level_percent } => {
                let message = match fuel_level_percent {
                    Some(level) => format!("Low fuel: {}% remaining", level),
                    None => "Low fuel".to_string(),
                };
                push_alert(trip, event, AlertKind::FuelLow, Severity::Warning, message);
                if let Some(level) = fuel_level_percent {
                    trip.fuel_level = Some(*level);
                }
            }
            EventKind::RefuelingCompleted {
                fuel_level_after_refuel,
            } => {
                if let Some(level) = fuel_level_after_refuel {
                    trip.fuel_level = Some(*level);
                }
            }
            EventKind::BatteryLow {
                battery_level_percent,
            } => {
                let message = match battery_level_percent {
                    Some(level) => format!("Low battery: {}% remaining", level),
                    None => "Low battery".to_string(),
                };
                push_alert(trip, event, AlertKind::BatteryLow, Severity::Warning, message);
                if let Some(level) = battery_level_percent {
                    trip.battery_level = Some(*level);
                }
            }
            EventKind::SignalLost => {
                push_alert(
                    trip,
                    event,
                    AlertKind::SignalLost,
                    Severity::Warning,
                    "GPS signal lost".to_string(),
                );
            }
            EventKind::SignalRecovered {
                signal_quality_after_recovery,
                signal_quality,
            } => {
                if let Some(quality) = signal_quality_after_recovery
                    .clone()
                    .or_else(|| signal_quality.clone())
                {
                    trip.signal_quality = Some(quality);
                }
            }
            EventKind::Unknown => {
                debug!(trip_id = %event.trip_id, "ignoring unrecognized event type");
            }
        }
    }

    pub fn trip(&self, trip_id: &str) -> Option<&TripState> {
        self.trips.get(trip_id)
    }

    pub fn trips(&self) -> &HashMap<String, TripState> {
        &self.trips
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    /// Discard all derived state, e.g. before a seek replays the stream
    pub fn reset(&mut self) {
        self.trips.clear();
        self.metrics = FleetMetrics::default();
    }

    /// Recompute fleet metrics from every trip state and publish the result
    pub fn calculate_fleet_metrics(&mut self) -> &FleetMetrics {
        self.metrics = FleetMetrics::compute(&self.trips);
        &self.metrics
    }

    /// Most recently published metrics
    pub fn metrics(&self) -> &FleetMetrics {
        &self.metrics
    }
}

impl Default for FleetTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared merge for location pings and telemetry frames.
///
/// Nothing is applied without a location fix; last-known fields keep their
/// prior value when the payload omits them.
fn apply_position_update(
    trip: &mut TripState,
    location: Option<&Location>,
    movement: Option<&Movement>,
    distance_travelled_km: Option<f64>,
    signal_quality: Option<&str>,
    device: Option<&DeviceStatus>,
    telemetry: Option<&TelemetryReading>,
) {
    let Some(location) = location else {
        return;
    };
    trip.current_location = Some(*location);
    trip.current_speed_kmh = movement.and_then(|m| m.speed_kmh).unwrap_or(0.0);
    if let Some(distance) = distance_travelled_km {
        trip.distance_travelled_km = distance;
    }
    if let Some(quality) = signal_quality {
        trip.signal_quality = Some(quality.to_string());
    }
    if let Some(battery) = device.and_then(|d| d.battery_level) {
        trip.battery_level = Some(battery);
    }
    trip.route_path.push(*location);
    if let Some(fuel) = telemetry.and_then(|t| t.fuel_level_percent) {
        trip.fuel_level = Some(fuel);
    }
    if trip.planned_distance_km > 0.0 {
        let percent = (trip.distance_travelled_km / trip.planned_distance_km * 100.0).min(100.0);
        if percent > trip.progress {
            trip.progress = percent;
        }
    }
}

fn push_alert(
    trip: &mut TripState,
    event: &TelemetryEvent,
    kind: AlertKind,
    severity: Severity,
    message: String,
) {
    trip.alerts.push(Alert {
        kind,
        timestamp: event.timestamp,
        severity,
        message,
        vehicle_id: event.vehicle_id.clone(),
        trip_id: event.trip_id.clone(),
    });
}
