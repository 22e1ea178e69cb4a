use std::collections::HashMap;

use serde::Serialize;

use crate::core::{Alert, TripState, TripStatus};

/// How many alerts the fleet-wide view retains
pub const MAX_RECENT_ALERTS: usize = 10;

/// Fleet-wide aggregate over all trip states
///
/// Always recomputed wholesale from the full trip mapping; incremental
/// patching would compound rounding and consistency drift.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FleetMetrics {
    pub total_trips: usize,
    pub active_trips: usize,
    pub completed_trips: usize,
    pub cancelled_trips: usize,
    pub total_distance_km: f64,
    /// Mean of strictly positive current speeds; idle and unknown-speed
    /// trips are excluded from the average, not counted as zero
    pub average_speed_kmh: f64,
    /// Most recent alerts fleet-wide, oldest first
    pub alerts: Vec<Alert>,
}

impl FleetMetrics {
    /// Aggregate every trip state into one fleet snapshot
    pub fn compute(trips: &HashMap<String, TripState>) -> Self {
        let mut metrics = FleetMetrics {
            total_trips: trips.len(),
            ..FleetMetrics::default()
        };

        let mut speed_sum = 0.0;
        let mut speed_count = 0usize;
        let mut alerts: Vec<Alert> = Vec::new();

        for trip in trips.values() {
            match trip.status {
                TripStatus::Active => metrics.active_trips += 1,
                TripStatus::Completed => metrics.completed_trips += 1,
                TripStatus::Cancelled => metrics.cancelled_trips += 1,
                TripStatus::Pending => {}
            }

            metrics.total_distance_km += trip.distance_travelled_km;

            if trip.current_speed_kmh > 0.0 {
                speed_sum += trip.current_speed_kmh;
                speed_count += 1;
            }

            alerts.extend(trip.alerts.iter().cloned());
        }

        if speed_count > 0 {
            metrics.average_speed_kmh = speed_sum / speed_count as f64;
        }

        // Map iteration order is arbitrary; order by alert time before
        // trimming so "most recent" is deterministic.
        alerts.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        if alerts.len() > MAX_RECENT_ALERTS {
            alerts.drain(..alerts.len() - MAX_RECENT_ALERTS);
        }
        metrics.alerts = alerts;

        metrics
    }
}
