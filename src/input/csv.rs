use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;

use crate::core::{EventKind, TelemetryEvent};

/// Load telemetry events from a CSV event log
///
/// Supports flexible column naming:
/// - timestamp,trip_id,vehicle_id,event_type,payload
/// - time,trip,vehicle,type,data
///
/// The payload column, when present, holds the event's type-specific fields
/// as a JSON object. Malformed rows are logged and skipped.
pub fn load_csv(path: &Path) -> Result<Vec<TelemetryEvent>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let columns = detect_columns(&headers)?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trip")
        .to_string();

    let mut events = Vec::new();
    for (index, result) in reader.records().enumerate() {
        let record = result.context("failed to read CSV row")?;

        let raw_timestamp = record.get(columns.time).unwrap_or("").trim();
        let timestamp = match DateTime::parse_from_rfc3339(raw_timestamp) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(err) => {
                warn!(%err, index, timestamp = %raw_timestamp, "skipping row with unparsable timestamp");
                continue;
            }
        };

        let trip_id = non_empty(record.get(columns.trip)).unwrap_or_else(|| stem.clone());
        let vehicle_id =
            non_empty(record.get(columns.vehicle)).unwrap_or_else(|| format!("VH_{}", stem));

        let Some(tag) = non_empty(record.get(columns.event_type)) else {
            warn!(index, "skipping row without an event type");
            continue;
        };
        let payload = columns.payload.and_then(|i| record.get(i));
        let kind = match parse_kind(&tag, payload) {
            Ok(kind) => kind,
            Err(err) => {
                warn!(%err, index, event_type = %tag, "skipping row with malformed payload");
                continue;
            }
        };

        events.push(TelemetryEvent {
            trip_id,
            vehicle_id,
            timestamp,
            kind,
        });
    }

    Ok(events)
}

struct Columns {
    time: usize,
    trip: usize,
    vehicle: usize,
    event_type: usize,
    payload: Option<usize>,
}

/// Detect column indices from CSV headers
fn detect_columns(headers: &csv::StringRecord) -> Result<Columns> {
    Ok(Columns {
        time: find_column(headers, &["timestamp", "time", "ts"])?,
        trip: find_column(headers, &["trip_id", "trip"])?,
        vehicle: find_column(headers, &["vehicle_id", "vehicle"])?,
        event_type: find_column(headers, &["event_type", "type", "event"])?,
        payload: find_column(headers, &["payload", "data", "json"]).ok(),
    })
}

/// Find a column by checking possible names
fn find_column(headers: &csv::StringRecord, names: &[&str]) -> Result<usize> {
    for (index, header) in headers.iter().enumerate() {
        let header_lower = header.to_lowercase();
        if names.iter().any(|&name| header_lower == name) {
            return Ok(index);
        }
    }

    anyhow::bail!("could not find column with names: {:?}", names)
}

fn non_empty(field: Option<&str>) -> Option<String> {
    field
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Combine the type tag and payload JSON into one tagged event kind
fn parse_kind(tag: &str, payload: Option<&str>) -> Result<EventKind> {
    let mut object = match payload {
        Some(raw) if !raw.trim().is_empty() => serde_json::from_str::<Value>(raw)
            .context("payload column is not valid JSON")?,
        _ => Value::Object(Default::default()),
    };
    let map = object
        .as_object_mut()
        .context("payload must be a JSON object")?;
    map.insert("event_type".to_string(), Value::String(tag.to_string()));

    serde_json::from_value(object).context("failed to interpret event payload")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kind_combines_tag_and_payload() {
        let kind = parse_kind(
            "trip_started",
            Some(r#"{"planned_distance_km": 250.0}"#),
        )
        .unwrap();
        match kind {
            EventKind::TripStarted {
                planned_distance_km,
                ..
            } => assert_eq!(planned_distance_km, Some(250.0)),
            other => panic!("unexpected kind: {:?}", other),
        }
    }

    #[test]
    fn parse_kind_without_payload_uses_empty_object() {
        let kind = parse_kind("signal_lost", None).unwrap();
        assert_eq!(kind, EventKind::SignalLost);
    }

    #[test]
    fn parse_kind_maps_unrecognized_tags_to_unknown() {
        let kind = parse_kind("tire_pressure", Some(r#"{"psi": 31.0}"#)).unwrap();
        assert_eq!(kind, EventKind::Unknown);
    }

    #[test]
    fn parse_kind_rejects_non_object_payload() {
        assert!(parse_kind("signal_lost", Some("[1, 2, 3]")).is_err());
        assert!(parse_kind("signal_lost", Some("{not json")).is_err());
    }

    #[test]
    fn detect_columns_accepts_alternate_names() {
        let headers =
            csv::StringRecord::from(vec!["time", "trip", "vehicle", "type", "data"]);
        let columns = detect_columns(&headers).unwrap();
        assert_eq!(columns.time, 0);
        assert_eq!(columns.event_type, 3);
        assert_eq!(columns.payload, Some(4));
    }

    #[test]
    fn detect_columns_requires_a_timestamp() {
        let headers = csv::StringRecord::from(vec!["trip_id", "event_type"]);
        assert!(detect_columns(&headers).is_err());
    }
}
