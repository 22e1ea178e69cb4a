use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::core::{EventKind, TelemetryEvent};

/// One record as it appears on disk, before timestamp validation
#[derive(Debug, Deserialize)]
struct RawEvent {
    timestamp: Option<String>,
    trip_id: Option<String>,
    vehicle_id: Option<String>,
    #[serde(flatten)]
    kind: EventKind,
}

/// Load telemetry events from a JSON trip file (an array of event records).
///
/// Records with missing or unparsable timestamps are logged and skipped,
/// never fatal; the rest of the file still loads. All records in one file
/// belong to one trip, so records missing identity fields inherit the first
/// record's ids (falling back to the file stem).
pub fn load_json(path: &Path) -> Result<Vec<TelemetryEvent>> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let records: Vec<Value> = serde_json::from_str(&text)
        .with_context(|| format!("{} is not a JSON array of events", path.display()))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("trip")
        .to_string();

    Ok(parse_records(records, &stem))
}

fn parse_records(records: Vec<Value>, fallback_id: &str) -> Vec<TelemetryEvent> {
    let mut file_trip_id: Option<String> = None;
    let mut file_vehicle_id: Option<String> = None;
    let mut events = Vec::with_capacity(records.len());

    for (index, record) in records.into_iter().enumerate() {
        let raw: RawEvent = match serde_json::from_value(record) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(%err, index, "skipping malformed event record");
                continue;
            }
        };

        let Some(raw_timestamp) = raw.timestamp else {
            warn!(index, "skipping event record without a timestamp");
            continue;
        };
        let timestamp = match DateTime::parse_from_rfc3339(&raw_timestamp) {
            Ok(parsed) => parsed.with_timezone(&Utc),
            Err(err) => {
                warn!(%err, index, timestamp = %raw_timestamp, "skipping event with unparsable timestamp");
                continue;
            }
        };

        // file-level identity is fixed by the first valid record
        let trip_id = file_trip_id
            .get_or_insert_with(|| {
                raw.trip_id
                    .clone()
                    .unwrap_or_else(|| fallback_id.to_string())
            })
            .clone();
        let vehicle_id = file_vehicle_id
            .get_or_insert_with(|| {
                raw.vehicle_id
                    .clone()
                    .unwrap_or_else(|| format!("VH_{}", fallback_id))
            })
            .clone();

        events.push(TelemetryEvent {
            trip_id,
            vehicle_id,
            timestamp,
            kind: raw.kind,
        });
    }

    events
}
