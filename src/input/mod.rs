pub mod csv;
pub mod json;

pub use self::csv::load_csv;
pub use self::json::load_json;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::core::TelemetryEvent;

/// Input format detection result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Json,
    Csv,
    Unknown,
}

/// Detect the format of an event log by sniffing its first bytes
pub fn detect_format(data: &[u8]) -> InputFormat {
    if is_json(data) {
        return InputFormat::Json;
    }
    if is_csv(data) {
        return InputFormat::Csv;
    }
    InputFormat::Unknown
}

fn is_json(data: &[u8]) -> bool {
    data.iter()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| *b == b'[' || *b == b'{')
}

fn is_csv(data: &[u8]) -> bool {
    if data.len() < 10 {
        return false;
    }

    // Look for comma-separated lines near the top of the file
    let sample = std::str::from_utf8(&data[..data.len().min(500)]);
    match sample {
        Ok(text) => text
            .lines()
            .take(5)
            .any(|line| line.chars().filter(|&c| c == ',').count() >= 2),
        Err(_) => false,
    }
}

/// Load one event log, auto-detecting its format
pub fn load_file(path: &Path) -> Result<Vec<TelemetryEvent>> {
    let data =
        fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;

    match detect_format(&data) {
        InputFormat::Json => load_json(path),
        InputFormat::Csv => load_csv(path),
        InputFormat::Unknown => {
            anyhow::bail!("unrecognized event log format: {}", path.display())
        }
    }
}

/// Load every supported event log under `dir` and merge them into one
/// time-sorted stream. Files that fail to load are skipped with a warning,
/// the rest still play.
pub fn load_dir(dir: &Path) -> Result<Vec<TelemetryEvent>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("json") | Some("csv")
            )
        })
        .collect();
    files.sort();

    let mut events = Vec::new();
    for file in files {
        match load_file(&file) {
            Ok(mut batch) => {
                info!(count = batch.len(), file = %file.display(), "loaded event log");
                events.append(&mut batch);
            }
            Err(err) => warn!(%err, file = %file.display(), "skipping event log"),
        }
    }

    Ok(merge_and_sort(events))
}

/// Chronological stable sort: ties keep their original position, so
/// delivery order is deterministic for equal timestamps.
pub fn merge_and_sort(mut events: Vec<TelemetryEvent>) -> Vec<TelemetryEvent> {
    events.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
    events
}
