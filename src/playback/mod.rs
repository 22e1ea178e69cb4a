pub mod clock;
pub mod engine;

pub use clock::VirtualClock;
pub use engine::PlaybackEngine;

use std::time::Duration;

use chrono::Duration as VirtualDuration;
use thiserror::Error;

/// Playback state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Playback configuration
#[derive(Debug, Clone)]
pub struct PlaybackConfig {
    /// Virtual-time multiplier, 1.0 = real-time
    pub speed: f64,

    /// Dispatch poll cadence; fixed, independent of speed
    pub tick_interval: Duration,

    /// Virtual time skipped by a plain fast-forward
    pub fast_forward_skip: VirtualDuration,

    /// Padding past a watched trip's terminal event when fast-forwarding
    pub completion_grace: VirtualDuration,

    /// Trip whose completion fast-forward must not strand mid-stream
    pub watched_trip: Option<String>,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            speed: 1.0,
            tick_interval: Duration::from_millis(100),
            fast_forward_skip: VirtualDuration::hours(1),
            completion_grace: VirtualDuration::seconds(60),
            watched_trip: None,
        }
    }
}

/// Snapshot of engine state for consumers
#[derive(Debug, Clone, PartialEq)]
pub struct EngineStatus {
    pub is_playing: bool,
    pub speed: f64,
    /// Index of the next undelivered event
    pub cursor: usize,
    pub total_events: usize,
    /// Delivered fraction of the event count, 0.0-1.0 (1.0 for an empty stream)
    pub progress: f64,
}

/// Errors from playback control operations
#[derive(Debug, Error, PartialEq)]
pub enum PlaybackError {
    #[error("playback speed must be a positive finite multiplier, got {0}")]
    InvalidSpeed(f64),
}
