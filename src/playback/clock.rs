use chrono::{DateTime, Duration as VirtualDuration, Utc};
use tokio::time::Instant;

use crate::playback::PlaybackError;

/// Maps wall-clock progress onto the event stream's timeline.
///
/// The current virtual instant is `V0 + S * (now - A)` where `V0` is the
/// anchor virtual instant, `A` the anchor wall instant and `S` the speed
/// multiplier. Every control operation that could introduce a discontinuity
/// (pause, resume, speed change) re-anchors so the computed instant is
/// preserved across the call; only `seek` moves it.
#[derive(Debug, Clone)]
pub struct VirtualClock {
    anchor_wall: Instant,
    anchor_virtual: DateTime<Utc>,
    speed: f64,
    running: bool,
}

impl VirtualClock {
    /// New paused clock anchored at `origin`
    pub fn new(origin: DateTime<Utc>) -> Self {
        Self {
            anchor_wall: Instant::now(),
            anchor_virtual: origin,
            speed: 1.0,
            running: false,
        }
    }

    /// Start advancing from `stream_start`
    pub fn start(&mut self, stream_start: DateTime<Utc>) {
        self.anchor_virtual = stream_start;
        self.anchor_wall = Instant::now();
        self.running = true;
    }

    /// Current virtual instant; pure read
    pub fn current_instant(&self) -> DateTime<Utc> {
        if !self.running {
            return self.anchor_virtual;
        }
        self.anchor_virtual + scale(self.anchor_wall.elapsed(), self.speed)
    }

    /// Freeze virtual time. Pausing an already paused clock is a no-op.
    pub fn pause(&mut self) {
        if self.running {
            self.anchor_virtual = self.current_instant();
            self.running = false;
        }
    }

    /// Continue from the frozen instant without a jump. No-op while running.
    pub fn resume(&mut self) {
        if !self.running {
            self.anchor_wall = Instant::now();
            self.running = true;
        }
    }

    /// Change the multiplier, keeping the current virtual instant fixed.
    ///
    /// Zero, negative and non-finite multipliers are rejected with no state
    /// change; they must never reach the scheduling math.
    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlaybackError> {
        if !speed.is_finite() || speed <= 0.0 {
            return Err(PlaybackError::InvalidSpeed(speed));
        }
        self.anchor_virtual = self.current_instant();
        self.anchor_wall = Instant::now();
        self.speed = speed;
        Ok(())
    }

    /// Jump to `target`, discarding the prior anchor
    pub fn seek(&mut self, target: DateTime<Utc>) {
        self.anchor_virtual = target;
        self.anchor_wall = Instant::now();
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

fn scale(elapsed: std::time::Duration, speed: f64) -> VirtualDuration {
    VirtualDuration::milliseconds((elapsed.as_secs_f64() * speed * 1000.0) as i64)
}
