use chrono::{DateTime, Utc};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::core::TelemetryEvent;
use crate::playback::{
    EngineStatus, PlaybackConfig, PlaybackError, PlaybackState, VirtualClock,
};

type EventCallback = Box<dyn FnMut(&TelemetryEvent, usize)>;
type TickCallback = Box<dyn FnMut(DateTime<Utc>, f64)>;
type ResetCallback = Box<dyn FnMut()>;

/// Playback engine for a time-sorted telemetry stream
///
/// Owns the cursor into the stream and the virtual clock; on every tick it
/// delivers all not-yet-delivered events whose timestamp the clock has
/// reached, in stream order, exactly once. Consumers attach push callbacks
/// for events and tick reports; all engine methods run on one logical
/// thread, so no internal locking exists.
pub struct PlaybackEngine {
    events: Vec<TelemetryEvent>,
    config: PlaybackConfig,
    state: PlaybackState,
    clock: VirtualClock,
    cursor: usize,
    stream_start: Option<DateTime<Utc>>,
    stream_end: Option<DateTime<Utc>>,
    on_event: Option<EventCallback>,
    on_tick: Option<TickCallback>,
    on_replay_reset: Option<ResetCallback>,
}

impl std::fmt::Debug for PlaybackEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackEngine")
            .field("events", &self.events)
            .field("config", &self.config)
            .field("state", &self.state)
            .field("clock", &self.clock)
            .field("cursor", &self.cursor)
            .field("stream_start", &self.stream_start)
            .field("stream_end", &self.stream_end)
            .field("on_event", &self.on_event.as_ref().map(|_| "<callback>"))
            .field("on_tick", &self.on_tick.as_ref().map(|_| "<callback>"))
            .field(
                "on_replay_reset",
                &self.on_replay_reset.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl PlaybackEngine {
    /// Build an engine over `events`, which must already be sorted by
    /// timestamp (the loader's merge pass produces this order).
    pub fn new(events: Vec<TelemetryEvent>) -> Self {
        debug_assert!(
            events.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "event stream must be time-sorted"
        );
        let stream_start = events.first().map(|e| e.timestamp);
        let stream_end = events.last().map(|e| e.timestamp);
        Self {
            clock: VirtualClock::new(stream_start.unwrap_or_else(Utc::now)),
            events,
            config: PlaybackConfig::default(),
            state: PlaybackState::Stopped,
            cursor: 0,
            stream_start,
            stream_end,
            on_event: None,
            on_tick: None,
            on_replay_reset: None,
        }
    }

    /// Build with an explicit config; rejects an invalid initial speed
    pub fn with_config(
        events: Vec<TelemetryEvent>,
        config: PlaybackConfig,
    ) -> Result<Self, PlaybackError> {
        let mut engine = Self::new(events);
        engine.clock.set_speed(config.speed)?;
        engine.config = config;
        Ok(engine)
    }

    /// Callback invoked once per delivered event, in stream order
    pub fn set_on_event(&mut self, callback: impl FnMut(&TelemetryEvent, usize) + 'static) {
        self.on_event = Some(Box::new(callback));
    }

    /// Callback invoked after each tick with `(virtual_instant, progress)`
    /// where progress is the virtual-time fraction in 0.0-1.0
    pub fn set_on_tick(&mut self, callback: impl FnMut(DateTime<Utc>, f64) + 'static) {
        self.on_tick = Some(Box::new(callback));
    }

    /// Callback invoked before a seek or reset replays the stream prefix.
    ///
    /// Derived state downstream accumulates append-only sequences, so it
    /// must be rebuilt from empty before the prefix is re-delivered.
    pub fn set_on_replay_reset(&mut self, callback: impl FnMut() + 'static) {
        self.on_replay_reset = Some(Box::new(callback));
    }

    /// Index of the next undelivered event
    pub fn position(&self) -> usize {
        self.cursor
    }

    pub fn total_events(&self) -> usize {
        self.events.len()
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn speed(&self) -> f64 {
        self.clock.speed()
    }

    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    /// True once every event has been delivered (trivially true when empty)
    pub fn is_complete(&self) -> bool {
        self.cursor >= self.events.len()
    }

    /// First and last timestamps of the stream
    pub fn time_range(&self) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
        (self.stream_start, self.stream_end)
    }

    /// Current virtual instant
    pub fn current_instant(&self) -> DateTime<Utc> {
        self.clock.current_instant()
    }

    /// Start or resume playback.
    ///
    /// A fresh start anchors the clock at the stream's first timestamp;
    /// resuming continues from the paused instant. At end of stream (or on
    /// an empty stream) this is a no-op.
    pub fn play(&mut self) {
        if self.state == PlaybackState::Playing || self.is_complete() {
            return;
        }
        match self.state {
            PlaybackState::Stopped => {
                let Some(start) = self.stream_start else {
                    return;
                };
                self.clock.start(start);
            }
            PlaybackState::Paused => self.clock.resume(),
            PlaybackState::Playing => unreachable!(),
        }
        self.state = PlaybackState::Playing;
    }

    /// Pause playback; virtual time freezes until resumed
    pub fn pause(&mut self) {
        if self.state == PlaybackState::Playing {
            self.clock.pause();
            self.state = PlaybackState::Paused;
        }
    }

    /// Stop and rewind to the beginning, discarding derived state
    pub fn reset(&mut self) {
        self.pause();
        self.state = PlaybackState::Stopped;
        self.cursor = 0;
        if let Some(callback) = self.on_replay_reset.as_mut() {
            callback();
        }
        if let Some(start) = self.stream_start {
            self.clock.seek(start);
            self.emit_tick(start);
        }
    }

    /// Change playback speed without a discontinuity in virtual time
    pub fn set_speed(&mut self, speed: f64) -> Result<(), PlaybackError> {
        self.clock.set_speed(speed)
    }

    /// One dispatch pass: drain every event the clock has reached, then
    /// report the tick. Returns the number of events delivered.
    pub fn tick(&mut self) -> usize {
        if self.state != PlaybackState::Playing {
            return 0;
        }
        let now = self.clock.current_instant();
        let delivered = self.deliver_due(now);
        self.emit_tick(now);
        if self.is_complete() {
            self.clock.pause();
            self.state = PlaybackState::Stopped;
            info!(total = self.events.len(), "playback complete");
        }
        delivered
    }

    /// Jump to `target`, rebuilding derived state by replaying the entire
    /// prefix of events up to `target` from index zero.
    ///
    /// Append-only derived sequences (route paths, alerts) cannot be
    /// assumed correct after an arbitrary jump, so even a forward seek
    /// replays from the start. Playback is left paused at `target`.
    pub fn seek_to_time(&mut self, target: DateTime<Utc>) {
        self.pause();
        if let Some(callback) = self.on_replay_reset.as_mut() {
            callback();
        }
        self.cursor = 0;
        let replayed = self.deliver_due(target);
        debug!(%target, replayed, "seek replayed stream prefix");
        self.clock.seek(target);
        self.state = PlaybackState::Paused;
        self.emit_tick(target);
    }

    /// Skip ahead by the configured duration.
    ///
    /// When a watched trip has a terminal event in the stream, the target
    /// is never earlier than that event plus the completion grace, so the
    /// skip cannot strand the trip's tail mid-delivery.
    pub fn fast_forward(&mut self) {
        if self.events.is_empty() {
            return;
        }
        let current = self.clock.current_instant();
        let mut target = current + self.config.fast_forward_skip;
        if let Some(watched) = &self.config.watched_trip {
            let terminal = self
                .events
                .iter()
                .find(|e| e.trip_id == *watched && e.kind.is_terminal());
            if let Some(event) = terminal {
                let after_completion = event.timestamp + self.config.completion_grace;
                if after_completion > target {
                    target = after_completion;
                }
            }
        }
        debug!(%target, "fast-forwarding");
        self.seek_to_time(target);
    }

    /// Snapshot of playback state for consumers
    pub fn status(&self) -> EngineStatus {
        let progress = if self.events.is_empty() {
            1.0
        } else {
            self.cursor as f64 / self.events.len() as f64
        };
        EngineStatus {
            is_playing: self.is_playing(),
            speed: self.clock.speed(),
            cursor: self.cursor,
            total_events: self.events.len(),
            progress,
        }
    }

    /// Drive playback on the configured tick cadence until every event has
    /// been delivered. The loop never runs two ticks concurrently; pausing
    /// between ticks is cooperative.
    pub async fn run(&mut self) {
        self.play();
        if self.state != PlaybackState::Playing {
            return;
        }
        let mut ticker = interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if self.state != PlaybackState::Playing {
                break;
            }
            self.tick();
            if self.is_complete() {
                break;
            }
        }
    }

    fn deliver_due(&mut self, up_to: DateTime<Utc>) -> usize {
        let mut delivered = 0;
        while self.cursor < self.events.len() && self.events[self.cursor].timestamp <= up_to {
            if let Some(callback) = self.on_event.as_mut() {
                callback(&self.events[self.cursor], self.cursor);
            }
            self.cursor += 1;
            delivered += 1;
        }
        delivered
    }

    fn emit_tick(&mut self, instant: DateTime<Utc>) {
        let fraction = self.progress_fraction(instant);
        if let Some(callback) = self.on_tick.as_mut() {
            callback(instant, fraction);
        }
    }

    fn progress_fraction(&self, instant: DateTime<Utc>) -> f64 {
        let (Some(start), Some(end)) = (self.stream_start, self.stream_end) else {
            return 1.0;
        };
        let total = (end - start).num_milliseconds();
        if total <= 0 {
            return 1.0;
        }
        let elapsed = (instant - start).num_milliseconds();
        (elapsed as f64 / total as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EventKind, Location};
    use crate::fleet::FleetTracker;
    use chrono::{Duration as VirtualDuration, TimeZone};
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::Duration;
    use tokio::time::advance;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 9, 0, 0).unwrap()
    }

    fn ev(trip: &str, offset_secs: i64, kind: EventKind) -> TelemetryEvent {
        TelemetryEvent {
            trip_id: trip.to_string(),
            vehicle_id: "VH_001".to_string(),
            timestamp: t0() + VirtualDuration::seconds(offset_secs),
            kind,
        }
    }

    fn ping(trip: &str, offset_secs: i64, distance_km: f64) -> TelemetryEvent {
        ev(
            trip,
            offset_secs,
            EventKind::LocationPing {
                location: Some(Location { lat: 40.0, lng: -74.0 }),
                movement: None,
                distance_travelled_km: Some(distance_km),
                signal_quality: None,
                device: None,
            },
        )
    }

    fn sample_stream() -> Vec<TelemetryEvent> {
        vec![
            ev(
                "trip_1",
                0,
                EventKind::TripStarted {
                    planned_distance_km: Some(100.0),
                    location: Some(Location { lat: 40.0, lng: -74.0 }),
                },
            ),
            ping("trip_1", 10, 50.0),
            ev(
                "trip_1",
                20,
                EventKind::TripCompleted {
                    total_distance_km: Some(100.0),
                    location: Some(Location { lat: 41.0, lng: -73.0 }),
                },
            ),
        ]
    }

    fn record_deliveries(engine: &mut PlaybackEngine) -> Rc<RefCell<Vec<usize>>> {
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&delivered);
        engine.set_on_event(move |_, index| sink.borrow_mut().push(index));
        delivered
    }

    #[tokio::test(start_paused = true)]
    async fn tick_delivers_due_events_in_order_exactly_once() {
        let mut engine = PlaybackEngine::new(sample_stream());
        let delivered = record_deliveries(&mut engine);

        engine.play();
        engine.tick();
        assert_eq!(*delivered.borrow(), vec![0]);

        advance(Duration::from_secs(10)).await;
        engine.tick();
        assert_eq!(*delivered.borrow(), vec![0, 1]);

        advance(Duration::from_secs(10)).await;
        engine.tick();
        assert_eq!(*delivered.borrow(), vec![0, 1, 2]);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(engine.is_complete());

        // no further delivery after completion
        advance(Duration::from_secs(60)).await;
        assert_eq!(engine.tick(), 0);
        assert_eq!(delivered.borrow().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn no_event_delivered_before_its_timestamp() {
        let mut engine = PlaybackEngine::new(sample_stream());
        let delivered = record_deliveries(&mut engine);

        engine.play();
        engine.tick();
        advance(Duration::from_secs(5)).await;
        engine.tick();
        assert_eq!(*delivered.borrow(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn high_speed_drains_everything_in_one_tick() {
        let config = PlaybackConfig {
            speed: 3600.0,
            ..PlaybackConfig::default()
        };
        let mut engine = PlaybackEngine::with_config(sample_stream(), config).unwrap();
        let delivered = record_deliveries(&mut engine);

        engine.play();
        advance(Duration::from_secs(1)).await;
        engine.tick();
        assert_eq!(*delivered.borrow(), vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_holds_the_cursor_until_resumed() {
        let mut engine = PlaybackEngine::new(sample_stream());
        let delivered = record_deliveries(&mut engine);

        engine.play();
        advance(Duration::from_secs(10)).await;
        engine.tick();
        assert_eq!(delivered.borrow().len(), 2);

        engine.pause();
        advance(Duration::from_secs(600)).await;
        assert_eq!(engine.tick(), 0);

        engine.play();
        engine.tick();
        assert_eq!(delivered.borrow().len(), 2);

        advance(Duration::from_secs(10)).await;
        engine.tick();
        assert_eq!(delivered.borrow().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn tick_reports_virtual_time_fraction() {
        let mut engine = PlaybackEngine::new(sample_stream());
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reports);
        engine.set_on_tick(move |instant, fraction| sink.borrow_mut().push((instant, fraction)));

        engine.play();
        advance(Duration::from_secs(10)).await;
        engine.tick();

        let (instant, fraction) = *reports.borrow().last().unwrap();
        assert_eq!(instant, t0() + VirtualDuration::seconds(10));
        assert!((fraction - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_stream_is_immediately_complete() {
        let mut engine = PlaybackEngine::new(Vec::new());
        engine.play();
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert!(engine.is_complete());
        assert_eq!(engine.status().progress, 1.0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_plays_stream_to_completion() {
        let config = PlaybackConfig {
            speed: 100.0,
            ..PlaybackConfig::default()
        };
        let mut engine = PlaybackEngine::with_config(sample_stream(), config).unwrap();
        let delivered = record_deliveries(&mut engine);

        engine.run().await;
        assert_eq!(*delivered.borrow(), vec![0, 1, 2]);
        assert!(engine.is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn run_returns_immediately_for_empty_stream() {
        let mut engine = PlaybackEngine::new(Vec::new());
        engine.run().await;
        assert!(engine.is_complete());
    }

    #[test]
    fn seek_is_equivalent_to_replay_from_empty_state() {
        let stream = sample_stream();
        let target = t0() + VirtualDuration::seconds(10);

        // reference: plain fold of the prefix into a fresh tracker
        let mut reference = FleetTracker::new();
        for event in stream.iter().filter(|e| e.timestamp <= target) {
            reference.process_event(event);
        }

        let tracker = Rc::new(RefCell::new(FleetTracker::new()));
        let mut engine = PlaybackEngine::new(stream);
        let sink = Rc::clone(&tracker);
        engine.set_on_event(move |event, _| sink.borrow_mut().process_event(event));
        let resets = Rc::clone(&tracker);
        engine.set_on_replay_reset(move || resets.borrow_mut().reset());

        engine.seek_to_time(target);
        assert_eq!(*tracker.borrow().trips(), *reference.trips());

        // re-seeking to the same instant is a no-op on derived state
        engine.seek_to_time(target);
        assert_eq!(*tracker.borrow().trips(), *reference.trips());
        assert_eq!(engine.position(), 2);
    }

    #[test]
    fn backward_seek_still_replays_from_the_start() {
        let stream = sample_stream();
        let tracker = Rc::new(RefCell::new(FleetTracker::new()));
        let mut engine = PlaybackEngine::new(stream);
        let sink = Rc::clone(&tracker);
        engine.set_on_event(move |event, _| sink.borrow_mut().process_event(event));
        let resets = Rc::clone(&tracker);
        engine.set_on_replay_reset(move || resets.borrow_mut().reset());

        engine.seek_to_time(t0() + VirtualDuration::seconds(30));
        assert_eq!(engine.position(), 3);

        engine.seek_to_time(t0() + VirtualDuration::seconds(5));
        assert_eq!(engine.position(), 1);
        let tracker = tracker.borrow();
        let trip = tracker.trip("trip_1").unwrap();
        // only trip_started replayed: no pings, no route points
        assert!(trip.route_path.is_empty());
        assert_eq!(trip.distance_travelled_km, 0.0);
    }

    #[test]
    fn fast_forward_respects_watched_trip_grace() {
        // watched trip completes 65 min in, so the plain 1 h skip would
        // land before completion + grace and strand the tail
        let completion_offset: i64 = 65 * 60;
        let stream = vec![
            ev(
                "trip_w",
                0,
                EventKind::TripStarted {
                    planned_distance_km: Some(10.0),
                    location: None,
                },
            ),
            ev(
                "trip_w",
                completion_offset,
                EventKind::TripCompleted {
                    total_distance_km: Some(10.0),
                    location: None,
                },
            ),
            ping("trip_other", 2 * 3600, 1.0),
        ];
        let config = PlaybackConfig {
            watched_trip: Some("trip_w".to_string()),
            ..PlaybackConfig::default()
        };
        let mut engine = PlaybackEngine::with_config(stream, config).unwrap();
        let reports = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&reports);
        engine.set_on_tick(move |instant, _| sink.borrow_mut().push(instant));

        engine.fast_forward();

        // completion + 60 s grace is later than the plain 1 h skip
        let expected = t0() + VirtualDuration::seconds(completion_offset + 60);
        assert_eq!(*reports.borrow().last().unwrap(), expected);
        assert_eq!(engine.position(), 2);
    }

    #[test]
    fn fast_forward_without_watched_trip_uses_plain_skip() {
        let stream = vec![
            ping("trip_1", 0, 0.0),
            ping("trip_1", 30 * 60, 1.0),
            ping("trip_1", 2 * 3600, 2.0),
        ];
        let mut engine = PlaybackEngine::new(stream);
        engine.fast_forward();
        // events up to start + 1 h delivered, later ones not
        assert_eq!(engine.position(), 2);
    }

    #[test]
    fn invalid_initial_speed_is_rejected() {
        let config = PlaybackConfig {
            speed: 0.0,
            ..PlaybackConfig::default()
        };
        let err = PlaybackEngine::with_config(sample_stream(), config).unwrap_err();
        assert_eq!(err, PlaybackError::InvalidSpeed(0.0));
    }

    #[tokio::test(start_paused = true)]
    async fn reset_rewinds_and_discards_derived_state() {
        let tracker = Rc::new(RefCell::new(FleetTracker::new()));
        let mut engine = PlaybackEngine::new(sample_stream());
        let sink = Rc::clone(&tracker);
        engine.set_on_event(move |event, _| sink.borrow_mut().process_event(event));
        let resets = Rc::clone(&tracker);
        engine.set_on_replay_reset(move || resets.borrow_mut().reset());

        engine.play();
        advance(Duration::from_secs(30)).await;
        engine.tick();
        assert!(engine.is_complete());

        engine.reset();
        assert_eq!(engine.position(), 0);
        assert_eq!(engine.state(), PlaybackState::Stopped);
        assert_eq!(tracker.borrow().trip_count(), 0);

        // a fresh play starts over from the stream start
        let delivered = record_deliveries(&mut engine);
        engine.play();
        engine.tick();
        assert_eq!(*delivered.borrow(), vec![0]);
    }

    #[test]
    fn status_reports_delivered_fraction() {
        let mut engine = PlaybackEngine::new(sample_stream());
        engine.seek_to_time(t0() + VirtualDuration::seconds(10));
        let status = engine.status();
        assert_eq!(status.cursor, 2);
        assert_eq!(status.total_events, 3);
        assert!((status.progress - 2.0 / 3.0).abs() < 1e-9);
        assert!(!status.is_playing);
    }
}
