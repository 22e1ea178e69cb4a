//! F.R.E.T. — Fleet Replay & Event Telemetry engine.
//!
//! Replays a time-sorted stream of vehicle telemetry events at a controllable
//! virtual speed and folds the stream into per-trip state plus fleet-wide
//! metrics. Loading and presentation live outside this crate; it consumes an
//! ordered event sequence and publishes derived state snapshots.

pub mod core;
pub mod fleet;
pub mod input;
pub mod playback;
