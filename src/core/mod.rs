pub mod event;
pub mod trip;

pub use event::{DeviceStatus, EventKind, Location, Movement, Severity, TelemetryEvent, TelemetryReading};
pub use trip::{Alert, AlertKind, TripState, TripStatus};
