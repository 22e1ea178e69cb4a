pub mod metrics;
pub mod reducer;

pub use metrics::{FleetMetrics, MAX_RECENT_ALERTS};
pub use reducer::FleetTracker;
