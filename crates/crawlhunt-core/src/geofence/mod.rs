//! Circular region registration and enter/exit tracking.

mod engine;
mod region;

pub use engine::{GeofenceEngine, GeofenceSnapshot};
pub use region::MonitoredRegion;
