//! Short-range beacon proximity.
//!
//! Ranging is expensive, so it only runs while the user is inside a beacon
//! region: the region-enter event turns it on, the matching exit turns it off.

mod engine;
mod types;

pub use engine::{BeaconEngine, BeaconSnapshot, MonitoringState};
pub use types::{BeaconIdentity, BeaconRegion, BeaconTagged, DetectedBeacon, Proximity, RangedBeacon};
