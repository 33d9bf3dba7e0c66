use serde::{Deserialize, Serialize};

use crate::beacon::RangedBeacon;
use crate::location::{AuthorizationStatus, LocationSample};

/// App lifecycle transitions relevant to sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEvent {
    Foreground,
    Background,
}

/// Every platform callback, as one tagged event.
/// The host shell pushes these into the runtime; each source delivers its
/// own events in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformEvent {
    LocationUpdated {
        sample: LocationSample,
    },
    HeadingUpdated {
        degrees: f64,
    },
    AuthorizationChanged {
        status: AuthorizationStatus,
    },
    RegionEntered {
        identifier: String,
    },
    RegionExited {
        identifier: String,
    },
    /// The platform could not monitor a registered region.
    MonitoringFailed {
        identifier: String,
        reason: String,
    },
    BeaconsRanged {
        region_identifier: String,
        beacons: Vec<RangedBeacon>,
    },
    ConnectivityChanged {
        online: bool,
    },
    Lifecycle {
        event: LifecycleEvent,
    },
}
