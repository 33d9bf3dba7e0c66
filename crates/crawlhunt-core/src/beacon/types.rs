use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse distance bucket reported by the platform.
///
/// Variant order is closeness order: `Immediate < Near < Far < Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Proximity {
    Immediate,
    Near,
    Far,
    Unknown,
}

/// The (namespace, major, minor) triple that identifies one transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BeaconIdentity {
    pub namespace: Uuid,
    pub major: u16,
    pub minor: u16,
}

impl BeaconIdentity {
    pub fn new(namespace: Uuid, major: u16, minor: u16) -> Self {
        Self {
            namespace,
            major,
            minor,
        }
    }
}

/// A beacon namespace the platform monitors, optionally narrowed by major
/// and minor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BeaconRegion {
    pub identifier: String,
    pub namespace: Uuid,
    #[serde(default)]
    pub major: Option<u16>,
    #[serde(default)]
    pub minor: Option<u16>,
}

impl BeaconRegion {
    pub fn new(identifier: impl Into<String>, namespace: Uuid) -> Self {
        Self {
            identifier: identifier.into(),
            namespace,
            major: None,
            minor: None,
        }
    }

    pub fn matches(&self, identity: &BeaconIdentity) -> bool {
        self.namespace == identity.namespace
            && self.major.map_or(true, |major| major == identity.major)
            && self.minor.map_or(true, |minor| minor == identity.minor)
    }
}

/// One beacon from a ranging callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangedBeacon {
    pub namespace: Uuid,
    pub major: u16,
    pub minor: u16,
    pub proximity: Proximity,
    /// Platform distance estimate in meters; negative when unknown.
    #[serde(default)]
    pub accuracy: f64,
    /// Received signal strength in dBm.
    pub rssi: i16,
}

impl RangedBeacon {
    pub fn identity(&self) -> BeaconIdentity {
        BeaconIdentity::new(self.namespace, self.major, self.minor)
    }
}

/// Registry entry for a beacon seen recently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedBeacon {
    pub identity: BeaconIdentity,
    pub proximity: Proximity,
    pub rssi: i16,
    pub accuracy: f64,
    pub last_seen: DateTime<Utc>,
}

/// Entities that can carry a configured beacon (tasks, bar stops).
pub trait BeaconTagged {
    fn beacon_identity(&self) -> Option<BeaconIdentity>;
}

impl BeaconTagged for BeaconIdentity {
    fn beacon_identity(&self) -> Option<BeaconIdentity> {
        Some(*self)
    }
}
