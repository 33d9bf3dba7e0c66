use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geo::Coordinate;

/// Location permission as reported by the platform.
///
/// `Denied` and `Restricted` stay put until the user changes OS settings,
/// which the platform reports as a fresh `authorization_changed` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    #[default]
    NotDetermined,
    AuthorizedWhenInUse,
    AuthorizedAlways,
    Denied,
    Restricted,
}

impl AuthorizationStatus {
    pub fn is_authorized(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::AuthorizedWhenInUse | AuthorizationStatus::AuthorizedAlways
        )
    }

    /// Denied or restricted: no prompt will change it.
    pub fn is_refused(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted
        )
    }
}

/// One position fix from the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub coordinate: Coordinate,
    /// Meters above sea level.
    #[serde(default)]
    pub altitude: f64,
    /// Radius of uncertainty in meters. Negative means the fix is invalid.
    pub horizontal_accuracy: f64,
    #[serde(default)]
    pub vertical_accuracy: f64,
    /// Course in degrees from true north, when the platform provides one.
    #[serde(default)]
    pub heading: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    /// A sample with only a coordinate and timestamp, 5 m accuracy.
    pub fn at(coordinate: Coordinate, timestamp: DateTime<Utc>) -> Self {
        Self {
            coordinate,
            altitude: 0.0,
            horizontal_accuracy: 5.0,
            vertical_accuracy: 5.0,
            heading: None,
            timestamp,
        }
    }
}

/// Everything the location engine publishes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocationSnapshot {
    pub authorization_status: AuthorizationStatus,
    pub current_location: Option<LocationSample>,
    /// Latest heading in degrees (from heading updates or the last sample).
    pub heading: Option<f64>,
    pub is_updating: bool,
}
