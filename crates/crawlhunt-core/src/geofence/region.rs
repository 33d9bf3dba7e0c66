use serde::{Deserialize, Serialize};

use crate::error::GeofenceError;
use crate::geo::Coordinate;

/// A named circle the platform watches for entry and exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredRegion {
    pub identifier: String,
    pub center: Coordinate,
    /// Radius in meters, always > 0.
    pub radius: f64,
}

impl MonitoredRegion {
    pub fn new(identifier: impl Into<String>, center: Coordinate, radius: f64) -> Self {
        Self {
            identifier: identifier.into(),
            center,
            radius,
        }
    }

    pub fn validate(&self) -> Result<(), GeofenceError> {
        if self.identifier.trim().is_empty() {
            return Err(GeofenceError::EmptyIdentifier);
        }
        if !self.radius.is_finite() || self.radius <= 0.0 {
            return Err(GeofenceError::InvalidRadius(self.radius));
        }
        if !self.center.is_valid() {
            return Err(GeofenceError::InvalidCoordinate {
                latitude: self.center.latitude,
                longitude: self.center.longitude,
            });
        }
        Ok(())
    }

    /// Whether `point` lies inside the circle (boundary inclusive).
    pub fn contains(&self, point: &Coordinate) -> bool {
        self.center.distance_to(point) <= self.radius
    }
}
