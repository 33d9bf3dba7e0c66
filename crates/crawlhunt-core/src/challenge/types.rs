use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::beacon::{BeaconIdentity, BeaconTagged};
use crate::geo::Coordinate;
use crate::geofence::MonitoredRegion;

/// A team playing a hunt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
}

impl Team {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
        }
    }
}

/// A task inside a hunt: authored ahead of time, or dynamic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HuntTask {
    pub id: Uuid,
    pub hunt_id: Uuid,
    pub title: String,
    pub points: u32,
    #[serde(default)]
    pub coordinate: Option<Coordinate>,
    /// Verification radius in meters around `coordinate`.
    #[serde(default)]
    pub radius: Option<f64>,
    #[serde(default)]
    pub beacon: Option<BeaconIdentity>,
    #[serde(default)]
    pub is_dynamic: bool,
    /// Set for team-scoped tasks; only that team sees them.
    #[serde(default)]
    pub team_id: Option<Uuid>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_completed: bool,
}

impl HuntTask {
    /// An authored (non-dynamic) task with no location binding.
    pub fn authored(hunt_id: Uuid, title: impl Into<String>, points: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            hunt_id,
            title: title.into(),
            points,
            coordinate: None,
            radius: None,
            beacon: None,
            is_dynamic: false,
            team_id: None,
            expires_at: None,
            is_completed: false,
        }
    }

    /// The geofence to register for this task, if it is location-bound.
    pub fn region(&self) -> Option<MonitoredRegion> {
        let center = self.coordinate?;
        let radius = self.radius?;
        Some(MonitoredRegion::new(format!("task-{}", self.id), center, radius))
    }
}

impl BeaconTagged for HuntTask {
    fn beacon_identity(&self) -> Option<BeaconIdentity> {
        self.beacon
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hunt {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub tasks: Vec<HuntTask>,
}

impl Hunt {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tasks: Vec::new(),
        }
    }

    /// Add a generated challenge to the task collection.
    pub fn attach_challenge(&mut self, challenge: DynamicChallenge) -> &HuntTask {
        self.tasks.push(challenge.into_task());
        &self.tasks[self.tasks.len() - 1]
    }
}

/// A venue on a bar crawl.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarStop {
    pub id: Uuid,
    pub name: String,
    pub coordinate: Coordinate,
    /// Check-in radius in meters.
    pub radius: f64,
    #[serde(default)]
    pub beacon: Option<BeaconIdentity>,
}

impl BarStop {
    pub fn region(&self) -> MonitoredRegion {
        MonitoredRegion::new(format!("stop-{}", self.id), self.coordinate, self.radius)
    }
}

impl BeaconTagged for BarStop {
    fn beacon_identity(&self) -> Option<BeaconIdentity> {
        self.beacon
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarCrawl {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub stops: Vec<BarStop>,
}

impl BarCrawl {
    /// Geofences for every stop, in route order.
    pub fn regions(&self) -> Vec<MonitoredRegion> {
        self.stops.iter().map(BarStop::region).collect()
    }
}

/// A team-scoped, location-stamped task synthesized at runtime.
///
/// `expires_at` is fixed at creation and never extended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DynamicChallenge {
    pub id: Uuid,
    pub hunt_id: Uuid,
    pub team_id: Uuid,
    pub title: String,
    pub points: u32,
    pub coordinate: Coordinate,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_dynamic: bool,
}

impl DynamicChallenge {
    /// The hunt task the caller attaches to the hunt.
    pub fn into_task(self) -> HuntTask {
        HuntTask {
            id: self.id,
            hunt_id: self.hunt_id,
            title: self.title,
            points: self.points,
            coordinate: Some(self.coordinate),
            radius: None,
            beacon: None,
            is_dynamic: true,
            team_id: Some(self.team_id),
            expires_at: Some(self.expires_at),
            is_completed: false,
        }
    }
}
