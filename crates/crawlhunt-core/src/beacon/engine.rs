//! Beacon proximity engine.
//!
//! ## Monitoring lifecycle
//!
//! ```text
//! Inactive -> AwaitingAuthorization -> Active
//!                       \-> Denied (inert until authorization returns)
//! ```
//!
//! While `Active`, entering a known beacon region starts ranging for it and
//! exiting stops it. Ranging batches upsert the registry keyed by
//! (namespace, major, minor); entries not refreshed within the stale window
//! are pruned before any "is near" answer.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::types::{BeaconIdentity, BeaconRegion, BeaconTagged, DetectedBeacon, RangedBeacon};
use crate::location::AuthorizationStatus;
use crate::platform::BeaconRanger;
use crate::storage::BeaconConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitoringState {
    #[default]
    Inactive,
    AwaitingAuthorization,
    Active,
    Denied,
}

/// Published beacon state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BeaconSnapshot {
    pub monitoring: MonitoringState,
    pub ranging_regions: BTreeSet<String>,
    pub detected_beacons: Vec<DetectedBeacon>,
    pub nearest_beacon: Option<DetectedBeacon>,
}

pub struct BeaconEngine {
    ranger: Arc<dyn BeaconRanger>,
    regions: Vec<BeaconRegion>,
    state: MonitoringState,
    ranging: BTreeSet<String>,
    registry: HashMap<BeaconIdentity, DetectedBeacon>,
    stale_after: Duration,
    published: watch::Sender<BeaconSnapshot>,
}

impl BeaconEngine {
    pub fn new(ranger: Arc<dyn BeaconRanger>, config: &BeaconConfig) -> Self {
        let (published, _) = watch::channel(BeaconSnapshot::default());
        Self {
            ranger,
            regions: config.regions.clone(),
            state: MonitoringState::Inactive,
            ranging: BTreeSet::new(),
            registry: HashMap::new(),
            stale_after: config.stale_after(),
            published,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<BeaconSnapshot> {
        self.published.subscribe()
    }

    pub fn monitoring_state(&self) -> MonitoringState {
        self.state
    }

    pub fn is_ranging(&self, region_identifier: &str) -> bool {
        self.ranging.contains(region_identifier)
    }

    pub fn detected_beacons(&self) -> Vec<DetectedBeacon> {
        let mut beacons: Vec<_> = self.registry.values().cloned().collect();
        beacons.sort_by(|a, b| a.identity.cmp(&b.identity));
        beacons
    }

    pub fn detected(&self, identity: &BeaconIdentity) -> Option<&DetectedBeacon> {
        self.registry.get(identity)
    }

    /// Closest proximity tier wins; ties go to the strongest signal.
    pub fn nearest_beacon(&self) -> Option<&DetectedBeacon> {
        self.registry.values().min_by(|a, b| {
            a.proximity
                .cmp(&b.proximity)
                .then_with(|| b.rssi.cmp(&a.rssi))
                .then_with(|| a.identity.cmp(&b.identity))
        })
    }

    pub fn snapshot(&self) -> BeaconSnapshot {
        BeaconSnapshot {
            monitoring: self.state,
            ranging_regions: self.ranging.clone(),
            detected_beacons: self.detected_beacons(),
            nearest_beacon: self.nearest_beacon().cloned(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Register every known beacon region once location access allows it.
    pub fn start_monitoring(&mut self, authorization: AuthorizationStatus) {
        match self.state {
            MonitoringState::Active => return,
            MonitoringState::AwaitingAuthorization
                if authorization == AuthorizationStatus::NotDetermined =>
            {
                return
            }
            _ => {}
        }

        if authorization.is_authorized() {
            self.register_regions();
        } else if authorization.is_refused() {
            warn!(status = ?authorization, "beacon monitoring unavailable without location access");
            self.state = MonitoringState::Denied;
        } else {
            self.ranger.request_authorization();
            self.state = MonitoringState::AwaitingAuthorization;
            debug!("beacon monitoring waiting for authorization");
        }
        self.publish();
    }

    pub fn stop_monitoring(&mut self) {
        if self.state == MonitoringState::Inactive {
            return;
        }
        let was_active = self.state == MonitoringState::Active;
        self.stop_all_ranging();
        if was_active {
            for region in &self.regions {
                self.ranger.stop_monitoring(region);
            }
        }
        self.state = MonitoringState::Inactive;
        info!("beacon monitoring stopped");
        self.publish();
    }

    /// Drop entries last seen before `now - older_than`. Returns how many
    /// were removed. A window reaching past the earliest representable
    /// time keeps everything.
    pub fn cleanup_old_beacons(&mut self, older_than: Duration) -> usize {
        self.cleanup_old_beacons_at(older_than, Utc::now())
    }

    pub fn cleanup_old_beacons_at(&mut self, older_than: Duration, now: DateTime<Utc>) -> usize {
        let Some(cutoff) = now.checked_sub_signed(older_than) else {
            return 0;
        };
        let before = self.registry.len();
        self.registry.retain(|_, beacon| beacon.last_seen >= cutoff);
        let removed = before - self.registry.len();
        if removed > 0 {
            debug!(removed, "pruned stale beacons");
            self.publish();
        }
        removed
    }

    /// Whether the entity's beacon is in the registry after pruning.
    pub fn is_near(&mut self, entity: &impl BeaconTagged) -> bool {
        self.is_near_at(entity, Utc::now())
    }

    pub fn is_near_at(&mut self, entity: &impl BeaconTagged, now: DateTime<Utc>) -> bool {
        let Some(identity) = entity.beacon_identity() else {
            return false;
        };
        self.cleanup_old_beacons_at(self.stale_after, now);
        self.registry.contains_key(&identity)
    }

    pub fn is_near_task_location(&mut self, task: &crate::challenge::HuntTask) -> bool {
        self.is_near(task)
    }

    pub fn is_near_bar_stop(&mut self, venue: &crate::challenge::BarStop) -> bool {
        self.is_near(venue)
    }

    // ── Platform events ──────────────────────────────────────────────

    pub fn handle_authorization_changed(&mut self, status: AuthorizationStatus) {
        match self.state {
            MonitoringState::AwaitingAuthorization | MonitoringState::Denied
                if status.is_authorized() =>
            {
                self.register_regions();
                self.publish();
            }
            MonitoringState::AwaitingAuthorization if status.is_refused() => {
                warn!(status = ?status, "beacon monitoring refused");
                self.state = MonitoringState::Denied;
                self.publish();
            }
            MonitoringState::Active if !status.is_authorized() => {
                warn!(status = ?status, "location access revoked, suspending beacon monitoring");
                self.stop_all_ranging();
                for region in &self.regions {
                    self.ranger.stop_monitoring(region);
                }
                self.state = if status.is_refused() {
                    MonitoringState::Denied
                } else {
                    MonitoringState::AwaitingAuthorization
                };
                self.publish();
            }
            _ => {}
        }
    }

    /// Start ranging if `identifier` is one of our beacon regions.
    pub fn handle_region_entered(&mut self, identifier: &str) -> bool {
        if self.state != MonitoringState::Active {
            return false;
        }
        let Some(region) = self.regions.iter().find(|r| r.identifier == identifier) else {
            return false;
        };
        if self.ranging.insert(identifier.to_string()) {
            self.ranger.start_ranging(region);
            info!(%identifier, "beacon ranging started");
            self.publish();
        }
        true
    }

    pub fn handle_region_exited(&mut self, identifier: &str) -> bool {
        if !self.ranging.remove(identifier) {
            return false;
        }
        if let Some(region) = self.regions.iter().find(|r| r.identifier == identifier) {
            self.ranger.stop_ranging(region);
        }
        info!(%identifier, "beacon ranging stopped");
        self.publish();
        true
    }

    pub fn handle_beacons_ranged(&mut self, region_identifier: &str, beacons: Vec<RangedBeacon>) {
        self.handle_beacons_ranged_at(region_identifier, beacons, Utc::now());
    }

    /// Upsert each ranged beacon, stamping `last_seen = now`. Batches for
    /// regions we are not ranging (late callbacks) are ignored.
    pub fn handle_beacons_ranged_at(
        &mut self,
        region_identifier: &str,
        beacons: Vec<RangedBeacon>,
        now: DateTime<Utc>,
    ) {
        if !self.ranging.contains(region_identifier) {
            debug!(region = %region_identifier, "ignoring ranging batch for inactive region");
            return;
        }
        let Some(region) = self
            .regions
            .iter()
            .find(|r| r.identifier == region_identifier)
        else {
            return;
        };

        let mut changed = false;
        for ranged in beacons {
            let identity = ranged.identity();
            if !region.matches(&identity) {
                continue;
            }
            self.registry
                .entry(identity)
                .and_modify(|existing| {
                    existing.proximity = ranged.proximity;
                    existing.rssi = ranged.rssi;
                    existing.accuracy = ranged.accuracy;
                    existing.last_seen = now;
                })
                .or_insert_with(|| DetectedBeacon {
                    identity,
                    proximity: ranged.proximity,
                    rssi: ranged.rssi,
                    accuracy: ranged.accuracy,
                    last_seen: now,
                });
            changed = true;
        }
        if changed {
            self.publish();
        }
    }

    fn register_regions(&mut self) {
        for region in &self.regions {
            self.ranger.start_monitoring(region);
        }
        self.state = MonitoringState::Active;
        info!(regions = self.regions.len(), "beacon regions registered");
    }

    fn stop_all_ranging(&mut self) {
        for identifier in std::mem::take(&mut self.ranging) {
            if let Some(region) = self.regions.iter().find(|r| r.identifier == identifier) {
                self.ranger.stop_ranging(region);
            }
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.snapshot());
    }
}
