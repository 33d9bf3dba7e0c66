//! Geofencing engine.
//!
//! Owns the monitored-region set and the entered set. An identifier is in
//! the entered set iff the most recent event for it was an enter.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::region::MonitoredRegion;
use crate::error::GeofenceError;
use crate::geo::Coordinate;
use crate::platform::RegionMonitor;
use crate::storage::GeofenceConfig;

/// Published geofence state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeofenceSnapshot {
    pub monitored_regions: Vec<MonitoredRegion>,
    pub entered_region_identifiers: BTreeSet<String>,
}

pub struct GeofenceEngine {
    monitor: Arc<dyn RegionMonitor>,
    regions: BTreeMap<String, MonitoredRegion>,
    entered: BTreeSet<String>,
    max_regions: usize,
    published: watch::Sender<GeofenceSnapshot>,
}

impl GeofenceEngine {
    pub fn new(monitor: Arc<dyn RegionMonitor>, config: &GeofenceConfig) -> Self {
        let max_regions = config.max_regions.min(monitor.max_monitored_regions());
        let (published, _) = watch::channel(GeofenceSnapshot::default());
        Self {
            monitor,
            regions: BTreeMap::new(),
            entered: BTreeSet::new(),
            max_regions,
            published,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<GeofenceSnapshot> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> GeofenceSnapshot {
        GeofenceSnapshot {
            monitored_regions: self.regions.values().cloned().collect(),
            entered_region_identifiers: self.entered.clone(),
        }
    }

    pub fn max_regions(&self) -> usize {
        self.max_regions
    }

    pub fn monitored_region(&self, identifier: &str) -> Option<&MonitoredRegion> {
        self.regions.get(identifier)
    }

    pub fn monitored_count(&self) -> usize {
        self.regions.len()
    }

    pub fn entered_region_identifiers(&self) -> &BTreeSet<String> {
        &self.entered
    }

    pub fn is_user_in_region(&self, identifier: &str) -> bool {
        self.entered.contains(identifier)
    }

    /// Register or replace the region keyed by `identifier`.
    ///
    /// A new identifier beyond the platform cap fails with
    /// [`GeofenceError::RegionLimitExceeded`] and leaves existing regions
    /// untouched.
    pub fn start_monitoring(
        &mut self,
        latitude: f64,
        longitude: f64,
        radius: f64,
        identifier: &str,
    ) -> Result<(), GeofenceError> {
        self.start_monitoring_region(MonitoredRegion::new(
            identifier,
            Coordinate::new(latitude, longitude),
            radius,
        ))
    }

    pub fn start_monitoring_region(&mut self, region: MonitoredRegion) -> Result<(), GeofenceError> {
        region.validate()?;

        let replacing = self.regions.contains_key(&region.identifier);
        if !replacing && self.regions.len() >= self.max_regions {
            warn!(
                identifier = %region.identifier,
                limit = self.max_regions,
                "region limit reached, refusing registration"
            );
            return Err(GeofenceError::RegionLimitExceeded {
                limit: self.max_regions,
            });
        }
        if self.regions.get(&region.identifier) == Some(&region) {
            return Ok(());
        }

        self.monitor
            .start_monitoring(&region)
            .map_err(|e| GeofenceError::Platform {
                identifier: region.identifier.clone(),
                reason: e.to_string(),
            })?;

        info!(
            identifier = %region.identifier,
            radius = region.radius,
            replacing,
            "monitoring region"
        );
        self.regions.insert(region.identifier.clone(), region);
        self.publish();
        Ok(())
    }

    /// Unknown identifiers are ignored.
    pub fn stop_monitoring(&mut self, identifier: &str) {
        if self.regions.remove(identifier).is_none() {
            return;
        }
        self.monitor.stop_monitoring(identifier);
        self.entered.remove(identifier);
        info!(%identifier, "stopped monitoring region");
        self.publish();
    }

    pub fn clear_all_regions(&mut self) {
        for identifier in self.regions.keys() {
            self.monitor.stop_monitoring(identifier);
        }
        self.regions.clear();
        self.entered.clear();
        info!("cleared all monitored regions");
        self.publish();
    }

    // ── Platform events ──────────────────────────────────────────────

    /// Returns false when the identifier is not one of ours.
    pub fn handle_region_entered(&mut self, identifier: &str) -> bool {
        if !self.regions.contains_key(identifier) {
            debug!(%identifier, "ignoring enter for unmonitored region");
            return false;
        }
        if self.entered.insert(identifier.to_string()) {
            info!(%identifier, "entered region");
            self.publish();
        }
        true
    }

    /// Exit always clears membership, even without a prior enter.
    pub fn handle_region_exited(&mut self, identifier: &str) -> bool {
        let was_inside = self.entered.remove(identifier);
        if was_inside {
            info!(%identifier, "exited region");
            self.publish();
        }
        was_inside
    }

    /// The platform dropped a registration; forget the region.
    pub fn handle_monitoring_failed(&mut self, identifier: &str, reason: &str) {
        if self.regions.remove(identifier).is_some() {
            self.entered.remove(identifier);
            warn!(%identifier, %reason, "platform failed to monitor region");
            self.publish();
        }
    }

    fn publish(&self) {
        self.published.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeRegionMonitor;
    use proptest::prelude::*;

    fn engine_with_cap(cap: usize) -> (GeofenceEngine, Arc<FakeRegionMonitor>) {
        let monitor = FakeRegionMonitor::new(cap);
        let engine = GeofenceEngine::new(monitor.clone(), &GeofenceConfig::default());
        (engine, monitor)
    }

    #[test]
    fn register_enter_exit_scenario() {
        let (mut engine, _) = engine_with_cap(20);
        engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();

        engine.handle_region_entered("bar-1");
        assert_eq!(
            engine.entered_region_identifiers(),
            &BTreeSet::from(["bar-1".to_string()])
        );

        engine.handle_region_exited("bar-1");
        assert!(engine.entered_region_identifiers().is_empty());
    }

    #[test]
    fn start_monitoring_twice_keeps_one_region() {
        let (mut engine, monitor) = engine_with_cap(20);
        engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();
        engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();
        assert_eq!(engine.monitored_count(), 1);
        assert_eq!(monitor.registered(), vec!["bar-1".to_string()]);
    }

    #[test]
    fn start_monitoring_replaces_parameters() {
        let (mut engine, _) = engine_with_cap(20);
        engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();
        engine.start_monitoring(25.5, -80.5, 250.0, "bar-1").unwrap();
        let region = engine.monitored_region("bar-1").unwrap();
        assert_eq!(region.radius, 250.0);
        assert_eq!(region.center, Coordinate::new(25.5, -80.5));
        assert_eq!(engine.monitored_count(), 1);
    }

    #[test]
    fn stop_unknown_is_noop() {
        let (mut engine, monitor) = engine_with_cap(20);
        let rx = engine.subscribe();
        engine.stop_monitoring("nope");
        assert!(!rx.has_changed().unwrap());
        assert!(monitor.registered().is_empty());
    }

    #[test]
    fn stop_clears_membership() {
        let (mut engine, monitor) = engine_with_cap(20);
        engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();
        engine.handle_region_entered("bar-1");
        engine.stop_monitoring("bar-1");
        assert!(!engine.is_user_in_region("bar-1"));
        assert!(monitor.registered().is_empty());
    }

    #[test]
    fn region_limit_is_reported_not_fatal() {
        let (mut engine, _) = engine_with_cap(2);
        engine.start_monitoring(25.0, -80.0, 100.0, "a").unwrap();
        engine.start_monitoring(25.1, -80.0, 100.0, "b").unwrap();
        let err = engine.start_monitoring(25.2, -80.0, 100.0, "c").unwrap_err();
        assert_eq!(err, GeofenceError::RegionLimitExceeded { limit: 2 });
        assert_eq!(engine.monitored_count(), 2);

        // Replacing an existing identifier at the cap still works.
        engine.start_monitoring(25.1, -80.0, 300.0, "b").unwrap();
    }

    #[test]
    fn platform_rejection_leaves_state_unchanged() {
        let (mut engine, monitor) = engine_with_cap(20);
        monitor.reject("cursed");
        let err = engine.start_monitoring(25.0, -80.0, 100.0, "cursed").unwrap_err();
        assert!(matches!(err, GeofenceError::Platform { .. }));
        assert_eq!(engine.monitored_count(), 0);
    }

    #[test]
    fn clear_all_empties_both_sets() {
        let (mut engine, monitor) = engine_with_cap(20);
        engine.start_monitoring(25.0, -80.0, 100.0, "a").unwrap();
        engine.start_monitoring(25.1, -80.0, 100.0, "b").unwrap();
        engine.handle_region_entered("a");
        engine.clear_all_regions();
        assert_eq!(engine.snapshot(), GeofenceSnapshot::default());
        assert!(monitor.registered().is_empty());
    }

    #[test]
    fn exit_without_enter_is_harmless() {
        let (mut engine, _) = engine_with_cap(20);
        engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();
        assert!(!engine.handle_region_exited("bar-1"));
        assert!(!engine.is_user_in_region("bar-1"));
    }

    #[test]
    fn enter_for_foreign_region_is_ignored() {
        let (mut engine, _) = engine_with_cap(20);
        assert!(!engine.handle_region_entered("beacon-ns"));
        assert!(engine.entered_region_identifiers().is_empty());
    }

    #[test]
    fn monitoring_failure_drops_region() {
        let (mut engine, _) = engine_with_cap(20);
        engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();
        engine.handle_region_entered("bar-1");
        engine.handle_monitoring_failed("bar-1", "too close to another region");
        assert!(engine.monitored_region("bar-1").is_none());
        assert!(!engine.is_user_in_region("bar-1"));
    }

    proptest! {
        #[test]
        fn prop_membership_follows_last_event(events in proptest::collection::vec(any::<bool>(), 1..40)) {
            let (mut engine, _) = engine_with_cap(20);
            engine.start_monitoring(25.0, -80.0, 100.0, "bar-1").unwrap();
            for &enter in &events {
                if enter {
                    engine.handle_region_entered("bar-1");
                } else {
                    engine.handle_region_exited("bar-1");
                }
            }
            prop_assert_eq!(engine.is_user_in_region("bar-1"), *events.last().unwrap());
        }
    }
}
