//! Location engine implementation.
//!
//! Tracks the authorization lifecycle and the current position fix. It does
//! not talk to the OS directly: requests go out through a [`LocationSource`]
//! and answers come back as `handle_*` calls from the runtime.
//!
//! ## Authorization
//!
//! ```text
//! NotDetermined -> (AuthorizedWhenInUse | AuthorizedAlways | Denied | Restricted)
//! ```
//!
//! A start request made before authorization resolves is remembered and
//! honoured once the platform grants access.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::types::{AuthorizationStatus, LocationSample, LocationSnapshot};
use crate::geo::{distance_meters, Coordinate};
use crate::platform::LocationSource;
use crate::storage::LocationConfig;

pub struct LocationEngine {
    source: Arc<dyn LocationSource>,
    authorization: AuthorizationStatus,
    updating: bool,
    /// A start was requested but authorization is not granted yet.
    start_pending: bool,
    current: Option<LocationSample>,
    heading: Option<f64>,
    max_horizontal_accuracy: Option<f64>,
    published: watch::Sender<LocationSnapshot>,
}

impl LocationEngine {
    pub fn new(source: Arc<dyn LocationSource>, config: &LocationConfig) -> Self {
        let (published, _) = watch::channel(LocationSnapshot::default());
        Self {
            source,
            authorization: AuthorizationStatus::NotDetermined,
            updating: false,
            start_pending: false,
            current: None,
            heading: None,
            max_horizontal_accuracy: config.max_horizontal_accuracy_m,
            published,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn authorization_status(&self) -> AuthorizationStatus {
        self.authorization
    }

    pub fn current_location(&self) -> Option<&LocationSample> {
        self.current.as_ref()
    }

    pub fn is_updating(&self) -> bool {
        self.updating
    }

    pub fn subscribe(&self) -> watch::Receiver<LocationSnapshot> {
        self.published.subscribe()
    }

    pub fn snapshot(&self) -> LocationSnapshot {
        LocationSnapshot {
            authorization_status: self.authorization,
            current_location: self.current.clone(),
            heading: self.heading,
            is_updating: self.updating,
        }
    }

    /// Great-circle distance in meters from the current sample, or `None`
    /// before the first fix.
    pub fn distance_to(&self, coordinate: &Coordinate) -> Option<f64> {
        self.current
            .as_ref()
            .map(|sample| distance_meters(&sample.coordinate, coordinate))
    }

    /// `distance <= radius`. False when there is no fix yet.
    pub fn is_within_range(&self, coordinate: &Coordinate, radius: f64) -> bool {
        self.distance_to(coordinate)
            .is_some_and(|distance| distance <= radius)
    }

    /// The current sample if it is no older than `max_age` at `now`.
    pub fn recent_location(&self, max_age: Duration, now: DateTime<Utc>) -> Option<&LocationSample> {
        self.current
            .as_ref()
            .filter(|sample| now - sample.timestamp <= max_age)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Prompt for permission if it has not been decided yet.
    ///
    /// Never fails: a refusal shows up as `Denied`/`Restricted` state.
    pub fn request_authorization(&mut self) {
        if self.authorization == AuthorizationStatus::NotDetermined {
            debug!("requesting location authorization");
            self.source.request_authorization();
        }
    }

    pub fn start_location_updates(&mut self) {
        if self.updating {
            return;
        }
        if self.authorization.is_authorized() {
            self.source.start_updates();
            self.updating = true;
            self.start_pending = false;
            info!("location updates started");
        } else {
            self.start_pending = true;
            self.request_authorization();
            debug!(status = ?self.authorization, "location start queued until authorized");
        }
        self.publish();
    }

    pub fn stop_location_updates(&mut self) {
        self.start_pending = false;
        if self.updating {
            self.source.stop_updates();
            self.updating = false;
            info!("location updates stopped");
        }
        self.publish();
    }

    // ── Platform events ──────────────────────────────────────────────

    pub fn handle_authorization_changed(&mut self, status: AuthorizationStatus) {
        if status == self.authorization {
            return;
        }
        info!(from = ?self.authorization, to = ?status, "location authorization changed");
        self.authorization = status;

        if status.is_authorized() {
            if self.start_pending {
                self.start_location_updates();
            }
        } else if self.updating {
            // Resume automatically if access comes back later.
            self.source.stop_updates();
            self.updating = false;
            self.start_pending = true;
        }

        if status.is_refused() {
            warn!(status = ?status, "location access refused; dependent engines stay inert");
        }
        self.publish();
    }

    /// Accept or reject a fix. Returns whether it became the current sample.
    pub fn handle_location_update(&mut self, mut sample: LocationSample) -> bool {
        let accuracy_valid =
            sample.horizontal_accuracy.is_finite() && sample.horizontal_accuracy >= 0.0;
        let heading_valid = sample.heading.map_or(true, f64::is_finite);
        if !sample.coordinate.is_valid() || !accuracy_valid || !heading_valid {
            debug!(?sample.coordinate, "rejecting invalid location sample");
            return false;
        }
        if let Some(max) = self.max_horizontal_accuracy {
            if sample.horizontal_accuracy > max {
                debug!(accuracy = sample.horizontal_accuracy, max, "rejecting imprecise location sample");
                return false;
            }
        }
        if let Some(current) = &self.current {
            if sample.timestamp < current.timestamp {
                debug!("rejecting out-of-order location sample");
                return false;
            }
        }

        sample.heading = sample.heading.map(|degrees| degrees.rem_euclid(360.0));
        if sample.heading.is_some() {
            self.heading = sample.heading;
        }
        debug!(
            lat = sample.coordinate.latitude,
            lon = sample.coordinate.longitude,
            accuracy = sample.horizontal_accuracy,
            "location sample accepted"
        );
        self.current = Some(sample);
        self.publish();
        true
    }

    pub fn handle_heading_update(&mut self, degrees: f64) {
        if !degrees.is_finite() {
            return;
        }
        self.heading = Some(degrees.rem_euclid(360.0));
        self.publish();
    }

    fn publish(&self) {
        self.published.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLocationSource, LocationCall};

    fn engine() -> (LocationEngine, Arc<FakeLocationSource>) {
        let source = FakeLocationSource::new();
        let engine = LocationEngine::new(source.clone(), &LocationConfig::default());
        (engine, source)
    }

    fn sample(lat: f64, lon: f64, at: DateTime<Utc>) -> LocationSample {
        LocationSample::at(Coordinate::new(lat, lon), at)
    }

    #[test]
    fn start_before_authorization_is_queued() {
        let (mut engine, source) = engine();
        engine.start_location_updates();
        assert!(!engine.is_updating());
        assert_eq!(source.calls(), vec![LocationCall::RequestAuthorization]);

        engine.handle_authorization_changed(AuthorizationStatus::AuthorizedWhenInUse);
        assert!(engine.is_updating());
        assert_eq!(source.count(LocationCall::StartUpdates), 1);
    }

    #[test]
    fn start_twice_is_a_noop() {
        let (mut engine, source) = engine();
        engine.handle_authorization_changed(AuthorizationStatus::AuthorizedAlways);
        engine.start_location_updates();
        engine.start_location_updates();
        assert_eq!(source.count(LocationCall::StartUpdates), 1);
    }

    #[test]
    fn denial_is_silent_state() {
        let (mut engine, source) = engine();
        engine.request_authorization();
        engine.handle_authorization_changed(AuthorizationStatus::Denied);
        assert_eq!(engine.authorization_status(), AuthorizationStatus::Denied);

        // Denied is terminal: asking again does not prompt.
        engine.request_authorization();
        assert_eq!(source.count(LocationCall::RequestAuthorization), 1);
    }

    #[test]
    fn losing_authorization_stops_and_requeues() {
        let (mut engine, source) = engine();
        engine.handle_authorization_changed(AuthorizationStatus::AuthorizedWhenInUse);
        engine.start_location_updates();
        engine.handle_authorization_changed(AuthorizationStatus::Denied);
        assert!(!engine.is_updating());
        assert_eq!(source.count(LocationCall::StopUpdates), 1);

        engine.handle_authorization_changed(AuthorizationStatus::AuthorizedWhenInUse);
        assert!(engine.is_updating());
        assert_eq!(source.count(LocationCall::StartUpdates), 2);
    }

    #[test]
    fn distance_absent_without_sample() {
        let (engine, _) = engine();
        assert!(engine.distance_to(&Coordinate::new(25.0, -80.0)).is_none());
        assert!(!engine.is_within_range(&Coordinate::new(25.0, -80.0), 1_000_000.0));
    }

    #[test]
    fn within_range_is_boundary_inclusive() {
        let (mut engine, _) = engine();
        let now = Utc::now();
        engine.handle_location_update(sample(25.0, -80.0, now));
        let target = Coordinate::new(25.001, -80.0);
        let exact = engine.distance_to(&target).unwrap();
        assert!(engine.is_within_range(&target, exact));
        assert!(!engine.is_within_range(&target, exact - 0.01));
    }

    #[test]
    fn out_of_order_samples_are_rejected() {
        let (mut engine, _) = engine();
        let now = Utc::now();
        assert!(engine.handle_location_update(sample(25.0, -80.0, now)));
        assert!(!engine.handle_location_update(sample(26.0, -80.0, now - Duration::seconds(5))));
        assert_eq!(engine.current_location().unwrap().coordinate.latitude, 25.0);

        // Equal timestamps are non-decreasing, so they are accepted.
        assert!(engine.handle_location_update(sample(25.5, -80.0, now)));
    }

    #[test]
    fn invalid_and_imprecise_samples_are_rejected() {
        let source = FakeLocationSource::new();
        let config = LocationConfig {
            max_horizontal_accuracy_m: Some(50.0),
            ..LocationConfig::default()
        };
        let mut engine = LocationEngine::new(source, &config);
        let now = Utc::now();

        let mut invalid = sample(25.0, -80.0, now);
        invalid.horizontal_accuracy = -1.0;
        assert!(!engine.handle_location_update(invalid));

        let mut vague = sample(25.0, -80.0, now);
        vague.horizontal_accuracy = 120.0;
        assert!(!engine.handle_location_update(vague));

        assert!(!engine.handle_location_update(sample(95.0, 0.0, now)));
        assert!(engine.current_location().is_none());
    }

    #[test]
    fn non_finite_accuracy_or_heading_is_rejected() {
        let source = FakeLocationSource::new();
        let config = LocationConfig {
            max_horizontal_accuracy_m: Some(50.0),
            ..LocationConfig::default()
        };
        let mut engine = LocationEngine::new(source, &config);
        let now = Utc::now();

        for accuracy in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let mut fix = sample(25.0, -80.0, now);
            fix.horizontal_accuracy = accuracy;
            assert!(!engine.handle_location_update(fix), "accuracy {accuracy}");
        }
        for heading in [f64::NAN, f64::INFINITY] {
            let mut fix = sample(25.0, -80.0, now);
            fix.heading = Some(heading);
            assert!(!engine.handle_location_update(fix), "heading {heading}");
        }
        assert!(engine.current_location().is_none());
        assert_eq!(engine.snapshot().heading, None);

        let mut turned = sample(25.0, -80.0, now);
        turned.heading = Some(-90.0);
        assert!(engine.handle_location_update(turned));
        assert_eq!(engine.snapshot().heading, Some(270.0));
        assert_eq!(engine.current_location().and_then(|s| s.heading), Some(270.0));
    }

    #[test]
    fn accepted_sample_is_published() {
        let (mut engine, _) = engine();
        let rx = engine.subscribe();
        engine.handle_location_update(sample(25.123, -80.456, Utc::now()));
        let snap = rx.borrow().clone();
        assert_eq!(
            snap.current_location.unwrap().coordinate,
            Coordinate::new(25.123, -80.456)
        );
    }

    #[test]
    fn recent_location_respects_age() {
        let (mut engine, _) = engine();
        let now = Utc::now();
        engine.handle_location_update(sample(25.0, -80.0, now - Duration::minutes(10)));
        assert!(engine.recent_location(Duration::minutes(5), now).is_none());
        assert!(engine.recent_location(Duration::minutes(15), now).is_some());
    }

    #[test]
    fn heading_is_normalized() {
        let (mut engine, _) = engine();
        engine.handle_heading_update(-90.0);
        assert_eq!(engine.snapshot().heading, Some(270.0));
    }
}
