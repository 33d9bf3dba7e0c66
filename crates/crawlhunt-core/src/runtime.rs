//! Proximity runtime: the single writer for location, geofence and beacon
//! state.
//!
//! Platform callbacks arrive on one [`PlatformEvent`] channel and consumer
//! requests on a command channel; both are drained by one task, so engine
//! state is never mutated concurrently. Readers observe the engines through
//! `watch` receivers. The sync engine is shared and does its own locking.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace};

use crate::beacon::{BeaconEngine, BeaconIdentity, BeaconSnapshot, BeaconTagged};
use crate::challenge::ChallengeGenerator;
use crate::error::{CoreError, GeofenceError, Result};
use crate::events::{LifecycleEvent, PlatformEvent};
use crate::geo::Coordinate;
use crate::geofence::{GeofenceEngine, GeofenceSnapshot, MonitoredRegion};
use crate::location::{LocationEngine, LocationSnapshot};
use crate::platform::{BeaconRanger, LocationSource, RegionMonitor};
use crate::storage::Config;
use crate::sync::{PayloadRef, RemoteSyncTarget, SyncEngine, SyncOutcome, SyncSnapshot};

const EVENT_BUFFER: usize = 256;
const COMMAND_BUFFER: usize = 64;

/// The platform implementations the runtime drives.
#[derive(Clone)]
pub struct PlatformServices {
    pub location: Arc<dyn LocationSource>,
    pub regions: Arc<dyn RegionMonitor>,
    pub beacons: Arc<dyn BeaconRanger>,
}

enum RuntimeCommand {
    RequestLocationAuthorization(oneshot::Sender<()>),
    StartLocationUpdates(oneshot::Sender<()>),
    StopLocationUpdates(oneshot::Sender<()>),
    DistanceTo {
        coordinate: Coordinate,
        reply: oneshot::Sender<Option<f64>>,
    },
    IsWithinRange {
        coordinate: Coordinate,
        radius: f64,
        reply: oneshot::Sender<bool>,
    },
    StartRegionMonitoring {
        region: MonitoredRegion,
        reply: oneshot::Sender<Result<(), GeofenceError>>,
    },
    StopRegionMonitoring {
        identifier: String,
        reply: oneshot::Sender<()>,
    },
    ClearRegions(oneshot::Sender<()>),
    IsUserInRegion {
        identifier: String,
        reply: oneshot::Sender<bool>,
    },
    StartBeaconMonitoring(oneshot::Sender<()>),
    StopBeaconMonitoring(oneshot::Sender<()>),
    IsNear {
        identity: BeaconIdentity,
        reply: oneshot::Sender<bool>,
    },
    CleanupBeacons(oneshot::Sender<usize>),
}

/// Owns the proximity engines. Build with [`ProximityRuntime::new`], then
/// [`spawn`](Self::spawn) it and keep the returned handle.
pub struct ProximityRuntime {
    location: LocationEngine,
    geofence: GeofenceEngine,
    beacon: BeaconEngine,
    sync: Arc<SyncEngine>,
    events: mpsc::Receiver<PlatformEvent>,
    commands: mpsc::Receiver<RuntimeCommand>,
    cleanup_interval: std::time::Duration,
    stale_after: chrono::Duration,
}

impl ProximityRuntime {
    pub fn new(
        config: &Config,
        platform: PlatformServices,
        remote: Arc<dyn RemoteSyncTarget>,
    ) -> (Self, RuntimeHandle) {
        let location = LocationEngine::new(platform.location, &config.location);
        let geofence = GeofenceEngine::new(platform.regions, &config.geofence);
        let beacon = BeaconEngine::new(platform.beacons, &config.beacon);
        let sync = Arc::new(SyncEngine::new(remote, &config.sync));

        let (event_tx, events) = mpsc::channel(EVENT_BUFFER);
        let (command_tx, commands) = mpsc::channel(COMMAND_BUFFER);

        let handle = RuntimeHandle {
            events: event_tx,
            commands: command_tx,
            location: location.subscribe(),
            geofence: geofence.subscribe(),
            beacon: beacon.subscribe(),
            sync: Arc::clone(&sync),
            config: config.clone(),
        };
        let runtime = Self {
            location,
            geofence,
            beacon,
            sync,
            events,
            commands,
            cleanup_interval: config.beacon.cleanup_interval(),
            stale_after: config.beacon.stale_after(),
        };
        (runtime, handle)
    }

    pub fn spawn(self) -> JoinHandle<Result<()>> {
        tokio::spawn(self.run())
    }

    /// Drain events and commands until every handle is dropped.
    ///
    /// Pending events are always applied before pending commands, so a
    /// request sent after an event observes that event's effect.
    pub async fn run(mut self) -> Result<()> {
        let mut cleanup = tokio::time::interval(self.cleanup_interval);
        cleanup.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            cleanup_secs = self.cleanup_interval.as_secs(),
            "proximity runtime started"
        );

        loop {
            tokio::select! {
                biased;

                event = self.events.recv() => match event {
                    Some(event) => self.dispatch(event),
                    None => break,
                },
                command = self.commands.recv() => match command {
                    Some(command) => self.execute(command),
                    None => break,
                },
                _ = cleanup.tick() => self.housekeeping(),
            }
        }

        if let Err(e) = self.sync.persist_queue() {
            tracing::warn!(error = %e, "could not persist sync queue on shutdown");
        }
        info!("proximity runtime stopped");
        Ok(())
    }

    fn dispatch(&mut self, event: PlatformEvent) {
        trace!(?event, "platform event");
        match event {
            PlatformEvent::LocationUpdated { sample } => {
                self.location.handle_location_update(sample);
            }
            PlatformEvent::HeadingUpdated { degrees } => {
                self.location.handle_heading_update(degrees);
            }
            PlatformEvent::AuthorizationChanged { status } => {
                self.location.handle_authorization_changed(status);
                self.beacon.handle_authorization_changed(status);
            }
            PlatformEvent::RegionEntered { identifier } => {
                self.geofence.handle_region_entered(&identifier);
                self.beacon.handle_region_entered(&identifier);
            }
            PlatformEvent::RegionExited { identifier } => {
                self.geofence.handle_region_exited(&identifier);
                self.beacon.handle_region_exited(&identifier);
            }
            PlatformEvent::MonitoringFailed { identifier, reason } => {
                self.geofence.handle_monitoring_failed(&identifier, &reason);
            }
            PlatformEvent::BeaconsRanged {
                region_identifier,
                beacons,
            } => {
                self.beacon.handle_beacons_ranged(&region_identifier, beacons);
            }
            PlatformEvent::ConnectivityChanged { online } => {
                if self.sync.update_connectivity(online) {
                    self.spawn_flush();
                }
            }
            PlatformEvent::Lifecycle { event } => match event {
                LifecycleEvent::Foreground => self.spawn_flush(),
                LifecycleEvent::Background => {
                    if let Err(e) = self.sync.persist_queue() {
                        tracing::warn!(error = %e, "could not persist sync queue on background");
                    }
                }
            },
        }
    }

    fn execute(&mut self, command: RuntimeCommand) {
        match command {
            RuntimeCommand::RequestLocationAuthorization(reply) => {
                self.location.request_authorization();
                let _ = reply.send(());
            }
            RuntimeCommand::StartLocationUpdates(reply) => {
                self.location.start_location_updates();
                let _ = reply.send(());
            }
            RuntimeCommand::StopLocationUpdates(reply) => {
                self.location.stop_location_updates();
                let _ = reply.send(());
            }
            RuntimeCommand::DistanceTo { coordinate, reply } => {
                let _ = reply.send(self.location.distance_to(&coordinate));
            }
            RuntimeCommand::IsWithinRange {
                coordinate,
                radius,
                reply,
            } => {
                let _ = reply.send(self.location.is_within_range(&coordinate, radius));
            }
            RuntimeCommand::StartRegionMonitoring { region, reply } => {
                let _ = reply.send(self.geofence.start_monitoring_region(region));
            }
            RuntimeCommand::StopRegionMonitoring { identifier, reply } => {
                self.geofence.stop_monitoring(&identifier);
                let _ = reply.send(());
            }
            RuntimeCommand::ClearRegions(reply) => {
                self.geofence.clear_all_regions();
                let _ = reply.send(());
            }
            RuntimeCommand::IsUserInRegion { identifier, reply } => {
                let _ = reply.send(self.geofence.is_user_in_region(&identifier));
            }
            RuntimeCommand::StartBeaconMonitoring(reply) => {
                let authorization = self.location.authorization_status();
                self.beacon.start_monitoring(authorization);
                let _ = reply.send(());
            }
            RuntimeCommand::StopBeaconMonitoring(reply) => {
                self.beacon.stop_monitoring();
                let _ = reply.send(());
            }
            RuntimeCommand::IsNear { identity, reply } => {
                let _ = reply.send(self.beacon.is_near(&identity));
            }
            RuntimeCommand::CleanupBeacons(reply) => {
                let _ = reply.send(self.beacon.cleanup_old_beacons(self.stale_after));
            }
        }
    }

    fn housekeeping(&mut self) {
        self.beacon.cleanup_old_beacons(self.stale_after);
        self.sync.tick();
    }

    fn spawn_flush(&self) {
        let sync = Arc::clone(&self.sync);
        tokio::spawn(async move {
            let outcome = sync.try_sync().await;
            debug!(?outcome, "triggered sync finished");
        });
    }
}

/// Cloneable front door to a running [`ProximityRuntime`].
#[derive(Clone)]
pub struct RuntimeHandle {
    events: mpsc::Sender<PlatformEvent>,
    commands: mpsc::Sender<RuntimeCommand>,
    location: watch::Receiver<LocationSnapshot>,
    geofence: watch::Receiver<GeofenceSnapshot>,
    beacon: watch::Receiver<BeaconSnapshot>,
    sync: Arc<SyncEngine>,
    config: Config,
}

impl RuntimeHandle {
    // ── Observation ──────────────────────────────────────────────────

    pub fn location(&self) -> watch::Receiver<LocationSnapshot> {
        self.location.clone()
    }

    pub fn geofence(&self) -> watch::Receiver<GeofenceSnapshot> {
        self.geofence.clone()
    }

    pub fn beacons(&self) -> watch::Receiver<BeaconSnapshot> {
        self.beacon.clone()
    }

    pub fn sync_status(&self) -> watch::Receiver<SyncSnapshot> {
        self.sync.subscribe()
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    /// A generator reading this runtime's location snapshots.
    pub fn challenge_generator(&self) -> ChallengeGenerator {
        ChallengeGenerator::new(
            self.location(),
            &self.config.location,
            &self.config.challenge,
        )
    }

    // ── Platform input ───────────────────────────────────────────────

    /// Sender for the host shell's platform callbacks.
    pub fn event_sender(&self) -> mpsc::Sender<PlatformEvent> {
        self.events.clone()
    }

    pub async fn send_event(&self, event: PlatformEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| CoreError::RuntimeStopped)
    }

    // ── Location ─────────────────────────────────────────────────────

    pub async fn request_location_authorization(&self) -> Result<()> {
        self.request(RuntimeCommand::RequestLocationAuthorization)
            .await
    }

    pub async fn start_location_updates(&self) -> Result<()> {
        self.request(RuntimeCommand::StartLocationUpdates).await
    }

    pub async fn stop_location_updates(&self) -> Result<()> {
        self.request(RuntimeCommand::StopLocationUpdates).await
    }

    /// Meters from the current sample to `coordinate`; `None` before the
    /// first fix.
    pub async fn distance_to(&self, coordinate: Coordinate) -> Result<Option<f64>> {
        self.request(|reply| RuntimeCommand::DistanceTo { coordinate, reply })
            .await
    }

    pub async fn is_within_range(&self, coordinate: Coordinate, radius: f64) -> Result<bool> {
        self.request(|reply| RuntimeCommand::IsWithinRange {
            coordinate,
            radius,
            reply,
        })
        .await
    }

    // ── Geofencing ───────────────────────────────────────────────────

    pub async fn start_monitoring(
        &self,
        latitude: f64,
        longitude: f64,
        radius: f64,
        identifier: impl Into<String>,
    ) -> Result<()> {
        let region = MonitoredRegion::new(identifier, Coordinate::new(latitude, longitude), radius);
        self.start_monitoring_region(region).await
    }

    pub async fn start_monitoring_region(&self, region: MonitoredRegion) -> Result<()> {
        self.request(|reply| RuntimeCommand::StartRegionMonitoring { region, reply })
            .await??;
        Ok(())
    }

    pub async fn stop_monitoring(&self, identifier: impl Into<String>) -> Result<()> {
        let identifier = identifier.into();
        self.request(|reply| RuntimeCommand::StopRegionMonitoring { identifier, reply })
            .await
    }

    pub async fn clear_all_regions(&self) -> Result<()> {
        self.request(RuntimeCommand::ClearRegions).await
    }

    pub async fn is_user_in_region(&self, identifier: impl Into<String>) -> Result<bool> {
        let identifier = identifier.into();
        self.request(|reply| RuntimeCommand::IsUserInRegion { identifier, reply })
            .await
    }

    // ── Beacons ──────────────────────────────────────────────────────

    /// Start beacon monitoring under the current location authorization.
    pub async fn start_beacon_monitoring(&self) -> Result<()> {
        self.request(RuntimeCommand::StartBeaconMonitoring).await
    }

    pub async fn stop_beacon_monitoring(&self) -> Result<()> {
        self.request(RuntimeCommand::StopBeaconMonitoring).await
    }

    /// Whether the entity's beacon is currently detected. Entities without a
    /// beacon are never near.
    pub async fn is_near(&self, entity: &impl BeaconTagged) -> Result<bool> {
        let Some(identity) = entity.beacon_identity() else {
            return Ok(false);
        };
        self.request(|reply| RuntimeCommand::IsNear { identity, reply })
            .await
    }

    pub async fn cleanup_old_beacons(&self) -> Result<usize> {
        self.request(RuntimeCommand::CleanupBeacons).await
    }

    // ── Sync ─────────────────────────────────────────────────────────

    pub fn save_for_sync(&self, payload: PayloadRef) -> uuid::Uuid {
        self.sync.save_for_sync(payload)
    }

    pub async fn try_sync(&self) -> SyncOutcome {
        self.sync.try_sync().await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RuntimeCommand) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| CoreError::RuntimeStopped)?;
        rx.await.map_err(|_| CoreError::RuntimeStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::{AuthorizationStatus, LocationSample};
    use crate::testing::{FakeBeaconRanger, FakeLocationSource, FakeRegionMonitor, ScriptedRemote};
    use chrono::Utc;

    fn runtime() -> (ProximityRuntime, RuntimeHandle) {
        let platform = PlatformServices {
            location: FakeLocationSource::new(),
            regions: FakeRegionMonitor::new(20),
            beacons: FakeBeaconRanger::new(),
        };
        ProximityRuntime::new(&Config::default(), platform, ScriptedRemote::new())
    }

    #[tokio::test]
    async fn events_apply_before_later_commands() {
        let (runtime, handle) = runtime();
        let task = runtime.spawn();

        handle
            .send_event(PlatformEvent::AuthorizationChanged {
                status: AuthorizationStatus::AuthorizedWhenInUse,
            })
            .await
            .unwrap();
        handle
            .send_event(PlatformEvent::LocationUpdated {
                sample: LocationSample::at(Coordinate::new(25.0, -80.0), Utc::now()),
            })
            .await
            .unwrap();

        let distance = handle
            .distance_to(Coordinate::new(25.0, -80.0))
            .await
            .unwrap();
        assert_eq!(distance, Some(0.0));

        drop(handle);
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn region_errors_surface_through_handle() {
        let (runtime, handle) = runtime();
        let _task = runtime.spawn();

        let err = handle
            .start_monitoring(25.0, -80.0, -1.0, "bar-1")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CoreError::Geofence(GeofenceError::InvalidRadius(_))
        ));
    }

    #[tokio::test]
    async fn stopped_runtime_is_reported() {
        let (runtime, handle) = runtime();
        drop(runtime);
        assert!(matches!(
            handle.clear_all_regions().await,
            Err(CoreError::RuntimeStopped)
        ));
    }
}
