//! In-memory platform and remote doubles.
//!
//! Used by this crate's tests, the integration tests and the CLI's
//! `simulate` command. Every fake records the calls it receives.

use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::Semaphore;

use crate::beacon::BeaconRegion;
use crate::geofence::MonitoredRegion;
use crate::platform::{BeaconRanger, LocationSource, PlatformError, RegionMonitor};
use crate::sync::{RemoteError, RemoteSyncTarget, SyncableMutation};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocationCall {
    RequestAuthorization,
    StartUpdates,
    StopUpdates,
}

/// Records location requests; answers nothing on its own.
#[derive(Debug, Default)]
pub struct FakeLocationSource {
    calls: Mutex<Vec<LocationCall>>,
}

impl FakeLocationSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> Vec<LocationCall> {
        lock(&self.calls).clone()
    }

    pub fn count(&self, call: LocationCall) -> usize {
        lock(&self.calls).iter().filter(|c| **c == call).count()
    }
}

impl LocationSource for FakeLocationSource {
    fn request_authorization(&self) {
        lock(&self.calls).push(LocationCall::RequestAuthorization);
    }

    fn start_updates(&self) {
        lock(&self.calls).push(LocationCall::StartUpdates);
    }

    fn stop_updates(&self) {
        lock(&self.calls).push(LocationCall::StopUpdates);
    }
}

/// Region monitor with a configurable cap and scripted rejections.
#[derive(Debug)]
pub struct FakeRegionMonitor {
    cap: usize,
    registered: Mutex<BTreeSet<String>>,
    rejected: Mutex<HashSet<String>>,
}

impl FakeRegionMonitor {
    pub fn new(cap: usize) -> Arc<Self> {
        Arc::new(Self {
            cap,
            registered: Mutex::new(BTreeSet::new()),
            rejected: Mutex::new(HashSet::new()),
        })
    }

    /// Currently registered identifiers, sorted.
    pub fn registered(&self) -> Vec<String> {
        lock(&self.registered).iter().cloned().collect()
    }

    /// Make future registrations of `identifier` fail.
    pub fn reject(&self, identifier: &str) {
        lock(&self.rejected).insert(identifier.to_string());
    }
}

impl RegionMonitor for FakeRegionMonitor {
    fn max_monitored_regions(&self) -> usize {
        self.cap
    }

    fn start_monitoring(&self, region: &MonitoredRegion) -> Result<(), PlatformError> {
        if lock(&self.rejected).contains(&region.identifier) {
            return Err(PlatformError::Rejected(format!(
                "region {} unavailable",
                region.identifier
            )));
        }
        lock(&self.registered).insert(region.identifier.clone());
        Ok(())
    }

    fn stop_monitoring(&self, identifier: &str) {
        lock(&self.registered).remove(identifier);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeaconCall {
    RequestAuthorization,
    StartMonitoring,
    StopMonitoring,
    StartRanging,
    StopRanging,
}

#[derive(Debug, Default)]
pub struct FakeBeaconRanger {
    calls: Mutex<Vec<(BeaconCall, String)>>,
}

impl FakeBeaconRanger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn count(&self, call: BeaconCall) -> usize {
        lock(&self.calls).iter().filter(|(c, _)| *c == call).count()
    }

    /// Region identifiers passed with `call`, in call order.
    pub fn regions_for(&self, call: BeaconCall) -> Vec<String> {
        lock(&self.calls)
            .iter()
            .filter(|(c, _)| *c == call)
            .map(|(_, id)| id.clone())
            .collect()
    }

    fn record(&self, call: BeaconCall, region: &BeaconRegion) {
        lock(&self.calls).push((call, region.identifier.clone()));
    }
}

impl BeaconRanger for FakeBeaconRanger {
    fn request_authorization(&self) {
        lock(&self.calls).push((BeaconCall::RequestAuthorization, String::new()));
    }

    fn start_monitoring(&self, region: &BeaconRegion) {
        self.record(BeaconCall::StartMonitoring, region);
    }

    fn stop_monitoring(&self, region: &BeaconRegion) {
        self.record(BeaconCall::StopMonitoring, region);
    }

    fn start_ranging(&self, region: &BeaconRegion) {
        self.record(BeaconCall::StartRanging, region);
    }

    fn stop_ranging(&self, region: &BeaconRegion) {
        self.record(BeaconCall::StopRanging, region);
    }
}

/// Remote whose answers are queued up front. Unscripted flushes succeed.
///
/// `hold` parks every flush until `release`, which lets tests observe the
/// `Syncing` state or force a timeout.
#[derive(Debug, Default)]
pub struct ScriptedRemote {
    responses: Mutex<VecDeque<Result<(), RemoteError>>>,
    batches: Mutex<Vec<Vec<SyncableMutation>>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
}

impl ScriptedRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_response(&self, response: Result<(), RemoteError>) {
        lock(&self.responses).push_back(response);
    }

    pub fn hold(&self) {
        *lock(&self.gate) = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self) {
        if let Some(gate) = lock(&self.gate).take() {
            gate.close();
        }
    }

    pub fn flush_count(&self) -> usize {
        lock(&self.batches).len()
    }

    pub fn flushed_batches(&self) -> Vec<Vec<SyncableMutation>> {
        lock(&self.batches).clone()
    }
}

#[async_trait]
impl RemoteSyncTarget for ScriptedRemote {
    async fn flush(&self, mutations: &[SyncableMutation]) -> Result<(), RemoteError> {
        lock(&self.batches).push(mutations.to_vec());

        let gate = lock(&self.gate).clone();
        if let Some(gate) = gate {
            // Closed on release.
            let _ = gate.acquire().await;
        }

        lock(&self.responses).pop_front().unwrap_or(Ok(()))
    }
}
