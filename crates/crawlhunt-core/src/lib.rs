//! # Crawlhunt Core Library
//!
//! Proximity verification and offline synchronization for the Crawlhunt
//! scavenger-hunt / bar-crawl client. The UI layer is a thin shell over
//! this crate: it feeds platform events in and observes published state.
//!
//! ## Architecture
//!
//! - **Location Engine**: authorization lifecycle, current sample, distance math
//! - **Geofencing Engine**: circular region registration and enter/exit tracking
//! - **Beacon Engine**: region-triggered ranging, detected-beacon registry,
//!   staleness cleanup, nearest-beacon resolution
//! - **Sync Engine**: pending-mutation queue and the sync status state machine
//! - **Challenge Generator**: team-scoped, location-stamped, time-limited tasks
//!
//! The first three engines are owned by [`ProximityRuntime`], a single-writer
//! actor fed by a [`PlatformEvent`] channel. Consumers talk to it through a
//! [`RuntimeHandle`] and read snapshots from `tokio::sync::watch` receivers.

pub mod beacon;
pub mod challenge;
pub mod error;
pub mod events;
pub mod geo;
pub mod geofence;
pub mod location;
pub mod platform;
pub mod runtime;
pub mod storage;
pub mod sync;
pub mod testing;

pub use beacon::{
    BeaconEngine, BeaconIdentity, BeaconRegion, BeaconSnapshot, BeaconTagged, DetectedBeacon,
    MonitoringState, Proximity, RangedBeacon,
};
pub use challenge::{
    fetch_active_challenges_for_team, is_eligible_for_completion, BarCrawl, BarStop,
    ChallengeGenerator, DynamicChallenge, Hunt, HuntTask, Team,
};
pub use error::{ChallengeError, ConfigError, CoreError, GeofenceError};
pub use events::{LifecycleEvent, PlatformEvent};
pub use geo::{distance_meters, Coordinate};
pub use geofence::{GeofenceEngine, GeofenceSnapshot, MonitoredRegion};
pub use location::{AuthorizationStatus, LocationEngine, LocationSample, LocationSnapshot};
pub use platform::{BeaconRanger, ChannelBridge, LocationSource, PlatformCommand, RegionMonitor};
pub use runtime::{PlatformServices, ProximityRuntime, RuntimeHandle};
pub use storage::Config;
pub use sync::{
    MutationKind, PayloadRef, SyncEngine, SyncOutcome, SyncSnapshot, SyncStatus, SyncableMutation,
};
