//! Replay a scripted session against the proximity runtime.
//!
//! The script is a JSON array. Each entry is either a platform event
//! (`{"type": "region_entered", "identifier": "bar-1"}`) or one of the
//! consumer actions below. Platform requests are captured through a
//! [`ChannelBridge`] and flushes go to an in-memory remote.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use crawlhunt_core::runtime::PlatformServices;
use crawlhunt_core::testing::ScriptedRemote;
use crawlhunt_core::{
    BeaconSnapshot, ChannelBridge, Config, GeofenceSnapshot, LocationSnapshot, MutationKind,
    PayloadRef, PlatformCommand, PlatformEvent, ProximityRuntime, RuntimeHandle, SyncOutcome,
    SyncSnapshot, SyncStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Args)]
pub struct SimulateArgs {
    /// Path to the JSON script
    script: PathBuf,
    /// Start with connectivity (otherwise the session starts offline)
    #[arg(long)]
    online: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Action {
    MonitorRegion {
        identifier: String,
        latitude: f64,
        longitude: f64,
        radius: f64,
    },
    StartLocationUpdates,
    StartBeaconMonitoring,
    SaveForSync {
        kind: MutationKind,
        entity_id: String,
    },
    TrySync,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Step {
    Action(Action),
    Event(PlatformEvent),
}

#[derive(Serialize)]
struct Report {
    location: LocationSnapshot,
    geofence: GeofenceSnapshot,
    beacons: BeaconSnapshot,
    sync: SyncSnapshot,
    outcomes: Vec<SyncOutcome>,
    errors: Vec<String>,
    platform_commands: Vec<PlatformCommand>,
}

pub fn run(args: SimulateArgs) -> Result<(), Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(&args.script)?;
    let steps: Vec<Step> = serde_json::from_str(&raw)?;
    let config = Config::load_or_default();

    let rt = tokio::runtime::Runtime::new()?;
    let report = rt.block_on(replay(config, steps, args.online))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn replay(
    config: Config,
    steps: Vec<Step>,
    online: bool,
) -> Result<Report, Box<dyn std::error::Error>> {
    let (bridge, mut commands) = ChannelBridge::new(config.geofence.max_regions);
    let bridge = Arc::new(bridge);
    let platform = PlatformServices {
        location: bridge.clone(),
        regions: bridge.clone(),
        beacons: bridge,
    };
    // Only in-memory state here; never touch the user's queue file.
    let mut config = config;
    config.sync.queue_file = None;

    let (runtime, handle) = ProximityRuntime::new(&config, platform, ScriptedRemote::new());
    let task = runtime.spawn();

    if !online {
        handle
            .send_event(PlatformEvent::ConnectivityChanged { online: false })
            .await?;
    }

    let mut outcomes = Vec::new();
    let mut errors = Vec::new();
    info!(steps = steps.len(), "replaying script");
    for step in steps {
        match step {
            Step::Event(event) => handle.send_event(event).await?,
            Step::Action(action) => {
                if let Err(e) = apply(&handle, action, &mut outcomes).await {
                    warn!(error = %e, "script action failed");
                    errors.push(e.to_string());
                }
            }
        }
    }

    settle(&handle).await?;
    let report = Report {
        location: handle.location().borrow().clone(),
        geofence: handle.geofence().borrow().clone(),
        beacons: handle.beacons().borrow().clone(),
        sync: handle.sync().snapshot(),
        outcomes,
        errors,
        platform_commands: Vec::new(),
    };

    drop(handle);
    task.await??;

    let mut platform_commands = Vec::new();
    while let Ok(command) = commands.try_recv() {
        platform_commands.push(command);
    }
    Ok(Report {
        platform_commands,
        ..report
    })
}

async fn apply(
    handle: &RuntimeHandle,
    action: Action,
    outcomes: &mut Vec<SyncOutcome>,
) -> Result<(), crawlhunt_core::CoreError> {
    match action {
        Action::MonitorRegion {
            identifier,
            latitude,
            longitude,
            radius,
        } => {
            handle
                .start_monitoring(latitude, longitude, radius, identifier)
                .await?
        }
        Action::StartLocationUpdates => handle.start_location_updates().await?,
        Action::StartBeaconMonitoring => handle.start_beacon_monitoring().await?,
        Action::SaveForSync { kind, entity_id } => {
            handle.save_for_sync(PayloadRef::new(kind, entity_id));
        }
        Action::TrySync => outcomes.push(handle.try_sync().await),
    }
    Ok(())
}

/// Wait until queued events are applied and no triggered flush is running.
async fn settle(handle: &RuntimeHandle) -> Result<(), crawlhunt_core::CoreError> {
    handle.cleanup_old_beacons().await?;
    let mut sync = handle.sync_status();
    let idle = sync.wait_for(|s| s.status != SyncStatus::Syncing);
    if tokio::time::timeout(SETTLE_TIMEOUT, idle).await.is_err() {
        warn!("sync still running after settle timeout");
    }
    Ok(())
}
