//! Platform boundaries.
//!
//! The OS location, region-monitoring and beacon-ranging facilities sit
//! behind three traits. Calls are fire-and-forget: the platform answers by
//! pushing [`PlatformEvent`](crate::PlatformEvent)s into the runtime.
//!
//! [`ChannelBridge`] is the production implementation: it serializes every
//! request as a [`PlatformCommand`] for the host shell to execute. Fakes for
//! tests live in [`crate::testing`].

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::beacon::BeaconRegion;
use crate::geofence::MonitoredRegion;

/// Platform monitor/ranger failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlatformError {
    #[error("platform rejected request: {0}")]
    Rejected(String),

    #[error("platform bridge is closed")]
    Closed,
}

/// Continuous position source plus its authorization prompt.
pub trait LocationSource: Send + Sync {
    /// Ask the user for location permission. The answer arrives as an
    /// `authorization_changed` event.
    fn request_authorization(&self);

    fn start_updates(&self);

    fn stop_updates(&self);
}

/// OS circular-region monitoring.
pub trait RegionMonitor: Send + Sync {
    /// Hard cap on concurrently monitored regions.
    fn max_monitored_regions(&self) -> usize;

    fn start_monitoring(&self, region: &MonitoredRegion) -> Result<(), PlatformError>;

    fn stop_monitoring(&self, identifier: &str);
}

/// OS beacon region monitoring and ranging.
pub trait BeaconRanger: Send + Sync {
    fn request_authorization(&self);

    fn start_monitoring(&self, region: &BeaconRegion);

    fn stop_monitoring(&self, region: &BeaconRegion);

    fn start_ranging(&self, region: &BeaconRegion);

    fn stop_ranging(&self, region: &BeaconRegion);
}

/// A request for the host shell, one per trait call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlatformCommand {
    RequestAuthorization,
    StartLocationUpdates,
    StopLocationUpdates,
    StartRegionMonitoring { region: MonitoredRegion },
    StopRegionMonitoring { identifier: String },
    StartBeaconMonitoring { region: BeaconRegion },
    StopBeaconMonitoring { identifier: String },
    StartRanging { region: BeaconRegion },
    StopRanging { identifier: String },
}

/// Forwards every platform request to the host shell over a channel.
#[derive(Debug, Clone)]
pub struct ChannelBridge {
    commands: mpsc::UnboundedSender<PlatformCommand>,
    max_regions: usize,
}

impl ChannelBridge {
    /// Create a bridge and the receiver the host shell drains.
    pub fn new(max_regions: usize) -> (Self, mpsc::UnboundedReceiver<PlatformCommand>) {
        let (commands, rx) = mpsc::unbounded_channel();
        (
            Self {
                commands,
                max_regions,
            },
            rx,
        )
    }

    fn send(&self, command: PlatformCommand) -> Result<(), PlatformError> {
        self.commands.send(command).map_err(|e| {
            tracing::warn!(command = ?e.0, "platform bridge closed, dropping command");
            PlatformError::Closed
        })
    }
}

impl LocationSource for ChannelBridge {
    fn request_authorization(&self) {
        let _ = self.send(PlatformCommand::RequestAuthorization);
    }

    fn start_updates(&self) {
        let _ = self.send(PlatformCommand::StartLocationUpdates);
    }

    fn stop_updates(&self) {
        let _ = self.send(PlatformCommand::StopLocationUpdates);
    }
}

impl RegionMonitor for ChannelBridge {
    fn max_monitored_regions(&self) -> usize {
        self.max_regions
    }

    fn start_monitoring(&self, region: &MonitoredRegion) -> Result<(), PlatformError> {
        self.send(PlatformCommand::StartRegionMonitoring {
            region: region.clone(),
        })
    }

    fn stop_monitoring(&self, identifier: &str) {
        let _ = self.send(PlatformCommand::StopRegionMonitoring {
            identifier: identifier.to_string(),
        });
    }
}

impl BeaconRanger for ChannelBridge {
    fn request_authorization(&self) {
        let _ = self.send(PlatformCommand::RequestAuthorization);
    }

    fn start_monitoring(&self, region: &BeaconRegion) {
        let _ = self.send(PlatformCommand::StartBeaconMonitoring {
            region: region.clone(),
        });
    }

    fn stop_monitoring(&self, region: &BeaconRegion) {
        let _ = self.send(PlatformCommand::StopBeaconMonitoring {
            identifier: region.identifier.clone(),
        });
    }

    fn start_ranging(&self, region: &BeaconRegion) {
        let _ = self.send(PlatformCommand::StartRanging {
            region: region.clone(),
        });
    }

    fn stop_ranging(&self, region: &BeaconRegion) {
        let _ = self.send(PlatformCommand::StopRanging {
            identifier: region.identifier.clone(),
        });
    }
}
