//! Telemetry stream manager.
//!
//! Two push streams leave the session: odometry and localization pose. Each
//! is a [`StreamHub`] with open/close and subscribe/unsubscribe lifecycles
//! that are independent of each other and of the control flow.

mod delivery;
mod hub;

pub use delivery::DeliveryThread;
pub use hub::{PublishOutcome, StreamHub, StreamStats, Subscription};

use serde::Serialize;

use crate::core::types::{LocalizationInfo, Odometry};

/// Counters for both streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TelemetryStats {
    pub odometry: StreamStats,
    pub localization: StreamStats,
}

/// The session's telemetry streams.
pub struct TelemetryHub {
    pub odometry: StreamHub<Odometry>,
    pub localization: StreamHub<LocalizationInfo>,
}

impl TelemetryHub {
    pub fn new(odometry_capacity: usize, localization_capacity: usize) -> Self {
        Self {
            odometry: StreamHub::new("odometry", odometry_capacity),
            localization: StreamHub::new("localization", localization_capacity),
        }
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            odometry: self.odometry.stats(),
            localization: self.localization.stats(),
        }
    }

    /// Close both streams and detach their subscribers.
    pub fn shutdown(&self) {
        self.odometry.set_open(false);
        self.localization.set_open(false);
        self.odometry.unsubscribe();
        self.localization.unsubscribe();
    }
}
