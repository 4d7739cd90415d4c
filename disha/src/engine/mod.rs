//! Seam to the perception/SLAM engine.
//!
//! The session never runs mapping, localization or planning itself. It
//! sequences calls into a [`SlamNavEngine`] and receives asynchronous
//! outcomes back through [`EngineFeedback`].
//!
//! # Contents
//!
//! - [`SlamNavEngine`]: trait implemented by engine backends
//! - [`EngineFeedback`]: handle the engine uses to report task outcomes and
//!   push telemetry
//! - [`SimulatedEngine`]: in-process backend for tests and the demo binary

mod feedback;
mod simulated;

pub use feedback::{EngineEvent, EngineFeedback, ReportOutcome};
pub use simulated::{SimulatedEngine, SimulatedEngineHandle, SimulationConfig, StepOutcome};

use crate::core::types::{MapInfo, MapMetaData, PointCloud2, Pose3D};
use crate::navigation::NavTarget;
use crate::state::{NavMode, SlamMode};

/// Failure reported by an engine call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// Engine could not be reached.
    #[error("unreachable: {0}")]
    Unreachable(String),

    /// Engine refused the request.
    #[error("rejected: {0}")]
    Rejected(String),

    /// Engine failed while handling the request.
    #[error("internal: {0}")]
    Internal(String),
}

/// Result type for engine calls.
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// The external mapping, localization and navigation engine.
///
/// Calls are made from a single session worker thread, one at a time. A
/// call returns once the engine has accepted the request; long-running
/// outcomes (goal reached, goal failed) arrive later via [`EngineFeedback`].
///
/// Implementations must not report outcomes synchronously from inside a
/// call: feedback is queued behind the call in progress.
pub trait SlamNavEngine: Send {
    /// Hand the engine its feedback handle. Called once before `connect`.
    fn attach(&mut self, feedback: EngineFeedback);

    /// Establish the link to the engine.
    fn connect(&mut self) -> EngineResult<()>;

    /// Release engine resources. Called once on session shutdown.
    fn shutdown(&mut self);

    /// Switch SLAM mode. `map` is set for LOCALIZATION only.
    fn set_slam_mode(&mut self, mode: SlamMode, map: Option<&MapInfo>) -> EngineResult<()>;

    /// Begin accumulating map data (MAPPING mode).
    fn start_mapping(&mut self) -> EngineResult<()>;

    /// Discard accumulated map data.
    fn cancel_mapping(&mut self) -> EngineResult<()>;

    /// Snapshot of the map built so far.
    fn capture_map(&mut self) -> EngineResult<MapMetaData>;

    /// Seed localization with an initial pose guess.
    fn init_pose(&mut self, pose: &Pose3D) -> EngineResult<()>;

    /// Switch navigation mode. `map` is set for GRID_MAP only.
    fn set_nav_mode(&mut self, mode: NavMode, map: Option<&MapInfo>) -> EngineResult<()>;

    /// Start driving to a goal.
    fn dispatch_goal(&mut self, target: &NavTarget) -> EngineResult<()>;

    fn pause_task(&mut self, id: i32) -> EngineResult<()>;

    fn resume_task(&mut self, id: i32) -> EngineResult<()>;

    fn cancel_task(&mut self, id: i32) -> EngineResult<()>;

    /// Start or stop odometry production.
    fn set_odometry_stream(&mut self, open: bool) -> EngineResult<()>;

    /// Start or stop localization pose production.
    fn set_localization_stream(&mut self, open: bool) -> EngineResult<()>;

    /// Point cloud of the current map.
    fn point_cloud_map(&mut self) -> EngineResult<PointCloud2>;
}
