//! Disha - SLAM mode, map lifecycle and navigation task orchestration
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    session                          │  ← Caller API
//! │               (SlamNavSession)                      │
//! └─────────────────────────────────────────────────────┘
//!                          │ commands
//! ┌─────────────────────────────────────────────────────┐
//! │                    threads/                         │  ← Session worker
//! │        (serializes every state mutation)            │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌──────────────────────────┐ ┌────────────────────────┐
//! │         slam/            │ │      navigation/       │  ← Mode controllers
//! │ (modes, mapping, maps)   │ │ (GRID_MAP, NavStatus)  │
//! └──────────────────────────┘ └────────────────────────┘
//!                          │
//! ┌──────────────────────────┐ ┌────────────────────────┐
//! │         engine/          │ │          io/           │  ← Backends
//! │ (SlamNavEngine, sim)     │ │  (map repository, PGM) │
//! └──────────────────────────┘ └────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │           core/   state/   telemetry/               │  ← Foundation
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! Telemetry flows the other way: the engine publishes odometry and
//! localization straight into bounded drop-oldest queues without passing
//! through the worker.

// ============================================================================
// Layer 1: Core foundation
// ============================================================================
pub mod config;
pub mod core;
pub mod error;

// ============================================================================
// Layer 2: Shared state and telemetry
// ============================================================================
pub mod state;
pub mod telemetry;

// ============================================================================
// Layer 3: Engine boundary and map storage
// ============================================================================
pub mod engine;
pub mod io;

// ============================================================================
// Layer 4: Mode controllers
// ============================================================================
pub mod navigation;
pub mod slam;

// ============================================================================
// Layer 5: Worker and caller API
// ============================================================================
pub mod session;
pub mod threads;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::math;
pub use core::types::{
    AllMapInfo, Header, LocalizationInfo, MapImageData, MapInfo, MapMetaData, Odometry, Point2D,
    PointCloud2, PolyRegion, Pose3D, Quaternion,
};

// Errors and configuration
pub use config::DishaConfig;
pub use error::{Error, ErrorCode, Result, Status};

// Modes
pub use state::{ControllerLevel, NavMode, SlamMode};

// Navigation
pub use navigation::{NavStatus, NavStatusType, NavTarget, describe_fault};

// Engine
pub use engine::{
    EngineError, EngineEvent, EngineFeedback, ReportOutcome, SimulatedEngine,
    SimulatedEngineHandle, SimulationConfig, SlamNavEngine,
};

// Storage
pub use io::MapRepository;

// Telemetry
pub use telemetry::{PublishOutcome, StreamStats, Subscription, TelemetryStats};

// Session
pub use session::SlamNavSession;
