//! Navigation mode and task management.
//!
//! # Architecture
//!
//! ```text
//! NavModeController              ← IDLE / GRID_MAP gate
//!     │ owns
//!     ▼
//! NavTaskManager                 ← NavStatus state machine
//!     │ dispatch / pause / resume / cancel
//!     ▼
//! SlamNavEngine                  ← drives the robot, reports outcomes
//! ```
//!
//! # Key Types
//!
//! - [`NavTarget`]: caller-assigned id plus goal pose
//! - [`NavStatus`]: pollable task snapshot, reset whenever navigation goes IDLE
//! - [`describe_fault`]: text for engine fault codes

mod controller;
pub mod faults;
mod status;
mod target;
mod task;

pub use controller::NavModeController;
pub use faults::describe_fault;
pub use status::{NavEvent, NavStatus, NavStatusType};
pub use target::{MAP_FRAME, NavTarget};
pub use task::NavTaskManager;
