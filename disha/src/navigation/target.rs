//! Navigation target type.

use serde::{Deserialize, Serialize};

use crate::core::types::Pose3D;
use crate::error::{Error, Result};

/// Default frame for navigation goals.
pub const MAP_FRAME: &str = "map";

/// A goal pose submitted to the task manager.
///
/// The id is assigned by the caller and echoed back in [`super::NavStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavTarget {
    pub id: i32,
    /// Frame the goal is expressed in.
    pub frame_id: String,
    pub goal: Pose3D,
}

impl NavTarget {
    pub fn new(id: i32, frame_id: impl Into<String>, goal: Pose3D) -> Self {
        Self {
            id,
            frame_id: frame_id.into(),
            goal,
        }
    }

    /// Target in the map frame.
    pub fn in_map(id: i32, goal: Pose3D) -> Self {
        Self::new(id, MAP_FRAME, goal)
    }

    /// Reject targets the engine cannot interpret.
    pub fn validate(&self) -> Result<()> {
        if self.id < 0 {
            return Err(Error::InvalidArgument(format!(
                "target id must be non-negative, got {}",
                self.id
            )));
        }
        if self.frame_id.trim().is_empty() {
            return Err(Error::InvalidArgument("target frame_id is empty".into()));
        }
        if !self.goal.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "target {} has a non-finite goal pose",
                self.id
            )));
        }
        Ok(())
    }
}
