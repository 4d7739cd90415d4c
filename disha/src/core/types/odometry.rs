//! Odometry telemetry samples.

use serde::{Deserialize, Serialize};

use super::{Pose3D, Quaternion};

/// Message header: timestamp and reference frame.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    /// Timestamp in nanoseconds.
    pub stamp: i64,
    /// Coordinate frame name.
    pub frame_id: String,
}

impl Header {
    pub fn new(stamp: i64, frame_id: impl Into<String>) -> Self {
        Self {
            stamp,
            frame_id: frame_id.into(),
        }
    }
}

/// One odometry sample.
///
/// Each sample is an independent snapshot of the estimated motion state,
/// not a delta from the previous sample.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Odometry {
    pub header: Header,
    /// Frame the twist is expressed in (usually the robot base).
    pub child_frame_id: String,
    /// Position `[x, y, z]` in meters.
    pub position: [f64; 3],
    /// Orientation quaternion.
    pub orientation: Quaternion,
    /// Linear velocity `[vx, vy, vz]` in m/s.
    pub linear_velocity: [f64; 3],
    /// Angular velocity `[wx, wy, wz]` in rad/s.
    pub angular_velocity: [f64; 3],
}

impl Odometry {
    /// Build a sample from a pose and planar twist.
    pub fn from_pose(
        stamp: i64,
        pose: &Pose3D,
        linear_velocity: [f64; 3],
        angular_velocity: [f64; 3],
    ) -> Self {
        Self {
            header: Header::new(stamp, "odom"),
            child_frame_id: "base_link".to_string(),
            position: pose.position,
            orientation: pose.quaternion(),
            linear_velocity,
            angular_velocity,
        }
    }

    /// Pose view of this sample (orientation converted to Euler).
    pub fn pose(&self) -> Pose3D {
        let (roll, pitch, yaw) = self.orientation.to_euler();
        Pose3D::new(self.position, [roll, pitch, yaw])
    }
}
