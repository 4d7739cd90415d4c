//! Pose, point and localization types.

use serde::{Deserialize, Serialize};

use crate::core::math::{euler_to_quaternion, quaternion_to_euler};

/// A 2D point in meters.
///
/// Single precision, matching the region geometry the robot exchanges with
/// its planner.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point2D {
    /// X coordinate in meters
    pub x: f32,
    /// Y coordinate in meters
    pub y: f32,
}

impl Point2D {
    /// Create a new point.
    #[inline]
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point2D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Rotation as a unit quaternion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Quaternion {
    /// Identity rotation.
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    /// Build from roll/pitch/yaw in radians.
    pub fn from_euler(roll: f64, pitch: f64, yaw: f64) -> Self {
        let [x, y, z, w] = euler_to_quaternion(roll, pitch, yaw);
        Self { x, y, z, w }
    }

    /// Roll/pitch/yaw in radians.
    pub fn to_euler(&self) -> (f64, f64, f64) {
        quaternion_to_euler([self.x, self.y, self.z, self.w])
    }

    /// Components as `[x, y, z, w]`.
    pub fn as_array(&self) -> [f64; 4] {
        [self.x, self.y, self.z, self.w]
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Robot pose in 3D space with Euler orientation.
///
/// Position in meters, orientation as roll/pitch/yaw in radians. This is a
/// plain value type: it is copied on assignment and never shared.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose3D {
    /// Position `[x, y, z]` in meters
    pub position: [f64; 3],
    /// Orientation `[roll, pitch, yaw]` in radians
    pub orientation: [f64; 3],
}

impl Pose3D {
    /// Create a pose from position and Euler orientation.
    #[inline]
    pub fn new(position: [f64; 3], orientation: [f64; 3]) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Planar pose at height zero with only a yaw component.
    #[inline]
    pub fn planar(x: f64, y: f64, yaw: f64) -> Self {
        Self {
            position: [x, y, 0.0],
            orientation: [0.0, 0.0, yaw],
        }
    }

    /// Identity pose at the origin.
    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    #[inline]
    pub fn x(&self) -> f64 {
        self.position[0]
    }

    #[inline]
    pub fn y(&self) -> f64 {
        self.position[1]
    }

    #[inline]
    pub fn yaw(&self) -> f64 {
        self.orientation[2]
    }

    /// Orientation as a quaternion.
    pub fn quaternion(&self) -> Quaternion {
        let [roll, pitch, yaw] = self.orientation;
        Quaternion::from_euler(roll, pitch, yaw)
    }

    /// Planar (XY) distance to another pose.
    pub fn planar_distance(&self, other: &Pose3D) -> f64 {
        let dx = self.x() - other.x();
        let dy = self.y() - other.y();
        (dx * dx + dy * dy).sqrt()
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.position
            .iter()
            .chain(self.orientation.iter())
            .all(|v| v.is_finite())
    }
}

/// Localization estimate reported by the SLAM engine.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct LocalizationInfo {
    /// Whether the pose estimate is trustworthy (converged).
    pub is_localization: bool,
    /// Estimated pose in the map frame.
    pub pose: Pose3D,
}

impl LocalizationInfo {
    /// An untrusted estimate at the origin.
    pub fn untrusted() -> Self {
        Self::default()
    }

    /// A converged estimate at `pose`.
    pub fn localized(pose: Pose3D) -> Self {
        Self {
            is_localization: true,
            pose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::PI;

    #[test]
    fn test_pose_is_copied() {
        let a = Pose3D::planar(1.0, 2.0, 0.5);
        let mut b = a;
        b.position[0] = 9.0;
        assert_relative_eq!(a.x(), 1.0);
        assert_relative_eq!(b.x(), 9.0);
    }

    #[test]
    fn test_planar_distance_ignores_height() {
        let a = Pose3D::new([0.0, 0.0, 0.0], [0.0; 3]);
        let b = Pose3D::new([3.0, 4.0, 10.0], [0.0; 3]);
        assert_relative_eq!(a.planar_distance(&b), 5.0);
    }

    #[test]
    fn test_pose_quaternion() {
        let pose = Pose3D::planar(0.0, 0.0, PI);
        let q = pose.quaternion();
        assert_relative_eq!(q.z.abs(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(q.w, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_pose() {
        let pose = Pose3D::planar(f64::NAN, 0.0, 0.0);
        assert!(!pose.is_finite());
        assert!(Pose3D::identity().is_finite());
    }

    #[test]
    fn test_default_localization_is_untrusted() {
        let info = LocalizationInfo::default();
        assert!(!info.is_localization);
        assert_eq!(info.pose, Pose3D::identity());
    }

    #[test]
    fn test_point_distance() {
        let a = Point2D::new(0.0, 0.0);
        let b = Point2D::new(3.0, 4.0);
        assert_relative_eq!(a.distance(&b), 5.0);
    }
}
