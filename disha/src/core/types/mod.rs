//! Core data types shared by every layer.
//!
//! Spatial types:
//! - [`Point2D`], [`PolyRegion`]: planar geometry
//! - [`Pose3D`], [`Quaternion`]: robot pose with Euler or quaternion orientation
//!
//! Telemetry types:
//! - [`Odometry`]: continuous motion estimate
//! - [`LocalizationInfo`]: map-relative pose estimate
//!
//! Map types:
//! - [`MapImageData`], [`MapMetaData`], [`MapInfo`], [`AllMapInfo`]
//! - [`PointCloud2`]: point cloud map

mod map;
mod odometry;
mod point_cloud;
mod pose;
mod region;

pub use map::{
    AllMapInfo, FREE_GRAY, MapImageData, MapInfo, MapMetaData, OCCUPIED_GRAY, PGM_IMAGE_TYPE,
    UNKNOWN_GRAY,
};
pub use odometry::{Header, Odometry};
pub use point_cloud::{PointCloud2, PointField, datatype};
pub use pose::{LocalizationInfo, Point2D, Pose3D, Quaternion};
pub use region::PolyRegion;
