//! Core foundation layer.
//!
//! This is the bottom layer with no internal dependencies besides the error
//! type. All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Spatial, telemetry and map data types
//! - [`math`]: Angle normalization and rotation conversions

pub mod math;
pub mod types;
