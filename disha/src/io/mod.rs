//! I/O and persistence layer.
//!
//! # Contents
//!
//! - [`map_repository`]: PGM+YAML map storage with an in-memory index
//! - [`pgm`]: binary PGM codec for map rasters

pub mod map_repository;
pub mod pgm;

pub use map_repository::{MapRepository, PGM_FILE, YAML_FILE, validate_map_name};
