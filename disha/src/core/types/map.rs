//! Map metadata and raster image types.

use serde::{Deserialize, Serialize};

use super::Pose3D;
use crate::error::{Error, Result};

/// Format tag for binary PGM rasters.
pub const PGM_IMAGE_TYPE: &str = "pgm";

/// Gray value of free cells in the raster.
pub const FREE_GRAY: u8 = 254;

/// Gray value of unknown cells in the raster.
pub const UNKNOWN_GRAY: u8 = 205;

/// Gray value of occupied cells in the raster.
pub const OCCUPIED_GRAY: u8 = 0;

/// Rasterized occupancy image of a map.
///
/// The buffer holds `width * height` bytes, row-major, first row at the top
/// of the image. The length invariant is checked at construction and cannot
/// be broken afterwards, including when deserializing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMapImageData")]
pub struct MapImageData {
    width: u32,
    height: u32,
    max_gray_value: u32,
    image_type: String,
    image: Vec<u8>,
}

/// Unchecked wire form of [`MapImageData`].
#[derive(Deserialize)]
struct RawMapImageData {
    width: u32,
    height: u32,
    max_gray_value: u32,
    image_type: String,
    image: Vec<u8>,
}

impl TryFrom<RawMapImageData> for MapImageData {
    type Error = Error;

    fn try_from(raw: RawMapImageData) -> Result<Self> {
        Self::new(
            raw.width,
            raw.height,
            raw.max_gray_value,
            raw.image_type,
            raw.image,
        )
    }
}

impl MapImageData {
    /// Create a raster, validating dimensions against the buffer.
    pub fn new(
        width: u32,
        height: u32,
        max_gray_value: u32,
        image_type: impl Into<String>,
        image: Vec<u8>,
    ) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidArgument(format!(
                "map image must be non-empty, got {}x{}",
                width, height
            )));
        }
        let expected = width as usize * height as usize;
        if image.len() != expected {
            return Err(Error::InvalidArgument(format!(
                "map image has {} bytes, expected {}x{} = {}",
                image.len(),
                width,
                height,
                expected
            )));
        }
        if max_gray_value == 0 || max_gray_value > 255 {
            return Err(Error::InvalidArgument(format!(
                "max gray value {} outside 1..=255",
                max_gray_value
            )));
        }
        Ok(Self {
            width,
            height,
            max_gray_value,
            image_type: image_type.into(),
            image,
        })
    }

    /// 8-bit PGM raster.
    pub fn pgm(width: u32, height: u32, image: Vec<u8>) -> Result<Self> {
        Self::new(width, height, 255, PGM_IMAGE_TYPE, image)
    }

    /// PGM raster with every cell unknown.
    pub fn unknown(width: u32, height: u32) -> Result<Self> {
        Self::pgm(
            width,
            height,
            vec![UNKNOWN_GRAY; width as usize * height as usize],
        )
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn max_gray_value(&self) -> u32 {
        self.max_gray_value
    }

    /// Format tag, e.g. `"pgm"`.
    pub fn image_type(&self) -> &str {
        &self.image_type
    }

    /// Raw raster bytes (`width * height`).
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    /// Gray value at pixel `(col, row)`.
    pub fn pixel(&self, col: u32, row: u32) -> Option<u8> {
        if col >= self.width || row >= self.height {
            return None;
        }
        self.image
            .get(row as usize * self.width as usize + col as usize)
            .copied()
    }

    /// Set the gray value at pixel `(col, row)`; out-of-range writes are ignored.
    pub fn set_pixel(&mut self, col: u32, row: u32, value: u8) {
        if col < self.width && row < self.height {
            let idx = row as usize * self.width as usize + col as usize;
            self.image[idx] = value;
        }
    }

    /// Fraction of pixels that are not unknown.
    pub fn explored_fraction(&self) -> f32 {
        let known = self.image.iter().filter(|&&v| v != UNKNOWN_GRAY).count();
        known as f32 / self.image.len() as f32
    }
}

/// Georeferencing and raster of a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawMapMetaData")]
pub struct MapMetaData {
    /// Meters per pixel, strictly positive.
    pub resolution: f64,
    /// World pose of the lower-left pixel.
    pub origin: Pose3D,
    pub map_image_data: MapImageData,
}

#[derive(Deserialize)]
struct RawMapMetaData {
    resolution: f64,
    origin: Pose3D,
    map_image_data: MapImageData,
}

impl TryFrom<RawMapMetaData> for MapMetaData {
    type Error = Error;

    fn try_from(raw: RawMapMetaData) -> Result<Self> {
        Self::new(raw.resolution, raw.origin, raw.map_image_data)
    }
}

impl MapMetaData {
    /// Create metadata, validating the resolution.
    pub fn new(resolution: f64, origin: Pose3D, map_image_data: MapImageData) -> Result<Self> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(Error::InvalidArgument(format!(
                "map resolution must be positive, got {}",
                resolution
            )));
        }
        Ok(Self {
            resolution,
            origin,
            map_image_data,
        })
    }

    /// Map extent in meters `(width, height)`.
    pub fn extent_m(&self) -> (f64, f64) {
        (
            self.map_image_data.width() as f64 * self.resolution,
            self.map_image_data.height() as f64 * self.resolution,
        )
    }
}

/// A named, persisted map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapInfo {
    /// Unique key within the repository.
    pub map_name: String,
    pub map_meta_data: MapMetaData,
}

/// Snapshot of every persisted map.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllMapInfo {
    /// Map currently staged or active, empty if none.
    pub current_map_name: String,
    /// One entry per persisted map, ordered by name.
    pub map_infos: Vec<MapInfo>,
}

impl AllMapInfo {
    /// Look up a map by name.
    pub fn get(&self, map_name: &str) -> Option<&MapInfo> {
        self.map_infos.iter().find(|m| m.map_name == map_name)
    }

    /// Whether a map with this name exists.
    pub fn contains(&self, map_name: &str) -> bool {
        self.get(map_name).is_some()
    }
}
