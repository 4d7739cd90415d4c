//! Map storage using ROS-standard PGM+YAML format.
//!
//! This module provides:
//! - Saving, loading and deleting named maps
//! - A startup scan that indexes every readable map under the storage root
//! - Point-in-time snapshots of the index
//!
//! ## File Format
//!
//! Each map lives in its own directory:
//! - `{root}/{name}/map.pgm` - Binary PGM grayscale raster
//! - `{root}/{name}/map.yaml` - YAML metadata (ROS map_server fields plus
//!   Disha extensions)
//!
//! Files are written under temporary names and renamed into place, and the
//! in-memory index is updated only after both files land.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::pgm;
use crate::core::types::{MapInfo, MapMetaData, Pose3D};
use crate::error::{Error, Result};

/// Metadata file name inside a map directory.
pub const YAML_FILE: &str = "map.yaml";

/// Raster file name inside a map directory.
pub const PGM_FILE: &str = "map.pgm";

const DEFAULT_OCCUPIED_THRESH: f64 = 0.65;
const DEFAULT_FREE_THRESH: f64 = 0.196;

/// On-disk map metadata.
///
/// The first fields are ROS-standard and compatible with Nav2 map_server.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MapFile {
    // === ROS-standard fields ===
    /// Raster filename (relative to the YAML file).
    image: String,
    /// Meters per pixel.
    resolution: f64,
    /// `[x, y, yaw]` of the lower-left pixel.
    origin: [f64; 3],
    #[serde(default = "default_occupied_thresh")]
    occupied_thresh: f64,
    #[serde(default = "default_free_thresh")]
    free_thresh: f64,
    #[serde(default)]
    negate: u8,

    // === Disha extensions ===
    map_name: String,
    /// Full 6-DoF origin; `origin` above keeps only the planar part.
    #[serde(default)]
    origin_pose: Option<Pose3D>,
    width: u32,
    height: u32,
    #[serde(default = "default_max_gray")]
    max_gray_value: u32,
    #[serde(default = "default_image_type")]
    image_type: String,
    /// Creation timestamp (microseconds since epoch).
    #[serde(default)]
    created_at_us: u64,
}

fn default_occupied_thresh() -> f64 {
    DEFAULT_OCCUPIED_THRESH
}

fn default_free_thresh() -> f64 {
    DEFAULT_FREE_THRESH
}

fn default_max_gray() -> u32 {
    255
}

fn default_image_type() -> String {
    crate::core::types::PGM_IMAGE_TYPE.to_string()
}

fn now_us() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

/// Reject names that are empty or would escape the storage root.
pub fn validate_map_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::InvalidArgument("map name is empty".into()));
    }
    if name.contains(['/', '\\']) || name == "." || name == ".." || name.contains('\0') {
        return Err(Error::InvalidArgument(format!(
            "map name {:?} contains path separators",
            name
        )));
    }
    Ok(())
}

/// Persistent map storage with an in-memory index.
pub struct MapRepository {
    /// Base directory for map storage.
    base_path: PathBuf,
    /// Indexed maps, ordered by name.
    index: RwLock<BTreeMap<String, MapInfo>>,
    /// Serializes writers so two saves never interleave their renames.
    write_lock: Mutex<()>,
}

impl MapRepository {
    /// Open the repository, creating the storage directory if needed.
    pub fn open(base_path: &Path) -> Result<Self> {
        if !base_path.exists() {
            fs::create_dir_all(base_path)?;
        }

        let repository = Self {
            base_path: base_path.to_path_buf(),
            index: RwLock::new(BTreeMap::new()),
            write_lock: Mutex::new(()),
        };
        repository.reload()?;
        Ok(repository)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Rebuild the index from disk; returns the number of maps found.
    ///
    /// Maps are keyed by their directory name. A `map_name` in the YAML that
    /// disagrees (a renamed or copied directory) is overridden with a warning.
    pub fn reload(&self) -> Result<usize> {
        let mut found = BTreeMap::new();
        for entry in fs::read_dir(&self.base_path)?.flatten() {
            let dir = entry.path();
            if !dir.join(YAML_FILE).is_file() {
                continue;
            }
            let Some(name) = entry
                .file_name()
                .to_str()
                .filter(|n| validate_map_name(n).is_ok())
                .map(str::to_string)
            else {
                log::warn!("Skipping map with unusable directory name {}", dir.display());
                continue;
            };
            match self.read_map(&dir, &name) {
                Ok(info) => {
                    found.insert(name, info);
                }
                Err(e) => log::warn!("Skipping unreadable map {}: {}", dir.display(), e),
            }
        }

        let count = found.len();
        *self.index.write() = found;
        log::info!("Loaded {} maps from {}", count, self.base_path.display());
        Ok(count)
    }

    fn map_dir(&self, name: &str) -> PathBuf {
        self.base_path.join(name)
    }

    fn read_map(&self, dir: &Path, name: &str) -> Result<MapInfo> {
        let content = fs::read_to_string(dir.join(YAML_FILE))?;
        let file: MapFile = serde_yaml::from_str(&content)?;
        if file.map_name != name {
            log::warn!(
                "Map in {} calls itself {:?}, indexing it as {:?}",
                dir.display(),
                file.map_name,
                name
            );
        }
        let image = pgm::read_file(&dir.join(&file.image))?;
        if image.width() != file.width || image.height() != file.height {
            return Err(Error::InvalidArgument(format!(
                "raster is {}x{}, metadata says {}x{}",
                image.width(),
                image.height(),
                file.width,
                file.height
            )));
        }

        let origin = file
            .origin_pose
            .unwrap_or_else(|| Pose3D::planar(file.origin[0], file.origin[1], file.origin[2]));
        Ok(MapInfo {
            map_name: name.to_string(),
            map_meta_data: MapMetaData::new(file.resolution, origin, image)?,
        })
    }

    /// Persist `meta` under `name`, replacing any existing map of that name.
    pub fn save(&self, name: &str, meta: MapMetaData) -> Result<MapInfo> {
        validate_map_name(name)?;
        let _guard = self.write_lock.lock();

        let dir = self.map_dir(name);
        fs::create_dir_all(&dir)?;

        let image = &meta.map_image_data;
        let file = MapFile {
            image: PGM_FILE.to_string(),
            resolution: meta.resolution,
            origin: [meta.origin.x(), meta.origin.y(), meta.origin.yaw()],
            occupied_thresh: DEFAULT_OCCUPIED_THRESH,
            free_thresh: DEFAULT_FREE_THRESH,
            negate: 0,
            map_name: name.to_string(),
            origin_pose: Some(meta.origin),
            width: image.width(),
            height: image.height(),
            max_gray_value: image.max_gray_value(),
            image_type: image.image_type().to_string(),
            created_at_us: now_us(),
        };

        let pgm_tmp = dir.join(format!("{}.tmp", PGM_FILE));
        let yaml_tmp = dir.join(format!("{}.tmp", YAML_FILE));
        pgm::write_file(&pgm_tmp, image)?;
        Self::write_yaml(&yaml_tmp, &file)?;
        fs::rename(&pgm_tmp, dir.join(PGM_FILE))?;
        fs::rename(&yaml_tmp, dir.join(YAML_FILE))?;

        let info = MapInfo {
            map_name: name.to_string(),
            map_meta_data: meta,
        };
        let replaced = self
            .index
            .write()
            .insert(name.to_string(), info.clone())
            .is_some();

        log::info!(
            "Saved map {} ({}x{} @ {}m){}",
            name,
            file.width,
            file.height,
            file.resolution,
            if replaced { ", replacing previous" } else { "" }
        );
        Ok(info)
    }

    fn write_yaml(path: &Path, file: &MapFile) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "# Map saved by Disha")?;
        writeln!(writer, "# ROS-standard format with Disha extensions")?;
        writeln!(writer)?;
        serde_yaml::to_writer(&mut writer, file)?;
        writer.flush()?;
        Ok(())
    }

    /// Remove a map. Returns false if it did not exist.
    pub fn delete(&self, name: &str) -> Result<bool> {
        let _guard = self.write_lock.lock();
        if !self.contains(name) {
            return Ok(false);
        }

        // Files go first: a failed removal must leave the map indexed.
        let dir = self.map_dir(name);
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
        }
        self.index.write().remove(name);
        log::info!("Deleted map {}", name);
        Ok(true)
    }

    /// Copy of an indexed map.
    pub fn get(&self, name: &str) -> Option<MapInfo> {
        self.index.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.read().contains_key(name)
    }

    /// Every indexed map, ordered by name.
    pub fn snapshot(&self) -> Vec<MapInfo> {
        self.index.read().values().cloned().collect()
    }

    /// `[yaml, pgm]` paths of a map.
    pub fn map_paths(&self, name: &str) -> Option<Vec<PathBuf>> {
        if !self.contains(name) {
            return None;
        }
        let dir = self.map_dir(name);
        Some(vec![dir.join(YAML_FILE), dir.join(PGM_FILE)])
    }

    /// Map name for a map directory, YAML path or PGM path under the
    /// storage root.
    ///
    /// A bare map name is accepted too. Paths outside the root never resolve.
    pub fn resolve_path(&self, path: &str) -> Option<String> {
        let path = path.trim();
        if validate_map_name(path).is_ok() {
            return self.contains(path).then(|| path.to_string());
        }

        let path = Path::new(path);
        let dir = match path.file_name()?.to_str()? {
            YAML_FILE | PGM_FILE => path.parent()?,
            _ => path,
        };
        let dir = fs::canonicalize(dir).ok()?;
        let root = fs::canonicalize(&self.base_path).ok()?;
        if dir.parent()? != root {
            return None;
        }
        let name = dir.file_name()?.to_str()?;
        self.contains(name).then(|| name.to_string())
    }

    pub fn len(&self) -> usize {
        self.index.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{FREE_GRAY, MapImageData, OCCUPIED_GRAY};
    use tempfile::TempDir;

    fn test_meta() -> MapMetaData {
        let mut img = MapImageData::unknown(20, 10).unwrap();
        img.set_pixel(0, 0, OCCUPIED_GRAY);
        img.set_pixel(5, 5, FREE_GRAY);
        MapMetaData::new(0.05, Pose3D::planar(-0.5, -0.25, 0.0), img).unwrap()
    }

    #[test]
    fn test_repository_creation() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("maps");
        let repo = MapRepository::open(&root).unwrap();
        assert!(repo.is_empty());
        assert!(root.is_dir());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        let meta = test_meta();
        repo.save("kitchen", meta.clone()).unwrap();
        assert_eq!(repo.len(), 1);

        // A fresh repository sees the same map after its startup scan.
        let reopened = MapRepository::open(dir.path()).unwrap();
        let info = reopened.get("kitchen").unwrap();
        assert_eq!(info.map_meta_data, meta);
    }

    #[test]
    fn test_save_overwrites() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("kitchen", test_meta()).unwrap();

        let img = MapImageData::unknown(4, 4).unwrap();
        let smaller = MapMetaData::new(0.1, Pose3D::identity(), img).unwrap();
        repo.save("kitchen", smaller).unwrap();

        assert_eq!(repo.len(), 1);
        let reopened = MapRepository::open(dir.path()).unwrap();
        assert_eq!(
            reopened.get("kitchen").unwrap().map_meta_data.map_image_data.width(),
            4
        );
    }

    #[test]
    fn test_no_temp_files_left() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("kitchen", test_meta()).unwrap();
        let names: Vec<String> = fs::read_dir(dir.path().join("kitchen"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names.len(), 2);
        assert!(names.iter().all(|n| !n.ends_with(".tmp")));
    }

    #[test]
    fn test_delete_map() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("kitchen", test_meta()).unwrap();

        assert!(repo.delete("kitchen").unwrap());
        assert!(!repo.delete("kitchen").unwrap());
        assert!(repo.get("kitchen").is_none());
        assert!(!dir.path().join("kitchen").exists());
    }

    #[test]
    fn test_invalid_names() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        for name in ["", "  ", "a/b", "..", "a\\b"] {
            assert!(
                matches!(repo.save(name, test_meta()), Err(Error::InvalidArgument(_))),
                "{:?} accepted",
                name
            );
        }
    }

    #[test]
    fn test_resolve_path_and_paths() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("office", test_meta()).unwrap();

        let paths = repo.map_paths("office").unwrap();
        assert!(paths[0].ends_with("office/map.yaml"));
        assert!(paths[1].ends_with("office/map.pgm"));

        for p in &paths {
            assert_eq!(repo.resolve_path(&p.to_string_lossy()), Some("office".into()));
        }
        let map_dir = dir.path().join("office");
        assert_eq!(
            repo.resolve_path(&map_dir.to_string_lossy()),
            Some("office".into())
        );
        assert_eq!(repo.resolve_path("office"), Some("office".into()));
        assert_eq!(repo.resolve_path(" office "), Some("office".into()));
        assert_eq!(repo.resolve_path("/nowhere/lab/map.yaml"), None);
        assert_eq!(repo.resolve_path(""), None);
        assert!(repo.map_paths("lab").is_none());
    }

    #[test]
    fn test_unreadable_map_skipped() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("good", test_meta()).unwrap();

        let bad = dir.path().join("bad");
        fs::create_dir_all(&bad).unwrap();
        fs::write(bad.join(YAML_FILE), "not: [valid").unwrap();

        assert_eq!(repo.reload().unwrap(), 1);
        assert!(repo.contains("good"));
    }

    #[test]
    fn test_snapshot_ordered_by_name() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("zeta", test_meta()).unwrap();
        repo.save("alpha", test_meta()).unwrap();
        let names: Vec<String> = repo.snapshot().into_iter().map(|m| m.map_name).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_resolve_path_outside_root() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(&dir.path().join("maps")).unwrap();
        repo.save("office", test_meta()).unwrap();

        // A same-named map somewhere else is not ours.
        let elsewhere = MapRepository::open(&dir.path().join("elsewhere")).unwrap();
        elsewhere.save("office", test_meta()).unwrap();
        for p in elsewhere.map_paths("office").unwrap() {
            assert_eq!(repo.resolve_path(&p.to_string_lossy()), None);
        }
        let foreign_dir = dir.path().join("elsewhere").join("office");
        assert_eq!(repo.resolve_path(&foreign_dir.to_string_lossy()), None);

        let nested = dir.path().join("maps").join("office").join("office");
        assert_eq!(repo.resolve_path(&nested.to_string_lossy()), None);
    }

    #[test]
    fn test_renamed_directory_indexed_by_directory() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("office", test_meta()).unwrap();
        fs::rename(dir.path().join("office"), dir.path().join("lab")).unwrap();

        let reopened = MapRepository::open(dir.path()).unwrap();
        assert!(!reopened.contains("office"));
        let info = reopened.get("lab").unwrap();
        assert_eq!(info.map_name, "lab");
        let paths = reopened.map_paths("lab").unwrap();
        assert!(paths.iter().all(|p| p.is_file()));

        assert!(reopened.delete("lab").unwrap());
        assert!(MapRepository::open(dir.path()).unwrap().is_empty());
    }

    #[test]
    fn test_copied_directory_does_not_shadow() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("office", test_meta()).unwrap();

        let copy = dir.path().join("office_copy");
        fs::create_dir_all(&copy).unwrap();
        for file in [YAML_FILE, PGM_FILE] {
            fs::copy(dir.path().join("office").join(file), copy.join(file)).unwrap();
        }

        assert_eq!(repo.reload().unwrap(), 2);
        assert!(repo.contains("office"));
        assert!(repo.contains("office_copy"));
    }

    #[test]
    fn test_failed_delete_keeps_index() {
        let dir = TempDir::new().unwrap();
        let repo = MapRepository::open(dir.path()).unwrap();
        repo.save("office", test_meta()).unwrap();

        // A plain file where the map directory was makes removal fail.
        let map_dir = dir.path().join("office");
        fs::remove_dir_all(&map_dir).unwrap();
        fs::write(&map_dir, "not a directory").unwrap();

        assert!(repo.delete("office").is_err());
        assert!(repo.contains("office"));
    }
}
