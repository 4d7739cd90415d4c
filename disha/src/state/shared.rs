//! Thread-safe shared state for the session.
//!
//! `SharedState` is shared between:
//! - Session worker: the only writer for modes, nav status and map bindings
//! - Engine feedback: writes the localization estimate while localizing
//! - Callers: read-only snapshots for status queries
//!
//! The worker never holds the write lock across an engine call.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::types::LocalizationInfo;
use crate::navigation::NavStatus;

/// SLAM operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlamMode {
    /// No mapping or localization.
    #[default]
    Idle,
    /// Building a new map from scratch.
    Mapping,
    /// Tracking the robot pose against a persisted map.
    Localization,
}

impl SlamMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlamMode::Idle => "IDLE",
            SlamMode::Mapping => "MAPPING",
            SlamMode::Localization => "LOCALIZATION",
        }
    }
}

impl std::fmt::Display for SlamMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Navigation operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NavMode {
    /// Navigation disabled; no task may exist.
    #[default]
    Idle,
    /// Grid-map navigation against the localized map.
    GridMap,
}

impl NavMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            NavMode::Idle => "IDLE",
            NavMode::GridMap => "GRID_MAP",
        }
    }
}

impl std::fmt::Display for NavMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Robot-wide motion controller selection.
///
/// Navigation needs the high-level controller; the low-level one hands the
/// base to direct velocity commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControllerLevel {
    #[default]
    HighLevel,
    LowLevel,
}

/// Everything the session tracks about modes, maps and the active task.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    pub slam_mode: SlamMode,
    pub nav_mode: NavMode,
    pub controller_level: ControllerLevel,

    /// Status of the current (or last) navigation task.
    pub nav_status: NavStatus,

    /// Latest localization estimate.
    pub localization: LocalizationInfo,

    /// Map data is accumulating (between `start_mapping` and save/cancel).
    pub mapping_active: bool,

    /// Map staged by `load_map`, not yet activated.
    pub staged_map: Option<String>,

    /// Map the last localization ran against. Survives leaving
    /// LOCALIZATION so navigation can still bind to it.
    pub localization_map: Option<String>,

    /// Map bound to GRID_MAP navigation.
    pub navigation_map: Option<String>,
}

impl SharedState {
    /// Create a new shared state in the startup configuration.
    pub fn new(controller_level: ControllerLevel) -> Self {
        Self {
            controller_level,
            ..Default::default()
        }
    }

    /// Name reported as `AllMapInfo::current_map_name`.
    ///
    /// Active maps win over a staged one; empty when nothing is staged or
    /// active.
    pub fn current_map_name(&self) -> String {
        if self.nav_mode == NavMode::GridMap
            && let Some(name) = &self.navigation_map
        {
            return name.clone();
        }
        if self.slam_mode == SlamMode::Localization
            && let Some(name) = &self.localization_map
        {
            return name.clone();
        }
        self.staged_map.clone().unwrap_or_default()
    }

    /// Whether `name` is bound to the running localization or navigation.
    pub fn is_map_active(&self, name: &str) -> bool {
        let localizing = self.slam_mode == SlamMode::Localization
            && self.localization_map.as_deref() == Some(name);
        let navigating =
            self.nav_mode == NavMode::GridMap && self.navigation_map.as_deref() == Some(name);
        localizing || navigating
    }
}

/// Thread-safe handle to shared state.
pub type SharedStateHandle = Arc<RwLock<SharedState>>;

/// Create a new shared state handle.
pub fn create_shared_state(controller_level: ControllerLevel) -> SharedStateHandle {
    Arc::new(RwLock::new(SharedState::new(controller_level)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_state() {
        let state = SharedState::new(ControllerLevel::HighLevel);
        assert_eq!(state.slam_mode, SlamMode::Idle);
        assert_eq!(state.nav_mode, NavMode::Idle);
        assert_eq!(state.nav_status, NavStatus::default());
        assert!(!state.localization.is_localization);
        assert!(state.current_map_name().is_empty());
    }

    #[test]
    fn test_current_map_name_priority() {
        let mut state = SharedState::default();
        state.staged_map = Some("staged".into());
        assert_eq!(state.current_map_name(), "staged");

        state.slam_mode = SlamMode::Localization;
        state.localization_map = Some("office".into());
        assert_eq!(state.current_map_name(), "office");

        // Leaving localization drops back to the staged map.
        state.slam_mode = SlamMode::Idle;
        assert_eq!(state.current_map_name(), "staged");
    }

    #[test]
    fn test_is_map_active() {
        let mut state = SharedState::default();
        state.localization_map = Some("office".into());
        assert!(!state.is_map_active("office"));

        state.slam_mode = SlamMode::Localization;
        assert!(state.is_map_active("office"));
        assert!(!state.is_map_active("lab"));

        state.slam_mode = SlamMode::Idle;
        state.nav_mode = NavMode::GridMap;
        state.navigation_map = Some("office".into());
        assert!(state.is_map_active("office"));
    }

    #[test]
    fn test_mode_names() {
        assert_eq!(SlamMode::Localization.to_string(), "LOCALIZATION");
        assert_eq!(NavMode::GridMap.to_string(), "GRID_MAP");
    }
}
