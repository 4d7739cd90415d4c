//! SLAM mode controller: IDLE, MAPPING and LOCALIZATION.
//!
//! MAPPING and LOCALIZATION are mutually exclusive; a direct switch between
//! them is routed through IDLE so the engine always sees a clean stop.
//! Entering MAPPING, or re-localizing on a different map, first disables
//! navigation.

use std::sync::Arc;

use crate::core::types::{LocalizationInfo, PointCloud2, Pose3D};
use crate::engine::{EngineResult, SlamNavEngine};
use crate::error::{Error, Result};
use crate::io::{MapRepository, validate_map_name};
use crate::navigation::NavModeController;
use crate::state::{NavMode, SharedStateHandle, SlamMode};

/// Owns SLAM mode transitions, mapping and map lifecycle operations.
pub struct SlamModeController {
    shared: SharedStateHandle,
    repository: Arc<MapRepository>,
}

impl SlamModeController {
    pub fn new(shared: SharedStateHandle, repository: Arc<MapRepository>) -> Self {
        Self { shared, repository }
    }

    pub fn mode(&self) -> SlamMode {
        self.shared.read().slam_mode
    }

    fn require_mode(&self, expected: SlamMode, operation: &str) -> Result<()> {
        let mode = self.mode();
        if mode != expected {
            return Err(Error::InvalidState(format!(
                "{} needs {} mode, current mode is {}",
                operation, expected, mode
            )));
        }
        Ok(())
    }

    pub fn activate(
        &mut self,
        engine: &mut dyn SlamNavEngine,
        nav: &mut NavModeController,
        mode: SlamMode,
        map_path: &str,
    ) -> Result<()> {
        match mode {
            SlamMode::Idle => self.enter_idle(engine),
            SlamMode::Mapping => self.enter_mapping(engine, nav),
            SlamMode::Localization => self.enter_localization(engine, nav, map_path),
        }
    }

    fn enter_idle(&mut self, engine: &mut dyn SlamNavEngine) -> Result<()> {
        if self.mode() == SlamMode::Idle {
            return Ok(());
        }
        engine.set_slam_mode(SlamMode::Idle, None)?;
        self.record_idle();
        log::info!("SLAM mode: IDLE");
        Ok(())
    }

    fn record_idle(&self) {
        let mut state = self.shared.write();
        state.slam_mode = SlamMode::Idle;
        state.mapping_active = false;
        state.localization = LocalizationInfo::untrusted();
    }

    /// Settle the second half of a switch that already passed through IDLE.
    fn settle_switch(&self, from: SlamMode, result: EngineResult<()>) -> Result<()> {
        if let Err(e) = result {
            if from != SlamMode::Idle {
                // The engine is idle now; record that rather than the old mode.
                self.record_idle();
                log::warn!("SLAM mode switch from {} failed, left in IDLE", from);
            }
            return Err(e.into());
        }
        Ok(())
    }

    fn enter_mapping(
        &mut self,
        engine: &mut dyn SlamNavEngine,
        nav: &mut NavModeController,
    ) -> Result<()> {
        let current = self.mode();
        if current == SlamMode::Mapping {
            return Ok(());
        }
        if nav.mode() != NavMode::Idle {
            nav.deactivate(engine)?;
        }
        if current != SlamMode::Idle {
            engine.set_slam_mode(SlamMode::Idle, None)?;
        }

        let result = engine.set_slam_mode(SlamMode::Mapping, None);
        self.settle_switch(current, result)?;

        {
            let mut state = self.shared.write();
            state.slam_mode = SlamMode::Mapping;
            state.mapping_active = false;
            state.localization = LocalizationInfo::untrusted();
            state.localization_map = None;
        }
        log::info!("SLAM mode: MAPPING");
        Ok(())
    }

    fn enter_localization(
        &mut self,
        engine: &mut dyn SlamNavEngine,
        nav: &mut NavModeController,
        map_path: &str,
    ) -> Result<()> {
        if map_path.trim().is_empty() {
            return Err(Error::InvalidArgument("localization map path is empty".into()));
        }
        let name = self
            .repository
            .resolve_path(map_path)
            .ok_or_else(|| Error::InvalidArgument(format!("no map at {:?}", map_path)))?;
        let map = self
            .repository
            .get(&name)
            .ok_or_else(|| Error::NotFound(format!("map {}", name)))?;

        let (current, localized_on, nav_map) = {
            let state = self.shared.read();
            (
                state.slam_mode,
                state.localization_map.clone(),
                state.navigation_map.clone(),
            )
        };
        if current == SlamMode::Localization && localized_on.as_deref() == Some(name.as_str()) {
            return Ok(());
        }
        if nav_map.is_some_and(|m| m != name) {
            nav.deactivate(engine)?;
        }
        if current != SlamMode::Idle {
            engine.set_slam_mode(SlamMode::Idle, None)?;
        }

        let result = engine.set_slam_mode(SlamMode::Localization, Some(&map));
        self.settle_switch(current, result)?;

        {
            let mut state = self.shared.write();
            state.slam_mode = SlamMode::Localization;
            state.mapping_active = false;
            state.localization = LocalizationInfo::untrusted();
            state.localization_map = Some(name.clone());
            if state.staged_map.as_deref() == Some(name.as_str()) {
                state.staged_map = None;
            }
        }
        log::info!("SLAM mode: LOCALIZATION on {}", name);
        Ok(())
    }

    pub fn start_mapping(&mut self, engine: &mut dyn SlamNavEngine) -> Result<()> {
        self.require_mode(SlamMode::Mapping, "start_mapping")?;
        if self.shared.read().mapping_active {
            return Ok(());
        }
        engine.start_mapping()?;
        self.shared.write().mapping_active = true;
        log::info!("Mapping started");
        Ok(())
    }

    pub fn cancel_mapping(&mut self, engine: &mut dyn SlamNavEngine) -> Result<()> {
        self.require_mode(SlamMode::Mapping, "cancel_mapping")?;
        engine.cancel_mapping()?;
        self.shared.write().mapping_active = false;
        log::info!("Mapping cancelled, accumulated data discarded");
        Ok(())
    }

    /// Capture the map being built and persist it under `name`.
    pub fn save_map(&mut self, engine: &mut dyn SlamNavEngine, name: &str) -> Result<()> {
        self.require_mode(SlamMode::Mapping, "save_map")?;
        validate_map_name(name)?;
        let meta = engine.capture_map()?;
        self.repository.save(name, meta)?;
        self.shared.write().mapping_active = false;
        Ok(())
    }

    /// Stage a persisted map for later activation.
    pub fn load_map(&mut self, name: &str) -> Result<()> {
        if !self.repository.contains(name) {
            return Err(Error::NotFound(format!("map {}", name)));
        }
        self.shared.write().staged_map = Some(name.to_string());
        log::info!("Map {} staged", name);
        Ok(())
    }

    pub fn delete_map(&mut self, name: &str) -> Result<()> {
        if !self.repository.contains(name) {
            log::debug!("delete_map: {} does not exist", name);
            return Ok(());
        }
        if self.shared.read().is_map_active(name) {
            return Err(Error::InvalidState(format!(
                "map {} is in use by localization or navigation",
                name
            )));
        }
        self.repository.delete(name)?;

        let mut state = self.shared.write();
        if state.staged_map.as_deref() == Some(name) {
            state.staged_map = None;
        }
        if state.localization_map.as_deref() == Some(name) {
            state.localization_map = None;
        }
        Ok(())
    }

    pub fn init_pose(&mut self, engine: &mut dyn SlamNavEngine, pose: &Pose3D) -> Result<()> {
        self.require_mode(SlamMode::Localization, "init_pose")?;
        if !pose.is_finite() {
            return Err(Error::InvalidArgument("initial pose is not finite".into()));
        }
        engine.init_pose(pose)?;
        log::info!(
            "Initial pose set: ({:.2}, {:.2}, {:.2})",
            pose.x(),
            pose.y(),
            pose.yaw()
        );
        Ok(())
    }

    pub fn point_cloud_map(&mut self, engine: &mut dyn SlamNavEngine) -> Result<PointCloud2> {
        let mode = self.mode();
        if mode == SlamMode::Idle {
            return Err(Error::InvalidState(
                "point cloud map needs MAPPING or LOCALIZATION mode".into(),
            ));
        }
        Ok(engine.point_cloud_map()?)
    }
}
