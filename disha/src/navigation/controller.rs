//! Navigation mode controller: IDLE <-> GRID_MAP.

use std::sync::Arc;

use crate::engine::SlamNavEngine;
use crate::error::{Error, Result};
use crate::io::MapRepository;
use crate::state::{ControllerLevel, NavMode, SharedStateHandle};

use super::NavTaskManager;

/// Gates whether navigation tasks may be issued.
pub struct NavModeController {
    shared: SharedStateHandle,
    repository: Arc<MapRepository>,
    tasks: NavTaskManager,
}

impl NavModeController {
    pub fn new(shared: SharedStateHandle, repository: Arc<MapRepository>) -> Self {
        let tasks = NavTaskManager::new(shared.clone());
        Self {
            shared,
            repository,
            tasks,
        }
    }

    pub fn tasks(&mut self) -> &mut NavTaskManager {
        &mut self.tasks
    }

    pub fn mode(&self) -> NavMode {
        self.shared.read().nav_mode
    }

    pub fn activate(
        &mut self,
        engine: &mut dyn SlamNavEngine,
        mode: NavMode,
        map_path: &str,
    ) -> Result<()> {
        match mode {
            NavMode::Idle => self.deactivate(engine),
            NavMode::GridMap => self.activate_grid_map(engine, map_path),
        }
    }

    /// Leave GRID_MAP, cancelling any active task and resetting its status.
    pub fn deactivate(&mut self, engine: &mut dyn SlamNavEngine) -> Result<()> {
        if self.mode() == NavMode::Idle {
            self.tasks.reset();
            return Ok(());
        }

        self.tasks.abort_active(engine);
        engine.set_nav_mode(NavMode::Idle, None)?;
        {
            let mut state = self.shared.write();
            state.nav_mode = NavMode::Idle;
            state.navigation_map = None;
            state.nav_status.reset();
        }
        log::info!("Navigation mode: IDLE");
        Ok(())
    }

    fn activate_grid_map(&mut self, engine: &mut dyn SlamNavEngine, map_path: &str) -> Result<()> {
        let (level, localization_map, current_map) = {
            let state = self.shared.read();
            (
                state.controller_level,
                state.localization_map.clone(),
                (state.nav_mode == NavMode::GridMap)
                    .then(|| state.navigation_map.clone())
                    .flatten(),
            )
        };

        if level != ControllerLevel::HighLevel {
            return Err(Error::InvalidState(
                "grid map navigation needs the high-level controller".into(),
            ));
        }
        if map_path.trim().is_empty() {
            return Err(Error::InvalidArgument("navigation map path is empty".into()));
        }
        let name = self
            .repository
            .resolve_path(map_path)
            .ok_or_else(|| Error::InvalidArgument(format!("no map at {:?}", map_path)))?;
        match localization_map.as_deref() {
            None => {
                return Err(Error::InvalidState(
                    "navigation needs a prior localization".into(),
                ));
            }
            Some(localized) if localized != name => {
                return Err(Error::InvalidState(format!(
                    "navigation map {} differs from localization map {}",
                    name, localized
                )));
            }
            Some(_) => {}
        }
        if current_map.as_deref() == Some(name.as_str()) {
            return Ok(());
        }
        let map = self
            .repository
            .get(&name)
            .ok_or_else(|| Error::NotFound(format!("map {}", name)))?;

        // Switching maps goes through IDLE.
        if current_map.is_some() {
            self.deactivate(engine)?;
        }

        engine.set_nav_mode(NavMode::GridMap, Some(&map))?;
        {
            let mut state = self.shared.write();
            state.nav_mode = NavMode::GridMap;
            state.navigation_map = Some(name.clone());
            if state.staged_map.as_deref() == Some(name.as_str()) {
                state.staged_map = None;
            }
        }
        log::info!("Navigation mode: GRID_MAP on {}", name);
        Ok(())
    }
}
