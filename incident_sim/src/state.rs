//! Simulation state aggregate and checkpointing
//!
//! `SimulationState` owns everything that changes from one day to the next.
//! A checkpoint is the whole state graph as pretty JSON, replaced atomically
//! on save.

use crate::casualties::CasualtiesState;
use crate::config::SimulationConfig;
use crate::dynamic_state::DynamicState;
use crate::error::{Result, SimError};
use crate::events::EventsState;
use crate::history::IncidentHistory;
use crate::patterns::PatternRegistry;
use crate::regime::RegimeState;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationState {
    pub run_id: String,
    pub config: SimulationConfig,
    /// Next day to simulate (0-based)
    pub current_day: u32,
    pub dynamic_state: DynamicState,
    #[serde(rename = "patterns_actifs")]
    pub patterns: PatternRegistry,
    #[serde(rename = "vectors_state")]
    pub vectors: IncidentHistory,
    #[serde(rename = "events_state")]
    pub events: EventsState,
    #[serde(rename = "casualties_state")]
    pub casualties: CasualtiesState,
    #[serde(rename = "regime_state")]
    pub regime: RegimeState,
}

impl SimulationState {
    /// Fresh state on day 0; every microzone starts at baseline traffic
    pub fn new<'a>(config: SimulationConfig, microzones: impl IntoIterator<Item = &'a str>) -> Self {
        let mut dynamic_state = DynamicState::new();
        dynamic_state.ensure_microzones(microzones, config.dynamics.baseline_traffic);

        SimulationState {
            run_id: config.run_id(),
            current_day: 0,
            dynamic_state,
            patterns: PatternRegistry::new(),
            vectors: IncidentHistory::new(config.history_window),
            events: EventsState::new(),
            casualties: CasualtiesState::new(),
            regime: RegimeState::new(),
            config,
        }
    }

    /// Deep copy, independent of any later mutation of `self`
    pub fn snapshot(&self) -> Self {
        self.clone()
    }

    /// Write the checkpoint to a sibling temporary file, then rename it over
    /// `path`
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)?;

        let tmp = temporary_path(path);
        fs::write(&tmp, json).map_err(|e| SimError::io(&tmp, e))?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            SimError::io(path, e)
        })?;

        log::debug!("saved checkpoint {} at day {}", path.display(), self.current_day);
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        let state: SimulationState = serde_json::from_str(&json)?;
        Ok(state)
    }

    pub fn delete(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        fs::remove_file(path).map_err(|e| SimError::io(path, e))
    }
}

fn temporary_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "checkpoint".into());
    name.push(".tmp");
    path.with_file_name(name)
}
