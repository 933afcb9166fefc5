use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::{
    clock::{ClockOptions, SimulationClock},
    config::{EngineConfig, GameMode},
    error::EngineError,
    population::PopulationState,
    systems::{DisasterKind, DisasterSchedule},
};

/// Disaster pinned to a tick instead of rolled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct ForcedDisaster {
    pub tick: u32,
    pub kind: DisasterKind,
}

/// A named starting setup: populations, mode and optional replay controls.
#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub mode: GameMode,
    #[serde(default)]
    pub seed: Option<u64>,
    pub populations: PopulationState,
    #[serde(default)]
    pub forced_disaster: Option<ForcedDisaster>,
}

pub struct ScenarioLoader {
    base_dir: PathBuf,
}

impl ScenarioLoader {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn load(&self, file: impl AsRef<Path>) -> Result<Scenario> {
        let path = self.base_dir.join(file);
        let data = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read scenario file {}", path.display()))?;
        let scenario: Scenario = serde_yaml::from_str(&data)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(scenario)
    }
}

impl Scenario {
    /// Rejects forced disasters the engine would silently skip.
    pub fn validate(&self, config: &EngineConfig) -> Result<(), EngineError> {
        let Some(forced) = self.forced_disaster else {
            return Ok(());
        };
        if !config.mode(self.mode).disaster_enabled {
            return Err(EngineError::ConfigInvalid(format!(
                "scenario '{}' forces a disaster but {} mode has disasters disabled",
                self.name, self.mode
            )));
        }
        if !config.disaster.window.contains(forced.tick, config.total_ticks) {
            return Err(EngineError::ConfigInvalid(format!(
                "scenario '{}' forces a disaster at tick {} outside the danger window",
                self.name, forced.tick
            )));
        }
        Ok(())
    }

    pub fn clock_options(&self) -> ClockOptions {
        ClockOptions {
            seed: self.seed,
            schedule: self
                .forced_disaster
                .map(|forced| DisasterSchedule::Forced {
                    tick: forced.tick,
                    kind: forced.kind,
                })
                .unwrap_or_default(),
        }
    }

    pub fn build_clock(&self, config: &EngineConfig) -> Result<SimulationClock, EngineError> {
        self.validate(config)?;
        SimulationClock::new(self.populations, self.mode, config, self.clock_options())
    }
}
