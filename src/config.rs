//! Engine configuration: tick count, per-mode pacing, disaster tuning and
//! normal-mode scoring constants.

use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::population::{PopulationState, Species};

/// Difficulty selected before configuration begins; fixed for a run.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum GameMode {
    /// Balance mode: reach the target populations.
    #[default]
    Normal,
    /// Climate-crisis mode: survive a possible disaster.
    Hard,
}

impl GameMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            GameMode::Normal => "normal",
            GameMode::Hard => "hard",
        }
    }
}

impl fmt::Display for GameMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModeProfile {
    /// Wall-clock length of a whole run in milliseconds.
    pub duration_ms: u64,
    pub disaster_enabled: bool,
}

impl ModeProfile {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }
}

/// Per-mode pacing. A profile missing a field keeps that mode's own default,
/// so `hard: {duration_ms: 30000}` still has disasters enabled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawModeTable")]
pub struct ModeTable {
    pub normal: ModeProfile,
    pub hard: ModeProfile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawModeTable {
    normal: RawModeProfile,
    hard: RawModeProfile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
struct RawModeProfile {
    duration_ms: Option<u64>,
    disaster_enabled: Option<bool>,
}

impl RawModeProfile {
    fn over(self, base: ModeProfile) -> ModeProfile {
        ModeProfile {
            duration_ms: self.duration_ms.unwrap_or(base.duration_ms),
            disaster_enabled: self.disaster_enabled.unwrap_or(base.disaster_enabled),
        }
    }
}

impl From<RawModeTable> for ModeTable {
    fn from(raw: RawModeTable) -> Self {
        let defaults = ModeTable::default();
        Self {
            normal: raw.normal.over(defaults.normal),
            hard: raw.hard.over(defaults.hard),
        }
    }
}

impl Default for ModeTable {
    fn default() -> Self {
        Self {
            normal: ModeProfile {
                duration_ms: 10_000,
                disaster_enabled: false,
            },
            hard: ModeProfile {
                duration_ms: 20_000,
                disaster_enabled: true,
            },
        }
    }
}

/// Open interval of the run, as fractions of the total tick count, in which
/// a disaster may strike.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DangerWindow {
    pub start: f64,
    pub end: f64,
}

impl DangerWindow {
    /// True when `tick` lies strictly between the two window edges.
    pub fn contains(&self, tick: u32, total_ticks: u32) -> bool {
        let tick = tick as f64;
        let total = total_ticks as f64;
        tick > total * self.start && tick < total * self.end
    }
}

impl Default for DangerWindow {
    fn default() -> Self {
        Self {
            start: 0.2,
            end: 0.7,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisasterConfig {
    pub window: DangerWindow,
    /// Chance per in-window tick that the disaster fires.
    pub probability: f64,
    /// How long a fired event stays on display, independent of tick speed.
    pub display_ms: u64,
}

impl DisasterConfig {
    pub fn display_duration(&self) -> Duration {
        Duration::from_millis(self.display_ms)
    }
}

impl Default for DisasterConfig {
    fn default() -> Self {
        Self {
            window: DangerWindow::default(),
            probability: 0.05,
            display_ms: 4_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub total_ticks: u32,
    pub modes: ModeTable,
    pub disaster: DisasterConfig,
    /// Reference populations for normal-mode scoring. The decomposer entry is
    /// shown to players but never scored.
    pub target: PopulationState,
    pub tolerance: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            total_ticks: 100,
            modes: ModeTable::default(),
            disaster: DisasterConfig::default(),
            target: default_target(),
            tolerance: 10,
        }
    }
}

// A fixed point of the update law.
fn default_target() -> PopulationState {
    PopulationState::from_clamped(400.0, 50.0, 40.0, 74.0)
}

impl EngineConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn to_yaml(&self) -> Result<String, EngineError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.total_ticks == 0 {
            return Err(invalid("total_ticks must be greater than zero"));
        }
        for (mode, profile) in [
            (GameMode::Normal, &self.modes.normal),
            (GameMode::Hard, &self.modes.hard),
        ] {
            if profile.duration_ms == 0 {
                return Err(invalid(format!("{mode} duration_ms must be greater than zero")));
            }
            if self.tick_period(mode).is_zero() {
                return Err(invalid(format!(
                    "{mode} duration_ms {} is too short for {} ticks",
                    profile.duration_ms, self.total_ticks
                )));
            }
        }
        let window = self.disaster.window;
        if !(0.0..=1.0).contains(&window.start) || !(0.0..=1.0).contains(&window.end) {
            return Err(invalid("danger window edges must lie within 0..=1"));
        }
        if window.start >= window.end {
            return Err(invalid(format!(
                "danger window start {} must be below end {}",
                window.start, window.end
            )));
        }
        if !(0.0..=1.0).contains(&self.disaster.probability) {
            return Err(invalid("disaster probability must lie within 0..=1"));
        }
        Ok(())
    }

    pub fn mode(&self, mode: GameMode) -> &ModeProfile {
        match mode {
            GameMode::Normal => &self.modes.normal,
            GameMode::Hard => &self.modes.hard,
        }
    }

    /// Spacing between ticks: the mode duration split evenly across the run.
    pub fn tick_period(&self, mode: GameMode) -> Duration {
        self.mode(mode).duration() / self.total_ticks.max(1)
    }

    pub fn species_max(&self, species: Species) -> u32 {
        species.max()
    }
}

fn invalid(reason: impl Into<String>) -> EngineError {
    EngineError::ConfigInvalid(reason.into())
}
