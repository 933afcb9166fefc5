use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// One of the four trophic levels tracked by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Species {
    Producer,
    Primary,
    Secondary,
    Decomposer,
}

impl Species {
    pub const ALL: [Species; 4] = [
        Species::Producer,
        Species::Primary,
        Species::Secondary,
        Species::Decomposer,
    ];

    /// Upper clamp for the species count. The lower bound is always zero.
    pub const fn max(self) -> u32 {
        match self {
            Species::Producer => 500,
            Species::Primary => 300,
            Species::Secondary => 100,
            Species::Decomposer => 200,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Species::Producer => "producer",
            Species::Primary => "primary",
            Species::Secondary => "secondary",
            Species::Decomposer => "decomposer",
        }
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Species {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Species::ALL
            .into_iter()
            .find(|species| species.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or_else(|| format!("unknown species '{value}'"))
    }
}

/// Immutable snapshot of the four population counts.
///
/// Every count is an integer in `0..=Species::max()`. The constructors either
/// reject out-of-range input ([`PopulationState::new`]) or clamp into range
/// (used by the update law), so a value of this type always upholds the bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPopulation")]
pub struct PopulationState {
    producer: u32,
    primary: u32,
    secondary: u32,
    decomposer: u32,
}

impl PopulationState {
    pub const ZERO: PopulationState = PopulationState {
        producer: 0,
        primary: 0,
        secondary: 0,
        decomposer: 0,
    };

    /// Populations offered when a mode is first selected.
    pub const DEFAULT_START: PopulationState = PopulationState {
        producer: 50,
        primary: 30,
        secondary: 10,
        decomposer: 20,
    };

    pub fn new(
        producer: u32,
        primary: u32,
        secondary: u32,
        decomposer: u32,
    ) -> Result<Self, EngineError> {
        Self::ZERO
            .with(Species::Producer, producer)?
            .with(Species::Primary, primary)?
            .with(Species::Secondary, secondary)?
            .with(Species::Decomposer, decomposer)
    }

    /// Rounds each value to the nearest integer and clamps it into range.
    pub(crate) fn from_clamped(producer: f64, primary: f64, secondary: f64, decomposer: f64) -> Self {
        Self {
            producer: clamp_count(producer, Species::Producer),
            primary: clamp_count(primary, Species::Primary),
            secondary: clamp_count(secondary, Species::Secondary),
            decomposer: clamp_count(decomposer, Species::Decomposer),
        }
    }

    pub fn get(&self, species: Species) -> u32 {
        match species {
            Species::Producer => self.producer,
            Species::Primary => self.primary,
            Species::Secondary => self.secondary,
            Species::Decomposer => self.decomposer,
        }
    }

    /// Returns a copy with one count replaced, rejecting out-of-range values.
    pub fn with(mut self, species: Species, value: u32) -> Result<Self, EngineError> {
        let max = species.max();
        if value > max {
            return Err(EngineError::InvalidPopulation {
                species,
                value,
                max,
            });
        }
        *self.slot_mut(species) = value;
        Ok(self)
    }

    /// Multiplies one count by `factor` in `[0, 1]`, truncating toward zero.
    pub(crate) fn scaled(mut self, species: Species, factor: f64) -> Self {
        let slot = self.slot_mut(species);
        *slot = (*slot as f64 * factor.clamp(0.0, 1.0)).floor() as u32;
        self
    }

    pub fn producer(&self) -> u32 {
        self.producer
    }

    pub fn primary(&self) -> u32 {
        self.primary
    }

    pub fn secondary(&self) -> u32 {
        self.secondary
    }

    pub fn decomposer(&self) -> u32 {
        self.decomposer
    }

    /// Living biomass the decomposers feed on.
    pub fn biomass(&self) -> u32 {
        self.producer + self.primary + self.secondary
    }

    pub fn iter(&self) -> impl Iterator<Item = (Species, u32)> + '_ {
        Species::ALL
            .into_iter()
            .map(move |species| (species, self.get(species)))
    }

    fn slot_mut(&mut self, species: Species) -> &mut u32 {
        match species {
            Species::Producer => &mut self.producer,
            Species::Primary => &mut self.primary,
            Species::Secondary => &mut self.secondary,
            Species::Decomposer => &mut self.decomposer,
        }
    }
}

impl Default for PopulationState {
    fn default() -> Self {
        Self::DEFAULT_START
    }
}

impl fmt::Display for PopulationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "producer={} primary={} secondary={} decomposer={}",
            self.producer, self.primary, self.secondary, self.decomposer
        )
    }
}

fn clamp_count(value: f64, species: Species) -> u32 {
    value.round().clamp(0.0, species.max() as f64) as u32
}

#[derive(Deserialize)]
struct RawPopulation {
    producer: u32,
    primary: u32,
    secondary: u32,
    decomposer: u32,
}

impl TryFrom<RawPopulation> for PopulationState {
    type Error = EngineError;

    fn try_from(raw: RawPopulation) -> Result<Self, Self::Error> {
        PopulationState::new(raw.producer, raw.primary, raw.secondary, raw.decomposer)
    }
}

/// Append-only log of snapshots for one run.
///
/// Index 0 is the configured starting state and index `n` is the state after
/// tick `n`, so `len() == ticks_elapsed() + 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    snapshots: Vec<PopulationState>,
}

impl History {
    pub fn new(initial: PopulationState) -> Self {
        Self {
            snapshots: vec![initial],
        }
    }

    pub(crate) fn push(&mut self, snapshot: PopulationState) {
        self.snapshots.push(snapshot);
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn ticks_elapsed(&self) -> u32 {
        self.snapshots.len().saturating_sub(1) as u32
    }

    pub fn initial(&self) -> Option<&PopulationState> {
        self.snapshots.first()
    }

    pub fn latest(&self) -> Option<&PopulationState> {
        self.snapshots.last()
    }

    pub fn get(&self, tick: usize) -> Option<&PopulationState> {
        self.snapshots.get(tick)
    }

    pub fn as_slice(&self) -> &[PopulationState] {
        &self.snapshots
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PopulationState> {
        self.snapshots.iter()
    }
}
