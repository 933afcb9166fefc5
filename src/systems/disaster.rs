use std::fmt;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    config::{DangerWindow, EngineConfig, GameMode},
    engine::{System, TickContext, TickFrame},
    population::{PopulationState, Species},
    rng::RngExt,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisasterKind {
    Drought,
    Flood,
    Typhoon,
    Invasive,
}

impl DisasterKind {
    pub const ALL: [DisasterKind; 4] = [
        DisasterKind::Drought,
        DisasterKind::Flood,
        DisasterKind::Typhoon,
        DisasterKind::Invasive,
    ];

    /// Maps a uniform roll in `[0, 1)` onto four equal bands.
    pub fn from_roll(roll: f64) -> Self {
        if roll < 0.25 {
            DisasterKind::Drought
        } else if roll < 0.5 {
            DisasterKind::Flood
        } else if roll < 0.75 {
            DisasterKind::Typhoon
        } else {
            DisasterKind::Invasive
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DisasterKind::Drought => "drought",
            DisasterKind::Flood => "flood",
            DisasterKind::Typhoon => "typhoon",
            DisasterKind::Invasive => "invasive",
        }
    }

    pub const fn display_name(self) -> &'static str {
        match self {
            DisasterKind::Drought => "Severe Drought",
            DisasterKind::Flood => "Great Flood",
            DisasterKind::Typhoon => "Violent Typhoon",
            DisasterKind::Invasive => "Invasive Species",
        }
    }

    pub const fn description(self) -> &'static str {
        match self {
            DisasterKind::Drought => "No rain has fallen and the plants are withering away!",
            DisasterKind::Flood => "Rising water sweeps across the land!",
            DisasterKind::Typhoon => "Gale-force winds batter the entire ecosystem!",
            DisasterKind::Invasive => {
                "A species with no natural predators is threatening the natives!"
            }
        }
    }

    /// Multiplicative losses applied to the pre-transition counts.
    pub const fn penalties(self) -> &'static [(Species, f64)] {
        match self {
            DisasterKind::Drought => &[(Species::Producer, 0.85)],
            DisasterKind::Flood => &[(Species::Producer, 0.9), (Species::Decomposer, 0.8)],
            DisasterKind::Typhoon => &[
                (Species::Producer, 0.9),
                (Species::Primary, 0.9),
                (Species::Secondary, 0.95),
            ],
            DisasterKind::Invasive => &[(Species::Primary, 0.85), (Species::Secondary, 0.95)],
        }
    }

    /// Applies every penalty, truncating each scaled count.
    pub fn apply(self, state: &PopulationState) -> PopulationState {
        self.penalties()
            .iter()
            .fold(*state, |acc, (species, factor)| acc.scaled(*species, *factor))
    }
}

impl fmt::Display for DisasterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptor surfaced to observers when a disaster strikes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisasterEvent {
    pub kind: DisasterKind,
    pub tick: u32,
    pub name: String,
    pub description: String,
}

impl DisasterEvent {
    pub fn new(kind: DisasterKind, tick: u32) -> Self {
        Self {
            kind,
            tick,
            name: kind.display_name().to_string(),
            description: kind.description().to_string(),
        }
    }
}

/// How the injector decides whether and what to fire.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum DisasterSchedule {
    /// Per-tick probability roll inside the danger window.
    #[default]
    Random,
    /// Fire `kind` exactly at `tick`, if that tick is inside the window.
    Forced { tick: u32, kind: DisasterKind },
}

/// Perturbs the pre-transition state at most once per run.
///
/// Only enabled for modes whose profile allows disasters. The random source
/// is owned by the injector so runs are replayable from a seed.
pub struct DisasterInjector<R = ChaCha8Rng> {
    rng: R,
    enabled: bool,
    window: DangerWindow,
    probability: f64,
    schedule: DisasterSchedule,
    fired: Option<DisasterEvent>,
}

impl<R: Rng> DisasterInjector<R> {
    pub fn new(config: &EngineConfig, mode: GameMode, rng: R) -> Self {
        Self {
            rng,
            enabled: config.mode(mode).disaster_enabled,
            window: config.disaster.window,
            probability: config.disaster.probability,
            schedule: DisasterSchedule::Random,
            fired: None,
        }
    }

    pub fn with_schedule(mut self, schedule: DisasterSchedule) -> Self {
        self.schedule = schedule;
        self
    }

    pub fn has_fired(&self) -> bool {
        self.fired.is_some()
    }

    pub fn fired(&self) -> Option<&DisasterEvent> {
        self.fired.as_ref()
    }

    /// Returns the penalized state and the event when a disaster fires on
    /// `tick`; `None` leaves the state untouched.
    pub fn inject(
        &mut self,
        tick: u32,
        total_ticks: u32,
        state: &PopulationState,
    ) -> Option<(PopulationState, DisasterEvent)> {
        if !self.enabled || self.fired.is_some() || !self.window.contains(tick, total_ticks) {
            return None;
        }
        let kind = match self.schedule {
            DisasterSchedule::Random => {
                if !self.rng.chance(self.probability) {
                    return None;
                }
                DisasterKind::from_roll(self.rng.unit())
            }
            DisasterSchedule::Forced {
                tick: forced_tick,
                kind,
            } => {
                if tick != forced_tick {
                    return None;
                }
                kind
            }
        };
        let event = DisasterEvent::new(kind, tick);
        info!(tick, kind = %kind, "disaster struck");
        self.fired = Some(event.clone());
        Some((kind.apply(state), event))
    }
}

impl<R: Rng + Send> System for DisasterInjector<R> {
    fn name(&self) -> &str {
        "disaster"
    }

    fn run(&mut self, ctx: &TickContext, frame: &mut TickFrame) {
        if let Some((state, event)) = self.inject(ctx.tick, ctx.total_ticks, &frame.state) {
            frame.state = state;
            frame.event = Some(event);
        }
    }
}
