//! Screen-flow state machine wrapped around runs.
//!
//! ```text
//! intro -> mode-select -> configuring -> simulating -> result
//!                ^             ^                         |
//!                |             +------ failure ----------+
//!                +-------------------- success ----------+
//! ```
//!
//! Any game phase can also be abandoned back to mode-select. Leaving
//! `simulating` that way requires the caller to cancel the active clock first.

use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::{
    config::GameMode,
    error::EngineError,
    population::{PopulationState, Species},
    report::RunReport,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum GamePhase {
    Intro,
    ModeSelect,
    Configuring,
    Simulating,
    Result,
}

impl fmt::Display for GamePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GamePhase::Intro => "intro",
            GamePhase::ModeSelect => "mode-select",
            GamePhase::Configuring => "configuring",
            GamePhase::Simulating => "simulating",
            GamePhase::Result => "result",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Session {
    phase: GamePhase,
    mode: GameMode,
    populations: PopulationState,
    has_failed: bool,
    last_report: Option<RunReport>,
}

impl Session {
    pub fn new() -> Self {
        Self {
            phase: GamePhase::Intro,
            mode: GameMode::Normal,
            populations: PopulationState::ZERO,
            has_failed: false,
            last_report: None,
        }
    }

    pub fn open_mode_select(&mut self) -> Result<(), EngineError> {
        self.expect_phase(GamePhase::Intro, "open mode selection")?;
        self.enter(GamePhase::ModeSelect);
        Ok(())
    }

    pub fn back_to_intro(&mut self) -> Result<(), EngineError> {
        self.expect_phase(GamePhase::ModeSelect, "return to intro")?;
        self.enter(GamePhase::Intro);
        Ok(())
    }

    /// Fixes the mode and opens configuration with the default populations.
    pub fn select_mode(&mut self, mode: GameMode) -> Result<(), EngineError> {
        self.expect_phase(GamePhase::ModeSelect, "select a mode")?;
        self.mode = mode;
        self.populations = PopulationState::DEFAULT_START;
        self.has_failed = false;
        self.last_report = None;
        self.enter(GamePhase::Configuring);
        Ok(())
    }

    pub fn set_population(&mut self, species: Species, value: u32) -> Result<(), EngineError> {
        self.expect_phase(GamePhase::Configuring, "change populations")?;
        self.populations = self.populations.with(species, value)?;
        Ok(())
    }

    /// Initial state and mode for the next run, without changing phase.
    pub fn run_request(&self) -> Result<(PopulationState, GameMode), EngineError> {
        self.expect_phase(GamePhase::Configuring, "start a run")?;
        Ok((self.populations, self.mode))
    }

    pub fn begin_run(&mut self) -> Result<(PopulationState, GameMode), EngineError> {
        let request = self.run_request()?;
        self.last_report = None;
        self.enter(GamePhase::Simulating);
        Ok(request)
    }

    /// Records the completed run. The sliders keep the final populations so a
    /// retry starts where the ecosystem ended.
    pub fn finish_run(&mut self, report: RunReport) -> Result<(), EngineError> {
        self.expect_phase(GamePhase::Simulating, "record a result")?;
        if !report.outcome.is_success() {
            self.has_failed = true;
        }
        self.populations = report.final_state;
        self.last_report = Some(report);
        self.enter(GamePhase::Result);
        Ok(())
    }

    /// Dismisses the result: failures go back to configuring, successes back
    /// to mode selection with a clean slate.
    pub fn acknowledge_result(&mut self) -> Result<GamePhase, EngineError> {
        self.expect_phase(GamePhase::Result, "acknowledge a result")?;
        let succeeded = self
            .last_report
            .as_ref()
            .is_some_and(|report| report.outcome.is_success());
        self.last_report = None;
        if succeeded {
            self.populations = PopulationState::DEFAULT_START;
            self.has_failed = false;
            self.enter(GamePhase::ModeSelect);
        } else {
            self.enter(GamePhase::Configuring);
        }
        Ok(self.phase)
    }

    /// Navigates back to mode selection from any game phase.
    pub fn abandon(&mut self) -> Result<(), EngineError> {
        match self.phase {
            GamePhase::Configuring | GamePhase::Simulating | GamePhase::Result => {
                self.last_report = None;
                self.has_failed = false;
                self.enter(GamePhase::ModeSelect);
                Ok(())
            }
            phase => Err(EngineError::InvalidPhase {
                phase,
                action: "return to mode selection",
            }),
        }
    }

    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn populations(&self) -> &PopulationState {
        &self.populations
    }

    /// The target hint is revealed once the player has failed in this mode.
    pub fn show_target(&self) -> bool {
        self.has_failed
    }

    pub fn last_report(&self) -> Option<&RunReport> {
        self.last_report.as_ref()
    }

    fn expect_phase(&self, expected: GamePhase, action: &'static str) -> Result<(), EngineError> {
        if self.phase == expected {
            Ok(())
        } else {
            Err(EngineError::InvalidPhase {
                phase: self.phase,
                action,
            })
        }
    }

    fn enter(&mut self, phase: GamePhase) {
        debug!(from = %self.phase, to = %phase, "phase change");
        self.phase = phase;
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
