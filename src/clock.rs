//! Synchronous run scheduler.
//!
//! [`SimulationClock`] owns the tick index and advances it one step per
//! [`SimulationClock::tick`] call. It knows nothing about wall-clock time:
//! real-time pacing is the job of [`crate::controller`], which calls `tick`
//! once per period.

use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    config::{EngineConfig, GameMode},
    engine::{Engine, TickContext},
    error::EngineError,
    outcome::OutcomeEvaluator,
    population::{History, PopulationState},
    report::RunReport,
    rng::RngManager,
    systems::{DisasterEvent, DisasterSchedule},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockStatus {
    Running,
    Finished,
    Cancelled,
}

/// One published tick: the new snapshot and the disaster that hit it, if any.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickUpdate {
    pub tick: u32,
    pub state: PopulationState,
    pub event: Option<DisasterEvent>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ClockOptions {
    /// Master seed; a fresh one is drawn when absent.
    pub seed: Option<u64>,
    pub schedule: DisasterSchedule,
}

impl ClockOptions {
    pub fn seeded(seed: u64) -> Self {
        Self {
            seed: Some(seed),
            ..Self::default()
        }
    }

    pub fn with_schedule(mut self, schedule: DisasterSchedule) -> Self {
        self.schedule = schedule;
        self
    }
}

pub struct SimulationClock {
    engine: Engine,
    evaluator: OutcomeEvaluator,
    mode: GameMode,
    seed: u64,
    total_ticks: u32,
    period: Duration,
    tick: u32,
    status: ClockStatus,
    current: PopulationState,
    history: History,
    disaster: Option<DisasterEvent>,
    report: Option<RunReport>,
}

impl SimulationClock {
    pub fn new(
        initial: PopulationState,
        mode: GameMode,
        config: &EngineConfig,
        options: ClockOptions,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let rng = options
            .seed
            .map(RngManager::new)
            .unwrap_or_else(RngManager::from_entropy);
        let period = config.tick_period(mode);
        info!(
            %mode,
            seed = rng.seed(),
            total_ticks = config.total_ticks,
            period_ms = period.as_millis() as u64,
            initial = %initial,
            "run starting"
        );
        Ok(Self {
            engine: Engine::standard(config, mode, &rng, options.schedule),
            evaluator: OutcomeEvaluator::from_config(config),
            mode,
            seed: rng.seed(),
            total_ticks: config.total_ticks,
            period,
            tick: 0,
            status: ClockStatus::Running,
            current: initial,
            history: History::new(initial),
            disaster: None,
            report: None,
        })
    }

    /// Advances one tick: disaster roll, update law, history append.
    ///
    /// The last tick also evaluates the outcome. Ticking a finished or
    /// cancelled clock is an error and changes nothing.
    pub fn tick(&mut self) -> Result<TickUpdate, EngineError> {
        match self.status {
            ClockStatus::Finished => {
                return Err(EngineError::RunFinished {
                    ticks: self.total_ticks,
                })
            }
            ClockStatus::Cancelled => return Err(EngineError::RunCancelled { tick: self.tick }),
            ClockStatus::Running => {}
        }

        let previous = self.current;
        let tick = self.tick + 1;
        let ctx = TickContext {
            tick,
            total_ticks: self.total_ticks,
            mode: self.mode,
        };
        let frame = self.engine.step(&ctx, &previous);

        self.tick = tick;
        self.current = frame.state;
        self.history.push(frame.state);
        if let Some(event) = &frame.event {
            self.disaster = Some(event.clone());
        }
        debug!(tick, state = %frame.state, "tick");

        if tick >= self.total_ticks {
            self.finish(frame.state);
        }

        Ok(TickUpdate {
            tick,
            state: frame.state,
            event: frame.event,
        })
    }

    /// Runs every remaining tick back-to-back and returns the report.
    pub fn run_to_end(&mut self) -> Result<RunReport, EngineError> {
        while self.status == ClockStatus::Running {
            self.tick()?;
        }
        self.report.clone().ok_or(match self.status {
            ClockStatus::Cancelled => EngineError::RunCancelled { tick: self.tick },
            _ => EngineError::RunFinished {
                ticks: self.total_ticks,
            },
        })
    }

    /// Stops the run at the current tick boundary. Returns `false` when the
    /// clock had already finished or been cancelled.
    pub fn cancel(&mut self) -> bool {
        if self.status != ClockStatus::Running {
            return false;
        }
        self.status = ClockStatus::Cancelled;
        info!(tick = self.tick, "run cancelled");
        true
    }

    fn finish(&mut self, final_state: PopulationState) {
        self.status = ClockStatus::Finished;
        let outcome = self.evaluator.evaluate(&final_state, self.mode);
        info!(
            status = ?outcome.status,
            cause = ?outcome.cause,
            final_state = %final_state,
            "run finished"
        );
        self.report = Some(RunReport {
            mode: self.mode,
            seed: self.seed,
            total_ticks: self.total_ticks,
            outcome,
            final_state,
            disaster: self.disaster.clone(),
            history: self.history.clone(),
            completed_at: Utc::now(),
        });
    }

    pub fn current_state(&self) -> &PopulationState {
        &self.current
    }

    pub fn current_tick(&self) -> u32 {
        self.tick
    }

    pub fn total_ticks(&self) -> u32 {
        self.total_ticks
    }

    pub fn status(&self) -> ClockStatus {
        self.status
    }

    pub fn is_running(&self) -> bool {
        self.status == ClockStatus::Running
    }

    pub fn mode(&self) -> GameMode {
        self.mode
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn disaster(&self) -> Option<&DisasterEvent> {
        self.disaster.as_ref()
    }

    pub fn report(&self) -> Option<&RunReport> {
        self.report.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::systems::DisasterKind;

    fn clock(initial: PopulationState, mode: GameMode) -> SimulationClock {
        SimulationClock::new(initial, mode, &EngineConfig::default(), ClockOptions::seeded(9))
            .unwrap()
    }

    #[test]
    fn completed_history_has_one_entry_per_tick_plus_start() {
        let mut clock = clock(PopulationState::DEFAULT_START, GameMode::Normal);
        let report = clock.run_to_end().unwrap();
        assert_eq!(report.history.len(), 101);
        assert_eq!(report.history.initial(), Some(&PopulationState::DEFAULT_START));
        assert_eq!(report.history.latest(), Some(&report.final_state));
        assert_eq!(clock.status(), ClockStatus::Finished);
        assert_eq!(clock.current_tick(), 100);
    }

    #[test]
    fn ticks_are_numbered_from_one() {
        let mut clock = clock(PopulationState::DEFAULT_START, GameMode::Normal);
        let first = clock.tick().unwrap();
        assert_eq!(first.tick, 1);
        assert_eq!(clock.history().get(1), Some(&first.state));
        assert!(clock.report().is_none());
    }

    #[test]
    fn ticking_after_finish_is_rejected() {
        let mut clock = clock(PopulationState::DEFAULT_START, GameMode::Normal);
        clock.run_to_end().unwrap();
        let err = clock.tick().unwrap_err();
        assert!(matches!(err, EngineError::RunFinished { ticks: 100 }));
        assert_eq!(clock.history().len(), 101);
        assert!(!clock.cancel());
        assert_eq!(clock.status(), ClockStatus::Finished);
    }

    #[test]
    fn cancel_freezes_history() {
        let mut clock = clock(PopulationState::DEFAULT_START, GameMode::Hard);
        for _ in 0..10 {
            clock.tick().unwrap();
        }
        assert!(clock.cancel());
        assert!(!clock.cancel());
        let err = clock.tick().unwrap_err();
        assert!(matches!(err, EngineError::RunCancelled { tick: 10 }));
        assert_eq!(clock.history().len(), 11);
        assert!(clock.report().is_none());
        assert!(matches!(
            clock.run_to_end(),
            Err(EngineError::RunCancelled { tick: 10 })
        ));
    }

    #[test]
    fn period_follows_mode() {
        assert_eq!(
            clock(PopulationState::DEFAULT_START, GameMode::Normal).period(),
            Duration::from_millis(100)
        );
        assert_eq!(
            clock(PopulationState::DEFAULT_START, GameMode::Hard).period(),
            Duration::from_millis(200)
        );
    }

    #[test]
    fn forced_disaster_is_recorded_in_report() {
        let start = PopulationState::new(100, 50, 10, 24).unwrap();
        let mut clock = SimulationClock::new(
            start,
            GameMode::Hard,
            &EngineConfig::default(),
            ClockOptions::seeded(1).with_schedule(DisasterSchedule::Forced {
                tick: 21,
                kind: DisasterKind::Typhoon,
            }),
        )
        .unwrap();
        let report = clock.run_to_end().unwrap();
        let disaster = report.disaster.expect("typhoon recorded");
        assert_eq!(disaster.kind, DisasterKind::Typhoon);
        assert_eq!(disaster.tick, 21);
        assert_eq!(report.final_state, PopulationState::new(90, 45, 9, 24).unwrap());
        assert!(report.outcome.is_success());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.total_ticks = 0;
        let result = SimulationClock::new(
            PopulationState::DEFAULT_START,
            GameMode::Normal,
            &config,
            ClockOptions::default(),
        );
        assert!(matches!(result, Err(EngineError::ConfigInvalid(_))));
    }
}
