pub mod clock;
pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod outcome;
pub mod population;
pub mod report;
pub mod rng;
pub mod scenario;
pub mod session;
pub mod systems;
pub mod web;

pub use clock::{ClockOptions, ClockStatus, SimulationClock, TickUpdate};
pub use config::{EngineConfig, GameMode};
pub use controller::{RunController, RunHandle};
pub use error::EngineError;
pub use outcome::{OutcomeEvaluator, RunOutcome, RunStatus};
pub use population::{History, PopulationState, Species};
pub use report::RunReport;
