use std::path::PathBuf;

use crate::population::Species;
use crate::session::GamePhase;

/// Errors reported synchronously by the engine. A run that ends in failure is
/// an outcome, not an error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An initial population count lies outside its species range.
    #[error("{species} population {value} is outside 0..={max}")]
    InvalidPopulation { species: Species, value: u32, max: u32 },

    /// A run was started while another one is still active.
    #[error("a run is already active; cancel it before starting another")]
    RunActive,

    /// The clock already reached its final tick.
    #[error("run already finished after {ticks} ticks")]
    RunFinished { ticks: u32 },

    /// The clock was cancelled and accepts no further ticks.
    #[error("run was cancelled at tick {tick}")]
    RunCancelled { tick: u32 },

    /// A lifecycle action is not allowed in the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidPhase {
        phase: GamePhase,
        action: &'static str,
    },

    #[error("failed to read config {path}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("config validation error: {0}")]
    ConfigInvalid(String),
}
