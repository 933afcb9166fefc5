use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    config::GameMode,
    outcome::RunOutcome,
    population::{History, PopulationState},
    systems::DisasterEvent,
};

/// Everything delivered once a run completes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: GameMode,
    pub seed: u64,
    pub total_ticks: u32,
    pub outcome: RunOutcome,
    pub final_state: PopulationState,
    pub disaster: Option<DisasterEvent>,
    pub history: History,
    pub completed_at: DateTime<Utc>,
}

/// Writes completed run reports as pretty JSON files.
pub struct ReportWriter {
    output_dir: PathBuf,
}

impl ReportWriter {
    pub fn new(output_dir: impl AsRef<Path>) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn write(&self, report: &RunReport) -> Result<PathBuf, ReportError> {
        fs::create_dir_all(&self.output_dir)?;
        let file_name = format!(
            "run_{}_{}_{}.json",
            report.mode,
            report.completed_at.format("%Y%m%dT%H%M%S%3f"),
            report.seed
        );
        let path = self.output_dir.join(file_name);
        let json = serde_json::to_string_pretty(report)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    pub fn read(path: impl AsRef<Path>) -> Result<RunReport, ReportError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("report io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("report serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
