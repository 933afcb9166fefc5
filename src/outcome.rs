use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    config::{EngineConfig, GameMode},
    population::{PopulationState, Species},
};

const PRODUCER_EXTINCTION: u32 = 5;
const PRIMARY_EXTINCTION: u32 = 5;
const SECONDARY_EXTINCTION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failure,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::Failure => f.write_str("failure"),
        }
    }
}

/// Why a run failed. Listed in the order the causes are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    ProducerExtinct,
    PrimaryExtinct,
    SecondaryExtinct,
    Imbalance,
}

impl FailureCause {
    pub fn feedback(self, mode: GameMode) -> String {
        match self {
            FailureCause::ProducerExtinct => {
                "Failure: the grass died out. Plant more producers to ride out a climate crisis."
                    .to_string()
            }
            FailureCause::PrimaryExtinct => {
                "Failure: the rabbits died out. There were too many foxes or too little food."
                    .to_string()
            }
            FailureCause::SecondaryExtinct => {
                "Failure: the foxes starved. The base of the food chain has to be strong."
                    .to_string()
            }
            FailureCause::Imbalance => {
                let hint = match mode {
                    GameMode::Hard => {
                        "In climate-crisis mode the goal is simply to keep every species alive."
                    }
                    GameMode::Normal => {
                        "Remember the pyramid: producers > primary consumers > secondary consumers."
                    }
                };
                format!("The balance collapsed. {hint}")
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub feedback: String,
    pub cause: Option<FailureCause>,
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// Classifies a final state under the rules of a game mode.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeEvaluator {
    target: PopulationState,
    tolerance: u32,
}

impl OutcomeEvaluator {
    pub fn new(target: PopulationState, tolerance: u32) -> Self {
        Self { target, tolerance }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.target, config.tolerance)
    }

    /// First extinction found, checked producer → primary → secondary.
    pub fn extinction(state: &PopulationState) -> Option<FailureCause> {
        if state.producer() <= PRODUCER_EXTINCTION {
            Some(FailureCause::ProducerExtinct)
        } else if state.primary() <= PRIMARY_EXTINCTION {
            Some(FailureCause::PrimaryExtinct)
        } else if state.secondary() <= SECONDARY_EXTINCTION {
            Some(FailureCause::SecondaryExtinct)
        } else {
            None
        }
    }

    pub fn is_extinct(state: &PopulationState) -> bool {
        Self::extinction(state).is_some()
    }

    /// Sum of absolute distances from the target. Decomposers are not scored.
    pub fn deviation(&self, state: &PopulationState) -> u32 {
        [Species::Producer, Species::Primary, Species::Secondary]
            .into_iter()
            .map(|species| state.get(species).abs_diff(self.target.get(species)))
            .sum()
    }

    pub fn is_balanced(&self, state: &PopulationState) -> bool {
        self.deviation(state) <= self.tolerance.saturating_mul(2)
    }

    pub fn evaluate(&self, state: &PopulationState, mode: GameMode) -> RunOutcome {
        let cause = match Self::extinction(state) {
            Some(cause) => Some(cause),
            None if mode == GameMode::Normal && !self.is_balanced(state) => {
                Some(FailureCause::Imbalance)
            }
            None => None,
        };
        match cause {
            Some(cause) => RunOutcome {
                status: RunStatus::Failure,
                feedback: cause.feedback(mode),
                cause: Some(cause),
            },
            None => RunOutcome {
                status: RunStatus::Success,
                feedback: success_feedback(mode).to_string(),
                cause: None,
            },
        }
    }

    pub fn target(&self) -> &PopulationState {
        &self.target
    }

    pub fn tolerance(&self) -> u32 {
        self.tolerance
    }
}

impl Default for OutcomeEvaluator {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

fn success_feedback(mode: GameMode) -> &'static str {
    match mode {
        GameMode::Hard => {
            "The ecosystem survived the catastrophe! Life held on through every disaster."
        }
        GameMode::Normal => "Perfect! Every species is living together in harmony.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(p: u32, c1: u32, c2: u32, d: u32) -> PopulationState {
        PopulationState::new(p, c1, c2, d).unwrap()
    }

    #[test]
    fn extinction_thresholds_are_inclusive() {
        assert!(OutcomeEvaluator::is_extinct(&state(5, 50, 40, 0)));
        assert!(!OutcomeEvaluator::is_extinct(&state(6, 50, 40, 0)));
        assert!(OutcomeEvaluator::is_extinct(&state(400, 5, 40, 0)));
        assert!(OutcomeEvaluator::is_extinct(&state(400, 50, 1, 0)));
        assert!(!OutcomeEvaluator::is_extinct(&state(400, 6, 2, 0)));
    }

    #[test]
    fn failure_message_priority() {
        let evaluator = OutcomeEvaluator::default();
        let all_dead = evaluator.evaluate(&PopulationState::ZERO, GameMode::Normal);
        assert_eq!(all_dead.cause, Some(FailureCause::ProducerExtinct));
        assert!(all_dead.feedback.contains("grass"));

        let consumers_dead = evaluator.evaluate(&state(498, 0, 0, 71), GameMode::Hard);
        assert_eq!(consumers_dead.cause, Some(FailureCause::PrimaryExtinct));
        assert!(consumers_dead.feedback.contains("rabbits"));

        let foxes_dead = evaluator.evaluate(&state(300, 80, 1, 50), GameMode::Normal);
        assert_eq!(foxes_dead.cause, Some(FailureCause::SecondaryExtinct));
        assert!(foxes_dead.feedback.contains("foxes"));
    }

    #[test]
    fn decomposers_are_never_scored() {
        let evaluator = OutcomeEvaluator::default();
        assert_eq!(evaluator.deviation(&state(400, 50, 40, 0)), 0);
        assert_eq!(evaluator.deviation(&state(400, 50, 40, 200)), 0);
        assert_eq!(evaluator.deviation(&state(410, 45, 35, 0)), 20);
    }

    #[test]
    fn normal_mode_needs_balance() {
        let evaluator = OutcomeEvaluator::default();
        let on_edge = evaluator.evaluate(&state(410, 45, 35, 10), GameMode::Normal);
        assert!(on_edge.is_success());

        let off_by_one = evaluator.evaluate(&state(411, 45, 35, 10), GameMode::Normal);
        assert_eq!(off_by_one.status, RunStatus::Failure);
        assert_eq!(off_by_one.cause, Some(FailureCause::Imbalance));
        assert!(off_by_one.feedback.starts_with("The balance collapsed."));
        assert!(off_by_one.feedback.contains("pyramid"));
    }

    #[test]
    fn huge_tolerance_accepts_any_surviving_state() {
        let config = EngineConfig::from_yaml_str("tolerance: 4294967295\n").unwrap();
        let evaluator = OutcomeEvaluator::from_config(&config);
        let outcome = evaluator.evaluate(&state(10, 300, 100, 0), GameMode::Normal);
        assert!(outcome.is_success());
        assert!(evaluator.is_balanced(&state(500, 6, 2, 200)));
    }

    #[test]
    fn hard_mode_only_needs_survival() {
        let evaluator = OutcomeEvaluator::default();
        let outcome = evaluator.evaluate(&state(100, 50, 10, 24), GameMode::Hard);
        assert!(outcome.is_success());
        assert!(outcome.feedback.contains("survived"));

        let normal = evaluator.evaluate(&state(100, 50, 10, 24), GameMode::Normal);
        assert_eq!(normal.cause, Some(FailureCause::Imbalance));
    }

    #[test]
    fn classification_matches_rules_across_grid() {
        let evaluator = OutcomeEvaluator::default();
        for p in (0..=500).step_by(25) {
            for c1 in (0..=300).step_by(10) {
                for c2 in (0..=100).step_by(5) {
                    let final_state = state(p, c1, c2, 30);
                    let extinct = OutcomeEvaluator::is_extinct(&final_state);
                    let hard = evaluator.evaluate(&final_state, GameMode::Hard);
                    assert_eq!(hard.is_success(), !extinct);
                    let normal = evaluator.evaluate(&final_state, GameMode::Normal);
                    let balanced = evaluator.deviation(&final_state) <= 2 * evaluator.tolerance();
                    assert_eq!(normal.is_success(), !extinct && balanced);
                    assert_eq!(normal.cause.is_none(), normal.is_success());
                }
            }
        }
    }
}
