use crate::{
    engine::{System, TickContext, TickFrame},
    population::PopulationState,
};

const PRODUCER_GROWTH: f64 = 0.2;
const PRODUCER_CAPACITY: f64 = 500.0;
const GRAZING_LOSS: f64 = 0.32;
const PRIMARY_GROWTH: f64 = 0.1;
const PRIMARY_FOOD_SCALE: f64 = 100.0;
const PREDATION_LOSS: f64 = 0.5;
const SECONDARY_GROWTH: f64 = 0.1;
const SECONDARY_FOOD_SCALE: f64 = 50.0;
const SECONDARY_DEATH: f64 = 0.1;
const DECOMPOSER_SHARE: f64 = 0.15;
const DECOMPOSER_RELAXATION: f64 = 0.1;

/// Computes the next snapshot from the previous one.
///
/// Every delta is taken from the same input state; the sums are rounded to the
/// nearest integer and clamped to each species range.
pub fn transition(state: &PopulationState) -> PopulationState {
    let p = state.producer() as f64;
    let c1 = state.primary() as f64;
    let c2 = state.secondary() as f64;
    let d = state.decomposer() as f64;

    let dp = PRODUCER_GROWTH * p * (1.0 - p / PRODUCER_CAPACITY) - GRAZING_LOSS * c1;
    let dc1 = PRIMARY_GROWTH * c1 * (p / PRIMARY_FOOD_SCALE) - PREDATION_LOSS * c2;
    let dc2 = SECONDARY_GROWTH * c2 * (c1 / SECONDARY_FOOD_SCALE) - SECONDARY_DEATH * c2;
    let dd = DECOMPOSER_RELAXATION * ((p + c1 + c2) * DECOMPOSER_SHARE - d);

    PopulationState::from_clamped(p + dp, c1 + dc1, c2 + dc2, d + dd)
}

#[derive(Debug, Default)]
pub struct TransitionSystem;

impl TransitionSystem {
    pub fn new() -> Self {
        Self
    }
}

impl System for TransitionSystem {
    fn name(&self) -> &str {
        "transition"
    }

    fn run(&mut self, _ctx: &TickContext, frame: &mut TickFrame) {
        frame.state = transition(&frame.state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::population::Species;

    fn state(p: u32, c1: u32, c2: u32, d: u32) -> PopulationState {
        PopulationState::new(p, c1, c2, d).unwrap()
    }

    /// Coarse grid over the whole input space, corners included.
    fn grid() -> impl Iterator<Item = PopulationState> {
        let axis = |max: u32| {
            let mut values: Vec<u32> = (0..=max).step_by((max / 10) as usize).collect();
            values.extend([1, max - 1, max]);
            values
        };
        let producers = axis(Species::Producer.max());
        let primaries = axis(Species::Primary.max());
        let secondaries = axis(Species::Secondary.max());
        let decomposers = axis(Species::Decomposer.max());
        producers.into_iter().flat_map(move |p| {
            let primaries = primaries.clone();
            let secondaries = secondaries.clone();
            let decomposers = decomposers.clone();
            primaries.into_iter().flat_map(move |c1| {
                let secondaries = secondaries.clone();
                let decomposers = decomposers.clone();
                secondaries.into_iter().flat_map(move |c2| {
                    decomposers
                        .clone()
                        .into_iter()
                        .map(move |d| state(p, c1, c2, d))
                })
            })
        })
    }

    #[test]
    fn output_stays_within_species_bounds() {
        for input in grid() {
            let next = transition(&input);
            for (species, count) in next.iter() {
                assert!(
                    count <= species.max(),
                    "{species} count {count} above max from {input}"
                );
            }
        }
    }

    #[test]
    fn repeated_calls_agree() {
        for input in grid().step_by(97) {
            assert_eq!(transition(&input), transition(&input));
        }
    }

    #[test]
    fn empty_ecosystem_stays_empty() {
        assert_eq!(transition(&PopulationState::ZERO), PopulationState::ZERO);
    }

    #[test]
    fn extinct_primary_cannot_recover() {
        let mut current = state(120, 0, 20, 30);
        for _ in 0..100 {
            current = transition(&current);
            assert_eq!(current.primary(), 0);
        }
    }

    #[test]
    fn target_is_a_fixed_point() {
        let target = state(400, 50, 40, 74);
        assert_eq!(transition(&target), target);
    }

    #[test]
    fn first_step_from_default_start() {
        assert_eq!(transition(&PopulationState::DEFAULT_START), state(49, 27, 10, 19));
    }

    #[test]
    fn overshoot_is_clamped_to_max() {
        let next = transition(&state(500, 300, 100, 200));
        assert_eq!(next.primary(), 300);
        assert_eq!(next.secondary(), 100);
        assert_eq!(next.producer(), 404);
    }

    #[test]
    fn deltas_use_pre_transition_values() {
        // dP = 0.2*340*0.32 - 16 = 5.76, dC1 = 17 - 20, dC2 = 4 - 4, dD = -0.95
        assert_eq!(transition(&state(340, 50, 40, 74)), state(346, 47, 40, 73));
    }
}
