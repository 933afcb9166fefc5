use ecobalance::{
    clock::{ClockOptions, SimulationClock},
    config::{EngineConfig, GameMode},
    outcome::{FailureCause, RunStatus},
    population::PopulationState,
    scenario::{Scenario, ScenarioLoader},
    systems::{transition, DisasterKind, DisasterSchedule},
};

fn scenario_loader() -> ScenarioLoader {
    ScenarioLoader::new(env!("CARGO_MANIFEST_DIR"))
}

fn load(name: &str) -> Scenario {
    scenario_loader()
        .load(format!("scenarios/{name}.yaml"))
        .unwrap()
}

fn state(producer: u32, primary: u32, secondary: u32, decomposer: u32) -> PopulationState {
    PopulationState::new(producer, primary, secondary, decomposer).unwrap()
}

#[test]
fn every_bundled_scenario_validates() {
    let config = EngineConfig::default();
    for name in [
        "meadow",
        "golden_balance",
        "no_rabbits",
        "drought_at_21",
        "typhoon_survival",
    ] {
        let scenario = load(name);
        assert_eq!(scenario.name, name);
        scenario.validate(&config).unwrap();
    }
}

#[test]
fn default_start_collapses_the_same_way_every_time() {
    let config = EngineConfig::default();
    let scenario = load("meadow");
    assert_eq!(scenario.populations, PopulationState::DEFAULT_START);

    let reports: Vec<_> = [1, 2, 99]
        .into_iter()
        .map(|seed| {
            SimulationClock::new(
                scenario.populations,
                GameMode::Normal,
                &config,
                ClockOptions::seeded(seed),
            )
            .unwrap()
            .run_to_end()
            .unwrap()
        })
        .collect();

    for report in &reports {
        assert_eq!(report.history.len(), 101);
        assert_eq!(report.history.get(1), Some(&state(49, 27, 10, 19)));
        assert_eq!(report.final_state, state(498, 0, 5, 71));
        assert_eq!(report.outcome.status, RunStatus::Failure);
        assert_eq!(report.outcome.cause, Some(FailureCause::PrimaryExtinct));
        assert!(report.disaster.is_none());
    }
    assert_eq!(reports[0].history, reports[2].history);
}

#[test]
fn extinct_primary_never_recovers() {
    let scenario = load("no_rabbits");
    let report = scenario
        .build_clock(&EngineConfig::default())
        .unwrap()
        .run_to_end()
        .unwrap();

    assert!(report.history.iter().all(|snapshot| snapshot.primary() == 0));
    assert_eq!(report.history.get(1), Some(&state(138, 0, 18, 29)));
    assert_eq!(report.outcome.cause, Some(FailureCause::PrimaryExtinct));
    assert!(report.outcome.feedback.contains("rabbits"));
}

#[test]
fn target_state_holds_for_a_whole_run() {
    let scenario = load("golden_balance");
    let report = scenario
        .build_clock(&EngineConfig::default())
        .unwrap()
        .run_to_end()
        .unwrap();

    assert!(report.history.iter().all(|snapshot| *snapshot == scenario.populations));
    assert!(report.outcome.is_success());
    assert_eq!(report.outcome.cause, None);
}

#[test]
fn forced_drought_penalises_before_the_update() {
    let scenario = load("drought_at_21");
    let mut clock = scenario.build_clock(&EngineConfig::default()).unwrap();

    let mut hit = None;
    while clock.is_running() {
        let update = clock.tick().unwrap();
        if let Some(event) = update.event {
            assert!(hit.is_none(), "disaster fired twice");
            hit = Some((update.tick, event.kind));
        }
    }
    assert_eq!(hit, Some((21, DisasterKind::Drought)));

    let history = clock.history();
    let before = history.get(20).copied().unwrap();
    let expected = transition(&DisasterKind::Drought.apply(&before));
    assert_eq!(history.get(21), Some(&expected));
    assert_eq!(expected, state(346, 47, 40, 73));

    let report = clock.report().unwrap();
    assert_eq!(report.final_state, state(498, 0, 5, 71));
    assert_eq!(report.outcome.cause, Some(FailureCause::PrimaryExtinct));
    assert_eq!(report.disaster.as_ref().map(|event| event.tick), Some(21));
}

#[test]
fn typhoon_survivors_pass_hard_mode() {
    let scenario = load("typhoon_survival");
    let report = scenario
        .build_clock(&EngineConfig::default())
        .unwrap()
        .run_to_end()
        .unwrap();

    assert_eq!(report.mode, GameMode::Hard);
    assert_eq!(report.seed, 7);
    assert_eq!(report.final_state, state(90, 45, 9, 24));
    assert!(report.outcome.is_success());
    assert!(report.outcome.feedback.contains("survived"));
}

#[test]
fn flood_or_invasion_wipes_out_a_fragile_start() {
    let config = EngineConfig::default();
    for kind in [DisasterKind::Flood, DisasterKind::Invasive] {
        let options =
            ClockOptions::seeded(5).with_schedule(DisasterSchedule::Forced { tick: 21, kind });
        let report = SimulationClock::new(state(100, 50, 10, 24), GameMode::Hard, &config, options)
            .unwrap()
            .run_to_end()
            .unwrap();
        assert_eq!(report.final_state, state(0, 0, 5, 5));
        assert_eq!(report.outcome.cause, Some(FailureCause::ProducerExtinct));
    }
}

#[test]
fn cancelling_mid_run_keeps_partial_history() {
    let mut clock = load("meadow")
        .build_clock(&EngineConfig::default())
        .unwrap();
    for _ in 0..50 {
        clock.tick().unwrap();
    }
    assert!(clock.cancel());
    assert!(clock.tick().is_err());
    assert_eq!(clock.history().len(), 51);
    assert!(clock.report().is_none());
}
