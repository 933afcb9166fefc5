use crate::{
    config::{EngineConfig, GameMode},
    population::PopulationState,
    rng::RngManager,
    systems::{DisasterEvent, DisasterInjector, DisasterSchedule, TransitionSystem},
};

pub struct TickContext {
    /// 1-based number of the tick being computed.
    pub tick: u32,
    pub total_ticks: u32,
    pub mode: GameMode,
}

/// Working state threaded through the systems during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickFrame {
    pub state: PopulationState,
    pub event: Option<DisasterEvent>,
}

impl TickFrame {
    pub fn new(state: PopulationState) -> Self {
        Self { state, event: None }
    }
}

pub trait System: Send {
    fn name(&self) -> &str;
    fn run(&mut self, ctx: &TickContext, frame: &mut TickFrame);
}

#[derive(Default)]
pub struct EngineBuilder {
    systems: Vec<Box<dyn System>>,
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, system: impl System + 'static) -> Self {
        self.systems.push(Box::new(system));
        self
    }

    pub fn build(self) -> Engine {
        Engine {
            systems: self.systems,
        }
    }
}

/// Ordered pipeline of systems applied to each tick's state.
pub struct Engine {
    systems: Vec<Box<dyn System>>,
}

impl Engine {
    /// Disaster roll on the previous snapshot, then the update law.
    pub fn standard(
        config: &EngineConfig,
        mode: GameMode,
        rng: &RngManager,
        schedule: DisasterSchedule,
    ) -> Self {
        let disasters =
            DisasterInjector::new(config, mode, rng.stream("disaster")).with_schedule(schedule);
        EngineBuilder::new()
            .with_system(disasters)
            .with_system(TransitionSystem::new())
            .build()
    }

    pub fn step(&mut self, ctx: &TickContext, previous: &PopulationState) -> TickFrame {
        let mut frame = TickFrame::new(*previous);
        for system in &mut self.systems {
            system.run(ctx, &mut frame);
        }
        frame
    }

    pub fn system_names(&self) -> Vec<&str> {
        self.systems.iter().map(|system| system.name()).collect()
    }
}
