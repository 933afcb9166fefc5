mod disaster;
mod transition;

pub use disaster::{DisasterEvent, DisasterInjector, DisasterKind, DisasterSchedule};
pub use transition::{transition, TransitionSystem};
