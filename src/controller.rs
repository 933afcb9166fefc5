//! Real-time driver for [`SimulationClock`].
//!
//! Each run gets one tokio task that calls [`SimulationClock::tick`] once per
//! period and publishes the result. Cancellation marks the clock cancelled
//! under its lock, so no tick can be applied afterwards, and wakes the task
//! through a watch channel so it exits without waiting for the next period.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};

use crate::{
    clock::{ClockOptions, ClockStatus, SimulationClock, TickUpdate},
    config::{EngineConfig, GameMode},
    error::EngineError,
    population::{History, PopulationState},
    report::RunReport,
    systems::DisasterEvent,
};

/// Display slot for the most recent disaster.
///
/// An event stays visible for a fixed duration regardless of tick speed. The
/// slot only ever holds a copy of the event; clearing it never touches
/// simulation state and is safe to repeat.
#[derive(Clone, Default)]
pub struct DisasterBanner {
    inner: Arc<Mutex<BannerState>>,
}

#[derive(Default)]
struct BannerState {
    event: Option<DisasterEvent>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl DisasterBanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shows `event` and schedules it to clear after `duration`. A newer event
    /// replaces the current one and restarts the timer.
    pub fn show(&self, event: DisasterEvent, duration: Duration) {
        let mut state = self.inner.lock().expect("disaster banner lock poisoned");
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.generation += 1;
        state.event = Some(event);
        let generation = state.generation;
        let banner = self.clone();
        state.timer = Some(tokio::spawn(async move {
            time::sleep(duration).await;
            let mut state = banner.inner.lock().expect("disaster banner lock poisoned");
            // A timer that lost the race with a newer event must not clear it.
            if state.generation == generation {
                state.event = None;
                state.timer = None;
            }
        }));
    }

    pub fn clear(&self) {
        let mut state = self.inner.lock().expect("disaster banner lock poisoned");
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        state.event = None;
    }

    pub fn current(&self) -> Option<DisasterEvent> {
        self.inner
            .lock()
            .expect("disaster banner lock poisoned")
            .event
            .clone()
    }
}

struct RunShared {
    id: u64,
    clock: Mutex<SimulationClock>,
    cancel_tx: watch::Sender<bool>,
    banner: DisasterBanner,
    done: AtomicBool,
}

impl RunShared {
    fn cancel(&self) -> bool {
        let cancelled = self.clock.lock().expect("clock lock poisoned").cancel();
        if cancelled {
            self.banner.clear();
            let _ = self.cancel_tx.send(true);
        }
        cancelled
    }

    fn is_active(&self) -> bool {
        !self.done.load(Ordering::SeqCst)
            && self.clock.lock().expect("clock lock poisoned").is_running()
    }
}

/// Cloneable view of a run: cancellation plus read access to its progress.
#[derive(Clone)]
pub struct RunControl {
    shared: Arc<RunShared>,
}

impl RunControl {
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Stops the run at the next tick boundary. Idempotent; a no-op once the
    /// run has finished. Returns whether this call did the cancelling.
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    pub fn status(&self) -> ClockStatus {
        self.shared.clock.lock().expect("clock lock poisoned").status()
    }

    pub fn is_active(&self) -> bool {
        self.shared.is_active()
    }

    pub fn current_tick(&self) -> u32 {
        self.shared
            .clock
            .lock()
            .expect("clock lock poisoned")
            .current_tick()
    }

    /// Copy of the snapshots recorded so far.
    pub fn history(&self) -> History {
        self.shared
            .clock
            .lock()
            .expect("clock lock poisoned")
            .history()
            .clone()
    }

    /// Disaster currently on display, if any.
    pub fn current_event(&self) -> Option<DisasterEvent> {
        self.shared.banner.current()
    }
}

/// Consumer side of one run: the tick stream and the final report.
pub struct RunHandle {
    control: RunControl,
    ticks: mpsc::Receiver<TickUpdate>,
    outcome: Option<oneshot::Receiver<RunReport>>,
}

impl RunHandle {
    pub fn id(&self) -> u64 {
        self.control.id()
    }

    /// Next published tick, or `None` once the run has ended or was cancelled
    /// and every buffered tick has been read.
    pub async fn next_tick(&mut self) -> Option<TickUpdate> {
        self.ticks.recv().await
    }

    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    pub fn control(&self) -> RunControl {
        self.control.clone()
    }

    pub fn history(&self) -> History {
        self.control.history()
    }

    pub fn current_event(&self) -> Option<DisasterEvent> {
        self.control.current_event()
    }

    /// Waits for the report. Yields it once; `None` for cancelled runs and on
    /// every later call.
    pub async fn outcome(&mut self) -> Option<RunReport> {
        let receiver = self.outcome.take()?;
        receiver.await.ok()
    }
}

/// Owns the run lifecycle and enforces one active run at a time.
///
/// Starting while a run is active is rejected with [`EngineError::RunActive`];
/// cancel the active run first.
pub struct RunController {
    config: Arc<EngineConfig>,
    active: Option<RunControl>,
    next_id: u64,
}

impl RunController {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            active: None,
            next_id: 1,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn start(
        &mut self,
        initial: PopulationState,
        mode: GameMode,
    ) -> Result<RunHandle, EngineError> {
        self.start_with(initial, mode, ClockOptions::default())
    }

    /// Must be called from within a tokio runtime.
    pub fn start_with(
        &mut self,
        initial: PopulationState,
        mode: GameMode,
        options: ClockOptions,
    ) -> Result<RunHandle, EngineError> {
        if self.is_active() {
            return Err(EngineError::RunActive);
        }
        let clock = SimulationClock::new(initial, mode, &self.config, options)?;
        let period = clock.period();
        let capacity = clock.total_ticks().max(1) as usize;
        let id = self.next_id;
        self.next_id += 1;

        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (tick_tx, tick_rx) = mpsc::channel(capacity);
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let shared = Arc::new(RunShared {
            id,
            clock: Mutex::new(clock),
            cancel_tx,
            banner: DisasterBanner::new(),
            done: AtomicBool::new(false),
        });

        tokio::spawn(drive(
            shared.clone(),
            period,
            self.config.disaster.display_duration(),
            cancel_rx,
            tick_tx,
            outcome_tx,
        ));

        let control = RunControl { shared };
        self.active = Some(control.clone());
        Ok(RunHandle {
            control,
            ticks: tick_rx,
            outcome: Some(outcome_rx),
        })
    }

    /// Cancels the active run, if any. Returns whether a run was stopped.
    pub fn cancel_active(&mut self) -> bool {
        self.active
            .take()
            .map(|control| control.cancel())
            .unwrap_or(false)
    }

    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .is_some_and(|control| control.is_active())
    }

    pub fn active(&self) -> Option<RunControl> {
        self.active.clone().filter(|control| control.is_active())
    }
}

async fn drive(
    shared: Arc<RunShared>,
    period: Duration,
    display: Duration,
    mut cancel_rx: watch::Receiver<bool>,
    tick_tx: mpsc::Sender<TickUpdate>,
    outcome_tx: oneshot::Sender<RunReport>,
) {
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = cancel_rx.changed() => break,
            _ = interval.tick() => {}
        }

        // The banner is raised under the clock lock so a concurrent cancel,
        // which takes the same lock first, always clears it afterwards.
        let (step, report) = {
            let mut clock = shared.clock.lock().expect("clock lock poisoned");
            let step = clock.tick();
            if let Ok(TickUpdate {
                event: Some(event), ..
            }) = &step
            {
                shared.banner.show(event.clone(), display);
            }
            (step, clock.report().cloned())
        };

        match step {
            Ok(update) => {
                if tick_tx.send(update).await.is_err() && report.is_none() {
                    // Handle dropped: nobody can observe or cancel this run.
                    shared.cancel();
                    info!(run = shared.id, "run abandoned by its handle");
                    break;
                }
                if let Some(report) = report {
                    shared.banner.clear();
                    info!(run = shared.id, status = ?report.outcome.status, "delivering outcome");
                    let _ = outcome_tx.send(report);
                    break;
                }
            }
            Err(EngineError::RunCancelled { .. }) => break,
            Err(err) => {
                warn!(run = shared.id, error = %err, "run stopped unexpectedly");
                break;
            }
        }
    }

    shared.done.store(true, Ordering::SeqCst);
}
