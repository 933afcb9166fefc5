use std::{
    collections::BTreeMap,
    convert::Infallible,
    net::SocketAddr,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::{net::TcpListener, sync::broadcast};
use tokio_stream::{wrappers::BroadcastStream, Stream, StreamExt};
use tracing::{debug, info};

use crate::{
    clock::TickUpdate,
    config::{EngineConfig, GameMode},
    controller::{RunController, RunHandle},
    error::EngineError,
    population::{History, PopulationState, Species},
    report::RunReport,
    session::{GamePhase, Session},
    systems::DisasterEvent,
};

/// Messages pushed to `/api/events` subscribers.
#[derive(Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Tick(TickUpdate),
    Outcome(RunReport),
}

#[derive(Clone, Serialize)]
pub struct StateEnvelope {
    pub phase: GamePhase,
    pub mode: GameMode,
    pub populations: PopulationState,
    pub limits: BTreeMap<Species, u32>,
    pub show_target: bool,
    pub target: Option<PopulationState>,
    pub tick: Option<u32>,
    pub history: Option<History>,
    pub current_event: Option<DisasterEvent>,
    pub report: Option<RunReport>,
}

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppInner>,
}

struct AppInner {
    target: PopulationState,
    limits: BTreeMap<Species, u32>,
    // Lock order: session before controller.
    session: Mutex<Session>,
    controller: Mutex<RunController>,
    broadcaster: broadcast::Sender<String>,
}

impl AppState {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let target = config.target;
        let limits = Species::ALL
            .into_iter()
            .map(|species| (species, config.species_max(species)))
            .collect();
        let (broadcaster, _) = broadcast::channel::<String>(512);
        Ok(Self {
            inner: Arc::new(AppInner {
                target,
                limits,
                session: Mutex::new(Session::new()),
                controller: Mutex::new(RunController::new(config)?),
                broadcaster,
            }),
        })
    }

    pub fn envelope(&self) -> StateEnvelope {
        let session = self.inner.session.lock().expect("session lock poisoned");
        let active = self
            .inner
            .controller
            .lock()
            .expect("controller lock poisoned")
            .active();
        let report = session.last_report().cloned();
        let (tick, history, current_event) = match (&active, &report) {
            (Some(control), _) => (
                Some(control.current_tick()),
                Some(control.history()),
                control.current_event(),
            ),
            (None, Some(report)) => (Some(report.total_ticks), Some(report.history.clone()), None),
            (None, None) => (None, None, None),
        };
        let populations = history
            .as_ref()
            .and_then(|history| history.latest().copied())
            .unwrap_or(*session.populations());
        StateEnvelope {
            phase: session.phase(),
            mode: session.mode(),
            populations,
            limits: self.inner.limits.clone(),
            show_target: session.show_target(),
            target: session.show_target().then_some(self.inner.target),
            tick,
            history,
            current_event,
            report,
        }
    }

    fn publish(&self, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(payload) => {
                let _ = self.inner.broadcaster.send(payload);
            }
            Err(err) => debug!(error = %err, "failed to encode server event"),
        }
    }

    fn cancel_active(&self) -> bool {
        self.inner
            .controller
            .lock()
            .expect("controller lock poisoned")
            .cancel_active()
    }
}

pub struct WebServerConfig {
    pub engine: EngineConfig,
    pub host: String,
    pub port: u16,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/state", get(latest_state))
        .route("/api/mode-select", post(open_mode_select))
        .route("/api/intro", post(back_to_intro))
        .route("/api/mode", post(select_mode))
        .route("/api/populations", put(set_population))
        .route("/api/run", post(start_run))
        .route("/api/back", post(abandon))
        .route("/api/ack", post(acknowledge))
        .route("/api/events", get(stream_events))
        .with_state(state)
}

pub async fn run(config: WebServerConfig) -> Result<()> {
    let WebServerConfig { engine, host, port } = config;
    let state = AppState::new(engine)?;
    let app = router(state.clone());

    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .with_context(|| format!("invalid listen address {host}:{port}"))?;
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "ecobalance server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state))
        .await?;
    Ok(())
}

async fn shutdown_signal(state: AppState) {
    let _ = tokio::signal::ctrl_c().await;
    if state.cancel_active() {
        info!("cancelled active run during shutdown");
    }
    info!("shutting down");
}

pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        ApiError(value)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            EngineError::InvalidPopulation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            EngineError::RunActive
            | EngineError::InvalidPhase { .. }
            | EngineError::RunFinished { .. }
            | EngineError::RunCancelled { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = serde_json::json!({ "error": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<StateEnvelope>, ApiError>;

async fn latest_state(State(state): State<AppState>) -> Json<StateEnvelope> {
    Json(state.envelope())
}

async fn open_mode_select(State(state): State<AppState>) -> ApiResult {
    state
        .inner
        .session
        .lock()
        .expect("session lock poisoned")
        .open_mode_select()?;
    Ok(Json(state.envelope()))
}

async fn back_to_intro(State(state): State<AppState>) -> ApiResult {
    state
        .inner
        .session
        .lock()
        .expect("session lock poisoned")
        .back_to_intro()?;
    Ok(Json(state.envelope()))
}

#[derive(Deserialize)]
pub struct ModeRequest {
    pub mode: GameMode,
}

async fn select_mode(State(state): State<AppState>, Json(request): Json<ModeRequest>) -> ApiResult {
    state
        .inner
        .session
        .lock()
        .expect("session lock poisoned")
        .select_mode(request.mode)?;
    Ok(Json(state.envelope()))
}

#[derive(Deserialize)]
pub struct PopulationRequest {
    pub species: Species,
    pub value: u32,
}

async fn set_population(
    State(state): State<AppState>,
    Json(request): Json<PopulationRequest>,
) -> ApiResult {
    state
        .inner
        .session
        .lock()
        .expect("session lock poisoned")
        .set_population(request.species, request.value)?;
    Ok(Json(state.envelope()))
}

async fn start_run(State(state): State<AppState>) -> ApiResult {
    let handle = {
        let mut session = state.inner.session.lock().expect("session lock poisoned");
        let (initial, mode) = session.run_request()?;
        let handle = state
            .inner
            .controller
            .lock()
            .expect("controller lock poisoned")
            .start(initial, mode)?;
        session.begin_run()?;
        handle
    };
    tokio::spawn(forward_run(state.clone(), handle));
    Ok(Json(state.envelope()))
}

/// Leaves the game screen for mode selection, cancelling any running clock
/// before the phase changes.
async fn abandon(State(state): State<AppState>) -> ApiResult {
    {
        let mut session = state.inner.session.lock().expect("session lock poisoned");
        state
            .inner
            .controller
            .lock()
            .expect("controller lock poisoned")
            .cancel_active();
        session.abandon()?;
    }
    Ok(Json(state.envelope()))
}

async fn acknowledge(State(state): State<AppState>) -> ApiResult {
    state
        .inner
        .session
        .lock()
        .expect("session lock poisoned")
        .acknowledge_result()?;
    Ok(Json(state.envelope()))
}

async fn forward_run(state: AppState, mut handle: RunHandle) {
    while let Some(update) = handle.next_tick().await {
        state.publish(&ServerEvent::Tick(update));
    }
    let Some(report) = handle.outcome().await else {
        debug!(run = handle.id(), "run ended without an outcome");
        return;
    };
    let recorded = state
        .inner
        .session
        .lock()
        .expect("session lock poisoned")
        .finish_run(report.clone());
    match recorded {
        Ok(()) => state.publish(&ServerEvent::Outcome(report)),
        Err(err) => debug!(run = handle.id(), error = %err, "outcome arrived after navigation"),
    }
}

async fn stream_events(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.inner.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|msg| match msg {
        Ok(payload) => Some(Ok(Event::default().data(payload))),
        Err(_) => None,
    });
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(2))
            .text("keep-alive"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn configured(state: &AppState, mode: GameMode) {
        open_mode_select(State(state.clone())).await.ok().unwrap();
        select_mode(State(state.clone()), Json(ModeRequest { mode }))
            .await
            .ok()
            .unwrap();
    }

    fn status_of(result: ApiResult) -> StatusCode {
        match result {
            Ok(_) => StatusCode::OK,
            Err(err) => err.into_response().status(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn full_run_reaches_result_phase() {
        let state = AppState::new(EngineConfig::default()).unwrap();
        let mut events = state.inner.broadcaster.subscribe();
        configured(&state, GameMode::Normal).await;

        let envelope = start_run(State(state.clone())).await.ok().unwrap();
        assert_eq!(envelope.phase, GamePhase::Simulating);

        tokio::time::sleep(Duration::from_secs(11)).await;
        let envelope = state.envelope();
        assert_eq!(envelope.phase, GamePhase::Result);
        assert_eq!(envelope.tick, Some(100));
        assert_eq!(envelope.history.as_ref().map(History::len), Some(101));
        assert!(envelope.show_target);
        assert!(envelope.target.is_some());
        assert_eq!(envelope.limits.get(&Species::Producer), Some(&500));

        let mut ticks = 0;
        let mut outcomes = 0;
        while let Ok(payload) = events.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&payload).unwrap();
            match value["type"].as_str() {
                Some("tick") => ticks += 1,
                Some("outcome") => outcomes += 1,
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(ticks, 100);
        assert_eq!(outcomes, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_calls_map_to_http_status() {
        let state = AppState::new(EngineConfig::default()).unwrap();
        assert_eq!(status_of(start_run(State(state.clone())).await), StatusCode::CONFLICT);

        configured(&state, GameMode::Hard).await;
        let bad = set_population(
            State(state.clone()),
            Json(PopulationRequest {
                species: Species::Secondary,
                value: 150,
            }),
        )
        .await;
        assert_eq!(status_of(bad), StatusCode::UNPROCESSABLE_ENTITY);

        start_run(State(state.clone())).await.ok().unwrap();
        assert_eq!(status_of(start_run(State(state.clone())).await), StatusCode::CONFLICT);
    }

    #[tokio::test(start_paused = true)]
    async fn back_during_run_cancels_clock() {
        let state = AppState::new(EngineConfig::default()).unwrap();
        configured(&state, GameMode::Hard).await;
        start_run(State(state.clone())).await.ok().unwrap();

        tokio::time::sleep(Duration::from_millis(1_050)).await;
        let envelope = abandon(State(state.clone())).await.ok().unwrap();
        assert_eq!(envelope.phase, GamePhase::ModeSelect);
        assert!(!state.inner.controller.lock().unwrap().is_active());

        tokio::time::sleep(Duration::from_secs(30)).await;
        let envelope = state.envelope();
        assert_eq!(envelope.phase, GamePhase::ModeSelect);
        assert!(envelope.report.is_none());
    }
}
