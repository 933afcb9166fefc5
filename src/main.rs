use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ecobalance::{
    clock::{ClockOptions, SimulationClock, TickUpdate},
    config::{EngineConfig, GameMode},
    controller::RunController,
    population::{PopulationState, Species},
    report::{ReportWriter, RunReport},
    scenario::ScenarioLoader,
    systems::DisasterSchedule,
    web::{self, WebServerConfig},
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Four-species ecosystem balance simulator")]
struct Cli {
    /// Engine configuration YAML (built-in defaults when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run one simulation headless
    Run(RunArgs),
    /// Serve the game over HTTP
    Serve(ServeArgs),
}

#[derive(Debug, Args)]
struct RunArgs {
    /// Scenario YAML file; flags below override its values
    #[arg(long)]
    scenario: Option<PathBuf>,

    #[arg(long, value_enum)]
    mode: Option<GameMode>,

    #[arg(long)]
    producer: Option<u32>,

    #[arg(long)]
    primary: Option<u32>,

    #[arg(long)]
    secondary: Option<u32>,

    #[arg(long)]
    decomposer: Option<u32>,

    /// Master RNG seed
    #[arg(long)]
    seed: Option<u64>,

    /// Pace ticks at the mode cadence instead of running back-to-back
    #[arg(long)]
    realtime: bool,

    /// Directory for the JSON run report
    #[arg(long)]
    report_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json);

    let config = match &cli.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load engine config {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match cli.command {
        Command::Run(args) => run(config, args).await,
        Command::Serve(args) => {
            web::run(WebServerConfig {
                engine: config,
                host: args.host,
                port: args.port,
            })
            .await
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(config: EngineConfig, args: RunArgs) -> Result<()> {
    let (initial, mode, options) = resolve_run(&config, &args)?;

    let report = if args.realtime {
        run_realtime(config, initial, mode, options).await?
    } else {
        let mut clock = SimulationClock::new(initial, mode, &config, options)?;
        while clock.is_running() {
            print_tick(&clock.tick()?);
        }
        clock
            .report()
            .cloned()
            .context("run ended without a report")?
    };

    println!(
        "{} after {} ticks: {}",
        report.outcome.status, report.total_ticks, report.outcome.feedback
    );
    println!("Final populations: {}", report.final_state);

    if let Some(dir) = &args.report_dir {
        let path = ReportWriter::new(dir).write(&report)?;
        info!(path = %path.display(), "report written");
    }
    Ok(())
}

fn resolve_run(
    config: &EngineConfig,
    args: &RunArgs,
) -> Result<(PopulationState, GameMode, ClockOptions)> {
    let (mut initial, mut mode, mut options) = match &args.scenario {
        Some(path) => {
            let scenario = ScenarioLoader::new(".").load(path)?;
            info!(name = %scenario.name, "scenario loaded");
            (scenario.populations, scenario.mode, scenario.clock_options())
        }
        None => (
            PopulationState::DEFAULT_START,
            GameMode::default(),
            ClockOptions::default(),
        ),
    };

    if let Some(override_mode) = args.mode {
        mode = override_mode;
    }
    for (species, value) in [
        (Species::Producer, args.producer),
        (Species::Primary, args.primary),
        (Species::Secondary, args.secondary),
        (Species::Decomposer, args.decomposer),
    ] {
        if let Some(value) = value {
            initial = initial.with(species, value)?;
        }
    }
    if args.seed.is_some() {
        options.seed = args.seed;
    }

    if let DisasterSchedule::Forced { tick, .. } = options.schedule {
        if !config.mode(mode).disaster_enabled {
            bail!("a forced disaster needs a mode with disasters enabled, got {mode}");
        }
        if !config.disaster.window.contains(tick, config.total_ticks) {
            bail!("forced disaster at tick {tick} is outside the danger window");
        }
    }
    Ok((initial, mode, options))
}

async fn run_realtime(
    config: EngineConfig,
    initial: PopulationState,
    mode: GameMode,
    options: ClockOptions,
) -> Result<RunReport> {
    let mut controller = RunController::new(config)?;
    let mut handle = controller.start_with(initial, mode, options)?;

    loop {
        tokio::select! {
            update = handle.next_tick() => match update {
                Some(update) => print_tick(&update),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                handle.cancel();
                warn!(tick = handle.control().current_tick(), "interrupted");
            }
        }
    }

    match handle.outcome().await {
        Some(report) => Ok(report),
        None => bail!(
            "run cancelled after {} ticks",
            handle.history().ticks_elapsed()
        ),
    }
}

fn print_tick(update: &TickUpdate) {
    match &update.event {
        Some(event) => println!(
            "tick {:>3}  {}  !! {}: {}",
            update.tick, update.state, event.name, event.description
        ),
        None => println!("tick {:>3}  {}", update.tick, update.state),
    }
}
