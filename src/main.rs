use alloy_primitives::{
    Address,
    address,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use scratch_engine::{
    config::EngineConfig,
    ports::LogFeedback,
    reveal::ClaimPolicy,
    session::Collaborators,
    simulated::{
        MemoryNotifier,
        MemoryPersistence,
        SimulatedChain,
        SimulatedSigner,
    },
};
use std::sync::OnceLock;
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

mod app;
mod ui;

/// Wallet that scratches and claims in the terminal client.
const PLAYER: Address = address!("5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c");
/// Validity of locally issued claim signatures.
const SIMULATED_SIGNATURE_SECS: u64 = 600;

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

struct CliArgs {
    simulate: bool,
    config_path: Option<String>,
    fullscreen: bool,
    auto_claim: bool,
}

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: scratch [--simulate] [--config <path>] [--fullscreen] [--auto-claim]\n\
         \n\
         Flags:\n\
           --simulate          Play against the in-memory chain, signer and persistence (required)\n\
           --config <path>     Engine config JSON (service URLs, contract, claim costs)\n\
           --fullscreen        Use the full-screen reveal threshold ({}%)\n\
           --auto-claim        Start the claim as soon as a win is revealed",
        scratch_engine::detector::FULLSCREEN_THRESHOLD_PERCENT,
    );
    std::process::exit(0);
}

fn parse_cli_args() -> Result<CliArgs> {
    let mut args = std::env::args().skip(1);
    let mut cli = CliArgs {
        simulate: false,
        config_path: None,
        fullscreen: false,
        auto_claim: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--simulate" => cli.simulate = true,
            "--fullscreen" => cli.fullscreen = true,
            "--auto-claim" => cli.auto_claim = true,
            "--config" => {
                let path = args
                    .next()
                    .ok_or_else(|| eyre!("--config requires a path argument"))?;
                if cli.config_path.is_some() {
                    return Err(eyre!("--config may only be specified once"));
                }
                cli.config_path = Some(path);
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }
    Ok(cli)
}

/// Only simulated play is wired up: no live chain provider or card source.
fn require_simulation(cli: &CliArgs) -> Result<()> {
    if cli.simulate {
        Ok(())
    } else {
        Err(eyre!(
            "no live chain provider or card source is available; pass --simulate"
        ))
    }
}

fn init_logging(engine: &EngineConfig) -> Result<()> {
    let dir = engine.log_dir()?;
    std::fs::create_dir_all(&dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(rolling::daily(dir, "scratch.log"));
    let _ = LOG_GUARD.set(guard);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|err| eyre!("failed to install tracing subscriber: {err}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = parse_cli_args()?;
    let mut engine = EngineConfig::load(cli.config_path.as_deref())?;
    if cli.fullscreen {
        engine.fullscreen = true;
    }
    if cli.auto_claim {
        engine.claim_policy = ClaimPolicy::Automatic;
    }
    require_simulation(&cli)?;
    init_logging(&engine)?;
    tracing::info!("starting scratch client against simulated services");

    let signer = SimulatedSigner::new(SIMULATED_SIGNATURE_SECS);
    let collaborators = Collaborators {
        chain: SimulatedChain::new(PLAYER),
        signer: signer.clone(),
        persistence: MemoryPersistence::default(),
        notifier: MemoryNotifier::default(),
        feedback: LogFeedback::default(),
    };
    let app = app::App::new(&engine, PLAYER, collaborators, Some(signer));
    app::run_app(app).await
}
