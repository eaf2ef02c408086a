// Copyright (c) 2026 Pegasus Heavy Industries LLC
// Licensed under the MIT License

//! thermal-fan-sim: runs the control engine against a simulated fan board.
//!
//! Every concern runs as its own periodic task and they share state only
//! through the engine and the board:
//!
//! - control: `Engine::tick` every `tick_interval_ms`
//! - tach-N: one per fan, calls the fan's edge handler at the simulated
//!   tachometer rate (standing in for the pin interrupt)
//! - plant: integrates the simulated fans and coolant
//! - buzzer: follows the alarm flags
//! - status: logs a JSON status line

use clap::Parser;
use std::sync::Arc;
use thermal_fan_engine::clock::SystemClock;
use thermal_fan_engine::config::{self, Config};
use thermal_fan_engine::sim::SimBoard;
use thermal_fan_engine::status;
use thermal_fan_engine::Engine;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration};

/// Plant integration step.
const PLANT_STEP_MS: u64 = 100;

/// How often a stopped fan's tach task re-checks for rotation.
const STOPPED_FAN_POLL_MS: u64 = 50;

/// Buzzer polling period.
const BUZZER_POLL_MS: u64 = 250;

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "thermal-fan-sim", about = "Fan control engine on a simulated board")]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: String,

    /// Print the default configuration as TOML and exit.
    #[arg(long)]
    print_default_config: bool,
}

type SimEngine = Engine<SystemClock, Arc<SimBoard>, Arc<SimBoard>>;

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if cli.print_default_config {
        print!("{}", config::render_config(&Config::default())?);
        return Ok(());
    }

    let config_path = config::resolve_config_path(Some(&cli.config));
    let cfg = config::load_config(&config_path).unwrap_or_else(|e| {
        log::warn!("Could not load config: {e}, using defaults");
        Config::default()
    });

    let settings = cfg.engine_settings();
    let board = Arc::new(SimBoard::new(
        cfg.simulation.clone(),
        cfg.thermistor,
        settings.fan_count,
        settings.sensor_count,
        settings.tach.pulses_per_revolution,
    ));
    let engine: Arc<SimEngine> = Arc::new(Engine::new(
        settings,
        Arc::new(SystemClock::new()),
        Arc::clone(&board),
        Arc::clone(&board),
    ));

    for (fan, fan_cfg) in cfg.fans.iter().enumerate() {
        engine.set_channel_config(fan, fan_cfg.channel_config())?;
    }
    engine.prime();

    log::info!(
        "Simulating {} fan(s) and {} sensor(s), tick every {} ms",
        engine.fan_count(),
        engine.sensor_count(),
        cfg.engine.tick_interval_ms
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    tasks.push(tokio::spawn(control_task(
        Arc::clone(&engine),
        cfg.engine.tick_interval_ms,
        shutdown_rx.clone(),
    )));
    tasks.push(tokio::spawn(plant_task(Arc::clone(&board), shutdown_rx.clone())));
    for fan in 0..engine.fan_count() {
        tasks.push(tokio::spawn(tach_task(
            Arc::clone(&engine),
            Arc::clone(&board),
            fan,
            shutdown_rx.clone(),
        )?));
    }
    tasks.push(tokio::spawn(buzzer_task(Arc::clone(&engine), shutdown_rx.clone())));
    if cfg.simulation.status_interval_ms > 0 {
        tasks.push(tokio::spawn(status_task(
            Arc::clone(&engine),
            cfg.simulation.status_interval_ms,
            shutdown_rx.clone(),
        )));
    }

    tokio::signal::ctrl_c().await?;
    log::info!("Received shutdown signal");
    shutdown_tx.send(true)?;

    for task in tasks {
        if let Err(e) = task.await {
            log::error!("Task ended abnormally: {e}");
        }
    }
    log::info!("Simulation stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Tasks
// ---------------------------------------------------------------------------

async fn control_task(engine: Arc<SimEngine>, period_ms: u64, mut shutdown: watch::Receiver<bool>) {
    let mut interval = time::interval(Duration::from_millis(period_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                engine.tick();
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn plant_task(board: Arc<SimBoard>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = time::interval(Duration::from_millis(PLANT_STEP_MS));
    loop {
        tokio::select! {
            _ = interval.tick() => board.step(PLANT_STEP_MS),
            _ = shutdown.changed() => break,
        }
    }
}

/// Returns the future rather than being `async fn` so an unknown fan fails
/// at spawn time.
fn tach_task(
    engine: Arc<SimEngine>,
    board: Arc<SimBoard>,
    fan: usize,
    mut shutdown: watch::Receiver<bool>,
) -> anyhow::Result<impl Future<Output = ()> + Send + 'static> {
    let handler = engine.tach_handler(fan)?;
    Ok(async move {
        loop {
            let (wait, spinning) = match board.tach_period(fan) {
                Some(period) => (period, true),
                None => (Duration::from_millis(STOPPED_FAN_POLL_MS), false),
            };
            tokio::select! {
                _ = time::sleep(wait) => {
                    if spinning {
                        handler.on_edge();
                    }
                }
                _ = shutdown.changed() => break,
            }
        }
    })
}

async fn buzzer_task(engine: Arc<SimEngine>, mut shutdown: watch::Receiver<bool>) {
    let mut interval = time::interval(Duration::from_millis(BUZZER_POLL_MS));
    let mut tone = None;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                let next = engine.alarm_state().buzzer_tone_hz();
                if next != tone {
                    match next {
                        Some(hz) => log::warn!("Buzzer: beeping at {hz} Hz"),
                        None => log::info!("Buzzer: silent"),
                    }
                    tone = next;
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}

async fn status_task(engine: Arc<SimEngine>, period_ms: u64, mut shutdown: watch::Receiver<bool>) {
    let mut interval = time::interval(Duration::from_millis(period_ms));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                match status::encode(&engine.status()) {
                    Ok(line) => log::info!("Status: {}", line.trim_end()),
                    Err(e) => log::error!("Failed to encode status: {e}"),
                }
            }
            _ = shutdown.changed() => break,
        }
    }
}
