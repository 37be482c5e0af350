//! Node driver: wires real or simulated peripherals into the controller and
//! ticks it until Ctrl-C.

#[cfg(not(any(feature = "sim", feature = "hw")))]
compile_error!("enable the `sim` or `hw` feature");

#[cfg_attr(not(feature = "hw"), allow(dead_code))]
mod adc;
#[cfg_attr(not(feature = "hw"), allow(dead_code))]
mod climate;
mod clock;
mod config;
mod relays;
mod serial;
#[cfg(all(feature = "sim", not(feature = "hw")))]
mod sim;
mod store;

use anyhow::{Context, Result};
use std::env;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use hydro_controller::{
    AnalogSpec, CalibrationStore, Controller, RelayBank, SensorReader, CALIBRATION_BASE_OFFSET,
};

use clock::SystemClock;
use config::Config;
use relays::RelayBoard;
use store::FileStore;

/// Pause between ticks so an idle loop does not spin a core.
const IDLE_SLEEP: Duration = Duration::from_millis(5);

// ── Board assembly ──────────────────────────────────────────────────────────

#[cfg(feature = "hw")]
type Analog = adc::Ads1115Bank;
#[cfg(feature = "hw")]
type Climate = climate::IioClimate;
#[cfg(feature = "hw")]
type Link = serial::UartLink;

#[cfg(not(feature = "hw"))]
type Analog = sim::ProbeSim;
#[cfg(not(feature = "hw"))]
type Climate = sim::SimClimate;
#[cfg(not(feature = "hw"))]
type Link = serial::SimLink;

type Node = Controller<Analog, RelayBoard, Climate, FileStore, Link, SystemClock>;

/// Day/night cycle length for the simulator, in seconds.
#[cfg(not(feature = "hw"))]
const SIM_DAY_S: f64 = 600.0;

#[cfg(feature = "hw")]
fn build(cfg: &Config) -> Result<Node> {
    let analog = adc::Ads1115Bank::new(&cfg.analog)?;
    let climate = climate::IioClimate::new(&cfg.climate.iio_device);
    let link = serial::UartLink::open(&cfg.serial.device, cfg.serial.baud)?;
    assemble(cfg, analog, climate, link)
}

#[cfg(not(feature = "hw"))]
fn build(cfg: &Config) -> Result<Node> {
    let scenario = cfg.sim.scenario;
    tracing::info!(%scenario, "running against simulated hardware");
    let analog = sim::ProbeSim::new(scenario, hydro_controller::PH_CHANNELS, SIM_DAY_S);
    let climate = sim::SimClimate::new(scenario, SIM_DAY_S);
    assemble(cfg, analog, climate, serial::SimLink::from_stdin())
}

fn assemble(cfg: &Config, analog: Analog, climate: Climate, link: Link) -> Result<Node> {
    let relays = RelayBank::new(RelayBoard::new(&cfg.relay_pins())?);
    let store = FileStore::new(&cfg.storage.calibration_path);
    tracing::info!(path = %store.path().display(), "calibration image");

    Ok(Controller::new(
        SensorReader::new(analog, AnalogSpec::TEN_BIT_5V),
        relays,
        climate,
        CalibrationStore::new(store, CALIBRATION_BASE_OFFSET),
        link,
        SystemClock::new(),
    ))
}

// ── Run loop ────────────────────────────────────────────────────────────────

fn run(mut node: Node, shutdown: &AtomicBool) {
    let mut ticks: u64 = 0;
    while !shutdown.load(Ordering::Relaxed) {
        let report = node.tick();
        ticks += 1;
        if report.sampled || report.frames > 0 {
            tracing::trace!(ticks, ?report, "tick");
        }
        std::thread::sleep(IDLE_SLEEP);
    }
    node.relays_mut().all_off();
    tracing::info!(ticks, "control loop stopped, relays off");

    #[cfg(not(feature = "hw"))]
    tracing::info!(
        target: "host",
        frames = node.transport().frames_seen(),
        "telemetry frames received"
    );
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    // ── Config ──────────────────────────────────────────────────────
    let config_path = env::var("CONFIG_PATH").unwrap_or_else(|_| "node.toml".to_string());
    let cfg = config::load(&config_path)?;

    // ── Hardware ────────────────────────────────────────────────────
    let node = build(&cfg).context("failed to bring up hardware")?;

    // ── Control loop ────────────────────────────────────────────────
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    let worker = tokio::task::spawn_blocking(move || run(node, &flag));
    tracing::info!("node running; Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;
    tracing::info!("shutdown requested");
    shutdown.store(true, Ordering::Relaxed);

    worker.await.context("control loop panicked")?;
    Ok(())
}
