#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! `valve` binary: drives the valve controller from the command line.
//!
//! Without the `hardware` feature every valve runs against the simulated
//! actuator, so calibration and movement can be exercised end to end on a
//! development machine; the persistent store is file-backed either way.

mod cli;

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use valve_config::{Config, ValveCfg};
use valve_core::registry::ValveBank;
use valve_core::valve::{TravelLimit, Valve};
use valve_core::{REGION_DATA_LEN, ValveBuilder, run_to_idle};
use valve_hardware::FileStore;
use valve_traits::{ConfigStore, CurrentSensor, Relay};

use crate::cli::{Cli, Commands};

type BoxRelay = Box<dyn Relay>;
type BoxSensor = Box<dyn CurrentSensor>;
type BoxStore = Box<dyn ConfigStore>;
type CliValve = Valve<BoxRelay, BoxRelay, BoxSensor, BoxStore>;
type CliBank = ValveBank<BoxRelay, BoxRelay, BoxSensor, BoxStore>;

/// Full-range sweep time of the simulated actuator.
#[cfg(not(feature = "hardware"))]
const SIM_SWEEP: Duration = Duration::from_secs(5);

fn init_logging(cli_level: Option<&str>, cfg: &Config) -> Result<()> {
    let level = cli_level
        .or(cfg.logging.level.as_deref())
        .unwrap_or("info");
    let filter = tracing_subscriber::EnvFilter::try_new(level)
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;
    match &cfg.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .wrap_err_with(|| format!("opening log file {path}"))?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(file)
                .with_ansi(false)
                .init();
        }
        None => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
    Ok(())
}

/// Load the TOML config; a missing file yields a built-in single-valve
/// default (returned flag says which happened).
fn load_config(path: &Path) -> Result<(Config, bool)> {
    if !path.exists() {
        return Ok((Config {
            valves: vec![ValveCfg {
                name: Some("valve0".to_string()),
                drive_pin: 5,
                direction_pin: 6,
                sense_channel: 0,
                region: 0,
            }],
            store: Default::default(),
            tick: Default::default(),
            logging: Default::default(),
        }, true));
    }
    let text = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("reading config {}", path.display()))?;
    Ok((valve_config::load_toml(&text).wrap_err("parsing config TOML")?, false))
}

fn build_valve(v: &ValveCfg, store: &FileStore) -> Result<CliValve> {
    let slot: BoxStore = Box::new(store.slot(usize::from(v.region))?);

    #[cfg(feature = "hardware")]
    let (drive, direction, sensor): (BoxRelay, BoxRelay, BoxSensor) = (
        Box::new(valve_hardware::GpioRelay::new(v.drive_pin)?),
        Box::new(valve_hardware::GpioRelay::new(v.direction_pin)?),
        Box::new(valve_hardware::mcp3008::Mcp3008Channel::on_spi0(
            v.sense_channel,
        )?),
    );

    #[cfg(not(feature = "hardware"))]
    let (drive, direction, sensor): (BoxRelay, BoxRelay, BoxSensor) = {
        let sim = valve_hardware::SimulatedActuator::new(SIM_SWEEP);
        (
            Box::new(sim.drive_relay()),
            Box::new(sim.direction_relay()),
            Box::new(sim.current_sensor()),
        )
    };

    ValveBuilder::new()
        .with_drive_relay(drive)
        .with_direction_relay(direction)
        .with_current_sensor(sensor)
        .with_store(slot)
        .try_build()
        .wrap_err_with(|| format!("building valve {:?}", v.name.as_deref().unwrap_or("")))
}

fn build_bank(cfg: &Config, store: &FileStore) -> Result<CliBank> {
    let mut bank = ValveBank::new();
    for v in &cfg.valves {
        bank.push(build_valve(v, store)?)?;
    }
    Ok(bank)
}

fn print_status(valve: &CliValve) {
    let s = valve.status();
    let cfg = valve.config();
    let t = valve.travel_time();
    let tenths_pos = u16::from_be_bytes([t[0], t[1]]);
    let tenths_neg = u16::from_be_bytes([t[2], t[3]]);
    println!("state: {} (prev {})", s[0], s[1]);
    println!("position: {} deg", valve.current_degrees());
    println!("limits: {}..{} deg", cfg.travel_min, cfg.travel_max);
    println!(
        "travel times: {}.{} s positive, {}.{} s negative",
        tenths_pos / 10,
        tenths_pos % 10,
        tenths_neg / 10,
        tenths_neg % 10
    );
}

fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    let (cfg, defaulted) = load_config(&cli.config)?;
    init_logging(cli.log_level.as_deref(), &cfg)?;
    if defaulted {
        tracing::warn!(path = %cli.config.display(), "config file missing, using a single built-in valve");
    }
    cfg.validate()?;

    let store = FileStore::open(
        Path::new(&cfg.store.path),
        valve_config::MAX_VALVES,
        REGION_DATA_LEN,
    )
    .wrap_err_with(|| format!("opening store {}", cfg.store.path))?;
    let mut bank = build_bank(&cfg, &store)?;
    let poll = Duration::from_millis(cfg.tick.period_ms);

    if let Commands::FactoryReset = cli.cmd {
        let _restart = bank.factory_reset_all()?;
        println!("factory reset complete; restart the controller before further use");
        return Ok(());
    }

    let valve = bank
        .get_mut(cli.valve)
        .ok_or_else(|| eyre::eyre!("no valve configured at target {}", cli.valve))?;

    match cli.cmd {
        Commands::Status => print_status(valve),
        Commands::Calibrate { budget_secs } => {
            let budget = Duration::from_secs(budget_secs).max(valve.travel_budget());
            valve.calibrate();
            run_to_idle(valve, budget, poll).wrap_err("calibration did not complete")?;
            let cfg = valve.config();
            println!(
                "calibrated: {} ms positive, {} ms negative",
                cfg.travel_time_pos_us / 1000,
                cfg.travel_time_neg_us / 1000
            );
        }
        Commands::Move {
            degrees,
            budget_secs,
        } => {
            valve.move_to(degrees);
            let budget = Duration::from_secs(budget_secs).max(valve.travel_budget());
            run_to_idle(valve, budget, poll).wrap_err("movement did not complete")?;
            println!("position: {} deg", valve.current_degrees());
        }
        Commands::SetLimits { a, b } => {
            valve.configure_travel_limits(a, b)?;
            let min = i16::from_be_bytes(valve.degrees_get(TravelLimit::Min));
            let max = i16::from_be_bytes(valve.degrees_get(TravelLimit::Max));
            println!("limits: {min}..{max} deg");
        }
        Commands::SetTravelTimes {
            positive_ms,
            negative_ms,
        } => {
            valve.configure_travel_times(positive_ms * 1000, negative_ms * 1000)?;
            println!("travel times: {positive_ms} ms positive, {negative_ms} ms negative");
        }
        Commands::SetPosition { degrees } => {
            valve.configure_position(degrees)?;
            println!("position: {degrees} deg");
        }
        Commands::FactoryReset => unreachable!("handled above"),
    }
    Ok(())
}
