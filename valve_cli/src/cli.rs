//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "valve", version, about = "Valve controller CLI")]
pub struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE", default_value = "etc/valve_config.toml")]
    pub config: PathBuf,

    /// Console log level (error|warn|info|debug|trace); falls back to the
    /// config's logging.level, then "info"
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Valve to address (wire target, 0..=3)
    #[arg(long, value_name = "N", default_value_t = 0)]
    pub valve: u8,

    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print state, position estimate, limits and travel times
    Status,
    /// Run the full calibration sequence and wait for it to finish
    Calibrate {
        /// Completion budget in seconds
        #[arg(long, default_value_t = 120)]
        budget_secs: u64,
    },
    /// Move to a target position in degrees and wait for idle
    Move {
        /// Target degrees (clamped into the configured limits)
        #[arg(allow_negative_numbers = true)]
        degrees: i16,
        /// Completion budget in seconds
        #[arg(long, default_value_t = 120)]
        budget_secs: u64,
    },
    /// Set the travel limits (normalized so min <= max)
    SetLimits {
        #[arg(allow_negative_numbers = true)]
        a: i16,
        #[arg(allow_negative_numbers = true)]
        b: i16,
    },
    /// Set both travel times directly, in milliseconds, bypassing calibration
    SetTravelTimes { positive_ms: u64, negative_ms: u64 },
    /// Overwrite the position estimate without moving
    SetPosition {
        #[arg(allow_negative_numbers = true)]
        degrees: i16,
    },
    /// Wipe every valve's persisted region; a restart is required afterwards
    FactoryReset,
}
