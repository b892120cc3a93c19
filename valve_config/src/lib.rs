#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema and validation for the valve controller.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - Validation enforces the control-loop timing contract: the tick period
//!   must stay strictly below the 100 ms debounce window used by the valve
//!   procedures, otherwise settle/debounce transitions can be missed.

use serde::Deserialize;

/// Upper bound on valve instances; the dispatcher addresses targets with a
/// 2-bit index.
pub const MAX_VALVES: usize = 4;

/// Debounce window baked into the valve procedures (ms). The tick period
/// must be strictly below this.
pub const DEBOUNCE_WINDOW_MS: u64 = 100;

/// One valve instance: relay outputs, sense input, and its store region.
#[derive(Debug, Deserialize, Clone)]
pub struct ValveCfg {
    /// Optional human-readable label, used only in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// GPIO pin switching the motor power relay.
    pub drive_pin: u8,
    /// GPIO pin switching the direction relay (energized = positive travel).
    pub direction_pin: u8,
    /// ADC channel monitoring motor current (0..=7 on an MCP3008).
    pub sense_channel: u8,
    /// Persistent store region index (0-based), one region per valve.
    pub region: u8,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StoreCfg {
    /// Backing file for the persistent byte store.
    pub path: String,
}

impl Default for StoreCfg {
    fn default() -> Self {
        Self {
            path: "valves.bin".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct TickCfg {
    /// Control-loop tick period in milliseconds.
    pub period_ms: u64,
}

impl Default for TickCfg {
    fn default() -> Self {
        Self { period_ms: 20 }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
}

#[derive(Debug, Deserialize)]
pub struct Config {
    /// Valve instances, at most [`MAX_VALVES`].
    #[serde(default, rename = "valve")]
    pub valves: Vec<ValveCfg>,
    #[serde(default)]
    pub store: StoreCfg,
    #[serde(default)]
    pub tick: TickCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        if self.valves.is_empty() {
            eyre::bail!("at least one [[valve]] entry is required");
        }
        if self.valves.len() > MAX_VALVES {
            eyre::bail!(
                "at most {} valves are addressable, got {}",
                MAX_VALVES,
                self.valves.len()
            );
        }

        for (i, v) in self.valves.iter().enumerate() {
            if v.drive_pin == v.direction_pin {
                eyre::bail!("valve {i}: drive_pin and direction_pin must differ");
            }
            if v.sense_channel > 7 {
                eyre::bail!("valve {i}: sense_channel must be in 0..=7");
            }
            if usize::from(v.region) >= MAX_VALVES {
                eyre::bail!("valve {i}: region must be in 0..{MAX_VALVES}");
            }
        }

        // Relay outputs are exclusive across all instances, not just
        // within one valve.
        for i in 1..self.valves.len() {
            for j in 0..i {
                let a = &self.valves[i];
                let b = &self.valves[j];
                for pin in [a.drive_pin, a.direction_pin] {
                    if pin == b.drive_pin || pin == b.direction_pin {
                        eyre::bail!("valves {j} and {i} share GPIO pin {pin}");
                    }
                }
            }
        }

        // Regions are exclusive per instance.
        for i in 1..self.valves.len() {
            for j in 0..i {
                if self.valves[i].region == self.valves[j].region {
                    eyre::bail!(
                        "valves {j} and {i} share store region {}",
                        self.valves[i].region
                    );
                }
            }
        }

        // Tick timing: slower than the debounce window means missed
        // settle/confirm transitions.
        if self.tick.period_ms == 0 {
            eyre::bail!("tick.period_ms must be >= 1");
        }
        if self.tick.period_ms >= DEBOUNCE_WINDOW_MS {
            eyre::bail!(
                "tick.period_ms must be < {DEBOUNCE_WINDOW_MS} (debounce window), got {}",
                self.tick.period_ms
            );
        }

        if self.store.path.is_empty() {
            eyre::bail!("store.path must not be empty");
        }

        Ok(())
    }
}
