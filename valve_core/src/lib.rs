#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
#![cfg_attr(not(test), deny(clippy::unwrap_used, clippy::expect_used))]
//! Core valve control logic (hardware-agnostic).
//!
//! This crate implements a timed controller for motorized valves with no
//! position feedback: the motor's current draw is the only observable, and
//! position is an estimate interpolated from calibrated full-range travel
//! times. All hardware interactions go through the `valve_traits::Relay`,
//! `valve_traits::CurrentSensor` and `valve_traits::ConfigStore` traits.
//!
//! ## Architecture
//!
//! - **Schedule**: delayed/timeout state-transition primitive (`schedule`)
//! - **States**: idle / calibrate / move tagged union with wire codes (`state`)
//! - **Sense**: current-draw classification against a quiescent benchmark (`sense`)
//! - **Controller**: the tick-driven valve state machine (`valve`)
//! - **Persistence**: fixed-layout per-valve config region (`persist`)
//! - **Bank**: up to four valves addressed by a 2-bit target (`registry`)
//!
//! ## Time
//!
//! Internals keep every delay, timeout and travel time in **microseconds**
//! (`u64`), measured against an epoch captured at construction.

pub mod builder;
pub mod error;
pub mod hw_error;
pub mod mocks;
pub mod persist;
pub mod registry;
pub mod runner;
pub mod schedule;
pub mod sense;
pub mod state;
pub mod valve;

pub use builder::ValveBuilder;
pub use error::{BuildError, Result, ValveError};
pub use persist::{ConfigSlot, ValveConfig, REGION_DATA_LEN};
pub use registry::{RestartRequired, ValveBank, MAX_VALVES};
pub use runner::run_to_idle;
pub use schedule::StateSchedule;
pub use sense::is_actively_driven;
pub use state::{CalibratePhase, CalibrateStep, Direction, MoveStep, ValveState};
pub use valve::{
    TravelLimit, Valve, MOVE_SEGMENTS, OVERTRAVEL_MARGIN_US, SETTLE_US, SPINUP_US,
};
