//! The valve controller proper: one motorized valve, two relays, one
//! current-sense channel, one persistent config region.
//!
//! All behavior runs inside `tick()`. A tick first advances the transition
//! schedule; if a pending delay gates the tick, nothing else happens. Command
//! methods (`calibrate`, `move_to`, the configure writers) only set targets
//! and request states; the next tick does the work. A new command silently
//! overrides whatever procedure was in progress.

use std::sync::Arc;
use std::time::{Duration, Instant};

use eyre::WrapErr;
use valve_traits::{Clock, ConfigStore, CurrentSensor, Relay};

use crate::error::Result;
use crate::hw_error::map_hw_error;
use crate::persist::{ConfigSlot, ValveConfig};
use crate::schedule::StateSchedule;
use crate::sense::is_actively_driven;
use crate::state::{CalibratePhase, CalibrateStep, Direction, MoveStep, ValveState};

/// Settle window after de-energizing, and the stall-detect debounce window.
pub const SETTLE_US: u64 = 100_000;
/// Fixed run time of each position-clearing pass in the calibration preamble.
pub const CLEAR_DRIVE_US: u64 = 1_000_000;
/// Spin-up grace after energizing; current is not classified during it.
pub const SPINUP_US: u64 = 1_000_000;
/// Extra drive time added when the target is a configured limit.
pub const OVERTRAVEL_MARGIN_US: u64 = 2_000_000;
/// Number of timed movement sub-segments.
pub const MOVE_SEGMENTS: u8 = 6;

/// Shrinking-fraction divisors applied to the remaining delta by segments
/// 1..=6: 1/6, then 1/5 of what is left, and so on down to 1/2. The walk
/// leaves a small residual that the `Done` snap removes.
const SEGMENT_DIVISORS: [i32; MOVE_SEGMENTS as usize] = [6, 5, 4, 3, 3, 2];

/// Which travel limit a `degrees_get` call asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TravelLimit {
    Min = 0,
    Max = 1,
}

impl TravelLimit {
    /// Decode the raw wire argument (0 = min, anything else = max).
    pub fn from_index(idx: u8) -> Self {
        if idx == 0 { TravelLimit::Min } else { TravelLimit::Max }
    }
}

fn hw(e: Box<dyn std::error::Error + Send + Sync>) -> eyre::Report {
    eyre::Report::new(map_hw_error(&*e))
}

/// Scheduled drive duration for a move, in microseconds.
///
/// Pure linear interpolation of the calibrated full-range sweep time,
/// multiply before divide so the concrete cases come out exact, plus the
/// overtravel margin when the target sits on a configured limit.
fn drive_duration_us(travel_us: u64, min: i16, max: i16, from: i16, to: i16) -> u64 {
    let range = (i64::from(max) - i64::from(min)).max(1) as u64;
    let delta = (i64::from(to) - i64::from(from)).unsigned_abs();
    let mut duration = travel_us.saturating_mul(delta) / range;
    if to == min || to == max {
        duration = duration.saturating_add(OVERTRAVEL_MARGIN_US);
    }
    duration
}

pub struct Valve<D, R, C, P>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    drive: D,
    direction: R,
    sensor: C,
    slot: ConfigSlot<P>,
    cfg: ValveConfig,
    current_deg: i16,
    target_deg: i16,
    /// Quiescent current benchmark, re-sampled de-energized each phase.
    benchmark: i32,
    /// Tick timestamp at which the current timed seek was energized.
    seek_started_us: u64,
    /// Length of one movement sub-segment for the move in progress.
    segment_us: u64,
    sched: StateSchedule,
    clock: Arc<dyn Clock + Send + Sync>,
    epoch: Instant,
}

impl<D, R, C, P> Valve<D, R, C, P>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    /// Assemble a valve from its parts, load or default the persisted
    /// config, and bring both relays to a known de-energized state.
    pub(crate) fn from_parts(
        drive: D,
        direction: R,
        sensor: C,
        store: P,
        clock: Arc<dyn Clock + Send + Sync>,
    ) -> Result<Self> {
        let mut slot = ConfigSlot::new(store);
        let cfg = slot.load_or_default()?;
        let epoch = clock.now();
        let mut valve = Self {
            drive,
            direction,
            sensor,
            slot,
            current_deg: cfg.last_position,
            target_deg: cfg.last_position,
            cfg,
            benchmark: 0,
            seek_started_us: 0,
            segment_us: 0,
            sched: StateSchedule::new(ValveState::Inactive),
            clock,
            epoch,
        };
        valve.drive.release().map_err(hw).wrap_err("drive relay")?;
        valve
            .direction
            .release()
            .map_err(hw)
            .wrap_err("direction relay")?;
        Ok(valve)
    }

    // ---- periodic tick -------------------------------------------------

    /// Advance the controller by one tick. Cheap no-op while a pending
    /// transition delay is running or the valve is idle.
    pub fn tick(&mut self) -> Result<()> {
        let now = self.clock.us_since(self.epoch);
        if !self.sched.advance(now) {
            return Ok(());
        }
        match self.sched.current() {
            ValveState::Inactive => Ok(()),
            ValveState::Calibrate(step) => self.calibrate_tick(step, now),
            ValveState::Move(step) => self.move_tick(step, now),
        }
    }

    fn calibrate_tick(&mut self, step: CalibrateStep, now: u64) -> Result<()> {
        match step {
            CalibrateStep::Start => {
                tracing::info!("calibration started");
                self.set_drive(false)?;
                self.sched
                    .request_after(ValveState::Calibrate(CalibrateStep::ClearNegative), SETTLE_US);
            }
            CalibrateStep::ClearNegative => {
                self.set_direction(Direction::Negative)?;
                self.set_drive(true)?;
                self.sched.request_after(
                    ValveState::Calibrate(CalibrateStep::ClearPositive),
                    CLEAR_DRIVE_US,
                );
            }
            CalibrateStep::ClearPositive => {
                self.set_direction(Direction::Positive)?;
                self.set_drive(true)?;
                self.sched.request_after(
                    ValveState::Calibrate(CalibrateStep::StartSettle),
                    CLEAR_DRIVE_US,
                );
            }
            CalibrateStep::StartSettle => {
                self.set_drive(false)?;
                self.sched.request_after(
                    ValveState::Calibrate(CalibrateStep::Benchmark(CalibratePhase::InitialLow)),
                    SETTLE_US,
                );
            }
            CalibrateStep::Benchmark(phase) => {
                self.benchmark = self.read_current()?;
                tracing::debug!(benchmark = self.benchmark, ?phase, "quiescent benchmark");
                let initiate = ValveState::Calibrate(CalibrateStep::Initiate(phase));
                // The final return pass gets an extra settle because it is
                // benchmarked right after the previous pass de-energized.
                if phase == CalibratePhase::TimedLow {
                    self.sched.request_after(initiate, SETTLE_US);
                } else {
                    self.sched.request(initiate);
                }
            }
            CalibrateStep::Initiate(phase) => {
                if phase.timed() {
                    self.seek_started_us = now;
                }
                self.set_direction(phase.direction())?;
                self.set_drive(true)?;
                self.sched
                    .request_after(ValveState::Calibrate(CalibrateStep::Seeking(phase)), SPINUP_US);
            }
            CalibrateStep::Seeking(phase) => {
                let sample = self.read_current()?;
                if !is_actively_driven(sample, self.benchmark) {
                    self.sched
                        .request(ValveState::Calibrate(CalibrateStep::Settling(phase)));
                }
            }
            CalibrateStep::Settling(phase) => {
                // Quiescence must hold for the whole debounce window; any
                // driven sample bounces back to seeking, otherwise the
                // timeout commits the limit.
                self.sched
                    .arm_timeout(ValveState::Calibrate(CalibrateStep::Limit(phase)), SETTLE_US);
                let sample = self.read_current()?;
                if is_actively_driven(sample, self.benchmark) {
                    self.sched
                        .request(ValveState::Calibrate(CalibrateStep::Seeking(phase)));
                }
            }
            CalibrateStep::Limit(phase) => {
                self.set_drive(false)?;
                match phase {
                    CalibratePhase::InitialLow => {
                        self.sched.request_after(
                            ValveState::Calibrate(CalibrateStep::Benchmark(
                                CalibratePhase::TimedHigh,
                            )),
                            SETTLE_US,
                        );
                    }
                    CalibratePhase::TimedHigh => {
                        self.cfg.travel_time_pos_us = now.saturating_sub(self.seek_started_us);
                        self.current_deg = self.cfg.travel_max;
                        self.slot.write_travel_time_pos(self.cfg.travel_time_pos_us)?;
                        self.sched.request(ValveState::Calibrate(
                            CalibrateStep::Benchmark(CalibratePhase::TimedLow),
                        ));
                    }
                    CalibratePhase::TimedLow => {
                        self.cfg.travel_time_neg_us = now.saturating_sub(self.seek_started_us);
                        self.current_deg = self.cfg.travel_min;
                        self.target_deg = self.cfg.travel_min;
                        self.cfg.last_position = self.cfg.travel_min;
                        self.slot.write_travel_time_neg(self.cfg.travel_time_neg_us)?;
                        self.slot.write_position(self.cfg.last_position)?;
                        tracing::info!(
                            travel_time_pos_us = self.cfg.travel_time_pos_us,
                            travel_time_neg_us = self.cfg.travel_time_neg_us,
                            "calibration complete"
                        );
                        self.sched.request(ValveState::Inactive);
                    }
                }
            }
        }
        Ok(())
    }

    fn move_tick(&mut self, step: MoveStep, _now: u64) -> Result<()> {
        match step {
            MoveStep::Target => {
                if self.current_deg == self.target_deg {
                    self.sched.request(ValveState::Inactive);
                    return Ok(());
                }
                let dir = if self.target_deg > self.current_deg {
                    Direction::Positive
                } else {
                    Direction::Negative
                };
                let travel_us = match dir {
                    Direction::Positive => self.cfg.travel_time_pos_us,
                    Direction::Negative => self.cfg.travel_time_neg_us,
                };
                let duration = drive_duration_us(
                    travel_us,
                    self.cfg.travel_min,
                    self.cfg.travel_max,
                    self.current_deg,
                    self.target_deg,
                );
                self.segment_us = duration / u64::from(MOVE_SEGMENTS);
                tracing::debug!(
                    from = self.current_deg,
                    to = self.target_deg,
                    ?dir,
                    duration_us = duration,
                    "movement scheduled"
                );
                self.set_direction(dir)?;
                self.set_drive(true)?;
                self.sched
                    .request_after(ValveState::Move(MoveStep::Segment(1)), self.segment_us);
            }
            MoveStep::Segment(n) => {
                let idx = usize::from(n.clamp(1, MOVE_SEGMENTS)) - 1;
                let remaining = i32::from(self.target_deg) - i32::from(self.current_deg);
                let step_deg = remaining / SEGMENT_DIVISORS[idx];
                let updated = i32::from(self.current_deg) + step_deg;
                self.current_deg = i16::try_from(updated).unwrap_or(self.target_deg);
                self.cfg.last_position = self.current_deg;
                self.slot.write_position(self.current_deg)?;
                if n < MOVE_SEGMENTS {
                    self.sched
                        .request_after(ValveState::Move(MoveStep::Segment(n + 1)), self.segment_us);
                } else {
                    self.sched.request(ValveState::Move(MoveStep::Done));
                }
            }
            MoveStep::Done => {
                // Snap exactly onto the target, dropping accumulated
                // integer-division error from the sub-segment estimates.
                self.current_deg = self.target_deg;
                self.cfg.last_position = self.target_deg;
                self.slot.write_position(self.target_deg)?;
                self.set_drive(false)?;
                tracing::debug!(position = self.current_deg, "movement complete");
                self.sched.request(ValveState::Inactive);
            }
        }
        Ok(())
    }

    // ---- commands ------------------------------------------------------

    /// Begin the calibration sequence. Overrides any procedure in progress.
    pub fn calibrate(&mut self) {
        self.sched.request(ValveState::Calibrate(CalibrateStep::Start));
    }

    /// Begin moving to `target` degrees, clamped into the configured travel
    /// limits. Overrides any procedure in progress.
    pub fn move_to(&mut self, target: i16) {
        self.target_deg = target.clamp(self.cfg.travel_min, self.cfg.travel_max);
        self.sched.request(ValveState::Move(MoveStep::Target));
    }

    /// De-energize the drive and drop to idle immediately.
    pub fn halt(&mut self) -> Result<()> {
        self.set_drive(false)?;
        self.sched.request(ValveState::Inactive);
        Ok(())
    }

    // ---- wire-facing accessors and config writers ----------------------

    /// Status report: current state code, previous state code, and the
    /// current position estimate big-endian.
    pub fn status(&self) -> [u8; 4] {
        let pos = self.current_deg.to_be_bytes();
        [
            self.sched.current().code(),
            self.sched.prev().code(),
            pos[0],
            pos[1],
        ]
    }

    /// One travel limit, big-endian degrees.
    pub fn degrees_get(&self, which: TravelLimit) -> [u8; 2] {
        match which {
            TravelLimit::Min => self.cfg.travel_min.to_be_bytes(),
            TravelLimit::Max => self.cfg.travel_max.to_be_bytes(),
        }
    }

    /// Both calibrated travel times in tenths of a second, truncated,
    /// big-endian u16 each (positive first).
    pub fn travel_time(&self) -> [u8; 4] {
        let tenths = |us: u64| -> [u8; 2] {
            let t = (us / 100_000).min(u64::from(u16::MAX)) as u16;
            t.to_be_bytes()
        };
        let pos = tenths(self.cfg.travel_time_pos_us);
        let neg = tenths(self.cfg.travel_time_neg_us);
        [pos[0], pos[1], neg[0], neg[1]]
    }

    /// Set and persist the travel limits, normalizing so min <= max.
    pub fn configure_travel_limits(&mut self, a: i16, b: i16) -> Result<()> {
        let (min, max) = if a <= b { (a, b) } else { (b, a) };
        self.cfg.travel_min = min;
        self.cfg.travel_max = max;
        self.slot.write_limits(min, max)
    }

    /// Set and persist both travel times directly, bypassing calibration.
    pub fn configure_travel_times(&mut self, pos_us: u64, neg_us: u64) -> Result<()> {
        self.cfg.travel_time_pos_us = pos_us;
        self.cfg.travel_time_neg_us = neg_us;
        self.slot.write_travel_time_pos(pos_us)?;
        self.slot.write_travel_time_neg(neg_us)
    }

    /// Overwrite and persist the position estimate without moving.
    pub fn configure_position(&mut self, deg: i16) -> Result<()> {
        self.current_deg = deg;
        self.target_deg = deg;
        self.cfg.last_position = deg;
        self.slot.write_position(deg)
    }

    /// Drop the persisted region back to never-configured and reload the
    /// in-memory config from defaults. The caller owns restarting the
    /// system; this valve keeps running on defaults until then.
    pub fn factory_reset(&mut self) -> Result<()> {
        self.slot.factory_reset()?;
        self.cfg = ValveConfig::default();
        self.current_deg = self.cfg.last_position;
        self.target_deg = self.cfg.last_position;
        self.sched.request(ValveState::Inactive);
        Ok(())
    }

    pub fn state(&self) -> ValveState {
        self.sched.current()
    }

    pub fn prev_state(&self) -> ValveState {
        self.sched.prev()
    }

    pub fn is_idle(&self) -> bool {
        self.sched.current() == ValveState::Inactive
    }

    pub fn current_degrees(&self) -> i16 {
        self.current_deg
    }

    pub fn target_degrees(&self) -> i16 {
        self.target_deg
    }

    pub fn config(&self) -> &ValveConfig {
        &self.cfg
    }

    /// Worst-case completion budget for either procedure: twice the summed
    /// calibrated travel times. Callers floor this when uncalibrated.
    pub fn travel_budget(&self) -> Duration {
        let us = self
            .cfg
            .travel_time_pos_us
            .saturating_add(self.cfg.travel_time_neg_us)
            .saturating_mul(2);
        Duration::from_micros(us)
    }

    pub fn clock(&self) -> Arc<dyn Clock + Send + Sync> {
        Arc::clone(&self.clock)
    }

    // ---- hardware helpers ----------------------------------------------

    fn set_drive(&mut self, on: bool) -> Result<()> {
        self.drive.set(on).map_err(hw).wrap_err("drive relay")
    }

    fn set_direction(&mut self, dir: Direction) -> Result<()> {
        self.direction
            .set(dir == Direction::Positive)
            .map_err(hw)
            .wrap_err("direction relay")
    }

    fn read_current(&mut self) -> Result<i32> {
        self.sensor.sample().map_err(hw).wrap_err("current sample")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_is_linear_in_distance() {
        // 5 s full sweep over 180 deg; 90 deg is exactly half.
        assert_eq!(drive_duration_us(5_000_000, 0, 180, 0, 90), 2_500_000);
        assert_eq!(drive_duration_us(5_000_000, 0, 180, 90, 135), 1_250_000);
    }

    #[test]
    fn limit_targets_get_the_overtravel_margin() {
        let plain = drive_duration_us(5_000_000, 0, 180, 90, 135);
        let to_max = drive_duration_us(5_000_000, 0, 180, 135, 180);
        // Same 45-degree distance, but only the limit target gets the margin.
        assert_eq!(to_max, plain + OVERTRAVEL_MARGIN_US);
        let to_min = drive_duration_us(5_000_000, 0, 180, 45, 0);
        assert_eq!(to_min, plain + OVERTRAVEL_MARGIN_US);
    }

    #[test]
    fn degenerate_range_does_not_divide_by_zero() {
        assert_eq!(drive_duration_us(5_000_000, 90, 90, 90, 90), OVERTRAVEL_MARGIN_US);
    }

    #[test]
    fn segment_divisors_leave_a_residual_for_the_final_snap() {
        // Applying 1/6, 1/5, 1/4, 1/3, 1/3, 1/2 of the remainder in order
        // never consumes the whole delta; the Done step snaps the rest.
        let mut current = 0i32;
        let target = 60i32;
        for div in SEGMENT_DIVISORS {
            current += (target - current) / div;
        }
        assert_eq!(current, 53);
        let residual = target - current;
        assert!(residual > 0 && residual <= target / 8);
    }

    #[test]
    fn travel_limit_decodes_from_wire_index() {
        assert_eq!(TravelLimit::from_index(0), TravelLimit::Min);
        assert_eq!(TravelLimit::from_index(1), TravelLimit::Max);
        assert_eq!(TravelLimit::from_index(3), TravelLimit::Max);
    }
}
