//! Valve state space.
//!
//! The controller runs three mutually exclusive regimes (idle, calibrating,
//! moving), modeled as one tagged union so the schedule primitive can hold a
//! single current/pending/fallback state. Each state also has a stable wire
//! code reported by `status()`; the numbering matches the register map
//! hosts already speak, so existing integrations keep working.

/// Travel direction. Positive travel is defined as the direction relay
/// energized and moves toward the upper degree limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Positive,
    Negative,
}

/// The three seek-to-limit passes of a calibration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibratePhase {
    /// Drive to the low stop to establish a known start point (untimed).
    InitialLow,
    /// Drive to the high stop, timing the sweep (`travelTimePositive`).
    TimedHigh,
    /// Return to the low stop, timing the sweep (`travelTimeNegative`).
    TimedLow,
}

impl CalibratePhase {
    /// Seek direction for this pass.
    pub fn direction(self) -> Direction {
        match self {
            CalibratePhase::InitialLow | CalibratePhase::TimedLow => Direction::Negative,
            CalibratePhase::TimedHigh => Direction::Positive,
        }
    }

    /// Whether the sweep duration is recorded as a travel time.
    pub fn timed(self) -> bool {
        !matches!(self, CalibratePhase::InitialLow)
    }

    fn code_base(self) -> u8 {
        match self {
            CalibratePhase::InitialLow => 101,
            CalibratePhase::TimedHigh => 106,
            CalibratePhase::TimedLow => 111,
        }
    }
}

/// Calibration sub-states: a 4-step settle/clear preamble, then per phase a
/// benchmark, a drive start, and the stall-detect debounce pair ending at
/// the limit state (19 states total).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrateStep {
    /// De-energize and let the drive settle.
    Start,
    /// Run negative for a fixed interval to leave any ambiguous mid-position.
    ClearNegative,
    /// Run positive for a fixed interval.
    ClearPositive,
    /// De-energize again before benchmarking.
    StartSettle,
    /// Sample quiescent current with outputs off.
    Benchmark(CalibratePhase),
    /// Energize toward the phase's stop; spin-up grace follows.
    Initiate(CalibratePhase),
    /// Wait for current to fall back to quiescent (valve stalled at a stop).
    Seeking(CalibratePhase),
    /// Debounce: confirm quiescence holds for the debounce window.
    Settling(CalibratePhase),
    /// Stop reached; record results and advance the phase.
    Limit(CalibratePhase),
}

/// Movement sub-states: setup, six timed sub-segments, exact finish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveStep {
    /// Compute direction and drive duration, energize.
    Target,
    /// Timed sub-segment `1..=6`; each updates and persists the position
    /// estimate when its share of the drive time has elapsed.
    Segment(u8),
    /// Snap the estimate to the target, persist, de-energize.
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValveState {
    Inactive,
    Calibrate(CalibrateStep),
    Move(MoveStep),
}

/// Wire code 1 is reserved: earlier firmware revisions declared a
/// never-reached seek-failure state there, and keeping the gap leaves the
/// remaining codes stable.
pub const RESERVED_SEEK_FAIL_CODE: u8 = 1;

impl ValveState {
    /// Raw code reported in the first two `status()` octets.
    pub fn code(self) -> u8 {
        match self {
            ValveState::Inactive => 0,
            ValveState::Calibrate(step) => match step {
                CalibrateStep::Start => 100,
                CalibrateStep::ClearNegative => 120,
                CalibrateStep::ClearPositive => 121,
                CalibrateStep::StartSettle => 122,
                CalibrateStep::Benchmark(p) => p.code_base(),
                CalibrateStep::Initiate(p) => p.code_base() + 1,
                CalibrateStep::Seeking(p) => p.code_base() + 2,
                CalibrateStep::Settling(p) => p.code_base() + 3,
                CalibrateStep::Limit(p) => p.code_base() + 4,
            },
            ValveState::Move(step) => match step {
                MoveStep::Target => 210,
                MoveStep::Segment(n) => 210 + n,
                MoveStep::Done => 217,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_unique_across_the_state_space() {
        let phases = [
            CalibratePhase::InitialLow,
            CalibratePhase::TimedHigh,
            CalibratePhase::TimedLow,
        ];
        let mut states = vec![
            ValveState::Inactive,
            ValveState::Calibrate(CalibrateStep::Start),
            ValveState::Calibrate(CalibrateStep::ClearNegative),
            ValveState::Calibrate(CalibrateStep::ClearPositive),
            ValveState::Calibrate(CalibrateStep::StartSettle),
            ValveState::Move(MoveStep::Target),
            ValveState::Move(MoveStep::Done),
        ];
        for p in phases {
            states.push(ValveState::Calibrate(CalibrateStep::Benchmark(p)));
            states.push(ValveState::Calibrate(CalibrateStep::Initiate(p)));
            states.push(ValveState::Calibrate(CalibrateStep::Seeking(p)));
            states.push(ValveState::Calibrate(CalibrateStep::Settling(p)));
            states.push(ValveState::Calibrate(CalibrateStep::Limit(p)));
        }
        for n in 1..=6 {
            states.push(ValveState::Move(MoveStep::Segment(n)));
        }

        // 19 calibration states plus idle and 8 movement states.
        assert_eq!(states.len(), 28);
        let mut codes: Vec<u8> = states.iter().map(|s| s.code()).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), 28);
        assert!(!codes.contains(&RESERVED_SEEK_FAIL_CODE));
    }

    #[test]
    fn calibration_codes_match_the_published_register_map() {
        assert_eq!(ValveState::Calibrate(CalibrateStep::Start).code(), 100);
        assert_eq!(
            ValveState::Calibrate(CalibrateStep::Benchmark(CalibratePhase::InitialLow)).code(),
            101
        );
        assert_eq!(
            ValveState::Calibrate(CalibrateStep::Limit(CalibratePhase::TimedLow)).code(),
            115
        );
        assert_eq!(ValveState::Move(MoveStep::Target).code(), 210);
    }

    #[test]
    fn phase_directions_follow_the_seek_order() {
        assert_eq!(CalibratePhase::InitialLow.direction(), Direction::Negative);
        assert_eq!(CalibratePhase::TimedHigh.direction(), Direction::Positive);
        assert_eq!(CalibratePhase::TimedLow.direction(), Direction::Negative);
        assert!(!CalibratePhase::InitialLow.timed());
        assert!(CalibratePhase::TimedHigh.timed());
    }
}
