//! Cooperative tick loop: drives one valve until it settles back to idle.
//!
//! Embedded deployments call `Valve::tick()` from their own scheduler; this
//! runner is the hosted equivalent, used by the CLI and by tests.

use std::time::Duration;

use valve_traits::{ConfigStore, CurrentSensor, Relay};

use crate::error::{Result, ValveError};
use crate::valve::Valve;

/// Tick `valve` every `poll` until it reaches idle, or until `budget`
/// elapses, in which case the drive is de-energized and `Timeout` returned.
/// Any hard tick error also de-energizes before propagating.
pub fn run_to_idle<D, R, C, P>(
    valve: &mut Valve<D, R, C, P>,
    budget: Duration,
    poll: Duration,
) -> Result<()>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    let clock = valve.clock();
    let start = clock.now();
    loop {
        if let Err(e) = valve.tick() {
            if let Err(halt_err) = valve.halt() {
                tracing::error!(error = %halt_err, "halt after tick failure also failed");
            }
            return Err(e);
        }
        if valve.is_idle() {
            return Ok(());
        }
        if clock.now().saturating_duration_since(start) > budget {
            valve.halt()?;
            return Err(ValveError::Timeout.into());
        }
        clock.sleep(poll);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::ValveBuilder;
    use crate::mocks::{ManualClock, MockRelay, RecordingStore, ScriptedSensor};
    use std::sync::Arc;

    fn manual_valve(
        clock: ManualClock,
    ) -> crate::valve::Valve<MockRelay, MockRelay, ScriptedSensor, RecordingStore> {
        ValveBuilder::new()
            .with_drive_relay(MockRelay::new())
            .with_direction_relay(MockRelay::new())
            .with_current_sensor(ScriptedSensor::new(400))
            .with_store(RecordingStore::new())
            .with_clock(Arc::new(clock))
            .try_build()
            .expect("build")
    }

    #[test]
    fn completes_a_move_within_budget() {
        let mut valve = manual_valve(ManualClock::new());
        valve
            .configure_travel_times(600_000, 600_000)
            .expect("times");
        valve.move_to(90);
        run_to_idle(
            &mut valve,
            Duration::from_secs(5),
            Duration::from_millis(10),
        )
        .expect("run");
        assert_eq!(valve.current_degrees(), 90);
        assert!(valve.is_idle());
    }

    #[test]
    fn budget_overrun_halts_and_reports_timeout() {
        let mut valve = manual_valve(ManualClock::new());
        // An hour of scheduled travel against a 50 ms budget.
        valve
            .configure_travel_times(3_600_000_000, 3_600_000_000)
            .expect("times");
        valve.move_to(180);
        let err = run_to_idle(
            &mut valve,
            Duration::from_millis(50),
            Duration::from_millis(10),
        )
        .expect_err("must time out");
        assert!(matches!(
            err.downcast_ref::<ValveError>(),
            Some(ValveError::Timeout)
        ));
        // Halt requested idle; the next tick commits it.
        valve.tick().expect("tick");
        assert!(valve.is_idle());
    }
}
