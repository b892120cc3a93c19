//! End-to-end calibration runs against a modeled actuator.
//!
//! The model is the minimum physics the controller can observe: position
//! integrates while the drive relay is energized, and the current sample is
//! elevated only while the motor is actually moving (a motor stalled against
//! a mechanical stop draws quiescent current again).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::Duration;

use valve_core::ValveBuilder;
use valve_core::mocks::{ManualClock, MockRelay, RecordingStore, ScriptedSensor};
use valve_core::valve::Valve;

const QUIESCENT: i32 = 400;
const DRIVEN: i32 = 800;
const TICK: Duration = Duration::from_millis(10);
/// Full-range sweep time of the modeled actuator.
const SWEEP: Duration = Duration::from_secs(2);

struct Rig {
    valve: Valve<MockRelay, MockRelay, ScriptedSensor, RecordingStore>,
    clock: ManualClock,
    drive_on: Rc<RefCell<bool>>,
    dir_positive: Rc<RefCell<bool>>,
    feed: Rc<RefCell<VecDeque<i32>>>,
    log: Rc<RefCell<Vec<(usize, Vec<u8>)>>>,
    /// Modeled valve position, 0.0 at the low stop, 1.0 at the high stop.
    position: f64,
}

impl Rig {
    fn new(position: f64) -> Self {
        let clock = ManualClock::new();
        let drive = MockRelay::new();
        let direction = MockRelay::new();
        let sensor = ScriptedSensor::new(QUIESCENT);
        let store = RecordingStore::new();
        let drive_on = drive.probe();
        let dir_positive = direction.probe();
        let feed = sensor.feed();
        let log = store.write_log();
        let valve = ValveBuilder::new()
            .with_drive_relay(drive)
            .with_direction_relay(direction)
            .with_current_sensor(sensor)
            .with_store(store)
            .with_clock(Arc::new(clock.clone()))
            .try_build()
            .expect("build");
        Self {
            valve,
            clock,
            drive_on,
            dir_positive,
            feed,
            log,
            position,
        }
    }

    /// One model step followed by one controller tick.
    fn step(&mut self) {
        if *self.drive_on.borrow() {
            let dir = if *self.dir_positive.borrow() { 1.0 } else { -1.0 };
            let fraction = TICK.as_secs_f64() / SWEEP.as_secs_f64();
            self.position = (self.position + dir * fraction).clamp(0.0, 1.0);
        }
        let at_stop = (self.position <= 0.0 && !*self.dir_positive.borrow())
            || (self.position >= 1.0 && *self.dir_positive.borrow());
        let sample = if *self.drive_on.borrow() && !at_stop {
            DRIVEN
        } else {
            QUIESCENT
        };
        let mut feed = self.feed.borrow_mut();
        feed.clear();
        feed.push_back(sample);
        drop(feed);

        self.valve.tick().expect("tick");
        self.clock.advance(TICK);
    }

    /// Tick until idle, panicking if `max_ticks` is exceeded.
    fn run_until_idle(&mut self, max_ticks: u32) {
        for _ in 0..max_ticks {
            self.step();
            if self.valve.is_idle() {
                return;
            }
        }
        panic!(
            "valve still busy after {max_ticks} ticks, state code {}",
            self.valve.status()[0]
        );
    }
}

#[test]
fn calibration_terminates_idle_with_timed_sweeps_persisted() {
    let mut rig = Rig::new(0.5);
    rig.valve.calibrate();
    rig.run_until_idle(10_000);

    let cfg = *rig.valve.config();
    assert!(cfg.travel_time_pos_us > 0);
    assert!(cfg.travel_time_neg_us > 0);
    assert_eq!(rig.valve.current_degrees(), cfg.travel_min);
    assert_eq!(cfg.last_position, cfg.travel_min);

    // The modeled sweep takes 2 s; the recorded time also contains spin-up
    // and the stall debounce, so it lands a little above.
    assert!(cfg.travel_time_pos_us >= 2_000_000);
    assert!(cfg.travel_time_pos_us < 3_500_000);
    assert!(cfg.travel_time_neg_us >= 2_000_000);
    assert!(cfg.travel_time_neg_us < 3_500_000);

    // Both travel times and the final position reached the store.
    let log = rig.log.borrow();
    assert!(log.iter().any(|(off, _)| *off == 4), "positive time persisted");
    assert!(log.iter().any(|(off, _)| *off == 12), "negative time persisted");
    let last_pos = log
        .iter()
        .rev()
        .find(|(off, _)| *off == 20)
        .map(|(_, bytes)| bytes.clone())
        .expect("position persisted");
    assert_eq!(last_pos, cfg.travel_min.to_be_bytes().to_vec());
}

#[test]
fn calibration_from_the_low_stop_still_terminates() {
    let mut rig = Rig::new(0.0);
    rig.valve.calibrate();
    rig.run_until_idle(10_000);
    assert!(rig.valve.config().travel_time_pos_us > 0);
    assert!(rig.valve.config().travel_time_neg_us > 0);
}

#[test]
fn a_driven_spike_during_settling_bounces_back_to_seeking() {
    let mut rig = Rig::new(0.5);
    rig.valve.calibrate();

    // Walk the model until the first stall debounce window opens
    // (Settling on the initial low pass, code 104).
    for _ in 0..10_000 {
        rig.step();
        if rig.valve.status()[0] == 104 {
            break;
        }
    }
    assert_eq!(rig.valve.status()[0], 104);

    // One driven sample inside the confirm window. The limit must not
    // commit; the machine falls back to seeking instead.
    {
        let mut feed = rig.feed.borrow_mut();
        feed.clear();
        feed.push_back(DRIVEN);
    }
    rig.valve.tick().expect("tick");
    rig.clock.advance(TICK);
    rig.step();
    assert_eq!(rig.valve.status()[0], 103, "back to seeking after the spike");

    // From re-entering the window, the limit commits only after a clean
    // 100 ms of quiescence (10 ticks at the 10 ms model step).
    let mut ticks_to_limit = 0u32;
    while rig.valve.status()[0] != 105 {
        rig.step();
        ticks_to_limit += 1;
        assert!(ticks_to_limit < 1_000, "limit never committed");
    }
    assert!(ticks_to_limit >= 10, "debounce window shorter than 100 ms");

    // The run still completes normally afterwards.
    rig.run_until_idle(10_000);
    assert!(rig.valve.config().travel_time_pos_us > 0);
    assert!(rig.valve.config().travel_time_neg_us > 0);
}

#[test]
fn calibrate_overrides_a_movement_in_progress() {
    let mut rig = Rig::new(0.5);
    rig.valve
        .configure_travel_times(2_000_000, 2_000_000)
        .expect("times");
    rig.valve.move_to(170);
    for _ in 0..20 {
        rig.step();
    }
    assert!(!rig.valve.is_idle());

    // No rollback, no completion: calibration simply takes over.
    rig.valve.calibrate();
    rig.run_until_idle(10_000);
    assert_eq!(rig.valve.current_degrees(), rig.valve.config().travel_min);
}

#[test]
fn aborting_mid_calibration_keeps_previous_persisted_values() {
    let mut rig = Rig::new(0.5);
    rig.valve
        .configure_travel_times(7_000_000, 7_000_000)
        .expect("times");
    let writes_before = rig.log.borrow().len();

    rig.valve.calibrate();
    // Stop during the preamble, before any phase completes.
    for _ in 0..50 {
        rig.step();
    }
    rig.valve.halt().expect("halt");
    rig.step();

    assert!(rig.valve.is_idle());
    assert_eq!(rig.log.borrow().len(), writes_before);
    assert_eq!(rig.valve.config().travel_time_pos_us, 7_000_000);
}
