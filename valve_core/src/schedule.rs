//! Delayed/timeout state-transition primitive.
//!
//! Both valve procedures are built on one mechanism: a state can request its
//! successor with a minimum delay ("wait before transitioning"), or arm a
//! fallback that fires if nothing else transitions within a window ("time
//! out if nothing transitions"). One `advance()` call per tick applies
//! whichever is due.

use crate::state::ValveState;

/// Per-valve transition bookkeeping. At most one pending transition and one
/// armed timeout exist at a time; committing a transition clears both.
#[derive(Debug, Clone)]
pub struct StateSchedule {
    current: ValveState,
    prev: ValveState,
    /// Next state to adopt; equal to `current` when nothing is pending.
    pending: ValveState,
    /// Minimum microseconds after the last switch before `pending` applies.
    pending_delay_us: u64,
    /// Fallback window in microseconds; 0 = disarmed.
    timeout_us: u64,
    fallback: ValveState,
    last_switch_us: u64,
}

impl StateSchedule {
    pub fn new(initial: ValveState) -> Self {
        Self {
            current: initial,
            prev: initial,
            pending: initial,
            pending_delay_us: 0,
            timeout_us: 0,
            fallback: initial,
            last_switch_us: 0,
        }
    }

    pub fn current(&self) -> ValveState {
        self.current
    }

    pub fn prev(&self) -> ValveState {
        self.prev
    }

    /// Microseconds-since-epoch of the last committed transition.
    pub fn last_switch_us(&self) -> u64 {
        self.last_switch_us
    }

    /// Request an immediate transition (effective on the next `advance`).
    pub fn request(&mut self, state: ValveState) {
        self.request_after(state, 0);
    }

    /// Request a transition effective no earlier than `delay_us` after the
    /// last committed switch. Overrides any previously pending request.
    pub fn request_after(&mut self, state: ValveState, delay_us: u64) {
        self.pending = state;
        self.pending_delay_us = delay_us;
    }

    /// Arm a fallback transition that fires if no explicit transition
    /// commits within `timeout_us` of the last switch. Re-arming with the
    /// same values each tick is idempotent.
    pub fn arm_timeout(&mut self, fallback: ValveState, timeout_us: u64) {
        self.fallback = fallback;
        self.timeout_us = timeout_us;
    }

    /// Advance the schedule. Returns false while a pending delay gates the
    /// tick; the caller must skip its per-tick body entirely in that case.
    /// Otherwise commits any due transition (explicit first, then timeout)
    /// and returns true so the body runs for the current state.
    pub fn advance(&mut self, now_us: u64) -> bool {
        let since = now_us.saturating_sub(self.last_switch_us);

        if self.pending_delay_us != 0 && since < self.pending_delay_us {
            return false;
        }
        self.pending_delay_us = 0;

        if self.pending != self.current {
            self.commit(self.pending, now_us);
        } else if self.timeout_us != 0 && since >= self.timeout_us {
            self.commit(self.fallback, now_us);
        }
        true
    }

    fn commit(&mut self, next: ValveState, now_us: u64) {
        self.prev = self.current;
        self.current = next;
        // Keep pending == current so a timeout fallback fires exactly once.
        self.pending = next;
        self.pending_delay_us = 0;
        self.timeout_us = 0;
        self.last_switch_us = now_us;
        tracing::trace!(state = self.current.code(), prev = self.prev.code(), "state switch");
    }
}
