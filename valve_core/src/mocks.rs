//! Test and helper mocks for valve_core.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use valve_traits::{Clock, ConfigStore, CurrentSensor, NEVER_CONFIGURED, Relay};

/// Deterministic clock whose time is advanced manually.
///
/// now() = origin + offset; sleep(d) advances internal time by d without
/// actually sleeping, so runner loops progress instantly in tests.
#[derive(Debug, Clone)]
pub struct ManualClock {
    origin: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance the clock by the given duration.
    pub fn advance(&self, d: Duration) {
        if let Ok(mut off) = self.offset.lock() {
            *off = off.saturating_add(d);
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let off = self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO);
        self.origin + off
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

/// Relay whose on/off state is observable from outside the valve via a
/// shared probe handle.
pub struct MockRelay {
    on: Rc<RefCell<bool>>,
}

impl Default for MockRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRelay {
    pub fn new() -> Self {
        Self {
            on: Rc::new(RefCell::new(false)),
        }
    }

    /// Handle that keeps reporting the relay state after the relay itself
    /// moves into a valve.
    pub fn probe(&self) -> Rc<RefCell<bool>> {
        Rc::clone(&self.on)
    }
}

impl Relay for MockRelay {
    fn energize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        *self.on.borrow_mut() = true;
        Ok(())
    }

    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        *self.on.borrow_mut() = false;
        Ok(())
    }
}

/// Current sensor fed from a script; repeats the last sample when the
/// script runs out, and the script can be refilled through a shared handle.
pub struct ScriptedSensor {
    script: Rc<RefCell<VecDeque<i32>>>,
    last: i32,
}

impl ScriptedSensor {
    pub fn new(initial: i32) -> Self {
        Self {
            script: Rc::new(RefCell::new(VecDeque::new())),
            last: initial,
        }
    }

    pub fn feed(&self) -> Rc<RefCell<VecDeque<i32>>> {
        Rc::clone(&self.script)
    }
}

impl CurrentSensor for ScriptedSensor {
    fn sample(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        if let Some(v) = self.script.borrow_mut().pop_front() {
            self.last = v;
        }
        Ok(self.last)
    }
}

type WriteLog = Rc<RefCell<Vec<(usize, Vec<u8>)>>>;

/// In-memory store region that records every write (offset, bytes) so tests
/// can assert on persistence points.
pub struct RecordingStore {
    bytes: Vec<u8>,
    configured: bool,
    log: WriteLog,
}

impl Default for RecordingStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            bytes: vec![NEVER_CONFIGURED; crate::persist::REGION_DATA_LEN],
            configured: false,
            log: Rc::new(RefCell::new(Vec::new())),
        }
    }

    /// Handle onto the write log, usable after the store moves into a valve.
    pub fn write_log(&self) -> WriteLog {
        Rc::clone(&self.log)
    }

    /// Snapshot of the writes recorded so far.
    pub fn writes(&self) -> Vec<(usize, Vec<u8>)> {
        self.log.borrow().clone()
    }
}

impl ConfigStore for RecordingStore {
    fn is_configured(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.configured)
    }

    fn read(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if offset + buf.len() > self.bytes.len() {
            return Err(Box::new(std::io::Error::other("store region out of bounds")));
        }
        buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
        Ok(())
    }

    fn write(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if offset + data.len() > self.bytes.len() {
            return Err(Box::new(std::io::Error::other("store region out of bounds")));
        }
        self.configured = true;
        self.bytes[offset..offset + data.len()].copy_from_slice(data);
        self.log.borrow_mut().push((offset, data.to_vec()));
        Ok(())
    }

    fn factory_reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.configured = false;
        Ok(())
    }
}
