//! Hardware bindings for the valve controller.
//!
//! The default build provides a simulated actuator (relays + current sense
//! that behave like a motorized valve running against mechanical stops) and
//! byte stores backed by memory or a file. The `hardware` feature adds
//! Raspberry Pi GPIO relays and an MCP3008 current-sense reader via `rppal`.

pub mod error;
#[cfg(feature = "hardware")]
pub mod mcp3008;

use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::rc::Rc;
use std::time::{Duration, Instant};

use valve_traits::{ConfigStore, CurrentSensor, NEVER_CONFIGURED, Relay};

use crate::error::HwError;

/// Quiescent current-sense level produced by the simulator (mid-scale-ish
/// of the 10-bit domain).
pub const SIM_QUIESCENT: i32 = 400;
/// Level while the simulated motor is actually turning the valve.
pub const SIM_DRIVEN: i32 = 800;

#[derive(Debug)]
struct SimState {
    drive_on: bool,
    dir_positive: bool,
    /// Valve position in 0.0..=1.0 of full travel.
    position: f64,
    last_update: Instant,
    travel: Duration,
}

impl SimState {
    /// Advance position from elapsed wall time; returns true if the valve
    /// actually moved (i.e. was not already against a stop).
    fn step(&mut self) -> bool {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update);
        self.last_update = now;
        if !self.drive_on {
            return false;
        }
        let rate = 1.0 / self.travel.as_secs_f64().max(1e-6);
        let delta = dt.as_secs_f64() * rate;
        let before = self.position;
        self.position = if self.dir_positive {
            (self.position + delta).min(1.0)
        } else {
            (self.position - delta).max(0.0)
        };
        (self.position - before).abs() > f64::EPSILON
    }
}

/// Simulated actuator: two relays and a current sensor sharing one state.
///
/// The sensor reads [`SIM_DRIVEN`] while the motor is energized and the
/// valve has travel left, and [`SIM_QUIESCENT`] otherwise, including the
/// stalled-against-a-stop case the calibration procedure listens for.
pub struct SimulatedActuator {
    state: Rc<RefCell<SimState>>,
}

impl SimulatedActuator {
    pub fn new(travel: Duration) -> Self {
        Self {
            state: Rc::new(RefCell::new(SimState {
                drive_on: false,
                dir_positive: false,
                position: 0.3, // somewhere mid-travel, like a real power-up
                last_update: Instant::now(),
                travel,
            })),
        }
    }

    pub fn drive_relay(&self) -> SimRelay {
        SimRelay {
            state: Rc::clone(&self.state),
            is_drive: true,
        }
    }

    pub fn direction_relay(&self) -> SimRelay {
        SimRelay {
            state: Rc::clone(&self.state),
            is_drive: false,
        }
    }

    pub fn current_sensor(&self) -> SimCurrentSensor {
        SimCurrentSensor {
            state: Rc::clone(&self.state),
        }
    }
}

pub struct SimRelay {
    state: Rc<RefCell<SimState>>,
    is_drive: bool,
}

impl Relay for SimRelay {
    fn energize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.state.borrow_mut();
        s.step();
        if self.is_drive {
            s.drive_on = true;
        } else {
            s.dir_positive = true;
        }
        Ok(())
    }

    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.state.borrow_mut();
        s.step();
        if self.is_drive {
            s.drive_on = false;
        } else {
            s.dir_positive = false;
        }
        Ok(())
    }
}

pub struct SimCurrentSensor {
    state: Rc<RefCell<SimState>>,
}

impl CurrentSensor for SimCurrentSensor {
    fn sample(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        let mut s = self.state.borrow_mut();
        let moving = s.step();
        let level = if s.drive_on && moving {
            SIM_DRIVEN
        } else {
            SIM_QUIESCENT
        };
        tracing::trace!(level, position = s.position, "sim current sample");
        Ok(level)
    }
}

/// In-memory byte store region with the sentinel-byte contract.
pub struct MemoryStore {
    bytes: Vec<u8>,
}

impl MemoryStore {
    /// A fresh, never-configured region with `data_len` data bytes.
    pub fn new(data_len: usize) -> Self {
        Self {
            bytes: vec![NEVER_CONFIGURED; data_len + 1],
        }
    }

    fn check(&self, offset: usize, len: usize) -> Result<(), HwError> {
        if offset + len + 1 > self.bytes.len() {
            return Err(HwError::RegionBounds { offset, len });
        }
        Ok(())
    }
}

impl ConfigStore for MemoryStore {
    fn is_configured(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.bytes[0] != NEVER_CONFIGURED)
    }

    fn read(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check(offset, buf.len())?;
        buf.copy_from_slice(&self.bytes[offset + 1..offset + 1 + buf.len()]);
        Ok(())
    }

    fn write(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check(offset, data.len())?;
        self.bytes[0] = 1;
        self.bytes[offset + 1..offset + 1 + data.len()].copy_from_slice(data);
        Ok(())
    }

    fn factory_reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.bytes[0] = NEVER_CONFIGURED;
        Ok(())
    }
}

struct FileShared {
    file: File,
    bytes: Vec<u8>,
}

impl FileShared {
    fn flush_range(&mut self, start: usize, len: usize) -> Result<(), HwError> {
        self.file.seek(SeekFrom::Start(start as u64))?;
        self.file.write_all(&self.bytes[start..start + len])?;
        self.file.flush()?;
        Ok(())
    }
}

/// File-backed store split into fixed-size per-valve regions.
///
/// Layout: region `i` occupies `i * (1 + data_len)` bytes onward, sentinel
/// first. A missing or short file is extended with [`NEVER_CONFIGURED`].
pub struct FileStore {
    shared: Rc<RefCell<FileShared>>,
    data_len: usize,
    regions: usize,
}

impl FileStore {
    pub fn open(path: &Path, regions: usize, data_len: usize) -> Result<Self, HwError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        let total = regions * (1 + data_len);
        let mut bytes = Vec::with_capacity(total);
        file.read_to_end(&mut bytes)?;
        if bytes.len() < total {
            bytes.resize(total, NEVER_CONFIGURED);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&bytes)?;
            file.flush()?;
        }
        Ok(Self {
            shared: Rc::new(RefCell::new(FileShared { file, bytes })),
            data_len,
            regions,
        })
    }

    /// Handle for one region; `index` must be below the region count.
    pub fn slot(&self, index: usize) -> Result<FileSlot, HwError> {
        if index >= self.regions {
            return Err(HwError::RegionBounds {
                offset: index,
                len: self.data_len,
            });
        }
        Ok(FileSlot {
            shared: Rc::clone(&self.shared),
            base: index * (1 + self.data_len),
            data_len: self.data_len,
        })
    }
}

pub struct FileSlot {
    shared: Rc<RefCell<FileShared>>,
    base: usize,
    data_len: usize,
}

impl FileSlot {
    fn check(&self, offset: usize, len: usize) -> Result<(), HwError> {
        if offset + len > self.data_len {
            return Err(HwError::RegionBounds { offset, len });
        }
        Ok(())
    }
}

impl ConfigStore for FileSlot {
    fn is_configured(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        let shared = self.shared.borrow();
        Ok(shared.bytes[self.base] != NEVER_CONFIGURED)
    }

    fn read(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check(offset, buf.len())?;
        let shared = self.shared.borrow();
        let start = self.base + 1 + offset;
        buf.copy_from_slice(&shared.bytes[start..start + buf.len()]);
        Ok(())
    }

    fn write(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.check(offset, data.len())?;
        let mut shared = self.shared.borrow_mut();
        shared.bytes[self.base] = 1;
        let start = self.base + 1 + offset;
        let end = start + data.len();
        shared.bytes[start..end].copy_from_slice(data);
        // One flush covering sentinel through the written field.
        let len = end - self.base;
        shared.flush_range(self.base, len)?;
        Ok(())
    }

    fn factory_reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut shared = self.shared.borrow_mut();
        shared.bytes[self.base] = NEVER_CONFIGURED;
        shared.flush_range(self.base, 1)?;
        Ok(())
    }
}

/// GPIO-backed relay. The board's relays are active-low: energizing the
/// relay drives the pin low.
#[cfg(feature = "hardware")]
pub struct GpioRelay {
    pin: rppal::gpio::OutputPin,
}

#[cfg(feature = "hardware")]
impl GpioRelay {
    pub fn new(pin: u8) -> Result<Self, HwError> {
        let gpio = rppal::gpio::Gpio::new().map_err(|e| HwError::Gpio(e.to_string()))?;
        let mut pin = gpio
            .get(pin)
            .map_err(|e| HwError::Gpio(e.to_string()))?
            .into_output();
        pin.set_high(); // released before anything else runs
        Ok(Self { pin })
    }
}

#[cfg(feature = "hardware")]
impl Relay for GpioRelay {
    fn energize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pin.set_low();
        Ok(())
    }

    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.pin.set_high();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn memory_store_starts_unconfigured_and_write_sets_sentinel() {
        let mut store = MemoryStore::new(22);
        assert!(!store.is_configured().unwrap());
        store.write(0, &[0x12, 0x34]).unwrap();
        assert!(store.is_configured().unwrap());
        let mut buf = [0u8; 2];
        store.read(0, &mut buf).unwrap();
        assert_eq!(buf, [0x12, 0x34]);
        store.factory_reset().unwrap();
        assert!(!store.is_configured().unwrap());
    }

    #[test]
    fn memory_store_rejects_out_of_bounds() {
        let mut store = MemoryStore::new(4);
        assert!(store.write(3, &[0, 0]).is_err());
    }

    #[rstest]
    #[case(0)]
    #[case(2)]
    fn file_store_roundtrip_survives_reopen(#[case] region: usize) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.bin");
        {
            let store = FileStore::open(&path, 4, 22).unwrap();
            let mut slot = store.slot(region).unwrap();
            assert!(!slot.is_configured().unwrap());
            slot.write(4, &[9, 8, 7]).unwrap();
        }
        let store = FileStore::open(&path, 4, 22).unwrap();
        let mut slot = store.slot(region).unwrap();
        assert!(slot.is_configured().unwrap());
        let mut buf = [0u8; 3];
        slot.read(4, &mut buf).unwrap();
        assert_eq!(buf, [9, 8, 7]);
    }

    #[test]
    fn simulated_actuator_goes_quiescent_at_the_stop() {
        let sim = SimulatedActuator::new(Duration::from_millis(10));
        let mut drive = sim.drive_relay();
        let mut dir = sim.direction_relay();
        let mut sense = sim.current_sensor();

        assert_eq!(sense.sample().unwrap(), SIM_QUIESCENT);

        dir.release().unwrap();
        drive.energize().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(sense.sample().unwrap(), SIM_DRIVEN);

        // Past full travel the valve stalls against the stop.
        std::thread::sleep(Duration::from_millis(20));
        let _ = sense.sample().unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(sense.sample().unwrap(), SIM_QUIESCENT);
    }
}
