//! Persistent valve configuration.
//!
//! Each valve owns one fixed-layout byte region in the controller's
//! persistent store. Fields are written individually at specific points
//! (travel times at the end of a calibration phase, the position estimate
//! at the end of each movement sub-segment), so a power loss mid-move costs at
//! most one sub-segment of estimate. Fields carry no checksum or version; a
//! write interrupted between fields can leave a mixed record. That is an
//! accepted limitation of the format.

use eyre::WrapErr;
use valve_traits::ConfigStore;

use crate::error::Result;
use crate::hw_error::map_hw_error;

/// Region layout (big-endian, offsets after the store's sentinel byte).
const OFF_TRAVEL_MIN: usize = 0; // i16
const OFF_TRAVEL_MAX: usize = 2; // i16
const OFF_TRAVEL_TIME_POS: usize = 4; // u64 microseconds
const OFF_TRAVEL_TIME_NEG: usize = 12; // u64 microseconds
const OFF_LAST_POSITION: usize = 20; // i16

/// Data bytes a valve region must provide.
pub const REGION_DATA_LEN: usize = 22;

pub const DEFAULT_MIN_DEG: i16 = 0;
pub const DEFAULT_MAX_DEG: i16 = 180;

/// Persisted per-valve configuration. Travel limits are kept normalized
/// (`travel_min <= travel_max`); travel times are full-range sweep durations
/// in microseconds; `last_position` is an estimate, not a guarantee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValveConfig {
    pub travel_min: i16,
    pub travel_max: i16,
    pub travel_time_pos_us: u64,
    pub travel_time_neg_us: u64,
    pub last_position: i16,
}

impl Default for ValveConfig {
    fn default() -> Self {
        Self {
            travel_min: DEFAULT_MIN_DEG,
            travel_max: DEFAULT_MAX_DEG,
            travel_time_pos_us: 0,
            travel_time_neg_us: 0,
            last_position: DEFAULT_MIN_DEG,
        }
    }
}

/// Adapter binding one valve to its store region.
pub struct ConfigSlot<P: ConfigStore> {
    store: P,
}

impl<P: ConfigStore> ConfigSlot<P> {
    pub fn new(store: P) -> Self {
        Self { store }
    }

    /// Load the full record, or defaults when the region was never written.
    /// Defaults are not written back here; the first real write configures
    /// the region.
    pub fn load_or_default(&mut self) -> Result<ValveConfig> {
        let configured = self
            .store
            .is_configured()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("sentinel check")?;
        if !configured {
            tracing::debug!("store region never configured, using defaults");
            return Ok(ValveConfig::default());
        }

        let travel_min = self.read_i16(OFF_TRAVEL_MIN)?;
        let travel_max = self.read_i16(OFF_TRAVEL_MAX)?;
        let travel_time_pos_us = self.read_u64(OFF_TRAVEL_TIME_POS)?;
        let travel_time_neg_us = self.read_u64(OFF_TRAVEL_TIME_NEG)?;
        let last_position = self.read_i16(OFF_LAST_POSITION)?;
        Ok(ValveConfig {
            travel_min,
            travel_max,
            travel_time_pos_us,
            travel_time_neg_us,
            last_position,
        })
    }

    pub fn write_limits(&mut self, min: i16, max: i16) -> Result<()> {
        self.ensure_initialized()?;
        self.write_i16(OFF_TRAVEL_MIN, min)?;
        self.write_i16(OFF_TRAVEL_MAX, max)
    }

    pub fn write_travel_time_pos(&mut self, us: u64) -> Result<()> {
        self.ensure_initialized()?;
        self.write_u64(OFF_TRAVEL_TIME_POS, us)
    }

    pub fn write_travel_time_neg(&mut self, us: u64) -> Result<()> {
        self.ensure_initialized()?;
        self.write_u64(OFF_TRAVEL_TIME_NEG, us)
    }

    pub fn write_position(&mut self, deg: i16) -> Result<()> {
        self.ensure_initialized()?;
        self.write_i16(OFF_LAST_POSITION, deg)
    }

    /// Writing any field to a never-configured region first lays down the
    /// full default record, so the fields the caller did not touch read as
    /// defaults instead of raw sentinel bytes.
    fn ensure_initialized(&mut self) -> Result<()> {
        let configured = self
            .store
            .is_configured()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("sentinel check")?;
        if configured {
            return Ok(());
        }
        tracing::debug!("initializing store region with defaults");
        let d = ValveConfig::default();
        self.write_i16(OFF_TRAVEL_MIN, d.travel_min)?;
        self.write_i16(OFF_TRAVEL_MAX, d.travel_max)?;
        self.write_u64(OFF_TRAVEL_TIME_POS, d.travel_time_pos_us)?;
        self.write_u64(OFF_TRAVEL_TIME_NEG, d.travel_time_neg_us)?;
        self.write_i16(OFF_LAST_POSITION, d.last_position)
    }

    /// Drop the region back to never-configured; data bytes are untouched
    /// and ignored on the next load.
    pub fn factory_reset(&mut self) -> Result<()> {
        self.store
            .factory_reset()
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("factory reset")
    }

    fn read_i16(&mut self, offset: usize) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.store
            .read(offset, &mut buf)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("store read")?;
        Ok(i16::from_be_bytes(buf))
    }

    fn read_u64(&mut self, offset: usize) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.store
            .read(offset, &mut buf)
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("store read")?;
        Ok(u64::from_be_bytes(buf))
    }

    fn write_i16(&mut self, offset: usize, value: i16) -> Result<()> {
        self.store
            .write(offset, &value.to_be_bytes())
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("store write")
    }

    fn write_u64(&mut self, offset: usize, value: u64) -> Result<()> {
        self.store
            .write(offset, &value.to_be_bytes())
            .map_err(|e| eyre::Report::new(map_hw_error(&*e)))
            .wrap_err("store write")
    }
}
