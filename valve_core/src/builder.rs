//! Fallible builder wiring a valve's hardware seams together.

use std::sync::Arc;

use valve_traits::{Clock, ConfigStore, CurrentSensor, MonotonicClock, Relay};

use crate::error::{BuildError, Result};
use crate::valve::Valve;

/// Collects the four required parts plus an optional clock, then checks the
/// set at `try_build()` time so a missing part is a typed error instead of a
/// half-wired controller.
pub struct ValveBuilder<D, R, C, P>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    drive: Option<D>,
    direction: Option<R>,
    sensor: Option<C>,
    store: Option<P>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
}

impl<D, R, C, P> Default for ValveBuilder<D, R, C, P>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<D, R, C, P> ValveBuilder<D, R, C, P>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    pub fn new() -> Self {
        Self {
            drive: None,
            direction: None,
            sensor: None,
            store: None,
            clock: None,
        }
    }

    /// Relay switching motor power.
    pub fn with_drive_relay(mut self, relay: D) -> Self {
        self.drive = Some(relay);
        self
    }

    /// Relay selecting travel direction (energized = positive travel).
    pub fn with_direction_relay(mut self, relay: R) -> Self {
        self.direction = Some(relay);
        self
    }

    pub fn with_current_sensor(mut self, sensor: C) -> Self {
        self.sensor = Some(sensor);
        self
    }

    pub fn with_store(mut self, store: P) -> Self {
        self.store = Some(store);
        self
    }

    /// Override the clock; defaults to the real monotonic clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Check completeness, load persisted config, and hand back a valve
    /// with both relays released.
    pub fn try_build(self) -> Result<Valve<D, R, C, P>> {
        let drive = self.drive.ok_or(BuildError::MissingDriveRelay)?;
        let direction = self.direction.ok_or(BuildError::MissingDirectionRelay)?;
        let sensor = self.sensor.ok_or(BuildError::MissingCurrentSensor)?;
        let store = self.store.ok_or(BuildError::MissingStore)?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        Valve::from_parts(drive, direction, sensor, store, clock)
    }
}
