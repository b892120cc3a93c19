//! Bank of up to four valves addressed by a 2-bit wire target.

use valve_traits::{ConfigStore, CurrentSensor, Relay};

use crate::error::{BuildError, Result};
use crate::valve::Valve;

/// Wire target addressing allows two bits, so the bank holds at most four.
pub const MAX_VALVES: usize = 4;

/// Proof token that persisted state was wiped: the controller must be
/// restarted before the in-memory picture can be trusted again. The bank
/// never restarts anything itself.
#[must_use = "a factory reset requires a controller restart"]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartRequired;

pub struct ValveBank<D, R, C, P>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    valves: Vec<Valve<D, R, C, P>>,
}

impl<D, R, C, P> Default for ValveBank<D, R, C, P>
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

impl<D, R, C, P> ValveBank<D, R, C, P>
where
    D: Relay,
    R: Relay,
    C: CurrentSensor,
    P: ConfigStore,
{
    pub fn new() -> Self {
        Self {
            valves: Vec::with_capacity(MAX_VALVES),
        }
    }

    pub fn push(&mut self, valve: Valve<D, R, C, P>) -> Result<()> {
        if self.valves.len() >= MAX_VALVES {
            return Err(BuildError::InvalidConfig("bank already holds four valves").into());
        }
        self.valves.push(valve);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.valves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.valves.is_empty()
    }

    /// Look up a valve by wire target; only the low two bits address.
    pub fn get_mut(&mut self, target: u8) -> Option<&mut Valve<D, R, C, P>> {
        self.valves.get_mut(usize::from(target & 0b11))
    }

    /// Tick every valve once. Stops at the first hard error.
    pub fn tick_all(&mut self) -> Result<()> {
        for valve in &mut self.valves {
            valve.tick()?;
        }
        Ok(())
    }

    /// Wipe every valve's persisted region. Returns the restart token; the
    /// process keeps running on in-memory defaults until the caller acts.
    pub fn factory_reset_all(&mut self) -> Result<RestartRequired> {
        for valve in &mut self.valves {
            valve.factory_reset()?;
        }
        tracing::warn!("factory reset complete, restart required");
        Ok(RestartRequired)
    }
}
