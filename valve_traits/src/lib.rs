pub mod clock;

pub use clock::{Clock, MonotonicClock};

/// A binary relay output. The valve core drives two of these: one switching
/// motor power, one selecting travel direction (energized = positive travel).
pub trait Relay {
    fn energize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    fn set(&mut self, on: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if on { self.energize() } else { self.release() }
    }
}

impl<T: Relay + ?Sized> Relay for Box<T> {
    fn energize(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).energize()
    }

    fn release(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).release()
    }
}

/// Motor current-sense input. Samples are raw ADC counts in 0..=1023
/// (10-bit, forward and reverse current split around mid-scale).
pub trait CurrentSensor {
    fn sample(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: CurrentSensor + ?Sized> CurrentSensor for Box<T> {
    fn sample(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        (**self).sample()
    }
}

/// Sentinel byte marking a store region that has never been written.
pub const NEVER_CONFIGURED: u8 = 0xFF;

/// A fixed-size persistent byte region owned by one valve instance.
///
/// The first byte of the underlying region is a sentinel that implementations
/// manage themselves: `is_configured()` reports whether it differs from
/// [`NEVER_CONFIGURED`], and every `write()` marks the region configured as a
/// side effect. Offsets passed to `read`/`write` address the data bytes after
/// the sentinel.
pub trait ConfigStore {
    fn is_configured(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>>;
    fn read(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    fn write(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
    /// Restore the sentinel to [`NEVER_CONFIGURED`] without touching data bytes.
    fn factory_reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

impl<T: ConfigStore + ?Sized> ConfigStore for Box<T> {
    fn is_configured(&self) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
        (**self).is_configured()
    }

    fn read(
        &mut self,
        offset: usize,
        buf: &mut [u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).read(offset, buf)
    }

    fn write(
        &mut self,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).write(offset, data)
    }

    fn factory_reset(&mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        (**self).factory_reset()
    }
}
