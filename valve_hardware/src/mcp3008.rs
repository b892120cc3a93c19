use tracing::trace;
use valve_traits::CurrentSensor;

use crate::error::HwError;

/// MCP3008 single-ended reader for the motor current-sense channel.
///
/// The sensor feeds 0-5 V into one ADC channel; forward and reverse motor
/// current map below and above mid-scale, so raw counts (0..=1023) are used
/// directly by the classifier.
pub struct Mcp3008Channel {
    spi: rppal::spi::Spi,
    channel: u8,
}

impl Mcp3008Channel {
    /// Reader on the default SPI0 bus.
    pub fn on_spi0(channel: u8) -> Result<Self, HwError> {
        Self::new(rppal::spi::Bus::Spi0, channel)
    }

    pub fn new(bus: rppal::spi::Bus, channel: u8) -> Result<Self, HwError> {
        if channel > 7 {
            return Err(HwError::Spi(format!("mcp3008 channel {channel} out of range")));
        }
        let spi = rppal::spi::Spi::new(
            bus,
            rppal::spi::SlaveSelect::Ss0,
            1_000_000,
            rppal::spi::Mode::Mode0,
        )
        .map_err(|e| HwError::Spi(e.to_string()))?;
        Ok(Self { spi, channel })
    }

    fn read_raw(&mut self) -> Result<i32, HwError> {
        // Start bit, single-ended + channel, filler.
        let tx = [0x01, (0x08 | self.channel) << 4, 0x00];
        let mut rx = [0u8; 3];
        self.spi
            .transfer(&mut rx, &tx)
            .map_err(|e| HwError::Spi(e.to_string()))?;
        let raw = ((i32::from(rx[1]) & 0x03) << 8) | i32::from(rx[2]);
        trace!(raw, channel = self.channel, "mcp3008 sample");
        Ok(raw)
    }
}

impl CurrentSensor for Mcp3008Channel {
    fn sample(&mut self) -> Result<i32, Box<dyn std::error::Error + Send + Sync>> {
        Ok(self.read_raw()?)
    }
}
