//! SPI device registration
//!
//! A [`DeviceConfig`] describes one chip-select peer on the bus: its
//! clock mode, speed range, word size, and how its select line is
//! driven. Registering a configuration with
//! [`SpiMaster::setup`](crate::SpiMaster::setup) validates it against the
//! peripheral's input clock and returns a [`DeviceId`] handle for message
//! submission. Registered devices are never mutated.

use embedded_hal::spi::{Mode, MODE_0};

use crate::bus::{MAX_DIVIDER, MIN_DIVIDER};
use crate::{Error, Result};

/// Bit order on the wire
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BitOrder {
    /// Most significant bit first
    #[default]
    MsbFirst,
    /// Least significant bit first
    LsbFirst,
}

/// Handle to a registered device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceId(pub(crate) usize);

/// Bus parameters for one chip-select peer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeviceConfig {
    /// Clock polarity and phase
    pub mode: Mode,
    /// Bit order on the wire
    pub bit_order: BitOrder,
    /// The select line asserts high
    pub cs_active_high: bool,
    /// The device has no select line at all
    pub no_cs: bool,
    /// Keep the select line asserted across message boundaries
    pub cs_hold: bool,
    /// Fastest clock the device tolerates, in Hz
    ///
    /// Clamped to the fastest rate the peripheral can generate.
    pub max_speed_hz: u32,
    /// Slowest clock the device tolerates, in Hz (0 for no minimum)
    pub min_speed_hz: u32,
    /// Word size in bits; 0 selects the 8-bit default
    pub bits_per_word: u8,
    /// Select line control, called with the electrical level to drive
    ///
    /// Leave `None` for a hardware-managed or absent select line.
    pub set_cs: Option<fn(bool)>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            mode: MODE_0,
            bit_order: BitOrder::MsbFirst,
            cs_active_high: false,
            no_cs: false,
            cs_hold: false,
            max_speed_hz: 1_000_000,
            min_speed_hz: 0,
            bits_per_word: 0,
            set_cs: None,
        }
    }
}

impl DeviceConfig {
    /// Normalize and validate against the peripheral input clock
    pub(crate) fn validated(mut self, clock_hz: u32) -> Result<Self> {
        if self.bits_per_word == 0 {
            self.bits_per_word = 8;
        }
        if self.bits_per_word > 32 {
            return Err(Error::Unsupported);
        }
        if self.max_speed_hz == 0 {
            return Err(Error::InvalidArgument);
        }
        let hardware_max = clock_hz / MIN_DIVIDER;
        let hardware_min = clock_hz / MAX_DIVIDER;
        if self.max_speed_hz < hardware_min {
            return Err(Error::Unsupported);
        }
        if self.max_speed_hz > hardware_max {
            self.max_speed_hz = hardware_max;
        }
        if self.min_speed_hz > self.max_speed_hz {
            return Err(Error::InvalidArgument);
        }
        Ok(self)
    }

    /// Drive the select line; `asserted` is the logical state
    pub(crate) fn set_select(&self, asserted: bool) {
        if self.no_cs {
            return;
        }
        if let Some(set) = self.set_cs {
            set(asserted == self.cs_active_high);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLOCK: u32 = 72_000_000;

    #[test]
    fn word_width_bounds() {
        let config = DeviceConfig {
            bits_per_word: 33,
            ..DeviceConfig::default()
        };
        assert_eq!(config.validated(CLOCK), Err(Error::Unsupported));

        let config = DeviceConfig {
            bits_per_word: 32,
            ..DeviceConfig::default()
        };
        assert_eq!(config.validated(CLOCK).map(|c| c.bits_per_word), Ok(32));
    }

    #[test]
    fn zero_word_width_defaults_to_eight() {
        let config = DeviceConfig::default();
        assert_eq!(config.bits_per_word, 0);
        assert_eq!(config.validated(CLOCK).map(|c| c.bits_per_word), Ok(8));
    }

    #[test]
    fn max_speed_clamps_to_half_clock() {
        let config = DeviceConfig {
            max_speed_hz: CLOCK,
            ..DeviceConfig::default()
        };
        assert_eq!(
            config.validated(CLOCK).map(|c| c.max_speed_hz),
            Ok(CLOCK / 2)
        );
    }

    #[test]
    fn max_speed_below_divider_range_is_unsupported() {
        let config = DeviceConfig {
            max_speed_hz: 10_000,
            ..DeviceConfig::default()
        };
        assert_eq!(config.validated(CLOCK), Err(Error::Unsupported));
    }

    #[test]
    fn min_speed_above_max_is_invalid() {
        let config = DeviceConfig {
            max_speed_hz: 1_000_000,
            min_speed_hz: 2_000_000,
            ..DeviceConfig::default()
        };
        assert_eq!(config.validated(CLOCK), Err(Error::InvalidArgument));
    }
}
