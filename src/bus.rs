//! Hardware seam for the transfer engine
//!
//! [`SpiMaster`](crate::SpiMaster) drives any implementation of [`Bus`].
//! The production implementation over the ZLG1xx registers lives in
//! [`peripheral`](crate::peripheral); tests substitute a recording fake.

use embedded_hal::spi::Mode;

use crate::{descriptor::Descriptor, device::BitOrder, Result};

/// Smallest clock divider the peripheral can generate
pub(crate) const MIN_DIVIDER: u32 = 2;
/// Largest clock divider the peripheral can generate
pub(crate) const MAX_DIVIDER: u32 = 4096;

/// Where the receiver samples each bit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SamplePoint {
    /// Sample in the middle of the bit period
    MidBit,
    /// Sample on the first clock edge, for timing margin at high rates
    FirstEdge,
}

/// Resolved hardware parameters for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BusConfig {
    /// Clock polarity and phase
    pub mode: Mode,
    /// Bit order on the wire
    pub bit_order: BitOrder,
    /// Word size in bits, 1 to 32
    pub bits_per_word: u8,
    /// Power-of-two clock divider, 2 to 4096
    pub divider: u16,
    /// The wire rate the divider produces, in Hz
    pub speed_hz: u32,
    /// Receiver sampling strategy
    pub sample: SamplePoint,
}

/// Operations the transfer engine needs from the SPI hardware
///
/// Implementations pair the SPI controller with its receive and transmit
/// DMA channels. The engine always starts the receive channel before the
/// transmit channel, so that the first received element cannot be lost to
/// an enable-ordering race.
pub trait Bus {
    /// The peripheral input clock rate, in Hz
    fn clock_rate(&self) -> u32;

    /// Address of the data register, the DMA request source and sink
    fn data_register(&self) -> *mut u8;

    /// Apply timing and framing for the upcoming transfer
    fn configure(&mut self, config: &BusConfig) -> Result<()>;

    /// Program and start the receive channel
    fn start_receive(&mut self, descriptor: &Descriptor) -> Result<()>;

    /// Program and start the transmit channel
    ///
    /// Called after [`start_receive`](Bus::start_receive) for the same
    /// transfer.
    fn start_transmit(&mut self, descriptor: &Descriptor) -> Result<()>;

    /// Stop both channels and quiesce the controller
    fn halt(&mut self);
}

/// Pick the power-of-two divider producing the fastest rate at or below
/// `target_hz`, and the rate it produces
pub(crate) fn resolve_divider(clock_hz: u32, target_hz: u32) -> (u16, u32) {
    let ratio = clock_hz.div_ceil(target_hz);
    let divider = ratio.next_power_of_two().clamp(MIN_DIVIDER, MAX_DIVIDER);
    (divider as u16, clock_hz / divider)
}

/// Sampling strategy for a wire rate: above one fifth of the input clock
/// the mid-bit point leaves too little margin
pub(crate) fn sample_point(clock_hz: u32, speed_hz: u32) -> SamplePoint {
    if speed_hz > clock_hz / 5 {
        SamplePoint::FirstEdge
    } else {
        SamplePoint::MidBit
    }
}
