//! ZLG1xx SPI controller backend
//!
//! [`SpiPeriph`] implements [`Bus`] over the memory-mapped SPI register
//! block and a pair of DMA channels borrowed from the shared [`Dma`]
//! manager. See [`SpiMaster`](crate::SpiMaster) for the interrupt wiring
//! that connects the channels back to the engine.
//!
//! The shift-register-drain interrupt is level-style: in your SPI
//! interrupt handler, call [`take_drain_flag`](SpiPeriph::take_drain_flag)
//! and forward to
//! [`on_transfer_complete`](crate::SpiMaster::on_transfer_complete) when
//! it returns `true`.

use embedded_hal::spi::{Phase, Polarity};

use crate::{
    bus::{Bus, BusConfig, SamplePoint},
    descriptor::{Descriptor, Direction},
    device::BitOrder,
    dma::Dma,
    ral::{self, spi::RegisterBlock, Static},
    Result,
};

/// The SPI controller paired with its receive and transmit DMA channels
pub struct SpiPeriph<const CHANNELS: usize> {
    registers: Static<ral::spi::RegisterBlock>,
    dma: &'static Dma<CHANNELS>,
    rx_channel: usize,
    tx_channel: usize,
    clock_hz: u32,
}

// Safety: the register pointer refers to static peripheral memory, and
// the peripheral moves between contexts only behind the engine's mutex.
unsafe impl<const CHANNELS: usize> Send for SpiPeriph<CHANNELS> {}

impl<const CHANNELS: usize> SpiPeriph<CHANNELS> {
    /// Create the peripheral backend
    ///
    /// `clock_hz` is the controller's input clock rate, as reported by
    /// your clock tree.
    ///
    /// # Safety
    ///
    /// `registers` must point to the start of an SPI controller register
    /// block, and `rx_channel` / `tx_channel` must be distinct DMA
    /// channels that are requestable by that controller and not used by
    /// anything else.
    pub const unsafe fn new(
        registers: *const (),
        dma: &'static Dma<CHANNELS>,
        rx_channel: usize,
        tx_channel: usize,
        clock_hz: u32,
    ) -> Self {
        SpiPeriph {
            registers: Static(registers.cast()),
            dma,
            rx_channel,
            tx_channel,
            clock_hz,
        }
    }

    /// Read and clear the shift-register-drain flag
    ///
    /// Returns `true` when the controller had finished draining, in which
    /// case the flag is cleared before returning.
    pub fn take_drain_flag(&self) -> bool {
        let sr = self.registers.SR.read();
        if sr & RegisterBlock::TC != 0 {
            self.registers.SR.write(sr & !RegisterBlock::TC);
            true
        } else {
            false
        }
    }
}

impl<const CHANNELS: usize> Bus for SpiPeriph<CHANNELS> {
    fn clock_rate(&self) -> u32 {
        self.clock_hz
    }

    fn data_register(&self) -> *mut u8 {
        &self.registers.DR as *const _ as *mut u8
    }

    fn configure(&mut self, config: &BusConfig) -> Result<()> {
        // divider = 2^(BAUD + 1); the engine only passes powers of two in
        // the hardware range.
        let baud = (config.divider as u32).trailing_zeros() - 1;

        let mut cr1 = RegisterBlock::MSTR | (baud << RegisterBlock::BAUD_SHIFT);
        if matches!(config.mode.polarity, Polarity::IdleHigh) {
            cr1 |= RegisterBlock::CPOL;
        }
        if matches!(config.mode.phase, Phase::CaptureOnSecondTransition) {
            cr1 |= RegisterBlock::CPHA;
        }
        if matches!(config.bit_order, BitOrder::LsbFirst) {
            cr1 |= RegisterBlock::LSBFIRST;
        }

        let mut cr2 = ((config.bits_per_word - 1) as u32) << RegisterBlock::DS_SHIFT
            | RegisterBlock::TXDMAEN
            | RegisterBlock::RXDMAEN
            | RegisterBlock::TCIE;
        if matches!(config.sample, SamplePoint::FirstEdge) {
            cr2 |= RegisterBlock::SAMPLE_FIRST;
        }

        // Reprogram with the controller disabled, then enable.
        self.registers.CR1.write(cr1);
        self.registers.CR2.write(cr2);
        self.registers.CR1.write(cr1 | RegisterBlock::SPE);
        trace!("SPI configured: divider {}", config.divider);
        Ok(())
    }

    fn start_receive(&mut self, descriptor: &Descriptor) -> Result<()> {
        self.dma
            .configure(descriptor, Direction::PeripheralToMemory, self.rx_channel)?;
        // Safety: the engine keeps the descriptor's addresses valid for
        // the lifetime of the run.
        unsafe { self.dma.enable(self.rx_channel) };
        Ok(())
    }

    fn start_transmit(&mut self, descriptor: &Descriptor) -> Result<()> {
        self.dma
            .configure(descriptor, Direction::MemoryToPeripheral, self.tx_channel)?;
        // Safety: as for start_receive.
        unsafe { self.dma.enable(self.tx_channel) };
        Ok(())
    }

    fn halt(&mut self) {
        self.dma.disable(self.rx_channel);
        self.dma.disable(self.tx_channel);
        self.registers
            .CR1
            .write(self.registers.CR1.read() & !RegisterBlock::SPE);
    }
}
