//! DMA channel manager
//!
//! [`Dma`] owns the controller registers and a table of per-channel
//! completion callbacks. It is designed to live in a `static`, so that
//! drivers and interrupt handlers can share it:
//!
//! ```no_run
//! use zlg_spi_dma::Dma;
//! # const DMA_PTR: *const () = core::ptr::null();
//!
//! // Safety: address and channel count are valid for this target.
//! static DMA: Dma<5> = unsafe { Dma::new(DMA_PTR) };
//!
//! // #[interrupt]
//! fn DMA1() {
//!     DMA.on_interrupt();
//! }
//! ```
//!
//! You're responsible for routing the DMA interrupt to
//! [`on_interrupt`](Dma::on_interrupt) and for unmasking it in the
//! interrupt controller.

use core::cell::Cell;

use critical_section::Mutex;

use crate::{
    descriptor::{Descriptor, Direction, TransferConfig},
    element::Element,
    ral::{self, dma::ChannelRegisters, dma::RegisterBlock, Static},
    Error, Result,
};

/// How a DMA channel run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Completion {
    /// The transfer count reached zero
    Normal,
    /// The controller flagged a bus error
    Error,
}

/// Signature of a channel completion callback
///
/// Runs from interrupt context with the opaque context supplied to
/// [`Dma::connect`].
pub type ChannelIsr = fn(*mut (), Completion);

#[derive(Clone, Copy)]
struct Handler {
    isr: ChannelIsr,
    context: *mut (),
}

type Slot = Mutex<Cell<Option<Handler>>>;

const EMPTY: Slot = Mutex::new(Cell::new(None));

/// A DMA driver
///
/// `CHANNELS` is the number of channels your chip provides, at most the
/// eight of the largest family member. Each channel carries one optional
/// completion callback; [`on_interrupt`](Dma::on_interrupt) dispatches to
/// the callback of the first channel with a pending flag.
pub struct Dma<const CHANNELS: usize> {
    registers: Static<ral::dma::RegisterBlock>,
    handlers: [Slot; CHANNELS],
}

// Safety: OK to allocate the DMA driver in a static context. The handler
// table is guarded by critical sections, and register access is by
// volatile reads and writes.
unsafe impl<const CHANNELS: usize> Sync for Dma<CHANNELS> {}

impl<const CHANNELS: usize> Dma<CHANNELS> {
    /// Create the DMA driver
    ///
    /// This evaluates at compile time, so the driver can be assigned to a
    /// `static`. All channel callbacks start empty.
    ///
    /// # Safety
    ///
    /// `registers` must point to the start of the DMA controller register
    /// block, and `CHANNELS` must not exceed the channel count of your
    /// chip. An incorrect channel count lets callers configure channels
    /// that do not exist.
    pub const unsafe fn new(registers: *const ()) -> Self {
        Dma {
            registers: Static(registers.cast()),
            handlers: [EMPTY; CHANNELS],
        }
    }

    /// Bind a completion callback to `channel`
    ///
    /// Fails with [`Error::AlreadyBound`] when the channel already has a
    /// callback, and [`Error::InvalidArgument`] when `channel` is out of
    /// range. The existing binding is untouched in both cases.
    ///
    /// # Safety
    ///
    /// `context` is handed back to `isr` from interrupt context. Caller
    /// must make sure it stays valid until the binding is removed with
    /// [`disconnect`](Dma::disconnect).
    pub unsafe fn connect(&self, channel: usize, isr: ChannelIsr, context: *mut ()) -> Result<()> {
        if channel >= CHANNELS {
            return Err(Error::InvalidArgument);
        }
        critical_section::with(|cs| {
            let slot = self.handlers[channel].borrow(cs);
            if slot.get().is_some() {
                Err(Error::AlreadyBound)
            } else {
                slot.set(Some(Handler { isr, context }));
                Ok(())
            }
        })
    }

    /// Remove the callback bound to `channel`
    ///
    /// Fails with [`Error::NotBound`] unless both `isr` and `context`
    /// match the current binding, and [`Error::InvalidArgument`] when
    /// `channel` is out of range.
    pub fn disconnect(&self, channel: usize, isr: ChannelIsr, context: *mut ()) -> Result<()> {
        if channel >= CHANNELS {
            return Err(Error::InvalidArgument);
        }
        critical_section::with(|cs| {
            let slot = self.handlers[channel].borrow(cs);
            match slot.get() {
                Some(handler) if handler.isr == isr && handler.context == context => {
                    slot.set(None);
                    Ok(())
                }
                _ => Err(Error::NotBound),
            }
        })
    }

    /// Program a channel with a transfer descriptor
    ///
    /// Maps the descriptor's source and destination onto the channel's
    /// peripheral and memory sides according to `direction`, writes the
    /// element count, and leaves the channel disabled. Fails with
    /// [`Error::InvalidArgument`] when `channel` is out of range; no
    /// register is written on any error path.
    pub fn configure(
        &self,
        descriptor: &Descriptor,
        direction: Direction,
        channel: usize,
    ) -> Result<()> {
        if channel >= CHANNELS {
            return Err(Error::InvalidArgument);
        }
        let config = &descriptor.config;
        let source = descriptor.source as usize as u32;
        let destination = descriptor.destination as usize as u32;

        // (peripheral side, memory side) per direction; memory-to-memory
        // reads through the peripheral address port.
        let (peripheral, memory, psize, msize, pinc, minc, mode) = match direction {
            Direction::PeripheralToMemory => (
                source,
                destination,
                config.src_width,
                config.dst_width,
                config.src_increment,
                config.dst_increment,
                0,
            ),
            Direction::MemoryToPeripheral => (
                destination,
                source,
                config.dst_width,
                config.src_width,
                config.dst_increment,
                config.src_increment,
                ChannelRegisters::DIR,
            ),
            Direction::MemoryToMemory => (
                source,
                destination,
                config.src_width,
                config.dst_width,
                config.src_increment,
                config.dst_increment,
                ChannelRegisters::MEM2MEM,
            ),
        };

        let mut ccr = mode
            | (config.priority.level_bits() << ChannelRegisters::PL_SHIFT)
            | (psize.size_bits() << ChannelRegisters::PSIZE_SHIFT)
            | (msize.size_bits() << ChannelRegisters::MSIZE_SHIFT);
        if pinc {
            ccr |= ChannelRegisters::PINC;
        }
        if minc {
            ccr |= ChannelRegisters::MINC;
        }
        if config.circular {
            ccr |= ChannelRegisters::CIRC;
        }
        if config.complete_interrupt {
            ccr |= ChannelRegisters::TCIE | ChannelRegisters::TEIE;
        }

        let ch = &self.registers.CH[channel];
        ch.CCR.write(0);
        ch.CPAR.write(peripheral);
        ch.CMAR.write(memory);
        ch.CNDTR.write(descriptor.element_count(direction) as u32);
        ch.CCR.write(ccr);
        Ok(())
    }

    /// Start a configured channel
    ///
    /// # Safety
    ///
    /// The channel must have been configured with a descriptor whose
    /// source and destination stay valid for the lifetime of the run.
    /// Starting an unconfigured channel produces undefined hardware
    /// behavior.
    ///
    /// # Panics
    ///
    /// Panics if `channel` is out of range.
    pub unsafe fn enable(&self, channel: usize) {
        assert!(channel < CHANNELS, "DMA channel {} out of range", channel);
        let ch = &self.registers.CH[channel];
        ch.CCR.write(ch.CCR.read() | ChannelRegisters::EN);
    }

    /// Stop a channel, preventing further transfers
    ///
    /// # Panics
    ///
    /// Panics if `channel` is out of range.
    pub fn disable(&self, channel: usize) {
        assert!(channel < CHANNELS, "DMA channel {} out of range", channel);
        let ch = &self.registers.CH[channel];
        ch.CCR.write(ch.CCR.read() & !ChannelRegisters::EN);
    }

    /// `true` when the channel's transfer count reached zero
    pub fn is_complete(&self, channel: usize) -> bool {
        let shift = RegisterBlock::flag_shift(channel);
        self.registers.ISR.read() >> shift & RegisterBlock::TCIF != 0
    }

    /// Clear the channel's completion flag
    pub fn clear_complete(&self, channel: usize) {
        let shift = RegisterBlock::flag_shift(channel);
        self.registers
            .IFCR
            .write((RegisterBlock::TCIF | RegisterBlock::GIF) << shift);
    }

    /// `true` when the channel flagged a bus error
    pub fn is_error(&self, channel: usize) -> bool {
        let shift = RegisterBlock::flag_shift(channel);
        self.registers.ISR.read() >> shift & RegisterBlock::TEIF != 0
    }

    /// Clear the channel's error flag
    pub fn clear_error(&self, channel: usize) {
        let shift = RegisterBlock::flag_shift(channel);
        self.registers
            .IFCR
            .write((RegisterBlock::TEIF | RegisterBlock::GIF) << shift);
    }

    /// Handle the DMA interrupt
    ///
    /// Scans the channels for a pending completion or error flag. For the
    /// first match only: clears the half-transfer flag if it is set,
    /// derives [`Completion`] from the error flag, clears the pending
    /// flags, and invokes the channel's callback.
    ///
    /// Only one channel is serviced per entry. When several channels
    /// complete simultaneously the remaining flags keep the interrupt
    /// pending, and servicing happens on re-entry.
    pub fn on_interrupt(&self) {
        let isr = self.registers.ISR.read();
        for channel in 0..CHANNELS {
            let shift = RegisterBlock::flag_shift(channel);
            let flags = isr >> shift & 0xF;
            if flags & (RegisterBlock::TCIF | RegisterBlock::TEIF) == 0 {
                continue;
            }
            let completion = if flags & RegisterBlock::TEIF != 0 {
                Completion::Error
            } else {
                Completion::Normal
            };

            let mut clear = RegisterBlock::TCIF | RegisterBlock::TEIF | RegisterBlock::GIF;
            if flags & RegisterBlock::HTIF != 0 {
                clear |= RegisterBlock::HTIF;
            }
            self.registers.IFCR.write(clear << shift);

            let handler = critical_section::with(|cs| self.handlers[channel].borrow(cs).get());
            match handler {
                Some(handler) => (handler.isr)(handler.context, completion),
                None => warn!("DMA channel {} completed without a callback", channel),
            }
            return;
        }
    }

    /// Perform a DMA-powered `memcpy` between the `source` and `destination` buffers
    ///
    /// Copies the minimum number of elements between the two buffers and
    /// blocks until the channel is done. The channel's completion
    /// interrupt stays off for the copy; completion is observed by
    /// polling. Fails with [`Error::InvalidArgument`] when the byte count
    /// exceeds the hardware counter, and [`Error::Io`] when the
    /// controller flags a bus error.
    pub fn memcpy<E: Element>(
        &self,
        channel: usize,
        source: &[E],
        destination: &mut [E],
    ) -> Result<()> {
        let elements = source.len().min(destination.len());
        if elements == 0 {
            return Ok(());
        }
        let config = TransferConfig {
            src_width: E::WIDTH,
            dst_width: E::WIDTH,
            complete_interrupt: false,
            ..TransferConfig::default()
        };
        let descriptor = Descriptor::new(
            source.as_ptr().cast(),
            destination.as_mut_ptr().cast(),
            elements * core::mem::size_of::<E>(),
            config,
        )?;
        self.configure(&descriptor, Direction::MemoryToMemory, channel)?;
        // Safety: both buffers are borrowed for the duration of the call,
        // and the call blocks until the channel is done with them.
        unsafe { self.enable(channel) };
        while !self.is_complete(channel) && !self.is_error(channel) {}
        self.disable(channel);

        let result = if self.is_error(channel) {
            Err(Error::Io)
        } else {
            Ok(())
        };
        self.clear_complete(channel);
        self.clear_error(channel);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn callback(_: *mut (), _: Completion) {}
    fn other_callback(_: *mut (), _: Completion) {}

    // Binding table operations never touch the registers, so a null
    // register pointer is fine here.
    fn dma() -> Dma<4> {
        unsafe { Dma::new(core::ptr::null()) }
    }

    #[test]
    fn connect_rejects_double_binding() {
        let dma = dma();
        unsafe {
            assert_eq!(dma.connect(0, callback, core::ptr::null_mut()), Ok(()));
            assert_eq!(
                dma.connect(0, callback, core::ptr::null_mut()),
                Err(Error::AlreadyBound)
            );
        }
    }

    #[test]
    fn connect_rejects_out_of_range_channel() {
        let dma = dma();
        unsafe {
            assert_eq!(
                dma.connect(4, callback, core::ptr::null_mut()),
                Err(Error::InvalidArgument)
            );
        }
    }

    #[test]
    fn disconnect_requires_matching_binding() {
        let dma = dma();
        let context = 0x10usize as *mut ();
        unsafe {
            dma.connect(1, callback, context).unwrap();
        }
        assert_eq!(
            dma.disconnect(1, other_callback, context),
            Err(Error::NotBound)
        );
        assert_eq!(
            dma.disconnect(1, callback, core::ptr::null_mut()),
            Err(Error::NotBound)
        );
        assert_eq!(dma.disconnect(1, callback, context), Ok(()));
        assert_eq!(dma.disconnect(1, callback, context), Err(Error::NotBound));
    }

    #[test]
    fn rebind_after_disconnect() {
        let dma = dma();
        unsafe {
            dma.connect(2, callback, core::ptr::null_mut()).unwrap();
            dma.disconnect(2, callback, core::ptr::null_mut()).unwrap();
            assert_eq!(dma.connect(2, other_callback, core::ptr::null_mut()), Ok(()));
        }
    }
}
