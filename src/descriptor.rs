//! DMA transfer descriptors
//!
//! A [`Descriptor`] is a plain value describing one DMA channel run:
//! source, destination, byte count, and the configuration flags for both
//! sides of the transfer. Building a descriptor has no hardware effect;
//! hand it to [`Dma::configure`](crate::Dma::configure) to program a
//! channel.

use crate::{Error, Result};

/// Width of a single DMA bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Width {
    /// 8-bit accesses
    Bits8,
    /// 16-bit accesses
    Bits16,
    /// 32-bit accesses
    Bits32,
}

impl Width {
    /// Size of one element in bytes
    pub const fn bytes(self) -> usize {
        match self {
            Width::Bits8 => 1,
            Width::Bits16 => 2,
            Width::Bits32 => 4,
        }
    }

    /// The element width that carries a word of `bits` bits
    pub(crate) const fn for_word(bits: u8) -> Self {
        if bits <= 8 {
            Width::Bits8
        } else if bits <= 16 {
            Width::Bits16
        } else {
            Width::Bits32
        }
    }

    pub(crate) const fn size_bits(self) -> u32 {
        match self {
            Width::Bits8 => 0b00,
            Width::Bits16 => 0b01,
            Width::Bits32 => 0b10,
        }
    }
}

/// Channel arbitration priority
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Priority {
    /// Lowest arbitration priority
    Low,
    Medium,
    High,
    /// Highest arbitration priority
    VeryHigh,
}

impl Priority {
    pub(crate) const fn level_bits(self) -> u32 {
        match self {
            Priority::Low => 0b00,
            Priority::Medium => 0b01,
            Priority::High => 0b10,
            Priority::VeryHigh => 0b11,
        }
    }
}

/// What the channel connects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Peripheral register to memory
    PeripheralToMemory,
    /// Memory to peripheral register
    MemoryToPeripheral,
    /// Memory to memory, started by software
    MemoryToMemory,
}

/// Configuration flags for one DMA channel run
///
/// The defaults describe the common memory copy: lowest priority, 8-bit
/// elements, both addresses incrementing, one-shot, with the completion
/// interrupt enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferConfig {
    /// Channel arbitration priority
    pub priority: Priority,
    /// Element width on the source side
    pub src_width: Width,
    /// Element width on the destination side
    pub dst_width: Width,
    /// Increment the source address after each element
    pub src_increment: bool,
    /// Increment the destination address after each element
    pub dst_increment: bool,
    /// Reload the counter and wrap the addresses when the run completes
    pub circular: bool,
    /// Raise the channel's completion interrupt when the run completes
    pub complete_interrupt: bool,
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            priority: Priority::Low,
            src_width: Width::Bits8,
            dst_width: Width::Bits8,
            src_increment: true,
            dst_increment: true,
            circular: false,
            complete_interrupt: true,
        }
    }
}

/// One DMA channel run, as a value
///
/// Descriptors are built immediately before a channel is configured and
/// are not retained by the hardware once the channel registers are
/// written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub(crate) source: *const (),
    pub(crate) destination: *mut (),
    pub(crate) nbytes: u16,
    pub(crate) config: TransferConfig,
}

impl Descriptor {
    /// Describe a transfer of `nbytes` bytes from `source` to `destination`
    ///
    /// Fails with [`Error::InvalidArgument`] when `nbytes` exceeds the
    /// hardware's 16-bit transfer counter, or when it is not a multiple of
    /// either side's element width. Building a descriptor touches no
    /// hardware.
    pub fn new(
        source: *const (),
        destination: *mut (),
        nbytes: usize,
        config: TransferConfig,
    ) -> Result<Self> {
        if nbytes > u16::MAX as usize {
            return Err(Error::InvalidArgument);
        }
        if nbytes % config.src_width.bytes() != 0 || nbytes % config.dst_width.bytes() != 0 {
            return Err(Error::InvalidArgument);
        }
        Ok(Descriptor {
            source,
            destination,
            nbytes: nbytes as u16,
            config,
        })
    }

    /// The transfer length in bytes
    pub fn len(&self) -> usize {
        self.nbytes as usize
    }

    /// `true` when the descriptor moves no data
    pub fn is_empty(&self) -> bool {
        self.nbytes == 0
    }

    /// Number of elements the hardware counter is programmed with
    ///
    /// The counter counts accesses on the peripheral-facing side of the
    /// channel; memory-to-memory runs count in source elements.
    pub fn element_count(&self, direction: Direction) -> usize {
        let width = match direction {
            Direction::PeripheralToMemory | Direction::MemoryToMemory => self.config.src_width,
            Direction::MemoryToPeripheral => self.config.dst_width,
        };
        self.nbytes as usize / width.bytes()
    }
}
