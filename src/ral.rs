//! Register blocks for the ZLG1xx SPI and DMA controllers
//!
//! Hand-written blocks in the style of a register access layer. Only the
//! registers this driver touches are represented; reserved space keeps the
//! offsets correct.

#![allow(non_snake_case, unused)]

use ral_registers::{RORegister, RWRegister, WORegister};

/// A pointer to peripheral memory that derefs like a static borrow
pub(crate) struct Static<T>(pub(crate) *const T);

impl<T> core::ops::Deref for Static<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // Safety: pointer points to static memory (peripheral memory)
        unsafe { &*self.0 }
    }
}

impl<T> Clone for Static<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Static<T> {}

pub(crate) mod dma {
    use super::{RORegister, RWRegister, WORegister};

    /// One DMA channel's register cluster
    #[repr(C)]
    pub struct ChannelRegisters {
        /// Channel configuration
        pub CCR: RWRegister<u32>,
        /// Number of elements left to transfer
        pub CNDTR: RWRegister<u32>,
        /// Peripheral address
        pub CPAR: RWRegister<u32>,
        /// Memory address
        pub CMAR: RWRegister<u32>,
        _reserved: [u32; 1],
    }

    impl ChannelRegisters {
        pub const EN: u32 = 1 << 0;
        pub const TCIE: u32 = 1 << 1;
        pub const HTIE: u32 = 1 << 2;
        pub const TEIE: u32 = 1 << 3;
        /// Read from memory (memory-to-peripheral)
        pub const DIR: u32 = 1 << 4;
        pub const CIRC: u32 = 1 << 5;
        pub const PINC: u32 = 1 << 6;
        pub const MINC: u32 = 1 << 7;
        pub const PSIZE_SHIFT: u32 = 8;
        pub const MSIZE_SHIFT: u32 = 10;
        pub const PL_SHIFT: u32 = 12;
        pub const MEM2MEM: u32 = 1 << 14;
    }

    /// DMA controller registers
    ///
    /// The flag registers pack one nibble per channel; the cluster array
    /// covers the eight channels of the largest family member.
    #[repr(C)]
    pub struct RegisterBlock {
        /// Interrupt status, one nibble per channel
        pub ISR: RORegister<u32>,
        /// Interrupt flag clear, write-one-to-clear
        pub IFCR: WORegister<u32>,
        /// Per-channel register clusters
        pub CH: [ChannelRegisters; 8],
    }

    impl RegisterBlock {
        /// Global event flag, per-channel nibble
        pub const GIF: u32 = 1 << 0;
        /// Transfer complete flag
        pub const TCIF: u32 = 1 << 1;
        /// Half transfer flag
        pub const HTIF: u32 = 1 << 2;
        /// Transfer error flag
        pub const TEIF: u32 = 1 << 3;

        /// Shift that positions a channel's flag nibble
        pub const fn flag_shift(channel: usize) -> u32 {
            (channel as u32) * 4
        }
    }
}

pub(crate) mod spi {
    use super::RWRegister;

    /// SPI controller registers
    #[repr(C)]
    pub struct RegisterBlock {
        /// Control register 1: mode, ordering, divider, enable
        pub CR1: RWRegister<u32>,
        /// Control register 2: word size, DMA requests, sampling
        pub CR2: RWRegister<u32>,
        /// Status register
        pub SR: RWRegister<u32>,
        /// Data register, DMA request source and sink
        pub DR: RWRegister<u32>,
    }

    impl RegisterBlock {
        pub const CPHA: u32 = 1 << 0;
        pub const CPOL: u32 = 1 << 1;
        pub const MSTR: u32 = 1 << 2;
        /// Divider exponent field, divider = 2^(BAUD + 1)
        pub const BAUD_SHIFT: u32 = 3;
        pub const SPE: u32 = 1 << 7;
        pub const LSBFIRST: u32 = 1 << 8;

        /// Word size field, value is bits-per-word minus one
        pub const DS_SHIFT: u32 = 0;
        pub const TXDMAEN: u32 = 1 << 8;
        pub const RXDMAEN: u32 = 1 << 9;
        /// Sample on the first clock edge instead of mid-bit
        pub const SAMPLE_FIRST: u32 = 1 << 10;
        /// Interrupt when the shift register drains
        pub const TCIE: u32 = 1 << 11;

        pub const BSY: u32 = 1 << 0;
        /// Shift register drained, write zero to clear
        pub const TC: u32 = 1 << 1;
    }
}
