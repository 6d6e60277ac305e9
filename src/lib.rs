//! DMA-driven SPI master transfer engine for ZLG1xx microcontrollers
//!
//! `zlg-spi-dma` provides
//!
//! - a DMA channel manager with per-channel completion callbacks and a
//!   shared interrupt entry point
//! - an SPI master engine that queues messages of transfers and moves the
//!   data with paired receive / transmit DMA channels
//! - an unsafe API for describing transfer buffers, with safety contracts
//!   documented on each constructor
//!
//! This driver may be re-exported from a board support package. If it is,
//! you should consider using the safer APIs provided by your board layer.
//!
//! # Getting started
//!
//! To allocate the DMA manager, you need the location of the DMA controller
//! registers and the number of channels supported by your chip. Assign a
//! [`Dma`] to a `static`, then hand it to the SPI peripheral:
//!
//! ```no_run
//! use zlg_spi_dma::{Dma, SpiMaster, peripheral::SpiPeriph};
//! # const DMA_PTR: *const () = core::ptr::null();
//! # const SPI_PTR: *const () = core::ptr::null();
//!
//! // Safety: address and channel count are valid for this target.
//! static DMA: Dma<5> = unsafe { Dma::new(DMA_PTR) };
//!
//! // Safety: register address, channel indices, and clock rate are valid.
//! let bus = unsafe { SpiPeriph::new(SPI_PTR, &DMA, 2, 3, 72_000_000) };
//! let spi: SpiMaster<_, 8> = SpiMaster::new(bus);
//! ```
//!
//! Register a device with [`SpiMaster::setup`], then build a [`Message`]
//! of [`Transfer`]s and hand it to [`SpiMaster::submit`]. The engine never
//! blocks; completion is delivered through the message's callback, which
//! runs from interrupt context. See [`SpiMaster`] for the interrupt wiring
//! that drives the engine.
//!
//! # Portability
//!
//! The engine itself is hardware-agnostic: it drives any implementation of
//! the [`Bus`] trait. The [`peripheral`] module provides the implementation
//! for the ZLG1xx SPI controller and its single-buffer DMA channels. You
//! must make sure the channel count you configure is valid for your chip.
//!
//! ### License
//!
//! Licensed under either of
//!
//! - [Apache License, Version 2.0](http://www.apache.org/licenses/LICENSE-2.0) ([LICENSE-APACHE](./LICENSE-APACHE))
//! - [MIT License](http://opensource.org/licenses/MIT) ([LICENSE-MIT](./LICENSE-MIT))
//!
//! at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted
//! for inclusion in the work by you, as defined in the Apache-2.0 license, shall be
//! dual licensed as above, without any additional terms or conditions.

#![cfg_attr(not(test), no_std)]

mod fmt;

mod bus;
mod descriptor;
mod device;
mod dma;
mod element;
mod error;
mod master;
mod message;
pub mod peripheral;
mod ral;
mod select;

pub use bus::{Bus, BusConfig, SamplePoint};
pub use descriptor::{Descriptor, Direction, Priority, TransferConfig, Width};
pub use device::{BitOrder, DeviceConfig, DeviceId};
pub use dma::{ChannelIsr, Completion, Dma};
pub use element::Element;
pub use error::Error;
pub use master::{SpiMaster, MAX_DEVICES};
pub use message::{CompletionHandler, Message, MessageStatus, Transfer, MAX_TRANSFERS};

pub use embedded_hal::spi::{Mode, Phase, Polarity, MODE_0, MODE_1, MODE_2, MODE_3};

/// A driver result
pub type Result<T> = core::result::Result<T, Error>;
