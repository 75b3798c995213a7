//! Flash storage for Baikal boards.
//!
//! Every flash backend on these boards (the secure-monitor flash service,
//! the SPI NOR behind the eSPI controller) shares one shape: sector-granular
//! erase, program-only-clears-bits writes, and a write-protect latch. This
//! crate captures that shape as [`FlashDevice`] and builds on top of it:
//!
//! - [`device`] - the [`FlashDevice`] trait and its SMC implementation
//! - [`update`] - lock bracketing and read-modify-erase-write
//! - [`layout`] - the persisted [`FlashMap`]
//! - [`ddr`] - per-port [`DdrSettings`] records stored in flash
//! - [`block_io`] - [`FlashBlockIo`], a flash region exposed as a block device

#![no_std]

extern crate alloc;

pub mod block_io;
pub mod ddr;
pub mod device;
pub mod layout;
pub mod update;

pub use block_io::{BlockIoConfig, FlashBlockIo};
pub use ddr::DdrSettings;
pub use device::{FlashDevice, FlashError, FlashGeometry};
pub use layout::{FlashMap, Region};
pub use update::{erase_window, update_region, with_unlocked};
