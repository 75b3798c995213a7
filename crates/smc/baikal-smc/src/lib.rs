//! Client side of the Baikal TF-A secure-monitor flash service.
//!
//! Boot flash on BM1000/BS1000 boards is owned by the secure world. The
//! normal world reaches it only through a handful of SMC function ids that
//! move data through a 1024-byte staging window, 32 bytes per call.
//!
//! - [`abi`] - function ids, window geometry and return-code handling
//! - [`conduit`] - the [`SmcConduit`] world-switch seam and the real `smc #0`
//! - [`flash`] - [`SmcFlash`], the chunked read/write/erase client
//! - [`emulator`] - a host-side stand-in for the TF-A flash service

#![no_std]

extern crate alloc;

pub mod abi;
pub mod conduit;
pub mod emulator;
pub mod flash;

pub use abi::SmcError;
pub use conduit::SmcConduit;
pub use emulator::FlashEmulator;
pub use flash::{FlashInfo, SmcFlash};
