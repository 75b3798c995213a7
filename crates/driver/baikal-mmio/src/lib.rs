//! Register access for Baikal SoC peripherals.
//!
//! Drivers never map hardware structs onto MMIO. Each device declares a table
//! of [`Register`] constants (offset plus name) and touches them through a
//! [`RegisterIo`] implementation, reading and writing whole 32-bit words and
//! extracting fields with explicit masks. The real implementation is
//! [`Mmio`]; tests substitute a [`RegisterFile`].
//!
//! - [`register`] - [`Register`], [`RegisterIo`], [`Mmio`] and field helpers
//! - [`poll`] - [`Delay`] and the bounded [`poll_until`] loop
//! - [`sim`] - [`RegisterFile`], an in-memory register bank for tests

#![no_std]

extern crate alloc;

pub mod poll;
pub mod register;
pub mod sim;

pub use poll::{Delay, NoDelay, Timeout, poll_until};
pub use register::{Mmio, Register, RegisterIo, field_get, field_set};
pub use sim::RegisterFile;
