//! UEFI types shared by the Baikal board-support crates.
//!
//! The firmware side of this BSP runs inside EDK II, so every fallible
//! operation ultimately reports an `EFI_STATUS`. This crate carries that
//! status type and the block I/O model the flash wrappers expose:
//!
//! - [`status`] - [`EfiStatus`] with the codes used across the BSP
//! - [`block_io`] - [`BlockIoMedia`] and the [`BlockIo`] trait that stands in
//!   for `EFI_BLOCK_IO_PROTOCOL`

#![no_std]

pub mod block_io;
pub mod status;

pub use block_io::{BlockIo, BlockIoMedia};
pub use status::EfiStatus;
