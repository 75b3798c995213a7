//! Register descriptors and 32-bit access.

use core::fmt;

/// A 32-bit device register: a byte offset from the block base and a name
/// for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Register {
    /// Byte offset from the register block base.
    pub offset: usize,
    /// Datasheet name.
    pub name: &'static str,
}

impl Register {
    /// Declares a register.
    #[must_use]
    pub const fn new(offset: usize, name: &'static str) -> Self {
        Self { offset, name }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#x}", self.name, self.offset)
    }
}

/// Word-wide access to a register block.
///
/// Access goes through `&self`: the hardware, not the borrow checker, owns
/// the register state.
pub trait RegisterIo {
    /// Reads a register.
    fn read32(&self, reg: Register) -> u32;

    /// Writes a register.
    fn write32(&self, reg: Register, value: u32);

    /// Read-modify-write: clears `clear`, then sets `set`.
    fn modify32(&self, reg: Register, clear: u32, set: u32) {
        let value = self.read32(reg);
        self.write32(reg, (value & !clear) | set);
    }

    /// Sets the bits in `mask`.
    fn set_bits(&self, reg: Register, mask: u32) {
        self.modify32(reg, 0, mask);
    }

    /// Clears the bits in `mask`.
    fn clear_bits(&self, reg: Register, mask: u32) {
        self.modify32(reg, mask, 0);
    }
}

impl<T: RegisterIo + ?Sized> RegisterIo for &T {
    fn read32(&self, reg: Register) -> u32 {
        (**self).read32(reg)
    }

    fn write32(&self, reg: Register, value: u32) {
        (**self).write32(reg, value);
    }
}

/// Volatile access to a memory-mapped register block.
#[derive(Debug)]
pub struct Mmio {
    base: usize,
}

impl Mmio {
    /// Creates an accessor for the block at `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to a valid, mapped MMIO region covering every
    /// register the driver using it declares, and nothing else may alias it
    /// with conflicting accesses.
    #[must_use]
    pub const unsafe fn new(base: usize) -> Self {
        Self { base }
    }

    /// Returns the base address.
    #[must_use]
    pub const fn base(&self) -> usize {
        self.base
    }
}

impl RegisterIo for Mmio {
    #[inline]
    fn read32(&self, reg: Register) -> u32 {
        // SAFETY: Caller of `new` guarantees base points to a valid MMIO region.
        unsafe { core::ptr::read_volatile((self.base + reg.offset) as *const u32) }
    }

    #[inline]
    fn write32(&self, reg: Register, value: u32) {
        // SAFETY: Caller of `new` guarantees base points to a valid MMIO region.
        unsafe { core::ptr::write_volatile((self.base + reg.offset) as *mut u32, value) }
    }
}

/// Extracts the field selected by `mask`, shifted down to bit 0.
#[must_use]
pub const fn field_get(value: u32, mask: u32) -> u32 {
    (value & mask) >> mask.trailing_zeros()
}

/// Replaces the field selected by `mask` with `field`.
///
/// Bits of `field` that do not fit the mask are dropped.
#[must_use]
pub const fn field_set(value: u32, mask: u32, field: u32) -> u32 {
    (value & !mask) | ((field << mask.trailing_zeros()) & mask)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::RegisterFile;

    const CTRL: Register = Register::new(0x08, "CTRL");

    #[test]
    fn fields() {
        assert_eq!(field_get(0xABCD_1234, 0x0000_FF00), 0x12);
        assert_eq!(field_set(0xFFFF_FFFF, 0x0000_0F00, 0x3), 0xFFFF_F3FF);
        assert_eq!(field_set(0, 0x0000_0030, 0xFF), 0x30);
    }

    #[test]
    fn modify_preserves_other_bits() {
        let regs = RegisterFile::new();
        regs.write32(CTRL, 0xF0F0);
        regs.modify32(CTRL, 0x00F0, 0x000F);
        assert_eq!(regs.read32(CTRL), 0xF00F);
        regs.set_bits(CTRL, 0x0100);
        regs.clear_bits(CTRL, 0xF000);
        assert_eq!(regs.read32(CTRL), 0x010F);
    }

    #[test]
    fn display_names_register() {
        extern crate alloc;
        assert_eq!(alloc::format!("{CTRL}"), "CTRL@0x8");
    }
}
