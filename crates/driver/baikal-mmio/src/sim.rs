//! In-memory register bank for driver tests.

use alloc::collections::{BTreeMap, VecDeque};
use alloc::vec::Vec;
use core::cell::RefCell;

use crate::register::{Register, RegisterIo};

#[derive(Default)]
struct State {
    values: BTreeMap<usize, u32>,
    pending_reads: BTreeMap<usize, VecDeque<u32>>,
    writes: Vec<(usize, u32)>,
}

/// A register block backed by memory.
///
/// Unwritten registers read as zero. Reads of a register with queued values
/// pop the queue first, which is how tests model FIFOs and status bits that
/// change between polls. Every write is logged.
#[derive(Default)]
pub struct RegisterFile {
    state: RefCell<State>,
}

impl RegisterFile {
    /// Creates an all-zero bank.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the value a register reads as, without logging a write.
    pub fn preset(&self, reg: Register, value: u32) {
        self.state.borrow_mut().values.insert(reg.offset, value);
    }

    /// Queues values returned by successive reads of `reg` before it falls
    /// back to its stored value.
    pub fn queue_reads(&self, reg: Register, values: &[u32]) {
        self.state
            .borrow_mut()
            .pending_reads
            .entry(reg.offset)
            .or_default()
            .extend(values.iter().copied());
    }

    /// The current stored value of `reg`.
    #[must_use]
    pub fn value(&self, reg: Register) -> u32 {
        self.state.borrow().values.get(&reg.offset).copied().unwrap_or(0)
    }

    /// Every value written to `reg`, oldest first.
    #[must_use]
    pub fn writes_to(&self, reg: Register) -> Vec<u32> {
        self.state
            .borrow()
            .writes
            .iter()
            .filter(|(offset, _)| *offset == reg.offset)
            .map(|(_, value)| *value)
            .collect()
    }

    /// Number of writes logged across all registers.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.borrow().writes.len()
    }
}

impl RegisterIo for RegisterFile {
    fn read32(&self, reg: Register) -> u32 {
        let mut state = self.state.borrow_mut();
        if let Some(value) = state
            .pending_reads
            .get_mut(&reg.offset)
            .and_then(VecDeque::pop_front)
        {
            return value;
        }
        state.values.get(&reg.offset).copied().unwrap_or(0)
    }

    fn write32(&self, reg: Register, value: u32) {
        let mut state = self.state.borrow_mut();
        state.values.insert(reg.offset, value);
        state.writes.push((reg.offset, value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: Register = Register::new(0x0, "A");
    const B: Register = Register::new(0x4, "B");

    #[test]
    fn queued_reads_drain_before_stored_value() {
        let regs = RegisterFile::new();
        regs.preset(A, 7);
        regs.queue_reads(A, &[1, 2]);
        assert_eq!(regs.read32(A), 1);
        assert_eq!(regs.read32(A), 2);
        assert_eq!(regs.read32(A), 7);
        assert_eq!(regs.write_count(), 0);
    }

    #[test]
    fn writes_are_logged_per_register() {
        let regs = RegisterFile::new();
        regs.write32(A, 1);
        regs.write32(B, 2);
        regs.write32(A, 3);
        assert_eq!(regs.writes_to(A), [1, 3]);
        assert_eq!(regs.value(B), 2);
    }
}
