//! The memory reservation map at the front of the blob.

use core::slice::ChunksExact;

/// Each entry is a big-endian `(address, size)` pair.
const ENTRY_LEN: usize = 16;

/// A physical range the OS must leave alone, such as secure firmware.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    pub address: u64,
    pub size: u64,
}

/// Entries of the reservation map up to the all-zero terminator.
pub struct Reservations<'a> {
    entries: ChunksExact<'a, u8>,
}

impl<'a> Reservations<'a> {
    pub(crate) fn new(map: &'a [u8]) -> Self {
        Self {
            entries: map.chunks_exact(ENTRY_LEN),
        }
    }
}

impl Iterator for Reservations<'_> {
    type Item = Reservation;

    fn next(&mut self) -> Option<Reservation> {
        let (address, size) = self.entries.next()?.split_at(8);
        let entry = Reservation {
            address: u64::from_be_bytes(address.try_into().ok()?),
            size: u64::from_be_bytes(size.try_into().ok()?),
        };
        if entry.address == 0 && entry.size == 0 {
            self.entries = <&[u8]>::default().chunks_exact(ENTRY_LEN);
            return None;
        }
        Some(entry)
    }
}
