//! I2C EEPROMs: 24Cxx-style parts holding FRU data, and DDR4 SPD EEPROMs
//! (EE1004) that expose 512 bytes as two 256-byte pages.

use crate::i2c::{I2cBus, I2cError};

/// Largest read issued as a single bus transaction.
const CHUNK: usize = 32;

/// EE1004 set-page-0 address.
pub const SPA0: u16 = 0x36;
/// EE1004 set-page-1 address.
pub const SPA1: u16 = 0x37;
/// Bus address of the SPD EEPROM on DIMM slot 0.
pub const SPD_BASE: u16 = 0x50;
/// Size of a DDR4 SPD EEPROM.
pub const SPD_SIZE: usize = 512;

/// A 24Cxx EEPROM with a one-byte word address.
///
/// Parts larger than 256 bytes take the high offset bits in the low bits of
/// the device address, so one part answers at several consecutive addresses.
pub struct Eeprom<B: I2cBus> {
    bus: B,
    addr: u16,
}

impl<B: I2cBus> Eeprom<B> {
    /// An EEPROM at 7-bit address `addr`.
    pub const fn new(bus: B, addr: u16) -> Self {
        Self { bus, addr }
    }

    /// Gives the bus back.
    pub fn into_inner(self) -> B {
        self.bus
    }

    /// Reads `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// [`I2cError`] from the bus; the part may be absent.
    pub fn read(&mut self, offset: usize, buf: &mut [u8]) -> Result<(), I2cError> {
        let mut pos = offset;
        for chunk in buf.chunks_mut(CHUNK) {
            // A chunk must not straddle a 256-byte block.
            let mut done = 0;
            while done < chunk.len() {
                let block_left = 0x100 - (pos & 0xFF);
                let len = block_left.min(chunk.len() - done);
                let addr = self.addr + u16::try_from(pos >> 8).map_err(|_| {
                    I2cError::InvalidAddress(u16::MAX)
                })?;
                self.bus
                    .transfer(addr, &[(pos & 0xFF) as u8], &mut chunk[done..done + len])?;
                pos += len;
                done += len;
            }
        }
        Ok(())
    }
}

/// Reads the full SPD EEPROM of DIMM `slot` (0..=7).
///
/// The page is switched through the EE1004 page-select addresses and left
/// at page 0 afterwards, also on error where the bus allows.
///
/// # Errors
///
/// [`I2cError::InvalidAddress`] for a slot above 7, else bus errors. An
/// empty slot shows up as an address NACK.
pub fn read_spd<B: I2cBus>(bus: &mut B, slot: u8) -> Result<[u8; SPD_SIZE], I2cError> {
    if slot > 7 {
        return Err(I2cError::InvalidAddress(SPD_BASE + u16::from(slot)));
    }
    let addr = SPD_BASE + u16::from(slot);
    let mut spd = [0u8; SPD_SIZE];
    let (low, high) = spd.split_at_mut(SPD_SIZE / 2);

    select_page(bus, 0)?;
    Eeprom::new(&mut *bus, addr).read(0, low)?;
    select_page(bus, 1)?;
    let result = Eeprom::new(&mut *bus, addr).read(0, high);
    select_page(bus, 0)?;
    result?;

    log::debug!("spd: read slot {slot} at {addr:#x}");
    Ok(spd)
}

fn select_page<B: I2cBus>(bus: &mut B, page: u8) -> Result<(), I2cError> {
    let spa = if page == 0 { SPA0 } else { SPA1 };
    bus.write(spa, &[0])
}
