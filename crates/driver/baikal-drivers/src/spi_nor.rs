//! JEDEC SPI NOR flash over any [`SpiBus`].
//!
//! Parts larger than 16 MiB are driven with the dedicated 4-byte-address
//! opcodes rather than by switching the part into 4-byte mode, so a warm
//! reset never leaves the boot ROM facing an unexpected address width.

use baikal_flash::{FlashDevice, FlashError, FlashGeometry};
use baikal_mmio::{Delay, poll_until};
use bitflags::bitflags;

use crate::spi::{SpiBus, SpiError};

// ---------------------------------------------------------------------------
// Opcodes
// ---------------------------------------------------------------------------

/// JEDEC command opcodes.
pub mod op {
    /// Read JEDEC identification.
    pub const RDID: u8 = 0x9F;
    /// Read status register.
    pub const RDSR: u8 = 0x05;
    /// Write status register.
    pub const WRSR: u8 = 0x01;
    /// Write enable.
    pub const WREN: u8 = 0x06;
    /// Read data, 3-byte address.
    pub const READ: u8 = 0x03;
    /// Read data, 4-byte address.
    pub const READ4: u8 = 0x13;
    /// Page program, 3-byte address.
    pub const PP: u8 = 0x02;
    /// Page program, 4-byte address.
    pub const PP4: u8 = 0x12;
    /// 4 KiB sector erase, 3-byte address.
    pub const SE: u8 = 0x20;
    /// 4 KiB sector erase, 4-byte address.
    pub const SE4: u8 = 0x21;
    /// 64 KiB block erase, 3-byte address.
    pub const BE: u8 = 0xD8;
    /// 64 KiB block erase, 4-byte address.
    pub const BE4: u8 = 0xDC;
}

bitflags! {
    /// Status register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sr: u8 {
        /// Write in progress.
        const WIP   = 1 << 0;
        /// Write enable latch.
        const WEL   = 1 << 1;
        /// Block protect bit 0.
        const BP0   = 1 << 2;
        /// Block protect bit 1.
        const BP1   = 1 << 3;
        /// Block protect bit 2.
        const BP2   = 1 << 4;
        /// Block protect bit 3.
        const BP3   = 1 << 5;
        /// Status register write disable.
        const SRWD  = 1 << 7;

        /// All block-protect bits: the whole array is protected.
        const BP_ALL = Self::BP0.bits() | Self::BP1.bits() | Self::BP2.bits() | Self::BP3.bits();
    }
}

/// Program page size.
pub const PAGE_SIZE: usize = 256;
/// Small erase granularity.
pub const SECTOR_SIZE: u64 = 4 * 1024;
/// Large erase granularity.
pub const BLOCK_SIZE: u64 = 64 * 1024;

const THREE_BYTE_LIMIT: u64 = 16 << 20;

// WIP polling budgets: page program is sub-millisecond, block erase can
// take seconds.
const PROGRAM_POLL_ATTEMPTS: u32 = 10_000;
const ERASE_POLL_ATTEMPTS: u32 = 400_000;
const POLL_INTERVAL_US: u32 = 10;

/// Identification returned by `RDID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JedecId {
    /// JEDEC manufacturer code.
    pub manufacturer: u8,
    /// Vendor memory type.
    pub memory_type: u8,
    /// Capacity code: the part holds `1 << capacity` bytes.
    pub capacity: u8,
}

impl JedecId {
    /// Size of the part in bytes, if the capacity code is plausible.
    #[must_use]
    pub fn size(&self) -> Option<u64> {
        match self.capacity {
            0x10..=0x21 => Some(1 << self.capacity),
            _ => None,
        }
    }
}

/// A SPI NOR part on one chip select of a bus.
pub struct SpiNor<B: SpiBus, D: Delay> {
    bus: B,
    cs: u8,
    delay: D,
    id: JedecId,
    geometry: FlashGeometry,
}

impl<B: SpiBus, D: Delay> SpiNor<B, D> {
    /// Identifies the part on `cs` and derives its geometry.
    ///
    /// # Errors
    ///
    /// [`FlashError::Device`] if nothing answers or the capacity is not
    /// understood; bus errors otherwise.
    pub fn probe(mut bus: B, cs: u8, delay: D) -> Result<Self, FlashError> {
        let mut raw = [0u8; 3];
        bus.transfer(cs, &[op::RDID], &mut raw)?;
        let id = JedecId {
            manufacturer: raw[0],
            memory_type: raw[1],
            capacity: raw[2],
        };
        if matches!(id.manufacturer, 0x00 | 0xFF) {
            log::warn!("spi-nor: no part on cs{cs}");
            return Err(FlashError::Device);
        }
        let size = id.size().ok_or_else(|| {
            log::warn!("spi-nor: unknown capacity code {:#x}", id.capacity);
            FlashError::Device
        })?;
        let geometry = FlashGeometry {
            sector_size: SECTOR_SIZE,
            sector_count: size / SECTOR_SIZE,
        };
        log::info!(
            "spi-nor: cs{cs} id {:02x}{:02x}{:02x}, {} KiB",
            id.manufacturer,
            id.memory_type,
            id.capacity,
            size / 1024
        );
        Ok(Self {
            bus,
            cs,
            delay,
            id,
            geometry,
        })
    }

    /// The identification read at probe time.
    #[must_use]
    pub fn id(&self) -> JedecId {
        self.id
    }

    /// Returns the underlying bus.
    pub fn into_inner(self) -> B {
        self.bus
    }

    fn four_byte(&self) -> bool {
        self.geometry.size() > THREE_BYTE_LIMIT
    }

    /// Builds `opcode` + address into `frame`, returning the header length.
    fn header(&self, frame: &mut [u8], op3: u8, op4: u8, addr: u64) -> usize {
        let be = addr.to_be_bytes();
        if self.four_byte() {
            frame[0] = op4;
            frame[1..5].copy_from_slice(&be[4..]);
            5
        } else {
            frame[0] = op3;
            frame[1..4].copy_from_slice(&be[5..]);
            4
        }
    }

    /// Reads the status register.
    ///
    /// # Errors
    ///
    /// Bus errors.
    pub fn status(&mut self) -> Result<Sr, SpiError> {
        let mut sr = [0u8; 1];
        self.bus.transfer(self.cs, &[op::RDSR], &mut sr)?;
        Ok(Sr::from_bits_retain(sr[0]))
    }

    fn write_enable(&mut self) -> Result<(), SpiError> {
        self.bus.transfer(self.cs, &[op::WREN], &mut [])
    }

    fn wait_ready(&mut self, attempts: u32) -> Result<(), FlashError> {
        let mut bus_error = None;
        let (bus, cs) = (&mut self.bus, self.cs);
        let outcome = poll_until(&mut self.delay, attempts, POLL_INTERVAL_US, || {
            let mut sr = [0u8; 1];
            match bus.transfer(cs, &[op::RDSR], &mut sr) {
                Ok(()) => !Sr::from_bits_retain(sr[0]).contains(Sr::WIP),
                Err(err) => {
                    bus_error = Some(err);
                    true
                }
            }
        });
        if let Some(err) = bus_error {
            return Err(err.into());
        }
        outcome.map_err(|_| {
            log::error!("spi-nor: write in progress never cleared");
            FlashError::Timeout
        })
    }

    fn program_page(&mut self, addr: u64, data: &[u8]) -> Result<(), FlashError> {
        let mut frame = [0u8; 5 + PAGE_SIZE];
        let n = self.header(&mut frame, op::PP, op::PP4, addr);
        frame[n..n + data.len()].copy_from_slice(data);
        self.write_enable()?;
        self.bus.transfer(self.cs, &frame[..n + data.len()], &mut [])?;
        self.wait_ready(PROGRAM_POLL_ATTEMPTS)
    }

    fn erase_unit(&mut self, addr: u64, large: bool) -> Result<(), FlashError> {
        let mut frame = [0u8; 5];
        let n = if large {
            self.header(&mut frame, op::BE, op::BE4, addr)
        } else {
            self.header(&mut frame, op::SE, op::SE4, addr)
        };
        self.write_enable()?;
        self.bus.transfer(self.cs, &frame[..n], &mut [])?;
        self.wait_ready(ERASE_POLL_ATTEMPTS)
    }
}

impl<B: SpiBus, D: Delay> FlashDevice for SpiNor<B, D> {
    fn geometry(&mut self) -> Result<FlashGeometry, FlashError> {
        Ok(self.geometry)
    }

    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), FlashError> {
        if buf.is_empty() {
            return Ok(());
        }
        self.geometry.check_range(addr, buf.len() as u64)?;
        let mut frame = [0u8; 5];
        let n = self.header(&mut frame, op::READ, op::READ4, addr);
        self.bus.transfer(self.cs, &frame[..n], buf)?;
        Ok(())
    }

    fn write(&mut self, addr: u64, buf: &[u8]) -> Result<(), FlashError> {
        self.geometry.check_range(addr, buf.len() as u64)?;
        let mut addr = addr;
        let mut rest = buf;
        while !rest.is_empty() {
            // A page program wraps at the page boundary, so never cross one.
            let room = PAGE_SIZE - (addr as usize % PAGE_SIZE);
            let (page, tail) = rest.split_at(room.min(rest.len()));
            self.program_page(addr, page)?;
            addr += page.len() as u64;
            rest = tail;
        }
        Ok(())
    }

    fn erase(&mut self, addr: u64, len: u64) -> Result<(), FlashError> {
        if addr % SECTOR_SIZE != 0 || len % SECTOR_SIZE != 0 {
            return Err(FlashError::Unaligned);
        }
        self.geometry.check_range(addr, len)?;
        let end = addr + len;
        let mut addr = addr;
        while addr < end {
            let large = addr % BLOCK_SIZE == 0 && end - addr >= BLOCK_SIZE;
            self.erase_unit(addr, large)?;
            addr += if large { BLOCK_SIZE } else { SECTOR_SIZE };
        }
        Ok(())
    }

    fn set_locked(&mut self, locked: bool) -> Result<(), FlashError> {
        let sr = self.status()?;
        let wanted = if locked {
            sr | Sr::BP_ALL
        } else {
            sr - Sr::BP_ALL
        };
        let wanted = wanted - (Sr::WIP | Sr::WEL);
        log::debug!("spi-nor {}", if locked { "lock" } else { "unlock" });
        self.write_enable()?;
        self.bus.transfer(self.cs, &[op::WRSR, wanted.bits()], &mut [])?;
        self.wait_ready(PROGRAM_POLL_ATTEMPTS)?;
        if self.status()? & Sr::BP_ALL != wanted & Sr::BP_ALL {
            log::error!("spi-nor: block-protect bits did not latch");
            return Err(FlashError::Device);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;
    use alloc::vec::Vec;
    use baikal_flash::{update_region, with_unlocked};
    use baikal_mmio::NoDelay;

    /// A NOR part behind a bus: decodes opcodes the way the silicon does.
    struct NorModel {
        id: [u8; 3],
        array: Vec<u8>,
        sr: u8,
        wel: bool,
        commands: Vec<u8>,
    }

    impl NorModel {
        fn new(capacity: u8) -> Self {
            Self {
                id: [0xEF, 0x40, capacity],
                array: vec![0xFF; 1 << capacity],
                sr: Sr::BP_ALL.bits(),
                wel: false,
                commands: Vec::new(),
            }
        }

        fn protected(&self) -> bool {
            self.sr & Sr::BP_ALL.bits() != 0
        }

        fn addr(&self, tx: &[u8]) -> (usize, usize) {
            if self.array.len() > (16 << 20) {
                (u32::from_be_bytes([tx[1], tx[2], tx[3], tx[4]]) as usize, 5)
            } else {
                (u32::from_be_bytes([0, tx[1], tx[2], tx[3]]) as usize, 4)
            }
        }
    }

    impl SpiBus for NorModel {
        fn transfer(&mut self, cs: u8, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
            assert_eq!(cs, 0);
            self.commands.push(tx[0]);
            match tx[0] {
                op::RDID => rx.copy_from_slice(&self.id[..rx.len()]),
                op::RDSR => rx[0] = self.sr | if self.wel { Sr::WEL.bits() } else { 0 },
                op::WREN => self.wel = true,
                op::WRSR => {
                    if self.wel {
                        self.sr = tx[1];
                    }
                    self.wel = false;
                }
                op::READ | op::READ4 => {
                    let (a, _) = self.addr(tx);
                    rx.copy_from_slice(&self.array[a..a + rx.len()]);
                }
                op::PP | op::PP4 => {
                    let (a, n) = self.addr(tx);
                    let data = &tx[n..];
                    assert!(data.len() <= PAGE_SIZE);
                    assert!(a / PAGE_SIZE == (a + data.len() - 1) / PAGE_SIZE);
                    if self.wel && !self.protected() {
                        for (d, s) in self.array[a..a + data.len()].iter_mut().zip(data) {
                            *d &= *s;
                        }
                    }
                    self.wel = false;
                }
                op::SE | op::SE4 | op::BE | op::BE4 => {
                    let (a, _) = self.addr(tx);
                    let unit = if matches!(tx[0], op::BE | op::BE4) { 65536 } else { 4096 };
                    if self.wel && !self.protected() {
                        self.array[a..a + unit].fill(0xFF);
                    }
                    self.wel = false;
                }
                other => panic!("unexpected opcode {other:#x}"),
            }
            Ok(())
        }
    }

    fn probe(capacity: u8) -> SpiNor<NorModel, NoDelay> {
        SpiNor::probe(NorModel::new(capacity), 0, NoDelay).unwrap()
    }

    #[test]
    fn probe_reads_geometry() {
        let mut nor = probe(0x18);
        let geometry = nor.geometry().unwrap();
        assert_eq!(geometry.size(), 16 << 20);
        assert_eq!(geometry.sector_size, 4096);
        assert_eq!(nor.id().manufacturer, 0xEF);
    }

    #[test]
    fn absent_part_is_a_device_error() {
        let mut model = NorModel::new(0x14);
        model.id = [0xFF; 3];
        assert_eq!(SpiNor::probe(model, 0, NoDelay).err(), Some(FlashError::Device));
    }

    #[test]
    fn page_programs_split_on_boundaries() {
        let mut nor = probe(0x14);
        nor.set_locked(false).unwrap();
        let data: Vec<u8> = (0..600).map(|i| i as u8).collect();
        nor.write(200, &data).unwrap();

        let model = nor.into_inner();
        let programs = model.commands.iter().filter(|&&c| c == op::PP).count();
        assert_eq!(programs, 4);
        assert_eq!(&model.array[200..800], &data[..]);
    }

    #[test]
    fn erase_prefers_large_blocks() {
        let mut nor = probe(0x14);
        nor.set_locked(false).unwrap();
        nor.erase(0xF000, 0x1_2000).unwrap();
        let model = nor.into_inner();
        let erases: Vec<u8> = model
            .commands
            .iter()
            .copied()
            .filter(|c| matches!(*c, op::SE | op::BE))
            .collect();
        assert_eq!(erases, [op::SE, op::BE, op::SE]);
    }

    #[test]
    fn unaligned_erase_is_rejected() {
        let mut nor = probe(0x14);
        assert_eq!(nor.erase(0x100, 0x1000), Err(FlashError::Unaligned));
    }

    #[test]
    fn lock_sets_block_protect_bits() {
        let mut nor = probe(0x14);
        nor.set_locked(false).unwrap();
        assert!(!nor.status().unwrap().intersects(Sr::BP_ALL));
        nor.set_locked(true).unwrap();
        assert!(nor.status().unwrap().contains(Sr::BP_ALL));
    }

    #[test]
    fn large_parts_use_four_byte_opcodes() {
        let mut nor = probe(0x19);
        let mut buf = [0u8; 4];
        nor.read(0x0100_0000, &mut buf).unwrap();
        assert_eq!(nor.into_inner().commands.last(), Some(&op::READ4));
    }

    #[test]
    fn update_region_round_trip_under_lock_bracket() {
        let mut nor = probe(0x14);
        update_region(&mut nor, 0x1FF0, &[0x42; 32]).unwrap();
        let mut buf = [0u8; 32];
        nor.read(0x1FF0, &mut buf).unwrap();
        assert_eq!(buf, [0x42; 32]);
        assert!(nor.status().unwrap().contains(Sr::BP_ALL));

        let err = with_unlocked(&mut nor, |_| Err::<(), _>(FlashError::Timeout));
        assert_eq!(err, Err(FlashError::Timeout));
        assert!(nor.status().unwrap().contains(Sr::BP_ALL));
    }
}
