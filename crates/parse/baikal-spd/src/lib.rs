//! JEDEC DDR4 Serial Presence Detect parser.
//!
//! An SPD image is 512 bytes. The base configuration (bytes 0..=127) and
//! the module-specific block (128..=255) each end in a CRC16 that must
//! match before any field is trusted. [`Spd::parse`] checks both and then
//! exposes the decoded fields through accessors over the raw bytes.

#![no_std]

extern crate alloc;

use alloc::string::String;
use alloc::vec::Vec;
use core::fmt;

use baikal_efi::EfiStatus;

/// Size of a DDR4 SPD image.
pub const SPD_SIZE: usize = 512;
/// Byte 2 value for DDR4 SDRAM.
pub const DDR4_SDRAM: u8 = 0x0C;

/// Medium timebase in picoseconds.
const MTB_PS: i32 = 125;

mod offset {
    pub const DRAM_TYPE: usize = 2;
    pub const MODULE_TYPE: usize = 3;
    pub const DENSITY_BANKS: usize = 4;
    pub const ADDRESSING: usize = 5;
    pub const PACKAGE: usize = 6;
    pub const ORGANIZATION: usize = 12;
    pub const BUS_WIDTH: usize = 13;
    pub const TCK_MIN: usize = 18;
    pub const CAS_LATENCIES: usize = 20;
    pub const TAA_MIN: usize = 24;
    pub const TRCD_MIN: usize = 25;
    pub const TRP_MIN: usize = 26;
    pub const TRAS_TRC_UPPER: usize = 27;
    pub const TRAS_MIN: usize = 28;
    pub const TRC_MIN: usize = 29;
    pub const TRC_FINE: usize = 120;
    pub const TRP_FINE: usize = 121;
    pub const TRCD_FINE: usize = 122;
    pub const TAA_FINE: usize = 123;
    pub const TCK_FINE: usize = 125;
    pub const BASE_CRC: usize = 126;
    pub const MODULE_CRC: usize = 254;
    pub const MANUFACTURER: usize = 320;
    pub const SERIAL: usize = 325;
    pub const PART_NUMBER: usize = 329;
    pub const PART_NUMBER_LEN: usize = 20;
}

/// SPD errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpdError {
    /// Fewer than [`SPD_SIZE`] bytes.
    Truncated,
    /// A block CRC does not match. `block` is 0 for the base configuration
    /// and 1 for the module-specific block.
    Crc {
        /// Failing block.
        block: u8,
    },
    /// Not a DDR4 SDRAM module.
    UnsupportedType(u8),
    /// Byte 4 carries a reserved die density code.
    UnknownDensity(u8),
}

impl fmt::Display for SpdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => f.write_str("spd: image shorter than 512 bytes"),
            Self::Crc { block } => write!(f, "spd: crc mismatch in block {block}"),
            Self::UnsupportedType(t) => write!(f, "spd: unsupported dram type {t:#04x}"),
            Self::UnknownDensity(code) => write!(f, "spd: reserved die density code {code:#x}"),
        }
    }
}

impl From<SpdError> for EfiStatus {
    fn from(err: SpdError) -> Self {
        match err {
            SpdError::Truncated => EfiStatus::BAD_BUFFER_SIZE,
            SpdError::Crc { .. } => EfiStatus::CRC_ERROR,
            SpdError::UnsupportedType(_) | SpdError::UnknownDensity(_) => EfiStatus::UNSUPPORTED,
        }
    }
}

/// CRC16/XMODEM: polynomial `0x1021`, initial value 0, no reflection.
#[must_use]
pub fn crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for &byte in data {
        crc ^= u16::from(byte) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// Recomputes and stores both block CRCs of `raw`.
pub fn fill_crc(raw: &mut [u8; SPD_SIZE]) {
    for (start, at) in [(0, offset::BASE_CRC), (128, offset::MODULE_CRC)] {
        let crc = crc16(&raw[start..at]);
        raw[at..at + 2].copy_from_slice(&crc.to_le_bytes());
    }
}

/// DDR4 module form factor (byte 3, bits 3:0).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleType {
    /// Registered DIMM.
    Rdimm,
    /// Unbuffered DIMM.
    Udimm,
    /// Unbuffered SO-DIMM.
    SoDimm,
    /// Load-reduced DIMM.
    Lrdimm,
    /// Anything else.
    Other(u8),
}

impl fmt::Display for ModuleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rdimm => f.write_str("RDIMM"),
            Self::Udimm => f.write_str("UDIMM"),
            Self::SoDimm => f.write_str("SO-DIMM"),
            Self::Lrdimm => f.write_str("LRDIMM"),
            Self::Other(t) => write!(f, "module type {t:#x}"),
        }
    }
}

/// Standard DDR4 speed bins as (data rate in MT/s, minimum tCK in ps),
/// using the rounded tCKmin values an SPD encodes.
const SPEED_BINS: [(u32, i32); 7] = [
    (3200, 625),
    (2933, 682),
    (2666, 750),
    (2400, 833),
    (2133, 938),
    (1866, 1071),
    (1600, 1250),
];

/// MTB plus FTB lands within a picosecond of the nominal tCK.
const TCK_TOLERANCE_PS: i32 = 1;

/// Die capacity in bits for a byte 4 density code. Codes 8 and 9 are the
/// non-power-of-two 12 Gb and 24 Gb dies; everything above is reserved.
fn density_bits(code: u8) -> Option<u64> {
    const GBIT: u64 = 1 << 30;
    match code {
        0..=7 => Some((256u64 << 20) << code),
        8 => Some(12 * GBIT),
        9 => Some(24 * GBIT),
        _ => None,
    }
}

/// A validated DDR4 SPD image.
#[derive(Clone, PartialEq, Eq)]
pub struct Spd {
    raw: [u8; SPD_SIZE],
}

impl fmt::Debug for Spd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spd")
            .field("module_type", &self.module_type())
            .field("capacity", &self.capacity_bytes())
            .field("tck_ps", &self.tck_min_ps())
            .finish_non_exhaustive()
    }
}

impl Spd {
    /// Validates the CRCs and the DRAM type.
    ///
    /// # Errors
    ///
    /// [`SpdError`] when the image is short, fails a CRC or is not DDR4.
    pub fn parse(data: &[u8]) -> Result<Self, SpdError> {
        let raw: [u8; SPD_SIZE] = data
            .get(..SPD_SIZE)
            .and_then(|d| d.try_into().ok())
            .ok_or(SpdError::Truncated)?;

        for (block, start, at) in [(0, 0, offset::BASE_CRC), (1, 128, offset::MODULE_CRC)] {
            let stored = u16::from_le_bytes([raw[at], raw[at + 1]]);
            let computed = crc16(&raw[start..at]);
            if stored != computed {
                log::warn!(
                    "spd: block {block} crc {stored:#06x}, computed {computed:#06x}"
                );
                return Err(SpdError::Crc { block });
            }
        }

        if raw[offset::DRAM_TYPE] != DDR4_SDRAM {
            return Err(SpdError::UnsupportedType(raw[offset::DRAM_TYPE]));
        }
        let density = raw[offset::DENSITY_BANKS] & 0x0F;
        if density_bits(density).is_none() {
            return Err(SpdError::UnknownDensity(density));
        }
        Ok(Self { raw })
    }

    /// The raw image.
    #[must_use]
    pub fn raw(&self) -> &[u8; SPD_SIZE] {
        &self.raw
    }

    fn byte(&self, at: usize) -> u8 {
        self.raw[at]
    }

    fn fine(&self, at: usize) -> i32 {
        i32::from(self.byte(at) as i8)
    }

    fn timing(&self, mtb: usize, fine: usize) -> u32 {
        (i32::from(self.byte(mtb)) * MTB_PS + self.fine(fine)).max(0).unsigned_abs()
    }

    // ---- Module --------------------------------------------------------------

    /// DRAM device type (byte 2).
    #[must_use]
    pub fn dram_type(&self) -> u8 {
        self.byte(offset::DRAM_TYPE)
    }

    /// Module form factor.
    #[must_use]
    pub fn module_type(&self) -> ModuleType {
        match self.byte(offset::MODULE_TYPE) & 0x0F {
            0x1 => ModuleType::Rdimm,
            0x2 => ModuleType::Udimm,
            0x3 => ModuleType::SoDimm,
            0x4 => ModuleType::Lrdimm,
            other => ModuleType::Other(other),
        }
    }

    // ---- Organization --------------------------------------------------------

    /// Capacity of one die in bits.
    #[must_use]
    pub fn die_density_bits(&self) -> u64 {
        // `parse` rejected reserved codes.
        density_bits(self.byte(offset::DENSITY_BANKS) & 0x0F).unwrap_or(0)
    }

    /// Number of bank groups.
    #[must_use]
    pub fn bank_groups(&self) -> u32 {
        1 << (self.byte(offset::DENSITY_BANKS) >> 6)
    }

    /// Banks per bank group.
    #[must_use]
    pub fn banks_per_group(&self) -> u32 {
        4 << ((self.byte(offset::DENSITY_BANKS) >> 4) & 0x3)
    }

    /// Row address bits.
    #[must_use]
    pub fn row_bits(&self) -> u32 {
        12 + u32::from((self.byte(offset::ADDRESSING) >> 3) & 0x7)
    }

    /// Column address bits.
    #[must_use]
    pub fn column_bits(&self) -> u32 {
        9 + u32::from(self.byte(offset::ADDRESSING) & 0x7)
    }

    /// SDRAM device width in bits (4, 8, 16 or 32).
    #[must_use]
    pub fn device_width(&self) -> u32 {
        4 << (self.byte(offset::ORGANIZATION) & 0x7).min(3)
    }

    /// Package ranks per module.
    #[must_use]
    pub fn package_ranks(&self) -> u32 {
        1 + u32::from((self.byte(offset::ORGANIZATION) >> 3) & 0x7)
    }

    /// Dies per package.
    #[must_use]
    pub fn die_count(&self) -> u32 {
        1 + u32::from((self.byte(offset::PACKAGE) >> 4) & 0x7)
    }

    /// Whether the package is 3DS (single load stack), where every die is
    /// a logical rank.
    fn is_3ds(&self) -> bool {
        let package = self.byte(offset::PACKAGE);
        package & 0x80 != 0 && package & 0x3 == 0x2
    }

    /// Logical ranks per module.
    #[must_use]
    pub fn logical_ranks(&self) -> u32 {
        if self.is_3ds() {
            self.package_ranks() * self.die_count()
        } else {
            self.package_ranks()
        }
    }

    /// Primary bus width in bits, ECC excluded.
    #[must_use]
    pub fn bus_width(&self) -> u32 {
        8 << (self.byte(offset::BUS_WIDTH) & 0x7).min(3)
    }

    /// Whether the module carries an ECC extension.
    #[must_use]
    pub fn has_ecc(&self) -> bool {
        (self.byte(offset::BUS_WIDTH) >> 3) & 0x3 == 0x1
    }

    /// Module capacity in bytes.
    #[must_use]
    pub fn capacity_bytes(&self) -> u64 {
        self.die_density_bits() / 8 * u64::from(self.bus_width())
            / u64::from(self.device_width())
            * u64::from(self.logical_ranks())
    }

    // ---- Timing --------------------------------------------------------------

    /// Minimum clock cycle time in picoseconds.
    #[must_use]
    pub fn tck_min_ps(&self) -> u32 {
        self.timing(offset::TCK_MIN, offset::TCK_FINE)
    }

    /// The fastest standard speed bin the module's tCK allows, in MT/s.
    /// `None` for a module slower than DDR4-1600.
    #[must_use]
    pub fn speed_bin(&self) -> Option<u32> {
        let tck = i32::try_from(self.tck_min_ps()).ok()?;
        SPEED_BINS
            .iter()
            .find(|(_, min_tck)| min_tck + TCK_TOLERANCE_PS >= tck)
            .map(|(rate, _)| *rate)
    }

    /// Data rate in MT/s: the speed bin, or `2 / tCK` for a module slower
    /// than every bin.
    #[must_use]
    pub fn data_rate_mts(&self) -> u32 {
        self.speed_bin()
            .unwrap_or_else(|| 2_000_000 / self.tck_min_ps().max(1))
    }

    /// Minimum CAS latency time in picoseconds.
    #[must_use]
    pub fn taa_min_ps(&self) -> u32 {
        self.timing(offset::TAA_MIN, offset::TAA_FINE)
    }

    /// Minimum RAS-to-CAS delay in picoseconds.
    #[must_use]
    pub fn trcd_min_ps(&self) -> u32 {
        self.timing(offset::TRCD_MIN, offset::TRCD_FINE)
    }

    /// Minimum row precharge time in picoseconds.
    #[must_use]
    pub fn trp_min_ps(&self) -> u32 {
        self.timing(offset::TRP_MIN, offset::TRP_FINE)
    }

    /// Minimum active-to-precharge time in picoseconds.
    #[must_use]
    pub fn tras_min_ps(&self) -> u32 {
        let upper = u32::from(self.byte(offset::TRAS_TRC_UPPER) & 0x0F);
        ((upper << 8) | u32::from(self.byte(offset::TRAS_MIN))) * MTB_PS.unsigned_abs()
    }

    /// Minimum active-to-active/refresh time in picoseconds.
    #[must_use]
    pub fn trc_min_ps(&self) -> u32 {
        let upper = i32::from(self.byte(offset::TRAS_TRC_UPPER) >> 4);
        let mtb = (upper << 8) | i32::from(self.byte(offset::TRC_MIN));
        (mtb * MTB_PS + self.fine(offset::TRC_FINE)).max(0).unsigned_abs()
    }

    /// Supported CAS latencies in ascending order.
    #[must_use]
    pub fn cas_latencies(&self) -> Vec<u32> {
        let at = offset::CAS_LATENCIES;
        let mask = u32::from_le_bytes([
            self.byte(at),
            self.byte(at + 1),
            self.byte(at + 2),
            self.byte(at + 3),
        ]);
        // Bit 31 selects the high range starting at CL23.
        let base = if mask & (1 << 31) != 0 { 23 } else { 7 };
        (0..30).filter(|&bit| mask & (1 << bit) != 0).map(|bit| base + bit).collect()
    }

    // ---- Manufacturing -------------------------------------------------------

    /// JEP-106 module manufacturer: continuation byte then code byte.
    #[must_use]
    pub fn manufacturer_id(&self) -> u16 {
        u16::from_be_bytes([
            self.byte(offset::MANUFACTURER),
            self.byte(offset::MANUFACTURER + 1),
        ])
    }

    /// A name for well-known manufacturers.
    #[must_use]
    pub fn manufacturer_name(&self) -> Option<&'static str> {
        match self.manufacturer_id() {
            0x80CE => Some("Samsung"),
            0x80AD => Some("SK Hynix"),
            0x802C => Some("Micron"),
            0x0198 => Some("Kingston"),
            0x859B => Some("Crucial"),
            _ => None,
        }
    }

    /// Module serial number.
    #[must_use]
    pub fn serial_number(&self) -> u32 {
        let at = offset::SERIAL;
        u32::from_be_bytes([
            self.byte(at),
            self.byte(at + 1),
            self.byte(at + 2),
            self.byte(at + 3),
        ])
    }

    /// Module part number, trailing padding removed.
    #[must_use]
    pub fn part_number(&self) -> String {
        let bytes = &self.raw[offset::PART_NUMBER..offset::PART_NUMBER + offset::PART_NUMBER_LEN];
        let text: String = bytes
            .iter()
            .map(|&b| if b.is_ascii_graphic() || b == b' ' { char::from(b) } else { ' ' })
            .collect();
        String::from(text.trim_end())
    }
}
