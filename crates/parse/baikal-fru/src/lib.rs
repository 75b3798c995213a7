//! IPMI Platform Management FRU Information parser.
//!
//! A FRU image starts with an eight-byte common header giving the offsets
//! (in eight-byte units) of the optional areas. Each area carries its own
//! zero-sum checksum; an area that fails it is treated as absent and the
//! rest of the image is still used. Only a bad common header rejects the
//! whole image.

#![no_std]

extern crate alloc;

pub mod builder;
pub mod field;
pub mod multirecord;

use alloc::vec::Vec;
use core::fmt;

use baikal_efi::EfiStatus;

pub use builder::FruImageBuilder;
pub use field::FruField;
pub use multirecord::{MacRecord, Record};

use field::Fields;

/// Common header and area format version.
pub const FORMAT_VERSION: u8 = 0x01;
/// Size of the common header.
pub const HEADER_LEN: usize = 8;

/// Errors that reject an image as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FruError {
    /// Shorter than the common header.
    Truncated,
    /// Common header format version is not `0x01`.
    BadVersion(u8),
    /// Common header checksum mismatch.
    BadChecksum,
}

impl fmt::Display for FruError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated => f.write_str("fru: image shorter than common header"),
            Self::BadVersion(v) => write!(f, "fru: unsupported format version {v:#04x}"),
            Self::BadChecksum => f.write_str("fru: common header checksum mismatch"),
        }
    }
}

impl From<FruError> for EfiStatus {
    fn from(err: FruError) -> Self {
        match err {
            FruError::Truncated => EfiStatus::BAD_BUFFER_SIZE,
            FruError::BadVersion(_) => EfiStatus::INCOMPATIBLE_VERSION,
            FruError::BadChecksum => EfiStatus::CRC_ERROR,
        }
    }
}

/// Whether `bytes` sum to zero modulo 256.
pub(crate) fn zero_sum(bytes: &[u8]) -> bool {
    bytes.iter().fold(0u8, |acc, b| acc.wrapping_add(*b)) == 0
}

// ---------------------------------------------------------------------------
// Areas
// ---------------------------------------------------------------------------

/// Chassis info area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChassisInfo {
    /// SMBIOS chassis type.
    pub chassis_type: u8,
    /// Chassis part number.
    pub part_number: FruField,
    /// Chassis serial number.
    pub serial_number: FruField,
    /// Custom fields.
    pub custom: Vec<FruField>,
}

/// Board info area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoardInfo {
    /// Language code.
    pub language: u8,
    /// Manufacturing time in minutes since 1996-01-01 00:00, `None` when
    /// unspecified.
    pub mfg_minutes: Option<u32>,
    /// Board manufacturer.
    pub manufacturer: FruField,
    /// Board product name.
    pub product_name: FruField,
    /// Board serial number.
    pub serial_number: FruField,
    /// Board part number.
    pub part_number: FruField,
    /// FRU file id.
    pub fru_file_id: FruField,
    /// Custom fields.
    pub custom: Vec<FruField>,
}

impl BoardInfo {
    /// Manufacturing date as a calendar time.
    #[must_use]
    pub fn mfg_date(&self) -> Option<MfgDate> {
        self.mfg_minutes.map(MfgDate::from_minutes)
    }
}

/// Product info area.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProductInfo {
    /// Language code.
    pub language: u8,
    /// Product manufacturer.
    pub manufacturer: FruField,
    /// Product name.
    pub name: FruField,
    /// Part or model number.
    pub part_number: FruField,
    /// Product version.
    pub version: FruField,
    /// Product serial number.
    pub serial_number: FruField,
    /// Asset tag.
    pub asset_tag: FruField,
    /// FRU file id.
    pub fru_file_id: FruField,
    /// Custom fields.
    pub custom: Vec<FruField>,
}

/// A board manufacturing date.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MfgDate {
    /// Year.
    pub year: u32,
    /// Month (1..=12).
    pub month: u32,
    /// Day of month.
    pub day: u32,
    /// Hour.
    pub hour: u32,
    /// Minute.
    pub minute: u32,
}

impl MfgDate {
    fn from_minutes(minutes: u32) -> Self {
        let mut days = minutes / (24 * 60);
        let rem = minutes % (24 * 60);
        let mut year = 1996;
        loop {
            let len = if is_leap(year) { 366 } else { 365 };
            if days < len {
                break;
            }
            days -= len;
            year += 1;
        }
        let mut month = 1;
        loop {
            let len = days_in_month(year, month);
            if days < len {
                break;
            }
            days -= len;
            month += 1;
        }
        Self {
            year,
            month,
            day: days + 1,
            hour: rem / 60,
            minute: rem % 60,
        }
    }
}

impl fmt::Display for MfgDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute
        )
    }
}

fn is_leap(year: u32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u32, month: u32) -> u32 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

// ---------------------------------------------------------------------------
// Image
// ---------------------------------------------------------------------------

/// A parsed FRU image. Areas that are missing or corrupt are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fru {
    /// Chassis info area.
    pub chassis: Option<ChassisInfo>,
    /// Board info area.
    pub board: Option<BoardInfo>,
    /// Product info area.
    pub product: Option<ProductInfo>,
    /// Multirecords with valid checksums.
    pub records: Vec<Record>,
}

/// Validates and slices the area at `units * 8`.
fn area<'a>(data: &'a [u8], units: u8, name: &str) -> Option<&'a [u8]> {
    if units == 0 {
        return None;
    }
    let start = usize::from(units) * 8;
    let len = usize::from(*data.get(start + 1)?) * 8;
    let Some(bytes) = data.get(start..start + len) else {
        log::warn!("fru: {name} area overruns the image");
        return None;
    };
    if len < 3 || bytes[0] != FORMAT_VERSION {
        log::warn!("fru: {name} area has a bad header");
        return None;
    }
    if !zero_sum(bytes) {
        log::warn!("fru: {name} area checksum mismatch, ignoring it");
        return None;
    }
    // Drop the checksum byte.
    Some(&bytes[..len - 1])
}

fn parse_chassis(bytes: &[u8]) -> ChassisInfo {
    let mut fields = Fields::new(bytes.get(3..).unwrap_or_default());
    ChassisInfo {
        chassis_type: bytes[2],
        part_number: fields.next_or_empty(),
        serial_number: fields.next_or_empty(),
        custom: fields.collect(),
    }
}

fn parse_board(bytes: &[u8]) -> BoardInfo {
    let minutes = bytes
        .get(3..6)
        .map_or(0, |m| u32::from_le_bytes([m[0], m[1], m[2], 0]));
    let mut fields = Fields::new(bytes.get(6..).unwrap_or_default());
    BoardInfo {
        language: bytes[2],
        mfg_minutes: (minutes != 0).then_some(minutes),
        manufacturer: fields.next_or_empty(),
        product_name: fields.next_or_empty(),
        serial_number: fields.next_or_empty(),
        part_number: fields.next_or_empty(),
        fru_file_id: fields.next_or_empty(),
        custom: fields.collect(),
    }
}

fn parse_product(bytes: &[u8]) -> ProductInfo {
    let mut fields = Fields::new(bytes.get(3..).unwrap_or_default());
    ProductInfo {
        language: bytes[2],
        manufacturer: fields.next_or_empty(),
        name: fields.next_or_empty(),
        part_number: fields.next_or_empty(),
        version: fields.next_or_empty(),
        serial_number: fields.next_or_empty(),
        asset_tag: fields.next_or_empty(),
        fru_file_id: fields.next_or_empty(),
        custom: fields.collect(),
    }
}

impl Fru {
    /// Parses a FRU image.
    ///
    /// # Errors
    ///
    /// [`FruError`] if the common header is short, of the wrong version or
    /// fails its checksum. Area problems are not errors.
    pub fn parse(data: &[u8]) -> Result<Self, FruError> {
        let header = data.get(..HEADER_LEN).ok_or(FruError::Truncated)?;
        if header[0] & 0x0F != FORMAT_VERSION {
            return Err(FruError::BadVersion(header[0]));
        }
        if !zero_sum(header) {
            return Err(FruError::BadChecksum);
        }

        let records = match header[5] {
            0 => Vec::new(),
            units => data
                .get(usize::from(units) * 8..)
                .map(multirecord::parse_records)
                .unwrap_or_default(),
        };

        let fru = Self {
            chassis: area(data, header[2], "chassis").map(parse_chassis),
            board: area(data, header[3], "board").map(parse_board),
            product: area(data, header[4], "product").map(parse_product),
            records,
        };
        log::debug!(
            "fru: chassis={} board={} product={} records={}",
            fru.chassis.is_some(),
            fru.board.is_some(),
            fru.product.is_some(),
            fru.records.len()
        );
        Ok(fru)
    }

    /// The first OEM MAC record, if any.
    #[must_use]
    pub fn mac_record(&self) -> Option<MacRecord> {
        self.records.iter().find_map(MacRecord::from_record)
    }

    /// The MAC for port `index` from the OEM MAC record, if present and a
    /// usable unicast address.
    #[must_use]
    pub fn mac_address(&self, index: usize) -> Option<[u8; 6]> {
        let mac = *self.mac_record()?.macs.get(index)?;
        let usable = mac[0] & 0x01 == 0 && mac != [0; 6];
        if !usable {
            log::warn!("fru: mac {index} is not a unicast address");
        }
        usable.then_some(mac)
    }
}
