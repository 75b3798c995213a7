//! Builds FRU images, for provisioning and for tests.

use alloc::vec::Vec;

use crate::field::{END_OF_FIELDS, encode_ascii};
use crate::multirecord::encode_record;
use crate::{FORMAT_VERSION, HEADER_LEN};

fn checksum(bytes: &[u8]) -> u8 {
    bytes
        .iter()
        .fold(0u8, |acc, b| acc.wrapping_add(*b))
        .wrapping_neg()
}

/// Lays out `prefix` and 8-bit ASCII `fields` as a checksummed area.
fn encode_area(prefix: &[u8], fields: &[&str]) -> Vec<u8> {
    let mut area = alloc::vec![FORMAT_VERSION, 0];
    area.extend_from_slice(prefix);
    for field in fields {
        area.extend(encode_ascii(field));
    }
    area.push(END_OF_FIELDS);
    while (area.len() + 1) % 8 != 0 {
        area.push(0);
    }
    area[1] = ((area.len() + 1) / 8) as u8;
    area.push(checksum(&area));
    area
}

/// Assembles a FRU image area by area.
#[derive(Debug, Default)]
pub struct FruImageBuilder {
    chassis: Option<Vec<u8>>,
    board: Option<Vec<u8>>,
    product: Option<Vec<u8>>,
    records: Vec<(u8, Vec<u8>)>,
}

impl FruImageBuilder {
    /// An image with no areas.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a chassis area: part number, serial number, then custom fields.
    #[must_use]
    pub fn chassis(mut self, chassis_type: u8, fields: &[&str]) -> Self {
        self.chassis = Some(encode_area(&[chassis_type], fields));
        self
    }

    /// Adds a board area with English language code. `fields` are
    /// manufacturer, product name, serial, part number, FRU file id, then
    /// custom fields.
    #[must_use]
    pub fn board(mut self, mfg_minutes: u32, fields: &[&str]) -> Self {
        let [m0, m1, m2, _] = mfg_minutes.to_le_bytes();
        self.board = Some(encode_area(&[0x19, m0, m1, m2], fields));
        self
    }

    /// Adds a product area with English language code. `fields` are
    /// manufacturer, name, part number, version, serial, asset tag, FRU file
    /// id, then custom fields.
    #[must_use]
    pub fn product(mut self, fields: &[&str]) -> Self {
        self.product = Some(encode_area(&[0x19], fields));
        self
    }

    /// Appends a multirecord.
    #[must_use]
    pub fn record(mut self, record_type: u8, data: &[u8]) -> Self {
        self.records.push((record_type, data.to_vec()));
        self
    }

    /// Produces the image. Records with payloads over 255 bytes are dropped.
    #[must_use]
    pub fn build(self) -> Vec<u8> {
        let mut image = alloc::vec![0u8; HEADER_LEN];
        image[0] = FORMAT_VERSION;
        for (slot, area) in [(2, self.chassis), (3, self.board), (4, self.product)] {
            if let Some(area) = area {
                image[slot] = (image.len() / 8) as u8;
                image.extend(area);
            }
        }
        if !self.records.is_empty() {
            image[5] = (image.len() / 8) as u8;
            let last = self.records.len() - 1;
            for (i, (record_type, data)) in self.records.iter().enumerate() {
                if let Some(record) = encode_record(*record_type, data, i == last) {
                    image.extend(record);
                }
            }
        }
        image[7] = checksum(&image[..7]);
        image
    }
}
