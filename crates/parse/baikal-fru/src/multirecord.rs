//! Multirecord area.
//!
//! A chain of records, each with a five-byte header: type, flags (bit 7
//! marks the last record, bits 3:0 the format version `2`), data length,
//! data checksum and header checksum.

use alloc::vec::Vec;

use crate::zero_sum;

/// Record type carrying OEM MAC addresses.
pub const OEM_MAC_RECORD: u8 = 0xC0;

const HEADER_LEN: usize = 5;
const END_OF_LIST: u8 = 0x80;
const FORMAT_VERSION: u8 = 0x02;

/// One multirecord with a valid header and data checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Record type id.
    pub record_type: u8,
    /// Record payload.
    pub data: Vec<u8>,
}

/// Walks the chain starting at the front of `area`.
///
/// The walk stops at the end-of-list flag, at a corrupt header or at the
/// end of `area`. A record whose payload checksum fails is skipped with a
/// warning; the chain itself can still be followed.
#[must_use]
pub fn parse_records(area: &[u8]) -> Vec<Record> {
    let mut records = Vec::new();
    let mut rest = area;
    while let Some(header) = rest.get(..HEADER_LEN) {
        if !zero_sum(header) || header[1] & 0x0F != FORMAT_VERSION {
            log::warn!("fru: corrupt multirecord header, stopping");
            break;
        }
        let len = usize::from(header[2]);
        let Some(data) = rest.get(HEADER_LEN..HEADER_LEN + len) else {
            log::warn!("fru: multirecord overruns the area");
            break;
        };
        let data_sum = data.iter().fold(header[3], |acc, b| acc.wrapping_add(*b));
        if data_sum == 0 {
            records.push(Record {
                record_type: header[0],
                data: data.to_vec(),
            });
        } else {
            log::warn!("fru: multirecord type {:#04x} checksum mismatch", header[0]);
        }
        if header[1] & END_OF_LIST != 0 {
            break;
        }
        rest = &rest[HEADER_LEN + len..];
    }
    records
}

/// A decoded OEM MAC record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacRecord {
    /// IANA manufacturer id, little-endian on the wire.
    pub manufacturer_id: u32,
    /// The addresses, in port order.
    pub macs: Vec<[u8; 6]>,
}

impl MacRecord {
    /// Decodes the payload of an [`OEM_MAC_RECORD`].
    #[must_use]
    pub fn from_record(record: &Record) -> Option<Self> {
        if record.record_type != OEM_MAC_RECORD {
            return None;
        }
        let (id, macs) = record.data.split_at_checked(3)?;
        if macs.is_empty() || macs.len() % 6 != 0 {
            log::warn!("fru: oem mac record has {} address bytes", macs.len());
            return None;
        }
        Some(Self {
            manufacturer_id: u32::from_le_bytes([id[0], id[1], id[2], 0]),
            macs: macs
                .chunks_exact(6)
                .map(|c| [c[0], c[1], c[2], c[3], c[4], c[5]])
                .collect(),
        })
    }
}

/// Builds one record, checksums included. `last` sets the end-of-list flag.
/// Returns `None` for a payload longer than 255 bytes.
#[must_use]
pub fn encode_record(record_type: u8, data: &[u8], last: bool) -> Option<Vec<u8>> {
    let len = u8::try_from(data.len()).ok()?;
    let data_sum = data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    let flags = FORMAT_VERSION | if last { END_OF_LIST } else { 0 };
    let mut out = alloc::vec![record_type, flags, len, data_sum.wrapping_neg(), 0];
    let header_sum = out.iter().fold(0u8, |acc, b| acc.wrapping_add(*b));
    out[4] = header_sum.wrapping_neg();
    out.extend_from_slice(data);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mac_payload() -> Vec<u8> {
        let mut data = alloc::vec![0x9C, 0x5B, 0x00];
        data.extend_from_slice(&[0x4C, 0x11, 0x22, 0x33, 0x44, 0x00]);
        data.extend_from_slice(&[0x4C, 0x11, 0x22, 0x33, 0x44, 0x01]);
        data
    }

    #[test]
    fn chain_is_followed_to_end_of_list() {
        let mut area = encode_record(0x01, &[1, 2, 3], false).unwrap();
        area.extend(encode_record(OEM_MAC_RECORD, &mac_payload(), true).unwrap());
        area.extend(encode_record(0x02, &[9], true).unwrap());

        let records = parse_records(&area);
        assert_eq!(records.len(), 2);
        let mac = MacRecord::from_record(&records[1]).unwrap();
        assert_eq!(mac.manufacturer_id, 0x5B9C);
        assert_eq!(mac.macs[1], [0x4C, 0x11, 0x22, 0x33, 0x44, 0x01]);
    }

    #[test]
    fn bad_payload_is_skipped_but_chain_continues() {
        let mut area = encode_record(0x01, &[1, 2, 3], false).unwrap();
        area[HEADER_LEN] ^= 0xFF;
        area.extend(encode_record(OEM_MAC_RECORD, &mac_payload(), true).unwrap());
        let records = parse_records(&area);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, OEM_MAC_RECORD);
    }

    #[test]
    fn bad_header_stops_the_walk() {
        let mut area = encode_record(OEM_MAC_RECORD, &mac_payload(), true).unwrap();
        area[2] = area[2].wrapping_add(1);
        assert!(parse_records(&area).is_empty());
    }

    #[test]
    fn mac_record_needs_whole_addresses() {
        let record = Record {
            record_type: OEM_MAC_RECORD,
            data: alloc::vec![0, 0, 0, 1, 2, 3],
        };
        assert!(MacRecord::from_record(&record).is_none());
    }
}
