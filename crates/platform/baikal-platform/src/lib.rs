//! Board context for Baikal BM1000/BS1000 platforms.
//!
//! [`Platform::init`] gathers everything the firmware learns about the
//! board once at start-up: the chip unique id, the DIMM inventory from SPD,
//! which RTC is fitted and the FRU identity record. The result is passed by
//! reference to whatever needs it; nothing here is global.

#![no_std]

extern crate alloc;

pub mod fixup;

use alloc::vec::Vec;

use baikal_drivers::eeprom::{Eeprom, read_spd};
use baikal_drivers::{I2cBus, Rtc, RtcType};
use baikal_fru::Fru;
use baikal_spd::Spd;

pub use fixup::FixupSummary;

/// Where the board keeps its identity data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoardConfig {
    /// Number of DIMM slots, one SPD EEPROM each from `0x50` upwards.
    pub dimm_slots: u8,
    /// Bus address of the FRU EEPROM.
    pub fru_address: u16,
    /// Bytes of FRU EEPROM to read.
    pub fru_size: usize,
}

impl BoardConfig {
    /// BM1000 reference board: two DDR4 channels with one slot each and a
    /// 256-byte FRU EEPROM at `0x54`.
    pub const BM1000: Self = Self {
        dimm_slots: 2,
        fru_address: 0x54,
        fru_size: 256,
    };
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self::BM1000
    }
}

/// What the firmware knows about the board.
#[derive(Debug, Clone)]
pub struct Platform {
    uid32: u32,
    spd: Vec<Option<Spd>>,
    rtc: Option<RtcType>,
    fru: Option<Fru>,
}

impl Platform {
    /// Probes the board. Missing or corrupt sources are recorded as absent
    /// and logged; init itself does not fail.
    ///
    /// `uid32` is the chip unique id, read by the caller from the SoC.
    /// `spd_bus` carries the DIMM SPD EEPROMs; `board_bus` the RTC and the
    /// FRU EEPROM.
    pub fn init<S: I2cBus, B: I2cBus>(
        uid32: u32,
        spd_bus: &mut S,
        board_bus: &mut B,
        config: &BoardConfig,
    ) -> Self {
        let spd = (0..config.dimm_slots)
            .map(|slot| match read_spd(spd_bus, slot) {
                Ok(raw) => match Spd::parse(&raw) {
                    Ok(spd) => {
                        log::info!(
                            "dimm{slot}: {} {} MiB DDR4-{}",
                            spd.module_type(),
                            spd.capacity_bytes() >> 20,
                            spd.data_rate_mts()
                        );
                        Some(spd)
                    }
                    Err(err) => {
                        log::warn!("dimm{slot}: {err}, treating slot as empty");
                        None
                    }
                },
                Err(err) => {
                    log::debug!("dimm{slot}: no spd ({err})");
                    None
                }
            })
            .collect();

        let rtc = Rtc::detect(board_bus);
        let fru = Self::read_fru(board_bus, config);

        Self::from_parts(uid32, spd, rtc, fru)
    }

    fn read_fru<B: I2cBus>(bus: &mut B, config: &BoardConfig) -> Option<Fru> {
        let mut image = alloc::vec![0u8; config.fru_size];
        if let Err(err) = Eeprom::new(&mut *bus, config.fru_address).read(0, &mut image) {
            log::warn!("fru: eeprom at {:#x} unreadable: {err}", config.fru_address);
            return None;
        }
        Fru::parse(&image)
            .inspect_err(|err| log::warn!("{err}"))
            .ok()
    }

    /// Assembles a context from already-gathered parts.
    #[must_use]
    pub fn from_parts(
        uid32: u32,
        spd: Vec<Option<Spd>>,
        rtc: Option<RtcType>,
        fru: Option<Fru>,
    ) -> Self {
        Self {
            uid32,
            spd,
            rtc,
            fru,
        }
    }

    /// The chip unique id.
    #[must_use]
    pub fn uid32(&self) -> u32 {
        self.uid32
    }

    /// The parsed SPD of `slot`, if a valid one was read.
    #[must_use]
    pub fn spd(&self, slot: usize) -> Option<&Spd> {
        self.spd.get(slot)?.as_ref()
    }

    /// Number of DIMM slots probed.
    #[must_use]
    pub fn dimm_slots(&self) -> usize {
        self.spd.len()
    }

    /// The RTC found at init.
    #[must_use]
    pub fn rtc(&self) -> Option<RtcType> {
        self.rtc
    }

    /// The FRU record, if present with a valid header.
    #[must_use]
    pub fn fru(&self) -> Option<&Fru> {
        self.fru.as_ref()
    }

    /// MAC address for Ethernet port `index`.
    ///
    /// Uses the FRU OEM MAC record when it holds a usable address for the
    /// port, and otherwise derives a locally administered unicast address
    /// from the chip unique id.
    #[must_use]
    pub fn mac_address(&self, index: u8) -> [u8; 6] {
        if let Some(mac) = self
            .fru
            .as_ref()
            .and_then(|fru| fru.mac_address(usize::from(index)))
        {
            return mac;
        }
        let [u0, u1, u2, u3] = self.uid32.to_be_bytes();
        [0x4E, u0, u1, u2, u3, index]
    }

    /// Total capacity of the DIMMs present, in bytes.
    #[must_use]
    pub fn total_memory(&self) -> u64 {
        self.spd.iter().flatten().map(Spd::capacity_bytes).sum()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use alloc::vec::Vec;

    use baikal_drivers::eeprom::{SPA0, SPA1};
    use baikal_drivers::i2c::{AbortSource, I2cError};
    use baikal_drivers::I2cBus;
    use baikal_spd::{SPD_SIZE, fill_crc};

    /// An 8 GiB DDR4-3200 UDIMM.
    pub(crate) fn udimm() -> [u8; SPD_SIZE] {
        let mut raw = [0u8; SPD_SIZE];
        raw[2] = 0x0C;
        raw[3] = 0x02;
        raw[4] = 0x85;
        raw[5] = 0x19;
        raw[12] = 0x01;
        raw[13] = 0x03;
        raw[18] = 0x05;
        fill_crc(&mut raw);
        raw
    }

    /// An I2C bus holding any of: SPD EEPROMs per slot, an RTC and a FRU
    /// EEPROM.
    pub(crate) struct Board {
        pub spd: Vec<Option<[u8; SPD_SIZE]>>,
        pub rtc_addr: Option<u16>,
        pub fru: Option<Vec<u8>>,
        page: usize,
    }

    impl Board {
        pub(crate) fn new() -> Self {
            Self {
                spd: Vec::new(),
                rtc_addr: None,
                fru: None,
                page: 0,
            }
        }
    }

    impl I2cBus for Board {
        fn transfer(&mut self, addr: u16, tx: &[u8], rx: &mut [u8]) -> Result<(), I2cError> {
            let nack = Err(I2cError::Abort(AbortSource::ADDR7_NOACK));
            match addr {
                SPA0 => self.page = 0,
                SPA1 => self.page = 1,
                0x50..=0x53 => {
                    let Some(Some(spd)) = self.spd.get(usize::from(addr - 0x50)) else {
                        return nack;
                    };
                    let start = self.page * 256 + usize::from(tx[0]);
                    rx.copy_from_slice(&spd[start..start + rx.len()]);
                }
                0x54 => {
                    let Some(fru) = &self.fru else { return nack };
                    let start = usize::from(tx[0]);
                    for (i, b) in rx.iter_mut().enumerate() {
                        *b = fru.get(start + i).copied().unwrap_or(0xFF);
                    }
                }
                a if Some(a) == self.rtc_addr => rx.fill(0),
                _ => return nack,
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{Board, udimm};
    use baikal_fru::FruImageBuilder;
    use baikal_fru::multirecord::OEM_MAC_RECORD;

    #[test]
    fn init_collects_inventory() {
        let mut dimms = Board::new();
        dimms.spd = alloc::vec![Some(udimm()), None];
        let mut board = Board::new();
        board.rtc_addr = Some(RtcType::Abeoz9.address());
        board.fru = Some(
            FruImageBuilder::new()
                .board(0, &["Baikal Electronics", "DBM", "1", "2", ""])
                .build(),
        );

        let platform =
            Platform::init(0xDEAD_BEEF, &mut dimms, &mut board, &BoardConfig::BM1000);
        assert_eq!(platform.dimm_slots(), 2);
        assert!(platform.spd(0).is_some());
        assert!(platform.spd(1).is_none());
        assert_eq!(platform.total_memory(), 8 << 30);
        assert_eq!(platform.rtc(), Some(RtcType::Abeoz9));
        let board_info = platform.fru().and_then(|f| f.board.as_ref()).unwrap();
        assert_eq!(board_info.product_name.as_str(), Some("DBM"));
    }

    #[test]
    fn corrupt_spd_counts_as_empty_slot() {
        let mut dimms = Board::new();
        let mut bad = udimm();
        bad[20] ^= 0x40;
        dimms.spd = alloc::vec![Some(udimm()), Some(bad)];
        let platform = Platform::init(1, &mut dimms, &mut Board::new(), &BoardConfig::BM1000);
        assert!(platform.spd(1).is_none());
        assert_eq!(platform.total_memory(), 8 << 30);
        assert!(platform.fru().is_none());
        assert!(platform.rtc().is_none());
    }

    #[test]
    fn mac_falls_back_to_uid() {
        let platform = Platform::from_parts(0x1234_5678, Vec::new(), None, None);
        let mac = platform.mac_address(3);
        assert_eq!(mac, [0x4E, 0x12, 0x34, 0x56, 0x78, 0x03]);
        assert_eq!(mac[0] & 0x01, 0, "unicast");
        assert_eq!(mac[0] & 0x02, 0x02, "locally administered");
        assert_eq!(platform.mac_address(3), mac);
    }

    #[test]
    fn fru_mac_wins_when_usable() {
        let mut payload = alloc::vec![0, 0, 0];
        payload.extend_from_slice(&[0x00, 0x20, 0x30, 0x40, 0x50, 0x60]);
        payload.extend_from_slice(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]);
        let image = FruImageBuilder::new().record(OEM_MAC_RECORD, &payload).build();
        let fru = Fru::parse(&image).unwrap();
        let platform = Platform::from_parts(0xAABB_CCDD, Vec::new(), None, Some(fru));

        assert_eq!(platform.mac_address(0), [0x00, 0x20, 0x30, 0x40, 0x50, 0x60]);
        // Broadcast is unusable, and port 2 has no entry.
        assert_eq!(platform.mac_address(1), [0x4E, 0xAA, 0xBB, 0xCC, 0xDD, 1]);
        assert_eq!(platform.mac_address(2), [0x4E, 0xAA, 0xBB, 0xCC, 0xDD, 2]);
    }
}
