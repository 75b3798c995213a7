//! I2C real-time clocks fitted to Baikal boards.
//!
//! Two parts are in use: NXP PCF2127 and Abracon AB-RTCMC-EOZ9. Both keep
//! time as BCD in seven consecutive registers (seconds, minutes, hours, day,
//! weekday, month, year) and differ only in bus address and in where that
//! block starts. Which one a board carries is found by probing once, at
//! init; the result is cached by the caller and passed back in.

use core::fmt;

use baikal_efi::EfiStatus;

use crate::i2c::{I2cBus, I2cError};

/// An RTC part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcType {
    /// NXP PCF2127.
    Pcf2127,
    /// Abracon AB-RTCMC-32.768kHz-EOZ9.
    Abeoz9,
}

impl RtcType {
    /// Probe order.
    pub const ALL: [Self; 2] = [Self::Pcf2127, Self::Abeoz9];

    /// 7-bit bus address.
    #[must_use]
    pub const fn address(self) -> u16 {
        match self {
            Self::Pcf2127 => 0x51,
            Self::Abeoz9 => 0x56,
        }
    }

    /// First register of the time block.
    const fn time_register(self) -> u8 {
        match self {
            Self::Pcf2127 => 0x03,
            Self::Abeoz9 => 0x08,
        }
    }
}

/// RTC errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RtcError {
    /// The bus transfer failed.
    Bus(I2cError),
    /// A caller-supplied time is out of range.
    InvalidTime,
    /// The clock holds a value that is not valid BCD time.
    Corrupt,
}

impl fmt::Display for RtcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus(err) => write!(f, "rtc: {err}"),
            Self::InvalidTime => f.write_str("rtc: time out of range"),
            Self::Corrupt => f.write_str("rtc: clock registers hold an invalid time"),
        }
    }
}

impl From<I2cError> for RtcError {
    fn from(err: I2cError) -> Self {
        Self::Bus(err)
    }
}

impl From<RtcError> for EfiStatus {
    fn from(err: RtcError) -> Self {
        match err {
            RtcError::Bus(err) => err.into(),
            RtcError::InvalidTime => EfiStatus::INVALID_PARAMETER,
            RtcError::Corrupt => EfiStatus::DEVICE_ERROR,
        }
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A calendar time in 2000..=2099, as the RTCs can represent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcTime {
    year: u16,
    month: u8,
    day: u8,
    hour: u8,
    minute: u8,
    second: u8,
}

const fn is_leap(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

const fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        2 if is_leap(year) => 29,
        2 => 28,
        4 | 6 | 9 | 11 => 30,
        _ => 31,
    }
}

impl RtcTime {
    /// Validates and builds a time.
    ///
    /// # Errors
    ///
    /// [`RtcError::InvalidTime`] if any field is out of range.
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Result<Self, RtcError> {
        let valid = (2000..=2099).contains(&year)
            && (1..=12).contains(&month)
            && day >= 1
            && day <= days_in_month(year, month)
            && hour < 24
            && minute < 60
            && second < 60;
        if !valid {
            return Err(RtcError::InvalidTime);
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
        })
    }

    /// Year (2000..=2099).
    #[must_use]
    pub const fn year(&self) -> u16 {
        self.year
    }
    /// Month (1..=12).
    #[must_use]
    pub const fn month(&self) -> u8 {
        self.month
    }
    /// Day of month.
    #[must_use]
    pub const fn day(&self) -> u8 {
        self.day
    }
    /// Hour (0..=23).
    #[must_use]
    pub const fn hour(&self) -> u8 {
        self.hour
    }
    /// Minute.
    #[must_use]
    pub const fn minute(&self) -> u8 {
        self.minute
    }
    /// Second.
    #[must_use]
    pub const fn second(&self) -> u8 {
        self.second
    }

    /// Day of week, 0 = Sunday.
    #[must_use]
    pub fn weekday(&self) -> u8 {
        const OFFSETS: [u16; 12] = [0, 3, 2, 5, 0, 3, 5, 1, 4, 6, 2, 4];
        let y = if self.month < 3 { self.year - 1 } else { self.year };
        let d = y + y / 4 - y / 100 + y / 400 + OFFSETS[usize::from(self.month - 1)]
            + u16::from(self.day);
        (d % 7) as u8
    }
}

impl fmt::Display for RtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// Packed BCD to binary, rejecting nibbles above 9.
#[must_use]
pub const fn bcd_to_bin(bcd: u8) -> Option<u8> {
    let (hi, lo) = (bcd >> 4, bcd & 0xF);
    if hi > 9 || lo > 9 {
        None
    } else {
        Some(hi * 10 + lo)
    }
}

/// Binary (0..=99) to packed BCD.
#[must_use]
pub const fn bin_to_bcd(bin: u8) -> u8 {
    ((bin / 10) << 4) | (bin % 10)
}

// ---------------------------------------------------------------------------
// Driver
// ---------------------------------------------------------------------------

/// An RTC on an I2C bus.
pub struct Rtc<B: I2cBus> {
    bus: B,
    kind: RtcType,
}

impl<B: I2cBus> Rtc<B> {
    /// Probes the known parts in order and returns the first that answers.
    pub fn detect(bus: &mut B) -> Option<RtcType> {
        let found = RtcType::ALL.into_iter().find(|kind| {
            let mut probe = [0u8; 1];
            bus.transfer(kind.address(), &[kind.time_register()], &mut probe)
                .is_ok()
        });
        match found {
            Some(kind) => log::info!("rtc: found {kind:?} at {:#x}", kind.address()),
            None => log::warn!("rtc: no supported clock found"),
        }
        found
    }

    /// Wraps a bus with an already-detected part.
    pub const fn new(bus: B, kind: RtcType) -> Self {
        Self { bus, kind }
    }

    /// The part this driver talks to.
    #[must_use]
    pub const fn kind(&self) -> RtcType {
        self.kind
    }

    /// Reads the current time.
    ///
    /// # Errors
    ///
    /// [`RtcError::Bus`] on transfer failure, [`RtcError::Corrupt`] if the
    /// registers do not hold a valid time.
    pub fn get_time(&mut self) -> Result<RtcTime, RtcError> {
        let mut raw = [0u8; 7];
        self.bus
            .transfer(self.kind.address(), &[self.kind.time_register()], &mut raw)?;
        if self.kind == RtcType::Pcf2127 && raw[0] & 0x80 != 0 {
            log::warn!("rtc: oscillator stopped, time may be stale");
        }
        let field = |byte: u8, mask: u8| bcd_to_bin(byte & mask).ok_or(RtcError::Corrupt);
        let second = field(raw[0], 0x7F)?;
        let minute = field(raw[1], 0x7F)?;
        let hour = field(raw[2], 0x3F)?;
        let day = field(raw[3], 0x3F)?;
        let month = field(raw[5], 0x1F)?;
        let year = field(raw[6], 0xFF)?;
        RtcTime::new(2000 + u16::from(year), month, day, hour, minute, second)
            .map_err(|_| RtcError::Corrupt)
    }

    /// Sets the clock.
    ///
    /// # Errors
    ///
    /// [`RtcError::Bus`] on transfer failure.
    pub fn set_time(&mut self, time: &RtcTime) -> Result<(), RtcError> {
        let frame = [
            self.kind.time_register(),
            bin_to_bcd(time.second),
            bin_to_bcd(time.minute),
            bin_to_bcd(time.hour),
            bin_to_bcd(time.day),
            time.weekday(),
            bin_to_bcd(time.month),
            bin_to_bcd((time.year - 2000) as u8),
        ];
        self.bus.write(self.kind.address(), &frame)?;
        log::debug!("rtc: set to {time}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// One register-addressed I2C target.
    struct Chip {
        addr: u16,
        regs: [u8; 32],
        writes: Vec<Vec<u8>>,
    }

    impl I2cBus for Chip {
        fn transfer(&mut self, addr: u16, tx: &[u8], rx: &mut [u8]) -> Result<(), I2cError> {
            if addr != self.addr {
                return Err(I2cError::Abort(crate::i2c::AbortSource::ADDR7_NOACK));
            }
            let start = usize::from(tx[0]);
            if tx.len() > 1 {
                self.writes.push(tx.to_vec());
                self.regs[start..start + tx.len() - 1].copy_from_slice(&tx[1..]);
            }
            rx.copy_from_slice(&self.regs[start..start + rx.len()]);
            Ok(())
        }
    }

    fn chip(kind: RtcType) -> Chip {
        Chip {
            addr: kind.address(),
            regs: [0; 32],
            writes: Vec::new(),
        }
    }

    #[test]
    fn bcd_conversions() {
        assert_eq!(bcd_to_bin(0x59), Some(59));
        assert_eq!(bcd_to_bin(0x5A), None);
        assert_eq!(bin_to_bcd(47), 0x47);
    }

    #[test]
    fn detection_probes_in_order() {
        assert_eq!(Rtc::detect(&mut chip(RtcType::Abeoz9)), Some(RtcType::Abeoz9));
        assert_eq!(Rtc::detect(&mut chip(RtcType::Pcf2127)), Some(RtcType::Pcf2127));
        let mut nothing = chip(RtcType::Pcf2127);
        nothing.addr = 0x10;
        assert_eq!(Rtc::detect(&mut nothing), None);
    }

    #[test]
    fn pcf2127_time_block_starts_at_three() {
        let mut bus = chip(RtcType::Pcf2127);
        bus.regs[3..10].copy_from_slice(&[0x80 | 0x30, 0x15, 0x23, 0x29, 0x04, 0x02, 0x24]);
        let mut rtc = Rtc::new(bus, RtcType::Pcf2127);
        let time = rtc.get_time().unwrap();
        assert_eq!(time, RtcTime::new(2024, 2, 29, 23, 15, 30).unwrap());
    }

    #[test]
    fn set_time_writes_bcd_and_weekday() {
        let mut rtc = Rtc::new(chip(RtcType::Abeoz9), RtcType::Abeoz9);
        let time = RtcTime::new(2026, 10, 19, 8, 5, 0).unwrap();
        rtc.set_time(&time).unwrap();
        assert_eq!(
            rtc.bus.writes[0],
            [0x08, 0x00, 0x05, 0x08, 0x19, 1, 0x10, 0x26]
        );
        assert_eq!(rtc.get_time().unwrap(), time);
    }

    #[test]
    fn garbage_registers_are_corrupt() {
        let mut bus = chip(RtcType::Abeoz9);
        bus.regs[8..15].copy_from_slice(&[0x00, 0x00, 0x00, 0x31, 0x00, 0x02, 0x24]);
        let mut rtc = Rtc::new(bus, RtcType::Abeoz9);
        assert_eq!(rtc.get_time(), Err(RtcError::Corrupt));
    }

    #[test]
    fn invalid_times_are_rejected() {
        assert_eq!(RtcTime::new(2023, 2, 29, 0, 0, 0), Err(RtcError::InvalidTime));
        assert_eq!(RtcTime::new(1999, 1, 1, 0, 0, 0), Err(RtcError::InvalidTime));
        assert_eq!(RtcTime::new(2024, 1, 1, 24, 0, 0), Err(RtcError::InvalidTime));
        assert!(RtcTime::new(2000, 2, 29, 0, 0, 0).is_ok());
    }
}
