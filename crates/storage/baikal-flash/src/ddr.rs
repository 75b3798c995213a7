//! Per-port DDR tuning records.
//!
//! The DDR training code reads one [`DdrSettings`] record per memory port
//! from flash and applies every field that is set. A field holding
//! [`UNSET`] means "use the SPD-derived default". Values are stored as
//! impedances in ohms so the record reads the same in a hex dump as on the
//! command line; [`OFF`] disables a termination and [`HI_Z`] selects
//! high impedance where the JEDEC encoding allows it.

use core::fmt;

use baikal_efi::EfiStatus;

/// Serialised size of a record.
pub const RECORD_LEN: usize = 16;
/// Field value meaning "not configured".
pub const UNSET: u8 = 0xFF;
/// Field value meaning "termination disabled".
pub const OFF: u8 = 0;
/// Field value meaning "high impedance" (RTT_WR only).
pub const HI_Z: u8 = 0xFE;

/// A tunable field of the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdrParam {
    /// DRAM output driver impedance (MR1 D.I.C).
    Dic,
    /// Dynamic ODT during writes (MR2 RTT_WR).
    RttWr,
    /// Nominal ODT (MR1 RTT_NOM).
    RttNom,
    /// Park ODT (MR5 RTT_PARK).
    RttPark,
    /// Controller PHY on-die termination.
    PhyOdt,
    /// Controller PHY output driver impedance.
    PhyOdi,
}

/// RTT_NOM and RTT_PARK share one DDR4 code table.
const RTT_CODES: &[(u8, u16)] = &[
    (OFF, 0b000),
    (60, 0b001),
    (120, 0b010),
    (40, 0b011),
    (240, 0b100),
    (48, 0b101),
    (80, 0b110),
    (34, 0b111),
];
const RTT_WR_CODES: &[(u8, u16)] = &[(OFF, 0b000), (120, 0b001), (240, 0b010), (HI_Z, 0b011), (80, 0b100)];
const DIC_CODES: &[(u8, u16)] = &[(34, 0b00), (48, 0b01)];
const PHY_ODT_VALUES: &[(u8, u16)] = &[(40, 0), (48, 0), (60, 0), (80, 0), (120, 0), (240, 0)];
const PHY_ODI_VALUES: &[(u8, u16)] = &[(34, 0), (40, 0), (48, 0), (60, 0), (80, 0)];

impl DdrParam {
    /// All fields, in record order.
    pub const ALL: [Self; 6] = [
        Self::Dic,
        Self::RttWr,
        Self::RttNom,
        Self::RttPark,
        Self::PhyOdt,
        Self::PhyOdi,
    ];

    /// Byte offset of the field in the record.
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Command-line name of the field.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Dic => "dic",
            Self::RttWr => "rttwr",
            Self::RttNom => "rttnom",
            Self::RttPark => "rttpark",
            Self::PhyOdt => "phyodt",
            Self::PhyOdi => "phyodi",
        }
    }

    fn table(self) -> &'static [(u8, u16)] {
        match self {
            Self::Dic => DIC_CODES,
            Self::RttWr => RTT_WR_CODES,
            Self::RttNom | Self::RttPark => RTT_CODES,
            Self::PhyOdt => PHY_ODT_VALUES,
            Self::PhyOdi => PHY_ODI_VALUES,
        }
    }

    /// Whether `value` is a legal setting for this field.
    #[must_use]
    pub fn accepts(self, value: u8) -> bool {
        self.table().iter().any(|(v, _)| *v == value)
    }

    /// Parses a command-line value: `off`, `hiz`, or an impedance in ohms.
    ///
    /// # Errors
    ///
    /// [`DdrError::InvalidValue`] if the text is not a legal setting.
    pub fn parse(self, text: &str) -> Result<u8, DdrError> {
        let value = match text {
            "off" => OFF,
            "hiz" => HI_Z,
            _ => text
                .strip_suffix("ohm")
                .unwrap_or(text)
                .parse::<u8>()
                .map_err(|_| DdrError::InvalidValue(self))?,
        };
        if self.accepts(value) {
            Ok(value)
        } else {
            Err(DdrError::InvalidValue(self))
        }
    }

    /// The DDR4 mode-register bits for `value`, shifted into position.
    ///
    /// Returns `None` for PHY-side fields and for illegal values.
    #[must_use]
    pub fn mode_register_bits(self, value: u8) -> Option<u16> {
        let shift = match self {
            Self::Dic => 1,
            Self::RttNom => 8,
            Self::RttWr => 9,
            Self::RttPark => 6,
            Self::PhyOdt | Self::PhyOdi => return None,
        };
        self.table()
            .iter()
            .find(|(v, _)| *v == value)
            .map(|(_, code)| code << shift)
    }
}

/// Errors from building a DDR settings record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DdrError {
    /// The value is not legal for the field.
    InvalidValue(DdrParam),
    /// The byte image is shorter than a record.
    Truncated,
}

impl fmt::Display for DdrError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidValue(param) => write!(f, "invalid value for --{}", param.name()),
            Self::Truncated => f.write_str("DDR settings record truncated"),
        }
    }
}

impl From<DdrError> for EfiStatus {
    fn from(err: DdrError) -> Self {
        match err {
            DdrError::InvalidValue(_) => EfiStatus::INVALID_PARAMETER,
            DdrError::Truncated => EfiStatus::BAD_BUFFER_SIZE,
        }
    }
}

/// One port's DDR tuning record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DdrSettings {
    raw: [u8; RECORD_LEN],
}

impl Default for DdrSettings {
    fn default() -> Self {
        Self::unset()
    }
}

impl DdrSettings {
    /// A record with every field unset, identical to erased flash.
    #[must_use]
    pub const fn unset() -> Self {
        Self {
            raw: [UNSET; RECORD_LEN],
        }
    }

    /// Decodes a record from flash.
    ///
    /// Fields holding illegal values (for example from a record written by
    /// newer firmware) are treated as unset.
    ///
    /// # Errors
    ///
    /// [`DdrError::Truncated`] if `bytes` is shorter than [`RECORD_LEN`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DdrError> {
        let raw: [u8; RECORD_LEN] = bytes
            .get(..RECORD_LEN)
            .and_then(|b| b.try_into().ok())
            .ok_or(DdrError::Truncated)?;
        let mut settings = Self { raw };
        for param in DdrParam::ALL {
            let value = settings.raw[param.index()];
            if value != UNSET && !param.accepts(value) {
                log::warn!("ignoring stored {} value {value:#x}", param.name());
                settings.raw[param.index()] = UNSET;
            }
        }
        Ok(settings)
    }

    /// Encodes the record for flash.
    #[must_use]
    pub const fn to_bytes(&self) -> [u8; RECORD_LEN] {
        self.raw
    }

    /// The configured value of `param`, if any.
    #[must_use]
    pub fn get(&self, param: DdrParam) -> Option<u8> {
        match self.raw[param.index()] {
            UNSET => None,
            value => Some(value),
        }
    }

    /// Sets `param` to `value`.
    ///
    /// # Errors
    ///
    /// [`DdrError::InvalidValue`] if `value` is not legal for the field.
    pub fn set(&mut self, param: DdrParam, value: u8) -> Result<(), DdrError> {
        if !param.accepts(value) {
            return Err(DdrError::InvalidValue(param));
        }
        self.raw[param.index()] = value;
        Ok(())
    }

    /// Returns `param` to the unset state.
    pub fn clear(&mut self, param: DdrParam) {
        self.raw[param.index()] = UNSET;
    }

    /// Whether no field is set.
    #[must_use]
    pub fn is_unset(&self) -> bool {
        DdrParam::ALL.iter().all(|p| self.get(*p).is_none())
    }
}

/// Formats a field value the way the command line accepts it.
pub struct DisplayValue(pub Option<u8>);

impl fmt::Display for DisplayValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            None => f.write_str("default"),
            Some(OFF) => f.write_str("off"),
            Some(HI_Z) => f.write_str("hiz"),
            Some(ohms) => write!(f, "{ohms}ohm"),
        }
    }
}
