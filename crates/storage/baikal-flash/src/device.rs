//! The flash device interface and its error type.

use core::fmt;

use baikal_efi::EfiStatus;
use baikal_smc::{SmcConduit, SmcError, SmcFlash};

/// Errors that can occur while talking to a flash device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    /// The secure monitor rejected a call.
    Smc(SmcError),
    /// The device reported a hardware error.
    Device,
    /// The device did not finish an operation within its polling budget.
    Timeout,
    /// The request lies outside the device or region.
    OutOfRange,
    /// An erase was requested on a range that is not sector-aligned.
    Unaligned,
    /// The device geometry or a region description is unusable.
    BadGeometry,
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Smc(err) => write!(f, "secure monitor: {err}"),
            Self::Device => f.write_str("flash device error"),
            Self::Timeout => f.write_str("flash operation timed out"),
            Self::OutOfRange => f.write_str("flash access out of range"),
            Self::Unaligned => f.write_str("erase range is not sector-aligned"),
            Self::BadGeometry => f.write_str("unusable flash geometry"),
        }
    }
}

impl From<SmcError> for FlashError {
    fn from(err: SmcError) -> Self {
        match err {
            SmcError::OutOfRange => Self::OutOfRange,
            SmcError::BadGeometry => Self::BadGeometry,
            SmcError::Call { .. } => Self::Smc(err),
        }
    }
}

impl From<FlashError> for EfiStatus {
    fn from(err: FlashError) -> Self {
        match err {
            FlashError::Smc(_) | FlashError::Device | FlashError::BadGeometry => {
                EfiStatus::DEVICE_ERROR
            }
            FlashError::Timeout => EfiStatus::TIMEOUT,
            FlashError::OutOfRange | FlashError::Unaligned => EfiStatus::INVALID_PARAMETER,
        }
    }
}

/// Erase geometry of a flash part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashGeometry {
    /// Erase granularity in bytes (a power of two).
    pub sector_size: u64,
    /// Number of erase sectors.
    pub sector_count: u64,
}

impl FlashGeometry {
    /// Total size of the part in bytes, saturating at `u64::MAX`.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.sector_size.saturating_mul(self.sector_count)
    }

    /// Checks that `[addr, addr + len)` lies inside the part.
    ///
    /// # Errors
    ///
    /// [`FlashError::OutOfRange`] if it does not.
    pub fn check_range(&self, addr: u64, len: u64) -> Result<(), FlashError> {
        match addr.checked_add(len) {
            Some(end) if end <= self.size() => Ok(()),
            _ => Err(FlashError::OutOfRange),
        }
    }
}

/// A NOR-style flash part.
///
/// Implementations issue exactly the hardware operations asked for: no
/// implicit erase, no implicit unlock, no retries. Callers that need
/// partial-sector updates go through [`crate::update_region`].
pub trait FlashDevice {
    /// Queries the part geometry.
    ///
    /// # Errors
    ///
    /// Fails if the device cannot be queried.
    fn geometry(&mut self) -> Result<FlashGeometry, FlashError>;

    /// Reads `buf.len()` bytes at `addr`.
    ///
    /// # Errors
    ///
    /// Fails on the first device error; `buf` may be partially filled.
    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), FlashError>;

    /// Programs `buf` at `addr`. The range must be erased and unlocked.
    ///
    /// # Errors
    ///
    /// Fails on the first device error; flash may be partially programmed.
    fn write(&mut self, addr: u64, buf: &[u8]) -> Result<(), FlashError>;

    /// Erases `len` bytes at `addr`. The range must be unlocked.
    ///
    /// # Errors
    ///
    /// Fails if the device rejects the erase.
    fn erase(&mut self, addr: u64, len: u64) -> Result<(), FlashError>;

    /// Sets or clears the write-protect latch.
    ///
    /// # Errors
    ///
    /// Fails if the latch could not be changed.
    fn set_locked(&mut self, locked: bool) -> Result<(), FlashError>;
}

impl<D: FlashDevice + ?Sized> FlashDevice for &mut D {
    fn geometry(&mut self) -> Result<FlashGeometry, FlashError> {
        (**self).geometry()
    }

    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), FlashError> {
        (**self).read(addr, buf)
    }

    fn write(&mut self, addr: u64, buf: &[u8]) -> Result<(), FlashError> {
        (**self).write(addr, buf)
    }

    fn erase(&mut self, addr: u64, len: u64) -> Result<(), FlashError> {
        (**self).erase(addr, len)
    }

    fn set_locked(&mut self, locked: bool) -> Result<(), FlashError> {
        (**self).set_locked(locked)
    }
}

impl<C: SmcConduit> FlashDevice for SmcFlash<C> {
    fn geometry(&mut self) -> Result<FlashGeometry, FlashError> {
        let info = self.info()?;
        Ok(FlashGeometry {
            sector_size: info.sector_size,
            sector_count: info.sector_count,
        })
    }

    fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), FlashError> {
        Ok(SmcFlash::read(self, addr, buf)?)
    }

    fn write(&mut self, addr: u64, buf: &[u8]) -> Result<(), FlashError> {
        Ok(SmcFlash::write(self, addr, buf)?)
    }

    fn erase(&mut self, addr: u64, len: u64) -> Result<(), FlashError> {
        Ok(SmcFlash::erase(self, addr, len)?)
    }

    fn set_locked(&mut self, locked: bool) -> Result<(), FlashError> {
        Ok(self.lock(locked)?)
    }
}
