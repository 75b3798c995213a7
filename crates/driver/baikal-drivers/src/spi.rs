//! The SPI bus seam shared by the eSPI controller and the NOR driver.

use core::fmt;

use baikal_efi::EfiStatus;
use baikal_flash::FlashError;
use baikal_mmio::Timeout;

/// SPI transfer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpiError {
    /// A FIFO did not drain or fill within the polling budget.
    Timeout,
    /// The controller has no such chip-select line.
    InvalidChipSelect(u8),
}

impl fmt::Display for SpiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("spi transfer timed out"),
            Self::InvalidChipSelect(cs) => write!(f, "no spi chip select {cs}"),
        }
    }
}

impl From<Timeout> for SpiError {
    fn from(_: Timeout) -> Self {
        Self::Timeout
    }
}

impl From<SpiError> for EfiStatus {
    fn from(err: SpiError) -> Self {
        match err {
            SpiError::Timeout => EfiStatus::TIMEOUT,
            SpiError::InvalidChipSelect(_) => EfiStatus::INVALID_PARAMETER,
        }
    }
}

impl From<SpiError> for FlashError {
    fn from(err: SpiError) -> Self {
        match err {
            SpiError::Timeout => FlashError::Timeout,
            SpiError::InvalidChipSelect(_) => FlashError::Device,
        }
    }
}

/// A half-duplex SPI master.
pub trait SpiBus {
    /// With chip select `cs` asserted, clocks out `tx`, then clocks in
    /// `rx.len()` bytes, then deasserts `cs`.
    ///
    /// # Errors
    ///
    /// [`SpiError`] on timeout or a bad chip select.
    fn transfer(&mut self, cs: u8, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError>;
}

impl<B: SpiBus + ?Sized> SpiBus for &mut B {
    fn transfer(&mut self, cs: u8, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
        (**self).transfer(cs, tx, rx)
    }
}
