//! UEFI status codes.
//!
//! [`EfiStatus`] wraps a `usize` exactly like `EFI_STATUS`. The high bit marks
//! an error; non-zero values without it are warnings. Only the codes that the
//! BSP drivers and shell tools actually produce or inspect are named here.

use core::fmt;

/// The high bit of `usize`, used to distinguish error codes from warnings.
const ERROR_BIT: usize = 1 << (usize::BITS - 1);

/// A UEFI status code.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EfiStatus(pub usize);

impl EfiStatus {
    /// The operation completed successfully.
    pub const SUCCESS: Self = Self(0);

    /// The resulting buffer was too small, and the data was truncated.
    pub const WARN_BUFFER_TOO_SMALL: Self = Self(4);

    /// The image failed to load.
    pub const LOAD_ERROR: Self = Self(ERROR_BIT | 1);
    /// A parameter was incorrect.
    pub const INVALID_PARAMETER: Self = Self(ERROR_BIT | 2);
    /// The operation is not supported.
    pub const UNSUPPORTED: Self = Self(ERROR_BIT | 3);
    /// The buffer was not the proper size for the request.
    pub const BAD_BUFFER_SIZE: Self = Self(ERROR_BIT | 4);
    /// The buffer is not large enough to hold the requested data.
    pub const BUFFER_TOO_SMALL: Self = Self(ERROR_BIT | 5);
    /// The device is not ready to accept the request.
    pub const NOT_READY: Self = Self(ERROR_BIT | 6);
    /// The physical device reported an error while attempting the operation.
    pub const DEVICE_ERROR: Self = Self(ERROR_BIT | 7);
    /// The device cannot be written to.
    pub const WRITE_PROTECTED: Self = Self(ERROR_BIT | 8);
    /// A resource has run out.
    pub const OUT_OF_RESOURCES: Self = Self(ERROR_BIT | 9);
    /// The device does not contain any medium to perform the operation.
    pub const NO_MEDIA: Self = Self(ERROR_BIT | 0x0c);
    /// The medium in the device has changed since the last access.
    pub const MEDIA_CHANGED: Self = Self(ERROR_BIT | 0x0d);
    /// The item was not found.
    pub const NOT_FOUND: Self = Self(ERROR_BIT | 0x0e);
    /// Access was denied.
    pub const ACCESS_DENIED: Self = Self(ERROR_BIT | 0x0f);
    /// The target did not respond.
    pub const NO_RESPONSE: Self = Self(ERROR_BIT | 0x10);
    /// The timeout time expired.
    pub const TIMEOUT: Self = Self(ERROR_BIT | 0x12);
    /// The operation was aborted.
    pub const ABORTED: Self = Self(ERROR_BIT | 0x15);
    /// The function encountered an internal version that was incompatible.
    pub const INCOMPATIBLE_VERSION: Self = Self(ERROR_BIT | 0x19);
    /// A CRC error was detected.
    pub const CRC_ERROR: Self = Self(ERROR_BIT | 0x1b);
    /// Beginning or end of media was reached.
    pub const END_OF_MEDIA: Self = Self(ERROR_BIT | 0x1c);

    /// Returns `true` if this status code indicates success.
    #[inline]
    #[must_use]
    pub const fn is_success(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if this status code indicates an error (high bit set).
    #[inline]
    #[must_use]
    pub const fn is_error(self) -> bool {
        self.0 & ERROR_BIT != 0
    }

    /// Returns `true` if this status code indicates a warning.
    #[inline]
    #[must_use]
    pub const fn is_warning(self) -> bool {
        !self.is_success() && !self.is_error()
    }

    /// Converts this status code to a `Result`, treating warnings as success.
    ///
    /// # Errors
    ///
    /// Returns `Err(self)` if the status code has the error bit set.
    #[inline]
    pub const fn to_result(self) -> Result<(), Self> {
        if self.is_error() { Err(self) } else { Ok(()) }
    }

    /// The status code with the error bit stripped.
    ///
    /// Shell tools use the low byte of this as their process exit code, so
    /// `EFI_INVALID_PARAMETER` exits with 2 and `EFI_DEVICE_ERROR` with 7.
    #[inline]
    #[must_use]
    pub const fn code(self) -> usize {
        self.0 & !ERROR_BIT
    }

    /// Returns the `EFI_*` name of the status code, if known.
    #[must_use]
    pub const fn name(self) -> Option<&'static str> {
        match self {
            Self::SUCCESS => Some("EFI_SUCCESS"),
            Self::WARN_BUFFER_TOO_SMALL => Some("EFI_WARN_BUFFER_TOO_SMALL"),
            Self::LOAD_ERROR => Some("EFI_LOAD_ERROR"),
            Self::INVALID_PARAMETER => Some("EFI_INVALID_PARAMETER"),
            Self::UNSUPPORTED => Some("EFI_UNSUPPORTED"),
            Self::BAD_BUFFER_SIZE => Some("EFI_BAD_BUFFER_SIZE"),
            Self::BUFFER_TOO_SMALL => Some("EFI_BUFFER_TOO_SMALL"),
            Self::NOT_READY => Some("EFI_NOT_READY"),
            Self::DEVICE_ERROR => Some("EFI_DEVICE_ERROR"),
            Self::WRITE_PROTECTED => Some("EFI_WRITE_PROTECTED"),
            Self::OUT_OF_RESOURCES => Some("EFI_OUT_OF_RESOURCES"),
            Self::NO_MEDIA => Some("EFI_NO_MEDIA"),
            Self::MEDIA_CHANGED => Some("EFI_MEDIA_CHANGED"),
            Self::NOT_FOUND => Some("EFI_NOT_FOUND"),
            Self::ACCESS_DENIED => Some("EFI_ACCESS_DENIED"),
            Self::NO_RESPONSE => Some("EFI_NO_RESPONSE"),
            Self::TIMEOUT => Some("EFI_TIMEOUT"),
            Self::ABORTED => Some("EFI_ABORTED"),
            Self::INCOMPATIBLE_VERSION => Some("EFI_INCOMPATIBLE_VERSION"),
            Self::CRC_ERROR => Some("EFI_CRC_ERROR"),
            Self::END_OF_MEDIA => Some("EFI_END_OF_MEDIA"),
            _ => None,
        }
    }
}

impl fmt::Debug for EfiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "EfiStatus({name})"),
            None => write!(f, "EfiStatus({:#x})", self.0),
        }
    }
}

impl fmt::Display for EfiStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None if self.is_error() => write!(f, "Unknown error ({:#x})", self.code()),
            None => write!(f, "Unknown warning ({})", self.0),
        }
    }
}

#[cfg(target_pointer_width = "64")]
const _: () = assert!(core::mem::size_of::<EfiStatus>() == 8);
