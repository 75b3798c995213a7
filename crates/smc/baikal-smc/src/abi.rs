//! SMC function identifiers and return-code handling for the flash service.
//!
//! The numbering must match what the secure monitor dispatches on; changing
//! any of these breaks compatibility with shipped TF-A builds.

use core::fmt;

use baikal_efi::EfiStatus;

// -- Function IDs (SMC32 fast calls, SiP service range)

/// Base of the flash service function-id block.
pub const BAIKAL_SMC_FLASH: u32 = 0x8200_0002;

/// Program `size` bytes from the staging window at flash address `addr`.
pub const BAIKAL_SMC_FLASH_WRITE: u32 = BAIKAL_SMC_FLASH;
/// Erase `size` bytes of flash starting at `addr`.
pub const BAIKAL_SMC_FLASH_ERASE: u32 = BAIKAL_SMC_FLASH + 1;
/// Store four 64-bit words into the staging window at the cursor.
pub const BAIKAL_SMC_FLASH_PUSH: u32 = BAIKAL_SMC_FLASH + 2;
/// Fetch four 64-bit words from the staging window at the cursor.
pub const BAIKAL_SMC_FLASH_PULL: u32 = BAIKAL_SMC_FLASH + 3;
/// Move the staging-window cursor.
pub const BAIKAL_SMC_FLASH_POSITION: u32 = BAIKAL_SMC_FLASH + 4;
/// Copy `size` bytes of flash at `addr` into the staging window.
pub const BAIKAL_SMC_FLASH_READ: u32 = BAIKAL_SMC_FLASH + 5;
/// Query flash geometry: returns `(status, sector_size, sector_count)`.
pub const BAIKAL_SMC_FLASH_INFO: u32 = BAIKAL_SMC_FLASH + 6;
/// Set (`1`) or clear (`0`) the flash write-protect latch.
pub const BAIKAL_SMC_FLASH_LOCK: u32 = BAIKAL_SMC_FLASH + 7;

// -- Staging window geometry

/// Size of the secure-monitor staging window in bytes.
pub const BAIKAL_SMC_FLASH_DATA_SIZE: usize = 1024;

/// Bytes moved by a single PUSH or PULL call (4 × `u64`).
pub const BAIKAL_SMC_FLASH_CHUNK_SIZE: usize = 4 * 8;

/// Return value the monitor uses for an unknown function id.
pub const SMC_UNKNOWN: i64 = -1;

/// Returns a short name for a flash-service function id, for diagnostics.
#[must_use]
pub const fn function_name(func: u32) -> &'static str {
    match func {
        BAIKAL_SMC_FLASH_WRITE => "FLASH_WRITE",
        BAIKAL_SMC_FLASH_ERASE => "FLASH_ERASE",
        BAIKAL_SMC_FLASH_PUSH => "FLASH_PUSH",
        BAIKAL_SMC_FLASH_PULL => "FLASH_PULL",
        BAIKAL_SMC_FLASH_POSITION => "FLASH_POSITION",
        BAIKAL_SMC_FLASH_READ => "FLASH_READ",
        BAIKAL_SMC_FLASH_INFO => "FLASH_INFO",
        BAIKAL_SMC_FLASH_LOCK => "FLASH_LOCK",
        _ => "UNKNOWN",
    }
}

/// Errors reported by the SMC flash client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmcError {
    /// The secure monitor returned a non-zero status for `func`.
    Call {
        /// The function id that failed.
        func: u32,
        /// The raw value of `x0`, interpreted as signed.
        code: i64,
    },
    /// The monitor reported a geometry that cannot describe a flash part.
    BadGeometry,
    /// The request lies outside the flash device.
    OutOfRange,
}

impl SmcError {
    /// Turns a raw `x0` value into `Ok` or an [`SmcError::Call`].
    ///
    /// # Errors
    ///
    /// Any non-zero `x0` is a failure.
    pub fn check(func: u32, x0: u64) -> Result<(), Self> {
        #[allow(clippy::cast_possible_wrap)]
        let code = x0 as i64;
        if code == 0 {
            Ok(())
        } else {
            log::error!(
                "smc {} ({func:#x}) failed: {code}",
                function_name(func)
            );
            Err(Self::Call { func, code })
        }
    }
}

impl fmt::Display for SmcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call { func, code } => {
                write!(f, "{} ({func:#x}) returned {code}", function_name(*func))
            }
            Self::BadGeometry => f.write_str("secure monitor reported invalid flash geometry"),
            Self::OutOfRange => f.write_str("flash access out of range"),
        }
    }
}

impl From<SmcError> for EfiStatus {
    fn from(err: SmcError) -> Self {
        match err {
            SmcError::Call { .. } | SmcError::BadGeometry => EfiStatus::DEVICE_ERROR,
            SmcError::OutOfRange => EfiStatus::INVALID_PARAMETER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_ids_are_fixed() {
        assert_eq!(BAIKAL_SMC_FLASH_WRITE, 0x8200_0002);
        assert_eq!(BAIKAL_SMC_FLASH_ERASE, 0x8200_0003);
        assert_eq!(BAIKAL_SMC_FLASH_PUSH, 0x8200_0004);
        assert_eq!(BAIKAL_SMC_FLASH_PULL, 0x8200_0005);
        assert_eq!(BAIKAL_SMC_FLASH_POSITION, 0x8200_0006);
        assert_eq!(BAIKAL_SMC_FLASH_READ, 0x8200_0007);
        assert_eq!(BAIKAL_SMC_FLASH_INFO, 0x8200_0008);
        assert_eq!(BAIKAL_SMC_FLASH_LOCK, 0x8200_0009);
    }

    #[test]
    fn window_holds_whole_chunks() {
        assert_eq!(BAIKAL_SMC_FLASH_DATA_SIZE % BAIKAL_SMC_FLASH_CHUNK_SIZE, 0);
    }

    #[test]
    fn negative_returns_are_failures() {
        assert_eq!(SmcError::check(BAIKAL_SMC_FLASH_READ, 0), Ok(()));
        #[allow(clippy::cast_sign_loss)]
        let raw = -3i64 as u64;
        assert_eq!(
            SmcError::check(BAIKAL_SMC_FLASH_READ, raw),
            Err(SmcError::Call {
                func: BAIKAL_SMC_FLASH_READ,
                code: -3
            })
        );
    }

    #[test]
    fn call_failures_are_device_errors() {
        let err = SmcError::Call {
            func: BAIKAL_SMC_FLASH_WRITE,
            code: -1,
        };
        assert_eq!(EfiStatus::from(err), EfiStatus::DEVICE_ERROR);
    }
}
