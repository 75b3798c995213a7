//! Command outcomes expressed as UEFI status codes.
//!
//! The firmware tools exit with the low byte of their `EFI_STATUS`. Failures
//! that carry a status travel through `anyhow` as [`StatusError`] so `main`
//! can recover the code; anything else (file I/O, bad config) exits with 1.

use std::fmt;

use baikal_efi::EfiStatus;

/// A failure with a UEFI status attached.
#[derive(Debug)]
pub struct StatusError {
    pub status: EfiStatus,
    message: String,
}

impl fmt::Display for StatusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for StatusError {}

/// Attaches a description to a status-bearing error.
pub trait StatusContext<T> {
    /// Converts the error into a [`StatusError`] described by `context`.
    fn status_context<C: fmt::Display>(self, context: C) -> anyhow::Result<T>;
}

impl<T, E> StatusContext<T> for Result<T, E>
where
    E: Into<EfiStatus> + fmt::Display,
{
    fn status_context<C: fmt::Display>(self, context: C) -> anyhow::Result<T> {
        self.map_err(|err| {
            let message = format!("{context}: {err}");
            StatusError {
                status: err.into(),
                message,
            }
            .into()
        })
    }
}

/// The status an error should exit with.
pub fn status_of(err: &anyhow::Error) -> Option<EfiStatus> {
    err.chain()
        .find_map(|cause| cause.downcast_ref::<StatusError>())
        .map(|err| err.status)
}

/// Process exit code for `status`.
pub fn exit_code(status: EfiStatus) -> u8 {
    u8::try_from(status.code() & 0xFF).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;
    use baikal_flash::FlashError;

    #[test]
    fn exit_codes_are_low_byte() {
        assert_eq!(exit_code(EfiStatus::SUCCESS), 0);
        assert_eq!(exit_code(EfiStatus::INVALID_PARAMETER), 2);
        assert_eq!(exit_code(EfiStatus::DEVICE_ERROR), 7);
        assert_eq!(exit_code(EfiStatus::CRC_ERROR), 0x1b);
    }

    #[test]
    fn status_survives_extra_context() {
        let err = Err::<(), _>(FlashError::Unaligned)
            .status_context("erase 0x10+0x100")
            .context("spi-flash")
            .unwrap_err();
        assert_eq!(status_of(&err), Some(EfiStatus::INVALID_PARAMETER));
        assert!(format!("{err:#}").contains("not sector-aligned"));
    }

    #[test]
    fn plain_errors_have_no_status() {
        let err = anyhow::anyhow!("no such file");
        assert_eq!(status_of(&err), None);
    }
}
