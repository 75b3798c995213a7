//! Write-protect bracketing and read-modify-erase-write.
//!
//! Erase only works on whole sectors and programming only clears bits, so any
//! update smaller than a sector must read the enclosing sectors, patch them
//! in memory, erase, and program them back. None of this is power-fail safe:
//! a reset between the erase and the final program leaves the sectors blank.

use alloc::vec;

use crate::device::{FlashDevice, FlashError};

/// Runs `f` with the write-protect latch cleared, then sets it again.
///
/// The relock is attempted on every path, including when the unlock or `f`
/// itself failed. The first error wins; a relock failure after an earlier
/// error is logged.
///
/// # Errors
///
/// The unlock error, `f`'s error, or the relock error, in that order.
pub fn with_unlocked<D, T, F>(dev: &mut D, f: F) -> Result<T, FlashError>
where
    D: FlashDevice + ?Sized,
    F: FnOnce(&mut D) -> Result<T, FlashError>,
{
    let result = match dev.set_locked(false) {
        Ok(()) => f(dev),
        Err(err) => Err(err),
    };
    let relock = dev.set_locked(true);

    match (result, relock) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) => {
            log::error!("flash relock failed: {err}");
            Err(err)
        }
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(relock_err)) => {
            log::error!("flash relock failed after {err}: {relock_err}");
            Err(err)
        }
    }
}

/// Returns the smallest sector-aligned `(start, len)` covering
/// `[addr, addr + len)`.
///
/// # Errors
///
/// [`FlashError::BadGeometry`] if `sector` is not a power of two,
/// [`FlashError::OutOfRange`] on arithmetic overflow.
pub fn erase_window(addr: u64, len: u64, sector: u64) -> Result<(u64, u64), FlashError> {
    if !sector.is_power_of_two() {
        return Err(FlashError::BadGeometry);
    }
    let mask = sector - 1;
    let start = addr & !mask;
    let end = addr
        .checked_add(len)
        .and_then(|end| end.checked_add(mask))
        .ok_or(FlashError::OutOfRange)?
        & !mask;
    Ok((start, end - start))
}

/// Replaces `data.len()` bytes at `addr`, preserving the rest of every sector
/// the range touches.
///
/// Reads the erase window, overlays `data`, then erases and reprograms the
/// window with the latch cleared. Not atomic: on failure after the erase the
/// window may hold neither the old nor the new content.
///
/// # Errors
///
/// [`FlashError::OutOfRange`] before any access if the range does not fit
/// the part; otherwise the first device error.
pub fn update_region<D>(dev: &mut D, addr: u64, data: &[u8]) -> Result<(), FlashError>
where
    D: FlashDevice + ?Sized,
{
    if data.is_empty() {
        return Ok(());
    }
    let geometry = dev.geometry()?;
    let len = data.len() as u64;
    geometry.check_range(addr, len)?;

    let (start, window_len) = erase_window(addr, len, geometry.sector_size)?;
    let window_len = usize::try_from(window_len).map_err(|_| FlashError::OutOfRange)?;
    let offset = usize::try_from(addr - start).map_err(|_| FlashError::OutOfRange)?;

    let mut scratch = vec![0u8; window_len];
    dev.read(start, &mut scratch)?;
    scratch[offset..offset + data.len()].copy_from_slice(data);

    log::debug!(
        "flash update {addr:#x}+{len:#x} via window {start:#x}+{window_len:#x}"
    );
    with_unlocked(dev, |dev| {
        dev.erase(start, window_len as u64)?;
        dev.write(start, &scratch)
    })
}
