//! Bounded busy-wait polling.
//!
//! Every wait on hardware in the BSP is a fixed number of attempts with a
//! fixed delay between them. There is no cancellation and no retry of the
//! operation that was being waited on.

use core::fmt;

use baikal_efi::EfiStatus;

/// Microsecond busy-wait provider.
pub trait Delay {
    /// Stalls for at least `us` microseconds.
    fn delay_us(&mut self, us: u32);
}

impl<D: Delay + ?Sized> Delay for &mut D {
    fn delay_us(&mut self, us: u32) {
        (**self).delay_us(us);
    }
}

/// A [`Delay`] that returns immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDelay;

impl Delay for NoDelay {
    fn delay_us(&mut self, _us: u32) {}
}

/// The polled condition never became true.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeout;

impl fmt::Display for Timeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("timed out waiting for hardware")
    }
}

impl From<Timeout> for EfiStatus {
    fn from(_: Timeout) -> Self {
        EfiStatus::TIMEOUT
    }
}

/// Evaluates `ready` up to `attempts` times, stalling `interval_us` between
/// evaluations.
///
/// # Errors
///
/// [`Timeout`] if `ready` never returned `true`.
pub fn poll_until<D, F>(delay: &mut D, attempts: u32, interval_us: u32, mut ready: F) -> Result<(), Timeout>
where
    D: Delay + ?Sized,
    F: FnMut() -> bool,
{
    for attempt in 0..attempts {
        if ready() {
            return Ok(());
        }
        if attempt + 1 < attempts {
            delay.delay_us(interval_us);
        }
    }
    log::trace!("poll gave up after {attempts} attempts, {interval_us} us apart");
    Err(Timeout)
}
