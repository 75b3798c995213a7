//! Chunked flash access through the secure-monitor staging window.
//!
//! [`SmcFlash`] keeps no state of its own beyond the conduit: the window and
//! its cursor live in the secure monitor for the duration of one call chain,
//! and every transfer starts by resetting the cursor to zero.
//!
//! Transfers are not atomic. A failure part-way through a multi-chunk read
//! leaves the output buffer partially filled; a failure part-way through a
//! multi-chunk write leaves flash partially programmed.

use crate::abi::{
    BAIKAL_SMC_FLASH_CHUNK_SIZE, BAIKAL_SMC_FLASH_DATA_SIZE, BAIKAL_SMC_FLASH_ERASE,
    BAIKAL_SMC_FLASH_INFO, BAIKAL_SMC_FLASH_LOCK, BAIKAL_SMC_FLASH_POSITION,
    BAIKAL_SMC_FLASH_PULL, BAIKAL_SMC_FLASH_PUSH, BAIKAL_SMC_FLASH_READ, BAIKAL_SMC_FLASH_WRITE,
    SmcError,
};
use crate::conduit::SmcConduit;

/// Flash geometry as reported by the secure monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashInfo {
    /// Erase granularity in bytes.
    pub sector_size: u64,
    /// Number of erase sectors.
    pub sector_count: u64,
}

impl FlashInfo {
    /// Total addressable size of the device in bytes. [`SmcFlash::info`]
    /// only returns geometries whose size fits a `u64`.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.sector_size.saturating_mul(self.sector_count)
    }
}

/// Packs up to 32 bytes into the four little-endian words of a PUSH.
fn pack_words(bytes: &[u8]) -> [u64; 4] {
    let mut staged = [0u8; BAIKAL_SMC_FLASH_CHUNK_SIZE];
    staged[..bytes.len()].copy_from_slice(bytes);
    let mut words = [0u64; 4];
    for (word, raw) in words.iter_mut().zip(staged.chunks_exact(8)) {
        let mut le = [0u8; 8];
        le.copy_from_slice(raw);
        *word = u64::from_le_bytes(le);
    }
    words
}

/// Unpacks the four words of a PULL into `out` (at most 32 bytes).
fn unpack_words(words: [u64; 4], out: &mut [u8]) {
    let mut staged = [0u8; BAIKAL_SMC_FLASH_CHUNK_SIZE];
    for (raw, word) in staged.chunks_exact_mut(8).zip(words) {
        raw.copy_from_slice(&word.to_le_bytes());
    }
    let n = out.len();
    out.copy_from_slice(&staged[..n]);
}

/// Flash client speaking the Baikal SMC flash protocol over a conduit.
pub struct SmcFlash<C: SmcConduit> {
    conduit: C,
}

impl<C: SmcConduit> SmcFlash<C> {
    /// Wraps a conduit.
    pub const fn new(conduit: C) -> Self {
        Self { conduit }
    }

    /// Returns the underlying conduit.
    pub fn into_inner(self) -> C {
        self.conduit
    }

    /// Borrows the underlying conduit.
    pub fn conduit(&self) -> &C {
        &self.conduit
    }

    /// Mutably borrows the underlying conduit.
    pub fn conduit_mut(&mut self) -> &mut C {
        &mut self.conduit
    }

    /// Issues `func` and checks `x0` for success.
    fn checked(&mut self, func: u32, args: [u64; 6]) -> Result<[u64; 4], SmcError> {
        let ret = self.conduit.call(func, args);
        SmcError::check(func, ret[0])?;
        Ok(ret)
    }

    /// Queries the flash geometry.
    ///
    /// The monitor may report a different part after a power cycle, so
    /// drivers query this at init instead of assuming a constant.
    ///
    /// # Errors
    ///
    /// Fails if the call fails or the reported geometry is empty, has a
    /// sector size that is not a power of two, or overflows a `u64`.
    pub fn info(&mut self) -> Result<FlashInfo, SmcError> {
        let ret = self.checked(BAIKAL_SMC_FLASH_INFO, [0; 6])?;
        let info = FlashInfo {
            sector_size: ret[1],
            sector_count: ret[2],
        };
        if info.sector_count == 0
            || !info.sector_size.is_power_of_two()
            || info.sector_size.checked_mul(info.sector_count).is_none()
        {
            log::error!(
                "smc: bad flash geometry {:#x} x {:#x}",
                info.sector_size,
                info.sector_count
            );
            return Err(SmcError::BadGeometry);
        }
        Ok(info)
    }

    /// Sets or clears the write-protect latch.
    ///
    /// # Errors
    ///
    /// Fails if the monitor rejects the request.
    pub fn lock(&mut self, locked: bool) -> Result<(), SmcError> {
        log::debug!("smc flash {}", if locked { "lock" } else { "unlock" });
        self.checked(BAIKAL_SMC_FLASH_LOCK, [u64::from(locked), 0, 0, 0, 0, 0])?;
        Ok(())
    }

    /// Reads `buf.len()` bytes starting at `addr`.
    ///
    /// # Errors
    ///
    /// Fails on the first rejected call; `buf` may be partially filled.
    pub fn read(&mut self, addr: u64, buf: &mut [u8]) -> Result<(), SmcError> {
        let mut addr = addr;
        for window in buf.chunks_mut(BAIKAL_SMC_FLASH_DATA_SIZE) {
            let len = window.len() as u64;
            log::trace!("smc flash read {addr:#x}+{len:#x}");
            self.checked(BAIKAL_SMC_FLASH_READ, [addr, len, 0, 0, 0, 0])?;
            self.checked(BAIKAL_SMC_FLASH_POSITION, [0; 6])?;
            for sub in window.chunks_mut(BAIKAL_SMC_FLASH_CHUNK_SIZE) {
                // PULL returns data in all four result registers.
                let words = self.conduit.call(BAIKAL_SMC_FLASH_PULL, [0; 6]);
                unpack_words(words, sub);
            }
            addr += len;
        }
        Ok(())
    }

    /// Programs `buf` at `addr`.
    ///
    /// The target range must already be erased; the monitor only clears bits.
    ///
    /// # Errors
    ///
    /// Fails on the first rejected call; earlier windows stay programmed.
    pub fn write(&mut self, addr: u64, buf: &[u8]) -> Result<(), SmcError> {
        let mut addr = addr;
        for window in buf.chunks(BAIKAL_SMC_FLASH_DATA_SIZE) {
            let len = window.len() as u64;
            log::trace!("smc flash write {addr:#x}+{len:#x}");
            self.checked(BAIKAL_SMC_FLASH_POSITION, [0; 6])?;
            for sub in window.chunks(BAIKAL_SMC_FLASH_CHUNK_SIZE) {
                let [w0, w1, w2, w3] = pack_words(sub);
                self.checked(BAIKAL_SMC_FLASH_PUSH, [w0, w1, w2, w3, 0, 0])?;
            }
            self.checked(BAIKAL_SMC_FLASH_WRITE, [addr, len, 0, 0, 0, 0])?;
            addr += len;
        }
        Ok(())
    }

    /// Erases `size` bytes at `addr` with a single call.
    ///
    /// Sector alignment is the caller's job.
    ///
    /// # Errors
    ///
    /// Fails if the monitor rejects the erase.
    pub fn erase(&mut self, addr: u64, size: u64) -> Result<(), SmcError> {
        log::trace!("smc flash erase {addr:#x}+{size:#x}");
        self.checked(BAIKAL_SMC_FLASH_ERASE, [addr, size, 0, 0, 0, 0])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec::Vec;

    /// Records every call and answers with a scripted value.
    #[derive(Default)]
    struct Recorder {
        calls: Vec<(u32, [u64; 6])>,
        fail: Option<u32>,
    }

    impl SmcConduit for Recorder {
        fn call(&mut self, func: u32, args: [u64; 6]) -> [u64; 4] {
            self.calls.push((func, args));
            if self.fail == Some(func) {
                #[allow(clippy::cast_sign_loss)]
                return [-1i64 as u64, 0, 0, 0];
            }
            match func {
                BAIKAL_SMC_FLASH_INFO => [0, 4096, 16, 0],
                BAIKAL_SMC_FLASH_PULL => [0x0807_0605_0403_0201, 0, 0, 0],
                _ => [0; 4],
            }
        }
    }

    fn funcs(rec: &Recorder) -> Vec<u32> {
        rec.calls.iter().map(|(f, _)| *f).collect()
    }

    #[test]
    fn words_pack_little_endian() {
        let words = pack_words(&[1, 2, 3, 4, 5, 6, 7, 8, 9]);
        assert_eq!(words, [0x0807_0605_0403_0201, 0x09, 0, 0]);
    }

    #[test]
    fn info_reports_geometry() {
        let mut flash = SmcFlash::new(Recorder::default());
        let info = flash.info().unwrap();
        assert_eq!(info.sector_size, 4096);
        assert_eq!(info.size(), 64 * 1024);
    }

    /// Answers INFO with a fixed geometry.
    struct Geometry(u64, u64);

    impl SmcConduit for Geometry {
        fn call(&mut self, _func: u32, _args: [u64; 6]) -> [u64; 4] {
            [0, self.0, self.1, 0]
        }
    }

    #[test]
    fn info_rejects_unusable_geometry() {
        for (size, count) in [(0, 16), (4096, 0), (3000, 16), (1 << 40, 1 << 30), (4096, u64::MAX)] {
            let mut flash = SmcFlash::new(Geometry(size, count));
            assert_eq!(flash.info(), Err(SmcError::BadGeometry), "{size:#x} x {count:#x}");
        }
        let mut flash = SmcFlash::new(Geometry(1 << 32, 1 << 31));
        assert_eq!(flash.info().unwrap().size(), 1 << 63);
    }

    #[test]
    fn small_read_is_one_window() {
        let mut flash = SmcFlash::new(Recorder::default());
        let mut buf = [0u8; 40];
        flash.read(0x100, &mut buf).unwrap();

        let rec = flash.into_inner();
        assert_eq!(
            funcs(&rec),
            [
                BAIKAL_SMC_FLASH_READ,
                BAIKAL_SMC_FLASH_POSITION,
                BAIKAL_SMC_FLASH_PULL,
                BAIKAL_SMC_FLASH_PULL,
            ]
        );
        assert_eq!(rec.calls[0].1[..2], [0x100, 40]);
        assert_eq!(&buf[..8], &[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(&buf[32..40], &[1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn large_write_splits_on_window() {
        let mut flash = SmcFlash::new(Recorder::default());
        let data = [0x5Au8; BAIKAL_SMC_FLASH_DATA_SIZE + 64];
        flash.write(0x2000, &data).unwrap();

        let rec = flash.into_inner();
        let writes: Vec<[u64; 6]> = rec
            .calls
            .iter()
            .filter(|(f, _)| *f == BAIKAL_SMC_FLASH_WRITE)
            .map(|(_, a)| *a)
            .collect();
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0][..2], [0x2000, 1024]);
        assert_eq!(writes[1][..2], [0x2400, 64]);

        let pushes = funcs(&rec)
            .into_iter()
            .filter(|f| *f == BAIKAL_SMC_FLASH_PUSH)
            .count();
        assert_eq!(pushes, 1024 / 32 + 2);
        assert_eq!(rec.calls[0].0, BAIKAL_SMC_FLASH_POSITION);
    }

    #[test]
    fn failed_push_stops_before_write() {
        let mut flash = SmcFlash::new(Recorder {
            fail: Some(BAIKAL_SMC_FLASH_PUSH),
            ..Recorder::default()
        });
        let err = flash.write(0, &[0u8; 64]).unwrap_err();
        assert!(matches!(err, SmcError::Call { func: BAIKAL_SMC_FLASH_PUSH, .. }));
        assert!(!funcs(flash.conduit()).contains(&BAIKAL_SMC_FLASH_WRITE));
    }

    #[test]
    fn empty_transfers_issue_no_calls() {
        let mut flash = SmcFlash::new(Recorder::default());
        flash.read(0, &mut []).unwrap();
        flash.write(0, &[]).unwrap();
        assert!(flash.conduit().calls.is_empty());
    }

    #[test]
    fn erase_is_a_single_call() {
        let mut flash = SmcFlash::new(Recorder::default());
        flash.erase(0x1_0000, 0x4_0000).unwrap();
        assert_eq!(funcs(flash.conduit()), [BAIKAL_SMC_FLASH_ERASE]);
    }

    #[test]
    fn lock_passes_flag() {
        let mut flash = SmcFlash::new(Recorder::default());
        flash.lock(false).unwrap();
        flash.lock(true).unwrap();
        let rec = flash.into_inner();
        assert_eq!(rec.calls[0].1[0], 0);
        assert_eq!(rec.calls[1].1[0], 1);
    }
}
