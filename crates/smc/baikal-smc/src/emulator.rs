//! Host-side emulation of the TF-A flash service.
//!
//! [`FlashEmulator`] answers the flash function ids the way the secure
//! monitor does, over an in-memory NOR part: erase sets bytes to `0xFF`,
//! programming can only clear bits, and the write-protect latch starts set.
//! It backs the shell tools on a host and the integration tests.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use crate::abi::{
    BAIKAL_SMC_FLASH_CHUNK_SIZE, BAIKAL_SMC_FLASH_DATA_SIZE, BAIKAL_SMC_FLASH_ERASE,
    BAIKAL_SMC_FLASH_INFO, BAIKAL_SMC_FLASH_LOCK, BAIKAL_SMC_FLASH_POSITION,
    BAIKAL_SMC_FLASH_PULL, BAIKAL_SMC_FLASH_PUSH, BAIKAL_SMC_FLASH_READ, BAIKAL_SMC_FLASH_WRITE,
    SMC_UNKNOWN,
};
use crate::conduit::SmcConduit;
use crate::flash::FlashInfo;

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

// Negative return codes used by the monitor.
const E_INVALID: i64 = -2;
const E_DENIED: i64 = -3;
const E_INJECTED: i64 = -6;

#[allow(clippy::cast_sign_loss)]
const fn status(code: i64) -> [u64; 4] {
    [code as u64, 0, 0, 0]
}

const OK: [u64; 4] = [0; 4];

/// In-memory secure-monitor flash service.
pub struct FlashEmulator {
    info: FlashInfo,
    flash: Vec<u8>,
    window: [u8; BAIKAL_SMC_FLASH_DATA_SIZE],
    cursor: usize,
    locked: bool,
    calls: BTreeMap<u32, usize>,
    fail_in: Option<usize>,
}

impl FlashEmulator {
    /// Creates an erased part with the given geometry.
    ///
    /// # Panics
    ///
    /// Panics if the geometry does not fit in host memory.
    #[must_use]
    pub fn new(sector_size: u64, sector_count: u64) -> Self {
        let info = FlashInfo {
            sector_size,
            sector_count,
        };
        let size = usize::try_from(info.size()).expect("flash size exceeds address space");
        Self {
            info,
            flash: vec![ERASED; size],
            window: [0; BAIKAL_SMC_FLASH_DATA_SIZE],
            cursor: 0,
            locked: true,
            calls: BTreeMap::new(),
            fail_in: None,
        }
    }

    /// Creates a part preloaded with `image`, padded with erased bytes.
    ///
    /// Returns `None` if the image is larger than the part.
    #[must_use]
    pub fn with_image(sector_size: u64, sector_count: u64, image: &[u8]) -> Option<Self> {
        let mut emu = Self::new(sector_size, sector_count);
        emu.flash.get_mut(..image.len())?.copy_from_slice(image);
        Some(emu)
    }

    /// The emulated geometry.
    #[must_use]
    pub fn info(&self) -> FlashInfo {
        self.info
    }

    /// Raw flash contents.
    #[must_use]
    pub fn contents(&self) -> &[u8] {
        &self.flash
    }

    /// Mutable raw flash contents, bypassing the write-protect latch.
    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.flash
    }

    /// Whether the write-protect latch is currently set.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Number of calls received for `func`.
    #[must_use]
    pub fn call_count(&self, func: u32) -> usize {
        self.calls.get(&func).copied().unwrap_or(0)
    }

    /// Total number of calls received.
    #[must_use]
    pub fn total_calls(&self) -> usize {
        self.calls.values().sum()
    }

    /// Forgets the call counters.
    pub fn reset_counters(&mut self) {
        self.calls.clear();
    }

    /// Makes the `n`-th call from now (1-based) fail.
    pub fn fail_after(&mut self, n: usize) {
        self.fail_in = Some(n);
    }

    /// Resolves `[addr, addr + size)` against the part and the window.
    fn span(&self, addr: u64, size: u64, window_bound: bool) -> Option<core::ops::Range<usize>> {
        let start = usize::try_from(addr).ok()?;
        let len = usize::try_from(size).ok()?;
        let end = start.checked_add(len)?;
        if end > self.flash.len() || (window_bound && len > BAIKAL_SMC_FLASH_DATA_SIZE) {
            return None;
        }
        Some(start..end)
    }

    fn read(&mut self, addr: u64, size: u64) -> [u64; 4] {
        let Some(range) = self.span(addr, size, true) else {
            return status(E_INVALID);
        };
        let len = range.len();
        self.window[..len].copy_from_slice(&self.flash[range]);
        OK
    }

    fn write(&mut self, addr: u64, size: u64) -> [u64; 4] {
        if self.locked {
            return status(E_DENIED);
        }
        let Some(range) = self.span(addr, size, true) else {
            return status(E_INVALID);
        };
        for (dst, src) in self.flash[range].iter_mut().zip(self.window.iter()) {
            *dst &= *src;
        }
        OK
    }

    fn erase(&mut self, addr: u64, size: u64) -> [u64; 4] {
        if self.locked {
            return status(E_DENIED);
        }
        let sector = self.info.sector_size;
        if addr % sector != 0 || size % sector != 0 {
            return status(E_INVALID);
        }
        let Some(range) = self.span(addr, size, false) else {
            return status(E_INVALID);
        };
        self.flash[range].fill(ERASED);
        OK
    }

    fn push(&mut self, words: &[u64]) -> [u64; 4] {
        let end = self.cursor + BAIKAL_SMC_FLASH_CHUNK_SIZE;
        if end > BAIKAL_SMC_FLASH_DATA_SIZE {
            return status(E_INVALID);
        }
        for (raw, word) in self.window[self.cursor..end].chunks_exact_mut(8).zip(words) {
            raw.copy_from_slice(&word.to_le_bytes());
        }
        self.cursor = end;
        OK
    }

    fn pull(&mut self) -> [u64; 4] {
        let end = self.cursor + BAIKAL_SMC_FLASH_CHUNK_SIZE;
        let mut words = [0u64; 4];
        if end <= BAIKAL_SMC_FLASH_DATA_SIZE {
            for (word, raw) in words.iter_mut().zip(self.window[self.cursor..end].chunks_exact(8)) {
                let mut le = [0u8; 8];
                le.copy_from_slice(raw);
                *word = u64::from_le_bytes(le);
            }
            self.cursor = end;
        }
        words
    }

    fn position(&mut self, pos: u64) -> [u64; 4] {
        match usize::try_from(pos) {
            Ok(pos) if pos < BAIKAL_SMC_FLASH_DATA_SIZE => {
                self.cursor = pos;
                OK
            }
            _ => status(E_INVALID),
        }
    }
}

impl SmcConduit for FlashEmulator {
    fn call(&mut self, func: u32, args: [u64; 6]) -> [u64; 4] {
        *self.calls.entry(func).or_insert(0) += 1;

        if let Some(n) = self.fail_in {
            if n <= 1 {
                self.fail_in = None;
                return status(E_INJECTED);
            }
            self.fail_in = Some(n - 1);
        }

        match func {
            BAIKAL_SMC_FLASH_WRITE => self.write(args[0], args[1]),
            BAIKAL_SMC_FLASH_ERASE => self.erase(args[0], args[1]),
            BAIKAL_SMC_FLASH_PUSH => self.push(&args[..4]),
            BAIKAL_SMC_FLASH_PULL => self.pull(),
            BAIKAL_SMC_FLASH_POSITION => self.position(args[0]),
            BAIKAL_SMC_FLASH_READ => self.read(args[0], args[1]),
            BAIKAL_SMC_FLASH_INFO => [0, self.info.sector_size, self.info.sector_count, 0],
            BAIKAL_SMC_FLASH_LOCK => {
                self.locked = args[0] != 0;
                OK
            }
            _ => status(SMC_UNKNOWN),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flash::SmcFlash;

    #[test]
    fn starts_erased_and_locked() {
        let emu = FlashEmulator::new(4096, 4);
        assert!(emu.is_locked());
        assert!(emu.contents().iter().all(|&b| b == ERASED));
    }

    #[test]
    fn locked_part_rejects_writes() {
        let mut flash = SmcFlash::new(FlashEmulator::new(4096, 4));
        assert!(flash.write(0, &[0u8; 16]).is_err());
        assert!(flash.erase(0, 4096).is_err());
        assert!(flash.conduit().contents().iter().all(|&b| b == ERASED));
    }

    #[test]
    fn program_only_clears_bits() {
        let mut flash = SmcFlash::new(FlashEmulator::new(4096, 4));
        flash.lock(false).unwrap();
        flash.write(0, &[0xF0]).unwrap();
        flash.write(0, &[0x0F]).unwrap();
        assert_eq!(flash.conduit().contents()[0], 0x00);
    }

    #[test]
    fn unaligned_erase_is_rejected() {
        let mut flash = SmcFlash::new(FlashEmulator::new(4096, 4));
        flash.lock(false).unwrap();
        assert!(flash.erase(512, 4096).is_err());
        assert!(flash.erase(0, 100).is_err());
        assert!(flash.erase(4096, 4096).is_ok());
    }

    #[test]
    fn oversized_window_request_is_rejected() {
        let mut emu = FlashEmulator::new(4096, 4);
        let ret = emu.call(BAIKAL_SMC_FLASH_READ, [0, 2048, 0, 0, 0, 0]);
        assert_ne!(ret[0], 0);
    }

    #[test]
    fn unknown_function_is_not_supported() {
        let mut emu = FlashEmulator::new(4096, 4);
        #[allow(clippy::cast_sign_loss)]
        let unknown = SMC_UNKNOWN as u64;
        assert_eq!(emu.call(0x8200_0042, [0; 6])[0], unknown);
    }

    #[test]
    fn injected_failure_hits_requested_call() {
        let mut flash = SmcFlash::new(FlashEmulator::new(4096, 4));
        flash.lock(false).unwrap();
        // POSITION, PUSH, then WRITE fails.
        flash.conduit_mut().fail_after(3);
        assert!(flash.write(0, &[0u8; 32]).is_err());
        assert_eq!(flash.conduit().contents()[0], ERASED);
    }

    #[test]
    fn image_is_padded_with_erased_bytes() {
        let emu = FlashEmulator::with_image(4096, 2, &[1, 2, 3]).unwrap();
        assert_eq!(&emu.contents()[..4], &[1, 2, 3, ERASED]);
        assert!(FlashEmulator::with_image(4096, 1, &[0u8; 4097]).is_none());
    }
}
