//! The world-switch seam.
//!
//! Everything above this module talks to the secure monitor through
//! [`SmcConduit`], so the chunking logic can run against [`ArmSmc`] on
//! hardware and against the emulator everywhere else.

/// Issues a secure-monitor call.
///
/// `args` land in `x1..x6`, the function id in `x0`; the returned array holds
/// `x0..x3` after the monitor returns. Interpretation of the results is
/// per-function (see [`crate::abi`]).
pub trait SmcConduit {
    /// Performs one synchronous call.
    fn call(&mut self, func: u32, args: [u64; 6]) -> [u64; 4];
}

impl<C: SmcConduit + ?Sized> SmcConduit for &mut C {
    fn call(&mut self, func: u32, args: [u64; 6]) -> [u64; 4] {
        (**self).call(func, args)
    }
}

/// The real conduit: an `smc #0` into EL3.
#[cfg(target_arch = "aarch64")]
#[derive(Debug, Default)]
pub struct ArmSmc {
    _private: (),
}

#[cfg(target_arch = "aarch64")]
impl ArmSmc {
    /// Creates the conduit.
    ///
    /// # Safety
    ///
    /// The caller must be running at EL1/EL2 on a system whose EL3 firmware
    /// implements the Baikal SiP services, otherwise the call traps.
    #[must_use]
    pub const unsafe fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "aarch64")]
impl SmcConduit for ArmSmc {
    fn call(&mut self, func: u32, args: [u64; 6]) -> [u64; 4] {
        let x0: u64;
        let x1: u64;
        let x2: u64;
        let x3: u64;
        // SAFETY: `ArmSmc::new` requires an EL3 monitor with the Baikal SiP
        // services. SMCCC allows x0-x17 to be clobbered; x4-x17 are declared.
        unsafe {
            core::arch::asm!(
                "smc #0",
                inout("x0") u64::from(func) => x0,
                inout("x1") args[0] => x1,
                inout("x2") args[1] => x2,
                inout("x3") args[2] => x3,
                inout("x4") args[3] => _,
                inout("x5") args[4] => _,
                inout("x6") args[5] => _,
                out("x7") _, out("x8") _, out("x9") _, out("x10") _,
                out("x11") _, out("x12") _, out("x13") _, out("x14") _,
                out("x15") _, out("x16") _, out("x17") _,
                options(nostack)
            );
        }
        [x0, x1, x2, x3]
    }
}
