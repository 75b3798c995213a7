//! DesignWare APB I2C master.
//!
//! Each byte of a transfer is one write to `IC_DATA_CMD`: bit 8 selects a
//! read, bit 9 issues STOP after the byte and bit 10 issues RESTART before
//! it. The controller reports NACKs and arbitration loss by raising
//! `TX_ABRT` and latching the reason in `IC_TX_ABRT_SOURCE`.

use core::fmt;

use baikal_efi::EfiStatus;
use baikal_mmio::{Delay, RegisterIo, Timeout, poll_until};
use bitflags::bitflags;

// ---------------------------------------------------------------------------
// Register offsets
// ---------------------------------------------------------------------------

mod reg {
    use baikal_mmio::Register;

    pub const CON: Register = Register::new(0x00, "IC_CON");
    pub const TAR: Register = Register::new(0x04, "IC_TAR");
    pub const DATA_CMD: Register = Register::new(0x10, "IC_DATA_CMD");
    pub const SS_SCL_HCNT: Register = Register::new(0x14, "IC_SS_SCL_HCNT");
    pub const SS_SCL_LCNT: Register = Register::new(0x18, "IC_SS_SCL_LCNT");
    pub const FS_SCL_HCNT: Register = Register::new(0x1C, "IC_FS_SCL_HCNT");
    pub const FS_SCL_LCNT: Register = Register::new(0x20, "IC_FS_SCL_LCNT");
    pub const INTR_MASK: Register = Register::new(0x30, "IC_INTR_MASK");
    pub const RAW_INTR_STAT: Register = Register::new(0x34, "IC_RAW_INTR_STAT");
    pub const CLR_INTR: Register = Register::new(0x40, "IC_CLR_INTR");
    pub const CLR_TX_ABRT: Register = Register::new(0x54, "IC_CLR_TX_ABRT");
    pub const CLR_STOP_DET: Register = Register::new(0x60, "IC_CLR_STOP_DET");
    pub const ENABLE: Register = Register::new(0x6C, "IC_ENABLE");
    pub const STATUS: Register = Register::new(0x70, "IC_STATUS");
    pub const TX_ABRT_SOURCE: Register = Register::new(0x80, "IC_TX_ABRT_SOURCE");
    pub const ENABLE_STATUS: Register = Register::new(0x9C, "IC_ENABLE_STATUS");
}

// ---------------------------------------------------------------------------
// Bitflag types
// ---------------------------------------------------------------------------

bitflags! {
    /// `IC_CON` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Con: u32 {
        /// Master mode enabled.
        const MASTER_MODE       = 1 << 0;
        /// Standard-mode speed (100 kHz).
        const SPEED_STD         = 1 << 1;
        /// Fast-mode speed (400 kHz).
        const SPEED_FAST        = 2 << 1;
        /// RESTART conditions may be issued.
        const RESTART_EN        = 1 << 5;
        /// Slave function disabled.
        const SLAVE_DISABLE     = 1 << 6;
    }
}

bitflags! {
    /// `IC_DATA_CMD` control bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct DataCmd: u32 {
        /// Read a byte instead of writing one.
        const READ              = 1 << 8;
        /// Issue STOP after this byte.
        const STOP              = 1 << 9;
        /// Issue RESTART before this byte.
        const RESTART           = 1 << 10;
    }
}

bitflags! {
    /// `IC_RAW_INTR_STAT` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Intr: u32 {
        /// The transmit FIFO was flushed after an abort.
        const TX_ABRT           = 1 << 6;
        /// A STOP condition occurred on the bus.
        const STOP_DET          = 1 << 9;
    }
}

bitflags! {
    /// `IC_STATUS` bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Status: u32 {
        /// Controller activity.
        const ACTIVITY          = 1 << 0;
        /// Transmit FIFO not full.
        const TFNF              = 1 << 1;
        /// Transmit FIFO empty.
        const TFE               = 1 << 2;
        /// Receive FIFO not empty.
        const RFNE              = 1 << 3;
    }
}

bitflags! {
    /// `IC_TX_ABRT_SOURCE`: why the last transfer was aborted.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AbortSource: u32 {
        /// 7-bit address not acknowledged.
        const ADDR7_NOACK       = 1 << 0;
        /// First 10-bit address byte not acknowledged.
        const ADDR10_1_NOACK    = 1 << 1;
        /// Second 10-bit address byte not acknowledged.
        const ADDR10_2_NOACK    = 1 << 2;
        /// Data byte not acknowledged.
        const TXDATA_NOACK      = 1 << 3;
        /// General call not acknowledged.
        const GCALL_NOACK       = 1 << 4;
        /// Arbitration lost.
        const ARB_LOST          = 1 << 12;
    }
}

impl AbortSource {
    /// Whether the target did not answer its address.
    #[must_use]
    pub const fn is_address_nack(self) -> bool {
        self.intersects(
            Self::ADDR7_NOACK
                .union(Self::ADDR10_1_NOACK)
                .union(Self::ADDR10_2_NOACK),
        )
    }
}

// ---------------------------------------------------------------------------
// Errors and the bus trait
// ---------------------------------------------------------------------------

/// I2C transfer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cError {
    /// The controller did not make progress within the polling budget.
    Timeout,
    /// The controller aborted the transfer.
    Abort(AbortSource),
    /// The target address does not fit in 7 bits.
    InvalidAddress(u16),
}

impl fmt::Display for I2cError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("i2c transfer timed out"),
            Self::Abort(source) if source.is_address_nack() => {
                f.write_str("i2c target did not acknowledge its address")
            }
            Self::Abort(source) => write!(f, "i2c transfer aborted ({:#x})", source.bits()),
            Self::InvalidAddress(addr) => write!(f, "invalid i2c address {addr:#x}"),
        }
    }
}

impl From<Timeout> for I2cError {
    fn from(_: Timeout) -> Self {
        Self::Timeout
    }
}

impl From<I2cError> for EfiStatus {
    fn from(err: I2cError) -> Self {
        match err {
            I2cError::Timeout => EfiStatus::TIMEOUT,
            I2cError::Abort(_) => EfiStatus::DEVICE_ERROR,
            I2cError::InvalidAddress(_) => EfiStatus::INVALID_PARAMETER,
        }
    }
}

/// A bus that can run combined write-then-read I2C transfers.
pub trait I2cBus {
    /// Writes `tx` to the 7-bit target `addr`, then reads `rx.len()` bytes
    /// after a repeated START. Either half may be empty.
    ///
    /// # Errors
    ///
    /// [`I2cError`] on abort or timeout.
    fn transfer(&mut self, addr: u16, tx: &[u8], rx: &mut [u8]) -> Result<(), I2cError>;

    /// Writes `tx` to `addr`.
    ///
    /// # Errors
    ///
    /// As for [`I2cBus::transfer`].
    fn write(&mut self, addr: u16, tx: &[u8]) -> Result<(), I2cError> {
        self.transfer(addr, tx, &mut [])
    }

    /// Reads `rx.len()` bytes from `addr`.
    ///
    /// # Errors
    ///
    /// As for [`I2cBus::transfer`].
    fn read(&mut self, addr: u16, rx: &mut [u8]) -> Result<(), I2cError> {
        self.transfer(addr, &[], rx)
    }
}

impl<B: I2cBus + ?Sized> I2cBus for &mut B {
    fn transfer(&mut self, addr: u16, tx: &[u8], rx: &mut [u8]) -> Result<(), I2cError> {
        (**self).transfer(addr, tx, rx)
    }
}

// ---------------------------------------------------------------------------
// Controller
// ---------------------------------------------------------------------------

/// Bus speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speed {
    /// 100 kHz.
    Standard,
    /// 400 kHz.
    Fast,
}

const POLL_ATTEMPTS: u32 = 10_000;
const POLL_INTERVAL_US: u32 = 10;

/// A DesignWare I2C controller in master mode.
pub struct DwI2c<R: RegisterIo, D: Delay> {
    regs: R,
    delay: D,
}

impl<R: RegisterIo, D: Delay> DwI2c<R, D> {
    /// Wraps a register block. Does **not** touch hardware.
    pub const fn new(regs: R, delay: D) -> Self {
        Self { regs, delay }
    }

    /// Borrows the register block.
    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Programs master mode and SCL timing for `speed` from an `ic_clk` of
    /// `clock_hz`. Leaves the controller disabled until the first transfer.
    ///
    /// # Errors
    ///
    /// [`I2cError::Timeout`] if the controller does not disable.
    pub fn init(&mut self, speed: Speed, clock_hz: u32) -> Result<(), I2cError> {
        self.disable()?;

        let clk = u64::from(clock_hz);
        // High/low periods from the I2C bus specification, in nanoseconds.
        let (speed_bits, hcnt_reg, lcnt_reg, high_ns, low_ns) = match speed {
            Speed::Standard => (Con::SPEED_STD, reg::SS_SCL_HCNT, reg::SS_SCL_LCNT, 4000, 4700),
            Speed::Fast => (Con::SPEED_FAST, reg::FS_SCL_HCNT, reg::FS_SCL_LCNT, 600, 1300),
        };
        let count = |ns: u64| u32::try_from((clk * ns).div_ceil(1_000_000_000)).unwrap_or(u32::MAX);

        self.regs.write32(
            reg::CON,
            (Con::MASTER_MODE | Con::RESTART_EN | Con::SLAVE_DISABLE | speed_bits).bits(),
        );
        self.regs.write32(hcnt_reg, count(high_ns).max(6));
        self.regs.write32(lcnt_reg, count(low_ns).max(8));
        self.regs.write32(reg::INTR_MASK, 0);
        log::debug!("i2c: {speed:?} mode, ic_clk {clock_hz} Hz");
        Ok(())
    }

    fn disable(&mut self) -> Result<(), Timeout> {
        self.regs.write32(reg::ENABLE, 0);
        let regs = &self.regs;
        poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            regs.read32(reg::ENABLE_STATUS) & 1 == 0
        })
    }

    /// Returns the abort reason and clears it, if an abort is pending.
    fn take_abort(&self) -> Option<AbortSource> {
        let raw = Intr::from_bits_truncate(self.regs.read32(reg::RAW_INTR_STAT));
        if !raw.contains(Intr::TX_ABRT) {
            return None;
        }
        let source = AbortSource::from_bits_retain(self.regs.read32(reg::TX_ABRT_SOURCE));
        // Read-to-clear.
        let _ = self.regs.read32(reg::CLR_TX_ABRT);
        Some(source)
    }

    /// Waits for `status` bits, failing early on abort.
    fn wait_status(&mut self, status: Status) -> Result<(), I2cError> {
        let mut aborted = false;
        let regs = &self.regs;
        let outcome = poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            let raw = Intr::from_bits_truncate(regs.read32(reg::RAW_INTR_STAT));
            aborted = raw.contains(Intr::TX_ABRT);
            aborted || Status::from_bits_truncate(regs.read32(reg::STATUS)).contains(status)
        });
        if aborted {
            return Err(self.abort_error());
        }
        outcome.map_err(|_| {
            log::error!("i2c: timed out waiting for {status:?}");
            I2cError::Timeout
        })
    }

    fn abort_error(&self) -> I2cError {
        let source = self.take_abort().unwrap_or(AbortSource::empty());
        log::debug!("i2c: transfer aborted, source {:#x}", source.bits());
        I2cError::Abort(source)
    }

    /// Waits for STOP on the bus and clears it.
    fn wait_stop(&mut self) -> Result<(), I2cError> {
        let mut aborted = false;
        let regs = &self.regs;
        let outcome = poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            let raw = Intr::from_bits_truncate(regs.read32(reg::RAW_INTR_STAT));
            aborted = raw.contains(Intr::TX_ABRT);
            aborted || raw.contains(Intr::STOP_DET)
        });
        if aborted {
            return Err(self.abort_error());
        }
        outcome.map_err(|_| {
            log::error!("i2c: timed out waiting for STOP");
            I2cError::Timeout
        })?;
        let _ = self.regs.read32(reg::CLR_STOP_DET);
        Ok(())
    }
}

impl<R: RegisterIo, D: Delay> I2cBus for DwI2c<R, D> {
    fn transfer(&mut self, addr: u16, tx: &[u8], rx: &mut [u8]) -> Result<(), I2cError> {
        if addr > 0x7F {
            return Err(I2cError::InvalidAddress(addr));
        }
        if tx.is_empty() && rx.is_empty() {
            return Ok(());
        }

        self.disable()?;
        self.regs.write32(reg::TAR, u32::from(addr));
        self.regs.write32(reg::ENABLE, 1);
        let _ = self.regs.read32(reg::CLR_INTR);

        for (i, byte) in tx.iter().enumerate() {
            self.wait_status(Status::TFNF)?;
            let mut cmd = DataCmd::empty();
            if i + 1 == tx.len() && rx.is_empty() {
                cmd |= DataCmd::STOP;
            }
            self.regs.write32(reg::DATA_CMD, cmd.bits() | u32::from(*byte));
        }

        let rx_len = rx.len();
        for (i, byte) in rx.iter_mut().enumerate() {
            self.wait_status(Status::TFNF)?;
            let mut cmd = DataCmd::READ;
            if i == 0 && !tx.is_empty() {
                cmd |= DataCmd::RESTART;
            }
            if i + 1 == rx_len {
                cmd |= DataCmd::STOP;
            }
            self.regs.write32(reg::DATA_CMD, cmd.bits());
            self.wait_status(Status::RFNE)?;
            *byte = (self.regs.read32(reg::DATA_CMD) & 0xFF) as u8;
        }

        self.wait_stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baikal_mmio::{NoDelay, RegisterFile};

    fn ready_controller() -> RegisterFile {
        let regs = RegisterFile::new();
        regs.preset(reg::STATUS, (Status::TFNF | Status::RFNE).bits());
        regs.preset(reg::RAW_INTR_STAT, Intr::STOP_DET.bits());
        regs
    }

    #[test]
    fn init_sets_master_fast_mode() {
        let regs = RegisterFile::new();
        let mut i2c = DwI2c::new(&regs, NoDelay);
        i2c.init(Speed::Fast, 100_000_000).unwrap();
        let con = Con::from_bits_truncate(regs.value(reg::CON));
        assert!(con.contains(Con::MASTER_MODE | Con::SLAVE_DISABLE | Con::SPEED_FAST));
        assert_eq!(regs.value(reg::FS_SCL_HCNT), 60);
        assert_eq!(regs.value(reg::FS_SCL_LCNT), 130);
    }

    #[test]
    fn write_then_read_frames_with_restart_and_stop() {
        let regs = ready_controller();
        regs.queue_reads(reg::DATA_CMD, &[0x11, 0x22]);
        let mut i2c = DwI2c::new(&regs, NoDelay);

        let mut rx = [0u8; 2];
        i2c.transfer(0x50, &[0x00, 0x10], &mut rx).unwrap();

        assert_eq!(rx, [0x11, 0x22]);
        assert_eq!(regs.value(reg::TAR), 0x50);
        assert_eq!(
            regs.writes_to(reg::DATA_CMD),
            [
                0x00,
                0x10,
                (DataCmd::READ | DataCmd::RESTART).bits(),
                (DataCmd::READ | DataCmd::STOP).bits(),
            ]
        );
    }

    #[test]
    fn plain_write_stops_on_last_byte() {
        let regs = ready_controller();
        let mut i2c = DwI2c::new(&regs, NoDelay);
        i2c.write(0x51, &[0xAB, 0xCD]).unwrap();
        assert_eq!(
            regs.writes_to(reg::DATA_CMD),
            [0xAB, DataCmd::STOP.bits() | 0xCD]
        );
    }

    #[test]
    fn address_nack_is_reported() {
        let regs = ready_controller();
        regs.preset(reg::RAW_INTR_STAT, Intr::TX_ABRT.bits());
        regs.preset(reg::TX_ABRT_SOURCE, AbortSource::ADDR7_NOACK.bits());
        let mut i2c = DwI2c::new(&regs, NoDelay);

        let err = i2c.write(0x52, &[0]).unwrap_err();
        assert_eq!(err, I2cError::Abort(AbortSource::ADDR7_NOACK));
        assert!(matches!(err, I2cError::Abort(s) if s.is_address_nack()));
        assert_eq!(EfiStatus::from(err), EfiStatus::DEVICE_ERROR);
    }

    #[test]
    fn stuck_fifo_times_out() {
        let regs = RegisterFile::new();
        let mut i2c = DwI2c::new(&regs, NoDelay);
        assert_eq!(i2c.write(0x50, &[0]), Err(I2cError::Timeout));
    }

    #[test]
    fn empty_transfer_touches_nothing() {
        let regs = RegisterFile::new();
        let mut i2c = DwI2c::new(&regs, NoDelay);
        i2c.transfer(0x50, &[], &mut []).unwrap();
        assert_eq!(regs.write_count(), 0);
        assert_eq!(i2c.write(0x80, &[0]), Err(I2cError::InvalidAddress(0x80)));
    }
}
