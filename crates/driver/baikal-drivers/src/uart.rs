//! DesignWare APB UART driver.
//!
//! The BM1000 console UARTs are 16550-compatible, but memory-mapped with a
//! 32-bit register stride and an extra UART Status Register. The divisor
//! latch can only be written while the controller is idle, so [`Uart::init`]
//! waits on `USR.BUSY` before touching `LCR`.

use core::fmt;

use baikal_mmio::{Delay, RegisterIo, Timeout, poll_until};
use bitflags::bitflags;

// ---------------------------------------------------------------------------
// Register offsets
// ---------------------------------------------------------------------------

/// Register table (offsets are byte offsets, 4-byte stride).
mod reg {
    use baikal_mmio::Register;

    /// Receive Buffer Register (read, DLAB=0).
    pub const RBR: Register = Register::new(0x00, "RBR");
    /// Transmit Holding Register (write, DLAB=0).
    pub const THR: Register = Register::new(0x00, "THR");
    /// Divisor Latch Low (DLAB=1).
    pub const DLL: Register = Register::new(0x00, "DLL");
    /// Divisor Latch High (DLAB=1).
    pub const DLH: Register = Register::new(0x04, "DLH");
    /// Interrupt Enable Register (DLAB=0).
    pub const IER: Register = Register::new(0x04, "IER");
    /// FIFO Control Register (write).
    pub const FCR: Register = Register::new(0x08, "FCR");
    /// Line Control Register.
    pub const LCR: Register = Register::new(0x0C, "LCR");
    /// Modem Control Register.
    pub const MCR: Register = Register::new(0x10, "MCR");
    /// Line Status Register.
    pub const LSR: Register = Register::new(0x14, "LSR");
    /// UART Status Register.
    pub const USR: Register = Register::new(0x7C, "USR");
}

// ---------------------------------------------------------------------------
// Bitflag types
// ---------------------------------------------------------------------------

bitflags! {
    /// FIFO Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Fcr: u32 {
        /// Enable FIFOs.
        const ENABLE            = 1 << 0;
        /// Clear receive FIFO.
        const CLEAR_RX          = 1 << 1;
        /// Clear transmit FIFO.
        const CLEAR_TX          = 1 << 2;
    }
}

bitflags! {
    /// Line Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lcr: u32 {
        /// Word length bit 0.
        const WORD_LEN_0        = 1 << 0;
        /// Word length bit 1.
        const WORD_LEN_1        = 1 << 1;
        /// Extra stop bit.
        const STOP_BIT          = 1 << 2;
        /// Parity enable.
        const PARITY_ENABLE     = 1 << 3;
        /// Divisor Latch Access Bit.
        const DLAB              = 1 << 7;

        /// 8 data bits, no parity, 1 stop bit.
        const EIGHT_N_ONE = Self::WORD_LEN_0.bits() | Self::WORD_LEN_1.bits();
    }
}

bitflags! {
    /// Modem Control Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Mcr: u32 {
        /// Data Terminal Ready.
        const DTR               = 1 << 0;
        /// Request To Send.
        const RTS               = 1 << 1;
        /// Loopback mode.
        const LOOPBACK          = 1 << 4;
    }
}

bitflags! {
    /// Line Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Lsr: u32 {
        /// Data ready (received data available).
        const DATA_READY        = 1 << 0;
        /// Overrun error.
        const OVERRUN_ERROR     = 1 << 1;
        /// Parity error.
        const PARITY_ERROR      = 1 << 2;
        /// Framing error.
        const FRAMING_ERROR     = 1 << 3;
        /// Transmit Holding Register empty.
        const THR_EMPTY         = 1 << 5;
        /// Transmitter empty (both THR and shift register).
        const TRANSMITTER_EMPTY = 1 << 6;
    }
}

bitflags! {
    /// UART Status Register bits.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Usr: u32 {
        /// A serial transfer is in progress.
        const BUSY              = 1 << 0;
    }
}

/// Reference clock of the BM1000 APB UARTs.
pub const BM1000_UART_CLOCK_HZ: u32 = 7_372_800;

/// Polling budget for one character or one idle wait.
const POLL_ATTEMPTS: u32 = 100_000;
const POLL_INTERVAL_US: u32 = 1;

// ---------------------------------------------------------------------------
// InitError
// ---------------------------------------------------------------------------

/// Error returned when UART initialization fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitError {
    /// The baud rate cannot be derived from the reference clock.
    BadBaudRate,
    /// The controller stayed busy.
    Timeout,
    /// The loopback self-test read back the wrong byte.
    SelfTest,
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BadBaudRate => f.write_str("UART baud rate not reachable from reference clock"),
            Self::Timeout => f.write_str("UART stayed busy during initialization"),
            Self::SelfTest => f.write_str("UART loopback self-test failed"),
        }
    }
}

impl From<Timeout> for InitError {
    fn from(_: Timeout) -> Self {
        Self::Timeout
    }
}

/// Divisor for `baud` from a 16x oversampled `clock_hz`, rounded to nearest.
///
/// # Errors
///
/// [`InitError::BadBaudRate`] if the divisor is zero or exceeds 16 bits.
pub fn divisor(clock_hz: u32, baud: u32) -> Result<u16, InitError> {
    if baud == 0 {
        return Err(InitError::BadBaudRate);
    }
    let denom = u64::from(baud) * 16;
    let div = (u64::from(clock_hz) + denom / 2) / denom;
    match u16::try_from(div) {
        Ok(0) | Err(_) => Err(InitError::BadBaudRate),
        Ok(div) => Ok(div),
    }
}

// ---------------------------------------------------------------------------
// Uart
// ---------------------------------------------------------------------------

/// A DesignWare APB UART.
pub struct Uart<R: RegisterIo, D: Delay> {
    regs: R,
    delay: D,
}

impl<R: RegisterIo, D: Delay> Uart<R, D> {
    /// Wraps a register block. Does **not** touch hardware.
    pub const fn new(regs: R, delay: D) -> Self {
        Self { regs, delay }
    }

    /// Programs the UART for `baud` and 8N1 with FIFOs enabled, then runs a
    /// loopback self-test.
    ///
    /// # Errors
    ///
    /// See [`InitError`].
    pub fn init(&mut self, baud: u32, clock_hz: u32) -> Result<(), InitError> {
        let divisor = divisor(clock_hz, baud)?;

        self.regs.write32(reg::IER, 0);
        self.wait_idle()?;

        self.regs.write32(reg::LCR, Lcr::DLAB.bits());
        self.regs.write32(reg::DLL, u32::from(divisor & 0xFF));
        self.regs.write32(reg::DLH, u32::from(divisor >> 8));
        self.regs.write32(reg::LCR, Lcr::EIGHT_N_ONE.bits());

        self.regs
            .write32(reg::FCR, (Fcr::ENABLE | Fcr::CLEAR_RX | Fcr::CLEAR_TX).bits());

        self.regs
            .write32(reg::MCR, (Mcr::DTR | Mcr::RTS | Mcr::LOOPBACK).bits());
        self.regs.write32(reg::THR, 0xAE);
        let echoed = self.regs.read32(reg::RBR) & 0xFF;
        self.regs.write32(reg::MCR, (Mcr::DTR | Mcr::RTS).bits());
        if echoed != 0xAE {
            return Err(InitError::SelfTest);
        }

        log::debug!("uart: {baud} baud, divisor {divisor}");
        Ok(())
    }

    fn wait_idle(&mut self) -> Result<(), Timeout> {
        let regs = &self.regs;
        poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            !Usr::from_bits_truncate(regs.read32(reg::USR)).contains(Usr::BUSY)
        })
    }

    /// Returns the current Line Status Register value.
    #[must_use]
    pub fn line_status(&self) -> Lsr {
        Lsr::from_bits_truncate(self.regs.read32(reg::LSR))
    }

    /// Writes a single byte once the transmit holding register is empty.
    ///
    /// # Errors
    ///
    /// [`Timeout`] if the transmitter never drained.
    pub fn write_byte(&mut self, byte: u8) -> Result<(), Timeout> {
        let regs = &self.regs;
        poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            Lsr::from_bits_truncate(regs.read32(reg::LSR)).contains(Lsr::THR_EMPTY)
        })?;
        self.regs.write32(reg::THR, u32::from(byte));
        Ok(())
    }

    /// Reads a single byte once one is available.
    ///
    /// # Errors
    ///
    /// [`Timeout`] if nothing arrived within the polling budget.
    pub fn read_byte(&mut self) -> Result<u8, Timeout> {
        let regs = &self.regs;
        poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            Lsr::from_bits_truncate(regs.read32(reg::LSR)).contains(Lsr::DATA_READY)
        })?;
        Ok((self.regs.read32(reg::RBR) & 0xFF) as u8)
    }

    /// Non-blocking read.
    #[must_use]
    pub fn try_read_byte(&self) -> Option<u8> {
        if self.line_status().contains(Lsr::DATA_READY) {
            Some((self.regs.read32(reg::RBR) & 0xFF) as u8)
        } else {
            None
        }
    }
}

impl<R: RegisterIo, D: Delay> fmt::Write for Uart<R, D> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        for byte in s.bytes() {
            if byte == b'\n' {
                self.write_byte(b'\r').map_err(|_| fmt::Error)?;
            }
            self.write_byte(byte).map_err(|_| fmt::Error)?;
        }
        Ok(())
    }
}
