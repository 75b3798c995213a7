//! Baikal eSPI controller in manual-transfer master mode.
//!
//! The controller has byte-wide TX and RX FIFOs with fill counters. In
//! manual mode (`CR2.MTE`) chip select stays asserted for as long as the
//! `CR2.SSO` line bit is set, so a command, its address and its payload can
//! be framed as one transaction regardless of FIFO depth. Every byte clocked
//! out clocks one byte in; during the `tx` phase the received bytes are
//! discarded and during the `rx` phase `0xFF` is clocked out.

use baikal_mmio::{Delay, RegisterIo, field_set, poll_until};

use crate::spi::{SpiBus, SpiError};

mod reg {
    use baikal_mmio::Register;

    pub const CR1: Register = Register::new(0x00, "ESPI_CR1");
    pub const CR2: Register = Register::new(0x04, "ESPI_CR2");
    pub const IMR: Register = Register::new(0x0C, "ESPI_IMR");
    pub const TX_DATA: Register = Register::new(0x14, "ESPI_TX_DATA");
    pub const RX_DATA: Register = Register::new(0x18, "ESPI_RX_DATA");
    pub const TX_FBCAR: Register = Register::new(0x1C, "ESPI_TX_FBCAR");
    pub const RX_FBCAR: Register = Register::new(0x20, "ESPI_RX_FBCAR");
}

// CR1 fields.
const CR1_SCE: u32 = 1 << 0;
const CR1_MSS: u32 = 1 << 1;
const CR1_CPH: u32 = 1 << 2;
const CR1_CPO: u32 = 1 << 3;
const CR1_SCR: u32 = 0x7 << 4;

// CR2 fields.
const CR2_SSO: u32 = 0xF;
const CR2_MTE: u32 = 1 << 4;
const CR2_SRD: u32 = 1 << 5;
const CR2_STD: u32 = 1 << 6;

/// Depth of each FIFO in bytes.
pub const FIFO_DEPTH: u32 = 64;
/// Number of chip-select lines.
pub const CHIP_SELECTS: u8 = 4;

const POLL_ATTEMPTS: u32 = 10_000;
const POLL_INTERVAL_US: u32 = 1;

/// SPI clock polarity and phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// CPOL=0, CPHA=0.
    Mode0,
    /// CPOL=1, CPHA=1.
    Mode3,
}

/// A Baikal eSPI controller.
pub struct Espi<R: RegisterIo, D: Delay> {
    regs: R,
    delay: D,
}

impl<R: RegisterIo, D: Delay> Espi<R, D> {
    /// Wraps a register block. Does **not** touch hardware.
    pub const fn new(regs: R, delay: D) -> Self {
        Self { regs, delay }
    }

    /// Enables the controller as master with SPI `mode` and SCLK divided
    /// from the APB clock by `2 << divider_log2` (`divider_log2` is 0..=7).
    pub fn init(&mut self, mode: Mode, divider_log2: u8) {
        let mut cr1 = CR1_SCE | CR1_MSS;
        if mode == Mode::Mode3 {
            cr1 |= CR1_CPH | CR1_CPO;
        }
        cr1 = field_set(cr1, CR1_SCR, u32::from(divider_log2));
        self.regs.write32(reg::CR1, 0);
        self.regs.write32(reg::IMR, 0);
        self.regs.write32(reg::CR2, CR2_SRD | CR2_STD);
        self.regs.write32(reg::CR1, cr1);
        log::debug!("espi: {mode:?}, sclk divider 2^{}", u32::from(divider_log2) + 1);
    }

    /// Clocks one byte out and returns the byte clocked in.
    fn exchange(&mut self, out: u8) -> Result<u8, SpiError> {
        let regs = &self.regs;
        poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            regs.read32(reg::TX_FBCAR) < FIFO_DEPTH
        })?;
        self.regs.write32(reg::TX_DATA, u32::from(out));

        let regs = &self.regs;
        poll_until(&mut self.delay, POLL_ATTEMPTS, POLL_INTERVAL_US, || {
            regs.read32(reg::RX_FBCAR) > 0
        })?;
        Ok((self.regs.read32(reg::RX_DATA) & 0xFF) as u8)
    }

    fn shift(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
        for byte in tx {
            self.exchange(*byte)?;
        }
        for byte in rx.iter_mut() {
            *byte = self.exchange(0xFF)?;
        }
        Ok(())
    }

    fn select(&self, cs: Option<u8>) {
        let line = cs.map_or(0, |cs| 1 << cs);
        let cr2 = self.regs.read32(reg::CR2);
        let cr2 = field_set(cr2, CR2_SSO, line);
        let cr2 = if cs.is_some() { cr2 | CR2_MTE } else { cr2 & !CR2_MTE };
        self.regs.write32(reg::CR2, cr2 & !(CR2_SRD | CR2_STD));
    }
}

impl<R: RegisterIo, D: Delay> SpiBus for Espi<R, D> {
    fn transfer(&mut self, cs: u8, tx: &[u8], rx: &mut [u8]) -> Result<(), SpiError> {
        if cs >= CHIP_SELECTS {
            return Err(SpiError::InvalidChipSelect(cs));
        }
        self.select(Some(cs));
        let result = self.shift(tx, rx);
        self.select(None);
        if let Err(err) = result {
            log::error!("espi: cs{cs} transfer failed: {err}");
        }
        result
    }
}
