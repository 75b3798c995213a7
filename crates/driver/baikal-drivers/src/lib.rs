//! Register-level drivers for the Baikal BM1000/BS1000 peripherals the
//! firmware support code needs.
//!
//! Every MMIO driver is generic over [`baikal_mmio::RegisterIo`] and, where
//! it polls, over [`baikal_mmio::Delay`]. I2C and SPI devices sit on the
//! [`I2cBus`] and [`SpiBus`] seams so they can be tested against in-memory
//! targets.

#![no_std]

extern crate alloc;

pub mod eeprom;
pub mod espi;
pub mod gpio;
pub mod i2c;
pub mod rtc;
pub mod spi;
pub mod spi_nor;
pub mod uart;

pub use eeprom::{Eeprom, read_spd};
pub use espi::Espi;
pub use gpio::Gpio;
pub use i2c::{DwI2c, I2cBus, I2cError};
pub use rtc::{Rtc, RtcError, RtcTime, RtcType};
pub use spi::{SpiBus, SpiError};
pub use spi_nor::SpiNor;
pub use uart::Uart;
