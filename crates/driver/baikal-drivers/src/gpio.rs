//! DesignWare APB GPIO, port A.

use baikal_mmio::RegisterIo;

mod reg {
    use baikal_mmio::Register;

    pub const SWPORTA_DR: Register = Register::new(0x00, "GPIO_SWPORTA_DR");
    pub const SWPORTA_DDR: Register = Register::new(0x04, "GPIO_SWPORTA_DDR");
    pub const EXT_PORTA: Register = Register::new(0x50, "GPIO_EXT_PORTA");
}

/// Number of lines on port A.
pub const PINS: u8 = 32;

/// Pin direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Input.
    In,
    /// Output.
    Out,
}

/// Port A of a DesignWare GPIO block.
pub struct Gpio<R: RegisterIo> {
    regs: R,
}

impl<R: RegisterIo> Gpio<R> {
    /// Wraps a register block.
    pub const fn new(regs: R) -> Self {
        Self { regs }
    }

    fn mask(pin: u8) -> u32 {
        debug_assert!(pin < PINS);
        1 << (pin % PINS)
    }

    /// Configures `pin` as input or output.
    pub fn set_direction(&self, pin: u8, direction: Direction) {
        match direction {
            Direction::Out => self.regs.set_bits(reg::SWPORTA_DDR, Self::mask(pin)),
            Direction::In => self.regs.clear_bits(reg::SWPORTA_DDR, Self::mask(pin)),
        }
    }

    /// Drives an output pin.
    pub fn write(&self, pin: u8, high: bool) {
        if high {
            self.regs.set_bits(reg::SWPORTA_DR, Self::mask(pin));
        } else {
            self.regs.clear_bits(reg::SWPORTA_DR, Self::mask(pin));
        }
    }

    /// Samples the external level of `pin`.
    #[must_use]
    pub fn read(&self, pin: u8) -> bool {
        self.regs.read32(reg::EXT_PORTA) & Self::mask(pin) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baikal_mmio::RegisterFile;

    #[test]
    fn direction_and_level_touch_only_their_pin() {
        let regs = RegisterFile::new();
        regs.preset(reg::SWPORTA_DDR, 0x1);
        let gpio = Gpio::new(&regs);

        gpio.set_direction(5, Direction::Out);
        gpio.set_direction(0, Direction::In);
        gpio.write(5, true);
        gpio.write(6, false);

        assert_eq!(regs.value(reg::SWPORTA_DDR), 1 << 5);
        assert_eq!(regs.value(reg::SWPORTA_DR), 1 << 5);
    }

    #[test]
    fn read_samples_external_port() {
        let regs = RegisterFile::new();
        regs.preset(reg::EXT_PORTA, 0x8000_0001);
        let gpio = Gpio::new(&regs);
        assert!(gpio.read(0));
        assert!(!gpio.read(1));
        assert!(gpio.read(31));
    }
}
