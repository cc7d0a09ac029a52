//! Pin to register/bit-field arithmetic
//!
//! Every pin-addressed GPIO register packs a fixed number of equally sized
//! fields per 32-bit word. For a layout of `w` bits with `n` pins per
//! register, pin `p` lives in register `p / n` at shift `(p % n) * w`.

use crate::error::{Error, Result};
use crate::regs::gpio::MAX_PIN;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldLayout {
    pub bits_per_field: u32,
    pub pins_per_register: u8,
}

/// Set/clear/level/event/detect-enable/pull-clock registers
pub const ONE_BIT: FieldLayout = FieldLayout {
    bits_per_field: 1,
    pins_per_register: 32,
};

/// BCM2711 pull-control registers
pub const TWO_BIT: FieldLayout = FieldLayout {
    bits_per_field: 2,
    pins_per_register: 16,
};

/// Function select registers
pub const THREE_BIT: FieldLayout = FieldLayout {
    bits_per_field: 3,
    pins_per_register: 10,
};

/// Location of one pin's field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    /// Register index counted from the first register of the bank
    pub index: usize,
    /// Bit position of the field's least significant bit
    pub shift: u32,
    /// Unshifted field mask
    pub width_mask: u32,
}

impl FieldLayout {
    pub const fn locate(&self, pin: u8) -> Field {
        Field {
            index: (pin / self.pins_per_register) as usize,
            shift: (pin % self.pins_per_register) as u32 * self.bits_per_field,
            width_mask: (1 << self.bits_per_field) - 1,
        }
    }
}

impl Field {
    /// Byte offset of the register holding this field, given the bank's
    /// first register
    pub const fn offset(&self, first: usize) -> usize {
        first + self.index * 4
    }

    /// Mask of the field in place
    pub const fn mask(&self) -> u32 {
        self.width_mask << self.shift
    }

    pub const fn extract(&self, register: u32) -> u32 {
        (register >> self.shift) & self.width_mask
    }

    /// Replace this field in `register`, leaving other fields untouched
    pub const fn insert(&self, register: u32, value: u32) -> u32 {
        (register & !self.mask()) | ((value & self.width_mask) << self.shift)
    }
}

/// Reject pins the SoC does not have
pub fn check_pin(pin: u8) -> Result<u8> {
    if pin > MAX_PIN {
        return Err(Error::InvalidPin(pin));
    }
    Ok(pin)
}
