// src/crc.rs
//
// Bit-serial CRC engine.
//
// CAN computes its CRC one bit at a time over the unstuffed frame content
// (SOF through the last data bit). The engine below performs plain
// polynomial long division on a register one bit wider than the
// polynomial: each consumed bit shifts in at the bottom, and whenever the
// bit shifted out of the top is set the polynomial is subtracted (XORed).
// Padding the message with `width` zero bits before reading the remainder
// yields the standard CRC.

use crate::bits::Bit;

// ============================================================================
// Constants
// ============================================================================

/// CAN CRC-15 polynomial: x^15 + x^14 + x^10 + x^8 + x^7 + x^4 + x^3 + 1
/// (the x^15 term is implicit).
pub const CAN_CRC_POLYNOMIAL: u32 = 0x4599;

/// Width of a polynomial in bits, inferred from its highest set bit.
pub fn polynomial_width(polynomial: u32) -> u32 {
    32 - polynomial.leading_zeros()
}

// ============================================================================
// CRC Engine
// ============================================================================

/// Incremental CRC over an arbitrary polynomial.
///
/// Owned by exactly one decoder frame state or one encode call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrcEngine {
    shift_register: u32,
    bits_consumed: u32,
    polynomial: u32,
    width: u32,
}

impl CrcEngine {
    /// Create an engine for `polynomial`. The CRC width is inferred from the
    /// polynomial's highest set bit.
    pub fn new(polynomial: u32) -> Self {
        CrcEngine {
            shift_register: 0,
            bits_consumed: 0,
            polynomial,
            width: polynomial_width(polynomial),
        }
    }

    /// Engine for the CAN CRC-15 polynomial.
    pub fn can() -> Self {
        CrcEngine::new(CAN_CRC_POLYNOMIAL)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn polynomial(&self) -> u32 {
        self.polynomial
    }

    /// Number of bits consumed so far, padding included.
    pub fn bits_consumed(&self) -> u32 {
        self.bits_consumed
    }

    fn mask(&self) -> u32 {
        if self.width >= 32 {
            u32::MAX
        } else {
            (1u32 << self.width) - 1
        }
    }

    /// Account for the next bit of the frame.
    pub fn consume_bit(&mut self, bit: Bit) {
        self.bits_consumed += 1;
        if self.width == 0 {
            return;
        }

        let carry = (self.shift_register >> (self.width - 1)) & 1;
        self.shift_register = ((self.shift_register << 1) | bit.value()) & self.mask();
        if carry != 0 {
            self.shift_register ^= self.polynomial;
        }
    }

    /// Account for a whole field, most significant bit first.
    ///
    /// # Arguments
    /// * `value` - The field value
    /// * `width` - Number of low bits of `value` that make up the field
    pub fn consume_field(&mut self, value: u32, width: u32) {
        for shift in (0..width.min(32)).rev() {
            self.consume_bit(Bit::from_lsb(value >> shift));
        }
    }

    /// Pad with `width` zero bits and return the remainder.
    ///
    /// The engine keeps the padding, so call this once per frame.
    pub fn finalize(&mut self) -> u32 {
        for _ in 0..self.width {
            self.consume_bit(Bit::Dominant);
        }
        self.shift_register & self.mask()
    }
}

/// CRC of a complete bit sequence.
pub fn crc_of_bits(polynomial: u32, bits: &[Bit]) -> u32 {
    let mut engine = CrcEngine::new(polynomial);
    for &bit in bits {
        engine.consume_bit(bit);
    }
    engine.finalize()
}
