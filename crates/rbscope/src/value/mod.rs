//! Tagged runtime values
//!
//! A `TaggedValue` is one machine word read from the target. Depending on its
//! low bits it either encodes a scalar directly (an [`Immediate`]) or points
//! at a heap object whose header carries the type tag.

mod display;

pub use display::format_float;

use crate::constants::ValueType;

/// A raw runtime `VALUE` word.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaggedValue(u64);

impl TaggedValue {
    /// Wrap raw bits.
    pub const fn new(bits: u64) -> Self {
        TaggedValue(bits)
    }

    /// The raw bits.
    pub const fn bits(self) -> u64 {
        self.0
    }
}

impl From<u64> for TaggedValue {
    fn from(bits: u64) -> Self {
        TaggedValue(bits)
    }
}

/// A value fully encoded in its bit pattern.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// `nil`
    Nil,

    /// `true`
    True,

    /// `false`
    False,

    /// The internal "no value" sentinel
    Undef,

    /// Small integer
    Fixnum(i64),

    /// Float packed into the word
    Flonum(f64),

    /// Static symbol, identified by its ID
    Symbol(u64),
}

impl Immediate {
    /// The type tag a runtime would report for this immediate.
    pub fn value_type(&self) -> ValueType {
        match self {
            Immediate::Nil => ValueType::Nil,
            Immediate::True => ValueType::True,
            Immediate::False => ValueType::False,
            Immediate::Undef => ValueType::Undef,
            Immediate::Fixnum(_) => ValueType::Fixnum,
            Immediate::Flonum(_) => ValueType::Float,
            Immediate::Symbol(_) => ValueType::Symbol,
        }
    }
}

/// Decode a flonum word back into its double.
///
/// Flonums store a double rotated left by three bits with the exponent's top
/// bits folded away; `0x8000000000000002` is the special encoding of `0.0`.
pub fn flonum_to_f64(bits: u64) -> f64 {
    if bits == 0x8000_0000_0000_0002 {
        return 0.0;
    }
    let b63 = bits >> 63;
    let restored = (2u64.wrapping_sub(b63) | (bits & !0x03)).rotate_right(3);
    f64::from_bits(restored)
}

/// Encode a double as a flonum word, if it is representable.
///
/// Used to build test heaps; mirrors the runtime's `rb_float_new_inline`.
pub fn f64_to_flonum(value: f64) -> Option<u64> {
    let bits = value.to_bits();
    let exponent_bits = ((bits >> 60) & 0x7) as i64;
    if bits != 0x3000_0000_0000_0000 && (exponent_bits - 3) & !0x01 == 0 {
        return Some((bits.rotate_left(3) & !0x01) | 0x02);
    }
    if bits == 0 {
        return Some(0x8000_0000_0000_0002);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flonum_zero() {
        assert_eq!(flonum_to_f64(0x8000_0000_0000_0002), 0.0);
    }

    #[test]
    fn test_flonum_round_values() {
        for v in [1.0, 1.5, -2.25, 3.14159, 1e10, -0.5] {
            let word = f64_to_flonum(v).unwrap();
            assert_eq!(word & 0x03, 0x02, "{v} must carry the flonum tag");
            assert_eq!(flonum_to_f64(word), v);
        }
    }

    #[test]
    fn test_huge_float_is_not_flonum() {
        assert_eq!(f64_to_flonum(1e300), None);
    }

    #[test]
    fn test_immediate_value_types() {
        assert_eq!(Immediate::Nil.value_type(), ValueType::Nil);
        assert_eq!(Immediate::Fixnum(3).value_type(), ValueType::Fixnum);
        assert_eq!(Immediate::Flonum(1.0).value_type(), ValueType::Float);
    }
}
