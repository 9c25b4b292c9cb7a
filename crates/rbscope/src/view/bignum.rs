//! `T_BIGNUM` decoder

use std::fmt::Write as _;

use crate::classify::HeapObject;
use crate::constants::Constant;
use crate::error::{InspectError, Result};

use super::{words, DecodedView, Inspector};

/// A decoded arbitrary precision integer.
#[derive(Debug, Clone, PartialEq)]
pub struct BignumView {
    /// The classified object, header from the struct read
    pub object: HeapObject,

    /// Sign bit clear
    pub negative: bool,

    /// Digits live inside the object
    pub embedded: bool,

    /// Number of `BDIGIT`s
    pub length: usize,

    /// Magnitude as little-endian 64-bit limbs; `None` when longer than the
    /// element limit
    pub limbs: Option<Vec<u64>>,
}

impl BignumView {
    /// Decimal value, or the digit count when it wasn't read.
    pub fn summary(&self) -> String {
        let sign = if self.negative { "-" } else { "" };
        match &self.limbs {
            Some(limbs) => format!("{}{}", sign, to_decimal(limbs)),
            None => format!("{}({} digits not read)", sign, self.length),
        }
    }

    /// Layout details.
    pub fn debug_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("len", self.length.to_string()),
            ("embedded", self.embedded.to_string()),
        ]
    }
}

/// Decode a `struct RBignum`.
///
/// Magnitudes longer than the element limit are left unread.
pub fn decode(inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    let backend = inspector.backend();
    let offset = backend.offset_of("struct RBignum", "as.ary")?;
    let digit_size = backend.lookup_type("BDIGIT")?.size;
    let limit = inspector.element_limit();
    let inline_extent = |flags: u64| {
        if !inspector.flag(flags, Constant::BignumEmbedFlag) {
            return 0;
        }
        match embedded_length(inspector, flags) {
            length if length <= limit => offset + length * digit_size,
            _ => 0,
        }
    };

    let read = inspector.read_object(
        object,
        "struct RBignum",
        inline_extent(object.header.flags),
        |_, header| Ok(inline_extent(header.flags)),
    )?;
    let object = read.object;
    let flags = object.header.flags;

    let negative = !inspector.flag(flags, Constant::BignumSignBit);
    let embedded = inspector.flag(flags, Constant::BignumEmbedFlag);
    let (length, limbs) = if embedded {
        let length = embedded_length(inspector, flags);
        let limbs = if length <= limit {
            Some(limbs_from_le_bytes(read.inline(offset, length * digit_size)?))
        } else {
            None
        };
        (length, limbs)
    } else {
        let length = read.value.u64_member("as.heap.len")?;
        let digits = read.value.u64_member("as.heap.digits")?;
        if digits == 0 && length > 0 {
            return Err(InspectError::corrupt(object.address(), "null digit buffer"));
        }
        let length = usize::try_from(length).unwrap_or(usize::MAX);
        let limbs = match length {
            0 => Some(Vec::new()),
            n if n <= limit => Some(limbs_from_le_bytes(
                &backend.read_memory(digits, n * digit_size)?,
            )),
            _ => None,
        };
        (length, limbs)
    };

    Ok(DecodedView::Bignum(BignumView {
        object,
        negative,
        embedded,
        length,
        limbs,
    }))
}

fn embedded_length(inspector: &Inspector<'_>, flags: u64) -> usize {
    inspector.constants().field_bits(
        flags,
        Constant::BignumEmbedLenMask,
        Constant::BignumEmbedLenShift,
    ) as usize
}

/// Regroup a little-endian magnitude into 64-bit limbs, whatever the digit
/// width.
fn limbs_from_le_bytes(bytes: &[u8]) -> Vec<u64> {
    let mut padded = bytes.to_vec();
    padded.resize(bytes.len().div_ceil(8) * 8, 0);
    words(&padded).collect()
}

/// Render a little-endian magnitude in decimal.
pub fn to_decimal(limbs: &[u64]) -> String {
    const CHUNK: u128 = 10_000_000_000_000_000_000;

    let mut limbs = limbs.to_vec();
    while limbs.last() == Some(&0) {
        limbs.pop();
    }
    if limbs.is_empty() {
        return "0".to_string();
    }

    // Repeated division by 10^19, least significant chunk first.
    let mut chunks = Vec::new();
    while !limbs.is_empty() {
        let mut remainder: u128 = 0;
        for limb in limbs.iter_mut().rev() {
            let current = (remainder << 64) | *limb as u128;
            *limb = (current / CHUNK) as u64;
            remainder = current % CHUNK;
        }
        chunks.push(remainder as u64);
        while limbs.last() == Some(&0) {
            limbs.pop();
        }
    }

    let mut text = String::new();
    for (i, chunk) in chunks.iter().rev().enumerate() {
        if i == 0 {
            let _ = write!(text, "{}", chunk);
        } else {
            let _ = write!(text, "{:019}", chunk);
        }
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero() {
        assert_eq!(to_decimal(&[]), "0");
        assert_eq!(to_decimal(&[0, 0]), "0");
    }

    #[test]
    fn test_single_limb() {
        assert_eq!(to_decimal(&[u64::MAX]), "18446744073709551615");
    }

    #[test]
    fn test_two_to_the_64() {
        assert_eq!(to_decimal(&[0, 1]), "18446744073709551616");
    }

    #[test]
    fn test_two_to_the_128_minus_one() {
        assert_eq!(
            to_decimal(&[u64::MAX, u64::MAX]),
            "340282366920938463463374607431768211455"
        );
    }

    #[test]
    fn test_limbs_from_narrow_digits() {
        // Two 32-bit digits: 0x00000001_00000002
        let bytes = [2, 0, 0, 0, 1, 0, 0, 0];
        assert_eq!(limbs_from_le_bytes(&bytes), vec![0x1_0000_0002]);
        assert_eq!(limbs_from_le_bytes(&[5]), vec![5]);
    }
}
