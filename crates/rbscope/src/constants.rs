//! Runtime type constants
//!
//! Tag values, immediate encodings and per-type flag bits are compile-time
//! constants of the *target*, so they are asked from the backend rather than
//! hard-coded. Every constant has a default (a 64-bit CRuby 3.3 build) for
//! targets whose debug info does not carry it.
//!
//! The resolved table is cached per session in a [`TypeConstantTable`] and
//! rebuilt whenever the backend reports a different binary.

use indexmap::IndexMap;
use strum::{EnumCount, EnumIter, IntoEnumIterator, IntoStaticStr};
use tracing::{debug, error};

use crate::backend::Backend;
use crate::error::{InspectError, Result};

// ═══════════════════════════════════════════════════════════════════════
// TYPE TAGS
// ═══════════════════════════════════════════════════════════════════════

/// Runtime type variants, as found in an object header's type-tag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum ValueType {
    /// Free heap slot
    #[strum(serialize = "T_NONE")]
    None,
    /// Plain object with instance variables
    #[strum(serialize = "T_OBJECT")]
    Object,
    /// Class
    #[strum(serialize = "T_CLASS")]
    Class,
    /// Module
    #[strum(serialize = "T_MODULE")]
    Module,
    /// Float (heap-allocated when not representable as a flonum)
    #[strum(serialize = "T_FLOAT")]
    Float,
    /// String
    #[strum(serialize = "T_STRING")]
    String,
    /// Regexp
    #[strum(serialize = "T_REGEXP")]
    Regexp,
    /// Array
    #[strum(serialize = "T_ARRAY")]
    Array,
    /// Hash
    #[strum(serialize = "T_HASH")]
    Hash,
    /// Struct instance
    #[strum(serialize = "T_STRUCT")]
    Struct,
    /// Arbitrary precision integer
    #[strum(serialize = "T_BIGNUM")]
    Bignum,
    /// IO
    #[strum(serialize = "T_FILE")]
    File,
    /// C extension data
    #[strum(serialize = "T_DATA")]
    Data,
    /// MatchData
    #[strum(serialize = "T_MATCH")]
    Match,
    /// Complex
    #[strum(serialize = "T_COMPLEX")]
    Complex,
    /// Rational
    #[strum(serialize = "T_RATIONAL")]
    Rational,
    /// nil
    #[strum(serialize = "T_NIL")]
    Nil,
    /// true
    #[strum(serialize = "T_TRUE")]
    True,
    /// false
    #[strum(serialize = "T_FALSE")]
    False,
    /// Symbol
    #[strum(serialize = "T_SYMBOL")]
    Symbol,
    /// Small integer
    #[strum(serialize = "T_FIXNUM")]
    Fixnum,
    /// Undefined sentinel
    #[strum(serialize = "T_UNDEF")]
    Undef,
    /// Internal memo object
    #[strum(serialize = "T_IMEMO")]
    Imemo,
    /// Syntax tree node
    #[strum(serialize = "T_NODE")]
    Node,
    /// Include class
    #[strum(serialize = "T_ICLASS")]
    Iclass,
    /// Object awaiting finalization
    #[strum(serialize = "T_ZOMBIE")]
    Zombie,
    /// Slot vacated by compaction
    #[strum(serialize = "T_MOVED")]
    Moved,
}

impl ValueType {
    /// Display name, e.g. `T_STRING`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Name of the target constant holding this tag, e.g. `RUBY_T_STRING`.
    pub fn constant_name(self) -> String {
        format!("RUBY_{}", self.name())
    }

    /// Tag value used when the target doesn't define the constant.
    pub fn default_tag(self) -> u64 {
        match self {
            ValueType::None => 0x00,
            ValueType::Object => 0x01,
            ValueType::Class => 0x02,
            ValueType::Module => 0x03,
            ValueType::Float => 0x04,
            ValueType::String => 0x05,
            ValueType::Regexp => 0x06,
            ValueType::Array => 0x07,
            ValueType::Hash => 0x08,
            ValueType::Struct => 0x09,
            ValueType::Bignum => 0x0a,
            ValueType::File => 0x0b,
            ValueType::Data => 0x0c,
            ValueType::Match => 0x0d,
            ValueType::Complex => 0x0e,
            ValueType::Rational => 0x0f,
            ValueType::Nil => 0x11,
            ValueType::True => 0x12,
            ValueType::False => 0x13,
            ValueType::Symbol => 0x14,
            ValueType::Fixnum => 0x15,
            ValueType::Undef => 0x16,
            ValueType::Imemo => 0x1a,
            ValueType::Node => 0x1b,
            ValueType::Iclass => 0x1c,
            ValueType::Zombie => 0x1d,
            ValueType::Moved => 0x1e,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ENCODING AND LAYOUT CONSTANTS
// ═══════════════════════════════════════════════════════════════════════

/// Named encoding and layout constants resolved from the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, EnumCount, IntoStaticStr)]
pub enum Constant {
    /// `false`
    #[strum(serialize = "RUBY_Qfalse")]
    Qfalse,
    /// `nil`
    #[strum(serialize = "RUBY_Qnil")]
    Qnil,
    /// `true`
    #[strum(serialize = "RUBY_Qtrue")]
    Qtrue,
    /// Undefined sentinel
    #[strum(serialize = "RUBY_Qundef")]
    Qundef,
    /// Low bits that are non-zero for every immediate except the specials
    #[strum(serialize = "RUBY_IMMEDIATE_MASK")]
    ImmediateMask,
    /// Fixnum marker bit
    #[strum(serialize = "RUBY_FIXNUM_FLAG")]
    FixnumFlag,
    /// Flonum tag mask (zero on builds without flonums)
    #[strum(serialize = "RUBY_FLONUM_MASK")]
    FlonumMask,
    /// Flonum tag value
    #[strum(serialize = "RUBY_FLONUM_FLAG")]
    FlonumFlag,
    /// Low byte of a static symbol
    #[strum(serialize = "RUBY_SYMBOL_FLAG")]
    SymbolFlag,
    /// Shift from a static symbol word to its ID
    #[strum(serialize = "RUBY_SPECIAL_SHIFT")]
    SpecialShift,
    /// Type-tag bits of the header flags
    #[strum(serialize = "RUBY_T_MASK")]
    TypeMask,
    /// First bit available to per-type flags
    #[strum(serialize = "RUBY_FL_USHIFT")]
    FlUshift,
    /// String bytes live out of line
    #[strum(serialize = "RSTRING_NOEMBED")]
    StringNoEmbed,
    /// Array elements live inside the object
    #[strum(serialize = "RARRAY_EMBED_FLAG")]
    ArrayEmbedFlag,
    /// Embedded array length bits
    #[strum(serialize = "RARRAY_EMBED_LEN_MASK")]
    ArrayEmbedLenMask,
    /// Embedded array length shift
    #[strum(serialize = "RARRAY_EMBED_LEN_SHIFT")]
    ArrayEmbedLenShift,
    /// Hash uses an st_table rather than an ar_table
    #[strum(serialize = "RHASH_ST_TABLE_FLAG")]
    HashStTableFlag,
    /// ar_table live-entry count bits
    #[strum(serialize = "RHASH_AR_TABLE_SIZE_MASK")]
    HashArSizeMask,
    /// ar_table live-entry count shift
    #[strum(serialize = "RHASH_AR_TABLE_SIZE_SHIFT")]
    HashArSizeShift,
    /// ar_table used-slot bound bits
    #[strum(serialize = "RHASH_AR_TABLE_BOUND_MASK")]
    HashArBoundMask,
    /// ar_table used-slot bound shift
    #[strum(serialize = "RHASH_AR_TABLE_BOUND_SHIFT")]
    HashArBoundShift,
    /// Embedded struct length bits
    #[strum(serialize = "RSTRUCT_EMBED_LEN_MASK")]
    StructEmbedLenMask,
    /// Embedded struct length shift
    #[strum(serialize = "RSTRUCT_EMBED_LEN_SHIFT")]
    StructEmbedLenShift,
    /// Set for non-negative bignums
    #[strum(serialize = "BIGNUM_SIGN_BIT")]
    BignumSignBit,
    /// Bignum digits live inside the object
    #[strum(serialize = "BIGNUM_EMBED_FLAG")]
    BignumEmbedFlag,
    /// Embedded bignum length bits
    #[strum(serialize = "BIGNUM_EMBED_LEN_MASK")]
    BignumEmbedLenMask,
    /// Embedded bignum length shift
    #[strum(serialize = "BIGNUM_EMBED_LEN_SHIFT")]
    BignumEmbedLenShift,
}

impl Constant {
    /// Target constant name, e.g. `RUBY_Qnil`.
    pub fn name(self) -> &'static str {
        self.into()
    }

    /// Whether the constant is a bit shift, and so must be below 64.
    pub fn is_shift(self) -> bool {
        matches!(
            self,
            Constant::SpecialShift
                | Constant::FlUshift
                | Constant::ArrayEmbedLenShift
                | Constant::HashArSizeShift
                | Constant::HashArBoundShift
                | Constant::StructEmbedLenShift
                | Constant::BignumEmbedLenShift
        )
    }

    /// Value used when the target doesn't define the constant.
    pub fn default_value(self) -> u64 {
        const FL_USHIFT: u64 = 12;
        const fn user(n: u64) -> u64 {
            1 << (FL_USHIFT + n)
        }
        match self {
            Constant::Qfalse => 0x00,
            Constant::Qnil => 0x04,
            Constant::Qtrue => 0x14,
            Constant::Qundef => 0x24,
            Constant::ImmediateMask => 0x07,
            Constant::FixnumFlag => 0x01,
            Constant::FlonumMask => 0x03,
            Constant::FlonumFlag => 0x02,
            Constant::SymbolFlag => 0x0c,
            Constant::SpecialShift => 8,
            Constant::TypeMask => 0x1f,
            Constant::FlUshift => FL_USHIFT,
            Constant::StringNoEmbed => user(1),
            Constant::ArrayEmbedFlag => user(1),
            Constant::ArrayEmbedLenMask => 0x7f << (FL_USHIFT + 3),
            Constant::ArrayEmbedLenShift => FL_USHIFT + 3,
            Constant::HashStTableFlag => user(3),
            Constant::HashArSizeMask => 0xf << (FL_USHIFT + 4),
            Constant::HashArSizeShift => FL_USHIFT + 4,
            Constant::HashArBoundMask => 0xf << (FL_USHIFT + 8),
            Constant::HashArBoundShift => FL_USHIFT + 8,
            Constant::StructEmbedLenMask => 0x7f << (FL_USHIFT + 1),
            Constant::StructEmbedLenShift => FL_USHIFT + 1,
            Constant::BignumSignBit => user(1),
            Constant::BignumEmbedFlag => user(2),
            Constant::BignumEmbedLenMask => 0x7 << (FL_USHIFT + 3),
            Constant::BignumEmbedLenShift => FL_USHIFT + 3,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// RESOLVED TABLE
// ═══════════════════════════════════════════════════════════════════════

/// One target's resolved constants.
#[derive(Debug, Clone)]
pub struct RuntimeConstants {
    values: [u64; Constant::COUNT],
    tags: IndexMap<ValueType, u64>,
}

impl Default for RuntimeConstants {
    fn default() -> Self {
        Self {
            values: std::array::from_fn(|i| {
                Constant::iter()
                    .nth(i)
                    .map_or(0, Constant::default_value)
            }),
            tags: ValueType::iter().map(|t| (t, t.default_tag())).collect(),
        }
    }
}

impl RuntimeConstants {
    /// Ask the backend for every constant, falling back to defaults.
    pub fn resolve(backend: &dyn Backend) -> Result<Self> {
        let mut constants = Self::default();
        for constant in Constant::iter() {
            if let Some(value) = backend.lookup_constant(constant.name())? {
                constants.values[constant as usize] = value as u64;
            }
        }
        for value_type in ValueType::iter() {
            if let Some(tag) = backend.lookup_constant(&value_type.constant_name())? {
                constants.tags.insert(value_type, tag as u64);
            }
        }
        constants.validate()?;
        debug!(
            qnil = constants.get(Constant::Qnil),
            type_mask = constants.get(Constant::TypeMask),
            "resolved runtime constants"
        );
        Ok(constants)
    }

    /// Replace one constant (builder pattern)
    pub fn with(mut self, constant: Constant, value: u64) -> Self {
        self.values[constant as usize] = value;
        self
    }

    /// Value of a constant.
    pub fn get(&self, constant: Constant) -> u64 {
        self.values[constant as usize]
    }

    /// Tag value of a type in this target.
    pub fn tag_of(&self, value_type: ValueType) -> u64 {
        self.tags[&value_type]
    }

    /// Map a raw tag back to its type, if the target defines one with that value.
    pub fn value_type(&self, tag: u64) -> Option<ValueType> {
        self.tags
            .iter()
            .find_map(|(value_type, t)| (*t == tag).then_some(*value_type))
    }

    /// Display name for a raw tag: `T_STRING`, or `Unknown(0x1f)`.
    pub fn type_name(&self, tag: u64) -> String {
        match self.value_type(tag) {
            Some(value_type) => value_type.name().to_string(),
            None => format!("Unknown(0x{:x})", tag),
        }
    }

    /// `bits >> shift`, zero when the shift is out of range.
    pub fn shift_right(&self, bits: u64, shift: Constant) -> u64 {
        u32::try_from(self.get(shift))
            .ok()
            .and_then(|n| bits.checked_shr(n))
            .unwrap_or(0)
    }

    /// Extract `(flags & mask) >> shift`.
    pub fn field_bits(&self, flags: u64, mask: Constant, shift: Constant) -> u64 {
        self.shift_right(flags & self.get(mask), shift)
    }

    /// Every resolved value, by target name, in a stable order.
    pub fn entries(&self) -> Vec<(String, u64)> {
        Constant::iter()
            .map(|c| (c.name().to_string(), self.get(c)))
            .chain(self.tags.iter().map(|(t, v)| (t.constant_name(), *v)))
            .collect()
    }

    /// Check that the immediate encodings can't be confused with each other.
    ///
    /// An overlap would make classification depend on check order in ways
    /// the target doesn't; it's reported as a defect, not tolerated.
    pub fn validate(&self) -> Result<()> {
        if let Some(shift) = Constant::iter().find(|c| c.is_shift() && self.get(*c) >= 64) {
            return Err(InspectError::InvalidConstant {
                name: shift.name().to_string(),
                value: self.get(shift),
                reason: "shift must be below 64".to_string(),
            });
        }

        let specials = [
            (Constant::Qfalse, self.get(Constant::Qfalse)),
            (Constant::Qnil, self.get(Constant::Qnil)),
            (Constant::Qtrue, self.get(Constant::Qtrue)),
            (Constant::Qundef, self.get(Constant::Qundef)),
        ];
        let fixnum = self.get(Constant::FixnumFlag);
        let flonum_mask = self.get(Constant::FlonumMask);
        let flonum = self.get(Constant::FlonumFlag);
        let symbol = self.get(Constant::SymbolFlag);

        let mut problems = Vec::new();
        for (i, (a, va)) in specials.iter().enumerate() {
            for (b, vb) in &specials[i + 1..] {
                if va == vb {
                    problems.push(format!("{} and {} are both 0x{:x}", a.name(), b.name(), va));
                }
            }
            if va & fixnum != 0 {
                problems.push(format!("{} 0x{:x} looks like a fixnum", a.name(), va));
            }
            if flonum_mask != 0 && va & flonum_mask == flonum {
                problems.push(format!("{} 0x{:x} looks like a flonum", a.name(), va));
            }
            if va & 0xff == symbol {
                problems.push(format!("{} 0x{:x} looks like a symbol", a.name(), va));
            }
        }
        if fixnum == 0 {
            problems.push("RUBY_FIXNUM_FLAG is zero".to_string());
        }
        if flonum_mask != 0 && flonum & fixnum != 0 {
            problems.push("flonum tag overlaps the fixnum flag".to_string());
        }
        if symbol & fixnum != 0 || (flonum_mask != 0 && symbol & flonum_mask == flonum) {
            problems.push("symbol flag overlaps a numeric encoding".to_string());
        }
        if self.get(Constant::TypeMask) == 0 {
            problems.push("RUBY_T_MASK is zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            let message = problems.join("; ");
            error!(%message, "immediate encodings overlap");
            Err(InspectError::Ambiguity(message))
        }
    }
}

/// Session-wide cache of [`RuntimeConstants`].
///
/// Resolved on first use and kept until the backend reports a different
/// binary, since tag values and layouts may change across builds.
#[derive(Debug, Default)]
pub struct TypeConstantTable {
    cached: Option<(u64, RuntimeConstants)>,
}

impl TypeConstantTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the constants for the backend's current binary, resolving them if
    /// needed.
    pub fn resolve(&mut self, backend: &dyn Backend) -> Result<&RuntimeConstants> {
        let id = backend.binary_id();
        let entry = match self.cached.take() {
            Some((cached, constants)) if cached == id => (cached, constants),
            stale => {
                if stale.is_some() {
                    debug!(binary_id = id, "binary changed, re-resolving constants");
                }
                (id, RuntimeConstants::resolve(backend)?)
            }
        };
        Ok(&self.cached.insert(entry).1)
    }

    /// Whether constants are currently cached.
    pub fn is_resolved(&self) -> bool {
        self.cached.is_some()
    }

    /// Drop the cached constants.
    pub fn invalidate(&mut self) {
        self.cached = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RuntimeConstants::default().validate().is_ok());
    }

    #[test]
    fn test_value_type_names() {
        assert_eq!(ValueType::String.name(), "T_STRING");
        assert_eq!(ValueType::Moved.constant_name(), "RUBY_T_MOVED");
    }

    #[test]
    fn test_value_type_lookup_by_tag() {
        let constants = RuntimeConstants::default();
        assert_eq!(constants.value_type(0x05), Some(ValueType::String));
        assert_eq!(constants.value_type(0x1f), None);
        assert_eq!(constants.type_name(0x1f), "Unknown(0x1f)");
    }

    #[test]
    fn test_default_tags_are_distinct() {
        let constants = RuntimeConstants::default();
        for value_type in ValueType::iter() {
            assert_eq!(
                constants.value_type(value_type.default_tag()),
                Some(value_type)
            );
        }
    }

    #[test]
    fn test_duplicate_specials_are_ambiguous() {
        let constants = RuntimeConstants::default().with(Constant::Qnil, 0x14);
        let err = constants.validate().unwrap_err();
        assert!(matches!(err, InspectError::Ambiguity(_)));
        assert!(err.to_string().contains("RUBY_Qnil and RUBY_Qtrue"));
    }

    #[test]
    fn test_fixnum_like_special_is_ambiguous() {
        let constants = RuntimeConstants::default().with(Constant::Qundef, 0x25);
        assert!(constants.validate().is_err());
    }

    #[test]
    fn test_oversized_shift_is_rejected() {
        let constants = RuntimeConstants::default().with(Constant::SpecialShift, 64);
        let err = constants.validate().unwrap_err();
        assert!(matches!(
            err,
            InspectError::InvalidConstant { value: 64, .. }
        ));
        assert_eq!(
            err.to_string(),
            "invalid runtime constant RUBY_SPECIAL_SHIFT = 64: shift must be below 64"
        );
    }

    #[test]
    fn test_oversized_shift_extracts_nothing() {
        let constants = RuntimeConstants::default().with(Constant::ArrayEmbedLenShift, 200);
        assert_eq!(
            constants.field_bits(u64::MAX, Constant::ArrayEmbedLenMask, Constant::ArrayEmbedLenShift),
            0
        );
    }

    #[test]
    fn test_field_bits() {
        let constants = RuntimeConstants::default();
        let flags = 3u64 << 15 | 0x07;
        assert_eq!(
            constants.field_bits(flags, Constant::ArrayEmbedLenMask, Constant::ArrayEmbedLenShift),
            3
        );
    }
}
