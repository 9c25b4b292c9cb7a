//! Type classification of tagged words
//!
//! Immediate encodings are tested first, in a fixed order, because their bit
//! patterns overlap; only a word matching none of them is treated as a heap
//! pointer. Immediates are decoded from the bits alone. A heap pointer costs
//! exactly one read: its `struct RBasic` header.

use tracing::trace;

use crate::backend::{Backend, TargetValue};
use crate::constants::{Constant, RuntimeConstants, ValueType};
use crate::error::{EvalError, InspectError, Result};
use crate::value::{flonum_to_f64, Immediate, TaggedValue};

/// The two header words every heap object starts with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHeader {
    /// Object address
    pub address: u64,

    /// Raw `RBasic.flags`
    pub flags: u64,

    /// Raw `RBasic.klass`
    pub klass: u64,
}

impl ObjectHeader {
    /// Parse the header out of any value whose type starts with `struct RBasic`.
    pub fn from_struct(value: &TargetValue) -> Result<Self> {
        let address = value.address().ok_or_else(|| EvalError::NotAddressable {
            type_name: value.ty().name.clone(),
        })?;
        Ok(Self {
            address,
            flags: value.u64_member("basic.flags")?,
            klass: value.u64_member("basic.klass")?,
        })
    }

    /// Raw type tag: `flags & RUBY_T_MASK`.
    pub fn raw_type(&self, constants: &RuntimeConstants) -> u64 {
        self.flags & constants.get(Constant::TypeMask)
    }
}

/// A classified heap reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeapObject {
    /// The word that was classified
    pub value: TaggedValue,

    /// Header read during classification
    pub header: ObjectHeader,

    /// Type tag bits exactly as stored
    pub raw_type: u64,

    /// Known type for the tag, if any
    pub value_type: Option<ValueType>,
}

impl HeapObject {
    /// Object address.
    pub fn address(&self) -> u64 {
        self.header.address
    }

    /// Display name of the type tag: `T_ARRAY` or `Unknown(0x19)`.
    pub fn type_name(&self) -> String {
        match self.value_type {
            Some(value_type) => value_type.name().to_string(),
            None => format!("Unknown(0x{:x})", self.raw_type),
        }
    }

    /// The same object with a header re-parsed from a larger struct read.
    pub fn with_header(mut self, header: ObjectHeader) -> Self {
        self.header = header;
        self
    }
}

/// Result of classifying one tagged word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Classification {
    /// Value fully encoded in the word
    Immediate {
        /// The word that was classified
        value: TaggedValue,
        /// What it decodes to
        immediate: Immediate,
    },

    /// Reference to a heap object
    Heap(HeapObject),
}

/// Decode a word as an immediate, without touching memory.
///
/// Order: special constants, fixnum, flonum, static symbol.
pub fn immediate(constants: &RuntimeConstants, value: TaggedValue) -> Option<Immediate> {
    let bits = value.bits();
    if bits == constants.get(Constant::Qfalse) {
        return Some(Immediate::False);
    }
    if bits == constants.get(Constant::Qnil) {
        return Some(Immediate::Nil);
    }
    if bits == constants.get(Constant::Qtrue) {
        return Some(Immediate::True);
    }
    if bits == constants.get(Constant::Qundef) {
        return Some(Immediate::Undef);
    }
    if bits & constants.get(Constant::FixnumFlag) != 0 {
        return Some(Immediate::Fixnum((bits as i64) >> 1));
    }
    let flonum_mask = constants.get(Constant::FlonumMask);
    if flonum_mask != 0 && bits & flonum_mask == constants.get(Constant::FlonumFlag) {
        return Some(Immediate::Flonum(flonum_to_f64(bits)));
    }
    if bits & 0xff == constants.get(Constant::SymbolFlag) {
        return Some(Immediate::Symbol(constants.shift_right(bits, Constant::SpecialShift)));
    }
    None
}

/// Classify a tagged word.
///
/// Fails with a memory error when the header of a heap reference can't be
/// read, and with a classification error when the word is neither an
/// immediate nor a plausible object address.
pub fn classify(
    backend: &dyn Backend,
    constants: &RuntimeConstants,
    value: TaggedValue,
) -> Result<Classification> {
    if let Some(immediate) = immediate(constants, value) {
        return Ok(Classification::Immediate { value, immediate });
    }

    let bits = value.bits();
    if bits & constants.get(Constant::ImmediateMask) != 0 {
        return Err(InspectError::Classification {
            bits,
            reason: "tag bits match no immediate encoding".to_string(),
        });
    }

    trace!(address = bits, "reading object header");
    let word = TargetValue::scalar(backend.lookup_type("VALUE")?, bits);
    let pointer = backend.cast(&word, &backend.lookup_type("struct RBasic *")?)?;
    let basic = backend.dereference(&pointer)?;
    let header = ObjectHeader::from_struct(&basic)?;
    let raw_type = header.raw_type(constants);

    Ok(Classification::Heap(HeapObject {
        value,
        header,
        raw_type,
        value_type: constants.value_type(raw_type),
    }))
}
