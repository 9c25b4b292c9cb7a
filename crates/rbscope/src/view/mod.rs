//! Value interpretation
//!
//! [`Inspector::interpret`] turns a tagged word into a [`DecodedView`]:
//! classify it, then hand heap objects to the decoder registered for their
//! type tag in [`decoder_for`]. The table is a plain `match` over
//! [`ValueType`] with no wildcard, so adding a type forces a decision here.
//! Tags the target defines but we don't know at all, and known tags without
//! a specialized decoder, get the [`BasicView`] fallback, which never reads
//! memory and never fails.
//!
//! # Architecture
//!
//! ```text
//! TaggedValue ─▶ classify ─▶ Immediate ──────────────────▶ DecodedView::Immediate
//!                    │
//!                    └─────▶ HeapObject ─▶ decoder_for(tag) ─▶ DecodedView::{String, Array, ...}
//! ```

pub mod array;
pub mod basic;
pub mod bignum;
pub mod float;
pub mod hash;
pub mod rstruct;
pub mod string;
pub mod symbol;

pub use array::ArrayView;
pub use basic::BasicView;
pub use bignum::BignumView;
pub use float::FloatView;
pub use hash::HashView;
pub use rstruct::StructView;
pub use string::StringView;
pub use symbol::SymbolView;

use tracing::debug;

use crate::backend::{Backend, TargetValue};
use crate::classify::{self, Classification, HeapObject, ObjectHeader};
use crate::constants::{Constant, RuntimeConstants, ValueType};
use crate::error::{InspectError, MemoryError, Result};
use crate::types::WORD_SIZE;
use crate::value::{Immediate, TaggedValue};

/// Default number of children decoded per collection.
pub const DEFAULT_ELEMENT_LIMIT: usize = 64;

// ═══════════════════════════════════════════════════════════════════════
// DECODED VIEWS
// ═══════════════════════════════════════════════════════════════════════

/// A child reference exposed for recursive printing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Child {
    /// Label printed before the child (`[0]`, `[2] key`)
    pub label: String,

    /// The child word
    pub value: TaggedValue,
}

impl Child {
    /// Create a labelled child.
    pub fn new(label: impl Into<String>, value: TaggedValue) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Type-specific interpretation of one tagged value.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedView {
    /// Value encoded in the word itself
    Immediate {
        /// The original word
        value: TaggedValue,
        /// What it decodes to
        immediate: Immediate,
    },

    /// Header-only fallback
    Basic(BasicView),

    /// `T_STRING`
    String(StringView),

    /// `T_ARRAY`
    Array(ArrayView),

    /// `T_HASH`
    Hash(HashView),

    /// `T_STRUCT`
    Struct(StructView),

    /// Heap `T_FLOAT`
    Float(FloatView),

    /// `T_BIGNUM`
    Bignum(BignumView),

    /// Dynamic `T_SYMBOL`
    Symbol(SymbolView),
}

impl DecodedView {
    /// The heap object this view decodes, if it isn't an immediate.
    pub fn object(&self) -> Option<&HeapObject> {
        match self {
            DecodedView::Immediate { .. } => None,
            DecodedView::Basic(view) => Some(&view.object),
            DecodedView::String(view) => Some(&view.object),
            DecodedView::Array(view) => Some(&view.object),
            DecodedView::Hash(view) => Some(&view.object),
            DecodedView::Struct(view) => Some(&view.object),
            DecodedView::Float(view) => Some(&view.object),
            DecodedView::Bignum(view) => Some(&view.object),
            DecodedView::Symbol(view) => Some(&view.object),
        }
    }

    /// The word this view was decoded from.
    pub fn value(&self) -> TaggedValue {
        match self {
            DecodedView::Immediate { value, .. } => *value,
            _ => self.object().map_or(TaggedValue::new(0), |o| o.value),
        }
    }

    /// Header of the heap object, as read alongside the variant's fields.
    pub fn header(&self) -> Option<&ObjectHeader> {
        self.object().map(|o| &o.header)
    }

    /// Heap address, or `None` for immediates.
    pub fn address(&self) -> Option<u64> {
        self.object().map(HeapObject::address)
    }

    /// Type tag name, e.g. `T_STRING`.
    pub fn type_name(&self) -> String {
        match self {
            DecodedView::Immediate { immediate, .. } => immediate.value_type().name().to_string(),
            _ => self.object().map(HeapObject::type_name).unwrap_or_default(),
        }
    }

    /// `<T_STRING@0x7f..>` for heap objects, `<T_FIXNUM>` for immediates.
    pub fn tag(&self) -> String {
        match self.address() {
            Some(address) => format!("<{}@0x{:x}>", self.type_name(), address),
            None => format!("<{}>", self.type_name()),
        }
    }

    /// One-line description of the value.
    pub fn summary(&self) -> String {
        match self {
            DecodedView::Immediate { immediate, .. } => immediate.to_string(),
            DecodedView::Basic(view) => view.summary(),
            DecodedView::String(view) => view.summary(),
            DecodedView::Array(view) => view.summary(),
            DecodedView::Hash(view) => view.summary(),
            DecodedView::Struct(view) => view.summary(),
            DecodedView::Float(view) => view.summary(),
            DecodedView::Bignum(view) => view.summary(),
            DecodedView::Symbol(view) => view.summary(),
        }
    }

    /// Tag followed by the summary, when there is one.
    pub fn line(&self) -> String {
        let summary = self.summary();
        if summary.is_empty() {
            self.tag()
        } else {
            format!("{} {}", self.tag(), summary)
        }
    }

    /// Variant internals shown in debug mode.
    pub fn debug_fields(&self) -> Vec<(&'static str, String)> {
        match self {
            DecodedView::Immediate { value, .. } => vec![("bits", value.to_string())],
            DecodedView::Basic(_) => Vec::new(),
            DecodedView::String(view) => view.debug_fields(),
            DecodedView::Array(view) => view.debug_fields(),
            DecodedView::Hash(view) => view.debug_fields(),
            DecodedView::Struct(view) => view.debug_fields(),
            DecodedView::Float(_) => Vec::new(),
            DecodedView::Bignum(view) => view.debug_fields(),
            DecodedView::Symbol(view) => view.debug_fields(),
        }
    }

    /// Children in print order.
    pub fn children(&self) -> Vec<Child> {
        match self {
            DecodedView::Array(view) => view.children(),
            DecodedView::Hash(view) => view.children(),
            DecodedView::Struct(view) => view.children(),
            _ => Vec::new(),
        }
    }

    /// Number of children left out because of the element limit.
    pub fn omitted(&self) -> usize {
        match self {
            DecodedView::Array(view) => view.omitted(),
            DecodedView::Hash(view) => view.omitted(),
            DecodedView::Struct(view) => view.omitted(),
            _ => 0,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// DISPATCH
// ═══════════════════════════════════════════════════════════════════════

/// Builds a view for one classified heap object.
pub type Decoder = fn(&Inspector<'_>, HeapObject) -> Result<DecodedView>;

/// The decoder for a heap type tag.
pub fn decoder_for(value_type: ValueType) -> Decoder {
    match value_type {
        ValueType::String => string::decode,
        ValueType::Array => array::decode,
        ValueType::Hash => hash::decode,
        ValueType::Struct => rstruct::decode,
        ValueType::Float => float::decode,
        ValueType::Bignum => bignum::decode,
        ValueType::Symbol => symbol::decode,
        ValueType::None
        | ValueType::Object
        | ValueType::Class
        | ValueType::Module
        | ValueType::Regexp
        | ValueType::File
        | ValueType::Data
        | ValueType::Match
        | ValueType::Complex
        | ValueType::Rational
        | ValueType::Nil
        | ValueType::True
        | ValueType::False
        | ValueType::Fixnum
        | ValueType::Undef
        | ValueType::Imemo
        | ValueType::Node
        | ValueType::Iclass
        | ValueType::Zombie
        | ValueType::Moved => basic::decode,
    }
}

/// Classifies and decodes values from one backend.
#[derive(Clone, Copy)]
pub struct Inspector<'a> {
    backend: &'a dyn Backend,
    constants: &'a RuntimeConstants,
    element_limit: usize,
}

impl<'a> Inspector<'a> {
    /// Create an inspector with the default element limit.
    pub fn new(backend: &'a dyn Backend, constants: &'a RuntimeConstants) -> Self {
        Self {
            backend,
            constants,
            element_limit: DEFAULT_ELEMENT_LIMIT,
        }
    }

    /// Set the per-collection element limit (builder pattern)
    pub fn with_element_limit(mut self, limit: usize) -> Self {
        self.element_limit = limit;
        self
    }

    /// The backend values are read through.
    pub fn backend(&self) -> &'a dyn Backend {
        self.backend
    }

    /// The constants used for classification and layout flags.
    pub fn constants(&self) -> &'a RuntimeConstants {
        self.constants
    }

    /// Maximum children decoded per collection.
    pub fn element_limit(&self) -> usize {
        self.element_limit
    }

    /// Classify a word. See [`classify::classify`].
    pub fn classify(&self, value: TaggedValue) -> Result<Classification> {
        classify::classify(self.backend, self.constants, value)
    }

    /// Classify and decode a word.
    pub fn interpret(&self, value: TaggedValue) -> Result<DecodedView> {
        self.decode(self.classify(value)?)
    }

    /// Decode a classification. Total over every classifier output.
    pub fn decode(&self, classification: Classification) -> Result<DecodedView> {
        match classification {
            Classification::Immediate { value, immediate } => {
                Ok(DecodedView::Immediate { value, immediate })
            }
            Classification::Heap(object) => match object.value_type {
                Some(value_type) => {
                    debug!(
                        address = object.address(),
                        tag = value_type.name(),
                        "decoding heap object"
                    );
                    decoder_for(value_type)(self, object)
                }
                None => Ok(DecodedView::Basic(BasicView::new(object))),
            },
        }
    }

    /// Read the full object struct and re-parse its header from that same read.
    pub(crate) fn read_struct(
        &self,
        object: HeapObject,
        type_name: &str,
    ) -> Result<(TargetValue, HeapObject)> {
        let read = self.read_object(object, type_name, 0, |_, _| Ok(0))?;
        Ok((read.value, read.object))
    }

    /// Read an object struct together with the inline data that follows it
    /// in the same slot, as one read.
    ///
    /// `hint` is the number of bytes to read up front, from the header seen
    /// during classification. `extent` gives the bytes actually needed given
    /// the struct as read. If more are needed than were read, the object is
    /// read once more at the larger size and everything is re-parsed from
    /// that read, so header, fields and inline data always agree.
    pub(crate) fn read_object(
        &self,
        object: HeapObject,
        type_name: &str,
        hint: usize,
        extent: impl Fn(&TargetValue, &ObjectHeader) -> Result<usize>,
    ) -> Result<ObjectRead> {
        let ty = self.backend.lookup_type(type_name)?;
        let address = object.address();
        let mut size = ty.size.max(hint);
        for _ in 0..2 {
            let bytes = self.backend.read_memory(address, size)?;
            let fields = bytes
                .get(..ty.size)
                .ok_or_else(|| MemoryError::new(address, size))?
                .to_vec();
            let value = TargetValue::new(ty.clone(), fields, Some(address));
            let header = ObjectHeader::from_struct(&value)?;
            let needed = extent(&value, &header)?;
            if needed <= bytes.len() {
                return Ok(ObjectRead {
                    value,
                    object: object.with_header(header),
                    bytes,
                });
            }
            size = needed;
        }
        Err(InspectError::corrupt(
            address,
            "inline data grew while the object was being read",
        ))
    }

    /// Read `count` consecutive words.
    pub(crate) fn read_words(&self, address: u64, count: usize) -> Result<Vec<TaggedValue>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let size = count
            .checked_mul(WORD_SIZE)
            .ok_or_else(|| MemoryError::new(address, usize::MAX))?;
        let bytes = self.backend.read_memory(address, size)?;
        Ok(words(&bytes).map(TaggedValue::new).collect())
    }

    /// Whether a layout flag is set in a flags word.
    pub(crate) fn flag(&self, flags: u64, flag: Constant) -> bool {
        flags & self.constants.get(flag) != 0
    }
}

/// An object struct and its inline data, from a single read.
#[derive(Debug, Clone)]
pub(crate) struct ObjectRead {
    /// The struct fields
    pub value: TargetValue,

    /// The object, header re-parsed from this read
    pub object: HeapObject,

    /// Every byte read, starting at the object address
    pub bytes: Vec<u8>,
}

impl ObjectRead {
    /// `len` inline bytes at `offset` from the object start.
    pub fn inline(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or_else(|| {
                InspectError::corrupt(
                    self.object.address(),
                    format!("{} inline bytes at +{} lie outside the object read", len, offset),
                )
            })
    }

    /// `count` inline words at `offset` from the object start.
    pub fn inline_words(&self, offset: usize, count: usize) -> Result<Vec<TaggedValue>> {
        let bytes = self.inline(offset, count * WORD_SIZE)?;
        Ok(words(bytes).map(TaggedValue::new).collect())
    }

    /// Target address `offset` bytes into the object.
    pub fn address_at(&self, offset: usize) -> Result<u64> {
        let address = self.object.address();
        address.checked_add(offset as u64).ok_or_else(|| {
            InspectError::corrupt(address, "object runs past the address space")
        })
    }
}

/// Little-endian word at `offset`, zero-padded past the end of `bytes`.
pub(crate) fn word_at(bytes: &[u8], offset: usize) -> u64 {
    let mut word = [0u8; WORD_SIZE];
    if let Some(tail) = bytes.get(offset..) {
        let n = tail.len().min(WORD_SIZE);
        word[..n].copy_from_slice(&tail[..n]);
    }
    u64::from_le_bytes(word)
}

/// Split little-endian bytes into words.
pub(crate) fn words(bytes: &[u8]) -> impl Iterator<Item = u64> + '_ {
    bytes.chunks_exact(WORD_SIZE).map(|chunk| {
        let mut word = [0u8; WORD_SIZE];
        word.copy_from_slice(chunk);
        u64::from_le_bytes(word)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_decoder_table_is_total() {
        // Every type resolves to some decoder; the match has no wildcard.
        for value_type in ValueType::iter() {
            let _ = decoder_for(value_type);
        }
    }

    #[test]
    fn test_words_little_endian() {
        let bytes = [1, 0, 0, 0, 0, 0, 0, 0, 0x10, 0, 0, 0, 0, 0, 0, 0];
        assert_eq!(words(&bytes).collect::<Vec<_>>(), vec![1, 0x10]);
    }

    #[test]
    fn test_immediate_view_line() {
        let view = DecodedView::Immediate {
            value: TaggedValue::new(0x07),
            immediate: Immediate::Fixnum(3),
        };
        assert_eq!(view.line(), "<T_FIXNUM> 3");
        assert_eq!(view.address(), None);
        assert!(view.children().is_empty());
    }
}
