//! `T_ARRAY` decoder

use crate::classify::HeapObject;
use crate::constants::Constant;
use crate::error::{InspectError, Result};
use crate::types::WORD_SIZE;
use crate::value::TaggedValue;

use super::{Child, DecodedView, Inspector};

/// A decoded array.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrayView {
    /// The classified object, header from the struct read
    pub object: HeapObject,

    /// Element count
    pub length: usize,

    /// Elements live inside the object
    pub embedded: bool,

    /// Out-of-line element table, when not embedded
    pub pointer: Option<u64>,

    /// Leading elements, at most the element limit
    pub elements: Vec<TaggedValue>,
}

impl ArrayView {
    /// Element count.
    pub fn summary(&self) -> String {
        format!("length={}", self.length)
    }

    /// Layout details.
    pub fn debug_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![("embedded", self.embedded.to_string())];
        if let Some(pointer) = self.pointer {
            fields.push(("ptr", format!("0x{:x}", pointer)));
        }
        fields
    }

    /// Elements labelled by index.
    pub fn children(&self) -> Vec<Child> {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, value)| Child::new(format!("[{}]", i), *value))
            .collect()
    }

    /// Elements not read.
    pub fn omitted(&self) -> usize {
        self.length.saturating_sub(self.elements.len())
    }
}

/// Decode a `struct RArray`.
///
/// Embedded elements come out of the same read as the header.
pub fn decode(inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    let offset = inspector.backend().offset_of("struct RArray", "as.ary")?;
    let limit = inspector.element_limit();
    let inline_extent = |flags: u64| {
        if inspector.flag(flags, Constant::ArrayEmbedFlag) {
            offset + embedded_length(inspector, flags).min(limit) * WORD_SIZE
        } else {
            0
        }
    };

    let read = inspector.read_object(
        object,
        "struct RArray",
        inline_extent(object.header.flags),
        |_, header| Ok(inline_extent(header.flags)),
    )?;
    let object = read.object;
    let flags = object.header.flags;

    let embedded = inspector.flag(flags, Constant::ArrayEmbedFlag);
    let (length, pointer, elements) = if embedded {
        let length = embedded_length(inspector, flags);
        (length, None, read.inline_words(offset, length.min(limit))?)
    } else {
        let len = read.value.i64_member("as.heap.len")?;
        if len < 0 {
            return Err(InspectError::corrupt(
                object.address(),
                format!("negative array length {}", len),
            ));
        }
        let pointer = read.value.u64_member("as.heap.ptr")?;
        if pointer == 0 && len > 0 {
            return Err(InspectError::corrupt(
                object.address(),
                "null element table for non-empty array",
            ));
        }
        let length = len as usize;
        let elements = inspector.read_words(pointer, length.min(limit))?;
        (length, Some(pointer), elements)
    };

    Ok(DecodedView::Array(ArrayView {
        object,
        length,
        embedded,
        pointer,
        elements,
    }))
}

fn embedded_length(inspector: &Inspector<'_>, flags: u64) -> usize {
    inspector.constants().field_bits(
        flags,
        Constant::ArrayEmbedLenMask,
        Constant::ArrayEmbedLenShift,
    ) as usize
}
