//! `T_STRUCT` decoder
//!
//! Small structs keep their members inline and record the count in the
//! flags; a zero count there means the members are out of line.

use crate::classify::HeapObject;
use crate::constants::Constant;
use crate::error::{InspectError, Result};
use crate::types::WORD_SIZE;
use crate::value::TaggedValue;

use super::{Child, DecodedView, Inspector};

/// A decoded struct instance.
#[derive(Debug, Clone, PartialEq)]
pub struct StructView {
    /// The classified object, header from the struct read
    pub object: HeapObject,

    /// Member count
    pub length: usize,

    /// Members live inside the object
    pub embedded: bool,

    /// Leading members, at most the element limit
    pub members: Vec<TaggedValue>,
}

impl StructView {
    /// Member count.
    pub fn summary(&self) -> String {
        format!("length={}", self.length)
    }

    /// Layout details.
    pub fn debug_fields(&self) -> Vec<(&'static str, String)> {
        vec![("embedded", self.embedded.to_string())]
    }

    /// Members labelled by position.
    pub fn children(&self) -> Vec<Child> {
        self.members
            .iter()
            .enumerate()
            .map(|(i, value)| Child::new(format!("[{}]", i), *value))
            .collect()
    }

    /// Members not read.
    pub fn omitted(&self) -> usize {
        self.length.saturating_sub(self.members.len())
    }
}

/// Decode a `struct RStruct`.
pub fn decode(inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    let offset = inspector.backend().offset_of("struct RStruct", "as.ary")?;
    let limit = inspector.element_limit();
    let inline_extent = |flags: u64| match embedded_length(inspector, flags) {
        0 => 0,
        length => offset + length.min(limit) * WORD_SIZE,
    };

    let read = inspector.read_object(
        object,
        "struct RStruct",
        inline_extent(object.header.flags),
        |_, header| Ok(inline_extent(header.flags)),
    )?;
    let object = read.object;

    let (length, embedded, members) = match embedded_length(inspector, object.header.flags) {
        0 => {
            let len = read.value.i64_member("as.heap.len")?;
            if len < 0 {
                return Err(InspectError::corrupt(
                    object.address(),
                    format!("negative struct length {}", len),
                ));
            }
            let length = len as usize;
            let pointer = read.value.u64_member("as.heap.ptr")?;
            (length, false, inspector.read_words(pointer, length.min(limit))?)
        }
        length => (length, true, read.inline_words(offset, length.min(limit))?),
    };

    Ok(DecodedView::Struct(StructView {
        object,
        length,
        embedded,
        members,
    }))
}

fn embedded_length(inspector: &Inspector<'_>, flags: u64) -> usize {
    inspector.constants().field_bits(
        flags,
        Constant::StructEmbedLenMask,
        Constant::StructEmbedLenShift,
    ) as usize
}
