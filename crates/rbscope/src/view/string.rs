//! `T_STRING` decoder
//!
//! Short strings keep their bytes inside the object slot, starting at
//! `as.embed.ary`; longer ones set `RSTRING_NOEMBED` and point at a heap
//! buffer through `as.heap.ptr`. The length is in `len` either way.

use std::fmt::Write as _;

use crate::classify::HeapObject;
use crate::constants::Constant;
use crate::error::{InspectError, Result};

use super::{DecodedView, Inspector};

/// Maximum number of string bytes read for a preview.
pub const PREVIEW_BYTES: usize = 256;

/// A decoded string.
#[derive(Debug, Clone, PartialEq)]
pub struct StringView {
    /// The classified object, header from the struct read
    pub object: HeapObject,

    /// Length in bytes
    pub length: usize,

    /// Bytes live inside the object
    pub embedded: bool,

    /// Out-of-line buffer, when not embedded
    pub pointer: Option<u64>,

    /// Leading bytes, at most [`PREVIEW_BYTES`]
    pub bytes: Vec<u8>,
}

impl StringView {
    /// Whether only part of the string was read.
    pub fn is_truncated(&self) -> bool {
        self.bytes.len() < self.length
    }

    /// Quoted, escaped text with a length note when truncated.
    pub fn summary(&self) -> String {
        let mut summary = format!("\"{}\"", escape_bytes(&self.bytes));
        if self.is_truncated() {
            let _ = write!(summary, "... ({} bytes)", self.length);
        }
        summary
    }

    /// Layout details.
    pub fn debug_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("len", self.length.to_string()),
            ("embedded", self.embedded.to_string()),
        ];
        if let Some(pointer) = self.pointer {
            fields.push(("ptr", format!("0x{:x}", pointer)));
        }
        fields
    }
}

/// Decode a `struct RString`.
pub fn decode(inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    Ok(DecodedView::String(read(inspector, object)?))
}

/// Decode a string object without wrapping it in a view enum.
///
/// Embedded bytes are taken from the same read as `len` and the header.
pub fn read(inspector: &Inspector<'_>, object: HeapObject) -> Result<StringView> {
    let offset = inspector.backend().offset_of("struct RString", "as.embed.ary")?;
    let is_embedded = |flags: u64| !inspector.flag(flags, Constant::StringNoEmbed);

    let read = inspector.read_object(object, "struct RString", 0, |rstring, header| {
        if !is_embedded(header.flags) {
            return Ok(0);
        }
        let len = rstring.i64_member("len")?.max(0) as usize;
        Ok(offset + len.min(PREVIEW_BYTES))
    })?;
    let object = read.object;

    let len = read.value.i64_member("len")?;
    if len < 0 {
        return Err(InspectError::corrupt(
            object.address(),
            format!("negative string length {}", len),
        ));
    }
    let length = len as usize;
    let embedded = is_embedded(object.header.flags);
    let preview = length.min(PREVIEW_BYTES);

    let (pointer, bytes) = if embedded {
        (None, read.inline(offset, preview)?.to_vec())
    } else {
        let pointer = read.value.u64_member("as.heap.ptr")?;
        if pointer == 0 && length > 0 {
            return Err(InspectError::corrupt(
                object.address(),
                "null buffer for non-empty string",
            ));
        }
        let bytes = if preview == 0 {
            Vec::new()
        } else {
            inspector.backend().read_memory(pointer, preview)?
        };
        (Some(pointer), bytes)
    };

    Ok(StringView {
        object,
        length,
        embedded,
        pointer,
        bytes,
    })
}

/// Escape bytes for display inside double quotes.
///
/// Valid UTF-8 is kept as text; anything else is shown byte by byte.
pub fn escape_bytes(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.chars().map(escape_char).collect(),
        Err(_) => bytes
            .iter()
            .map(|&b| {
                if b.is_ascii() {
                    escape_char(b as char)
                } else {
                    format!("\\x{:02X}", b)
                }
            })
            .collect(),
    }
}

fn escape_char(c: char) -> String {
    match c {
        '"' => "\\\"".to_string(),
        '\\' => "\\\\".to_string(),
        '\n' => "\\n".to_string(),
        '\t' => "\\t".to_string(),
        '\r' => "\\r".to_string(),
        '\0' => "\\0".to_string(),
        '\x1b' => "\\e".to_string(),
        c if c.is_control() => format!("\\x{:02X}", c as u32),
        c => c.to_string(),
    }
}
