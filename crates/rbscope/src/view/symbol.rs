//! Dynamic `T_SYMBOL` decoder
//!
//! Static symbols are immediates and only carry an ID. Dynamic ones are heap
//! objects that also point at their name string through `fstr`.

use tracing::debug;

use crate::classify::{Classification, HeapObject};
use crate::constants::ValueType;
use crate::error::Result;
use crate::value::TaggedValue;

use super::string::{self, escape_bytes};
use super::{DecodedView, Inspector};

/// A decoded dynamic symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolView {
    /// The classified object, header from the struct read
    pub object: HeapObject,

    /// Interned ID
    pub id: u64,

    /// Name string object
    pub fstr: TaggedValue,

    /// Name bytes, when `fstr` could be read as a string
    pub name: Option<Vec<u8>>,
}

impl SymbolView {
    /// `:name`, or the ID when the name is unavailable.
    pub fn summary(&self) -> String {
        match &self.name {
            Some(name) => format!(":{}", escape_bytes(name)),
            None => format!("id=0x{:x}", self.id),
        }
    }

    /// Layout details.
    pub fn debug_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("id", format!("0x{:x}", self.id)),
            ("fstr", self.fstr.to_string()),
        ]
    }
}

/// Decode a `struct RSymbol`.
pub fn decode(inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    let (rsymbol, object) = inspector.read_struct(object, "struct RSymbol")?;
    let id = rsymbol.u64_member("id")?;
    let fstr = TaggedValue::new(rsymbol.u64_member("fstr")?);

    let name = match read_name(inspector, fstr) {
        Ok(name) => name,
        Err(e) => {
            debug!(address = object.address(), error = %e, "symbol name unreadable");
            None
        }
    };

    Ok(DecodedView::Symbol(SymbolView {
        object,
        id,
        fstr,
        name,
    }))
}

fn read_name(inspector: &Inspector<'_>, fstr: TaggedValue) -> Result<Option<Vec<u8>>> {
    match inspector.classify(fstr)? {
        Classification::Heap(object) if object.value_type == Some(ValueType::String) => {
            let view = string::read(inspector, object)?;
            Ok(Some(view.bytes))
        }
        _ => Ok(None),
    }
}
