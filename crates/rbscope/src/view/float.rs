//! Heap `T_FLOAT` decoder

use crate::classify::HeapObject;
use crate::error::Result;
use crate::value::format_float;

use super::{DecodedView, Inspector};

/// A float too wide for the flonum encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct FloatView {
    /// The classified object, header from the struct read
    pub object: HeapObject,

    /// The boxed double
    pub value: f64,
}

impl FloatView {
    /// The value as `Float#inspect` would show it.
    pub fn summary(&self) -> String {
        format_float(self.value)
    }
}

/// Decode a `struct RFloat`.
pub fn decode(inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    let (rfloat, object) = inspector.read_struct(object, "struct RFloat")?;
    let value = rfloat.member("float_value")?.as_f64();
    Ok(DecodedView::Float(FloatView { object, value }))
}
