//! Header-only fallback view

use crate::classify::HeapObject;
use crate::error::Result;

use super::{DecodedView, Inspector};

/// Any heap object, described only by its header.
#[derive(Debug, Clone, PartialEq)]
pub struct BasicView {
    /// The classified object
    pub object: HeapObject,
}

impl BasicView {
    /// Wrap a classified object. Never reads memory.
    pub fn new(object: HeapObject) -> Self {
        Self { object }
    }

    /// Always empty; the type name says all there is to say.
    pub fn summary(&self) -> String {
        String::new()
    }
}

/// Decoder entry for tags without a specialized layout.
pub fn decode(_inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    Ok(DecodedView::Basic(BasicView::new(object)))
}
