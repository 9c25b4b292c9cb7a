//! Memory and expression backend interface
//!
//! This module defines the `Backend` trait that isolates the inspector from
//! the debugger (or memory image) it reads from. A backend only has to
//! evaluate expressions, read raw bytes and name types; every typed operation
//! (cast, dereference, member access, pointer arithmetic) is provided here on
//! top of those three, so all backends agree on their semantics.
//!
//! # Architecture
//!
//! ```text
//! expression ─▶ [Backend::evaluate] ─▶ TargetValue ─▶ TaggedValue ─▶ classify
//!                                           ▲
//!                     value_at / dereference / field_access
//! ```
//!
//! Values handed out by a backend are owned copies of target bytes. They never
//! borrow backend buffers, so a later read can't invalidate them.

use crate::error::{EvalError, MemoryError};
use crate::types::{TypeHandle, TypeKind, WORD_SIZE};
use crate::value::TaggedValue;

// ═══════════════════════════════════════════════════════════════════════
// TARGET VALUES
// ═══════════════════════════════════════════════════════════════════════

/// A typed copy of target memory.
#[derive(Debug, Clone)]
pub struct TargetValue {
    ty: TypeHandle,
    bytes: Vec<u8>,
    address: Option<u64>,
}

impl TargetValue {
    /// Create a value from bytes, optionally remembering where they came from.
    pub fn new(ty: TypeHandle, bytes: Vec<u8>, address: Option<u64>) -> Self {
        Self { ty, bytes, address }
    }

    /// Create a register-like scalar (no address) holding `bits`.
    pub fn scalar(ty: TypeHandle, bits: u64) -> Self {
        let size = ty.size.min(WORD_SIZE);
        let bytes = bits.to_le_bytes()[..size].to_vec();
        Self {
            ty,
            bytes,
            address: None,
        }
    }

    /// The value's type.
    pub fn ty(&self) -> &TypeHandle {
        &self.ty
    }

    /// Raw bytes of the value.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Where the value was read from, if anywhere.
    pub fn address(&self) -> Option<u64> {
        self.address
    }

    /// Interpret the value as an unsigned word, zero-extended.
    pub fn as_u64(&self) -> u64 {
        let mut word = [0u8; 8];
        let n = self.bytes.len().min(8);
        word[..n].copy_from_slice(&self.bytes[..n]);
        u64::from_le_bytes(word)
    }

    /// Interpret the value as a signed word, sign-extended from its size.
    pub fn as_i64(&self) -> i64 {
        let n = self.bytes.len().min(8);
        if n == 0 {
            return 0;
        }
        let shift = 64 - 8 * n as u32;
        ((self.as_u64() << shift) as i64) >> shift
    }

    /// Interpret the value as a double.
    pub fn as_f64(&self) -> f64 {
        if self.bytes.len() == 4 {
            f32::from_bits(self.as_u64() as u32) as f64
        } else {
            f64::from_bits(self.as_u64())
        }
    }

    /// Reinterpret the value as a runtime tagged word.
    pub fn as_tagged(&self) -> Result<TaggedValue, EvalError> {
        if !self.ty.is_scalar() {
            return Err(EvalError::NotScalar {
                type_name: self.ty.name.clone(),
            });
        }
        Ok(TaggedValue::new(self.as_u64()))
    }

    /// Extract a struct member from the bytes already read.
    ///
    /// No memory is touched, so every member of one struct value is
    /// consistent with every other.
    pub fn member(&self, name: &str) -> Result<TargetValue, EvalError> {
        let field = self.ty.field(name)?;
        let start = field.offset;
        let end = start + field.ty.size;
        let bytes = self
            .bytes
            .get(start..end)
            .ok_or_else(|| EvalError::UnknownField {
                type_name: self.ty.name.clone(),
                field: name.to_string(),
            })?
            .to_vec();
        Ok(TargetValue {
            ty: field.ty.clone(),
            bytes,
            address: self.address.map(|a| a + start as u64),
        })
    }

    /// Shorthand for `member(name)?.as_u64()`.
    pub fn u64_member(&self, name: &str) -> Result<u64, EvalError> {
        Ok(self.member(name)?.as_u64())
    }

    /// Shorthand for `member(name)?.as_i64()`.
    pub fn i64_member(&self, name: &str) -> Result<i64, EvalError> {
        Ok(self.member(name)?.as_i64())
    }
}

/// How to reach into a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field<'a> {
    /// Struct member by name
    Name(&'a str),

    /// Pointer element by index
    Index(i64),
}

// ═══════════════════════════════════════════════════════════════════════
// BACKEND TRAIT
// ═══════════════════════════════════════════════════════════════════════

/// Debugger-independent access to a target process.
///
/// All operations are synchronous and any of them may fail: the target's
/// memory can be unmapped, swapped out, or mid-mutation.
///
/// # Example Implementation
///
/// ```rust,ignore
/// use rbscope::backend::{Backend, TargetValue};
/// use rbscope::error::{EvalError, MemoryError};
/// use rbscope::types::{TypeHandle, TypeRegistry};
///
/// struct CoreFile { registry: TypeRegistry, /* ... */ }
///
/// impl Backend for CoreFile {
///     fn evaluate(&self, expression: &str) -> Result<TargetValue, EvalError> {
///         // resolve symbols, registers, ...
///     }
///
///     fn read_memory(&self, address: u64, size: usize) -> Result<Vec<u8>, MemoryError> {
///         // look the range up in the core's PT_LOAD segments
///     }
///
///     fn lookup_type(&self, name: &str) -> Result<TypeHandle, EvalError> {
///         self.registry.lookup(name)
///     }
/// }
/// ```
pub trait Backend {
    /// Evaluate an expression in the target's current context.
    fn evaluate(&self, expression: &str) -> Result<TargetValue, EvalError>;

    /// Read `size` bytes of target memory at `address`.
    fn read_memory(&self, address: u64, size: usize) -> Result<Vec<u8>, MemoryError>;

    /// Look up a type by its C spelling (`struct RString`, `VALUE *`).
    fn lookup_type(&self, name: &str) -> Result<TypeHandle, EvalError>;

    /// Value of a compiled-in constant or enum member, if the target defines it.
    fn lookup_constant(&self, _name: &str) -> Result<Option<i64>, EvalError> {
        Ok(None)
    }

    /// Identity of the loaded binary. Cached type constants are dropped when
    /// this changes.
    fn binary_id(&self) -> u64 {
        0
    }

    /// Read a NUL-terminated string of at most `max_length` bytes.
    ///
    /// Returns the bytes (without the terminator) and their length. Reading
    /// stops early at an unreadable page once some bytes were read.
    fn read_cstring(&self, address: u64, max_length: usize) -> Result<(Vec<u8>, usize), MemoryError> {
        const CHUNK: usize = 64;
        let mut buffer = Vec::new();
        while buffer.len() < max_length {
            let Some(at) = address.checked_add(buffer.len() as u64) else {
                break;
            };
            let mut want = CHUNK.min(max_length - buffer.len());
            // Shrink the read until it fits below the next unmapped byte.
            let chunk = loop {
                match self.read_memory(at, want) {
                    Ok(chunk) => break Some(chunk),
                    Err(e) if want == 1 && buffer.is_empty() => return Err(e),
                    Err(_) if want == 1 => break None,
                    Err(_) => want /= 2,
                }
            };
            let Some(chunk) = chunk else { break };
            if let Some(nul) = chunk.iter().position(|&b| b == 0) {
                buffer.extend_from_slice(&chunk[..nul]);
                let len = buffer.len();
                return Ok((buffer, len));
            }
            buffer.extend_from_slice(&chunk);
        }
        buffer.truncate(max_length);
        let len = buffer.len();
        Ok((buffer, len))
    }

    /// Construct a typed value by reading `ty.size` bytes at `address`.
    fn value_at(&self, address: u64, ty: &TypeHandle) -> Result<TargetValue, MemoryError> {
        let bytes = self.read_memory(address, ty.size)?;
        Ok(TargetValue::new(ty.clone(), bytes, Some(address)))
    }

    /// Reinterpret a value at another type.
    ///
    /// Scalars are resized to the new type. Casting to a struct reads the
    /// struct at the value's address.
    fn cast(&self, value: &TargetValue, ty: &TypeHandle) -> Result<TargetValue, EvalError> {
        if let TypeKind::Struct { .. } = ty.kind {
            let address = self.address_of(value)?;
            return Ok(self.value_at(address, ty)?);
        }
        let bits = if value.ty().is_signed() {
            value.as_i64() as u64
        } else {
            value.as_u64()
        };
        Ok(TargetValue::scalar(ty.clone(), bits))
    }

    /// Follow a pointer.
    fn dereference(&self, value: &TargetValue) -> Result<TargetValue, EvalError> {
        let target = value.ty().pointee().ok_or_else(|| EvalError::NotPointer {
            type_name: value.ty().name.clone(),
        })?;
        Ok(self.value_at(value.as_u64(), target)?)
    }

    /// Access a struct member or pointer element.
    ///
    /// Member access goes through one level of pointer, like `p->field`.
    fn field_access(&self, value: &TargetValue, field: Field<'_>) -> Result<TargetValue, EvalError> {
        match field {
            Field::Name(name) => {
                if value.ty().is_pointer() {
                    self.dereference(value)?.member(name)
                } else {
                    value.member(name)
                }
            }
            Field::Index(index) => {
                let element = self.offset_pointer(value, index)?;
                self.dereference(&element)
            }
        }
    }

    /// Address the value was read from.
    fn address_of(&self, value: &TargetValue) -> Result<u64, EvalError> {
        value.address().ok_or_else(|| EvalError::NotAddressable {
            type_name: value.ty().name.clone(),
        })
    }

    /// Byte offset of a member within a named type.
    fn offset_of(&self, type_name: &str, field: &str) -> Result<usize, EvalError> {
        Ok(self.lookup_type(type_name)?.field(field)?.offset)
    }

    /// Advance a pointer by `count` elements of its pointee type.
    fn offset_pointer(&self, value: &TargetValue, count: i64) -> Result<TargetValue, EvalError> {
        let target = value.ty().pointee().ok_or_else(|| EvalError::NotPointer {
            type_name: value.ty().name.clone(),
        })?;
        let delta = count.wrapping_mul(target.size as i64);
        let address = value.as_u64().wrapping_add(delta as u64);
        Ok(TargetValue::scalar(value.ty().clone(), address))
    }
}
