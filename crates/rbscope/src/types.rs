//! Target type descriptions
//!
//! Backends answer `lookup_type` from a [`TypeRegistry`]. The registry maps C
//! type names to layouts: scalar sizes, pointer targets, and struct members
//! with their byte offsets. Nested unions are flattened into dotted member
//! names (`as.heap.ptr`), which is all the decoders need.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::error::EvalError;

/// Size of a target machine word and pointer.
pub const WORD_SIZE: usize = 8;

/// The shape of a target type.
#[derive(Debug, Clone)]
pub enum TypeKind {
    /// Integer of `size` bytes
    Integer {
        /// Whether the integer is sign-extended when widened
        signed: bool,
    },

    /// IEEE float of `size` bytes
    Float,

    /// Pointer to another type
    Pointer(TypeHandle),

    /// Struct (or union) with members in declaration order
    Struct {
        /// Members keyed by (possibly dotted) name
        fields: IndexMap<String, FieldDef>,
    },
}

/// A single struct member.
#[derive(Debug, Clone)]
pub struct FieldDef {
    /// Byte offset from the start of the struct
    pub offset: usize,

    /// Member type
    pub ty: TypeHandle,
}

/// Layout of one target type.
#[derive(Debug, Clone)]
pub struct TypeDef {
    /// C spelling of the type (e.g. `struct RString`, `VALUE`)
    pub name: String,

    /// `sizeof` the type in bytes
    pub size: usize,

    /// What kind of type this is
    pub kind: TypeKind,
}

/// Cheap, shareable handle to a [`TypeDef`].
#[derive(Clone)]
pub struct TypeHandle(Arc<TypeDef>);

impl TypeHandle {
    /// Wrap a type definition.
    pub fn new(def: TypeDef) -> Self {
        TypeHandle(Arc::new(def))
    }

    /// Create an integer type.
    pub fn integer(name: impl Into<String>, size: usize, signed: bool) -> Self {
        Self::new(TypeDef {
            name: name.into(),
            size,
            kind: TypeKind::Integer { signed },
        })
    }

    /// Create a floating point type.
    pub fn float(name: impl Into<String>, size: usize) -> Self {
        Self::new(TypeDef {
            name: name.into(),
            size,
            kind: TypeKind::Float,
        })
    }

    /// Pointer type to this type.
    pub fn pointer(&self) -> TypeHandle {
        Self::new(TypeDef {
            name: format!("{} *", self.name),
            size: WORD_SIZE,
            kind: TypeKind::Pointer(self.clone()),
        })
    }

    /// Type this pointer points to, if it is a pointer.
    pub fn pointee(&self) -> Option<&TypeHandle> {
        match &self.kind {
            TypeKind::Pointer(target) => Some(target),
            _ => None,
        }
    }

    /// Look up a struct member.
    pub fn field(&self, name: &str) -> Result<&FieldDef, EvalError> {
        match &self.kind {
            TypeKind::Struct { fields } => fields.get(name),
            _ => None,
        }
        .ok_or_else(|| EvalError::UnknownField {
            type_name: self.name.clone(),
            field: name.to_string(),
        })
    }

    /// Whether values of this type fit in one machine word.
    pub fn is_scalar(&self) -> bool {
        !matches!(self.kind, TypeKind::Struct { .. }) && self.size <= WORD_SIZE
    }

    /// Whether this is a pointer type.
    pub fn is_pointer(&self) -> bool {
        matches!(self.kind, TypeKind::Pointer(_))
    }

    /// Whether integer values of this type are signed.
    pub fn is_signed(&self) -> bool {
        matches!(self.kind, TypeKind::Integer { signed: true })
    }
}

impl Deref for TypeHandle {
    type Target = TypeDef;

    fn deref(&self) -> &TypeDef {
        &self.0
    }
}

impl fmt::Debug for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

impl fmt::Display for TypeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Incrementally builds a struct layout.
#[derive(Debug)]
pub struct StructBuilder {
    name: String,
    size: usize,
    fields: IndexMap<String, FieldDef>,
}

impl StructBuilder {
    /// Start a struct of the given `sizeof`.
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            fields: IndexMap::new(),
        }
    }

    /// Add a member (builder pattern)
    pub fn field(mut self, name: impl Into<String>, offset: usize, ty: &TypeHandle) -> Self {
        self.fields.insert(
            name.into(),
            FieldDef {
                offset,
                ty: ty.clone(),
            },
        );
        self
    }

    /// Add the two `struct RBasic` members every object starts with.
    pub fn basic(self, value: &TypeHandle) -> Self {
        self.field("basic.flags", 0, value).field("basic.klass", 8, value)
    }

    /// Finish the layout.
    pub fn build(self) -> TypeHandle {
        TypeHandle::new(TypeDef {
            name: self.name,
            size: self.size,
            kind: TypeKind::Struct {
                fields: self.fields,
            },
        })
    }
}

/// Named type layouts served by a backend.
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: IndexMap<String, TypeHandle>,
}

impl TypeRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a type under its own name, replacing any previous layout.
    pub fn insert(&mut self, ty: TypeHandle) {
        self.types.insert(ty.name.clone(), ty);
    }

    /// Look up a type by name. A trailing `*` yields the pointer type.
    pub fn lookup(&self, name: &str) -> Result<TypeHandle, EvalError> {
        let name = name.trim();
        if let Some(base) = name.strip_suffix('*') {
            return Ok(self.lookup(base)?.pointer());
        }
        self.types
            .get(name)
            .cloned()
            .ok_or_else(|| EvalError::UnknownType {
                name: name.to_string(),
            })
    }

    /// Number of registered types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Check if the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Layouts of a 64-bit little-endian CRuby 3.3 build.
    pub fn ruby() -> Self {
        let mut registry = Self::new();

        let value = TypeHandle::integer("VALUE", 8, false);
        let id = TypeHandle::integer("ID", 8, false);
        let long = TypeHandle::integer("long", 8, true);
        let size_t = TypeHandle::integer("size_t", 8, false);
        let st_index = TypeHandle::integer("st_index_t", 8, false);
        let uint = TypeHandle::integer("unsigned int", 4, false);
        let uchar = TypeHandle::integer("unsigned char", 1, false);
        let chr = TypeHandle::integer("char", 1, true);
        let bdigit = TypeHandle::integer("BDIGIT", 8, false);
        let double = TypeHandle::float("double", 8);

        for scalar in [
            &value, &id, &long, &size_t, &st_index, &uint, &uchar, &chr, &bdigit, &double,
        ] {
            registry.insert(scalar.clone());
        }

        registry.insert(StructBuilder::new("struct RBasic", 16).basic(&value).build());

        registry.insert(
            StructBuilder::new("struct RString", 40)
                .basic(&value)
                .field("len", 16, &long)
                .field("as.heap.ptr", 24, &chr.pointer())
                .field("as.heap.aux.capa", 32, &long)
                .field("as.heap.aux.shared", 32, &value)
                .field("as.embed.ary", 24, &chr)
                .build(),
        );

        registry.insert(
            StructBuilder::new("struct RArray", 40)
                .basic(&value)
                .field("as.heap.len", 16, &long)
                .field("as.heap.aux.capa", 24, &long)
                .field("as.heap.aux.shared_root", 24, &value)
                .field("as.heap.ptr", 32, &value.pointer())
                .field("as.ary", 16, &value)
                .build(),
        );

        // The hash's table is allocated in the same slot, directly after it.
        registry.insert(
            StructBuilder::new("struct RHash", 24)
                .basic(&value)
                .field("ifnone", 16, &value)
                .build(),
        );

        let st_entry = StructBuilder::new("st_table_entry", 24)
            .field("hash", 0, &st_index)
            .field("key", 8, &value)
            .field("record", 16, &value)
            .build();
        registry.insert(st_entry.clone());

        registry.insert(
            StructBuilder::new("st_table", 56)
                .field("entry_power", 0, &uchar)
                .field("bin_power", 1, &uchar)
                .field("size_ind", 2, &uchar)
                .field("rebuilds_num", 4, &uint)
                .field("type", 8, &value)
                .field("num_entries", 16, &st_index)
                .field("bins", 24, &st_index.pointer())
                .field("entries_start", 32, &st_index)
                .field("entries_bound", 40, &st_index)
                .field("entries", 48, &st_entry.pointer())
                .build(),
        );

        let ar_pair = StructBuilder::new("ar_table_pair", 16)
            .field("key", 0, &value)
            .field("val", 8, &value)
            .build();
        registry.insert(ar_pair.clone());

        registry.insert(
            StructBuilder::new("ar_table", 136)
                .field("ar_hint.word", 0, &value)
                .field("pairs", 8, &ar_pair)
                .build(),
        );

        registry.insert(
            StructBuilder::new("struct RStruct", 40)
                .basic(&value)
                .field("as.heap.len", 16, &long)
                .field("as.heap.ptr", 24, &value.pointer())
                .field("as.ary", 16, &value)
                .build(),
        );

        registry.insert(
            StructBuilder::new("struct RFloat", 24)
                .basic(&value)
                .field("float_value", 16, &double)
                .build(),
        );

        registry.insert(
            StructBuilder::new("struct RBignum", 40)
                .basic(&value)
                .field("as.heap.len", 16, &size_t)
                .field("as.heap.digits", 24, &bdigit.pointer())
                .field("as.ary", 16, &bdigit)
                .build(),
        );

        registry.insert(
            StructBuilder::new("struct RSymbol", 40)
                .basic(&value)
                .field("hashval", 16, &st_index)
                .field("fstr", 24, &value)
                .field("id", 32, &id)
                .build(),
        );

        registry
    }
}
