//! Heap snapshot backend
//!
//! A snapshot is a JSON image of the parts of a target's address space that
//! matter for one inspection, plus the symbols and constants a debugger
//! would have supplied:
//!
//! ```json
//! {
//!   "build_id": "ruby-3.3.0-x86_64",
//!   "constants": { "RUBY_T_MASK": 31 },
//!   "symbols": { "$ary": { "value": 4096 } },
//!   "regions": [
//!     { "address": 4096, "words": [8199, 0, 3, 5, 7] },
//!     { "address": 8192, "text": "hello" }
//!   ]
//! }
//! ```
//!
//! A region's contents are its `words` (little-endian), then its `bytes`,
//! then its `text`. Reads may cross adjacent regions; any gap fails.

use std::collections::hash_map::DefaultHasher;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::path::Path;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::backend::{Backend, TargetValue};
use crate::error::{EvalError, InspectError, MemoryError, Result};
use crate::types::{TypeHandle, TypeRegistry};

use super::expr;

fn default_symbol_type() -> String {
    "VALUE".to_string()
}

/// A named value in the snapshot.
///
/// With `address`, the symbol names the object of type `type` stored there
/// (like a global variable); otherwise it is the literal `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolDef {
    /// Literal value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<u64>,

    /// Location of the variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<u64>,

    /// Type spelling
    #[serde(rename = "type", default = "default_symbol_type")]
    pub ty: String,
}

/// A contiguous block of target memory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    /// First address
    pub address: u64,

    /// Little-endian machine words
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub words: Vec<u64>,

    /// Raw bytes, after the words
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bytes: Vec<u8>,

    /// UTF-8 text, after the bytes
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl Region {
    /// The region's contents.
    pub fn data(&self) -> Vec<u8> {
        let mut data: Vec<u8> = self.words.iter().flat_map(|w| w.to_le_bytes()).collect();
        data.extend_from_slice(&self.bytes);
        data.extend_from_slice(self.text.as_bytes());
        data
    }
}

/// Serialized heap image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeapSnapshot {
    /// Identity of the binary the image was taken from
    #[serde(default)]
    pub build_id: String,

    /// Compiled constants that differ from the defaults
    #[serde(default)]
    pub constants: IndexMap<String, i64>,

    /// Symbols and convenience variables
    #[serde(default)]
    pub symbols: IndexMap<String, SymbolDef>,

    /// Memory contents
    #[serde(default)]
    pub regions: Vec<Region>,
}

impl HeapSnapshot {
    /// Parse a snapshot from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| InspectError::Snapshot(e.to_string()))
    }

    /// Load a snapshot file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Serialize to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| InspectError::Snapshot(e.to_string()))
    }

    /// Write the snapshot to a file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

/// Builds a [`HeapSnapshot`] programmatically.
#[derive(Debug, Default)]
pub struct SnapshotBuilder {
    snapshot: HeapSnapshot,
}

impl SnapshotBuilder {
    /// Start an empty image.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the build identity (builder pattern)
    pub fn build_id(mut self, id: impl Into<String>) -> Self {
        self.snapshot.build_id = id.into();
        self
    }

    /// Override a compiled constant (builder pattern)
    pub fn constant(mut self, name: impl Into<String>, value: i64) -> Self {
        self.snapshot.constants.insert(name.into(), value);
        self
    }

    /// Define a `VALUE` symbol (builder pattern)
    pub fn symbol(self, name: impl Into<String>, value: u64) -> Self {
        self.typed_symbol(name, value, "VALUE")
    }

    /// Define a symbol with a literal value of some type (builder pattern)
    pub fn typed_symbol(mut self, name: impl Into<String>, value: u64, ty: &str) -> Self {
        self.snapshot.symbols.insert(
            name.into(),
            SymbolDef {
                value: Some(value),
                address: None,
                ty: ty.to_string(),
            },
        );
        self
    }

    /// Define a variable stored at an address (builder pattern)
    pub fn variable(mut self, name: impl Into<String>, address: u64, ty: &str) -> Self {
        self.snapshot.symbols.insert(
            name.into(),
            SymbolDef {
                value: None,
                address: Some(address),
                ty: ty.to_string(),
            },
        );
        self
    }

    /// Add a region of words (builder pattern)
    pub fn words(mut self, address: u64, words: &[u64]) -> Self {
        self.snapshot.regions.push(Region {
            address,
            words: words.to_vec(),
            ..Region::default()
        });
        self
    }

    /// Add a region of raw bytes (builder pattern)
    pub fn bytes(mut self, address: u64, bytes: &[u8]) -> Self {
        self.snapshot.regions.push(Region {
            address,
            bytes: bytes.to_vec(),
            ..Region::default()
        });
        self
    }

    /// Add a region of text, without a terminator (builder pattern)
    pub fn text(mut self, address: u64, text: &str) -> Self {
        self.snapshot.regions.push(Region {
            address,
            text: text.to_string(),
            ..Region::default()
        });
        self
    }

    /// Finish the image.
    pub fn build(self) -> HeapSnapshot {
        self.snapshot
    }
}

/// Backend serving reads, symbols and constants from a [`HeapSnapshot`].
#[derive(Debug)]
pub struct SnapshotBackend {
    memory: BTreeMap<u64, Vec<u8>>,
    symbols: IndexMap<String, SymbolDef>,
    constants: IndexMap<String, i64>,
    registry: TypeRegistry,
    binary_id: u64,
}

impl SnapshotBackend {
    /// Index a snapshot. Overlapping regions are rejected.
    pub fn new(snapshot: HeapSnapshot) -> Result<Self> {
        let mut memory: BTreeMap<u64, Vec<u8>> = BTreeMap::new();
        for region in &snapshot.regions {
            let data = region.data();
            let end = region
                .address
                .checked_add(data.len() as u64)
                .ok_or_else(|| {
                    InspectError::Snapshot(format!(
                        "region at 0x{:x} wraps the address space",
                        region.address
                    ))
                })?;
            let overlaps = memory
                .range(..end)
                .next_back()
                .is_some_and(|(start, bytes)| start + bytes.len() as u64 > region.address);
            if overlaps && !data.is_empty() {
                return Err(InspectError::Snapshot(format!(
                    "region at 0x{:x} overlaps another region",
                    region.address
                )));
            }
            if !data.is_empty() {
                memory.insert(region.address, data);
            }
        }

        let mut hasher = DefaultHasher::new();
        snapshot.build_id.hash(&mut hasher);
        let binary_id = hasher.finish();

        debug!(
            build_id = %snapshot.build_id,
            regions = memory.len(),
            symbols = snapshot.symbols.len(),
            "loaded heap snapshot"
        );

        Ok(Self {
            memory,
            symbols: snapshot.symbols,
            constants: snapshot.constants,
            registry: TypeRegistry::ruby(),
            binary_id,
        })
    }

    /// Load and index a snapshot file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::new(HeapSnapshot::load(path)?)
    }

    /// Replace the type layouts (builder pattern)
    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    fn resolve_symbol(&self, name: &str) -> std::result::Result<TargetValue, EvalError> {
        let def = self
            .symbols
            .get(name)
            .or_else(|| name.strip_prefix('$').and_then(|bare| self.symbols.get(bare)))
            .ok_or_else(|| EvalError::UnknownSymbol {
                name: name.to_string(),
            })?;
        let ty = self.registry.lookup(&def.ty)?;
        match (def.address, def.value) {
            (Some(address), _) => Ok(self.value_at(address, &ty)?),
            (None, value) => Ok(TargetValue::scalar(ty, value.unwrap_or(0))),
        }
    }
}

impl Backend for SnapshotBackend {
    fn evaluate(&self, expression: &str) -> std::result::Result<TargetValue, EvalError> {
        let parsed = expr::parse(expression)?;
        expr::evaluate(&parsed, self, &|name| self.resolve_symbol(name))
    }

    fn read_memory(&self, address: u64, size: usize) -> std::result::Result<Vec<u8>, MemoryError> {
        trace!(address, size, "snapshot read");
        let fail = || MemoryError::new(address, size);
        let end = address.checked_add(size as u64).ok_or_else(fail)?;

        let mut buffer = Vec::with_capacity(size);
        let mut at = address;
        while at < end {
            let (start, bytes) = self.memory.range(..=at).next_back().ok_or_else(fail)?;
            let offset = (at - start) as usize;
            if offset >= bytes.len() {
                return Err(fail());
            }
            let take = bytes.len().min(offset + (end - at) as usize);
            buffer.extend_from_slice(&bytes[offset..take]);
            at = start + take as u64;
        }
        Ok(buffer)
    }

    fn lookup_type(&self, name: &str) -> std::result::Result<TypeHandle, EvalError> {
        self.registry.lookup(name)
    }

    fn lookup_constant(&self, name: &str) -> std::result::Result<Option<i64>, EvalError> {
        Ok(self.constants.get(name).copied())
    }

    fn binary_id(&self) -> u64 {
        self.binary_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SnapshotBackend {
        SnapshotBackend::new(
            SnapshotBuilder::new()
                .words(0x1000, &[0x1111, 0x2222])
                .bytes(0x1010, &[1, 2, 3, 4])
                .text(0x2000, "abc")
                .build(),
        )
        .unwrap()
    }

    #[test]
    fn test_read_within_region() {
        let bytes = backend().read_memory(0x1008, 2).unwrap();
        assert_eq!(bytes, vec![0x22, 0x22]);
    }

    #[test]
    fn test_read_across_adjacent_regions() {
        let bytes = backend().read_memory(0x100e, 4).unwrap();
        assert_eq!(bytes, vec![0, 0, 1, 2]);
    }

    #[test]
    fn test_read_gap_fails() {
        let err = backend().read_memory(0x1012, 8).unwrap_err();
        assert_eq!(err, MemoryError::new(0x1012, 8));
        assert!(backend().read_memory(0x0, 1).is_err());
    }

    #[test]
    fn test_overlapping_regions_rejected() {
        let snapshot = SnapshotBuilder::new()
            .words(0x1000, &[1, 2])
            .words(0x1008, &[3])
            .build();
        assert!(matches!(
            SnapshotBackend::new(snapshot),
            Err(InspectError::Snapshot(_))
        ));
    }

    #[test]
    fn test_region_data_order() {
        let region = Region {
            address: 0,
            words: vec![0x41],
            bytes: vec![0x42],
            text: "C".to_string(),
        };
        assert_eq!(region.data(), vec![0x41, 0, 0, 0, 0, 0, 0, 0, 0x42, b'C']);
    }

    #[test]
    fn test_binary_id_follows_build_id() {
        let a = SnapshotBackend::new(SnapshotBuilder::new().build_id("a").build()).unwrap();
        let b = SnapshotBackend::new(SnapshotBuilder::new().build_id("b").build()).unwrap();
        assert_ne!(a.binary_id(), b.binary_id());
    }
}
