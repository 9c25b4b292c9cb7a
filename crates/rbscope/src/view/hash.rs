//! `T_HASH` decoder
//!
//! The entry table is allocated in the same slot, right after
//! `struct RHash`. Small hashes use an `ar_table` (up to eight pairs, size
//! and used-slot bound kept in the flags); larger ones set
//! `RHASH_ST_TABLE_FLAG` and use an `st_table` whose live entries lie in
//! `[entries_start, entries_bound)`. In both, a key of `Qundef` marks a
//! deleted slot.

use std::fmt;

use tracing::trace;

use crate::backend::TargetValue;
use crate::classify::HeapObject;
use crate::constants::Constant;
use crate::error::{InspectError, Result};
use crate::value::TaggedValue;

use super::{word_at, Child, DecodedView, Inspector};

/// Which table layout a hash uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashTable {
    /// Inline array of pairs
    Ar,
    /// Open-addressing table with an ordered entry array
    St,
}

impl fmt::Display for HashTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HashTable::Ar => write!(f, "ar_table"),
            HashTable::St => write!(f, "st_table"),
        }
    }
}

/// A decoded hash.
#[derive(Debug, Clone, PartialEq)]
pub struct HashView {
    /// The classified object, header from the struct read
    pub object: HeapObject,

    /// Live entry count
    pub size: usize,

    /// Table layout
    pub table: HashTable,

    /// Address of the table
    pub table_address: u64,

    /// Default value
    pub ifnone: TaggedValue,

    /// Leading live pairs in insertion order, at most the element limit
    pub pairs: Vec<(TaggedValue, TaggedValue)>,
}

impl HashView {
    /// Entry count.
    pub fn summary(&self) -> String {
        format!("size={}", self.size)
    }

    /// Layout details.
    pub fn debug_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            ("table", format!("{}@0x{:x}", self.table, self.table_address)),
            ("ifnone", self.ifnone.to_string()),
        ]
    }

    /// Keys and values, each pair labelled by its position.
    pub fn children(&self) -> Vec<Child> {
        self.pairs
            .iter()
            .enumerate()
            .flat_map(|(i, (key, value))| {
                [
                    Child::new(format!("[{}] key", i), *key),
                    Child::new(format!("[{}] value", i), *value),
                ]
            })
            .collect()
    }

    /// Pairs not read.
    pub fn omitted(&self) -> usize {
        self.size.saturating_sub(self.pairs.len())
    }
}

/// Decode a `struct RHash` and its entry table.
///
/// The header, `ifnone` and the table inside the slot come from one read;
/// only an `st_table`'s entry array lives elsewhere.
pub fn decode(inspector: &Inspector<'_>, object: HeapObject) -> Result<DecodedView> {
    let backend = inspector.backend();
    let rhash_size = backend.lookup_type("struct RHash")?.size;
    let st_ty = backend.lookup_type("st_table")?;
    let ar = ArLayout::new(inspector)?;

    let inline_extent = |flags: u64| -> Result<usize> {
        if inspector.flag(flags, Constant::HashStTableFlag) {
            Ok(rhash_size + st_ty.size)
        } else {
            let (_, bound) = ar.size_and_bound(inspector, object.address(), flags)?;
            Ok(rhash_size + ar.pairs_offset + bound * ar.pair_size)
        }
    };

    let read = inspector.read_object(
        object,
        "struct RHash",
        inline_extent(object.header.flags)?,
        |_, header| inline_extent(header.flags),
    )?;
    let object = read.object;
    let ifnone = TaggedValue::new(read.value.u64_member("ifnone")?);
    let table_address = read.address_at(rhash_size)?;

    let (table, size, pairs) = if inspector.flag(object.header.flags, Constant::HashStTableFlag) {
        let st = TargetValue::new(
            st_ty.clone(),
            read.inline(rhash_size, st_ty.size)?.to_vec(),
            Some(table_address),
        );
        let (size, pairs) = read_st_entries(inspector, &object, &st)?;
        (HashTable::St, size, pairs)
    } else {
        let (size, bound) = ar.size_and_bound(inspector, object.address(), object.header.flags)?;
        let bytes = read.inline(rhash_size + ar.pairs_offset, bound * ar.pair_size)?;
        let pairs = live_pairs(
            inspector,
            bytes,
            ar.pair_size,
            ar.key_offset,
            ar.value_offset,
            inspector.element_limit(),
        );
        (HashTable::Ar, size, pairs)
    };
    trace!(%table, size, read = pairs.len(), "decoded hash entries");

    Ok(DecodedView::Hash(HashView {
        object,
        size,
        table,
        table_address,
        ifnone,
        pairs,
    }))
}

type Pairs = Vec<(TaggedValue, TaggedValue)>;

/// Shape of an `ar_table`.
struct ArLayout {
    pairs_offset: usize,
    pair_size: usize,
    key_offset: usize,
    value_offset: usize,
    capacity: usize,
}

impl ArLayout {
    fn new(inspector: &Inspector<'_>) -> Result<Self> {
        let backend = inspector.backend();
        let table_ty = backend.lookup_type("ar_table")?;
        let pair_ty = backend.lookup_type("ar_table_pair")?;
        let pairs_offset = table_ty.field("pairs")?.offset;
        Ok(Self {
            pairs_offset,
            pair_size: pair_ty.size,
            key_offset: pair_ty.field("key")?.offset,
            value_offset: pair_ty.field("val")?.offset,
            capacity: (table_ty.size - pairs_offset) / pair_ty.size,
        })
    }

    /// Live-entry count and used-slot bound from the flags, checked against
    /// the table's capacity.
    fn size_and_bound(
        &self,
        inspector: &Inspector<'_>,
        address: u64,
        flags: u64,
    ) -> Result<(usize, usize)> {
        let constants = inspector.constants();
        let size = constants.field_bits(flags, Constant::HashArSizeMask, Constant::HashArSizeShift)
            as usize;
        let bound = constants
            .field_bits(flags, Constant::HashArBoundMask, Constant::HashArBoundShift)
            as usize;
        if size > bound || bound > self.capacity {
            return Err(InspectError::corrupt(
                address,
                format!(
                    "ar_table size {} with bound {} (capacity {})",
                    size, bound, self.capacity
                ),
            ));
        }
        Ok((size, bound))
    }
}

fn read_st_entries(
    inspector: &Inspector<'_>,
    object: &HeapObject,
    st: &TargetValue,
) -> Result<(usize, Pairs)> {
    let backend = inspector.backend();
    let size = st.u64_member("num_entries")?;
    let start = st.u64_member("entries_start")?;
    let bound = st.u64_member("entries_bound")?;
    let entry_power = st.u64_member("entry_power")?;
    let entries = st.u64_member("entries")?;

    let plausible = start <= bound
        && entry_power < 48
        && bound - start <= 1u64 << entry_power
        && size <= bound - start
        && (entries != 0 || size == 0);
    if !plausible {
        return Err(InspectError::corrupt(
            object.address(),
            format!(
                "st_table with {} entries in [{}, {}) of 2^{}",
                size, start, bound, entry_power
            ),
        ));
    }

    let entry_ty = backend.lookup_type("st_table_entry")?;
    let key_offset = entry_ty.field("key")?.offset;
    let record_offset = entry_ty.field("record")?.offset;
    let stride = entry_ty.size as u64;
    let limit = inspector.element_limit();

    // Deleted slots don't count towards the limit, so scan in batches.
    let mut pairs = Vec::new();
    let mut index = start;
    while index < bound && pairs.len() < limit {
        let count = ((bound - index) as usize).min(limit);
        let address = index
            .checked_mul(stride)
            .and_then(|offset| entries.checked_add(offset))
            .ok_or_else(|| {
                InspectError::corrupt(
                    object.address(),
                    format!(
                        "st_table entry {} at 0x{:x} is past the end of the address space",
                        index, entries
                    ),
                )
            })?;
        let bytes = backend.read_memory(address, count * entry_ty.size)?;
        pairs.extend(live_pairs(
            inspector,
            &bytes,
            entry_ty.size,
            key_offset,
            record_offset,
            limit - pairs.len(),
        ));
        index += count as u64;
    }
    Ok((size as usize, pairs))
}

/// Non-deleted `(key, value)` pairs from a packed entry array.
fn live_pairs(
    inspector: &Inspector<'_>,
    bytes: &[u8],
    stride: usize,
    key_offset: usize,
    value_offset: usize,
    limit: usize,
) -> Pairs {
    let undef = inspector.constants().get(Constant::Qundef);
    bytes
        .chunks_exact(stride)
        .map(|entry| (word_at(entry, key_offset), word_at(entry, value_offset)))
        .filter(|(key, _)| *key != undef)
        .take(limit)
        .map(|(key, value)| (TaggedValue::new(key), TaggedValue::new(value)))
        .collect()
}
