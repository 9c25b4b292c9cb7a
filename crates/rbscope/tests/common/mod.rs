//! Shared heap-image builders for integration tests

#![allow(dead_code)]

use std::cell::Cell;
use std::rc::Rc;

use rbscope::backends::{HeapSnapshot, SnapshotBackend, SnapshotBuilder};
use rbscope::types::TypeHandle;
use rbscope::*;

pub const QNIL: u64 = 0x04;
pub const QTRUE: u64 = 0x14;
pub const QUNDEF: u64 = 0x24;

pub const T_OBJECT: u64 = 0x01;
pub const T_FLOAT: u64 = 0x04;
pub const T_STRING: u64 = 0x05;
pub const T_ARRAY: u64 = 0x07;
pub const T_HASH: u64 = 0x08;
pub const T_STRUCT: u64 = 0x09;
pub const T_BIGNUM: u64 = 0x0a;
pub const T_SYMBOL: u64 = 0x14;

const FL_USER1: u64 = 1 << 13;
const FL_USER2: u64 = 1 << 14;
const FL_USER3: u64 = 1 << 15;

/// Encode a fixnum.
pub fn fix(n: i64) -> u64 {
    ((n << 1) | 1) as u64
}

fn le_bytes(words: &[u64]) -> Vec<u8> {
    words.iter().flat_map(|w| w.to_le_bytes()).collect()
}

fn padded(mut words: Vec<u64>, len: usize) -> Vec<u64> {
    if words.len() < len {
        words.resize(len, 0);
    }
    words
}

/// Lays out runtime objects in a snapshot the way the 64-bit runtime does.
pub struct Heap {
    builder: SnapshotBuilder,
}

impl Heap {
    pub fn new() -> Self {
        Self {
            builder: SnapshotBuilder::new().build_id("ruby-3.3-test"),
        }
    }

    pub fn with_builder(builder: SnapshotBuilder) -> Self {
        Self { builder }
    }

    /// Bind `$name` (and `name`) to a VALUE.
    pub fn var(mut self, name: &str, value: u64) -> Self {
        self.builder = self.builder.symbol(name, value);
        self
    }

    pub fn words(mut self, address: u64, words: &[u64]) -> Self {
        self.builder = self.builder.words(address, words);
        self
    }

    pub fn bytes(mut self, address: u64, bytes: &[u8]) -> Self {
        self.builder = self.builder.bytes(address, bytes);
        self
    }

    /// A plain object with only an `RBasic` header.
    pub fn object(self, address: u64, tag: u64) -> Self {
        self.words(address, &[tag, 0])
    }

    /// Embedded string: bytes live inside the object from offset 24.
    pub fn string(mut self, address: u64, text: &str) -> Self {
        let mut bytes = le_bytes(&[T_STRING, 0, text.len() as u64]);
        bytes.extend_from_slice(text.as_bytes());
        bytes.resize(bytes.len().max(40), 0);
        self.builder = self.builder.bytes(address, &bytes);
        self
    }

    /// Heap string with its buffer at `buffer`.
    pub fn heap_string(mut self, address: u64, buffer: u64, text: &str) -> Self {
        let len = text.len() as u64;
        self.builder = self
            .builder
            .words(address, &[T_STRING | FL_USER1, 0, len, buffer, len])
            .text(buffer, text);
        self
    }

    /// Embedded array; elements start at offset 16.
    pub fn array(self, address: u64, elements: &[u64]) -> Self {
        let flags = T_ARRAY | FL_USER1 | ((elements.len() as u64) << 15);
        let mut words = vec![flags, 0];
        words.extend_from_slice(elements);
        self.words(address, &padded(words, 5))
    }

    /// Heap array with its element table at `buffer`.
    pub fn heap_array(self, address: u64, buffer: u64, elements: &[u64]) -> Self {
        self.words(address, &[T_ARRAY, 0, elements.len() as u64, 0, buffer])
            .words(buffer, elements)
    }

    /// Hash backed by an `ar_table` right after the object.
    ///
    /// `slots` are the used pairs in order; a key of `QUNDEF` is a deleted
    /// entry, counted in the bound but not the size.
    pub fn ar_hash(self, address: u64, slots: &[(u64, u64)]) -> Self {
        let bound = slots.len() as u64;
        let size = slots.iter().filter(|(key, _)| *key != QUNDEF).count() as u64;
        let flags = T_HASH | (size << 16) | (bound << 20);
        let mut words = vec![flags, 0, QNIL, 0];
        for (key, value) in slots {
            words.push(*key);
            words.push(*value);
        }
        self.words(address, &padded(words, 3 + 17))
    }

    /// Hash backed by an `st_table` with entries at `entries`.
    pub fn st_hash(self, address: u64, entries: u64, slots: &[(u64, u64)]) -> Self {
        let bound = slots.len() as u64;
        let size = slots.iter().filter(|(key, _)| *key != QUNDEF).count() as u64;
        let entry_power = 64 - bound.max(1).leading_zeros() as u64;
        let table = [entry_power, 0, size, 0, 0, bound, entries];
        let mut words = vec![T_HASH | FL_USER3, 0, QNIL];
        words.extend_from_slice(&table);
        let mut entry_words = Vec::new();
        for (i, (key, value)) in slots.iter().enumerate() {
            entry_words.extend_from_slice(&[i as u64, *key, *value]);
        }
        self.words(address, &words).words(entries, &entry_words)
    }

    /// Embedded struct; members start at offset 16.
    pub fn rstruct(self, address: u64, members: &[u64]) -> Self {
        let flags = T_STRUCT | ((members.len() as u64) << 13);
        let mut words = vec![flags, 0];
        words.extend_from_slice(members);
        self.words(address, &padded(words, 5))
    }

    pub fn float(self, address: u64, value: f64) -> Self {
        self.words(address, &[T_FLOAT, 0, value.to_bits()])
    }

    /// Embedded bignum with little-endian limbs.
    pub fn bignum(self, address: u64, negative: bool, limbs: &[u64]) -> Self {
        let sign = if negative { 0 } else { FL_USER1 };
        let flags = T_BIGNUM | sign | FL_USER2 | ((limbs.len() as u64) << 15);
        let mut words = vec![flags, 0];
        words.extend_from_slice(limbs);
        self.words(address, &padded(words, 5))
    }

    /// Heap bignum with its digits at `digits`.
    pub fn heap_bignum(self, address: u64, digits: u64, negative: bool, limbs: &[u64]) -> Self {
        let sign = if negative { 0 } else { FL_USER1 };
        self.words(address, &[T_BIGNUM | sign, 0, limbs.len() as u64, digits, 0])
            .words(digits, limbs)
    }

    pub fn symbol(self, address: u64, id: u64, fstr: u64) -> Self {
        self.words(address, &[T_SYMBOL, 0, 0, fstr, id])
    }

    pub fn constant(mut self, name: &str, value: i64) -> Self {
        self.builder = self.builder.constant(name, value);
        self
    }

    pub fn build(self) -> HeapSnapshot {
        self.builder.build()
    }

    pub fn backend(self) -> SnapshotBackend {
        SnapshotBackend::new(self.build()).unwrap()
    }
}

/// Wraps a backend and counts evaluations and memory reads.
///
/// The counters are shared so they can be watched after the backend has
/// been boxed into a session.
pub struct CountingBackend<B> {
    pub inner: B,
    pub reads: Rc<Cell<usize>>,
    pub evaluations: Rc<Cell<usize>>,
}

impl<B: Backend> CountingBackend<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            reads: Rc::new(Cell::new(0)),
            evaluations: Rc::new(Cell::new(0)),
        }
    }
}

impl<B: Backend> Backend for CountingBackend<B> {
    fn evaluate(&self, expression: &str) -> std::result::Result<TargetValue, EvalError> {
        self.evaluations.set(self.evaluations.get() + 1);
        self.inner.evaluate(expression)
    }

    fn read_memory(&self, address: u64, size: usize) -> std::result::Result<Vec<u8>, MemoryError> {
        self.reads.set(self.reads.get() + 1);
        self.inner.read_memory(address, size)
    }

    fn lookup_type(&self, name: &str) -> std::result::Result<TypeHandle, EvalError> {
        self.inner.lookup_type(name)
    }

    fn lookup_constant(&self, name: &str) -> std::result::Result<Option<i64>, EvalError> {
        self.inner.lookup_constant(name)
    }

    fn binary_id(&self) -> u64 {
        self.inner.binary_id()
    }
}

/// Decode one value with default constants.
pub fn interpret(backend: &dyn Backend, bits: u64) -> rbscope::Result<DecodedView> {
    let constants = RuntimeConstants::default();
    Inspector::new(backend, &constants).interpret(TaggedValue::new(bits))
}

/// Print one value into a string.
pub fn render(backend: &dyn Backend, bits: u64, options: &InspectOptions) -> String {
    let constants = RuntimeConstants::default();
    let inspector = Inspector::new(backend, &constants).with_element_limit(options.element_limit);
    let context = PrintContext::new(options).unwrap();
    let mut out = Vec::new();
    Printer::new(inspector, context, &mut out)
        .print_value(TaggedValue::new(bits))
        .unwrap();
    String::from_utf8(out).unwrap()
}
