//! Live process backend (Linux)
//!
//! Reads target memory through `/proc/<pid>/mem` with positioned reads, which
//! needs ptrace access to the target (same user and a permissive
//! `kernel.yama.ptrace_scope`, or root). There is no symbol table: names
//! must be defined up front with [`ProcessBackend::with_symbol`].

use std::collections::hash_map::DefaultHasher;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::os::unix::fs::{FileExt, MetadataExt};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::backend::{Backend, TargetValue};
use crate::error::{EvalError, MemoryError, Result};
use crate::types::{TypeHandle, TypeRegistry};

use super::expr;

/// Backend reading a running process.
#[derive(Debug)]
pub struct ProcessBackend {
    pid: u32,
    mem: File,
    registry: TypeRegistry,
    symbols: IndexMap<String, u64>,
    binary_id: u64,
}

impl ProcessBackend {
    /// Open a process's memory for reading.
    pub fn attach(pid: u32) -> Result<Self> {
        let mem = File::open(format!("/proc/{}/mem", pid))?;
        let binary_id = binary_id_of(pid)?;
        debug!(pid, binary_id, "attached to process");
        Ok(Self {
            pid,
            mem,
            registry: TypeRegistry::ruby(),
            symbols: IndexMap::new(),
            binary_id,
        })
    }

    /// Target process id.
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Define a `VALUE` symbol (builder pattern)
    pub fn with_symbol(mut self, name: impl Into<String>, value: u64) -> Self {
        self.symbols.insert(name.into(), value);
        self
    }

    /// Re-read the executable's identity, e.g. after the target re-exec'd.
    pub fn refresh(&mut self) -> Result<()> {
        self.binary_id = binary_id_of(self.pid)?;
        Ok(())
    }
}

/// Identity of the executable: device, inode and modification time.
fn binary_id_of(pid: u32) -> Result<u64> {
    let metadata = std::fs::metadata(format!("/proc/{}/exe", pid))?;
    let mut hasher = DefaultHasher::new();
    (metadata.dev(), metadata.ino(), metadata.mtime(), metadata.size()).hash(&mut hasher);
    Ok(hasher.finish())
}

impl Backend for ProcessBackend {
    fn evaluate(&self, expression: &str) -> std::result::Result<TargetValue, EvalError> {
        let parsed = expr::parse(expression)?;
        expr::evaluate(&parsed, self, &|name| {
            let bare = name.strip_prefix('$').unwrap_or(name);
            let value = self
                .symbols
                .get(name)
                .or_else(|| self.symbols.get(bare))
                .ok_or_else(|| EvalError::UnknownSymbol {
                    name: name.to_string(),
                })?;
            Ok(TargetValue::scalar(self.registry.lookup("VALUE")?, *value))
        })
    }

    fn read_memory(&self, address: u64, size: usize) -> std::result::Result<Vec<u8>, MemoryError> {
        trace!(address, size, "process read");
        let mut buffer = vec![0u8; size];
        self.mem
            .read_exact_at(&mut buffer, address)
            .map_err(|_| MemoryError::new(address, size))?;
        Ok(buffer)
    }

    fn lookup_type(&self, name: &str) -> std::result::Result<TypeHandle, EvalError> {
        self.registry.lookup(name)
    }

    fn binary_id(&self) -> u64 {
        self.binary_id
    }
}
