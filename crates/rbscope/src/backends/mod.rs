//! Concrete backends
//!
//! - [`SnapshotBackend`]: JSON heap images, for offline inspection and tests
//! - [`ProcessBackend`]: live processes via `/proc/<pid>/mem` (Linux only)
//!
//! Both share the expression language in [`expr`].

pub mod expr;
#[cfg(target_os = "linux")]
pub mod process;
pub mod snapshot;

#[cfg(target_os = "linux")]
pub use process::ProcessBackend;
pub use snapshot::{HeapSnapshot, Region, SnapshotBackend, SnapshotBuilder, SymbolDef};
