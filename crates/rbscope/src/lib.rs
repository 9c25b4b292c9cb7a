//! # rbscope
//!
//! An out-of-process inspector for Ruby heap objects.
//!
//! rbscope reads raw `VALUE` words from a target (a live process or a JSON
//! heap snapshot), works out what each word encodes, and prints the object
//! graph behind it as an indented tree.
//!
//! ## Architecture
//!
//! - **Backend**: expression evaluation, typed memory reads and constant
//!   lookup against the target ([`backend::Backend`])
//! - **Constants**: type tags, special values and layout flags resolved
//!   once per target binary ([`constants::TypeConstantTable`])
//! - **Classification**: immediate or heap object, and which type
//!   ([`classify::classify`])
//! - **Views**: per-type decoders producing a [`view::DecodedView`]
//! - **Printer**: depth-bounded, cycle-aware tree output
//!   ([`printer::Printer`])
//! - **Shell**: `rb-inspect` and friends on top of a [`shell::Session`]

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod backends;
pub mod classify;
pub mod constants;
pub mod context;
pub mod error;
pub mod flags;
pub mod printer;
pub mod shell;
pub mod types;
pub mod value;
pub mod view;

// Re-export main types
pub use backend::{Backend, Field, TargetValue};
pub use classify::{classify, Classification, HeapObject, ObjectHeader};
pub use constants::{Constant, RuntimeConstants, TypeConstantTable, ValueType};
pub use context::{InspectOptions, PrintContext};
pub use error::{EvalError, InspectError, MemoryError, Result};
pub use flags::ObjectFlags;
pub use printer::Printer;
pub use shell::{Session, Shell};
pub use value::{Immediate, TaggedValue};
pub use view::{DecodedView, Inspector};

/// rbscope version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
