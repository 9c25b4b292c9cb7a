//! Error types for rbscope inspection

use thiserror::Error;

/// Target memory could not be read.
///
/// This is the common case when following stale pointers or looking at
/// partially initialized objects, so callers are expected to recover from it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot read {size} bytes at 0x{address:x}")]
pub struct MemoryError {
    /// First address of the failed read
    pub address: u64,

    /// Number of bytes requested
    pub size: usize,
}

impl MemoryError {
    /// Create a memory error for a read of `size` bytes at `address`.
    pub fn new(address: u64, size: usize) -> Self {
        Self { address, size }
    }
}

/// An expression or typed access could not be resolved against the target.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EvalError {
    /// Name is not a known symbol or convenience variable
    #[error("no symbol \"{name}\" in current context")]
    UnknownSymbol {
        /// The symbol that was looked up
        name: String,
    },

    /// Type name is not known to the backend
    #[error("no type named {name}")]
    UnknownType {
        /// The type that was looked up
        name: String,
    },

    /// Struct has no member with this name
    #[error("there is no member named {field} in {type_name}")]
    UnknownField {
        /// Type that was accessed
        type_name: String,
        /// Requested member
        field: String,
    },

    /// Operation needs a pointer
    #[error("attempt to dereference a non-pointer value of type {type_name}")]
    NotPointer {
        /// Actual type of the value
        type_name: String,
    },

    /// Value was not read from memory
    #[error("value of type {type_name} has no address")]
    NotAddressable {
        /// Type of the value
        type_name: String,
    },

    /// Expression result is not a single machine word
    #[error("value of type {type_name} is not a scalar")]
    NotScalar {
        /// Type of the value
        type_name: String,
    },

    /// Malformed expression text
    #[error("syntax error in expression \"{expression}\": {message}")]
    Syntax {
        /// The full expression
        expression: String,
        /// What went wrong
        message: String,
    },

    /// Memory read failed while evaluating
    #[error(transparent)]
    Memory(#[from] MemoryError),
}

/// Main error type for inspection operations
#[derive(Error, Debug)]
pub enum InspectError {
    /// Target memory unreadable
    #[error(transparent)]
    Memory(MemoryError),

    /// Expression or type resolution failed
    #[error(transparent)]
    Eval(EvalError),

    /// Word matches no immediate encoding and is not a valid heap pointer
    #[error("cannot classify value 0x{bits:x}: {reason}")]
    Classification {
        /// The raw tagged word
        bits: u64,
        /// Why classification failed
        reason: String,
    },

    /// Object fields hold implausible values
    #[error("corrupt object at 0x{address:x}: {reason}")]
    Corrupt {
        /// Object address
        address: u64,
        /// What looked wrong
        reason: String,
    },

    /// Immediate encodings overlap; this is a defect in the constant table,
    /// not a property of the target's data
    #[error("ambiguous value encoding: {0}")]
    Ambiguity(String),

    /// A constant resolved from the target is out of range
    #[error("invalid runtime constant {name} = {value}: {reason}")]
    InvalidConstant {
        /// Target constant name
        name: String,
        /// Value the target reported
        value: u64,
        /// Why it can't be used
        reason: String,
    },

    /// Depth option below 1
    #[error("--depth must be >= 1 (got {0})")]
    InvalidDepth(usize),

    /// Bad command line
    #[error("usage error: {0}")]
    Usage(String),

    /// Heap snapshot could not be loaded
    #[error("snapshot error: {0}")]
    Snapshot(String),

    /// I/O failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl InspectError {
    /// Create a corrupt-object error.
    pub fn corrupt(address: u64, reason: impl Into<String>) -> Self {
        InspectError::Corrupt {
            address,
            reason: reason.into(),
        }
    }

    /// Check whether this error came from an unreadable memory range.
    pub fn is_memory(&self) -> bool {
        matches!(self, InspectError::Memory(_))
    }

    /// Check whether this error came from expression evaluation.
    pub fn is_eval(&self) -> bool {
        matches!(self, InspectError::Eval(_))
    }
}

impl From<MemoryError> for InspectError {
    fn from(error: MemoryError) -> Self {
        InspectError::Memory(error)
    }
}

impl From<EvalError> for InspectError {
    fn from(error: EvalError) -> Self {
        match error {
            EvalError::Memory(memory) => InspectError::Memory(memory),
            other => InspectError::Eval(other),
        }
    }
}

/// Result type alias for inspection operations
pub type Result<T> = std::result::Result<T, InspectError>;
