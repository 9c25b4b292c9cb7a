//! Display and Debug implementations for tagged values

use std::fmt;

use super::*;

impl fmt::Debug for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TaggedValue(0x{:x})", self.0)
    }
}

impl fmt::Display for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

impl fmt::LowerHex for TaggedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Nil => write!(f, "nil"),
            Immediate::True => write!(f, "true"),
            Immediate::False => write!(f, "false"),
            Immediate::Undef => write!(f, "undef"),
            Immediate::Fixnum(n) => write!(f, "{}", n),
            Immediate::Flonum(d) => write!(f, "{}", format_float(*d)),
            Immediate::Symbol(id) => write!(f, "id=0x{:x}", id),
        }
    }
}

/// Format a double the way the runtime's `Float#inspect` would.
pub fn format_float(d: f64) -> String {
    if d.is_nan() {
        "NaN".to_string()
    } else if d.is_infinite() {
        if d > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else {
        // `{:?}` always keeps a fractional part or exponent ("1.0", "1e300")
        format!("{:?}", d)
    }
}
