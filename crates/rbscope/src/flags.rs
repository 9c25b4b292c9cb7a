//! Object header flag bits shown in debug output

use bitflags::bitflags;

bitflags! {
    /// Generic `RBasic.flags` bits shared by every object type.
    ///
    /// Per-type bits (`FL_USER*`) are interpreted by the decoders instead.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u64 {
        /// Write barrier protected
        const WB_PROTECTED = 1 << 5;
        /// Has a finalizer
        const FINALIZE = 1 << 7;
        /// Shareable between ractors
        const SHAREABLE = 1 << 8;
        /// Has generic instance variables
        const EXIVAR = 1 << 10;
        /// Frozen
        const FREEZE = 1 << 11;
    }
}

impl ObjectFlags {
    /// Names of the generic bits set in a raw flags word, e.g. `SHAREABLE|FREEZE`.
    ///
    /// Returns `None` when no generic bit is set.
    pub fn describe(flags: u64) -> Option<String> {
        let names: Vec<&str> = Self::from_bits_truncate(flags)
            .iter_names()
            .map(|(name, _)| name)
            .collect();
        if names.is_empty() {
            None
        } else {
            Some(names.join("|"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_describe_frozen_string() {
        let flags = ObjectFlags::FREEZE.bits() | 0x05;
        assert_eq!(ObjectFlags::describe(flags).as_deref(), Some("FREEZE"));
    }

    #[test]
    fn test_describe_nothing_set() {
        assert_eq!(ObjectFlags::describe(0x07), None);
    }

    #[test]
    fn test_describe_ignores_type_bits() {
        let flags = (ObjectFlags::SHAREABLE | ObjectFlags::FREEZE).bits() | 0x1f;
        assert_eq!(
            ObjectFlags::describe(flags).as_deref(),
            Some("SHAREABLE|FREEZE")
        );
    }
}
