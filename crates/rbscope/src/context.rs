//! Inspection options and per-expression print state

use std::collections::HashSet;

use crate::error::{InspectError, Result};

/// Operator-facing options for one inspection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InspectOptions {
    /// Maximum recursion depth; must be at least 1
    pub depth: usize,

    /// Print raw flag bits and internal fields
    pub debug: bool,

    /// Maximum children printed per collection
    pub element_limit: usize,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            depth: 1,
            debug: false,
            element_limit: 64,
        }
    }
}

impl InspectOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum depth (builder pattern)
    pub fn with_depth(mut self, depth: usize) -> Self {
        self.depth = depth;
        self
    }

    /// Enable or disable debug output (builder pattern)
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Set the per-collection element limit (builder pattern)
    pub fn with_element_limit(mut self, limit: usize) -> Self {
        self.element_limit = limit;
        self
    }

    /// Reject a depth below 1.
    pub fn validate(&self) -> Result<()> {
        if self.depth < 1 {
            return Err(InspectError::InvalidDepth(self.depth));
        }
        Ok(())
    }
}

/// State threaded through one top-level print.
///
/// Holds the set of heap addresses already printed in full. It only grows,
/// and a fresh context is made for every expression.
#[derive(Debug)]
pub struct PrintContext {
    options: InspectOptions,
    visited: HashSet<u64>,
}

impl PrintContext {
    /// Create the state for one expression.
    pub fn new(options: &InspectOptions) -> Result<Self> {
        options.validate()?;
        Ok(Self {
            options: options.clone(),
            visited: HashSet::new(),
        })
    }

    /// Maximum depth for this print.
    pub fn depth(&self) -> usize {
        self.options.depth
    }

    /// Whether debug output is on.
    pub fn debug(&self) -> bool {
        self.options.debug
    }

    /// Maximum children per collection.
    pub fn element_limit(&self) -> usize {
        self.options.element_limit
    }

    /// Check if an address was already printed in full.
    pub fn is_visited(&self, address: u64) -> bool {
        self.visited.contains(&address)
    }

    /// Record an address. Returns `false` if it was already present.
    pub fn mark_visited(&mut self, address: u64) -> bool {
        self.visited.insert(address)
    }

    /// Number of distinct addresses printed so far.
    pub fn visited_count(&self) -> usize {
        self.visited.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = InspectOptions::default();
        assert_eq!(options.depth, 1);
        assert!(!options.debug);
        assert_eq!(options.element_limit, 64);
    }

    #[test]
    fn test_depth_zero_rejected() {
        let options = InspectOptions::new().with_depth(0);
        assert!(matches!(
            PrintContext::new(&options),
            Err(InspectError::InvalidDepth(0))
        ));
    }

    #[test]
    fn test_visited_only_grows() {
        let mut ctx = PrintContext::new(&InspectOptions::new().with_depth(3)).unwrap();
        assert!(ctx.mark_visited(0x1000));
        assert!(!ctx.mark_visited(0x1000));
        assert!(ctx.is_visited(0x1000));
        assert_eq!(ctx.visited_count(), 1);
    }
}
