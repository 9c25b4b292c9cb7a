//! Recursive, depth-bounded printing of decoded views
//!
//! Each node is printed according to its remaining depth `d`:
//!
//! - `d == 0`: the one-line summary, nothing else
//! - heap address already printed: the summary marked `(already seen)`
//! - otherwise: the header line, then (if `d > 1`) every child at `d - 1`
//!
//! Children that fail to classify or decode get an inline error marker and
//! their siblings carry on. Collections cut short by the element limit end
//! with a `... N more` line.

use std::fmt::Write as _;
use std::io::Write;

use tracing::warn;

use crate::context::PrintContext;
use crate::error::Result;
use crate::flags::ObjectFlags;
use crate::value::TaggedValue;
use crate::view::{Child, DecodedView, Inspector};

/// Indentation per nesting level.
pub const INDENT: &str = "  ";

/// Writes the text rendering of one top-level value.
pub struct Printer<'a, 'w> {
    inspector: Inspector<'a>,
    context: PrintContext,
    out: &'w mut dyn Write,
}

impl<'a, 'w> Printer<'a, 'w> {
    /// Create a printer for one expression.
    pub fn new(inspector: Inspector<'a>, context: PrintContext, out: &'w mut dyn Write) -> Self {
        Self {
            inspector,
            context,
            out,
        }
    }

    /// The per-expression state.
    pub fn context(&self) -> &PrintContext {
        &self.context
    }

    /// Interpret a top-level value and print it with the context's depth.
    ///
    /// Errors interpreting the value itself are returned to the caller.
    pub fn print_value(&mut self, value: TaggedValue) -> Result<()> {
        let view = self.inspector.interpret(value)?;
        let depth = self.context.depth();
        self.print_view(&view, depth, 0, None)
    }

    /// Print a view and, depth permitting, its children.
    ///
    /// Recursion never reaches `depth == 0`, since children are only
    /// printed from `depth > 1`. Callers may pass 0 to get the single
    /// summary line; the view is then not marked as visited.
    pub fn print_view(
        &mut self,
        view: &DecodedView,
        depth: usize,
        level: usize,
        label: Option<&str>,
    ) -> Result<()> {
        if depth == 0 {
            return self.write_line(level, label, &view.line());
        }

        if let Some(address) = view.address() {
            if self.context.is_visited(address) {
                let line = format!("{} (already seen)", view.line());
                return self.write_line(level, label, &line);
            }
        }

        let mut line = view.line();
        if self.context.debug() {
            append_debug_fields(&mut line, view);
        }
        self.write_line(level, label, &line)?;

        if let Some(address) = view.address() {
            self.context.mark_visited(address);
        }

        if depth > 1 {
            for child in view.children() {
                self.print_child(&child, depth - 1, level + 1)?;
            }
            let omitted = view.omitted();
            if omitted > 0 {
                self.write_line(level + 1, None, &format!("... {} more", omitted))?;
            }
        }
        Ok(())
    }

    /// Print one child, turning interpretation failures into a marker line.
    fn print_child(&mut self, child: &Child, depth: usize, level: usize) -> Result<()> {
        match self.inspector.interpret(child.value) {
            Ok(view) => self.print_view(&view, depth, level, Some(&child.label)),
            Err(e) => {
                warn!(label = %child.label, value = %child.value, error = %e, "child not decoded");
                self.write_line(level, Some(&child.label), &format!("<error: {}>", e))
            }
        }
    }

    fn write_line(&mut self, level: usize, label: Option<&str>, text: &str) -> Result<()> {
        let indent = INDENT.repeat(level);
        match label {
            Some(label) => writeln!(self.out, "{}{}: {}", indent, label, text)?,
            None => writeln!(self.out, "{}{}", indent, text)?,
        }
        Ok(())
    }
}

fn append_debug_fields(line: &mut String, view: &DecodedView) {
    if let Some(header) = view.header() {
        let _ = write!(line, " flags=0x{:x}", header.flags);
        if let Some(names) = ObjectFlags::describe(header.flags) {
            let _ = write!(line, " [{}]", names);
        }
        let _ = write!(line, " klass=0x{:x}", header.klass);
    }
    for (name, value) in view.debug_fields() {
        let _ = write!(line, " {}={}", name, value);
    }
}
