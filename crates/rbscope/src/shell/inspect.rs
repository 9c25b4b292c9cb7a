//! Built-in commands

use std::io::Write;

use crate::context::InspectOptions;
use crate::error::{InspectError, Result};
use crate::view::DEFAULT_ELEMENT_LIMIT;

use super::command::{Arguments, Command, CommandRegistry, Usage};
use super::Session;

/// `rb-inspect`: print values with recursive descent.
pub struct InspectCommand {
    usage: Usage,
}

impl InspectCommand {
    /// Create the command.
    pub fn new() -> Self {
        Self {
            usage: Usage::new("Print Ruby objects with recursive inspection")
                .parameter("value", "VALUE or expression to print")
                .option("depth", 1, "Maximum recursion depth for nested objects")
                .option(
                    "limit",
                    DEFAULT_ELEMENT_LIMIT,
                    "Maximum elements printed per collection",
                )
                .flag("debug", "Show internal structure and debug information")
                .example("rb-inspect $errinfo", "Print exception object")
                .example(
                    "rb-inspect $ec->storage --depth 3",
                    "Print fiber storage with depth 3",
                )
                .example(
                    "rb-inspect $ec->cfp->sp[-1] --debug",
                    "Print top of stack with debug info",
                ),
        }
    }
}

impl Default for InspectCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for InspectCommand {
    fn usage(&self) -> &Usage {
        &self.usage
    }

    fn invoke(
        &self,
        session: &mut Session,
        arguments: &Arguments,
        out: &mut dyn Write,
    ) -> Result<()> {
        if arguments.expressions.is_empty() {
            return Err(InspectError::Usage(
                "rb-inspect needs at least one expression".to_string(),
            ));
        }
        let options = InspectOptions::new()
            .with_depth(arguments.option("depth"))
            .with_element_limit(arguments.option("limit"))
            .with_debug(arguments.has_flag("debug"));
        session.inspect(&arguments.expressions, &options, out)
    }
}

/// `rb-constants`: dump the resolved constant table.
pub struct ConstantsCommand {
    usage: Usage,
}

impl ConstantsCommand {
    /// Create the command.
    pub fn new() -> Self {
        Self {
            usage: Usage::new("Show the runtime constants used to decode values")
                .flag("refresh", "Resolve the constants again before printing")
                .example("rb-constants", "List tags, encodings and layout flags"),
        }
    }
}

impl Default for ConstantsCommand {
    fn default() -> Self {
        Self::new()
    }
}

impl Command for ConstantsCommand {
    fn usage(&self) -> &Usage {
        &self.usage
    }

    fn invoke(
        &self,
        session: &mut Session,
        arguments: &Arguments,
        out: &mut dyn Write,
    ) -> Result<()> {
        if !arguments.expressions.is_empty() {
            return Err(InspectError::Usage(
                "rb-constants takes no expressions".to_string(),
            ));
        }
        if arguments.has_flag("refresh") {
            session.invalidate();
        }
        let entries = session.constants()?.entries();
        let width = entries.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
        for (name, value) in entries {
            writeln!(out, "{:<width$} = 0x{:x}", name, value, width = width)?;
        }
        Ok(())
    }
}

/// Register every built-in command.
pub fn register_builtin_commands(registry: &mut CommandRegistry) {
    registry.register("rb-inspect", Box::new(InspectCommand::new()));
    registry.register("rb-constants", Box::new(ConstantsCommand::new()));
}
