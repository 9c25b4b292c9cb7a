//! Command shell
//!
//! The [`Session`] owns the backend and the cached constant table and is the
//! entry point for inspecting expressions. The [`Shell`] adds line-oriented
//! command dispatch on top, using commands registered explicitly in a
//! [`CommandRegistry`] at startup.

pub mod command;
pub mod inspect;

pub use command::{Arguments, Command, CommandRegistry, OptionSpec, Usage};
pub use inspect::{register_builtin_commands, ConstantsCommand, InspectCommand};

use std::io::Write;

use tracing::{debug, warn};

use crate::backend::Backend;
use crate::constants::{RuntimeConstants, TypeConstantTable};
use crate::context::{InspectOptions, PrintContext};
use crate::error::{InspectError, Result};
use crate::printer::Printer;
use crate::view::Inspector;

// ═══════════════════════════════════════════════════════════════════════
// SESSION
// ═══════════════════════════════════════════════════════════════════════

/// One debugging session against one target.
pub struct Session {
    backend: Box<dyn Backend>,
    constants: TypeConstantTable,
}

impl Session {
    /// Start a session.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self {
            backend,
            constants: TypeConstantTable::new(),
        }
    }

    /// The target.
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    /// Constants for the target's current binary.
    pub fn constants(&mut self) -> Result<&RuntimeConstants> {
        self.constants.resolve(self.backend.as_ref())
    }

    /// Forget cached constants.
    pub fn invalidate(&mut self) {
        self.constants.invalidate();
    }

    /// Evaluate and print each expression.
    ///
    /// The depth is checked before anything is evaluated. After that, a
    /// failure in one expression is reported in the output and the next
    /// expression still runs; only output errors and constant resolution
    /// failures end the batch.
    pub fn inspect(
        &mut self,
        expressions: &[String],
        options: &InspectOptions,
        out: &mut dyn Write,
    ) -> Result<()> {
        options.validate()?;
        let backend = self.backend.as_ref();
        let constants = self.constants.resolve(backend)?;

        for expression in expressions {
            debug!(%expression, depth = options.depth, "inspecting");
            let result = backend
                .evaluate(expression)
                .map_err(InspectError::from)
                .and_then(|value| Ok(value.as_tagged()?))
                .and_then(|value| {
                    let inspector = Inspector::new(backend, constants)
                        .with_element_limit(options.element_limit);
                    let context = PrintContext::new(options)?;
                    Printer::new(inspector, context, &mut *out).print_value(value)
                });

            match result {
                Ok(()) => {}
                Err(InspectError::Io(e)) => return Err(InspectError::Io(e)),
                Err(e) if e.is_memory() || e.is_eval() => {
                    warn!(%expression, error = %e, "evaluation failed");
                    writeln!(out, "Error evaluating expression '{}': {}", expression, e)?;
                }
                Err(e) => {
                    warn!(%expression, error = %e, "inspection failed");
                    writeln!(out, "Error processing '{}': {}", expression, e)?;
                }
            }
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════
// SHELL
// ═══════════════════════════════════════════════════════════════════════

/// What the prompt loop should do after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Read the next line
    Continue,
    /// Leave the prompt
    Quit,
}

/// Line-oriented command dispatcher.
pub struct Shell {
    session: Session,
    registry: CommandRegistry,
}

impl Shell {
    /// Create a shell over a session and a populated registry.
    pub fn new(session: Session, registry: CommandRegistry) -> Self {
        Self { session, registry }
    }

    /// The underlying session.
    pub fn session(&mut self) -> &mut Session {
        &mut self.session
    }

    /// The registered commands.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Run one prompt line.
    ///
    /// Understands `help`, `help <command>`, `quit` and `exit` besides the
    /// registered commands.
    pub fn execute_line(&mut self, line: &str, out: &mut dyn Write) -> Result<Flow> {
        let line = line.trim();
        let (name, rest) = match line.split_once(char::is_whitespace) {
            Some((name, rest)) => (name, rest.trim()),
            None => (line, ""),
        };

        match name {
            "" => {}
            "quit" | "exit" => return Ok(Flow::Quit),
            "help" if rest.is_empty() => self.write_help(out)?,
            "help" => match self.registry.get(rest) {
                Some(command) => write!(out, "{}", command.usage().help(rest))?,
                None => return Err(unknown_command(rest)),
            },
            name => {
                let command = self.registry.get(name).ok_or_else(|| unknown_command(name))?;
                let arguments = Arguments::parse(rest, command.usage())?;
                command.invoke(&mut self.session, &arguments, out)?;
            }
        }
        Ok(Flow::Continue)
    }

    fn write_help(&self, out: &mut dyn Write) -> Result<()> {
        writeln!(out, "Commands:")?;
        for (name, summary) in self.registry.summaries() {
            writeln!(out, "  {:<16}{}", name, summary)?;
        }
        writeln!(out, "  {:<16}{}", "help [command]", "Show help")?;
        writeln!(out, "  {:<16}{}", "quit", "Leave the prompt")?;
        Ok(())
    }
}

fn unknown_command(name: &str) -> InspectError {
    InspectError::Usage(format!(
        "unknown command '{}' (type 'help' for a list)",
        name
    ))
}
