//! Commands, usage metadata and argument parsing

use std::fmt::Write as _;
use std::io::Write;

use indexmap::IndexMap;

use crate::error::{InspectError, Result};

use super::Session;

// ═══════════════════════════════════════════════════════════════════════
// USAGE
// ═══════════════════════════════════════════════════════════════════════

/// A numeric `--name N` option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OptionSpec {
    /// Option name, without dashes
    pub name: &'static str,
    /// Value when not given
    pub default: usize,
    /// Help text
    pub description: &'static str,
}

/// What a command accepts, and how to describe it.
#[derive(Debug, Clone, Default)]
pub struct Usage {
    /// One-line description
    pub summary: &'static str,
    /// Positional parameters
    pub parameters: Vec<(&'static str, &'static str)>,
    /// Numeric options
    pub options: Vec<OptionSpec>,
    /// Boolean `--name` flags
    pub flags: Vec<(&'static str, &'static str)>,
    /// Example invocations
    pub examples: Vec<(&'static str, &'static str)>,
}

impl Usage {
    /// Start a usage description.
    pub fn new(summary: &'static str) -> Self {
        Self {
            summary,
            ..Self::default()
        }
    }

    /// Add a positional parameter (builder pattern)
    pub fn parameter(mut self, name: &'static str, description: &'static str) -> Self {
        self.parameters.push((name, description));
        self
    }

    /// Add a numeric option (builder pattern)
    pub fn option(mut self, name: &'static str, default: usize, description: &'static str) -> Self {
        self.options.push(OptionSpec {
            name,
            default,
            description,
        });
        self
    }

    /// Add a flag (builder pattern)
    pub fn flag(mut self, name: &'static str, description: &'static str) -> Self {
        self.flags.push((name, description));
        self
    }

    /// Add an example (builder pattern)
    pub fn example(mut self, command: &'static str, description: &'static str) -> Self {
        self.examples.push((command, description));
        self
    }

    fn option_spec(&self, name: &str) -> Option<&OptionSpec> {
        self.options.iter().find(|spec| spec.name == name)
    }

    fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|(flag, _)| *flag == name)
    }

    /// Render help text for a command registered as `name`.
    pub fn help(&self, name: &str) -> String {
        let mut text = String::new();
        let _ = writeln!(text, "{}", self.summary);
        let _ = write!(text, "\nUsage: {}", name);
        for (parameter, _) in &self.parameters {
            let _ = write!(text, " <{}>", parameter);
        }
        for spec in &self.options {
            let _ = write!(text, " [--{} N]", spec.name);
        }
        for (flag, _) in &self.flags {
            let _ = write!(text, " [--{}]", flag);
        }
        text.push('\n');

        if !self.parameters.is_empty() {
            text.push_str("\nParameters:\n");
            for (parameter, description) in &self.parameters {
                let _ = writeln!(text, "  {:<16}{}", parameter, description);
            }
        }
        if !self.options.is_empty() || !self.flags.is_empty() {
            text.push_str("\nOptions:\n");
            for spec in &self.options {
                let _ = writeln!(
                    text,
                    "  --{:<14}{} (default: {})",
                    spec.name, spec.description, spec.default
                );
            }
            for (flag, description) in &self.flags {
                let _ = writeln!(text, "  --{:<14}{}", flag, description);
            }
        }
        if !self.examples.is_empty() {
            text.push_str("\nExamples:\n");
            for (command, description) in &self.examples {
                let _ = writeln!(text, "  {}", command);
                let _ = writeln!(text, "      {}", description);
            }
        }
        text
    }
}

// ═══════════════════════════════════════════════════════════════════════
// ARGUMENTS
// ═══════════════════════════════════════════════════════════════════════

/// Parsed command arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    /// Positional expressions, in order
    pub expressions: Vec<String>,
    options: IndexMap<String, usize>,
    flags: Vec<String>,
}

impl Arguments {
    /// Parse an argument string against a usage.
    ///
    /// Words are split on whitespace outside quotes, parentheses and
    /// brackets, so `(struct RString *)0x10` stays one expression. Options
    /// are `--name N` or `--name=N`; every option gets its default.
    pub fn parse(input: &str, usage: &Usage) -> Result<Self> {
        let mut arguments = Arguments {
            options: usage
                .options
                .iter()
                .map(|spec| (spec.name.to_string(), spec.default))
                .collect(),
            ..Self::default()
        };

        let mut words = split_words(input)?.into_iter();
        while let Some(word) = words.next() {
            let Some(name) = word.strip_prefix("--") else {
                arguments.expressions.push(word);
                continue;
            };
            let (name, inline) = match name.split_once('=') {
                Some((name, value)) => (name, Some(value.to_string())),
                None => (name, None),
            };
            if usage.option_spec(name).is_some() {
                let value = match inline {
                    Some(value) => value,
                    None => words
                        .next()
                        .ok_or_else(|| InspectError::Usage(format!("--{} needs a value", name)))?,
                };
                let parsed = value.parse::<usize>().map_err(|_| {
                    InspectError::Usage(format!("invalid value '{}' for --{}", value, name))
                })?;
                arguments.options.insert(name.to_string(), parsed);
            } else if usage.has_flag(name) && inline.is_none() {
                arguments.flags.push(name.to_string());
            } else {
                return Err(InspectError::Usage(format!("unknown option --{}", name)));
            }
        }
        Ok(arguments)
    }

    /// Value of an option (its default if not given, 0 if undeclared).
    pub fn option(&self, name: &str) -> usize {
        self.options.get(name).copied().unwrap_or(0)
    }

    /// Check if a flag was given.
    pub fn has_flag(&self, name: &str) -> bool {
        self.flags.iter().any(|flag| flag == name)
    }
}

fn split_words(input: &str) -> Result<Vec<String>> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut nesting = 0usize;

    for c in input.chars() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), c) => current.push(c),
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[') => {
                nesting += 1;
                current.push(c);
            }
            (None, ')' | ']') => {
                nesting = nesting.saturating_sub(1);
                current.push(c);
            }
            (None, c) if c.is_whitespace() && nesting == 0 => {
                if !current.is_empty() {
                    words.push(std::mem::take(&mut current));
                }
            }
            (None, c) => current.push(c),
        }
    }
    if quote.is_some() {
        return Err(InspectError::Usage("unterminated quote".to_string()));
    }
    if !current.is_empty() {
        words.push(current);
    }
    Ok(words)
}

// ═══════════════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════════════

/// A shell command.
pub trait Command {
    /// What the command accepts.
    fn usage(&self) -> &Usage;

    /// Run the command.
    fn invoke(&self, session: &mut Session, arguments: &Arguments, out: &mut dyn Write)
        -> Result<()>;
}

/// Commands by name, in registration order.
#[derive(Default)]
pub struct CommandRegistry {
    commands: IndexMap<String, Box<dyn Command>>,
}

impl CommandRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command, replacing any previous one with the same name.
    pub fn register(&mut self, name: impl Into<String>, command: Box<dyn Command>) {
        self.commands.insert(name.into(), command);
    }

    /// Look up a command.
    pub fn get(&self, name: &str) -> Option<&dyn Command> {
        self.commands.get(name).map(|command| command.as_ref())
    }

    /// Registered names with their summaries.
    pub fn summaries(&self) -> impl Iterator<Item = (&str, &'static str)> {
        self.commands
            .iter()
            .map(|(name, command)| (name.as_str(), command.usage().summary))
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Check if no commands are registered.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn usage() -> Usage {
        Usage::new("Print things")
            .parameter("value", "what to print")
            .option("depth", 1, "how deep")
            .flag("debug", "more detail")
    }

    #[test]
    fn test_parse_defaults() {
        let args = Arguments::parse("$x", &usage()).unwrap();
        assert_eq!(args.expressions, vec!["$x".to_string()]);
        assert_eq!(args.option("depth"), 1);
        assert!(!args.has_flag("debug"));
    }

    #[test]
    fn test_parse_options_and_flags() {
        let args = Arguments::parse("a --depth 3 b --debug", &usage()).unwrap();
        assert_eq!(args.expressions, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(args.option("depth"), 3);
        assert!(args.has_flag("debug"));

        let args = Arguments::parse("--depth=0 a", &usage()).unwrap();
        assert_eq!(args.option("depth"), 0);
    }

    #[test]
    fn test_parse_keeps_casts_together() {
        let args = Arguments::parse("(struct RString *)0x10 'a b'", &usage()).unwrap();
        assert_eq!(
            args.expressions,
            vec!["(struct RString *)0x10".to_string(), "a b".to_string()]
        );
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(
            Arguments::parse("--depth", &usage()),
            Err(InspectError::Usage(_))
        ));
        assert!(matches!(
            Arguments::parse("--depth -1", &usage()),
            Err(InspectError::Usage(_))
        ));
        assert!(matches!(
            Arguments::parse("--bogus", &usage()),
            Err(InspectError::Usage(_))
        ));
        assert!(matches!(
            Arguments::parse("'open", &usage()),
            Err(InspectError::Usage(_))
        ));
    }

    #[test]
    fn test_help_text() {
        let help = usage().example("p $x", "print x").help("p");
        assert_eq!(
            help,
            "Print things\n\
             \n\
             Usage: p <value> [--depth N] [--debug]\n\
             \n\
             Parameters:\n\
             \x20 value           what to print\n\
             \n\
             Options:\n\
             \x20 --depth         how deep (default: 1)\n\
             \x20 --debug         more detail\n\
             \n\
             Examples:\n\
             \x20 p $x\n\
             \x20     print x\n"
        );
    }
}
