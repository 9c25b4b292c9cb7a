//! rbscope - inspect Ruby heap objects from outside the process

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use tracing::warn;
use tracing_subscriber::filter::LevelFilter;

use rbscope::backend::Backend;
use rbscope::backends::SnapshotBackend;
use rbscope::shell::{register_builtin_commands, CommandRegistry, Flow, Session, Shell};
use rbscope::view::DEFAULT_ELEMENT_LIMIT;
use rbscope::{InspectOptions, VERSION};

/// Print Ruby objects from a heap snapshot or a live process
#[derive(Parser, Debug)]
#[command(name = "rbscope")]
#[command(version = VERSION)]
#[command(about = "Print Ruby objects from a heap snapshot or a live process", long_about = None)]
struct Args {
    #[command(flatten)]
    target: Target,

    /// Define a VALUE symbol for a live process (hex with 0x, or decimal)
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE", value_parser = parse_define)]
    defines: Vec<(String, u64)>,

    /// Log more (repeat for debug and trace output)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
struct Target {
    /// JSON heap snapshot to read
    #[arg(long, value_name = "FILE")]
    snapshot: Option<PathBuf>,

    /// Process to attach to (Linux only)
    #[arg(long, value_name = "PID")]
    pid: Option<u32>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print one or more values
    Inspect {
        /// VALUEs or expressions to print
        #[arg(value_name = "EXPR", required = true)]
        expressions: Vec<String>,

        /// Maximum recursion depth for nested objects
        #[arg(short, long, default_value_t = 1)]
        depth: usize,

        /// Maximum elements printed per collection
        #[arg(short, long, default_value_t = DEFAULT_ELEMENT_LIMIT)]
        limit: usize,

        /// Show internal structure and debug information
        #[arg(long)]
        debug: bool,
    },

    /// Show the resolved runtime constants
    Constants,

    /// Start an interactive prompt (the default)
    Repl,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let backend = open_backend(&args)?;
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);
    let mut shell = Shell::new(Session::new(backend), registry);

    match args.command.unwrap_or(Commands::Repl) {
        Commands::Inspect {
            expressions,
            depth,
            limit,
            debug,
        } => {
            let options = InspectOptions::new()
                .with_depth(depth)
                .with_element_limit(limit)
                .with_debug(debug);
            let stdout = io::stdout();
            let mut out = stdout.lock();
            shell
                .session()
                .inspect(&expressions, &options, &mut out)
                .context("inspection failed")?;
            out.flush()?;
        }
        Commands::Constants => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            shell
                .execute_line("rb-constants", &mut out)
                .context("failed to resolve constants")?;
            out.flush()?;
        }
        Commands::Repl => run_repl(&mut shell)?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .init();
}

fn parse_define(input: &str) -> std::result::Result<(String, u64), String> {
    let (name, value) = input
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{}'", input))?;
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse::<u64>(),
    };
    let parsed = parsed.map_err(|e| format!("invalid value '{}': {}", value, e))?;
    Ok((name.to_string(), parsed))
}

fn open_backend(args: &Args) -> Result<Box<dyn Backend>> {
    if let Some(path) = &args.target.snapshot {
        if !args.defines.is_empty() {
            warn!("--define is ignored for snapshots; put symbols in the snapshot file");
        }
        let backend = SnapshotBackend::open(path)
            .with_context(|| format!("failed to load snapshot {}", path.display()))?;
        return Ok(Box::new(backend));
    }
    match args.target.pid {
        Some(pid) => attach(pid, &args.defines),
        None => bail!("no target given; use --snapshot or --pid"),
    }
}

#[cfg(target_os = "linux")]
fn attach(pid: u32, defines: &[(String, u64)]) -> Result<Box<dyn Backend>> {
    let mut backend = rbscope::backends::ProcessBackend::attach(pid)
        .with_context(|| format!("failed to attach to process {}", pid))?;
    for (name, value) in defines {
        backend = backend.with_symbol(name.clone(), *value);
    }
    Ok(Box::new(backend))
}

#[cfg(not(target_os = "linux"))]
fn attach(_pid: u32, _defines: &[(String, u64)]) -> Result<Box<dyn Backend>> {
    bail!("attaching to a live process is only supported on Linux")
}

fn run_repl(shell: &mut Shell) -> Result<()> {
    let mut rl = DefaultEditor::new().context("failed to create line editor")?;
    println!("rbscope {} - type 'help' for commands, 'quit' to leave", VERSION);

    loop {
        match rl.readline("(rbscope) ") {
            Ok(line) => {
                if line.trim().is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line.as_str());

                let stdout = io::stdout();
                let mut out = stdout.lock();
                let flow = shell.execute_line(&line, &mut out);
                out.flush()?;
                match flow {
                    Ok(Flow::Continue) => {}
                    Ok(Flow::Quit) => break,
                    Err(e) => eprintln!("Error: {e}"),
                }
            }
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {e}");
                break;
            }
        }
    }
    Ok(())
}
