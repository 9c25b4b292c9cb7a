mod common;

use common::*;
use pretty_assertions::assert_eq;
use rbscope::shell::{register_builtin_commands, CommandRegistry, Flow};
use rbscope::*;

fn shell_with(backend: impl Backend + 'static) -> Shell {
    let mut registry = CommandRegistry::new();
    register_builtin_commands(&mut registry);
    Shell::new(Session::new(Box::new(backend)), registry)
}

fn heap() -> Heap {
    Heap::new()
        .array(0x1000, &[fix(1), 0x2000])
        .string(0x2000, "two")
        .var("ary", 0x1000)
        .var("num", fix(7))
        .var("bad", 0x104)
        .var("dangling", 0x9000)
}

fn run(shell: &mut Shell, line: &str) -> (rbscope::Result<Flow>, String) {
    let mut out = Vec::new();
    let flow = shell.execute_line(line, &mut out);
    (flow, String::from_utf8(out).unwrap())
}

// ═══════════════════════════════════════════════════════════════════════
// rb-inspect
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_inspect_default_depth() {
    let mut shell = shell_with(heap().backend());
    let (flow, output) = run(&mut shell, "rb-inspect $ary");
    assert_eq!(flow.unwrap(), Flow::Continue);
    assert_eq!(output, "<T_ARRAY@0x1000> length=2\n");
}

#[test]
fn test_inspect_with_depth() {
    let mut shell = shell_with(heap().backend());
    let (_, output) = run(&mut shell, "rb-inspect $ary --depth 2");
    assert_eq!(
        output,
        "<T_ARRAY@0x1000> length=2\n\
         \x20 [0]: <T_FIXNUM> 1\n\
         \x20 [1]: <T_STRING@0x2000> \"two\"\n"
    );
}

#[test]
fn test_inspect_cast_expression() {
    let mut shell = shell_with(heap().backend());
    let (_, output) = run(&mut shell, "rb-inspect ((VALUE *)0x1000)[3]");
    assert_eq!(output, "<T_STRING@0x2000> \"two\"\n");
}

#[test]
fn test_zero_depth_rejected_before_evaluation() {
    let backend = CountingBackend::new(heap().backend());
    let evaluations = backend.evaluations.clone();
    let mut shell = shell_with(backend);

    let (flow, output) = run(&mut shell, "rb-inspect $ary $num --depth 0");
    assert!(matches!(flow, Err(InspectError::InvalidDepth(0))));
    assert_eq!(output, "");
    assert_eq!(evaluations.get(), 0);
}

#[test]
fn test_each_expression_reports_its_own_error() {
    let mut shell = shell_with(heap().backend());
    let (flow, output) = run(&mut shell, "rb-inspect $missing $bad $dangling $num");
    assert_eq!(flow.unwrap(), Flow::Continue);
    assert_eq!(
        output,
        "Error evaluating expression '$missing': no symbol \"$missing\" in current context\n\
         Error processing '$bad': cannot classify value 0x104: tag bits match no immediate encoding\n\
         Error evaluating expression '$dangling': cannot read 16 bytes at 0x9000\n\
         <T_FIXNUM> 7\n"
    );
}

#[test]
fn test_inspect_needs_an_expression() {
    let mut shell = shell_with(heap().backend());
    let (flow, _) = run(&mut shell, "rb-inspect --debug");
    assert!(matches!(flow, Err(InspectError::Usage(_))));
}

#[test]
fn test_immediates_are_printed_without_reads() {
    let backend = CountingBackend::new(heap().backend());
    let reads = backend.reads.clone();
    let mut shell = shell_with(backend);
    let (_, output) = run(&mut shell, "rb-inspect $num --depth 4");
    assert_eq!(output, "<T_FIXNUM> 7\n");
    assert_eq!(reads.get(), 0);
}

// ═══════════════════════════════════════════════════════════════════════
// rb-constants
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_constants_listing() {
    let mut shell = shell_with(heap().constant("RUBY_T_STRING", 0x17).backend());
    let (flow, output) = run(&mut shell, "rb-constants");
    assert_eq!(flow.unwrap(), Flow::Continue);
    assert!(output
        .lines()
        .any(|line| line.starts_with("RUBY_Qnil ") && line.ends_with(" = 0x4")));
    assert!(output
        .lines()
        .any(|line| line.starts_with("RUBY_T_STRING ") && line.ends_with(" = 0x17")));
}

#[test]
fn test_constants_rejects_expressions() {
    let mut shell = shell_with(heap().backend());
    let (flow, _) = run(&mut shell, "rb-constants $ary");
    assert!(matches!(flow, Err(InspectError::Usage(_))));
}

// ═══════════════════════════════════════════════════════════════════════
// Prompt lines
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_help_lists_commands() {
    let mut shell = shell_with(heap().backend());
    let (_, output) = run(&mut shell, "help");
    assert!(output.starts_with("Commands:\n"));
    assert!(output.contains("rb-inspect"));
    assert!(output.contains("rb-constants"));
}

#[test]
fn test_help_for_command() {
    let mut shell = shell_with(heap().backend());
    let (_, output) = run(&mut shell, "help rb-inspect");
    assert!(output.contains("Usage: rb-inspect <value> [--depth N] [--limit N] [--debug]"));
    assert!(output.contains("rb-inspect $ec->storage --depth 3"));
}

#[test]
fn test_quit_and_blank_lines() {
    let mut shell = shell_with(heap().backend());
    assert_eq!(run(&mut shell, "").0.unwrap(), Flow::Continue);
    assert_eq!(run(&mut shell, "   ").0.unwrap(), Flow::Continue);
    assert_eq!(run(&mut shell, "quit").0.unwrap(), Flow::Quit);
    assert_eq!(run(&mut shell, "exit").0.unwrap(), Flow::Quit);
}

#[test]
fn test_unknown_command() {
    let mut shell = shell_with(heap().backend());
    let (flow, _) = run(&mut shell, "rb-frobnicate");
    assert!(matches!(flow, Err(InspectError::Usage(_))));
    let (flow, _) = run(&mut shell, "help rb-frobnicate");
    assert!(matches!(flow, Err(InspectError::Usage(_))));
}

#[test]
fn test_registry_order() {
    let shell = shell_with(heap().backend());
    let names: Vec<&str> = shell.registry().summaries().map(|(name, _)| name).collect();
    assert_eq!(names, vec!["rb-inspect", "rb-constants"]);
}
