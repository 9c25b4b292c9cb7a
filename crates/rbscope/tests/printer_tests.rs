mod common;

use common::*;
use pretty_assertions::assert_eq;
use rbscope::*;

fn depth(depth: usize) -> InspectOptions {
    InspectOptions::new().with_depth(depth)
}

// ═══════════════════════════════════════════════════════════════════════
// Depth
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_depth_one_prints_only_the_node() {
    let backend = Heap::new().array(0x1000, &[fix(1), fix(2), fix(3)]).backend();
    assert_eq!(
        render(&backend, 0x1000, &depth(1)),
        "<T_ARRAY@0x1000> length=3\n"
    );
}

#[test]
fn test_depth_two_prints_children() {
    let backend = Heap::new().array(0x1000, &[fix(1), fix(2), fix(3)]).backend();
    assert_eq!(
        render(&backend, 0x1000, &depth(2)),
        "<T_ARRAY@0x1000> length=3\n\
         \x20 [0]: <T_FIXNUM> 1\n\
         \x20 [1]: <T_FIXNUM> 2\n\
         \x20 [2]: <T_FIXNUM> 3\n"
    );
}

#[test]
fn test_nested_collections() {
    let backend = Heap::new()
        .array(0x1000, &[0x2000, 0x3000])
        .string(0x2000, "key")
        .ar_hash(0x3000, &[(0x2000, fix(5))])
        .backend();
    assert_eq!(
        render(&backend, 0x1000, &depth(3)),
        "<T_ARRAY@0x1000> length=2\n\
         \x20 [0]: <T_STRING@0x2000> \"key\"\n\
         \x20 [1]: <T_HASH@0x3000> size=1\n\
         \x20   [0] key: <T_STRING@0x2000> \"key\" (already seen)\n\
         \x20   [0] value: <T_FIXNUM> 5\n"
    );
}

#[test]
fn test_depth_boundary_on_longer_chain() {
    let chain = || {
        Heap::new()
            .array(0x1000, &[0x2000])
            .array(0x2000, &[0x3000])
            .array(0x3000, &[0x4000])
            .array(0x4000, &[fix(1)])
    };

    let backend = CountingBackend::new(chain().backend());
    assert_eq!(
        render(&backend, 0x1000, &depth(3)),
        "<T_ARRAY@0x1000> length=1\n\
         \x20 [0]: <T_ARRAY@0x2000> length=1\n\
         \x20   [0]: <T_ARRAY@0x3000> length=1\n"
    );
    // Two reads per array shown; nothing at 0x4000.
    assert_eq!(backend.reads.get(), 6);

    let backend = chain().backend();
    assert_eq!(
        render(&backend, 0x1000, &depth(4)),
        "<T_ARRAY@0x1000> length=1\n\
         \x20 [0]: <T_ARRAY@0x2000> length=1\n\
         \x20   [0]: <T_ARRAY@0x3000> length=1\n\
         \x20     [0]: <T_ARRAY@0x4000> length=1\n"
    );
}

#[test]
fn test_print_view_at_depth_zero_is_summary_only() {
    let backend = Heap::new().array(0x1000, &[fix(1), fix(2)]).backend();
    let constants = RuntimeConstants::default();
    let inspector = Inspector::new(&backend, &constants);
    let view = inspector.interpret(TaggedValue::new(0x1000)).unwrap();
    let context = PrintContext::new(&depth(2)).unwrap();

    let mut out = Vec::new();
    let mut printer = Printer::new(inspector, context, &mut out);
    printer.print_view(&view, 0, 1, Some("[3]")).unwrap();
    assert!(!printer.context().is_visited(0x1000));
    drop(printer);
    assert_eq!(String::from_utf8(out).unwrap(), "  [3]: <T_ARRAY@0x1000> length=2\n");
}

#[test]
fn test_immediate_at_top_level() {
    let backend = Heap::new().backend();
    assert_eq!(render(&backend, QNIL, &depth(3)), "<T_NIL> nil\n");
}

// ═══════════════════════════════════════════════════════════════════════
// Cycles
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_self_reference() {
    let backend = Heap::new().array(0x1000, &[0x1000]).backend();
    assert_eq!(
        render(&backend, 0x1000, &depth(5)),
        "<T_ARRAY@0x1000> length=1\n\
         \x20 [0]: <T_ARRAY@0x1000> length=1 (already seen)\n"
    );
}

#[test]
fn test_two_node_cycle_terminates() {
    let backend = Heap::new()
        .array(0x1000, &[0x2000])
        .array(0x2000, &[0x1000])
        .backend();
    assert_eq!(
        render(&backend, 0x1000, &depth(3)),
        "<T_ARRAY@0x1000> length=1\n\
         \x20 [0]: <T_ARRAY@0x2000> length=1\n\
         \x20   [0]: <T_ARRAY@0x1000> length=1 (already seen)\n"
    );
}

#[test]
fn test_shared_child_expanded_once() {
    let backend = Heap::new()
        .array(0x1000, &[0x2000, 0x2000])
        .array(0x2000, &[fix(1)])
        .backend();
    assert_eq!(
        render(&backend, 0x1000, &depth(3)),
        "<T_ARRAY@0x1000> length=2\n\
         \x20 [0]: <T_ARRAY@0x2000> length=1\n\
         \x20   [0]: <T_FIXNUM> 1\n\
         \x20 [1]: <T_ARRAY@0x2000> length=1 (already seen)\n"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Failures and limits
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_bad_child_does_not_stop_siblings() {
    let mut elements: Vec<u64> = (0..10).map(fix).collect();
    elements[4] = 0x9000;
    let backend = Heap::new().heap_array(0x1000, 0x8000, &elements).backend();
    let output = render(&backend, 0x1000, &depth(2));
    let lines: Vec<&str> = output.lines().collect();

    assert_eq!(lines.len(), 11);
    assert_eq!(lines[4], "  [3]: <T_FIXNUM> 3");
    assert_eq!(lines[5], "  [4]: <error: cannot read 16 bytes at 0x9000>");
    assert_eq!(lines[10], "  [9]: <T_FIXNUM> 9");
}

#[test]
fn test_corrupt_child_is_reported_inline() {
    let backend = Heap::new()
        .array(0x1000, &[0x2000, QTRUE])
        .words(0x2000, &[T_STRING, 0, u64::MAX, 0, 0])
        .backend();
    let output = render(&backend, 0x1000, &depth(2));
    assert_eq!(
        output,
        "<T_ARRAY@0x1000> length=2\n\
         \x20 [0]: <error: corrupt object at 0x2000: negative string length -1>\n\
         \x20 [1]: <T_TRUE> true\n"
    );
}

#[test]
fn test_garbage_hash_pointer_does_not_stop_siblings() {
    let backend = Heap::new()
        .array(0x1000, &[0x2000, fix(7)])
        .words(0x2000, &[T_HASH | (1 << 15), 0, QNIL, 2, 0, 1, 0, 1, 2, u64::MAX - 15])
        .backend();
    let output = render(&backend, 0x1000, &depth(2));
    let lines: Vec<&str> = output.lines().collect();

    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("  [0]: <error: corrupt object at 0x2000: st_table entry 1"));
    assert_eq!(lines[2], "  [1]: <T_FIXNUM> 7");
}

#[test]
fn test_truncated_collection() {
    let elements: Vec<u64> = (0..5).map(fix).collect();
    let backend = Heap::new().heap_array(0x1000, 0x8000, &elements).backend();
    let options = depth(2).with_element_limit(2);
    assert_eq!(
        render(&backend, 0x1000, &options),
        "<T_ARRAY@0x1000> length=5\n\
         \x20 [0]: <T_FIXNUM> 0\n\
         \x20 [1]: <T_FIXNUM> 1\n\
         \x20 ... 3 more\n"
    );
}

// ═══════════════════════════════════════════════════════════════════════
// Debug mode
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_debug_fields() {
    let backend = Heap::new().string(0x1000, "hi").backend();
    let options = depth(1).with_debug(true);
    assert_eq!(
        render(&backend, 0x1000, &options),
        "<T_STRING@0x1000> \"hi\" flags=0x5 klass=0x0 len=2 embedded=true\n"
    );
}

#[test]
fn test_debug_flag_names() {
    let flags = T_STRING | (1 << 11) | (1 << 13);
    let backend = Heap::new()
        .words(0x1000, &[flags, 0x7000, 3, 0x8000, 3])
        .bytes(0x8000, b"abc")
        .backend();
    let options = depth(1).with_debug(true);
    assert_eq!(
        render(&backend, 0x1000, &options),
        "<T_STRING@0x1000> \"abc\" flags=0x2805 [FREEZE] klass=0x7000 \
         len=3 embedded=false ptr=0x8000\n"
    );
}

#[test]
fn test_debug_immediate() {
    let backend = Heap::new().backend();
    let options = depth(1).with_debug(true);
    assert_eq!(render(&backend, fix(1), &options), "<T_FIXNUM> 1 bits=0x3\n");
}
