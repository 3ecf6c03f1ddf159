//! Full-pipeline integration test: build a small two-block function, run
//! it through placement and emission against the illustrative target, the
//! same chain `demos/build_and_emit.rs` drives for a single straight-line
//! function.

use std::collections::HashMap;

use firmcore::arena::Graph;
use firmcore::emit::driver::emit_function;
use firmcore::mode::predefined;
use firmcore::node::NodeAttr;
use firmcore::opcode::Opcode;
use firmcore::placement::place;
use firmcore::tarval::Tarval;
use firmcore::target::example::ExampleTarget;

/// Two blocks joined by an unconditional jump; the `Add` computed from two
/// Start-block constants floats until placement settles it, and its only
/// use is a `Return` in the second block.
fn build_function() -> (Graph, firmcore::node::NodeId) {
    let mut g = Graph::new("add_and_return");
    let m = predefined().is32;
    let x = predefined().control;
    let bb = predefined().block;
    let mem = predefined().memory;
    let sb = g.start_block();

    let a = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 5)));
    let bconst = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 3)));
    let sum = g.alloc_raw(Opcode::Add, m, vec![sb, a, bconst], NodeAttr::None);
    let mem0 = g.alloc_raw(Opcode::Const, mem, vec![sb], NodeAttr::None);

    let jmp = g.alloc_raw(Opcode::Jmp, x, vec![sb], NodeAttr::None);
    let tail = g.alloc_raw(Opcode::Block, bb, vec![jmp], NodeAttr::None);
    g.block_info_mut(tail).matured = true;
    g.alloc_raw(Opcode::Return, mem, vec![tail, mem0, sum], NodeAttr::None);

    (g, sum)
}

#[test]
fn two_block_function_places_the_add_in_the_tail_and_emits_one_return() {
    let (mut g, sum) = build_function();
    place(&mut g);

    // Its only use is in `tail`, and nothing forces it to stay earlier.
    let tail = g.node_ids().find(|&n| g.is_block(n) && n != g.start_block()).expect("tail block");
    assert_eq!(g.block_of(sum), tail);

    let assignment: HashMap<_, u16> = HashMap::from([(sum, 1u16)]);
    let target = ExampleTarget::new();
    let asm = emit_function(&mut g, &target, &assignment, 0);

    assert_eq!(asm.matches("ret").count(), 1);
    assert!(asm.contains("add r1, 5, 3"));
    let block_count = g.node_ids().filter(|&n| g.is_block(n)).count();
    assert!(asm.matches(".L").count() >= block_count);
}
