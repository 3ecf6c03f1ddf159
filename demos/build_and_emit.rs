//! Builds a tiny straight-line function, runs it through code placement
//! and scheduling, assigns registers with a trivial round-robin (a real
//! allocator would consume `firmcore::backend::coalesce`'s coloring
//! instead), and prints the assembly the illustrative target emits for it.

use std::collections::HashMap;

use firmcore::arena::Graph;
use firmcore::emit::driver::emit_function;
use firmcore::mode::predefined;
use firmcore::node::NodeAttr;
use firmcore::opcode::Opcode;
use firmcore::placement::place;
use firmcore::tarval::Tarval;
use firmcore::target::example::ExampleTarget;

/// `fn add_one() -> i32 { return 1 + 2; }`
fn build_function() -> Graph {
    let mut g = Graph::new("add_one");
    let m = predefined().is32;
    let mem = predefined().memory;
    let bb = g.start_block();

    let one = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 1)));
    let two = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 2)));
    let sum = g.alloc_raw(Opcode::Add, m, vec![bb, one, two], NodeAttr::None);
    let mem0 = g.alloc_raw(Opcode::Const, mem, vec![bb], NodeAttr::None);
    g.alloc_raw(Opcode::Return, mem, vec![bb, mem0, sum], NodeAttr::None);
    g
}

fn main() {
    let mut g = build_function();
    place(&mut g);

    let registers: [u16; 5] = [1, 2, 3, 4, 5];
    let assignment: HashMap<_, u16> = g
        .node_ids()
        .filter(|&n| !g.is_block(n) && g.opcode(n) == Opcode::Add)
        .enumerate()
        .map(|(i, n)| (n, registers[i % registers.len()]))
        .collect();

    let target = ExampleTarget::new();
    let asm = emit_function(&mut g, &target, &assignment, 16);
    println!("{asm}");
}
