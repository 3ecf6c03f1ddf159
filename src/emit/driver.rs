//! Emitter driver (spec.md §4.12): walk a scheduled graph block by block,
//! attach a label per block, ask the target to render each real
//! instruction, fill (or pad) branch delay slots, and splice in
//! prologue/epilogue text and the constant pool.

use std::collections::HashSet;

use crate::arena::Graph;
use crate::emit::format::render;
use crate::node::NodeId;
use crate::opcode::Opcode;
use crate::scheduler::assure_schedule;
use crate::target::Target;
use std::collections::HashMap;

fn is_pseudo(op: Opcode) -> bool {
    matches!(
        op,
        Opcode::Block | Opcode::Proj | Opcode::Phi | Opcode::Start | Opcode::End | Opcode::Const | Opcode::SymConst
    )
}

fn block_label(b: NodeId) -> String {
    format!(".L{}", b.index())
}

/// How far back from a delay-slot instruction the filler search looks
/// (spec.md "bounded-distance scan").
const DELAY_SLOT_SCAN_WINDOW: usize = 3;

/// Find and remove, from `order`, a same-block instruction suitable for
/// filling the delay slot of the (at most one) delay-slot instruction in
/// `order` — a non-branch, non-store, non-call instruction that isn't one
/// of the branch's own operands, found within a bounded window preceding
/// it. Returns `None` if no such candidate exists within the window.
fn extract_delay_slot_fill(g: &Graph, target: &dyn Target, order: &mut Vec<NodeId>) -> Option<NodeId> {
    let branch_pos = order.iter().position(|&n| target.has_delay_slot(g.opcode(n)))?;
    let branch = order[branch_pos];
    let branch_inputs: HashSet<NodeId> = g.preds(branch).iter().copied().skip(1).collect();

    let start = branch_pos.saturating_sub(DELAY_SLOT_SCAN_WINDOW);
    for i in (start..branch_pos).rev() {
        let cand = order[i];
        let op = g.opcode(cand);
        if target.is_branch(op) || target.has_delay_slot(op) || op == Opcode::Store || op == Opcode::Call {
            continue;
        }
        if branch_inputs.contains(&cand) {
            continue;
        }
        return Some(order.remove(i));
    }
    None
}

/// Emit one function's assembly text. Requires `&mut Graph` because it
/// ensures scheduling as a side effect, the same convention [`crate::placement::place`]
/// and [`crate::scheduler::assure_schedule`] itself follow.
#[must_use]
pub fn emit_function(g: &mut Graph, target: &dyn Target, assignment: &HashMap<NodeId, u16>, frame_bytes: u32) -> String {
    assure_schedule(g);
    let mut out = String::new();

    for line in target.prologue(frame_bytes) {
        out.push_str(&line);
        out.push('\n');
    }

    for block in g.blocks_reverse_postorder() {
        out.push_str(&block_label(block));
        out.push_str(":\n");

        let mut order: Vec<NodeId> = g
            .schedule
            .as_ref()
            .expect("assure_schedule just ran")
            .order_of(block)
            .iter()
            .copied()
            .filter(|&n| !is_pseudo(g.opcode(n)))
            .collect();
        let delay_fill = extract_delay_slot_fill(g, target, &mut order);

        for n in order {
            if g.opcode(n) == Opcode::Return {
                for line in target.epilogue(frame_bytes) {
                    out.push_str(&line);
                    out.push('\n');
                }
            }

            out.push_str(&render(&target.emit_instr(g, n, assignment)));
            out.push('\n');

            if target.has_delay_slot(g.opcode(n)) {
                match delay_fill {
                    Some(filler) => out.push_str(&render(&target.emit_instr(g, filler, assignment))),
                    None => out.push_str(&target.nop()),
                }
                out.push('\n');
            }
        }
    }

    let pool = target.constant_pool();
    if !pool.is_empty() {
        out.push_str(".section .rodata\n");
        for (label, value) in pool {
            out.push_str(&format!("{label}: .word {value}\n"));
        }
    }

    out
}
