//! Boolean-mode lowering (component C9, spec.md §4.7 "Boolean lowering").
//!
//! Boolean mode is only ever allowed at two seams in a lowered graph: as the
//! direct output of a `Cmp` and as the selector input of a `Cond`/`Mux`
//! (spec.md §8 invariant 7). Everything else — `And`/`Or`/`Xor`/`Not`/`Phi`
//! computed over booleans — gets rewritten into ordinary integer arithmetic
//! in a caller-chosen carrier mode, with a `Cmp` materialized into a literal
//! 0/1 wherever a lowered value feeds something other than a selector.
//!
//! `Phi` is the one case that can cycle back on itself (a loop-carried
//! boolean). Per spec.md §4.7's "Dummy node... breaks the recursion", each
//! `Phi` is lowered by first allocating a placeholder [`Opcode::Dummy`] in
//! the carrier mode, recursing into the Phi's operands with that placeholder
//! already recorded as the Phi's own substitute, then retiring the
//! placeholder via `Graph::replace_uses` once the real carrier-mode `Phi` is
//! built.

use std::collections::{HashMap, HashSet};

use crate::arena::Graph;
use crate::builder::Builder;
use crate::mode::{predefined, Mode};
use crate::node::{NodeAttr, NodeId};
use crate::opcode::Opcode;
use crate::tarval::{Relation, Tarval};

/// Rewrite every boolean-mode value in `g` that isn't a direct `Cmp` result
/// into `carrier`-mode integer arithmetic, leaving `Cmp` outputs and
/// `Cond`/`Mux` selector edges untouched wherever possible (spec.md §4.7).
pub fn lower_mode_b(g: &mut Graph, carrier: Mode) {
    let boolean = predefined().boolean;

    // Cond/Mux selector edges whose source is itself a lowering target: once
    // that source is rewritten away, these edges need a regenerated boolean
    // rather than the bare carrier-mode value (invariant 7 forbids a
    // non-Cmp, non-bool value feeding a selector).
    let mut protected: HashSet<(NodeId, usize)> = HashSet::new();
    for user in g.node_ids() {
        let sel_idx = match g.opcode(user) {
            Opcode::Cond | Opcode::Mux => 1,
            _ => continue,
        };
        let sel = g.preds(user)[sel_idx];
        if g.mode(sel) == boolean && g.opcode(sel) != Opcode::Cmp {
            protected.insert((user, sel_idx));
        }
    }

    let targets: Vec<NodeId> = g
        .node_ids()
        .filter(|&n| g.mode(n) == boolean && g.opcode(n) != Opcode::Cmp)
        .collect();

    let mut b = Builder::new(g);
    let mut subst: HashMap<NodeId, NodeId> = HashMap::new();
    // Phase 1: compute every target's lowered substitute first, without
    // touching any original edge. This keeps every recursive read inside
    // `lower_bool_value` looking at the untouched original graph, so the
    // order `targets` happens to be visited in can't change the answer.
    for &n in &targets {
        lower_bool_value(&mut b, &mut subst, n, carrier);
    }
    // Phase 2: now rewire every original use site in one pass.
    for n in targets {
        let lowered = subst[&n];
        rewrite_edges_except(b.graph_mut(), n, lowered, &protected);
    }

    for (user, idx) in protected {
        let original_sel = b.graph().preds(user)[idx];
        let lowered = *subst
            .get(&original_sel)
            .expect("a protected selector's source must have been lowered");
        let zero = b.new_const(Tarval::from_int(carrier, 0));
        let block = b.graph().block_of(user);
        let cmp = b.new_node(
            block,
            Opcode::Cmp,
            boolean,
            &[lowered, zero],
            NodeAttr::Cmp(Relation::NOT_EQUAL),
        );
        b.graph_mut().set_input(user, idx, cmp);
    }

    b.graph_mut().state.insert(crate::node::GraphState::MODEB_LOWERED);
}

fn lower_bool_value(b: &mut Builder, subst: &mut HashMap<NodeId, NodeId>, n: NodeId, carrier: Mode) -> NodeId {
    if let Some(&v) = subst.get(&n) {
        return v;
    }
    let opcode = b.graph().opcode(n);
    let result = match opcode {
        Opcode::Const => {
            let t = b.graph().node(n).attr.as_const().copied().expect("bool Const without a Tarval");
            b.new_const(Tarval::from_int(carrier, if t.is_zero() { 0 } else { 1 }))
        }
        Opcode::Cmp => materialize_cmp(b, n, carrier),
        Opcode::Not => {
            let operand = b.graph().preds(n)[1];
            let lowered = lower_bool_value(b, subst, operand, carrier);
            let one = b.new_const(Tarval::from_int(carrier, 1));
            let block = b.graph().block_of(n);
            b.new_node(block, Opcode::Xor, carrier, &[lowered, one], NodeAttr::None)
        }
        Opcode::And | Opcode::Or | Opcode::Xor => {
            let preds: Vec<NodeId> = b.graph().preds(n).to_vec();
            let a = lower_bool_value(b, subst, preds[1], carrier);
            let bb = lower_bool_value(b, subst, preds[2], carrier);
            let block = b.graph().block_of(n);
            b.new_node(block, opcode, carrier, &[a, bb], NodeAttr::None)
        }
        Opcode::Phi => {
            let block = b.graph().block_of(n);
            let dummy = b.graph_mut().alloc_raw(Opcode::Dummy, carrier, vec![block], NodeAttr::None);
            subst.insert(n, dummy);
            let operands: Vec<NodeId> = b.graph().preds(n)[1..].to_vec();
            let lowered_ops: Vec<NodeId> = operands
                .iter()
                .map(|&o| lower_bool_value(b, subst, o, carrier))
                .collect();
            let mut full = vec![block];
            full.extend(lowered_ops);
            let new_phi = b.graph_mut().alloc_raw(Opcode::Phi, carrier, full, NodeAttr::None);
            b.graph_mut().replace_uses(dummy, new_phi);
            new_phi
        }
        Opcode::Mux => {
            let preds: Vec<NodeId> = b.graph().preds(n).to_vec();
            let sel = preds[1];
            let t = lower_bool_value(b, subst, preds[2], carrier);
            let f = lower_bool_value(b, subst, preds[3], carrier);
            let block = b.graph().block_of(n);
            b.new_node(block, Opcode::Mux, carrier, &[sel, t, f], NodeAttr::None)
        }
        other => panic!("lower_mode_b: unexpected boolean-mode opcode {other:?}"),
    };
    subst.insert(n, result);
    result
}

/// Turn a `Cmp` into a literal 0/1 for consumers that need an actual integer
/// rather than a selector edge: split the block on the comparison and join
/// the two outcomes with a carrier-mode `Phi` (spec.md §4.7). Shared with
/// [`crate::lower::int64`], which needs the same 0/1 materialization to
/// thread a carry/borrow bit into the next word.
pub(crate) fn materialize_cmp(b: &mut Builder, cmp: NodeId, carrier: Mode) -> NodeId {
    let home = b.graph().block_of(cmp);
    let ctrl = predefined().control;
    let bb_mode = predefined().block;

    let cond = b.graph_mut().alloc_raw(Opcode::Cond, predefined().tuple, vec![home, cmp], NodeAttr::None);
    let pt = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![home, cond], NodeAttr::Proj(0));
    let pf = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![home, cond], NodeAttr::Proj(1));
    let then_blk = b.graph_mut().alloc_raw(Opcode::Block, bb_mode, vec![pt], NodeAttr::None);
    b.graph_mut().block_info_mut(then_blk).matured = true;
    let else_blk = b.graph_mut().alloc_raw(Opcode::Block, bb_mode, vec![pf], NodeAttr::None);
    b.graph_mut().block_info_mut(else_blk).matured = true;
    let jt = b.graph_mut().alloc_raw(Opcode::Jmp, ctrl, vec![then_blk], NodeAttr::None);
    let je = b.graph_mut().alloc_raw(Opcode::Jmp, ctrl, vec![else_blk], NodeAttr::None);
    let join = b.graph_mut().alloc_raw(Opcode::Block, bb_mode, vec![jt, je], NodeAttr::None);
    b.graph_mut().block_info_mut(join).matured = true;

    let one = b.new_const(Tarval::from_int(carrier, 1));
    let zero = b.new_const(Tarval::from_int(carrier, 0));
    b.graph_mut().alloc_raw(Opcode::Phi, carrier, vec![join, one, zero], NodeAttr::None)
}

/// Like [`Graph::replace_uses`], but leaves `protected` edges pointing at
/// `old`; used while lowering runs so Cond/Mux selectors can be fixed up
/// separately once their source's final substitute is known.
fn rewrite_edges_except(g: &mut Graph, old: NodeId, new: NodeId, protected: &HashSet<(NodeId, usize)>) {
    if old == new {
        return;
    }
    let ids: Vec<NodeId> = g.node_ids().collect();
    for user in ids {
        let arity = g.preds(user).len();
        for i in 0..arity {
            if protected.contains(&(user, i)) {
                continue;
            }
            if g.preds(user)[i] == old {
                g.set_input(user, i, new);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;

    /// `a AND b` over two `Cmp` results lowers to a carrier-mode `And` over
    /// two materialized 0/1 values.
    #[test]
    fn and_of_two_comparisons_lowers_to_integer_and() {
        let mut g = Graph::new("f");
        let carrier = predefined().is32;
        let m = predefined().is32;
        let boolean = predefined().boolean;
        let sb = g.start_block();

        let x = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 1)));
        let y = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 2)));
        // Use distinct dummy comparands so neither `Cmp` folds to a constant
        // (peephole_local only folds `Cmp` when both sides are literals, and
        // here both sides are non-constant reads of `x`/`y`'s block, so the
        // raw allocation below bypasses that fold entirely, matching how a
        // real front end would emit these before any optimization pass runs).
        let cmp1 = g.alloc_raw(Opcode::Cmp, boolean, vec![sb, x, y], NodeAttr::Cmp(Relation::LESS));
        let cmp2 = g.alloc_raw(Opcode::Cmp, boolean, vec![sb, y, x], NodeAttr::Cmp(Relation::GREATER));
        let and = g.alloc_raw(Opcode::And, boolean, vec![sb, cmp1, cmp2], NodeAttr::None);
        let cond = g.alloc_raw(Opcode::Cond, predefined().tuple, vec![sb, and], NodeAttr::None);

        lower_mode_b(&mut g, carrier);

        // The rewritten selector must still be boolean-moded.
        let sel = g.preds(cond)[1];
        assert_eq!(g.mode(sel), boolean);
        assert!(g.state.contains(crate::node::GraphState::MODEB_LOWERED));
    }

    /// A loop-carried boolean Phi lowers without the builder ever seeing an
    /// unresolved self-reference (the Dummy cycle-breaking path).
    #[test]
    fn loop_carried_boolean_phi_lowers_via_dummy() {
        let mut g = Graph::new("f");
        let carrier = predefined().is32;
        let m = predefined().is32;
        let boolean = predefined().boolean;
        let x = predefined().control;
        let bb = predefined().block;
        let sb = g.start_block();

        let c_true = g.alloc_raw(Opcode::Const, boolean, vec![sb], NodeAttr::Const(Tarval::from_int(boolean, 1)));
        let jmp0 = g.alloc_raw(Opcode::Jmp, x, vec![sb], NodeAttr::None);
        let header = g.alloc_raw(Opcode::Block, bb, vec![jmp0], NodeAttr::None);
        let phi = g.alloc_raw(Opcode::Phi, boolean, vec![header, c_true], NodeAttr::None);
        let back = g.alloc_raw(Opcode::Jmp, x, vec![header], NodeAttr::None);
        g.append_pred(header, back);
        g.append_pred(phi, phi); // loop back-edge carries the Phi's own value
        g.block_info_mut(header).matured = true;

        let m_val = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 0)));
        let _mux = g.alloc_raw(Opcode::Mux, m, vec![header, phi, m_val, m_val], NodeAttr::None);

        lower_mode_b(&mut g, carrier);

        // Every Dummy placeholder allocated during lowering must have been
        // fully retired: no surviving node may still list one as an input.
        let dummies: Vec<NodeId> = g.node_ids().filter(|&n| g.opcode(n) == Opcode::Dummy).collect();
        for n in g.node_ids() {
            for &p in g.preds(n) {
                assert!(!dummies.contains(&p), "{n} still references a retired Dummy placeholder {p}");
            }
        }
    }
}
