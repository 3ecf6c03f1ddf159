//! Post-register-allocation peephole framework (component C13, spec.md
//! §4.11).
//!
//! Unlike the local peephole of C6 (which runs on SSA values before
//! register allocation and knows nothing about machine registers), this
//! framework runs after RA: a rewrite function for an opcode sees, at its
//! node's schedule position, a [`RegisterUsage`] snapshot of which
//! registers currently hold which values, and answers with either no
//! change, an in-place substitution that keeps the node's schedule slot and
//! reverse edges, or a same-block schedule-position swap (spec.md:
//! "exchange-in-place, preserving reverse edges and schedule link" /
//! "be-peephole-exchange, the target-agnostic position swap"). The scan
//! runs each block in reverse schedule order so a rewrite always sees the
//! registers live *after* the node it's examining, the natural direction
//! for "can I fold this into what comes next."

use std::collections::{HashMap, HashSet};

use crate::analyses::compute_liveness;
use crate::arena::Graph;
use crate::node::NodeId;
use crate::opcode::Opcode;
use crate::scheduler::assure_schedule;

/// A snapshot of register occupancy at one schedule point: which values are
/// still live (register-resident), and — where the allocator has already
/// run — which physical register each one occupies.
pub struct RegisterUsage<'a> {
    assignment: &'a HashMap<NodeId, u16>,
    live: &'a HashSet<NodeId>,
}

impl<'a> RegisterUsage<'a> {
    /// The physical register holding `n`'s value at this point, if `n` is
    /// live and has been assigned one.
    #[must_use]
    pub fn register_of(&self, n: NodeId) -> Option<u16> {
        self.live.contains(&n).then(|| self.assignment.get(&n).copied()).flatten()
    }

    /// The value currently occupying physical register `reg`, if any.
    #[must_use]
    pub fn holder_of(&self, reg: u16) -> Option<NodeId> {
        self.live.iter().copied().find(|n| self.assignment.get(n) == Some(&reg))
    }

    #[must_use]
    pub fn is_live(&self, n: NodeId) -> bool {
        self.live.contains(&n)
    }
}

/// What a rewrite function decided to do with the node it examined.
pub enum RewriteOutcome {
    NoChange,
    /// Replace `at` with an already-built node, keeping `at`'s schedule
    /// position and redirecting every use of `at` to the replacement.
    ExchangeInPlace(NodeId),
    /// Swap the schedule positions of two nodes in the same block
    /// (spec.md's `be_peephole_exchange`: a pure reordering, legal only
    /// when neither node's operands depend on the other).
    BePeepholeExchange(NodeId, NodeId),
}

pub type RewriteFn = fn(&mut Graph, NodeId, &RegisterUsage) -> RewriteOutcome;

/// The opcode -> rewrite-function table a target registers its post-RA
/// idioms into (spec.md §4.11: "a table from opcode to rewrite function").
#[derive(Default)]
pub struct PeepholeTable {
    rewrites: HashMap<Opcode, RewriteFn>,
}

impl PeepholeTable {
    #[must_use]
    pub fn new() -> Self {
        PeepholeTable::default()
    }

    pub fn register(&mut self, op: Opcode, f: RewriteFn) {
        self.rewrites.insert(op, f);
    }
}

fn local_data_predecessors(g: &Graph, n: NodeId, block: NodeId) -> Vec<NodeId> {
    g.preds(n)
        .iter()
        .copied()
        .skip(1)
        .filter(|&p| !g.is_block(p) && g.block_of(p) == block)
        .collect()
}

fn exchange_in_place(g: &mut Graph, order: &mut [NodeId], pos: usize, replacement: NodeId) {
    g.replace_uses(order[pos], replacement);
    order[pos] = replacement;
}

fn be_peephole_exchange(order: &mut [NodeId], a: NodeId, b: NodeId) {
    let Some(ia) = order.iter().position(|&n| n == a) else { return };
    let Some(ib) = order.iter().position(|&n| n == b) else { return };
    order.swap(ia, ib);
}

/// Run every registered rewrite over its matching opcode, scanning each
/// block's schedule in reverse, with `assignment` providing the register
/// each value has been given (supplied by whatever allocator consumed the
/// coalescing result from [`crate::backend::coalesce`]).
pub fn run(g: &mut Graph, table: &PeepholeTable, assignment: &HashMap<NodeId, u16>) {
    if table.rewrites.is_empty() {
        return;
    }
    assure_schedule(g);
    let liveness = compute_liveness(g);
    let blocks: Vec<NodeId> = g.node_ids().filter(|&b| g.is_block(b)).collect();

    for block in blocks {
        let mut order = g.schedule.as_ref().expect("assure_schedule just ran").order_of(block).to_vec();
        let mut live: HashSet<NodeId> = liveness.live_out(block).clone();

        let mut i = order.len();
        while i > 0 {
            i -= 1;
            let n = order[i];
            if let Some(&rewrite) = table.rewrites.get(&g.opcode(n)) {
                let usage = RegisterUsage { assignment, live: &live };
                match rewrite(g, n, &usage) {
                    RewriteOutcome::NoChange => {}
                    RewriteOutcome::ExchangeInPlace(replacement) => {
                        exchange_in_place(g, &mut order, i, replacement);
                    }
                    RewriteOutcome::BePeepholeExchange(a, b) => {
                        be_peephole_exchange(&mut order, a, b);
                    }
                }
            }
            live.remove(&order[i]);
            for p in local_data_predecessors(g, order[i], block) {
                live.insert(p);
            }
        }

        g.schedule.as_mut().expect("assure_schedule just ran").set_order(block, order);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;
    use crate::tarval::Tarval;

    /// `a + 0` rewrites to a bare reference to `a` — a stand-in post-RA
    /// idiom (a real target would fold a redundant move or compare-to-zero
    /// instead) that exercises `ExchangeInPlace` end to end.
    fn drop_add_zero(g: &mut Graph, n: NodeId, _usage: &RegisterUsage) -> RewriteOutcome {
        let preds = g.preds(n).to_vec();
        let lhs = preds[1];
        let rhs = preds[2];
        let is_zero_const = |g: &Graph, v: NodeId| {
            g.node(v).attr.as_const().is_some_and(|t| t.as_i128() == 0)
        };
        if is_zero_const(g, rhs) {
            RewriteOutcome::ExchangeInPlace(lhs)
        } else if is_zero_const(g, lhs) {
            RewriteOutcome::ExchangeInPlace(rhs)
        } else {
            RewriteOutcome::NoChange
        }
    }

    #[test]
    fn exchange_in_place_redirects_uses_and_keeps_the_schedule_slot() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let a = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 7)));
        let zero = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 0)));
        let add = g.alloc_raw(Opcode::Add, m, vec![bb, a, zero], NodeAttr::None);
        let user = g.alloc_raw(Opcode::Add, m, vec![bb, add, add], NodeAttr::None);

        let mut table = PeepholeTable::new();
        table.register(Opcode::Add, drop_add_zero);
        run(&mut g, &table, &HashMap::new());

        assert_eq!(g.preds(user)[1], a);
        assert_eq!(g.preds(user)[2], a);
    }
}
