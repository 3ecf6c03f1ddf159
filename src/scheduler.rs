//! Linear instruction scheduler (component C11).
//!
//! Once C10 has pinned every floating node to a block, each block still
//! holds an unordered node set; this pass picks one total order per block
//! using a ready-list discipline (spec.md §4.11): a node becomes ready once
//! every predecessor in the same block has already been scheduled, and
//! among ready nodes the one with the greatest [`Heights`] value goes first,
//! to keep long dependency chains moving and shorten overall latency.

use std::collections::{HashMap, HashSet};

use crate::analyses::{compute_heights, Heights};
use crate::arena::Graph;
use crate::node::{GraphState, NodeId};
use crate::opcode::Opcode;

/// The chosen node order for every block (spec.md §3 Block "scheduled
/// instruction list").
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    order: HashMap<NodeId, Vec<NodeId>>,
}

impl Schedule {
    #[must_use]
    pub fn order_of(&self, block: NodeId) -> &[NodeId] {
        self.order.get(&block).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Replace a block's order wholesale, for passes (the post-RA peephole
    /// framework) that reorder or substitute nodes in place after scheduling
    /// has already run.
    pub(crate) fn set_order(&mut self, block: NodeId, order: Vec<NodeId>) {
        self.order.insert(block, order);
    }
}

/// Data/memory predecessors that live in the same block as `n` — the
/// scheduling-relevant dependency edges; cross-block dependencies are
/// already satisfied by the block order itself.
fn local_preds(g: &Graph, n: NodeId, block: NodeId) -> Vec<NodeId> {
    g.preds(n)
        .iter()
        .copied()
        .skip(1)
        .filter(|&p| !g.is_block(p) && g.block_of(p) == block)
        .collect()
}

fn schedule_block(g: &Graph, block: NodeId, heights: &Heights) -> Vec<NodeId> {
    let members: Vec<NodeId> = g
        .node_ids()
        .filter(|&n| !g.is_block(n) && g.block_of(n) == block)
        .collect();

    // The node whose opcode ends the block (a Jmp/Cond/Return/Switch/End)
    // must schedule last; everything else is free to interleave.
    let (exits, rest): (Vec<NodeId>, Vec<NodeId>) = members
        .into_iter()
        .partition(|&n| g.opcode(n).is_control_flow() || g.opcode(n) == Opcode::End);

    let mut remaining_preds: HashMap<NodeId, usize> = HashMap::new();
    let mut successors: HashMap<NodeId, Vec<NodeId>> = HashMap::new();
    for &n in &rest {
        let preds = local_preds(g, n, block);
        remaining_preds.insert(n, preds.len());
        for p in preds {
            successors.entry(p).or_default().push(n);
        }
    }

    let mut ready: Vec<NodeId> = rest
        .iter()
        .copied()
        .filter(|n| remaining_preds[n] == 0)
        .collect();
    let mut scheduled: HashSet<NodeId> = HashSet::new();
    let mut order = Vec::new();

    while !ready.is_empty() {
        ready.sort_by_key(|&n| std::cmp::Reverse(heights.of(n)));
        let n = ready.remove(0);
        if !scheduled.insert(n) {
            continue;
        }
        order.push(n);
        if let Some(succs) = successors.get(&n) {
            for &s in succs {
                let left = remaining_preds.get_mut(&s).unwrap();
                *left -= 1;
                if *left == 0 {
                    ready.push(s);
                }
            }
        }
    }
    debug_assert_eq!(
        order.len(),
        rest.len(),
        "scheduler left nodes unready in block {block}: local dependency cycle?"
    );

    for e in exits {
        order.push(e);
    }
    order
}

/// Recompute the whole-graph schedule, marking `SCHEDULED` (spec.md §6).
pub fn assure_schedule(g: &mut Graph) {
    if g.state.contains(GraphState::SCHEDULED) && g.schedule.is_some() {
        return;
    }
    tracing::debug!(graph = g.entity(), "scheduling nodes within blocks");
    let heights = compute_heights(g);
    let blocks: Vec<NodeId> = g.node_ids().filter(|&id| g.is_block(id)).collect();
    let mut schedule = Schedule::default();
    for b in blocks {
        schedule.order.insert(b, schedule_block(g, b, &heights));
    }
    g.schedule = Some(schedule);
    g.state.insert(GraphState::SCHEDULED);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;

    #[test]
    fn dependencies_schedule_before_their_users() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let c1 = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(crate::tarval::Tarval::from_int(m, 1)));
        let c2 = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(crate::tarval::Tarval::from_int(m, 2)));
        let add = g.alloc_raw(Opcode::Add, m, vec![bb, c1, c2], NodeAttr::None);

        assure_schedule(&mut g);
        let schedule = g.schedule.clone().unwrap();
        let order = schedule.order_of(bb);
        let pos = |n: NodeId| order.iter().position(|&x| x == n).unwrap();
        assert!(pos(c1) < pos(add));
        assert!(pos(c2) < pos(add));
    }
}
