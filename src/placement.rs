//! Code placement (component C10): re-places floating nodes early (push
//! toward dominance roots) then late (pull out of loops), per spec.md §4.8.
//!
//! Both passes must agree on what "floating" means — [`Opcode::is_floating`]
//! is the single shared definition, reused from here and nowhere
//! redefined, matching spec.md's "correctness obligation."

use crate::arena::Graph;
use crate::dominance::{assure_dominance, DomInfo};
use crate::looptree::{assure_loopinfo, LoopTree};
use crate::node::NodeId;

fn data_predecessors(g: &Graph, n: NodeId) -> Vec<NodeId> {
    g.preds(n)
        .iter()
        .copied()
        .skip(1)
        .filter(|&p| !g.is_block(p))
        .collect()
}

/// A topological order (inputs before users) over every floating node, so
/// early placement can assume each input is already placed when it visits
/// the input's user.
fn floating_nodes_in_dependency_order(g: &Graph) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut done = std::collections::HashSet::new();
    let mut stack: Vec<(NodeId, bool)> = g
        .node_ids()
        .filter(|&n| g.opcode(n).is_floating())
        .map(|n| (n, false))
        .collect();
    while let Some((n, expanded)) = stack.pop() {
        if done.contains(&n) {
            continue;
        }
        if !expanded {
            stack.push((n, true));
            for p in data_predecessors(g, n) {
                if g.opcode(p).is_floating() && !done.contains(&p) {
                    stack.push((p, false));
                }
            }
            continue;
        }
        done.insert(n);
        order.push(n);
    }
    order
}

/// Move every floating node into the deepest dominator-tree block dominated
/// by all of its inputs' blocks. Because every input already dominates the
/// node's current block (SSA def-before-use), that deepest input block is
/// guaranteed to dominate the rest, so there is no actual "meet" to compute
/// — just a max-depth scan (spec.md §4.8 step 1).
pub fn early_placement(g: &mut Graph) {
    assure_dominance(g);
    let dom = g.dominance.clone().expect("assure_dominance must populate Graph::dominance");
    let order = floating_nodes_in_dependency_order(g);
    for n in order {
        let mut best = g.start_block();
        for p in data_predecessors(g, n) {
            let cand = g.block_of(p);
            if dom.depth(cand) > dom.depth(best) {
                best = cand;
            }
        }
        move_node(g, n, best);
    }
}

/// Every use site of `n`: for a non-Phi user, its own block; for a Phi
/// user, the control predecessor block corresponding to the operand
/// position `n` fills (spec.md §4.8: "for Phi users, the user's
/// corresponding predecessor block").
fn use_sites(g: &Graph, n: NodeId) -> Vec<NodeId> {
    let mut sites = Vec::new();
    for user in g.node_ids() {
        if g.is_block(user) {
            continue;
        }
        let preds = g.preds(user);
        for (i, &p) in preds.iter().enumerate().skip(1) {
            if p != n {
                continue;
            }
            if g.opcode(user) == crate::opcode::Opcode::Phi {
                let block_preds = g.block_predecessors(g.block_of(user));
                if let Some(&site) = block_preds.get(i - 1) {
                    sites.push(site);
                }
            } else {
                sites.push(g.block_of(user));
            }
        }
    }
    sites
}

/// Walk the dominator-tree ancestor chain from `from` up to (and including)
/// `to`, returning the one with the smallest loop depth (spec.md §4.8 step
/// 2's "pick the ancestor with the minimum loop-depth").
fn shallowest_loop_ancestor(dom: &DomInfo, loops: &LoopTree, from: NodeId, to: NodeId) -> NodeId {
    let mut best = from;
    let mut cur = from;
    loop {
        if loops.depth_of(cur) < loops.depth_of(best) {
            best = cur;
        }
        if cur == to {
            break;
        }
        match dom.idom(cur) {
            Some(next) if next != cur => cur = next,
            _ => break,
        }
    }
    best
}

/// Pull every floating node toward the loop-shallowest point between its
/// early-placed block and the smallest common dominator of its use sites
/// (spec.md §4.8 step 2). Nodes with no uses are left where early
/// placement put them.
pub fn late_placement(g: &mut Graph) {
    assure_dominance(g);
    assure_loopinfo(g);
    let dom = g.dominance.clone().expect("assure_dominance must populate Graph::dominance");
    let loops = g.loop_tree.clone().expect("assure_loopinfo must populate Graph::loop_tree");

    let nodes: Vec<NodeId> = g
        .node_ids()
        .filter(|&n| g.opcode(n).is_floating())
        .collect();
    for n in nodes {
        let sites = use_sites(g, n);
        let Some(&first) = sites.first() else { continue };
        let dca = sites[1..].iter().fold(first, |acc, &s| dom.smallest_common_dominator(acc, s));
        let early = g.block_of(n);
        if !dom.dominates(early, dca) {
            // Use sites disagree with the early placement (shouldn't
            // happen for a well-formed graph); leave the node alone.
            continue;
        }
        let target = shallowest_loop_ancestor(&dom, &loops, dca, early);
        move_node(g, n, target);
    }
}

pub fn place(g: &mut Graph) {
    early_placement(g);
    late_placement(g);
}

fn move_node(g: &mut Graph, n: NodeId, block: NodeId) {
    if g.block_of(n) == block {
        return;
    }
    g.set_input(n, 0, block);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;
    use crate::opcode::Opcode;
    use crate::tarval::Tarval;

    /// Start -> Loop(header <-> body) -> Exit, with a floating `Add` whose
    /// only use is in Exit: early placement puts it in Start (both its
    /// inputs are Start-block constants); late placement then pulls it
    /// forward to Exit, the block closest to its use, since Exit is no
    /// deeper in the loop nest than Start.
    #[test]
    fn floating_value_is_pulled_to_its_use_site_when_loop_depth_allows() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let x = predefined().control;
        let bb = predefined().block;
        let sb = g.start_block();

        let c1 = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 1)));
        let c2 = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 2)));
        let add = g.alloc_raw(Opcode::Add, m, vec![sb, c1, c2], NodeAttr::None);

        let jmp0 = g.alloc_raw(Opcode::Jmp, x, vec![sb], NodeAttr::None);
        let header = g.alloc_raw(Opcode::Block, bb, vec![jmp0], NodeAttr::None);
        g.block_info_mut(header).matured = false;
        let cond = g.alloc_raw(Opcode::Cond, predefined().tuple, vec![header, jmp0], NodeAttr::None);
        let to_body = g.alloc_raw(Opcode::Proj, x, vec![header, cond], NodeAttr::Proj(0));
        let to_exit = g.alloc_raw(Opcode::Proj, x, vec![header, cond], NodeAttr::Proj(1));
        let body = g.alloc_raw(Opcode::Block, bb, vec![to_body], NodeAttr::None);
        g.block_info_mut(body).matured = true;
        let back = g.alloc_raw(Opcode::Jmp, x, vec![body], NodeAttr::None);
        g.append_pred(header, back);
        g.block_info_mut(header).matured = true;
        let exit = g.alloc_raw(Opcode::Block, bb, vec![to_exit], NodeAttr::None);
        g.block_info_mut(exit).matured = true;

        // `add`'s only use is a Return-like Store in `exit`.
        let mem = predefined().memory;
        let ptr = g.alloc_raw(Opcode::Const, predefined().pointer, vec![sb], NodeAttr::Const(Tarval::from_int(predefined().pointer, 0)));
        let mem0 = g.alloc_raw(Opcode::Const, mem, vec![sb], NodeAttr::None);
        g.alloc_raw(Opcode::Store, mem, vec![exit, mem0, ptr, add], NodeAttr::None);

        place(&mut g);
        assert_eq!(g.block_of(add), exit);
    }
}
