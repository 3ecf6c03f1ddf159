//! Dominance (component C7, part 1).
//!
//! Cooper-Harvey-Kennedy iterative dominance over the reverse postorder of
//! reachable blocks (spec.md §4.6). Post-dominance reuses the same
//! algorithm over the reversed CFG, with an artificial End-edge added to
//! every loop header that cannot otherwise reach End (spec.md: "an
//! artificial edge from End to every infinite-loop header").

use std::collections::HashMap;

use crate::arena::Graph;
use crate::node::{GraphState, NodeId};

/// Per-block dominance (or post-dominance) bookkeeping (spec.md §3 Block
/// "a dominance record").
#[derive(Debug, Clone, Default)]
pub struct DomInfo {
    idom: HashMap<NodeId, Option<NodeId>>,
    depth: HashMap<NodeId, i32>,
    preorder: HashMap<NodeId, i32>,
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl DomInfo {
    #[must_use]
    pub fn idom(&self, b: NodeId) -> Option<NodeId> {
        self.idom.get(&b).copied().flatten()
    }

    /// -1 for unreachable blocks, per spec.md §4.6.
    #[must_use]
    pub fn depth(&self, b: NodeId) -> i32 {
        *self.depth.get(&b).unwrap_or(&-1)
    }

    #[must_use]
    pub fn preorder_number(&self, b: NodeId) -> i32 {
        *self.preorder.get(&b).unwrap_or(&-1)
    }

    #[must_use]
    pub fn children(&self, b: NodeId) -> &[NodeId] {
        self.children.get(&b).map(Vec::as_slice).unwrap_or(&[])
    }

    #[must_use]
    pub fn is_reachable(&self, b: NodeId) -> bool {
        self.depth(b) >= 0
    }

    /// Strict dominance: `a` dominates `b` and `a != b`.
    #[must_use]
    pub fn strictly_dominates(&self, a: NodeId, b: NodeId) -> bool {
        a != b && self.dominates(a, b)
    }

    /// Non-strict dominance via a depth-bounded walk up the dominator tree.
    #[must_use]
    pub fn dominates(&self, a: NodeId, b: NodeId) -> bool {
        if !self.is_reachable(a) || !self.is_reachable(b) {
            return false;
        }
        let mut cur = b;
        loop {
            if cur == a {
                return true;
            }
            match self.idom(cur) {
                Some(next) if next != cur => cur = next,
                _ => return cur == a,
            }
        }
    }

    /// Smallest common dominator of `a` and `b`, found by walking the
    /// shallower node's ancestor up to matching depth, then ascending both
    /// in lockstep (spec.md §4.6 "equal-depth descent").
    #[must_use]
    pub fn smallest_common_dominator(&self, mut a: NodeId, mut b: NodeId) -> NodeId {
        while self.depth(a) > self.depth(b) {
            a = self.idom(a).expect("reachable block must have an idom above root");
        }
        while self.depth(b) > self.depth(a) {
            b = self.idom(b).expect("reachable block must have an idom above root");
        }
        while a != b {
            a = self.idom(a).expect("dominator tree must converge at the root");
            b = self.idom(b).expect("dominator tree must converge at the root");
        }
        a
    }
}

/// Build `(rpo_order, index_of)` for the blocks reachable by following
/// `successors_of`.
fn reverse_postorder(
    entry: NodeId,
    successors_of: impl Fn(NodeId) -> Vec<NodeId>,
) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut seen = std::collections::HashSet::new();
    let mut stack = vec![(entry, false)];
    while let Some((b, processed)) = stack.pop() {
        if processed {
            order.push(b);
            continue;
        }
        if !seen.insert(b) {
            continue;
        }
        stack.push((b, true));
        for s in successors_of(b) {
            if !seen.contains(&s) {
                stack.push((s, false));
            }
        }
    }
    order.reverse();
    order
}

fn compute_generic(
    entry: NodeId,
    successors_of: impl Fn(NodeId) -> Vec<NodeId>,
    predecessors_of: impl Fn(NodeId) -> Vec<NodeId>,
) -> DomInfo {
    let rpo = reverse_postorder(entry, &successors_of);
    let index_of: HashMap<NodeId, usize> = rpo.iter().enumerate().map(|(i, &b)| (b, i)).collect();

    let mut idom: Vec<Option<usize>> = vec![None; rpo.len()];
    idom[0] = Some(0);

    let intersect = |idom: &[Option<usize>], mut a: usize, mut b: usize| -> usize {
        while a != b {
            while a > b {
                a = idom[a].unwrap();
            }
            while b > a {
                b = idom[b].unwrap();
            }
        }
        a
    };

    let mut changed = true;
    while changed {
        changed = false;
        for (i, &b) in rpo.iter().enumerate().skip(1) {
            let mut new_idom: Option<usize> = None;
            for p in predecessors_of(b) {
                let Some(&pi) = index_of.get(&p) else { continue };
                if idom[pi].is_none() {
                    continue;
                }
                new_idom = Some(match new_idom {
                    None => pi,
                    Some(cur) => intersect(&idom, cur, pi),
                });
            }
            if idom[i] != new_idom {
                idom[i] = new_idom;
                changed = true;
            }
        }
    }

    let mut info = DomInfo::default();
    for (i, &b) in rpo.iter().enumerate() {
        let idom_node = if i == 0 {
            None
        } else {
            idom[i].map(|j| rpo[j])
        };
        info.idom.insert(b, idom_node);
    }
    // Depths, by walking each reachable block's idom chain once, cached as
    // we go (simple O(n) pass since rpo order guarantees idom comes first).
    info.depth.insert(entry, 0);
    for &b in rpo.iter().skip(1) {
        if let Some(Some(id)) = info.idom.get(&b) {
            let d = *info.depth.get(id).unwrap_or(&-1);
            if d >= 0 {
                info.depth.insert(b, d + 1);
            }
        }
    }
    // Children lists.
    for &b in &rpo {
        if let Some(Some(id)) = info.idom.get(&b) {
            if *id != b {
                info.children.entry(*id).or_default().push(b);
            }
        }
    }
    // Preorder numbers via a DFS over the dominator tree from `entry`.
    let mut pre = 0;
    let mut stack = vec![entry];
    while let Some(b) = stack.pop() {
        info.preorder.insert(b, pre);
        pre += 1;
        if let Some(children) = info.children.get(&b) {
            for &c in children.iter().rev() {
                stack.push(c);
            }
        }
    }
    info
}

/// Recompute dominance if the graph's `CONSISTENT_DOMINANCE` bit is unset.
pub fn assure_dominance(g: &mut Graph) {
    if g.state.contains(GraphState::CONSISTENT_DOMINANCE) && g.dominance.is_some() {
        return;
    }
    tracing::debug!(graph = g.entity(), "recomputing dominance");
    let entry = g.start_block();
    let info = compute_generic(
        entry,
        |b| g.block_successors(b),
        |b| g.block_predecessors(b),
    );
    g.dominance = Some(info);
    g.state.insert(GraphState::CONSISTENT_DOMINANCE);
}

/// Compute post-dominance without touching `g`'s cached state. Blocks that
/// cannot reach End in the forward CFG (infinite loops with no break) are
/// attached to End via an artificial edge so the reversed walk still
/// terminates, per spec.md §4.6.
#[must_use]
pub fn compute_post_dominance(g: &Graph) -> DomInfo {
    let end = g.end_block();
    let all_blocks: Vec<NodeId> = g.node_ids().filter(|&id| g.is_block(id)).collect();

    let reaches_end: std::collections::HashSet<NodeId> = {
        let mut seen = std::collections::HashSet::new();
        let mut stack = vec![end];
        while let Some(b) = stack.pop() {
            if !seen.insert(b) {
                continue;
            }
            for p in g.block_predecessors(b) {
                stack.push(p);
            }
        }
        seen
    };

    let artificial_preds_of_end: Vec<NodeId> = all_blocks
        .iter()
        .copied()
        .filter(|b| !reaches_end.contains(b) && !g.block_successors(*b).is_empty())
        .collect();

    compute_generic(
        end,
        |b| {
            if b == end {
                artificial_preds_of_end.clone()
            } else {
                g.block_predecessors(b)
            }
        },
        |b| g.block_successors(b),
    )
}

/// Recompute and cache post-dominance on `g`.
pub fn assure_post_dominance(g: &mut Graph) -> DomInfo {
    tracing::debug!(graph = g.entity(), "recomputing post-dominance");
    let info = compute_post_dominance(g);
    g.post_dominance = Some(info.clone());
    info
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;
    use crate::opcode::Opcode;

    /// Builds Start -> B1 -> (B2 | B3) -> B4 -> End using only the raw
    /// arena API (the SSA builder lives in a higher-level module and isn't
    /// needed to exercise dominance directly).
    fn diamond() -> Graph {
        let mut g = Graph::new("diamond");
        let x = predefined().control;
        let bb = predefined().block;
        let sb = g.start_block();

        let jmp0 = g.alloc_raw(Opcode::Jmp, x, vec![sb], NodeAttr::None);
        let b1 = g.alloc_raw(Opcode::Block, bb, vec![jmp0], NodeAttr::None);
        g.block_info_mut(b1).matured = true;

        let cond = g.alloc_raw(Opcode::Cond, predefined().tuple, vec![b1, jmp0], NodeAttr::None);
        let proj_t = g.alloc_raw(Opcode::Proj, x, vec![b1, cond], NodeAttr::Proj(0));
        let proj_f = g.alloc_raw(Opcode::Proj, x, vec![b1, cond], NodeAttr::Proj(1));

        let b2 = g.alloc_raw(Opcode::Block, bb, vec![proj_t], NodeAttr::None);
        g.block_info_mut(b2).matured = true;
        let b3 = g.alloc_raw(Opcode::Block, bb, vec![proj_f], NodeAttr::None);
        g.block_info_mut(b3).matured = true;

        let jmp2 = g.alloc_raw(Opcode::Jmp, x, vec![b2], NodeAttr::None);
        let jmp3 = g.alloc_raw(Opcode::Jmp, x, vec![b3], NodeAttr::None);
        let b4 = g.alloc_raw(Opcode::Block, bb, vec![jmp2, jmp3], NodeAttr::None);
        g.block_info_mut(b4).matured = true;

        let jmp4 = g.alloc_raw(Opcode::Jmp, x, vec![b4], NodeAttr::None);
        g.append_pred(g.end_block(), jmp4);
        g
    }

    #[test]
    fn diamond_cfg_dominance() {
        let mut g = diamond();
        assure_dominance(&mut g);
        let dom = g.dominance.clone().unwrap();
        assert_eq!(dom.depth(g.start_block()), 0);
        assert!(dom.dominates(g.start_block(), g.end_block()));
        // B4's idom is B1 (both branches converge there), not B2 or B3.
        // Creation order: start_block, end_block, b1, b2, b3, b4.
        let blocks: Vec<NodeId> = g.node_ids().filter(|&id| g.is_block(id)).collect();
        let b1 = blocks[2];
        let b2 = blocks[3];
        let b4 = blocks[5];
        assert_eq!(dom.idom(b4), Some(b1));
        assert!(!dom.strictly_dominates(b2, b4));
    }

    #[test]
    fn post_dominance_of_diamond() {
        let mut g = diamond();
        let pdom = assure_post_dominance(&mut g);
        let blocks: Vec<NodeId> = g.node_ids().filter(|&id| g.is_block(id)).collect();
        let b1 = blocks[2];
        assert!(pdom.dominates(g.end_block(), b1));
    }
}
