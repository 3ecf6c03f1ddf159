//! Auxiliary analyses feeding the scheduler and backend (component C8):
//! node heights (a list-scheduling priority) and per-block liveness.
//!
//! Both are demand-computed and invalidated the same way as dominance/loop
//! info — through `Graph::invalidate` — though neither currently has its own
//! `GraphState` bit (spec.md only reserves bits for the four structural
//! analyses quoted in §6; heights/liveness are recomputed by their callers
//! whenever needed, same as the teacher recomputes derived caches that
//! aren't part of its own persisted state).

use std::collections::{HashMap, HashSet};

use crate::arena::Graph;
use crate::looptree::LoopTree;
use crate::node::NodeId;
use crate::opcode::Opcode;

/// Per-loop-level multiplicative weight used by [`compute_block_frequencies`]
/// (spec.md §4.10's "standard 10x per loop level" heuristic — a static
/// estimate, not a profile).
const LOOP_WEIGHT: f64 = 10.0;

/// Longest dependency-chain length from each node down to a leaf (a `Const`,
/// `Phi`, or block-pinned root), used to prioritize the scheduler's ready
/// list toward long chains first (spec.md §4.10 "schedule early/late uses
/// node height as a tie-breaker").
#[derive(Debug, Clone, Default)]
pub struct Heights {
    height: HashMap<NodeId, u32>,
}

impl Heights {
    #[must_use]
    pub fn of(&self, n: NodeId) -> u32 {
        self.height.get(&n).copied().unwrap_or(0)
    }
}

/// Compute heights for every node in `g` via memoized postorder recursion
/// over data/memory predecessors (control predecessors don't contribute:
/// a node's height reflects its computation's critical path, not the CFG).
#[must_use]
pub fn compute_heights(g: &Graph) -> Heights {
    let mut heights = Heights::default();
    let mut stack: Vec<(NodeId, bool)> = g.node_ids().map(|n| (n, false)).collect();
    let mut done: HashSet<NodeId> = HashSet::new();

    while let Some((n, expanded)) = stack.pop() {
        if done.contains(&n) {
            continue;
        }
        let data_preds = data_predecessors(g, n);
        if !expanded {
            stack.push((n, true));
            for &p in &data_preds {
                if !done.contains(&p) {
                    stack.push((p, false));
                }
            }
            continue;
        }
        let h = data_preds.iter().map(|&p| heights.of(p) + 1).max().unwrap_or(0);
        heights.height.insert(n, h);
        done.insert(n);
    }
    heights
}

/// The predecessors of `n` that represent a real data/memory dependency
/// rather than the owning-block control slot.
fn data_predecessors(g: &Graph, n: NodeId) -> Vec<NodeId> {
    if g.is_block(n) {
        return Vec::new();
    }
    g.preds(n)
        .iter()
        .copied()
        .skip(1)
        .filter(|&p| !g.is_block(p))
        .collect()
}

/// Per-block live-in/live-out value sets (spec.md §4.11's scheduler and
/// §4.12's copy coalescing both need liveness to decide legal placement).
#[derive(Debug, Clone, Default)]
pub struct LivenessInfo {
    live_in: HashMap<NodeId, HashSet<NodeId>>,
    live_out: HashMap<NodeId, HashSet<NodeId>>,
}

impl LivenessInfo {
    #[must_use]
    pub fn live_in(&self, b: NodeId) -> &HashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<HashSet<NodeId>> = std::sync::OnceLock::new();
        self.live_in.get(&b).unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    #[must_use]
    pub fn live_out(&self, b: NodeId) -> &HashSet<NodeId> {
        static EMPTY: std::sync::OnceLock<HashSet<NodeId>> = std::sync::OnceLock::new();
        self.live_out.get(&b).unwrap_or_else(|| EMPTY.get_or_init(HashSet::new))
    }

    #[must_use]
    pub fn is_live_at_block_entry(&self, b: NodeId, n: NodeId) -> bool {
        self.live_in(b).contains(&n)
    }
}

/// Classic backward dataflow fixpoint: `live_out[b] = union of live_in[s]
/// for successors s`; `live_in[b] = uses[b] union (live_out[b] - defs[b])`.
/// A value's single definition point is its own node, used outside its
/// defining block whenever some other block's node lists it as a
/// (non-block) predecessor.
#[must_use]
pub fn compute_liveness(g: &Graph) -> LivenessInfo {
    let blocks: Vec<NodeId> = g.node_ids().filter(|&id| g.is_block(id)).collect();

    let mut uses: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    let mut defs: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    for &b in &blocks {
        uses.insert(b, HashSet::new());
        defs.insert(b, HashSet::new());
    }
    for n in g.node_ids() {
        if g.is_block(n) || g.opcode(n) == Opcode::Proj {
            continue;
        }
        let owner = g.block_of(n);
        defs.get_mut(&owner).unwrap().insert(n);
        for &p in data_predecessors(g, n).iter() {
            let def_block = g.block_of(p);
            if def_block != owner {
                uses.get_mut(&owner).unwrap().insert(p);
            }
        }
    }

    let mut info = LivenessInfo::default();
    for &b in &blocks {
        info.live_in.insert(b, HashSet::new());
        info.live_out.insert(b, HashSet::new());
    }

    let mut changed = true;
    while changed {
        changed = false;
        for &b in blocks.iter().rev() {
            let mut out: HashSet<NodeId> = HashSet::new();
            for s in g.block_successors(b) {
                out.extend(info.live_in[&s].iter().copied());
            }
            let mut inn = uses[&b].clone();
            for &v in out.iter() {
                if !defs[&b].contains(&v) {
                    inn.insert(v);
                }
            }
            if out != info.live_out[&b] {
                info.live_out.insert(b, out);
                changed = true;
            }
            if inn != info.live_in[&b] {
                info.live_in.insert(b, inn);
                changed = true;
            }
        }
    }
    info
}

/// A static per-block execution-frequency estimate, relative to the entry
/// block's frequency of `1.0` (spec.md §4.10: "used to bias code placement
/// and register allocation toward the hot path without needing real profile
/// data").
#[derive(Debug, Clone, Default)]
pub struct Frequencies {
    freq: HashMap<NodeId, f64>,
}

impl Frequencies {
    #[must_use]
    pub fn of(&self, b: NodeId) -> f64 {
        self.freq.get(&b).copied().unwrap_or(1.0)
    }
}

/// Estimate each block's execution frequency as `LOOP_WEIGHT ^ depth`, where
/// `depth` is its loop nesting depth in `loops` (spec.md §4.10: "a static
/// estimate: loop nesting depth drives a multiplicative weight, the standard
/// '10x per loop level' heuristic"). This is a heuristic, not a profile —
/// it never claims to be exact, only a bias signal for later passes.
#[must_use]
pub fn compute_block_frequencies(g: &Graph, loops: &LoopTree) -> Frequencies {
    let mut freq = HashMap::new();
    for b in g.node_ids().filter(|&id| g.is_block(id)) {
        let depth = loops.depth_of(b);
        freq.insert(b, LOOP_WEIGHT.powi(depth as i32));
    }
    Frequencies { freq }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;

    fn straight_line_add() -> Graph {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let c1 = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(crate::tarval::Tarval::from_int(m, 1)));
        let c2 = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(crate::tarval::Tarval::from_int(m, 2)));
        let add = g.alloc_raw(Opcode::Add, m, vec![bb, c1, c2], NodeAttr::None);
        g.alloc_raw(Opcode::Add, m, vec![bb, add, add], NodeAttr::None);
        g
    }

    #[test]
    fn heights_grow_with_chain_depth() {
        let g = straight_line_add();
        let h = compute_heights(&g);
        let nodes: Vec<NodeId> = g.node_ids().collect();
        let c1 = nodes[4]; // start_block, start, end_block, end, c1, c2, add, add2
        let add2 = nodes[7];
        assert!(h.of(add2) > h.of(c1));
    }

    #[test]
    fn values_used_only_within_their_own_block_are_not_live_out() {
        let g = straight_line_add();
        let live = compute_liveness(&g);
        let bb = g.start_block();
        assert!(live.live_out(bb).is_empty());
    }

    #[test]
    fn loop_header_is_ten_times_hotter_than_the_entry_block() {
        use crate::looptree::assure_loopinfo;
        use crate::node::NodeAttr;

        let mut g = Graph::new("loop");
        let x = predefined().control;
        let bb = predefined().block;
        let sb = g.start_block();

        let jmp0 = g.alloc_raw(Opcode::Jmp, x, vec![sb], NodeAttr::None);
        let header = g.alloc_raw(Opcode::Block, bb, vec![jmp0], NodeAttr::None);
        g.block_info_mut(header).matured = false;
        let cond = g.alloc_raw(Opcode::Cond, predefined().tuple, vec![header, jmp0], NodeAttr::None);
        let to_body = g.alloc_raw(Opcode::Proj, x, vec![header, cond], NodeAttr::Proj(0));
        let to_exit = g.alloc_raw(Opcode::Proj, x, vec![header, cond], NodeAttr::Proj(1));
        let body = g.alloc_raw(Opcode::Block, bb, vec![to_body], NodeAttr::None);
        g.block_info_mut(body).matured = true;
        let back_jmp = g.alloc_raw(Opcode::Jmp, x, vec![body], NodeAttr::None);
        g.append_pred(header, back_jmp);
        g.block_info_mut(header).matured = true;
        let exit = g.alloc_raw(Opcode::Block, bb, vec![to_exit], NodeAttr::None);
        g.block_info_mut(exit).matured = true;
        let jmp_exit = g.alloc_raw(Opcode::Jmp, x, vec![exit], NodeAttr::None);
        g.append_pred(g.end_block(), jmp_exit);

        assure_loopinfo(&mut g);
        let loops = g.loop_tree.clone().unwrap();
        let freq = compute_block_frequencies(&g, &loops);
        assert!((freq.of(header) - 10.0 * freq.of(sb)).abs() < 1e-9);
        assert!((freq.of(exit) - freq.of(sb)).abs() < 1e-9);
    }
}
