//! The per-graph node arena and its edge-integrity contract
//! (component C3): [`Graph`] owns every [`NodeData`] for one procedure.
//!
//! Grounded on the dense-arena-plus-index-handle pattern used by
//! `cranelift-egraph`'s `Node`/`Id` pair (`other_examples/…
//! cranelift-codegen-src-egraph-node.rs`): nodes never move once allocated,
//! so a [`NodeId`] is just an index, and the whole arena is freed in one
//! shot when the `Graph` drops (spec.md §5: "Arena frees happen at graph
//! destruction").

use std::sync::atomic::{AtomicU64, Ordering};

use crate::analyses::{Heights, LivenessInfo};
use crate::dominance::DomInfo;
use crate::gvn::GvnTable;
use crate::looptree::LoopTree;
use crate::mode::{predefined, Mode};
use crate::node::{BlockInfo, GraphState, NodeAttr, NodeData, NodeId, Phase};
use crate::opcode::{Arity, Opcode};
use crate::scheduler::Schedule;

fn next_graph_id() -> u64 {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Reverse-edge (use-list) side table: `out_edges[n]` is the set of
/// `(user, input_index)` pairs pointing at node `n` (spec.md §4.3).
#[derive(Debug, Clone, Default)]
struct ReverseEdges {
    out_edges: Vec<Vec<(NodeId, usize)>>,
}

impl ReverseEdges {
    fn ensure_len(&mut self, len: usize) {
        if self.out_edges.len() < len {
            self.out_edges.resize(len, Vec::new());
        }
    }

    fn add(&mut self, target: NodeId, user: NodeId, index: usize) {
        self.ensure_len(target.index() + 1);
        self.out_edges[target.index()].push((user, index));
    }

    fn remove(&mut self, target: NodeId, user: NodeId, index: usize) {
        if let Some(v) = self.out_edges.get_mut(target.index()) {
            v.retain(|&(u, i)| !(u == user && i == index));
        }
    }
}

/// One procedure's IR (spec.md §3 "Graph").
pub struct Graph {
    id: u64,
    entity: String,
    nodes: Vec<NodeData>,
    block_info: Vec<Option<BlockInfo>>,
    pub(crate) gvn: GvnTable,
    reverse_edges: Option<ReverseEdges>,
    visited_counter: u64,
    block_visited_counter: u64,
    pub phase: Phase,
    pub state: GraphState,
    start: NodeId,
    end: NodeId,
    start_block: NodeId,
    end_block: NodeId,
    pub(crate) dominance: Option<DomInfo>,
    pub(crate) post_dominance: Option<DomInfo>,
    pub(crate) loop_tree: Option<LoopTree>,
    pub(crate) liveness: Option<LivenessInfo>,
    pub(crate) heights: Option<Heights>,
    pub(crate) schedule: Option<Schedule>,
}

impl Graph {
    /// `new_graph(entity)`: allocates Start/End blocks and the Start/End
    /// nodes that live in them (spec.md §6 front-end API).
    #[must_use]
    pub fn new(entity: impl Into<String>) -> Self {
        let id = next_graph_id();
        let mut g = Graph {
            id,
            entity: entity.into(),
            nodes: Vec::new(),
            block_info: Vec::new(),
            gvn: GvnTable::default(),
            reverse_edges: None,
            visited_counter: 0,
            block_visited_counter: 0,
            phase: Phase::Building,
            state: GraphState::empty(),
            start: NodeId(0),
            end: NodeId(0),
            start_block: NodeId(0),
            end_block: NodeId(0),
            dominance: None,
            post_dominance: None,
            loop_tree: None,
            liveness: None,
            heights: None,
            schedule: None,
        };
        let bb = predefined().block;
        let ctrl = predefined().control;
        // The start block has no control predecessors of its own.
        let start_block = g.alloc_raw(Opcode::Block, bb, vec![], NodeAttr::None);
        let start = g.alloc_raw(Opcode::Start, ctrl, vec![start_block], NodeAttr::None);
        let end_block = g.alloc_raw(Opcode::Block, bb, vec![], NodeAttr::None);
        let end = g.alloc_raw(Opcode::End, ctrl, vec![end_block], NodeAttr::None);
        g.start_block = start_block;
        g.start = start;
        g.end_block = end_block;
        g.end = end;
        g.block_info_mut(start_block).matured = true;
        g
    }

    #[must_use]
    pub fn entity(&self) -> &str {
        &self.entity
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[must_use]
    pub fn start(&self) -> NodeId {
        self.start
    }

    #[must_use]
    pub fn end(&self) -> NodeId {
        self.end
    }

    #[must_use]
    pub fn start_block(&self) -> NodeId {
        self.start_block
    }

    #[must_use]
    pub fn end_block(&self) -> NodeId {
        self.end_block
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> &NodeData {
        assert_eq!(
            self.nodes[id.index()].graph_id, self.id,
            "node {id} does not belong to this graph"
        );
        &self.nodes[id.index()]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut NodeData {
        assert_eq!(self.nodes[id.index()].graph_id, self.id);
        &mut self.nodes[id.index()]
    }

    #[must_use]
    pub fn opcode(&self, id: NodeId) -> Opcode {
        self.node(id).opcode
    }

    #[must_use]
    pub fn mode(&self, id: NodeId) -> Mode {
        self.node(id).mode
    }

    #[must_use]
    pub fn preds(&self, id: NodeId) -> &[NodeId] {
        self.node(id).preds()
    }

    #[must_use]
    pub fn block_of(&self, id: NodeId) -> NodeId {
        if self.opcode(id) == Opcode::Block {
            id
        } else {
            self.node(id).block()
        }
    }

    #[must_use]
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len() as u32).map(NodeId)
    }

    #[must_use]
    pub fn is_block(&self, id: NodeId) -> bool {
        self.opcode(id) == Opcode::Block
    }

    pub(crate) fn block_info(&self, b: NodeId) -> &BlockInfo {
        self.block_info[b.index()]
            .as_ref()
            .unwrap_or_else(|| panic!("{b} is not a Block"))
    }

    pub(crate) fn block_info_mut(&mut self, b: NodeId) -> &mut BlockInfo {
        self.block_info[b.index()]
            .as_mut()
            .unwrap_or_else(|| panic!("{b} is not a Block"))
    }

    #[must_use]
    pub fn is_matured(&self, b: NodeId) -> bool {
        self.block_info(b).matured
    }

    /// Raw node allocation used by the builder and by passes that must
    /// bypass GVN/transform (e.g. constructing a `Dummy` placeholder).
    /// Enforces invariant 1 (index 0 is a Block in this graph) for every
    /// opcode except `Block` itself, whose own "index 0" is undefined
    /// (spec.md §3 Block).
    pub fn alloc_raw(&mut self, opcode: Opcode, mode: Mode, preds: Vec<NodeId>, attr: NodeAttr) -> NodeId {
        if opcode != Opcode::Block && !preds.is_empty() {
            let block = preds[0];
            assert!(
                block.index() < self.nodes.len() && self.nodes[block.index()].opcode == Opcode::Block,
                "invariant 1 violated: predecessor 0 of a new {opcode:?} must be a Block"
            );
        }
        if let Arity::Fixed(n) = opcode.info().arity {
            let want = n as usize + if opcode == Opcode::Block { 0 } else { 1 };
            assert_eq!(
                preds.len(),
                want,
                "{opcode:?} declares fixed arity {n} but got {} predecessors",
                preds.len()
            );
        }
        let id = NodeId(self.nodes.len() as u32);
        for (i, &p) in preds.iter().enumerate() {
            assert_eq!(self.nodes[p.index()].graph_id, self.id, "cross-graph edge into input {i}");
        }
        self.nodes.push(NodeData {
            graph_id: self.id,
            opcode,
            mode,
            preds,
            deps: Vec::new(),
            visited: 0,
            attr,
        });
        self.block_info.push(if opcode == Opcode::Block {
            Some(BlockInfo::default())
        } else {
            None
        });
        if let Some(re) = &mut self.reverse_edges {
            re.ensure_len(self.nodes.len());
            let preds = self.nodes[id.index()].preds.clone();
            for (i, p) in preds.into_iter().enumerate() {
                re.add(p, id, i);
            }
        }
        id
    }

    /// `set_input(n, i, v)`: the integrity contract of spec.md §4.3 —
    /// notifies reverse edges, preserves the index-0-is-a-Block rule, and
    /// refuses to cross graphs.
    pub fn set_input(&mut self, n: NodeId, i: usize, v: NodeId) {
        assert_eq!(self.nodes[v.index()].graph_id, self.id, "set_input would cross graphs");
        if i == 0 && self.nodes[n.index()].opcode != Opcode::Block {
            assert_eq!(
                self.nodes[v.index()].opcode,
                Opcode::Block,
                "invariant 1 violated: input 0 of {n} must be a Block"
            );
        }
        let old = self.nodes[n.index()].preds[i];
        if old == v {
            return;
        }
        if let Some(re) = &mut self.reverse_edges {
            re.remove(old, n, i);
        }
        self.nodes[n.index()].preds[i] = v;
        if let Some(re) = &mut self.reverse_edges {
            re.add(v, n, i);
        }
    }

    /// Append a new predecessor to a dynamic-arity node (`Phi`, `Block`,
    /// `End`), returning its index.
    pub fn append_pred(&mut self, n: NodeId, v: NodeId) -> usize {
        assert_eq!(self.nodes[v.index()].graph_id, self.id, "append_pred would cross graphs");
        assert!(
            matches!(self.nodes[n.index()].opcode.info().arity, Arity::Dynamic | Arity::Variable),
            "{n} does not support appending predecessors"
        );
        let idx = self.nodes[n.index()].preds.len();
        self.nodes[n.index()].preds.push(v);
        if let Some(re) = &mut self.reverse_edges {
            re.add(v, n, idx);
        }
        idx
    }

    /// Enables the reverse-edge subsystem, seeding it with one walk over
    /// every existing edge (spec.md §4.3).
    pub fn enable_reverse_edges(&mut self) {
        if self.reverse_edges.is_some() {
            return;
        }
        let mut re = ReverseEdges::default();
        re.ensure_len(self.nodes.len());
        for (idx, node) in self.nodes.iter().enumerate() {
            let user = NodeId(idx as u32);
            for (i, &p) in node.preds.iter().enumerate() {
                re.add(p, user, i);
            }
        }
        self.reverse_edges = Some(re);
        self.state.insert(GraphState::CONSISTENT_OUTS);
    }

    #[must_use]
    pub fn reverse_edges_enabled(&self) -> bool {
        self.reverse_edges.is_some()
    }

    /// All `(user, input_index)` pairs reading `n`. Panics if reverse edges
    /// are not enabled — callers must `enable_reverse_edges` first.
    #[must_use]
    pub fn users(&self, n: NodeId) -> &[(NodeId, usize)] {
        self.reverse_edges
            .as_ref()
            .expect("reverse edges not enabled")
            .out_edges
            .get(n.index())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replace every use of `old` with `new` ("a node is retired by
    /// replacing all its users with a substitute", spec.md §3 Lifecycle).
    /// Uses reverse edges when available; otherwise scans every node.
    pub fn replace_uses(&mut self, old: NodeId, new: NodeId) {
        if old == new {
            return;
        }
        if self.reverse_edges.is_some() {
            let users: Vec<(NodeId, usize)> = self.users(old).to_vec();
            for (user, idx) in users {
                self.set_input(user, idx, new);
            }
        } else {
            let ids: Vec<NodeId> = self.node_ids().collect();
            for user in ids {
                let arity = self.nodes[user.index()].preds.len();
                for i in 0..arity {
                    if self.nodes[user.index()].preds[i] == old {
                        self.set_input(user, i, new);
                    }
                }
            }
        }
    }

    /// Advance the node-visited counter, "clearing" every node's mark in
    /// O(1) (spec.md §5 "visited counter (monotonic, advanced to clear mark
    /// bits)").
    pub fn next_visited(&mut self) -> u64 {
        self.visited_counter += 1;
        self.visited_counter
    }

    pub fn mark_visited(&mut self, n: NodeId, mark: u64) {
        self.nodes[n.index()].visited = mark;
    }

    #[must_use]
    pub fn is_visited(&self, n: NodeId, mark: u64) -> bool {
        self.nodes[n.index()].visited == mark
    }

    pub fn next_block_visited(&mut self) -> u64 {
        self.block_visited_counter += 1;
        self.block_visited_counter
    }

    pub fn mark_block_visited(&mut self, b: NodeId, mark: u64) {
        self.block_info_mut(b).visited = mark;
    }

    #[must_use]
    pub fn is_block_visited(&self, b: NodeId, mark: u64) -> bool {
        self.block_info(b).visited == mark
    }

    /// Invalidate analyses a pass is about to disturb. Each `assure_*`
    /// helper elsewhere recomputes lazily when its bit is missing.
    pub fn invalidate(&mut self, bits: GraphState) {
        self.state.remove(bits);
        if bits.intersects(GraphState::CONSISTENT_DOMINANCE) {
            self.dominance = None;
            self.post_dominance = None;
        }
        if bits.intersects(GraphState::CONSISTENT_LOOPINFO) {
            self.loop_tree = None;
        }
        if bits.intersects(GraphState::CONSISTENT_OUTS) {
            self.reverse_edges = None;
        }
        if bits.intersects(GraphState::SCHEDULED) {
            self.schedule = None;
        }
    }

    /// Reachable-block walk in reverse-postorder starting from Start,
    /// following the `Jmp`/`Cond`/`Switch` successor edges recorded on each
    /// block's *users* — equivalently, every non-Block node's block plus
    /// that block's control predecessors. Used throughout C7/C10/C11.
    #[must_use]
    pub fn blocks_reverse_postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::new();
        let mut seen = std::collections::HashSet::new();
        fn visit(
            g: &Graph,
            b: NodeId,
            seen: &mut std::collections::HashSet<NodeId>,
            order: &mut Vec<NodeId>,
        ) {
            if !seen.insert(b) {
                return;
            }
            for &succ in g.block_successors(b).iter() {
                visit(g, succ, seen, order);
            }
            order.push(b);
        }
        visit(self, self.start_block, &mut seen, &mut order);
        order.reverse();
        order
    }

    /// The control-flow successors of block `b`: the blocks owning every
    /// node that lists one of `b`'s control-producing nodes as a
    /// predecessor. Computed by scanning `b`'s exit node's users via a
    /// fallback full scan when reverse edges are off, matching
    /// `replace_uses`'s dual-path strategy.
    #[must_use]
    pub fn block_successors(&self, b: NodeId) -> Vec<NodeId> {
        let mut succs = Vec::new();
        for id in self.node_ids() {
            if self.opcode(id) != Opcode::Block {
                continue;
            }
            for &p in self.preds(id) {
                if p == b || (self.opcode(p) != Opcode::Block && self.block_of(p) == b) {
                    succs.push(id);
                    break;
                }
            }
        }
        succs
    }

    /// Direct control predecessors of block `b` (its own predecessor list).
    #[must_use]
    pub fn block_predecessors(&self, b: NodeId) -> Vec<NodeId> {
        self.preds(b)
            .iter()
            .map(|&p| self.block_of(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_graph_has_start_and_end() {
        let g = Graph::new("f");
        assert_eq!(g.opcode(g.start()), Opcode::Start);
        assert_eq!(g.opcode(g.end()), Opcode::End);
        assert!(g.is_matured(g.start_block()));
    }

    #[test]
    #[should_panic(expected = "invariant 1")]
    fn rejects_non_block_at_index_zero() {
        let mut g = Graph::new("f");
        let not_a_block = g.start();
        let m = predefined().is32;
        let zero = crate::tarval::Tarval::from_int(m, 0);
        g.alloc_raw(Opcode::Const, m, vec![not_a_block], NodeAttr::Const(zero));
    }

    #[test]
    fn reverse_edges_track_mutation() {
        let mut g = Graph::new("f");
        g.enable_reverse_edges();
        let m = predefined().is32;
        let bb = g.start_block();
        let c1 = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(crate::tarval::Tarval::from_int(m, 1)));
        let c2 = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(crate::tarval::Tarval::from_int(m, 2)));
        let add = g.alloc_raw(Opcode::Add, m, vec![bb, c1, c1], NodeAttr::None);
        assert_eq!(g.users(c1).len(), 2);
        g.set_input(add, 2, c2);
        assert_eq!(g.users(c1).len(), 1);
        assert_eq!(g.users(c2).len(), 1);
    }
}
