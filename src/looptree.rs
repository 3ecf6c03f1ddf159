//! Loop tree (component C7, part 2).
//!
//! Natural loops are found from backedges over the dominator tree (spec.md
//! §4.6: "a backedge is a CFG edge b -> h where h dominates b"), then nested
//! by body-set inclusion into a tree. spec.md's design note replaces the
//! loop-tree child union with a tagged enum — [`LoopElement`] — rather than
//! a C-style union of `ir_node *` and `ir_loop *`.

use std::collections::{HashMap, HashSet};

use crate::arena::Graph;
use crate::dominance::assure_dominance;
use crate::node::{GraphState, NodeId};

/// Index into a [`LoopTree`]'s loop arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LoopId(u32);

/// One child of a loop: either a block directly in the loop body (not
/// nested in any sub-loop) or a nested sub-loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopElement {
    Block(NodeId),
    SubLoop(LoopId),
}

/// One natural loop: its header, nesting depth, and children (spec.md §3
/// Loop: "header block, nesting depth, child loops/blocks").
#[derive(Debug, Clone)]
pub struct Loop {
    header: NodeId,
    depth: u32,
    parent: Option<LoopId>,
    children: Vec<LoopElement>,
}

impl Loop {
    #[must_use]
    pub fn header(&self) -> NodeId {
        self.header
    }

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    #[must_use]
    pub fn parent(&self) -> Option<LoopId> {
        self.parent
    }

    #[must_use]
    pub fn children(&self) -> &[LoopElement] {
        &self.children
    }
}

/// The whole loop nesting forest for one graph, rooted at a synthetic loop
/// of depth 0 holding every block not in any real loop.
#[derive(Debug, Clone, Default)]
pub struct LoopTree {
    loops: Vec<Loop>,
    root: Option<LoopId>,
    block_loop: HashMap<NodeId, LoopId>,
}

impl LoopTree {
    #[must_use]
    pub fn root(&self) -> LoopId {
        self.root.expect("LoopTree must have a root after computation")
    }

    #[must_use]
    pub fn get(&self, id: LoopId) -> &Loop {
        &self.loops[id.0 as usize]
    }

    /// The innermost loop containing `b`, or the root if `b` is in no real
    /// loop (spec.md §4.6 "loop depth of a block").
    #[must_use]
    pub fn loop_of(&self, b: NodeId) -> LoopId {
        self.block_loop.get(&b).copied().unwrap_or_else(|| self.root())
    }

    #[must_use]
    pub fn depth_of(&self, b: NodeId) -> u32 {
        self.get(self.loop_of(b)).depth
    }

    fn push(&mut self, l: Loop) -> LoopId {
        let id = LoopId(self.loops.len() as u32);
        self.loops.push(l);
        id
    }
}

/// Computes the backedge set: CFG edges `b -> h` where `h` dominates `b`
/// (spec.md §4.6). Callers must have already run [`assure_dominance`].
fn find_backedges(g: &Graph) -> Vec<(NodeId, NodeId)> {
    let dom = g_dominance(g);
    let mut backedges = Vec::new();
    for b in g.node_ids().filter(|&id| g.is_block(id)) {
        for h in g.block_successors(b) {
            if dom.dominates(h, b) {
                backedges.push((b, h));
            }
        }
    }
    backedges
}

fn g_dominance(g: &Graph) -> crate::dominance::DomInfo {
    g.dominance.clone().expect("assure_dominance must populate Graph::dominance")
}

/// The natural loop body of backedge `b -> h`: `h` plus every block that can
/// reach `b` by walking predecessors without passing through `h` (the
/// standard reverse-BFS-stopping-at-header construction).
fn natural_loop_body(g: &Graph, header: NodeId, tail: NodeId) -> HashSet<NodeId> {
    let mut body = HashSet::new();
    body.insert(header);
    let mut stack = vec![tail];
    while let Some(b) = stack.pop() {
        if !body.insert(b) {
            continue;
        }
        for p in g.block_predecessors(b) {
            stack.push(p);
        }
    }
    body
}

/// Recompute the loop tree if `CONSISTENT_LOOPINFO` is unset (spec.md §4.6
/// "assure_loopinfo").
pub fn assure_loopinfo(g: &mut Graph) {
    if g.state.contains(GraphState::CONSISTENT_LOOPINFO) && g.loop_tree.is_some() {
        return;
    }
    tracing::debug!(graph = g.entity(), "recomputing loop tree");
    assure_dominance(g);
    g.loop_tree = Some(compute_loop_tree(g));
    g.state.insert(GraphState::CONSISTENT_LOOPINFO);
}

fn compute_loop_tree(g: &Graph) -> LoopTree {
    let backedges = find_backedges(g);

    // Merge loops sharing a header: one header can have several backedges
    // (e.g. a loop with two latch blocks); their bodies union into one loop.
    let mut bodies: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
    for (tail, header) in backedges {
        bodies
            .entry(header)
            .or_default()
            .extend(natural_loop_body(g, header, tail));
    }

    let all_blocks: Vec<NodeId> = g.node_ids().filter(|&id| g.is_block(id)).collect();

    let mut tree = LoopTree::default();
    let root_id = tree.push(Loop {
        header: g.start_block(),
        depth: 0,
        parent: None,
        children: Vec::new(),
    });
    tree.root = Some(root_id);

    // Order headers by body size, largest first, so nesting (strict subset
    // containment) can be discovered with a single linear pass: every later
    // loop either nests inside an earlier one or is disjoint from it.
    let mut headers: Vec<NodeId> = bodies.keys().copied().collect();
    headers.sort_by_key(|h| std::cmp::Reverse(bodies[h].len()));

    // parent_of_header[h] = the smallest already-placed loop whose body
    // strictly contains h's body.
    let mut loop_id_of_header: HashMap<NodeId, LoopId> = HashMap::new();
    let mut parent_chain: Vec<NodeId> = Vec::new(); // headers placed so far, outermost first

    for &h in &headers {
        let body = &bodies[&h];
        let mut parent = root_id;
        let mut depth = 1;
        for &candidate in &parent_chain {
            if bodies[&candidate].is_superset(body) && candidate != h {
                parent = loop_id_of_header[&candidate];
                depth = tree.get(parent).depth + 1;
            }
        }
        let id = tree.push(Loop {
            header: h,
            depth,
            parent: Some(parent),
            children: Vec::new(),
        });
        loop_id_of_header.insert(h, id);
        tree.loops[parent.0 as usize].children.push(LoopElement::SubLoop(id));
        parent_chain.push(h);
    }

    // Assign every block to its innermost containing loop.
    for &b in &all_blocks {
        let mut innermost: Option<NodeId> = None;
        for &h in &headers {
            if bodies[&h].contains(&b)
                && (innermost.is_none() || bodies[&h].len() < bodies[&innermost.unwrap()].len())
            {
                innermost = Some(h);
            }
        }
        match innermost {
            Some(h) => {
                let id = loop_id_of_header[&h];
                tree.block_loop.insert(b, id);
                tree.loops[id.0 as usize].children.push(LoopElement::Block(b));
            }
            None => {
                tree.block_loop.insert(b, root_id);
                tree.loops[root_id.0 as usize].children.push(LoopElement::Block(b));
            }
        }
    }

    tree
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;
    use crate::opcode::Opcode;

    /// Start -> H -> (Body -> H [backedge] | Exit) -> End.
    fn single_loop() -> Graph {
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
        g
    }

    #[test]
    fn finds_single_loop_header() {
        let mut g = single_loop();
        assure_loopinfo(&mut g);
        let tree = g.loop_tree.clone().unwrap();
        // Creation order: start_block, end_block, header, body, exit.
        let blocks: Vec<NodeId> = g.node_ids().filter(|&id| g.is_block(id)).collect();
        let header = blocks[2];
        let body = blocks[3];
        let exit = blocks[4];
        assert_eq!(tree.depth_of(header), 1);
        assert_eq!(tree.depth_of(body), 1);
        assert_eq!(tree.depth_of(exit), 0);
        assert_eq!(tree.loop_of(header), tree.loop_of(body));
    }

    #[test]
    fn start_block_is_outside_any_loop() {
        let mut g = single_loop();
        assure_loopinfo(&mut g);
        let tree = g.loop_tree.clone().unwrap();
        assert_eq!(tree.loop_of(g.start_block()), tree.root());
    }
}
