//! Incremental SSA construction (component C4), Braun-et-al in spirit
//! (spec.md §4.4).
//!
//! [`Builder::new_node`] is also the single canonicalization choke point for
//! every non-Block/Phi node: it runs [`peephole_local::fold`] (C6) first,
//! then consults the GVN table (C5) before allocating, matching spec.md's
//! flow diagram ("built in C3 using C1/C2 and incrementally canonicalized
//! by C5/C6").

use std::collections::HashMap;

use crate::arena::Graph;
use crate::gvn;
use crate::mode::Mode;
use crate::node::{NodeAttr, NodeId};
use crate::opcode::Opcode;
use crate::peephole_local::{self, Fold};
use crate::tarval::Tarval;

/// Invoked when a local is read before ever being written in its block's
/// dominance history. The default returns a `Bad` constant in the
/// requested mode (spec.md §4.4 "Failure modes").
pub type UninitializedHandler = Box<dyn FnMut(&mut Graph, u32, Mode) -> NodeId>;

fn default_uninitialized(g: &mut Graph, _var: u32, mode: Mode) -> NodeId {
    let bb = g.start_block();
    g.alloc_raw(Opcode::Bad, mode, vec![bb], NodeAttr::None)
}

/// Per-graph SSA construction state: the `(block, variable) -> value` table
/// Braun et al. call `currentDef`, plus the uninitialized-read callback.
pub struct Builder<'g> {
    g: &'g mut Graph,
    current_def: HashMap<(NodeId, u32), NodeId>,
    uninitialized: UninitializedHandler,
}

impl<'g> Builder<'g> {
    #[must_use]
    pub fn new(g: &'g mut Graph) -> Self {
        Builder {
            g,
            current_def: HashMap::new(),
            uninitialized: Box::new(default_uninitialized),
        }
    }

    #[must_use]
    pub fn with_uninitialized_handler(g: &'g mut Graph, handler: UninitializedHandler) -> Self {
        Builder {
            g,
            current_def: HashMap::new(),
            uninitialized: handler,
        }
    }

    #[must_use]
    pub fn graph(&self) -> &Graph {
        self.g
    }

    #[must_use]
    pub fn graph_mut(&mut self) -> &mut Graph {
        self.g
    }

    /// `set_value(pos, node)`: records `node` as the current definition of
    /// local `pos` in `block`.
    pub fn set_value(&mut self, block: NodeId, var: u32, value: NodeId) {
        self.current_def.insert((block, var), value);
    }

    /// `new_value(pos, mode)`: reads local `pos`'s current value as seen
    /// from `block`.
    pub fn new_value(&mut self, block: NodeId, var: u32, mode: Mode) -> NodeId {
        if let Some(&v) = self.current_def.get(&(block, var)) {
            return v;
        }
        self.read_recursive(block, var, mode)
    }

    fn read_recursive(&mut self, block: NodeId, var: u32, mode: Mode) -> NodeId {
        let value = if !self.g.is_matured(block) {
            // Unmatured: we don't yet know all of `block`'s predecessors.
            // Insert a Phi placeholder now and complete it in `mature_block`.
            let phi = self.g.alloc_raw(Opcode::Phi, mode, vec![block], NodeAttr::None);
            self.g.block_info_mut(block).incomplete_phis.push((var, phi));
            phi
        } else {
            let preds = self.g.block_predecessors(block);
            match preds.as_slice() {
                [] => (self.uninitialized)(self.g, var, mode),
                [single] => self.new_value(*single, var, mode),
                _ => {
                    let phi = self.g.alloc_raw(Opcode::Phi, mode, vec![block], NodeAttr::None);
                    self.set_value(block, var, phi);
                    self.add_phi_operands(block, var, phi, mode)
                }
            }
        };
        self.set_value(block, var, value);
        value
    }

    /// Append one operand per control predecessor of `block`, then collapse
    /// `phi` if it turned out trivial (spec.md §4.4 "Trivial Phis... are
    /// eliminated").
    fn add_phi_operands(&mut self, block: NodeId, var: u32, phi: NodeId, mode: Mode) -> NodeId {
        let preds = self.g.block_predecessors(block);
        for pred in preds {
            let v = self.new_value(pred, var, mode);
            self.g.append_pred(phi, v);
        }
        self.try_remove_trivial_phi(phi)
    }

    /// Collapses `phi` to its single real operand when every input is
    /// either the Phi itself (a self-reference, from a loop back-edge) or
    /// one common value (spec.md §4.4).
    fn try_remove_trivial_phi(&mut self, phi: NodeId) -> NodeId {
        let operands: Vec<NodeId> = self.g.preds(phi)[1..].to_vec();
        let mut same: Option<NodeId> = None;
        for &op in &operands {
            if op == phi || Some(op) == same {
                continue;
            }
            if same.is_some() {
                return phi; // more than one distinct non-self operand: not trivial
            }
            same = Some(op);
        }
        let replacement = same.unwrap_or(phi);
        if replacement == phi {
            return phi;
        }
        self.g.replace_uses(phi, replacement);
        replacement
    }

    /// `mature_block(b)`: freezes `b`'s predecessor count and resolves
    /// every Phi placeholder created while `b` was unmatured.
    pub fn mature_block(&mut self, block: NodeId) {
        let pending = std::mem::take(&mut self.g.block_info_mut(block).incomplete_phis);
        for (var, phi) in pending {
            let mode = self.g.mode(phi);
            self.add_phi_operands(block, var, phi, mode);
        }
        self.g.block_info_mut(block).matured = true;
    }

    /// Build (or fold, or fetch from GVN) a node, the canonicalization
    /// choke point mentioned in the module doc comment. `preds` excludes
    /// the block slot.
    pub fn new_node(&mut self, block: NodeId, opcode: Opcode, mode: Mode, preds: &[NodeId], attr: NodeAttr) -> NodeId {
        match peephole_local::fold(self.g, opcode, mode, preds, &attr) {
            Fold::Existing(n) => n,
            Fold::Constant(t) => self.new_const(t),
            Fold::Node { preds: canon } => {
                if let Some(hit) = self.g.gvn.lookup(opcode, mode, &attr, &canon) {
                    return hit;
                }
                let mut full = Vec::with_capacity(canon.len() + 1);
                full.push(block);
                full.extend_from_slice(&canon);
                let id = self.g.alloc_raw(opcode, mode, full, attr.clone());
                self.g.gvn.insert(opcode, mode, &attr, &canon, id);
                id
            }
        }
    }

    /// Constants always live in the Start Block (invariant 5).
    pub fn new_const(&mut self, t: Tarval) -> NodeId {
        if let Some(hit) = self
            .g
            .gvn
            .lookup(Opcode::Const, t.mode(), &NodeAttr::Const(t), &[])
        {
            return hit;
        }
        let sb = self.g.start_block();
        let id = self.g.alloc_raw(Opcode::Const, t.mode(), vec![sb], NodeAttr::Const(t));
        self.g.gvn.insert(Opcode::Const, t.mode(), &NodeAttr::Const(t), &[], id);
        id
    }
}
