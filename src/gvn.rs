//! Identity cache / global value numbering (component C5).
//!
//! Grounded on `cranelift-egraph`'s `Node` dedup-key discipline
//! (`other_examples/… cranelift-codegen-src-egraph-node.rs`): fields that
//! don't affect semantic identity (e.g. a `Load`'s originating `Inst`, kept
//! only for trap-location bookkeeping) are excluded from the key. Here,
//! [`attr_key`] is that same "structural fields only" projection for
//! [`NodeAttr`].

use std::collections::HashMap;

use crate::mode::Mode;
use crate::node::{NodeAttr, NodeId, SymKind};
use crate::opcode::Opcode;

/// The GVN-relevant projection of a [`NodeAttr`] — `Hash`/`Eq`, unlike
/// `NodeAttr` itself (which carries an `f64` inside `Tarval`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum AttrKey {
    None,
    ConstInt(i128),
    ConstFloatBits(u64),
    ConstBad,
    Sym(bool, String),
    Cmp(u8),
    Proj(u32),
    CallTarget(String),
}

fn attr_key(attr: &NodeAttr) -> AttrKey {
    match attr {
        NodeAttr::None => AttrKey::None,
        NodeAttr::Const(t) => {
            if t.is_bad() {
                AttrKey::ConstBad
            } else if t.mode().is_float() {
                AttrKey::ConstFloatBits(t.as_f64().to_bits())
            } else {
                AttrKey::ConstInt(t.as_i128())
            }
        }
        NodeAttr::SymConst(s) => AttrKey::Sym(matches!(s.kind, SymKind::Method), s.symbol.clone()),
        NodeAttr::Cmp(r) => AttrKey::Cmp(r.bits()),
        NodeAttr::Proj(p) => AttrKey::Proj(*p),
        NodeAttr::CallTarget(s) => AttrKey::CallTarget(s.clone()),
        // Switch tables, builtins and ASM templates are carried only by
        // pinned opcodes, which never reach the GVN table; see `is_cse_eligible`.
        NodeAttr::Switch(_) | NodeAttr::Builtin(_) | NodeAttr::Asm { .. } => AttrKey::None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GvnKey {
    opcode: Opcode,
    mode: Mode,
    attr: AttrKey,
    preds: Vec<NodeId>,
}

/// The hash-cons table itself (spec.md §4.5).
#[derive(Debug, Default)]
pub struct GvnTable {
    table: HashMap<GvnKey, NodeId>,
}

/// spec.md §3 invariant 6 / §4.5: only purely functional, non-pinned nodes
/// are ever inserted.
#[must_use]
pub fn is_cse_eligible(opcode: Opcode) -> bool {
    use crate::opcode::{OpFlags, PinState};
    matches!(opcode.pin_state(), PinState::Floats) && !opcode.flags().contains(OpFlags::CSE_NEUTRAL)
}

impl GvnTable {
    fn key_for(opcode: Opcode, mode: Mode, attr: &NodeAttr, preds: &[NodeId]) -> GvnKey {
        GvnKey {
            opcode,
            mode,
            attr: attr_key(attr),
            preds: preds.to_vec(),
        }
    }

    /// Look up a structurally-identical node already in the cache.
    #[must_use]
    pub fn lookup(&self, opcode: Opcode, mode: Mode, attr: &NodeAttr, preds: &[NodeId]) -> Option<NodeId> {
        if !is_cse_eligible(opcode) {
            return None;
        }
        self.table.get(&Self::key_for(opcode, mode, attr, preds)).copied()
    }

    /// Register a freshly built node under its structural key. Callers must
    /// have already checked [`lookup`] returned `None`.
    pub fn insert(&mut self, opcode: Opcode, mode: Mode, attr: &NodeAttr, preds: &[NodeId], id: NodeId) {
        if !is_cse_eligible(opcode) {
            return;
        }
        self.table.insert(Self::key_for(opcode, mode, attr, preds), id);
    }

    /// Drop a stale entry before a node's inputs/attributes are mutated —
    /// spec.md §4.5 "when a node's inputs change, its cache entry must be
    /// invalidated before the mutation and re-registered after."
    pub fn invalidate(&mut self, opcode: Opcode, mode: Mode, attr: &NodeAttr, preds: &[NodeId]) {
        if !is_cse_eligible(opcode) {
            return;
        }
        self.table.remove(&Self::key_for(opcode, mode, attr, preds));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::tarval::Tarval;

    #[test]
    fn identical_constants_share_an_entry() {
        let mut t = GvnTable::default();
        let m = predefined().is32;
        let attr = NodeAttr::Const(Tarval::from_int(m, 7));
        let id = NodeId(0);
        assert!(t.lookup(Opcode::Const, m, &attr, &[]).is_none());
        t.insert(Opcode::Const, m, &attr, &[], id);
        assert_eq!(t.lookup(Opcode::Const, m, &attr, &[]), Some(id));
    }

    #[test]
    fn pinned_ops_bypass_the_cache() {
        let mut t = GvnTable::default();
        let m = predefined().is32;
        t.insert(Opcode::Load, m, &NodeAttr::None, &[], NodeId(3));
        assert!(t.lookup(Opcode::Load, m, &NodeAttr::None, &[]).is_none());
    }

    #[test]
    fn different_attrs_are_different_keys() {
        let mut t = GvnTable::default();
        let m = predefined().is32;
        let a = NodeAttr::Const(Tarval::from_int(m, 1));
        let b = NodeAttr::Const(Tarval::from_int(m, 2));
        t.insert(Opcode::Const, m, &a, &[], NodeId(0));
        assert!(t.lookup(Opcode::Const, m, &b, &[]).is_none());
    }
}
