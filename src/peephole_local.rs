//! Local peephole rewrites applied on construction (component C6).
//!
//! spec.md §4.2 names five per-opcode hooks (`hash`, `attr_cmp`, `copy_attr`,
//! `identity`, `transform`); per spec.md §9's "ad hoc polymorphism" note,
//! this crate realizes them as plain `match` dispatch rather than a
//! hook-table of function pointers. `hash`/`attr_cmp` live in
//! [`crate::gvn`] (they *are* the GVN key); `identity` and `transform` live
//! here, since both only fire on construction, before a node ever reaches
//! the GVN table.

use crate::arena::Graph;
use crate::mode::Mode;
use crate::node::{NodeAttr, NodeId};
use crate::opcode::Opcode;
use crate::tarval::Tarval;

/// The outcome of canonicalizing a would-be node before it is allocated.
#[derive(Debug, Clone)]
pub enum Fold {
    /// Allocate the node as specified, with `preds` possibly reordered into
    /// canonical form (spec.md §8 "Canonicalization law").
    Node { preds: Vec<NodeId> },
    /// Don't allocate; the value is exactly an already-existing node
    /// (spec.md §4.2 `identity`, e.g. `x AND x ⇒ x`).
    Existing(NodeId),
    /// Don't allocate; the value is a compile-time constant (spec.md §4.2
    /// `transform`, constant folding). The caller builds the `Const` node.
    Constant(Tarval),
}

fn const_of(g: &Graph, n: NodeId) -> Option<Tarval> {
    g.node(n).attr.as_const().copied()
}

/// Canonicalize `(opcode, mode, preds, attr)` before allocation. `preds`
/// here is the *data* predecessor list (the block slot is not included).
#[must_use]
pub fn fold(g: &Graph, opcode: Opcode, mode: Mode, preds: &[NodeId], attr: &NodeAttr) -> Fold {
    match opcode {
        Opcode::Add | Opcode::And | Opcode::Or | Opcode::Xor | Opcode::Mul => {
            let [a, b] = [preds[0], preds[1]];
            let canon = canonicalize_commutative(a, b);
            if let (Some(ta), Some(tb)) = (const_of(g, canon[0]), const_of(g, canon[1])) {
                if let Some(t) = fold_binop_const(opcode, &ta, &tb) {
                    return Fold::Constant(t);
                }
            }
            match opcode {
                Opcode::And | Opcode::Or if canon[0] == canon[1] => Fold::Existing(canon[0]),
                Opcode::Xor if canon[0] == canon[1] => Fold::Constant(Tarval::from_int(mode, 0)),
                Opcode::Add => {
                    if let Some(t) = const_of(g, canon[1]) {
                        if t.is_zero() {
                            return Fold::Existing(canon[0]);
                        }
                    }
                    Fold::Node { preds: canon.to_vec() }
                }
                Opcode::Mul => {
                    if let Some(t) = const_of(g, canon[1]) {
                        if t.is_one() {
                            return Fold::Existing(canon[0]);
                        }
                        if t.is_zero() {
                            return Fold::Constant(Tarval::from_int(mode, 0));
                        }
                    }
                    Fold::Node { preds: canon.to_vec() }
                }
                _ => Fold::Node { preds: canon.to_vec() },
            }
        }
        Opcode::Sub => {
            let [a, b] = [preds[0], preds[1]];
            // Scenario S1: `x - x` folds to `Const 0`.
            if a == b {
                return Fold::Constant(Tarval::from_int(mode, 0));
            }
            if let (Some(ta), Some(tb)) = (const_of(g, a), const_of(g, b)) {
                return Fold::Constant(ta.sub(&tb));
            }
            if let Some(t) = const_of(g, b) {
                if t.is_zero() {
                    return Fold::Existing(a);
                }
            }
            Fold::Node { preds: preds.to_vec() }
        }
        Opcode::Not => {
            let a = preds[0];
            if g.opcode(a) == Opcode::Not {
                return Fold::Existing(g.preds(a)[1]);
            }
            Fold::Node { preds: preds.to_vec() }
        }
        Opcode::Minus => {
            let a = preds[0];
            if g.opcode(a) == Opcode::Minus {
                return Fold::Existing(g.preds(a)[1]);
            }
            if let Some(t) = const_of(g, a) {
                return Fold::Constant(Tarval::from_int(mode, 0).sub(&t));
            }
            Fold::Node { preds: preds.to_vec() }
        }
        Opcode::Cmp => {
            if let (Some(ta), Some(tb)) = (const_of(g, preds[0]), const_of(g, preds[1])) {
                let rel = attr.as_cmp().expect("Cmp node without a Relation attribute");
                let actual = ta.compare(&tb);
                let b = rel.intersects(actual);
                return Fold::Constant(Tarval::from_int(crate::mode::predefined().boolean, b as i128));
            }
            Fold::Node { preds: preds.to_vec() }
        }
        Opcode::Conv => {
            if let Some(t) = const_of(g, preds[0]) {
                return Fold::Constant(t.convert(mode));
            }
            Fold::Node { preds: preds.to_vec() }
        }
        _ => Fold::Node { preds: preds.to_vec() },
    }
}

/// Total order over `NodeId` stands in for spec.md §8's "left/right input
/// pointers satisfy a total order" canonicalization law.
fn canonicalize_commutative(a: NodeId, b: NodeId) -> [NodeId; 2] {
    if a <= b {
        [a, b]
    } else {
        [b, a]
    }
}

fn fold_binop_const(opcode: Opcode, a: &Tarval, b: &Tarval) -> Option<Tarval> {
    if !a.mode().is_int() || !b.mode().is_int() {
        return None;
    }
    let m = a.mode();
    let v = match opcode {
        Opcode::Add => a.as_i128().wrapping_add(b.as_i128()),
        Opcode::And => a.as_i128() & b.as_i128(),
        Opcode::Or => a.as_i128() | b.as_i128(),
        Opcode::Xor => a.as_i128() ^ b.as_i128(),
        Opcode::Mul => a.as_i128().wrapping_mul(b.as_i128()),
        _ => return None,
    };
    Some(Tarval::from_int(m, v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;

    #[test]
    fn x_minus_x_folds_to_zero() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let x = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 42)));
        match fold(&g, Opcode::Sub, m, &[x, x], &NodeAttr::None) {
            Fold::Constant(t) => assert!(t.is_zero()),
            other => panic!("expected a folded constant, got {other:?}"),
        }
    }

    #[test]
    fn and_with_self_is_identity() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let x = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 7)));
        match fold(&g, Opcode::And, m, &[x, x], &NodeAttr::None) {
            Fold::Existing(n) => assert_eq!(n, x),
            other => panic!("expected identity fold, got {other:?}"),
        }
    }

    #[test]
    fn double_negation_cancels() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let x = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 3)));
        let not_x = g.alloc_raw(Opcode::Not, m, vec![bb, x], NodeAttr::None);
        match fold(&g, Opcode::Not, m, &[not_x], &NodeAttr::None) {
            Fold::Existing(n) => assert_eq!(n, x),
            other => panic!("expected identity fold, got {other:?}"),
        }
    }
}
