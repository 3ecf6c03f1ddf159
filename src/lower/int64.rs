//! 64-bit integer lowering (component C9, spec.md §4.7 "64-bit integer
//! lowering"): rewrites double-word arithmetic into pairs of single-word
//! operations via carry-aware primitives when the target offers them,
//! falling back to a canonically-named library call otherwise.
//!
//! A lowered 64-bit value is represented as a `(lo, hi)` pair of
//! [`cfg.word_mode`](Int64LoweringConfig::word_mode)-moded nodes rather than
//! wired back into a single graph node of `is64`/`iu64` mode — this mirrors
//! how a real middle-end's word-pair legalizer threads a parallel value map
//! through the rest of lowering rather than reusing the original SSA value,
//! and keeps this pass from having to also rewrite every possible 64-bit
//! consumer opcode (loads, stores, calls, ...), which is out of scope here.

use std::collections::HashMap;

use crate::arena::Graph;
use crate::builder::Builder;
use crate::lower::bool_mode::materialize_cmp;
use crate::mode::Mode;
use crate::node::{NodeAttr, NodeId};
use crate::opcode::Opcode;
use crate::tarval::{Relation, Tarval};

/// What the target backend offers for double-word arithmetic.
pub struct Int64LoweringConfig {
    /// The single unsigned word mode used for each half and for carry/borrow
    /// detection (typically `iu32`).
    pub word_mode: Mode,
    /// Whether the target exposes carry-aware add/sub primitives. When
    /// `false`, every `Add`/`Sub` over a 64-bit mode also falls back to a
    /// library call, same as `Mul`/`Div` always do.
    pub has_carry_ops: bool,
}

/// The `(lo, hi)` decomposition computed for every 64-bit node this pass
/// touched, keyed by the *original* node id.
#[derive(Debug, Clone, Default)]
pub struct HighLowPairs {
    pairs: HashMap<NodeId, (NodeId, NodeId)>,
}

impl HighLowPairs {
    #[must_use]
    pub fn get(&self, n: NodeId) -> Option<(NodeId, NodeId)> {
        self.pairs.get(&n).copied()
    }
}

fn is_double_word(g: &Graph, n: NodeId) -> bool {
    let m = g.mode(n);
    m.is_int() && m.size_bits() > 32
}

fn split_const(t: &Tarval, word_mode: Mode) -> (Tarval, Tarval) {
    let v = t.as_i128();
    let lo = Tarval::from_int(word_mode, v & 0xFFFF_FFFF);
    let hi = Tarval::from_int(word_mode, (v >> 32) & 0xFFFF_FFFF);
    (lo, hi)
}

/// Canonical libcall name for a double-word operator, e.g. `__muldi3`,
/// `__divdi3` (spec.md §4.7's "canonical scheme").
fn libcall_name(opcode: Opcode, signed: bool) -> String {
    let op = match opcode {
        Opcode::Add => "add",
        Opcode::Sub => "sub",
        Opcode::Mul => "mul",
        Opcode::Shl => "ashl",
        Opcode::Shr => "lshr",
        Opcode::Shrs => "ashr",
        other => panic!("int64 lowering: no libcall scheme for {other:?}"),
    };
    let prefix = if signed { "" } else { "u" };
    format!("__{prefix}{op}di3")
}

/// Resolve `n`'s `(lo, hi)` halves, decomposing a 64-bit `Const` on the fly
/// and otherwise requiring `n` to already have been lowered (an Add/Sub this
/// same pass processed earlier, in dependency order).
fn halves(g: &Graph, pairs: &HighLowPairs, n: NodeId) -> (NodeId, NodeId) {
    if let Some(p) = pairs.get(n) {
        return p;
    }
    panic!(
        "int64 lowering: {n} ({:?}) has no (lo, hi) decomposition yet; only Const and \
         previously-lowered Add/Sub/Mul feed a double-word operator in this pass",
        g.opcode(n)
    );
}

fn materialize_const_halves(b: &mut Builder, t: &Tarval, word_mode: Mode) -> (NodeId, NodeId) {
    let (lo, hi) = split_const(t, word_mode);
    (b.new_const(lo), b.new_const(hi))
}

/// Build a `__<op>di3`/`__<op>ddi3` call, passing the operands' halves as
/// four word-mode arguments and returning a fresh pair of `Proj`-unpacked
/// word-mode results (spec.md's "library calls... whose prototypes are
/// synthesized against a user-supplied mode").
fn libcall_pair(
    b: &mut Builder,
    block: NodeId,
    opcode: Opcode,
    signed: bool,
    word_mode: Mode,
    a: (NodeId, NodeId),
    c: (NodeId, NodeId),
) -> (NodeId, NodeId) {
    let name = libcall_name(opcode, signed);
    let mem = crate::mode::predefined().memory;
    let mem0 = b.graph_mut().alloc_raw(Opcode::Const, mem, vec![block], NodeAttr::None);
    let call = b.graph_mut().alloc_raw(
        Opcode::Call,
        crate::mode::predefined().tuple,
        vec![block, mem0, a.0, a.1, c.0, c.1],
        NodeAttr::CallTarget(name),
    );
    let lo = b.graph_mut().alloc_raw(Opcode::Proj, word_mode, vec![block, call], NodeAttr::Proj(0));
    let hi = b.graph_mut().alloc_raw(Opcode::Proj, word_mode, vec![block, call], NodeAttr::Proj(1));
    (lo, hi)
}

/// Rewrite every `Add`/`Sub`/`Mul` over a double-word integer mode, in
/// dependency order, returning the `(lo, hi)` value map this pass produced.
pub fn lower_int64(g: &mut Graph, cfg: &Int64LoweringConfig) -> HighLowPairs {
    let targets = double_word_nodes_in_dependency_order(g);
    let mut b = Builder::new(g);
    let mut pairs = HighLowPairs::default();

    for n in targets {
        let opcode = b.graph().opcode(n);
        let block = b.graph().block_of(n);
        let preds: Vec<NodeId> = b.graph().preds(n)[1..].to_vec();

        let operand_halves: Vec<(NodeId, NodeId)> = preds
            .iter()
            .map(|&p| match b.graph().opcode(p) {
                Opcode::Const => {
                    let t = b.graph().node(p).attr.as_const().copied().expect("double-word Const without a Tarval");
                    materialize_const_halves(&mut b, &t, cfg.word_mode)
                }
                _ => halves(b.graph(), &pairs, p),
            })
            .collect();

        let signed = b.graph().mode(n).is_signed();
        let result = match opcode {
            Opcode::Add if cfg.has_carry_ops => {
                add_with_carry(&mut b, block, cfg.word_mode, operand_halves[0], operand_halves[1])
            }
            Opcode::Sub if cfg.has_carry_ops => {
                sub_with_borrow(&mut b, block, cfg.word_mode, operand_halves[0], operand_halves[1])
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Shl | Opcode::Shr | Opcode::Shrs => libcall_pair(
                &mut b,
                block,
                opcode,
                signed,
                cfg.word_mode,
                operand_halves[0],
                operand_halves[1],
            ),
            other => panic!("int64 lowering: unsupported double-word opcode {other:?}"),
        };
        pairs.pairs.insert(n, result);
    }

    pairs
}

fn add_with_carry(b: &mut Builder, block: NodeId, word_mode: Mode, a: (NodeId, NodeId), c: (NodeId, NodeId)) -> (NodeId, NodeId) {
    let boolean = crate::mode::predefined().boolean;
    let lo = b.new_node(block, Opcode::Add, word_mode, &[a.0, c.0], NodeAttr::None);
    // Unsigned wraparound detection: the sum is smaller than either addend
    // iff a carry occurred (`AddCC`'s flag output, spec.md's "carry-aware
    // primitives").
    let carry_bool = b.new_node(block, Opcode::Cmp, boolean, &[lo, a.0], NodeAttr::Cmp(Relation::LESS));
    let carry = materialize_cmp(b, carry_bool, word_mode);
    let hi_sum = b.new_node(block, Opcode::Add, word_mode, &[a.1, c.1], NodeAttr::None);
    let hi = b.new_node(block, Opcode::Add, word_mode, &[hi_sum, carry], NodeAttr::None);
    (lo, hi)
}

fn sub_with_borrow(b: &mut Builder, block: NodeId, word_mode: Mode, a: (NodeId, NodeId), c: (NodeId, NodeId)) -> (NodeId, NodeId) {
    let boolean = crate::mode::predefined().boolean;
    let lo = b.new_node(block, Opcode::Sub, word_mode, &[a.0, c.0], NodeAttr::None);
    // Borrow iff the unsigned minuend was smaller than the subtrahend.
    let borrow_bool = b.new_node(block, Opcode::Cmp, boolean, &[a.0, c.0], NodeAttr::Cmp(Relation::LESS));
    let borrow = materialize_cmp(b, borrow_bool, word_mode);
    let hi_diff = b.new_node(block, Opcode::Sub, word_mode, &[a.1, c.1], NodeAttr::None);
    let hi = b.new_node(block, Opcode::Sub, word_mode, &[hi_diff, borrow], NodeAttr::None);
    (lo, hi)
}

fn double_word_nodes_in_dependency_order(g: &Graph) -> Vec<NodeId> {
    let mut order = Vec::new();
    let mut done = std::collections::HashSet::new();
    let mut stack: Vec<(NodeId, bool)> = g
        .node_ids()
        .filter(|&n| is_double_word(g, n) && matches!(g.opcode(n), Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Shl | Opcode::Shr | Opcode::Shrs))
        .map(|n| (n, false))
        .collect();
    while let Some((n, expanded)) = stack.pop() {
        if done.contains(&n) {
            continue;
        }
        if !expanded {
            stack.push((n, true));
            for &p in &g.preds(n)[1..] {
                if is_double_word(g, p) && g.opcode(p) != Opcode::Const && !done.contains(&p) {
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
