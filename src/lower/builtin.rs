//! Builtin lowering (component C9, spec.md §4.7 "Builtin lowering").
//!
//! Every [`BuiltinKind`] except [`BuiltinKind::Prefetch`] becomes a call to a
//! runtime-library routine named from the builtin's stem plus a GCC-style
//! machine-mode suffix on the operand width (`qi`/`hi`/`si`/`di`/`ti` for
//! 8/16/32/64/128 bits), the same family `libgcc` ships (`__clzsi2`,
//! `__popcountdi2`, ...). `Prefetch` carries no result and is purely a
//! scheduling hint, so it lowers to nothing but its own memory identity.
//!
//! A target that implements a builtin natively lists it in
//! [`BuiltinLoweringConfig::exceptions`] to skip this pass for that kind.

use std::collections::HashSet;

use crate::arena::Graph;
use crate::mode::{predefined, Mode};
use crate::node::{BuiltinKind, NodeAttr, NodeId};
use crate::opcode::Opcode;

pub struct BuiltinLoweringConfig {
    /// Builtins the target backend handles natively; this pass leaves them
    /// untouched.
    pub exceptions: HashSet<BuiltinKind>,
}

fn gcc_mode_suffix(bits: u16) -> &'static str {
    match bits {
        8 => "qi",
        16 => "hi",
        32 => "si",
        64 => "di",
        128 => "ti",
        other => panic!("builtin lowering: no libgcc mode suffix for a {other}-bit operand"),
    }
}

/// `__<stem><suffix>2`, e.g. `__clzsi2`, `__popcountdi2` (spec.md's
/// "canonical name... one name per operand width").
fn libcall_name(kind: BuiltinKind, operand_mode: Mode) -> String {
    format!("__{}{}2", kind.runtime_name_stem(), gcc_mode_suffix(operand_mode.size_bits()))
}

/// The existing `Proj(proj_num)` reading `n`, if the front end already built
/// one (used to recover the result mode the original builtin promised its
/// caller, rather than guessing it from the operand).
fn existing_proj(g: &Graph, n: NodeId, proj_num: u32) -> Option<NodeId> {
    g.node_ids().find(|&p| {
        g.opcode(p) == Opcode::Proj && g.preds(p).get(1) == Some(&n) && g.node(p).attr.as_proj() == Some(proj_num)
    })
}

/// Rewrite every `Builtin` node in `g` not listed in `cfg.exceptions`.
pub fn lower_builtins(g: &mut Graph, cfg: &BuiltinLoweringConfig) {
    let targets: Vec<(NodeId, BuiltinKind)> = g
        .node_ids()
        .filter_map(|n| match g.node(n).attr {
            NodeAttr::Builtin(kind) if g.opcode(n) == Opcode::Builtin && !cfg.exceptions.contains(&kind) => Some((n, kind)),
            _ => None,
        })
        .collect();

    for (n, kind) in targets {
        if kind == BuiltinKind::Prefetch {
            lower_prefetch(g, n);
        } else {
            lower_to_libcall(g, n, kind);
        }
    }
}

/// `Prefetch` is a hint with no result; lowering it away means splicing its
/// memory input straight through to whatever read its memory output.
fn lower_prefetch(g: &mut Graph, n: NodeId) {
    let mem_in = g.preds(n)[1];
    if let Some(mem_proj) = existing_proj(g, n, 1) {
        g.replace_uses(mem_proj, mem_in);
    }
    g.replace_uses(n, mem_in);
}

fn lower_to_libcall(g: &mut Graph, n: NodeId, kind: BuiltinKind) {
    let block = g.block_of(n);
    let preds: Vec<NodeId> = g.preds(n)[1..].to_vec(); // [mem, args...]
    let operand_mode = g.mode(preds[1]);
    let name = libcall_name(kind, operand_mode);

    let mut call_preds = vec![block];
    call_preds.extend(preds);
    let tuple = predefined().tuple;
    let call = g.alloc_raw(Opcode::Call, tuple, call_preds, NodeAttr::CallTarget(name));

    let result_mode = existing_proj(g, n, 0).map_or(operand_mode, |p| g.mode(p));
    let mem_mode = predefined().memory;
    let value_proj = g.alloc_raw(Opcode::Proj, result_mode, vec![block, call], NodeAttr::Proj(0));
    let mem_proj = g.alloc_raw(Opcode::Proj, mem_mode, vec![block, call], NodeAttr::Proj(1));

    if let Some(p) = existing_proj(g, n, 0) {
        g.replace_uses(p, value_proj);
    }
    if let Some(p) = existing_proj(g, n, 1) {
        g.replace_uses(p, mem_proj);
    }
    // A builtin referenced directly (no Proj indirection at all) behaves
    // like its value output.
    g.replace_uses(n, value_proj);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tarval::Tarval;

    fn graph_with_builtin(kind: BuiltinKind) -> (Graph, NodeId) {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let mem = predefined().memory;
        let sb = g.start_block();
        let mem0 = g.alloc_raw(Opcode::Const, mem, vec![sb], NodeAttr::None);
        let x = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 42)));
        let builtin = g.alloc_raw(Opcode::Builtin, predefined().tuple, vec![sb, mem0, x], NodeAttr::Builtin(kind));
        let value = g.alloc_raw(Opcode::Proj, m, vec![sb, builtin], NodeAttr::Proj(0));
        let _use_site = g.alloc_raw(Opcode::Add, m, vec![sb, value, value], NodeAttr::None);
        (g, builtin)
    }

    #[test]
    fn clz_lowers_to_a_named_libcall() {
        let (mut g, builtin) = graph_with_builtin(BuiltinKind::Clz);
        let cfg = BuiltinLoweringConfig { exceptions: HashSet::new() };
        lower_builtins(&mut g, &cfg);
        let value_use = g
            .node_ids()
            .find(|&n| g.opcode(n) == Opcode::Proj && g.node(n).attr.as_proj() == Some(0) && g.preds(n).get(1) != Some(&builtin))
            .expect("a new value Proj must have replaced the old one");
        let call = g.preds(value_use)[1];
        assert_eq!(g.opcode(call), Opcode::Call);
        assert_eq!(g.node(call).attr, NodeAttr::CallTarget("__clzsi2".to_string()));
    }

    #[test]
    fn exception_listed_builtin_is_left_alone() {
        let (mut g, builtin) = graph_with_builtin(BuiltinKind::Popcount);
        let mut exceptions = HashSet::new();
        exceptions.insert(BuiltinKind::Popcount);
        let cfg = BuiltinLoweringConfig { exceptions };
        lower_builtins(&mut g, &cfg);
        assert_eq!(g.opcode(builtin), Opcode::Builtin);
    }

    #[test]
    fn prefetch_disappears_into_its_memory_input() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let mem = predefined().memory;
        let sb = g.start_block();
        let mem0 = g.alloc_raw(Opcode::Const, mem, vec![sb], NodeAttr::None);
        let addr = g.alloc_raw(Opcode::Const, m, vec![sb], NodeAttr::Const(Tarval::from_int(m, 0)));
        let prefetch = g.alloc_raw(Opcode::Builtin, predefined().tuple, vec![sb, mem0, addr], NodeAttr::Builtin(BuiltinKind::Prefetch));
        let mem_out = g.alloc_raw(Opcode::Proj, mem, vec![sb, prefetch], NodeAttr::Proj(1));
        let load = g.alloc_raw(Opcode::Load, m, vec![sb, mem_out, addr], NodeAttr::None);

        let cfg = BuiltinLoweringConfig { exceptions: HashSet::new() };
        lower_builtins(&mut g, &cfg);
        assert_eq!(g.preds(load)[1], mem0);
    }
}
