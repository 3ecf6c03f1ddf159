//! Switch lowering (component C9, spec.md §4.7 "Switch lowering").
//!
//! Normalizes the selector to unsigned-with-minimum-zero, then picks one of
//! three realizations per case density:
//!
//! 1. **Jump table** — kept as a (normalized) `Switch` node, when the table
//!    is dense enough and large enough to be worth a table.
//! 2. **Guarded jump table** — the same, preceded by a range check branching
//!    to the default case, when the selector isn't provably in range and the
//!    client didn't allow an unguarded table.
//! 3. **If-cascade** — a binary search over pre-sorted, non-overlapping case
//!    ranges, built recursively by median split; each leaf does the
//!    "subtract range minimum, compare unsigned-≤ adjusted maximum" two-step
//!    range test spec.md names explicitly.
//!
//! Every realization is built by retargeting the *existing* successor
//! blocks' predecessor slots (see [`retarget`]) away from the original
//! `Switch`'s `Proj`s and onto freshly built control edges; the original
//! `Switch` and its `Proj`s are left allocated but orphaned once lowering
//! picks anything other than "keep the table as-is".

use std::collections::HashMap;

use crate::arena::Graph;
use crate::builder::Builder;
use crate::mode::{make_int_mode, Arithmetic, Mode};
use crate::node::{CaseRange, NodeAttr, NodeId, SwitchTable};
use crate::opcode::Opcode;
use crate::tarval::{Relation, Tarval};

pub struct SwitchLoweringConfig {
    /// Realization 1/2 only apply when `spare < jump_table_spare_threshold`.
    pub jump_table_spare_threshold: i128,
    /// ...and `case_count > small_switch_threshold`; below that, a cascade
    /// is always cheaper than a table.
    pub small_switch_threshold: usize,
    /// If the selector can't be proven in range, realization 2 (a guard)
    /// applies only when this is `true`; otherwise the cascade is used.
    pub allow_unguarded_jump_table: bool,
}

/// The unsigned mode of the same width as `m`, used for the normalized
/// selector and every range comparison (spec.md: "selector is unsigned").
fn unsigned_twin(m: Mode) -> Mode {
    if !m.is_signed() {
        return m;
    }
    make_int_mode(&format!("{}u", m.name()), Arithmetic::TwosComplement, m.size_bits(), false, m.modulo_shift())
        .expect("deriving an unsigned twin mode never hits a ModeError path")
}

/// Every existing successor edge a `Switch`'s projections feed, keyed by
/// projection number (`table.cases[i].proj`, plus `table.default_proj`):
/// the target block and the index in that block's predecessor list the
/// original `Proj` occupies.
fn successor_edges(g: &Graph, switch: NodeId, table: &SwitchTable) -> HashMap<u32, (NodeId, usize)> {
    let mut edges = HashMap::new();
    let mut proj_numbers: Vec<u32> = table.cases.iter().map(|c| c.proj).collect();
    proj_numbers.push(table.default_proj);
    for &pn in &proj_numbers {
        let proj = g
            .node_ids()
            .find(|&n| g.opcode(n) == Opcode::Proj && g.preds(n).get(1) == Some(&switch) && g.node(n).attr.as_proj() == Some(pn))
            .unwrap_or_else(|| panic!("Switch {switch} has no Proj({pn})"));
        let target = g
            .node_ids()
            .find(|&blk| g.is_block(blk) && g.preds(blk).contains(&proj))
            .unwrap_or_else(|| panic!("Proj({pn}) of {switch} feeds no block"));
        let idx = g.preds(target).iter().position(|&p| p == proj).unwrap();
        edges.insert(pn, (target, idx));
    }
    edges
}

/// Retarget `target`'s predecessor slot `idx` to `new_edge` instead of the
/// original `Switch`'s projection — the mechanism every realization below
/// uses to splice in its own control-flow shape.
fn retarget(g: &mut Graph, target: NodeId, idx: usize, new_edge: NodeId) {
    g.set_input(target, idx, new_edge);
}

/// Rewrite one `Switch` node according to `cfg`.
pub fn lower_switch(g: &mut Graph, switch: NodeId, cfg: &SwitchLoweringConfig) {
    let table = g
        .node(switch)
        .attr
        .as_switch()
        .cloned()
        .expect("lower_switch called on a non-Switch node");
    assert!(table.is_well_formed(), "Switch table has overlapping or malformed ranges");

    let edges = successor_edges(g, switch, &table);
    let min = table.cases.iter().map(|c| c.min).min().unwrap_or(0);
    let spare = table.spare();

    let block = g.block_of(switch);
    let raw_selector = g.preds(switch)[1];
    let unsigned_mode = unsigned_twin(table.selector_mode);

    let mut b = Builder::new(g);
    // Normalize: convert to the unsigned twin, then subtract the observed
    // minimum so every range starts at/above zero.
    let converted = if unsigned_mode == table.selector_mode {
        raw_selector
    } else {
        b.new_node(block, Opcode::Conv, unsigned_mode, &[raw_selector], NodeAttr::None)
    };
    let selector = if min != 0 {
        let min_const = b.new_const(Tarval::from_int(unsigned_mode, min));
        b.new_node(block, Opcode::Sub, unsigned_mode, &[converted, min_const], NodeAttr::None)
    } else {
        converted
    };
    let normalized_cases: Vec<CaseRange> = table
        .cases
        .iter()
        .map(|c| CaseRange { min: c.min - min, max: c.max - min, proj: c.proj })
        .collect();

    let use_table = spare < cfg.jump_table_spare_threshold && table.case_count() > cfg.small_switch_threshold;
    if use_table {
        build_jump_table(&mut b, block, selector, unsigned_mode, &normalized_cases, table.default_proj, cfg.allow_unguarded_jump_table, &edges);
    } else {
        let mut sorted = normalized_cases;
        sorted.sort_by_key(|c| c.min);
        let (default_target, _) = edges[&table.default_proj];
        build_cascade(&mut b, block, selector, unsigned_mode, &sorted, default_target, &edges);
    }
}

fn build_jump_table(
    b: &mut Builder,
    block: NodeId,
    selector: NodeId,
    unsigned_mode: Mode,
    cases: &[CaseRange],
    default_proj: u32,
    unguarded: bool,
    edges: &HashMap<u32, (NodeId, usize)>,
) {
    let table = SwitchTable { cases: cases.to_vec(), default_proj, selector_mode: unsigned_mode };
    let max = cases.iter().map(|c| c.max).max().unwrap_or(0);
    let ctrl = crate::mode::predefined().control;
    let bb_mode = crate::mode::predefined().block;

    let dispatch_block = if unguarded {
        block
    } else {
        // Realization 2: guard the table with an explicit range check.
        let bound = b.new_const(Tarval::from_int(unsigned_mode, max));
        let out_of_range = b.new_node(block, Opcode::Cmp, crate::mode::predefined().boolean, &[selector, bound], NodeAttr::Cmp(Relation::GREATER));
        let cond = b.graph_mut().alloc_raw(Opcode::Cond, crate::mode::predefined().tuple, vec![block, out_of_range], NodeAttr::None);
        let to_default = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![block, cond], NodeAttr::Proj(0));
        let to_table = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![block, cond], NodeAttr::Proj(1));
        let (default_target, default_idx) = edges[&default_proj];
        retarget(b.graph_mut(), default_target, default_idx, to_default);
        b.graph_mut().alloc_raw(Opcode::Block, bb_mode, vec![to_table], NodeAttr::None)
    };
    if !unguarded {
        b.graph_mut().block_info_mut(dispatch_block).matured = true;
    }

    let switch = b.graph_mut().alloc_raw(Opcode::Switch, crate::mode::predefined().tuple, vec![dispatch_block, selector], NodeAttr::Switch(table));
    for case in cases {
        let proj = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![dispatch_block, switch], NodeAttr::Proj(case.proj));
        let (target, idx) = edges[&case.proj];
        retarget(b.graph_mut(), target, idx, proj);
    }
    if unguarded {
        let default_proj_node = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![dispatch_block, switch], NodeAttr::Proj(default_proj));
        let (target, idx) = edges[&default_proj];
        retarget(b.graph_mut(), target, idx, default_proj_node);
    }
}

/// Binary search over sorted, disjoint `cases`, splitting at the median case
/// on each recursive step (spec.md: "generated recursively by median
/// split... pre-sorted by their range minima"). `default_block` is the
/// original default successor block; every leaf's range-miss path appends a
/// fresh control edge directly into it (by construction, a miss at a
/// single-case leaf has already been narrowed to "no other case applies").
fn build_cascade(
    b: &mut Builder,
    block: NodeId,
    selector: NodeId,
    unsigned_mode: Mode,
    cases: &[CaseRange],
    default_block: NodeId,
    edges: &HashMap<u32, (NodeId, usize)>,
) {
    if cases.len() == 1 {
        emit_range_test(b, block, selector, unsigned_mode, &cases[0], default_block, edges);
        return;
    }
    let mid = cases.len() / 2;
    let median = cases[mid].min;
    let median_const = b.new_const(Tarval::from_int(unsigned_mode, median));
    let lt = b.new_node(block, Opcode::Cmp, crate::mode::predefined().boolean, &[selector, median_const], NodeAttr::Cmp(Relation::LESS));
    let ctrl = crate::mode::predefined().control;
    let bb_mode = crate::mode::predefined().block;
    let cond = b.graph_mut().alloc_raw(Opcode::Cond, crate::mode::predefined().tuple, vec![block, lt], NodeAttr::None);
    let to_low = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![block, cond], NodeAttr::Proj(0));
    let to_high = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![block, cond], NodeAttr::Proj(1));
    let low_block = b.graph_mut().alloc_raw(Opcode::Block, bb_mode, vec![to_low], NodeAttr::None);
    b.graph_mut().block_info_mut(low_block).matured = true;
    let high_block = b.graph_mut().alloc_raw(Opcode::Block, bb_mode, vec![to_high], NodeAttr::None);
    b.graph_mut().block_info_mut(high_block).matured = true;

    build_cascade(b, low_block, selector, unsigned_mode, &cases[..mid], default_block, edges);
    build_cascade(b, high_block, selector, unsigned_mode, &cases[mid..], default_block, edges);
}

fn emit_range_test(
    b: &mut Builder,
    block: NodeId,
    selector: NodeId,
    unsigned_mode: Mode,
    case: &CaseRange,
    default_block: NodeId,
    edges: &HashMap<u32, (NodeId, usize)>,
) {
    // Two-step range test: `selector - min <= max - min` (unsigned),
    // matching spec.md's "subtract the range minimum, then compare
    // unsigned-≤ with the adjusted maximum".
    let min_const = b.new_const(Tarval::from_int(unsigned_mode, case.min));
    let adjusted = b.new_node(block, Opcode::Sub, unsigned_mode, &[selector, min_const], NodeAttr::None);
    let width_const = b.new_const(Tarval::from_int(unsigned_mode, case.max - case.min));
    let in_range = b.new_node(
        block,
        Opcode::Cmp,
        crate::mode::predefined().boolean,
        &[adjusted, width_const],
        NodeAttr::Cmp(Relation::LESS_EQUAL),
    );
    let ctrl = crate::mode::predefined().control;
    let bb_mode = crate::mode::predefined().block;
    let cond = b.graph_mut().alloc_raw(Opcode::Cond, crate::mode::predefined().tuple, vec![block, in_range], NodeAttr::None);
    let to_hit = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![block, cond], NodeAttr::Proj(0));
    let to_miss = b.graph_mut().alloc_raw(Opcode::Proj, ctrl, vec![block, cond], NodeAttr::Proj(1));

    let (target, idx) = edges[&case.proj];
    retarget(b.graph_mut(), target, idx, to_hit);

    // A one-case leaf's miss path goes straight to the default (there is
    // nothing left to split further at this level).
    let miss_block = b.graph_mut().alloc_raw(Opcode::Block, bb_mode, vec![to_miss], NodeAttr::None);
    b.graph_mut().block_info_mut(miss_block).matured = true;
    let jmp = b.graph_mut().alloc_raw(Opcode::Jmp, ctrl, vec![miss_block], NodeAttr::None);
    b.graph_mut().append_pred(default_block, jmp);
}
