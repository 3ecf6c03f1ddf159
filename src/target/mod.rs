//! Target-neutral backend protocol: the trait a concrete target implements
//! so [`crate::emit::driver`] can walk a scheduled graph and produce
//! assembly text without knowing which machine it's targeting (spec.md
//! §4.10: "this crate ships exactly one backend implementation of the
//! target protocol" — [`example`]).

pub mod example;

use std::collections::HashMap;

use crate::arena::Graph;
use crate::backend::regclass::RegisterClass;
use crate::emit::format::EmitInstr;
use crate::node::NodeId;
use crate::opcode::Opcode;

pub trait Target {
    fn register_classes(&self) -> &[RegisterClass];

    /// Name the physical register at this global index, for assembly text.
    fn register_name(&self, global_index: u16) -> &'static str;

    /// Build the instruction text template and operands for `n`, given the
    /// register assignment the allocator produced.
    fn emit_instr(&self, g: &Graph, n: NodeId, assignment: &HashMap<NodeId, u16>) -> EmitInstr;

    /// Whether an instruction of this opcode has a delay slot that must be
    /// filled (spec.md §4.12's branch-delay-slot search).
    fn has_delay_slot(&self, op: Opcode) -> bool;

    fn is_branch(&self, op: Opcode) -> bool;

    fn prologue(&self, frame_bytes: u32) -> Vec<String>;
    fn epilogue(&self, frame_bytes: u32) -> Vec<String>;

    fn nop(&self) -> String;

    /// Entries accumulated for constants too wide to fit as an immediate
    /// (spec.md §4.12's constant pool), as `(label, value)` pairs, ready to
    /// append as a data section after the function body.
    fn constant_pool(&self) -> Vec<(String, i64)>;
}
