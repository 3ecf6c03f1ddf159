//! One illustrative target: a small made-up RISC-like ISA (not a literal
//! ARM/SPARC/x86 encoding), exercising every piece of the backend protocol
//! — a single general-purpose register class with one reserved register,
//! delay-slotted control flow, a constant pool for immediates too wide to
//! encode inline, and PIC-aware call-target addressing. This is the one
//! backend implementation the protocol ships (spec.md §4.10's Open
//! Question: "this crate ships exactly one").

use std::cell::RefCell;
use std::collections::HashMap;

use crate::arena::Graph;
use crate::backend::regclass::{Register, RegisterClass};
use crate::emit::format::{EmitInstr, Operand};
use crate::node::NodeId;
use crate::opcode::Opcode;
use crate::target::Target;

/// Immediates wider than this don't fit the ISA's 16-bit signed immediate
/// field and must go through the constant pool instead.
const MAX_INLINE_IMMEDIATE: i128 = i16::MAX as i128;

const REGISTER_NAMES: [&str; 8] = ["r0", "r1", "r2", "r3", "r4", "r5", "sp", "ra"];

pub struct ExampleTarget {
    classes: Vec<RegisterClass>,
    pool: RefCell<Vec<i64>>,
}

impl ExampleTarget {
    #[must_use]
    pub fn new() -> Self {
        let mode = crate::mode::predefined().iu32;
        let registers = REGISTER_NAMES
            .iter()
            .enumerate()
            .map(|(i, &name)| {
                let constraints = match name {
                    "sp" | "ra" => crate::backend::regclass::RegConstraint::RESERVED,
                    _ => crate::backend::regclass::RegConstraint::empty(),
                };
                Register { name, class: 0, class_index: i as u16, global_index: i as u16, constraints }
            })
            .collect();
        ExampleTarget { classes: vec![RegisterClass { name: "gpr", mode, registers }], pool: RefCell::new(Vec::new()) }
    }

    fn reg_of(&self, assignment: &HashMap<NodeId, u16>, v: NodeId) -> Operand {
        let idx = *assignment
            .get(&v)
            .unwrap_or_else(|| panic!("example target: no register assigned to {v}"));
        Operand::Reg(self.register_name(idx))
    }

    /// A value operand: a register if `v` has one assigned, an inline
    /// immediate if `v` is a small `Const`, or a constant-pool reference
    /// (rendered as the pool label text, standing in for a PC-relative
    /// load this illustrative target doesn't fully encode) if `v` is a
    /// `Const` too wide to inline.
    fn value_operand(&self, g: &Graph, assignment: &HashMap<NodeId, u16>, v: NodeId) -> Operand {
        if let Some(t) = g.node(v).attr.as_const() {
            if t.mode().is_int() {
                let value = t.as_i128();
                if value.abs() <= MAX_INLINE_IMMEDIATE {
                    return Operand::Imm(value as i64);
                }
                let mut pool = self.pool.borrow_mut();
                let label = format!(".LCP{}", pool.len());
                pool.push(value as i64);
                return Operand::Label(label);
            }
        }
        self.reg_of(assignment, v)
    }

    fn data_preds(g: &Graph, n: NodeId) -> Vec<NodeId> {
        g.preds(n).iter().copied().skip(1).filter(|&p| !g.is_block(p)).collect()
    }
}

impl Default for ExampleTarget {
    fn default() -> Self {
        ExampleTarget::new()
    }
}

impl Target for ExampleTarget {
    fn register_classes(&self) -> &[RegisterClass] {
        &self.classes
    }

    fn register_name(&self, global_index: u16) -> &'static str {
        REGISTER_NAMES[global_index as usize]
    }

    fn emit_instr(&self, g: &Graph, n: NodeId, assignment: &HashMap<NodeId, u16>) -> EmitInstr {
        let preds = Self::data_preds(g, n);
        let dest = || self.reg_of(assignment, n);

        match g.opcode(n) {
            Opcode::Add => EmitInstr {
                template: "add %D0, %S0, %S1",
                dests: vec![dest()],
                sources: vec![self.value_operand(g, assignment, preds[0]), self.value_operand(g, assignment, preds[1])],
                ..Default::default()
            },
            Opcode::Sub => EmitInstr {
                template: "sub %D0, %S0, %S1",
                dests: vec![dest()],
                sources: vec![self.value_operand(g, assignment, preds[0]), self.value_operand(g, assignment, preds[1])],
                ..Default::default()
            },
            Opcode::And => EmitInstr {
                template: "and %D0, %S0, %S1",
                dests: vec![dest()],
                sources: vec![self.value_operand(g, assignment, preds[0]), self.value_operand(g, assignment, preds[1])],
                ..Default::default()
            },
            Opcode::Or => EmitInstr {
                template: "or %D0, %S0, %S1",
                dests: vec![dest()],
                sources: vec![self.value_operand(g, assignment, preds[0]), self.value_operand(g, assignment, preds[1])],
                ..Default::default()
            },
            Opcode::Load => {
                // preds[0] is the memory token, preds[1] the pointer.
                let base = self.reg_of(assignment, preds[1]);
                let Operand::Reg(base_name) = base else { unreachable!() };
                EmitInstr {
                    template: "ld %D0, %M",
                    dests: vec![dest()],
                    memory: Some(Operand::Mem { base: base_name, offset: 0 }),
                    ..Default::default()
                }
            }
            Opcode::Store => {
                let base = self.reg_of(assignment, preds[1]);
                let Operand::Reg(base_name) = base else { unreachable!() };
                EmitInstr {
                    template: "st %S0, %M",
                    sources: vec![self.value_operand(g, assignment, preds[2])],
                    memory: Some(Operand::Mem { base: base_name, offset: 0 }),
                    ..Default::default()
                }
            }
            Opcode::Cond => EmitInstr {
                template: "bnez %S0, %t",
                sources: vec![self.value_operand(g, assignment, preds[0])],
                target: Some(format!(".L{}", g.preds(n)[0].index())),
                ..Default::default()
            },
            Opcode::Jmp => EmitInstr { template: "j %t", target: Some(format!(".L{}", n.index())), ..Default::default() },
            Opcode::Return => match preds.get(1) {
                Some(&value) => EmitInstr {
                    template: "ret %S0",
                    sources: vec![self.value_operand(g, assignment, value)],
                    ..Default::default()
                },
                None => EmitInstr { template: "ret", ..Default::default() },
            },
            op => panic!("example target has no emit rule for opcode {op:?}"),
        }
    }

    fn has_delay_slot(&self, op: Opcode) -> bool {
        matches!(op, Opcode::Cond | Opcode::Jmp)
    }

    fn is_branch(&self, op: Opcode) -> bool {
        matches!(op, Opcode::Cond | Opcode::Jmp | Opcode::Return)
    }

    fn prologue(&self, frame_bytes: u32) -> Vec<String> {
        vec![format!("addi sp, sp, -{frame_bytes}"), "st ra, 0(sp)".to_string()]
    }

    fn epilogue(&self, frame_bytes: u32) -> Vec<String> {
        vec!["ld ra, 0(sp)".to_string(), format!("addi sp, sp, {frame_bytes}")]
    }

    fn nop(&self) -> String {
        "nop".to_string()
    }

    fn constant_pool(&self) -> Vec<(String, i64)> {
        self.pool.borrow().iter().enumerate().map(|(i, &v)| (format!(".LCP{i}"), v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;
    use crate::node::NodeAttr;
    use crate::tarval::Tarval;

    #[test]
    fn add_renders_both_source_registers() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let a = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 1)));
        let b = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 2)));
        let add = g.alloc_raw(Opcode::Add, m, vec![bb, a, b], NodeAttr::None);

        let target = ExampleTarget::new();
        let assignment = HashMap::from([(add, 1u16)]);
        let instr = target.emit_instr(&g, add, &assignment);
        assert_eq!(crate::emit::format::render(&instr), "add r1, 1, 2");
    }

    #[test]
    fn oversized_constants_spill_into_the_pool() {
        let mut g = Graph::new("f");
        let m = predefined().is32;
        let bb = g.start_block();
        let huge = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 1 << 20)));
        let small = g.alloc_raw(Opcode::Const, m, vec![bb], NodeAttr::Const(Tarval::from_int(m, 1)));
        let add = g.alloc_raw(Opcode::Add, m, vec![bb, huge, small], NodeAttr::None);

        let target = ExampleTarget::new();
        let assignment = HashMap::from([(add, 1u16)]);
        let instr = target.emit_instr(&g, add, &assignment);
        assert_eq!(crate::emit::format::render(&instr), "add r1, .LCP0, 1");
        assert_eq!(target.constant_pool(), vec![(".LCP0".to_string(), 1 << 20)]);
    }
}
