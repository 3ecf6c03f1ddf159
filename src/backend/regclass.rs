//! Register classes and per-node register requirements (spec.md §4.10,
//! first paragraph).
//!
//! A [`RegisterClass`] is the set of interchangeable physical registers a
//! value of some [`Mode`] can live in. A [`RegRequirement`] is what a node's
//! input or output demands from the allocator: "either a class, a limited
//! set (a bitset of admissible registers), a 'same as input i' constraint,
//! or an alignment/width constraint for wide values" (spec.md §4.10).

use crate::mode::Mode;

bitflags::bitflags! {
    /// Per-register constraint bits (spec.md §4.10 "constraint bitset").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RegConstraint: u8 {
        /// Reserved by the ABI/runtime (stack pointer, frame pointer, ...);
        /// never handed out by the allocator.
        const RESERVED     = 1 << 0;
        /// Caller-saved: a live value must be spilled or copied across calls.
        const CALLER_SAVED = 1 << 1;
        /// Callee-saved: the callee must restore it before returning.
        const CALLEE_SAVED = 1 << 2;
    }
}

/// One physical register (spec.md §4.10: "{name, class, index, class-index,
/// global-index, constraint bitset}").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Register {
    pub name: &'static str,
    /// Index of the owning [`RegisterClass`] in the target's class table.
    pub class: usize,
    /// Position of this register within its own class.
    pub class_index: u16,
    /// Position of this register across every class (used by MemPerm and
    /// the coalescer, which reason about registers independent of class).
    pub global_index: u16,
    pub constraints: RegConstraint,
}

impl Register {
    #[must_use]
    pub fn is_allocatable(&self) -> bool {
        !self.constraints.contains(RegConstraint::RESERVED)
    }
}

/// A register class: {name, registers, mode, allocatable-subset} (spec.md
/// §4.10).
#[derive(Debug, Clone)]
pub struct RegisterClass {
    pub name: &'static str,
    pub mode: Mode,
    pub registers: Vec<Register>,
}

impl RegisterClass {
    #[must_use]
    pub fn register(&self, class_index: u16) -> &Register {
        &self.registers[class_index as usize]
    }

    /// The subset of `registers` the allocator may actually assign (spec.md
    /// §4.10 "allocatable-subset").
    pub fn allocatable(&self) -> impl Iterator<Item = &Register> {
        self.registers.iter().filter(|r| r.is_allocatable())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }
}

/// A register requirement placed on one input or output slot of a node
/// (spec.md §4.10).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegRequirement {
    /// Any allocatable register in this class.
    Class(usize),
    /// Only these specific registers, named by global index.
    Limited { class: usize, admissible: Vec<u16> },
    /// Must be assigned the same register as input `usize`.
    SameAsInput(usize),
    /// A wide value spanning `width` consecutive registers of this class,
    /// starting on an `alignment`-register boundary.
    WideAligned { class: usize, width: u8, alignment: u8 },
}

impl RegRequirement {
    /// Whether `reg` satisfies this requirement in isolation. `SameAsInput`
    /// can't be checked this way — it depends on what the allocator picks
    /// for another slot, so callers must resolve it separately once that
    /// slot is assigned.
    #[must_use]
    pub fn admits(&self, reg: &Register) -> bool {
        match self {
            RegRequirement::Class(c) => reg.class == *c,
            RegRequirement::Limited { class, admissible } => {
                reg.class == *class && admissible.contains(&reg.global_index)
            }
            RegRequirement::SameAsInput(_) => true,
            RegRequirement::WideAligned { class, alignment, .. } => {
                reg.class == *class && reg.global_index % u16::from((*alignment).max(1)) == 0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;

    fn gpr(name: &'static str, class_index: u16, constraints: RegConstraint) -> Register {
        Register { name, class: 0, class_index, global_index: class_index, constraints }
    }

    fn gpr_class() -> RegisterClass {
        RegisterClass {
            name: "gpr",
            mode: predefined().iu32,
            registers: vec![
                gpr("r0", 0, RegConstraint::empty()),
                gpr("sp", 1, RegConstraint::RESERVED),
                gpr("r2", 2, RegConstraint::CALLEE_SAVED),
                gpr("r3", 3, RegConstraint::CALLER_SAVED),
            ],
        }
    }

    #[test]
    fn reserved_registers_are_excluded_from_the_allocatable_subset() {
        let class = gpr_class();
        let names: Vec<&str> = class.allocatable().map(|r| r.name).collect();
        assert_eq!(names, vec!["r0", "r2", "r3"]);
    }

    #[test]
    fn limited_requirement_admits_only_the_named_registers() {
        let class = gpr_class();
        let req = RegRequirement::Limited { class: 0, admissible: vec![0, 2] };
        assert!(req.admits(class.register(0)));
        assert!(!req.admits(class.register(3)));
    }

    #[test]
    fn wide_aligned_requirement_rejects_misaligned_registers() {
        let class = gpr_class();
        let req = RegRequirement::WideAligned { class: 0, width: 2, alignment: 2 };
        assert!(req.admits(class.register(2)));
        assert!(!req.admits(class.register(3)));
    }
}
