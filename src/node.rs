//! Node vocabulary: identifiers and per-opcode attribute payloads
//! (component C3, continued in `arena.rs`).
//!
//! spec.md §9's design note on "ad hoc polymorphism" replaces the attribute
//! union with one closed `enum`; this is that enum plus the small value
//! types it carries (switch tables, ASM constraints, builtin kinds).

use crate::mode::Mode;
use crate::tarval::{Relation, Tarval};

/// A node's position within its owning graph's arena. Stable for the
/// lifetime of the graph; never reused across graphs (spec.md: "Nodes
/// belong to exactly one graph; cross-graph edges are illegal").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// What a `SymConst` materializes the address of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SymKind {
    /// The address of a data entity (global/static).
    Data,
    /// The address of a callable method/function entity.
    Method,
    /// The address of a basic block (used for computed jumps; bypasses PIC
    /// address adjustment per spec.md §4.12).
    Block,
}

/// A symbolic constant's payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SymConst {
    pub kind: SymKind,
    pub symbol: String,
}

/// One contiguous case range in a lowered `Switch`'s table (spec.md §4.7
/// "Switch lowering").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseRange {
    pub min: i128,
    pub max: i128,
    pub proj: u32,
}

/// The switch table attribute carried by a `Switch` node: non-overlapping
/// case ranges plus the default projection number.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchTable {
    pub cases: Vec<CaseRange>,
    pub default_proj: u32,
    pub selector_mode: Mode,
}

impl SwitchTable {
    /// spec.md §8 invariant 6: all case ranges are pairwise disjoint.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        for (i, a) in self.cases.iter().enumerate() {
            if a.min > a.max {
                return false;
            }
            for b in &self.cases[i + 1..] {
                if a.min <= b.max && b.min <= a.max {
                    return false;
                }
            }
        }
        true
    }

    #[must_use]
    pub fn case_count(&self) -> usize {
        self.cases.len()
    }

    /// `spare = (max - min + 1) - case_count`, used by the jump-table-vs-
    /// cascade decision in spec.md §4.7.
    #[must_use]
    pub fn spare(&self) -> i128 {
        let Some(min) = self.cases.iter().map(|c| c.min).min() else {
            return 0;
        };
        let Some(max) = self.cases.iter().map(|c| c.max).max() else {
            return 0;
        };
        (max - min + 1) - self.case_count() as i128
    }
}

/// Selected builtins that C9's builtin-lowering pass knows how to rewrite
/// into runtime calls (spec.md §4.7 "Builtin lowering").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinKind {
    Ffs,
    Clz,
    Ctz,
    Popcount,
    Parity,
    Bswap,
    Prefetch,
}

impl BuiltinKind {
    #[must_use]
    pub fn runtime_name_stem(self) -> &'static str {
        match self {
            BuiltinKind::Ffs => "ffs",
            BuiltinKind::Clz => "clz",
            BuiltinKind::Ctz => "ctz",
            BuiltinKind::Popcount => "popcount",
            BuiltinKind::Parity => "parity",
            BuiltinKind::Bswap => "bswap",
            BuiltinKind::Prefetch => "prefetch",
        }
    }
}

/// Inline-assembly operand constraint (spec.md §3 "ASM constraints list").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsmConstraint {
    pub text: String,
    pub is_output: bool,
}

/// The per-opcode attribute payload (spec.md §3 Node "per-opcode attribute
/// payload"). One variant per opcode family that needs extra data; opcodes
/// with no extra data (`Add`, `Jmp`, `Load`, ...) use `NodeAttr::None`.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeAttr {
    None,
    Const(Tarval),
    SymConst(SymConst),
    Cmp(Relation),
    /// Projection number, used by `Proj` nodes.
    Proj(u32),
    Switch(SwitchTable),
    Builtin(BuiltinKind),
    /// The symbol a `Call`/library-call invokes, when statically known.
    CallTarget(String),
    Asm {
        template: String,
        constraints: Vec<AsmConstraint>,
    },
}

impl NodeAttr {
    #[must_use]
    pub fn as_const(&self) -> Option<&Tarval> {
        match self {
            NodeAttr::Const(t) => Some(t),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_cmp(&self) -> Option<Relation> {
        match self {
            NodeAttr::Cmp(r) => Some(*r),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_proj(&self) -> Option<u32> {
        match self {
            NodeAttr::Proj(p) => Some(*p),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_switch(&self) -> Option<&SwitchTable> {
        match self {
            NodeAttr::Switch(s) => Some(s),
            _ => None,
        }
    }
}

/// Which phase a graph is in; some passes are only valid in one phase
/// (spec.md §3 Graph "phase (high/low/backend/building)").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Building,
    High,
    Low,
    Backend,
}

bitflags::bitflags! {
    /// `IR_GRAPH_STATE_*` bits (spec.md §6 "Pass API").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct GraphState: u32 {
        const NO_CRITICAL_EDGES     = 1 << 0;
        const CONSISTENT_OUTS       = 1 << 1;
        const CONSISTENT_DOMINANCE  = 1 << 2;
        const CONSISTENT_LOOPINFO   = 1 << 3;
        const MODEB_LOWERED         = 1 << 4;
        const VALID_EXTENDED_BLOCKS = 1 << 5;
        const ONE_RETURN            = 1 << 6;
        const SCHEDULED             = 1 << 7;
    }
}

/// Extra bookkeeping carried only by `Block` nodes (spec.md §3 Block).
#[derive(Debug, Clone, Default)]
pub struct BlockInfo {
    pub matured: bool,
    pub visited: u64,
    /// Pending incomplete Phis awaiting maturation: `(local_slot, phi_node)`.
    pub incomplete_phis: Vec<(u32, NodeId)>,
    pub phi_list: Vec<NodeId>,
    pub frame_entity: Option<String>,
    pub user_mark: bool,
}

/// One node occurrence in a procedure graph (spec.md §3 Node).
#[derive(Debug, Clone)]
pub struct NodeData {
    pub(crate) graph_id: u64,
    pub opcode: crate::opcode::Opcode,
    pub mode: Mode,
    /// Index 0 is the owning block for every non-`Block` node; remaining
    /// entries are data/memory/control inputs in semantic order.
    pub(crate) preds: Vec<NodeId>,
    /// Explicit ordering edges added by late passes (scheduler, peephole).
    pub deps: Vec<NodeId>,
    pub(crate) visited: u64,
    pub attr: NodeAttr,
}

impl NodeData {
    #[must_use]
    pub fn preds(&self) -> &[NodeId] {
        &self.preds
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.preds.len().saturating_sub(1)
    }

    #[must_use]
    pub fn block(&self) -> NodeId {
        assert_ne!(self.opcode, crate::opcode::Opcode::Block, "Block has no owning block");
        self.preds[0]
    }
}
