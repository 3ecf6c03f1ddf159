//! Opcode registry (component C2).
//!
//! Opcodes are a small closed set known at compile time, so — unlike the
//! mode/tarval registry — they don't need process-wide interning. Each
//! variant carries fixed metadata (arity, pin-state, flags) looked up via
//! [`Opcode::info`]; the per-opcode *hooks* (hash/attr_cmp/copy_attr/
//! identity/transform) that spec.md §3 calls a "function table" are realized
//! as a `match` dispatch in [`crate::peephole_local`] and [`crate::gvn`]
//! rather than `dyn` objects, since — like the teacher's own closed
//! `BuiltinAbbreviationId`/`Operand` enums — the opcode set never grows at
//! run time.

use bitflags::bitflags;

/// Every operation kind the core IR knows about.
///
/// This is deliberately smaller than a production middle-end's opcode list;
/// it covers exactly the operators the lowering passes, placement, and
/// scheduler in this crate need to exercise (spec.md §4.7–§4.9 name most of
/// them explicitly).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Opcode {
    Start,
    End,
    Block,
    Bad,
    Unknown,
    Dummy,
    Const,
    SymConst,
    Phi,
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Not,
    Minus,
    Shl,
    Shr,
    Shrs,
    Conv,
    Cmp,
    Mux,
    Jmp,
    Cond,
    Proj,
    Return,
    Call,
    Load,
    Store,
    Switch,
    Builtin,
    Asm,
}

bitflags! {
    /// Per-opcode flag bits (spec.md §3 "flags bitset").
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpFlags: u16 {
        const COMMUTATIVE       = 1 << 0;
        const CONSTANT_LIKE     = 1 << 1;
        const CONTROL_FLOW      = 1 << 2;
        const USES_MEMORY       = 1 << 3;
        const FRAGILE           = 1 << 4;
        const START_BLOCK_PLACED = 1 << 5;
        const CSE_NEUTRAL       = 1 << 6;
        const KEEP_ALLOWED      = 1 << 7;
    }
}

/// Whether a node may float across blocks (spec.md glossary "Pin state").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinState {
    Floats,
    Pinned,
    ExcPinned,
    MemPinned,
}

/// How many data/memory/control predecessors (beyond the block slot) an
/// opcode takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Fixed(u8),
    /// Predecessor count is set at construction and fixed afterward
    /// (e.g. `Call`'s argument list).
    Variable,
    /// Predecessor count can grow after construction (`Phi`, `Block`).
    Dynamic,
}

/// Static per-opcode metadata (spec.md §3 "Opcode ... Attributes").
#[derive(Debug, Clone, Copy)]
pub struct OpInfo {
    pub name: &'static str,
    pub pin_state: PinState,
    pub flags: OpFlags,
    pub arity: Arity,
    /// Index into the predecessor array of the memory input, for opcodes
    /// that use memory.
    pub mem_input: Option<usize>,
    /// `(regular_proj, exception_proj)` numbers for fragile ops.
    pub fragile_projs: Option<(u32, u32)>,
}

impl Opcode {
    /// Fixed metadata table, one entry per opcode. Mirrors spec.md's
    /// "generated table" at "library initialization" — here it's simply a
    /// `const fn` match, since Rust doesn't need a runtime init step for
    /// `'static` data.
    #[must_use]
    pub const fn info(self) -> OpInfo {
        use Arity::*;
        use PinState::*;
        match self {
            Opcode::Start => OpInfo {
                name: "Start",
                pin_state: Pinned,
                flags: OpFlags::CONTROL_FLOW.union(OpFlags::START_BLOCK_PLACED),
                arity: Fixed(0),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::End => OpInfo {
                name: "End",
                pin_state: Pinned,
                flags: OpFlags::CONTROL_FLOW,
                arity: Variable,
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Block => OpInfo {
                name: "Block",
                pin_state: Pinned,
                flags: OpFlags::CONTROL_FLOW,
                arity: Dynamic,
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Bad => OpInfo {
                name: "Bad",
                pin_state: Floats,
                flags: OpFlags::CONSTANT_LIKE.union(OpFlags::START_BLOCK_PLACED),
                arity: Fixed(0),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Unknown => OpInfo {
                name: "Unknown",
                pin_state: Floats,
                flags: OpFlags::CONSTANT_LIKE.union(OpFlags::START_BLOCK_PLACED),
                arity: Fixed(0),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Dummy => OpInfo {
                name: "Dummy",
                pin_state: Floats,
                flags: OpFlags::CSE_NEUTRAL,
                arity: Fixed(0),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Const => OpInfo {
                name: "Const",
                pin_state: Floats,
                flags: OpFlags::CONSTANT_LIKE.union(OpFlags::START_BLOCK_PLACED),
                arity: Fixed(0),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::SymConst => OpInfo {
                name: "SymConst",
                pin_state: Floats,
                flags: OpFlags::CONSTANT_LIKE.union(OpFlags::START_BLOCK_PLACED),
                arity: Fixed(0),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Phi => OpInfo {
                name: "Phi",
                pin_state: Pinned,
                flags: OpFlags::CSE_NEUTRAL,
                arity: Dynamic,
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Add => OpInfo {
                name: "Add",
                pin_state: Floats,
                flags: OpFlags::COMMUTATIVE,
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Sub => OpInfo {
                name: "Sub",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Mul => OpInfo {
                name: "Mul",
                pin_state: Floats,
                flags: OpFlags::COMMUTATIVE,
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::And => OpInfo {
                name: "And",
                pin_state: Floats,
                flags: OpFlags::COMMUTATIVE,
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Or => OpInfo {
                name: "Or",
                pin_state: Floats,
                flags: OpFlags::COMMUTATIVE,
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Xor => OpInfo {
                name: "Xor",
                pin_state: Floats,
                flags: OpFlags::COMMUTATIVE,
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Not => OpInfo {
                name: "Not",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(1),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Minus => OpInfo {
                name: "Minus",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(1),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Shl => OpInfo {
                name: "Shl",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Shr => OpInfo {
                name: "Shr",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Shrs => OpInfo {
                name: "Shrs",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Conv => OpInfo {
                name: "Conv",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(1),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Cmp => OpInfo {
                name: "Cmp",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(2),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Mux => OpInfo {
                name: "Mux",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(3),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Jmp => OpInfo {
                name: "Jmp",
                pin_state: Pinned,
                flags: OpFlags::CONTROL_FLOW,
                arity: Fixed(0),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Cond => OpInfo {
                name: "Cond",
                pin_state: Pinned,
                flags: OpFlags::CONTROL_FLOW,
                arity: Fixed(1),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Proj => OpInfo {
                name: "Proj",
                pin_state: Floats,
                flags: OpFlags::empty(),
                arity: Fixed(1),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Return => OpInfo {
                name: "Return",
                pin_state: Pinned,
                flags: OpFlags::CONTROL_FLOW.union(OpFlags::USES_MEMORY),
                arity: Variable,
                mem_input: Some(1),
                fragile_projs: None,
            },
            Opcode::Call => OpInfo {
                name: "Call",
                pin_state: Pinned,
                flags: OpFlags::USES_MEMORY.union(OpFlags::FRAGILE),
                arity: Variable,
                mem_input: Some(1),
                fragile_projs: Some((0, 1)),
            },
            Opcode::Load => OpInfo {
                name: "Load",
                pin_state: ExcPinned,
                flags: OpFlags::USES_MEMORY.union(OpFlags::FRAGILE),
                arity: Fixed(2),
                mem_input: Some(1),
                fragile_projs: Some((0, 1)),
            },
            Opcode::Store => OpInfo {
                name: "Store",
                pin_state: ExcPinned,
                flags: OpFlags::USES_MEMORY.union(OpFlags::FRAGILE),
                arity: Fixed(3),
                mem_input: Some(1),
                fragile_projs: Some((0, 1)),
            },
            Opcode::Switch => OpInfo {
                name: "Switch",
                pin_state: Pinned,
                flags: OpFlags::CONTROL_FLOW,
                arity: Fixed(1),
                mem_input: None,
                fragile_projs: None,
            },
            Opcode::Builtin => OpInfo {
                name: "Builtin",
                pin_state: Pinned,
                flags: OpFlags::USES_MEMORY,
                arity: Variable,
                mem_input: Some(1),
                fragile_projs: None,
            },
            Opcode::Asm => OpInfo {
                name: "ASM",
                pin_state: Pinned,
                flags: OpFlags::USES_MEMORY,
                arity: Variable,
                mem_input: Some(1),
                fragile_projs: None,
            },
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.info().name
    }

    #[must_use]
    pub const fn pin_state(self) -> PinState {
        self.info().pin_state
    }

    #[must_use]
    pub const fn flags(self) -> OpFlags {
        self.info().flags
    }

    #[must_use]
    pub fn is_commutative(self) -> bool {
        self.flags().contains(OpFlags::COMMUTATIVE)
    }

    #[must_use]
    pub fn is_constant_like(self) -> bool {
        self.flags().contains(OpFlags::CONSTANT_LIKE)
    }

    #[must_use]
    pub fn is_control_flow(self) -> bool {
        self.flags().contains(OpFlags::CONTROL_FLOW)
    }

    #[must_use]
    pub fn is_fragile(self) -> bool {
        self.flags().contains(OpFlags::FRAGILE)
    }

    /// A node is eligible to float (be re-placed by C10) only if its
    /// pin-state is `Floats` and it isn't flagged start-block-placed — the
    /// "floating" agreement spec.md §4.8 requires early/late placement to
    /// share.
    #[must_use]
    pub fn is_floating(self) -> bool {
        matches!(self.pin_state(), PinState::Floats) && !self.flags().contains(OpFlags::START_BLOCK_PLACED)
    }
}
