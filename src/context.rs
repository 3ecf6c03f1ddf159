//! Process-wide configuration, threaded explicitly rather than kept in
//! statics (spec.md §9 design note on global mutable state: wrap
//! PIC-style/peephole-enable/pointer-mode knobs in a value and pass it to
//! passes, rather than reach for process-wide state — mode and opcode
//! interning are the one deliberate exception, since spec.md §3 requires
//! their identity to be stable process-wide).
//!
//! C9's lowering passes already carry their own small per-pass config
//! struct (`Int64LoweringConfig`, `SwitchLoweringConfig`,
//! `BuiltinLoweringConfig`); [`Options`]/[`Context`] generalize the same
//! idea for the backend/emitter stack (C12–C14), which shares
//! configuration across several passes — a target's PIC style, for
//! instance, feeds both address materialization in [`crate::emit::pic`]
//! and the post-RA peephole framework's view of which loads are safe to
//! reorder across.

use crate::mode::Mode;

/// PIC addressing convention for code/data addresses (spec.md §4.12).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PicStyle {
    None,
    ElfPlt,
    ElfNoPlt,
    MachO,
}

/// Process-wide knobs an embedder sets once per target (spec.md §6
/// "Backend configuration").
#[derive(Debug, Clone)]
pub struct Options {
    pub pic_style: PicStyle,
    pub peephole_enabled: bool,
    /// Whether the emitter should fill unused branch-delay slots with an
    /// explicit no-op when no movable instruction is found.
    pub fill_delay_slot_nops: bool,
    pub code_pointer_mode: Mode,
    pub data_pointer_mode: Mode,
}

impl Options {
    #[must_use]
    pub fn new(code_pointer_mode: Mode, data_pointer_mode: Mode) -> Self {
        Options {
            pic_style: PicStyle::None,
            peephole_enabled: true,
            fill_delay_slot_nops: true,
            code_pointer_mode,
            data_pointer_mode,
        }
    }
}

/// Threaded through every C12–C14 entry point.
#[derive(Debug, Clone)]
pub struct Context {
    pub options: Options,
}

impl Context {
    #[must_use]
    pub fn new(options: Options) -> Self {
        Context { options }
    }
}
