//! PIC address adjustment (spec.md §4.12, last paragraph): turn a
//! `SymConst` into the instruction sequence that materializes its address
//! under a target's addressing convention.
//!
//! Block-label addresses bypass PIC entirely (a jump table entry or a
//! computed-goto target is always local to the function being emitted).
//! Everything else goes through one of:
//! - `none`: the raw symbol, no adjustment.
//! - ELF with a PLT: call targets get a trampoline entity (`symbol@plt`);
//!   other code/data addresses fall back to the GOT path below.
//! - ELF without a PLT / Mach-O: a GOT (or Mach-O non-lazy-pointer) entity
//!   holding the real address, reached via `pic_base + pic_symbol`
//!   (an `Add`) and an indirecting `Load`.

use crate::context::{Context, PicStyle};
use crate::node::SymKind;

/// How one symbolic address must be materialized.
#[derive(Debug, Clone, PartialEq)]
pub enum PicAddress {
    /// No adjustment: the symbol's address is used directly.
    Direct { symbol: String },
    /// A block-local label; PIC never touches these.
    BlockLabel { label: String },
    /// Reached through a PLT trampoline entity (call targets only).
    ViaPlt { symbol: String },
    /// Reached through a GOT/non-lazy-pointer entity: `pic_base +
    /// pic_symbol`, then an indirecting load.
    ViaGot { symbol: String },
}

/// Classify how `symbol` (of kind `kind`) must be addressed under `ctx`'s
/// PIC style.
#[must_use]
pub fn classify(ctx: &Context, kind: &SymKind, symbol: &str) -> PicAddress {
    if *kind == SymKind::Block {
        return PicAddress::BlockLabel { label: symbol.to_string() };
    }
    match ctx.options.pic_style {
        PicStyle::None => PicAddress::Direct { symbol: symbol.to_string() },
        PicStyle::ElfPlt if *kind == SymKind::Method => PicAddress::ViaPlt { symbol: symbol.to_string() },
        PicStyle::ElfPlt | PicStyle::ElfNoPlt | PicStyle::MachO => PicAddress::ViaGot { symbol: symbol.to_string() },
    }
}

/// Render the instruction text that materializes `addr` into `dest_reg`,
/// given the register holding the PIC base (spec.md: "`pic_base +
/// pic_symbol` as an `Add`, with an optional indirecting `Load`").
#[must_use]
pub fn materialize(addr: &PicAddress, dest_reg: &str, pic_base_reg: &str) -> Vec<String> {
    match addr {
        PicAddress::Direct { symbol } => vec![format!("la {dest_reg}, {symbol}")],
        PicAddress::BlockLabel { label } => vec![format!("la {dest_reg}, {label}")],
        PicAddress::ViaPlt { symbol } => {
            vec![format!("add {dest_reg}, {pic_base_reg}, %got({symbol}@plt)")]
        }
        PicAddress::ViaGot { symbol } => vec![
            format!("add {dest_reg}, {pic_base_reg}, %got({symbol})"),
            format!("ld {dest_reg}, [{dest_reg}]"),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mode::predefined;

    fn ctx(style: PicStyle) -> Context {
        let mut opts = crate::context::Options::new(predefined().pointer, predefined().pointer);
        opts.pic_style = style;
        Context::new(opts)
    }

    #[test]
    fn block_labels_bypass_pic_under_every_style() {
        for style in [PicStyle::None, PicStyle::ElfPlt, PicStyle::ElfNoPlt, PicStyle::MachO] {
            let addr = classify(&ctx(style), &SymKind::Block, "bb3");
            assert_eq!(addr, PicAddress::BlockLabel { label: "bb3".to_string() });
        }
    }

    #[test]
    fn elf_plt_routes_call_targets_through_a_trampoline() {
        let addr = classify(&ctx(PicStyle::ElfPlt), &SymKind::Method, "callee");
        assert_eq!(addr, PicAddress::ViaPlt { symbol: "callee".to_string() });
    }

    #[test]
    fn elf_plt_routes_data_addresses_through_the_got_not_the_plt() {
        let addr = classify(&ctx(PicStyle::ElfPlt), &SymKind::Data, "global_x");
        assert_eq!(addr, PicAddress::ViaGot { symbol: "global_x".to_string() });
    }

    #[test]
    fn got_materialization_indirects_through_one_load() {
        let lines = materialize(&PicAddress::ViaGot { symbol: "g".to_string() }, "r1", "r_pic");
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("ld"));
    }
}
