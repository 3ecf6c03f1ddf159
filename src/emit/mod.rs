//! Emitter driver (component C14, spec.md §4.12): turns a scheduled,
//! register-assigned graph into target assembly text. [`driver`] owns
//! prologue/epilogue ordering, block-walk label attachment, the constant
//! pool, and the branch-delay-slot search; [`format`] is the closed
//! directive-set template renderer every target's instruction strings go
//! through; [`pic`] adjusts code/data addresses for the target's PIC style.
//! [`crate::target::Target`] is the seam a concrete target implements;
//! [`crate::target::example`] is the one instantiation this crate ships.

pub mod driver;
pub mod format;
pub mod pic;
