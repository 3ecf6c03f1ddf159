//! Target-neutral backend protocol (component C12, spec.md §4.10): register
//! classes and requirements, a copy-coalescing ILP formulation built but not
//! solved in-crate, and MemPerm chain/cycle resolution for stack-slot
//! shuffles. Nothing here assumes a particular target; [`crate::target`]
//! supplies the one illustrative instantiation this crate ships.

pub mod coalesce;
pub mod memperm;
pub mod regclass;
