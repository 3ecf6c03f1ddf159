//! A retargetable compiler middle-end and backend core: a sea-of-nodes IR
//! (modes, tarvals, opcodes, nodes, blocks, graphs), SSA construction with
//! on-the-fly optimization (GVN and local peephole rewrites), the
//! structural analyses (dominance, loop tree, heights, liveness, block
//! frequency) those rewrites and later passes depend on, generic
//! target-independent lowering, code placement and scheduling, and a
//! target-neutral backend protocol (register classes, copy-coalescing,
//! MemPerm resolution, a post-RA peephole framework, and an emitter
//! driver) with one illustrative target implementation.

pub mod analyses;
pub mod arena;
pub mod backend;
pub mod builder;
pub mod context;
pub mod diag;
pub mod dominance;
pub mod emit;
pub mod gvn;
pub mod looptree;
pub mod lower;
pub mod mode;
pub mod node;
pub mod opcode;
pub mod peephole_local;
pub mod peephole_post_ra;
pub mod placement;
pub mod scheduler;
pub mod target;
pub mod tarval;
