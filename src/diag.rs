//! Diagnostics sink (ambient; resolves spec.md §9's "peephole warnings"
//! Open Question).
//!
//! A handful of conditions in the analysis/backend passes are recoverable
//! but worth surfacing: a switch case value too wide for its selector mode,
//! a node the PIC pass couldn't classify, a peephole rewrite the framework
//! chose to skip, an ILP coloring solved heuristically rather than to
//! optimality (spec.md §7's "Invariant-recoverable in analysis": emit a
//! warning and leave the IR unchanged). [`report`] is the single channel
//! all of those go through — a `tracing::warn!` event, never
//! `eprintln!`/`fprintf(stderr, ...)`.

use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisWarning {
    NonRepresentableSwitchValue { selector_mode: String, value: i128 },
    UnanalyzablePicAddress { node: String, reason: String },
    PeepholeRewriteSkipped { node: String, opcode: String, reason: String },
    IlpSolutionNotOptimal { objective: f64 },
}

impl fmt::Display for AnalysisWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NonRepresentableSwitchValue { selector_mode, value } => {
                write!(f, "switch case value {value} is not representable in mode {selector_mode}")
            }
            Self::UnanalyzablePicAddress { node, reason } => {
                write!(f, "node {node} could not be resolved to a PIC address: {reason}")
            }
            Self::PeepholeRewriteSkipped { node, opcode, reason } => {
                write!(f, "peephole rewrite for {opcode} at {node} skipped: {reason}")
            }
            Self::IlpSolutionNotOptimal { objective } => {
                write!(f, "copy-coalescing solved heuristically (objective {objective}), not to optimality")
            }
        }
    }
}

impl std::error::Error for AnalysisWarning {}

/// Record a recoverable warning and let the caller continue with the IR
/// unchanged (spec.md §7).
pub fn report(warning: &AnalysisWarning) {
    tracing::warn!(%warning, "recoverable analysis issue");
}
