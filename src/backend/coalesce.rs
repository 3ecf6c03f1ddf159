//! Copy-coalescing via an ILP formulation the core builds but does not
//! solve (spec.md §4.10, second paragraph): node-gets-color variables, one
//! color per node, an interference clique constraint per paragraph, and an
//! affinity-weighted objective. The formulation is a value
//! ([`IlpModel`]); solving it is an external collaborator behind the
//! [`IlpSolver`] trait (spec.md §1: "wraps an external ILP solver rather
//! than shipping one"). [`GreedyIlpSolver`] is the always-feasible fallback
//! that lets the crate run without a real MILP solver on hand; spec.md §7's
//! "Infeasible optimization" error kind covers exactly this case — a
//! correct but possibly suboptimal result, not a failure.

use std::cmp::Ordering;
use std::collections::HashSet;

use crate::diag::{self, AnalysisWarning};

/// One interference clique: these node indices must receive pairwise
/// distinct colors (spec.md §4.10: "interference cliques constrain which
/// nodes may share a color").
pub type Clique = Vec<usize>;

/// One affinity edge `(n, m, weight)`: a solver that assigns `n` and `m`
/// the same color earns `weight` toward the objective.
pub type Affinity = (usize, usize, f64);

/// The coloring problem handed to an [`IlpSolver`].
#[derive(Debug, Clone)]
pub struct IlpModel {
    pub node_count: usize,
    pub color_count: usize,
    pub cliques: Vec<Clique>,
    pub affinities: Vec<Affinity>,
}

/// Whether a [`Coloring`] is provably optimal or merely feasible (spec.md
/// §7's `Optimality` tag on an infeasible-optimization result).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Optimality {
    Optimal,
    Heuristic,
}

#[derive(Debug, Clone)]
pub struct Coloring {
    pub color_of: Vec<usize>,
    pub quality: Optimality,
}

impl Coloring {
    /// Every interference clique ends up pairwise distinctly colored. Every
    /// [`IlpSolver`] impl must guarantee this; exercised directly in tests.
    #[must_use]
    pub fn respects(&self, model: &IlpModel) -> bool {
        model.cliques.iter().all(|clique| {
            let colors: HashSet<usize> = clique.iter().map(|&n| self.color_of[n]).collect();
            colors.len() == clique.len()
        })
    }

    /// Total affinity weight this coloring actually realizes.
    #[must_use]
    pub fn affinity_value(&self, model: &IlpModel) -> f64 {
        model
            .affinities
            .iter()
            .filter(|&&(n, m, _)| self.color_of[n] == self.color_of[m])
            .map(|&(_, _, w)| w)
            .sum()
    }
}

/// External collaborator seam: a real MILP solver plugs in here. Nothing
/// else in this crate depends on one being available.
pub trait IlpSolver {
    fn solve(&self, model: &IlpModel) -> Coloring;
}

/// Always-feasible fallback: greedy coloring in node order. For each node,
/// prefer the color already held by its heaviest-weight already-colored
/// affinity partner when that color is still legal, otherwise take the
/// lowest-numbered legal color. Feasible by construction, not optimal.
pub struct GreedyIlpSolver;

impl IlpSolver for GreedyIlpSolver {
    fn solve(&self, model: &IlpModel) -> Coloring {
        let mut forbidden: Vec<HashSet<usize>> = vec![HashSet::new(); model.node_count];
        let mut affinity_partners: Vec<Vec<(usize, f64)>> = vec![Vec::new(); model.node_count];
        for &(n, m, w) in &model.affinities {
            affinity_partners[n].push((m, w));
            affinity_partners[m].push((n, w));
        }

        let mut color_of = vec![usize::MAX; model.node_count];
        for n in 0..model.node_count {
            let mut partners = affinity_partners[n].clone();
            partners.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            let preferred = partners.iter().find_map(|&(m, _)| {
                let c = color_of[m];
                (c != usize::MAX && !forbidden[n].contains(&c)).then_some(c)
            });

            let chosen = preferred.unwrap_or_else(|| {
                (0..model.color_count)
                    .find(|c| !forbidden[n].contains(c))
                    .expect("color_count must exceed the size of every interference clique")
            });
            color_of[n] = chosen;

            for clique in model.cliques.iter().filter(|c| c.contains(&n)) {
                for &m in clique {
                    if m != n {
                        forbidden[m].insert(chosen);
                    }
                }
            }
        }

        let coloring = Coloring { color_of, quality: Optimality::Heuristic };
        diag::report(&AnalysisWarning::IlpSolutionNotOptimal { objective: coloring.affinity_value(model) });
        coloring
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interfering_nodes_never_share_a_color() {
        let model = IlpModel { node_count: 3, color_count: 2, cliques: vec![vec![0, 1]], affinities: vec![] };
        let coloring = GreedyIlpSolver.solve(&model);
        assert!(coloring.respects(&model));
        assert_ne!(coloring.color_of[0], coloring.color_of[1]);
    }

    #[test]
    fn non_interfering_affine_nodes_are_coalesced() {
        let model = IlpModel { node_count: 2, color_count: 4, cliques: vec![], affinities: vec![(0, 1, 10.0)] };
        let coloring = GreedyIlpSolver.solve(&model);
        assert_eq!(coloring.color_of[0], coloring.color_of[1]);
        assert_eq!(coloring.quality, Optimality::Heuristic);
    }

    #[test]
    fn greedy_solver_is_always_feasible_even_under_a_dense_clique() {
        let model = IlpModel {
            node_count: 4,
            color_count: 4,
            cliques: vec![vec![0, 1, 2, 3]],
            affinities: vec![(0, 1, 1.0), (1, 2, 1.0)],
        };
        let coloring = GreedyIlpSolver.solve(&model);
        assert!(coloring.respects(&model));
    }
}
