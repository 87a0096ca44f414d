//! First-order selection effects on the mean producer frequency.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::schema::{SocialGood, SolverMethod};

use super::super::coalescence;
use super::super::graph::Graph;
use super::super::linalg::{Matrix, solve_with};
use super::{Production, check_mutation_rate};

/// Coefficient matrices `K1`, `K2` for one mutation rate.
///
/// The derivative of the mean producer frequency with respect to δ at
/// δ = 0 is a linear functional of these and the payoff structure.
#[derive(Debug, Clone, PartialEq)]
pub struct StructureMatrices {
    pub mutation_rate: f64,
    pub k1: Matrix,
    pub k2: Matrix,
}

impl StructureMatrices {
    /// `d⟨x⟩/dδ` at δ = 0 for `production` on `graph`.
    pub fn selection_effect(&self, graph: &Graph, production: &Production) -> f64 {
        let (b, c) = (production.benefit, production.cost);
        match production.good {
            SocialGood::Ff => {
                let w = graph.transitions();
                let n = graph.len();
                // tr(W (K1 − K2)) and tr(Wᵀ (K1 + K2))
                let mut gain = 0.0;
                let mut loss = 0.0;
                for i in 0..n {
                    for j in 0..n {
                        gain += w[(i, j)] * (self.k1[(j, i)] - self.k2[(j, i)]);
                        loss += w[(j, i)] * (self.k1[(j, i)] + self.k2[(j, i)]);
                    }
                }
                0.5 * (gain * b - loss * c)
            }
            SocialGood::Pp => {
                let kappa1 = self.k1.hadamard_sum(graph.weights());
                let kappa2 = self.k2.hadamard_sum(graph.weights());
                0.5 * ((kappa1 - kappa2) * b - (kappa1 + kappa2) * c)
            }
        }
    }
}

/// Selection effects of both goods at one mutation rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SelectionEffects {
    pub mutation_rate: f64,
    pub ff: f64,
    pub pp: f64,
}

/// Exact mutation–selection analysis on one graph.
#[derive(Debug, Clone)]
pub struct SocialAnalysis<'a> {
    graph: &'a Graph,
    solver: SolverMethod,
}

impl<'a> SocialAnalysis<'a> {
    pub fn new(graph: &'a Graph) -> Self {
        Self {
            graph,
            solver: SolverMethod::Direct,
        }
    }

    /// Use `solver` for the pairwise identity-by-state system.
    pub fn with_solver(mut self, solver: SolverMethod) -> Self {
        self.solver = solver;
        self
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// Mutation-weighted reproductive values, scaled to sum to `N`.
    ///
    /// Solves `v = (u/N) 1 + (1 − u) v W`.
    pub fn location_weights(&self, u: f64) -> Result<Vec<f64>, Error> {
        check_mutation_rate(u)?;
        let n = self.graph.len();
        let w = self.graph.transitions();
        let system = Matrix::from_fn(n, n, |i, j| {
            let identity = if i == j { 1.0 } else { 0.0 };
            identity - (1.0 - u) * w[(j, i)]
        });
        let rhs = vec![u / n as f64; n];
        let v = solve_with(&system, &rhs, &SolverMethod::Direct)?;
        Ok(v.into_iter().map(|x| x * n as f64).collect())
    }

    /// Pairwise identity-by-state probabilities under neutral drift.
    pub fn identity_by_state(&self, u: f64) -> Result<Matrix, Error> {
        check_mutation_rate(u)?;
        Ok(coalescence::identity_by_state(
            self.graph.transitions(),
            u,
            &self.solver,
        )?)
    }

    /// `K1` and `K2` at mutation rate `u`.
    ///
    /// Sums over the node `j` whose fecundity is perturbed, using the
    /// marginal effects `m^(j)_rc = W_rc (δ_cj − W_rj) / N`.
    pub fn structure_matrices(&self, u: f64) -> Result<StructureMatrices, Error> {
        let v = self.location_weights(u)?;
        let phi = self.identity_by_state(u)?;
        let n = self.graph.len();
        let nf = n as f64;
        let w = self.graph.transitions();
        let scale = 1.0 / (2.0 * u);

        let mut k1 = Matrix::zeros(n, n);
        let mut k2 = Matrix::zeros(n, n);
        for j in 0..n {
            // v_r m^(j)_rc
            let weighted = Matrix::from_fn(n, n, |r, c| {
                let own = if c == j { 1.0 } else { 0.0 };
                v[r] * w[(r, c)] * (own - w[(r, j)]) / nf
            });
            let column_sums: Vec<f64> = (0..n)
                .map(|c| (0..n).map(|r| weighted[(r, c)]).sum())
                .collect();
            let total = column_sums.iter().sum::<f64>() / nf;
            let spread = weighted.transpose().matmul(&phi);

            for c in 0..n {
                let local: f64 = (0..n).map(|r| weighted[(r, c)] * phi[(r, c)]).sum();
                let through_j = column_sums[c] * phi[(j, c)];
                for k in 0..n {
                    let spread_ck = spread[(c, k)];
                    let through_jk = column_sums[c] * phi[(j, k)];
                    k1[(c, k)] += scale
                        * (-(local + spread_ck) + (1.0 - u) * (through_j + through_jk) + total);
                    k2[(c, k)] +=
                        scale * (-(local - spread_ck) + (1.0 - u) * (through_j - through_jk));
                }
            }
        }

        Ok(StructureMatrices {
            mutation_rate: u,
            k1,
            k2,
        })
    }

    /// `d⟨x⟩/dδ` at δ = 0 for `production` at mutation rate `u`.
    pub fn selection_effect(&self, u: f64, production: &Production) -> Result<f64, Error> {
        Ok(self
            .structure_matrices(u)?
            .selection_effect(self.graph, production))
    }

    /// Effects of both goods at mutation rate `u`.
    pub fn effects(&self, u: f64, benefit: f64, cost: f64) -> Result<SelectionEffects, Error> {
        let matrices = self.structure_matrices(u)?;
        let ff = Production::new(SocialGood::Ff, benefit, cost)?;
        let pp = Production::new(SocialGood::Pp, benefit, cost)?;
        let effects = SelectionEffects {
            mutation_rate: u,
            ff: matrices.selection_effect(self.graph, &ff),
            pp: matrices.selection_effect(self.graph, &pp),
        };
        log::debug!(
            "u = {}: ff effect {:.6e}, pp effect {:.6e}",
            u,
            effects.ff,
            effects.pp
        );
        Ok(effects)
    }

    /// [`SocialAnalysis::effects`] at each rate, in order.
    #[cfg(feature = "parallel")]
    pub fn sweep(&self, rates: &[f64], benefit: f64, cost: f64) -> Result<Vec<SelectionEffects>, Error> {
        rates
            .par_iter()
            .map(|&u| self.effects(u, benefit, cost))
            .collect()
    }

    /// [`SocialAnalysis::effects`] at each rate, in order.
    #[cfg(not(feature = "parallel"))]
    pub fn sweep(&self, rates: &[f64], benefit: f64, cost: f64) -> Result<Vec<SelectionEffects>, Error> {
        rates
            .iter()
            .map(|&u| self.effects(u, benefit, cost))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete(n: usize) -> Graph {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 0.0 } else { 1.0 }).collect())
            .collect();
        Graph::from_adjacency(&rows).unwrap()
    }

    fn cycle(n: usize) -> Graph {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if (i + 1) % n == j || (j + 1) % n == i { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        Graph::from_adjacency(&rows).unwrap()
    }

    fn star(leaves: usize) -> Graph {
        let n = leaves + 1;
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| (0..n).map(|j| if (i == 0) != (j == 0) { 1.0 } else { 0.0 }).collect())
            .collect();
        Graph::from_adjacency(&rows).unwrap()
    }

    #[test]
    fn test_location_weights_uniform_on_regular_graph() {
        let graph = cycle(7);
        let v = SocialAnalysis::new(&graph).location_weights(0.05).unwrap();
        assert!(v.iter().all(|&x| (x - 1.0).abs() < 1e-12));
    }

    #[test]
    fn test_location_weights_favor_hub() {
        let graph = star(4);
        let v = SocialAnalysis::new(&graph).location_weights(0.001).unwrap();
        let sum: f64 = v.iter().sum();
        assert!((sum - 5.0).abs() < 1e-9);
        assert!((v[0] - 2.49925).abs() < 1e-5);
        assert!(v[1..].iter().all(|&x| (x - v[1]).abs() < 1e-12));
    }

    #[test]
    fn test_full_mutation_identity() {
        let graph = cycle(5);
        let phi = SocialAnalysis::new(&graph).identity_by_state(1.0).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 1.0 } else { 0.5 };
                assert!((phi[(i, j)] - expected).abs() < 1e-12);
            }
        }
    }

    #[test]
    fn test_complete_graph_effects() {
        let graph = complete(5);
        let analysis = SocialAnalysis::new(&graph);
        let benefit_only = analysis.effects(0.1, 1.0, 0.0).unwrap();
        let cost_only = analysis.effects(0.1, 0.0, 1.0).unwrap();
        assert!((benefit_only.ff + 27.0 / 208.0).abs() < 1e-9);
        assert!((cost_only.ff + 27.0 / 52.0).abs() < 1e-9);
        // Every node has raw degree 4
        assert!((benefit_only.pp - 4.0 * benefit_only.ff).abs() < 1e-9);
        // Producers are never favored in a well-mixed population
        let generous = analysis.effects(0.01, 10.0, 1.0).unwrap();
        assert!(generous.ff < 0.0 && generous.pp < 0.0);
    }

    #[test]
    fn test_cycle_threshold_matches_structure_coefficient() {
        // Rare mutation on a cycle recovers (b/c)* = 8/3 for N = 10
        let graph = cycle(10);
        let analysis = SocialAnalysis::new(&graph);
        let matrices = analysis.structure_matrices(0.001).unwrap();
        let per_benefit =
            matrices.selection_effect(&graph, &Production::new(SocialGood::Ff, 1.0, 0.0).unwrap());
        let per_cost =
            matrices.selection_effect(&graph, &Production::new(SocialGood::Ff, 0.0, 1.0).unwrap());
        let threshold = -per_cost / per_benefit;
        assert!((threshold - 8.0 / 3.0).abs() < 0.02, "threshold {}", threshold);

        let effects = analysis.effects(0.001, 10.0, 1.0).unwrap();
        assert!(effects.ff > 0.0);
        assert!((effects.pp - 2.0 * effects.ff).abs() < 1e-9);
        assert!(analysis.effects(0.001, 1.5, 1.0).unwrap().ff < 0.0);
    }

    #[test]
    fn test_no_effect_at_full_mutation() {
        let graph = star(4);
        let effects = SocialAnalysis::new(&graph).effects(1.0, 3.0, 1.0).unwrap();
        assert!(effects.ff.abs() < 1e-12);
        assert!(effects.pp.abs() < 1e-12);
    }

    #[test]
    fn test_iterative_solver_agrees() {
        let graph = cycle(6);
        let direct = SocialAnalysis::new(&graph).effects(0.05, 4.0, 1.0).unwrap();
        let iterative = SocialAnalysis::new(&graph)
            .with_solver(SolverMethod::Iterative {
                tolerance: 1e-14,
                max_iterations: 200_000,
            })
            .effects(0.05, 4.0, 1.0)
            .unwrap();
        assert!((direct.ff - iterative.ff).abs() < 1e-7);
        assert!((direct.pp - iterative.pp).abs() < 1e-7);
    }

    #[test]
    fn test_sweep_keeps_order() {
        let graph = cycle(6);
        let rates = [0.5, 0.01, 0.1];
        let effects = SocialAnalysis::new(&graph).sweep(&rates, 4.0, 1.0).unwrap();
        let order: Vec<f64> = effects.iter().map(|e| e.mutation_rate).collect();
        assert_eq!(order, rates.to_vec());
    }

    #[test]
    fn test_rejects_zero_mutation() {
        let graph = cycle(4);
        let err = SocialAnalysis::new(&graph).structure_matrices(0.0).unwrap_err();
        assert!(err.is_validation());
    }
}
