//! Weak-selection analysis of death–birth updating.
//!
//! Three remote coalescence moments summarize the graph:
//!
//! - `τ1 = Σ_i π_i (τ Wᵀ)_ii`: a site and one of its parents,
//! - `τ2 = Σ_i π_i (W τ Wᵀ)_ii`: two independent parents of the same site,
//! - `τ3 = Σ_i π_i (W τ (W²)ᵀ)_ii`: a parent and a grandparent of a site.
//!
//! On reversible (undirected) structures these equal the familiar
//! `τ^(n) = Σ_ij π_i p^(n)_ij τ_ij` for `n = 1, 2, 3`.
//!
//! A single mutant placed uniformly at random fixes with probability
//! `ρ_A = 1/N + δ ρ'_A + O(δ²)`, where
//!
//! `2N ρ'_A = −(R − S) τ1 + (S − P) τ2 + (T − P) τ3 + (R − S − T + P) θ`
//!
//! and `θ` is the triple moment [`Graph::triple_moment`]. The mutant is
//! favored when `ρ'_A > 0`. For additive games the last term vanishes and
//! only pair coalescence times are needed.
//!
//! The σ-rule `σR + S > T + σP`, `σ = (−τ1 + τ2 + τ3) / (τ1 + τ2 − τ3)`,
//! answers the different question `ρ_A > ρ_B`. The evaluator reports it
//! as well, multiplied through by its denominator so that it stays defined
//! when σ itself is not. The two verdicts coincide for additive games.

use serde::{Deserialize, Serialize};

use crate::error::NumericalError;

use super::game::Game;
use super::graph::Graph;

/// Graph-derived coefficients of the weak-selection condition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureCoefficients {
    pub tau1: f64,
    pub tau2: f64,
    pub tau3: f64,
    /// Structure coefficient σ; `None` when `τ1 + τ2 − τ3` vanishes.
    pub sigma: Option<f64>,
    /// Donation-game threshold `(b/c)* = τ2 / (τ3 − τ1)`; `None` when
    /// `τ3 = τ1`. A negative threshold means cooperation is never favored.
    pub critical_ratio: Option<f64>,
}

impl StructureCoefficients {
    /// Compute the coefficients of `graph`.
    pub fn from_graph(graph: &Graph) -> Result<Self, NumericalError> {
        let tau1 = graph.remote_coalescence(0, 1)?;
        let tau2 = graph.remote_coalescence(1, 1)?;
        let tau3 = graph.remote_coalescence(1, 2)?;
        Ok(Self::from_moments(tau1, tau2, tau3, graph.tolerance()))
    }

    /// Assemble coefficients from precomputed moments.
    pub fn from_moments(tau1: f64, tau2: f64, tau3: f64, tolerance: f64) -> Self {
        let scale = tau1.abs().max(tau2.abs()).max(tau3.abs()).max(1.0);
        let sigma_denominator = tau1 + tau2 - tau3;
        let sigma = (sigma_denominator.abs() > tolerance * scale)
            .then(|| (-tau1 + tau2 + tau3) / sigma_denominator);
        let ratio_denominator = tau3 - tau1;
        let critical_ratio =
            (ratio_denominator.abs() > tolerance * scale).then(|| tau2 / ratio_denominator);
        Self {
            tau1,
            tau2,
            tau3,
            sigma,
            critical_ratio,
        }
    }

    /// Weight of `R − P` in the selection differential.
    #[inline]
    pub fn diagonal_weight(&self) -> f64 {
        -self.tau1 + self.tau2 + self.tau3
    }

    /// Weight of `S − T` in the selection differential.
    #[inline]
    pub fn off_diagonal_weight(&self) -> f64 {
        self.tau1 + self.tau2 - self.tau3
    }

    /// `(−τ1 + τ2 + τ3)(R − P) + (τ1 + τ2 − τ3)(S − T)`; positive iff
    /// `ρ_A > ρ_B` under weak selection.
    pub fn selection_differential(&self, game: &Game) -> f64 {
        let (r, s, t, p) = game.entries();
        self.diagonal_weight() * (r - p) + self.off_diagonal_weight() * (s - t)
    }

    /// Pair-coalescence part of `2N ρ'_A`:
    /// `−(R − S) τ1 + (S − P) τ2 + (T − P) τ3`.
    pub fn pair_gradient(&self, game: &Game) -> f64 {
        let (r, s, t, p) = game.entries();
        -(r - s) * self.tau1 + (s - p) * self.tau2 + (t - p) * self.tau3
    }
}

/// Output of the exact evaluator for one game.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExactVerdict {
    pub coefficients: StructureCoefficients,
    /// σ-rule differential; positive when `ρ_A > ρ_B`.
    pub differential: f64,
    /// `dρ_A/dδ` at `δ = 0` for a uniformly placed mutant.
    pub fixation_gradient: f64,
    /// `δ · fixation_gradient`, the first-order estimate of `ρ_A − 1/N`.
    pub first_order_effect: f64,
    /// `ρ_A > 1/N` under weak selection.
    pub favored: bool,
    /// `ρ_A > ρ_B` under weak selection.
    pub beats_resident: bool,
}

impl ExactVerdict {
    /// The structure coefficient, if defined.
    pub fn sigma(&self) -> Option<f64> {
        self.coefficients.sigma
    }
}

/// Evaluates games against one graph, reusing its coefficients.
///
/// The triple moment is only solved for non-additive games and is cached
/// on the graph.
#[derive(Debug, Clone)]
pub struct ExactEvaluator<'a> {
    graph: &'a Graph,
    coefficients: StructureCoefficients,
    tolerance: f64,
}

impl<'a> ExactEvaluator<'a> {
    /// Solve for the coefficients of `graph`.
    pub fn new(graph: &'a Graph) -> Result<Self, NumericalError> {
        let coefficients = StructureCoefficients::from_graph(graph)?;
        log::debug!(
            "Structure coefficients: τ1={:.6} τ2={:.6} τ3={:.6} σ={:?}",
            coefficients.tau1,
            coefficients.tau2,
            coefficients.tau3,
            coefficients.sigma
        );
        Ok(Self {
            graph,
            coefficients,
            tolerance: graph.tolerance(),
        })
    }

    pub fn coefficients(&self) -> &StructureCoefficients {
        &self.coefficients
    }

    /// Direction of selection for `game`.
    ///
    /// Fails only when a non-additive game needs the triple moment and its
    /// solve fails.
    pub fn evaluate(&self, game: &Game) -> Result<ExactVerdict, NumericalError> {
        if game.delta() * (game.max_payoff() - game.min_payoff()) > 0.1 {
            log::warn!(
                "Selection intensity {} is large relative to the payoff range; \
                 the weak-selection verdict may not describe the process",
                game.delta()
            );
        }

        let c = &self.coefficients;
        let (r, s, t, p) = game.entries();
        let nodes = self.graph.len() as f64;

        let differential = c.selection_differential(game);
        let differential_scale =
            (c.diagonal_weight() * (r - p)).abs() + (c.off_diagonal_weight() * (s - t)).abs();

        let nonadditivity = r - s - t + p;
        let payoff_scale = (r - s).abs() + (s - p).abs() + (t - p).abs();
        let triple = if game.is_additive(self.tolerance * payoff_scale) {
            0.0
        } else {
            nonadditivity * self.graph.triple_moment()?
        };
        let gradient_scale = ((r - s) * c.tau1).abs()
            + ((s - p) * c.tau2).abs()
            + ((t - p) * c.tau3).abs()
            + triple.abs();
        let fixation_gradient = (c.pair_gradient(game) + triple) / (2.0 * nodes);

        Ok(ExactVerdict {
            coefficients: *c,
            differential,
            fixation_gradient,
            first_order_effect: game.delta() * fixation_gradient,
            favored: fixation_gradient
                > self.tolerance * gradient_scale.max(f64::MIN_POSITIVE) / (2.0 * nodes),
            beats_resident: differential > self.tolerance * differential_scale.max(f64::MIN_POSITIVE),
        })
    }
}

/// One-shot evaluation of `game` on `graph`.
pub fn evaluate(graph: &Graph, game: &Game) -> Result<ExactVerdict, NumericalError> {
    ExactEvaluator::new(graph)?.evaluate(game)
}
