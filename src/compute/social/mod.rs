//! Producers of social goods under death–birth updating with mutation.
//!
//! Each individual either produces a good (trait 1) or does not (trait 0).
//! How cost and benefit scale with the structure depends on the
//! [`SocialGood`]:
//!
//! - `Ff`: a producer pays `c` and its benefit `b` is split along its
//!   outgoing normalized weights, `f_i = −c x_i + b Σ_k W_ki x_k`;
//! - `Pp`: a producer pays `c` per unit of raw edge weight and gives `b`
//!   across each edge, `f_i = −c x_i Σ_k w_ik + b Σ_k w_ki x_k`.
//!
//! [`SocialAnalysis`] computes the first-order effect of selection on the
//! mean producer frequency; [`MutationSelection`] simulates the process.

mod exact;
mod simulation;

pub use exact::*;
pub use simulation::*;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::schema::SocialGood;

use super::graph::Graph;

/// A social good with its benefit and cost.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Production {
    pub good: SocialGood,
    pub benefit: f64,
    pub cost: f64,
}

impl Production {
    pub fn new(good: SocialGood, benefit: f64, cost: f64) -> Result<Self, ValidationError> {
        if !benefit.is_finite() {
            return Err(ValidationError::NonFinitePayoff { name: "benefit" });
        }
        if !cost.is_finite() {
            return Err(ValidationError::NonFinitePayoff { name: "cost" });
        }
        Ok(Self {
            good,
            benefit,
            cost,
        })
    }

    /// Payoff of node `i` when `producer(k)` tells whether `k` produces.
    pub fn payoff(&self, graph: &Graph, producer: impl Fn(usize) -> bool, i: usize) -> f64 {
        let indicator = |k: usize| if producer(k) { 1.0 } else { 0.0 };
        let n = graph.len();
        match self.good {
            SocialGood::Ff => {
                let received: f64 = (0..n).map(|k| graph.transition(k, i) * indicator(k)).sum();
                -self.cost * indicator(i) + self.benefit * received
            }
            SocialGood::Pp => {
                let received: f64 = (0..n).map(|k| graph.weight(k, i) * indicator(k)).sum();
                -self.cost * indicator(i) * graph.degree(i) + self.benefit * received
            }
        }
    }
}

/// Mutation probabilities for the exact side must lie in `(0, 1]`.
fn check_mutation_rate(u: f64) -> Result<(), ValidationError> {
    if u > 0.0 && u <= 1.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidParameter {
            name: "mutation_rate",
            reason: format!("must be in (0, 1], got {}", u),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn star() -> Graph {
        Graph::from_adjacency(&[
            vec![0.0, 1.0, 1.0, 1.0, 1.0],
            vec![1.0, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0, 0.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn test_payoffs_by_good() {
        let graph = star();
        let hub_only = |k: usize| k == 0;
        let ff = Production::new(SocialGood::Ff, 4.0, 1.0).unwrap();
        assert_eq!(ff.payoff(&graph, hub_only, 0), -1.0);
        assert_eq!(ff.payoff(&graph, hub_only, 3), 1.0);
        let pp = Production::new(SocialGood::Pp, 4.0, 1.0).unwrap();
        assert_eq!(pp.payoff(&graph, hub_only, 0), -4.0);
        assert_eq!(pp.payoff(&graph, hub_only, 3), 4.0);
    }

    #[test]
    fn test_rejects_non_finite() {
        assert!(Production::new(SocialGood::Ff, f64::INFINITY, 1.0).is_err());
        assert!(check_mutation_rate(0.0).is_err());
        assert!(check_mutation_rate(1.0).is_ok());
    }
}
