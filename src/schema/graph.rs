//! Graph specifications: explicit weights or a generator family.

use serde::{Deserialize, Serialize};

/// How to build a population structure.
///
/// Explicit variants carry their weights; generator variants carry a node
/// count and parameters and are realized with a seed, so the same spec and
/// seed always produce the same graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum GraphSpec {
    /// Row-stochastic replacement matrix, validated as given.
    Stochastic {
        /// `weights[i][j]`: probability that a replacement at `i` comes from `j`.
        weights: Vec<Vec<f64>>,
    },
    /// Arbitrary non-negative edge weights, normalized per row.
    Adjacency {
        /// Raw edge weights; every row needs positive mass.
        weights: Vec<Vec<f64>>,
    },
    /// Complete graph without self-loops.
    Complete { nodes: usize },
    /// Undirected cycle.
    Cycle { nodes: usize },
    /// One hub joined to `leaves` leaves.
    Star { leaves: usize },
    /// Periodic square lattice with von Neumann neighborhoods.
    Lattice { side: usize },
    /// Uniformly sampled simple regular graph.
    RandomRegular { nodes: usize, degree: usize },
    /// G(n, p) random graph, resampled until connected.
    ErdosRenyi { nodes: usize, edge_probability: f64 },
    /// Directed graph with exponential edge weights and a directed ring
    /// guaranteeing irreducibility.
    RandomWeighted { nodes: usize, edge_probability: f64 },
}

impl Default for GraphSpec {
    fn default() -> Self {
        GraphSpec::Cycle { nodes: 4 }
    }
}

impl GraphSpec {
    /// Number of nodes the realized graph will have.
    pub fn node_count(&self) -> usize {
        match self {
            GraphSpec::Stochastic { weights } | GraphSpec::Adjacency { weights } => weights.len(),
            GraphSpec::Complete { nodes }
            | GraphSpec::Cycle { nodes }
            | GraphSpec::RandomRegular { nodes, .. }
            | GraphSpec::ErdosRenyi { nodes, .. }
            | GraphSpec::RandomWeighted { nodes, .. } => *nodes,
            GraphSpec::Star { leaves } => leaves + 1,
            GraphSpec::Lattice { side } => side * side,
        }
    }

    /// Whether realizing this spec consumes randomness.
    pub fn is_random(&self) -> bool {
        matches!(
            self,
            GraphSpec::RandomRegular { .. }
                | GraphSpec::ErdosRenyi { .. }
                | GraphSpec::RandomWeighted { .. }
        )
    }

    /// Short human-readable label.
    pub fn label(&self) -> String {
        match self {
            GraphSpec::Stochastic { weights } => format!("stochastic({})", weights.len()),
            GraphSpec::Adjacency { weights } => format!("adjacency({})", weights.len()),
            GraphSpec::Complete { nodes } => format!("complete({})", nodes),
            GraphSpec::Cycle { nodes } => format!("cycle({})", nodes),
            GraphSpec::Star { leaves } => format!("star({})", leaves),
            GraphSpec::Lattice { side } => format!("lattice({}x{})", side, side),
            GraphSpec::RandomRegular { nodes, degree } => {
                format!("random-regular({}, k={})", nodes, degree)
            }
            GraphSpec::ErdosRenyi {
                nodes,
                edge_probability,
            } => format!("erdos-renyi({}, p={})", nodes, edge_probability),
            GraphSpec::RandomWeighted {
                nodes,
                edge_probability,
            } => format!("random-weighted({}, p={})", nodes, edge_probability),
        }
    }
}
