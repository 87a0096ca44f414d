//! Graph generation from specifications.
//!
//! Deterministic families ignore the seed; random families draw from a
//! `StdRng` seeded with it, so a `(spec, seed)` pair always yields the same
//! graph.

use rand::prelude::*;
use rand_distr::Exp1;

use crate::error::ValidationError;
use crate::schema::GraphSpec;

use super::graph::Graph;
use super::linalg::Matrix;

/// Resampling budget for random families that must come out connected.
const MAX_ATTEMPTS: usize = 1_000;

/// Builds a [`Graph`] from a seed.
pub trait GraphGenerator {
    fn generate(&self, seed: u64) -> Result<Graph, ValidationError>;
}

impl GraphGenerator for GraphSpec {
    fn generate(&self, seed: u64) -> Result<Graph, ValidationError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let graph = match self {
            GraphSpec::Stochastic { weights } => Graph::from_stochastic(weights)?,
            GraphSpec::Adjacency { weights } => Graph::from_adjacency(weights)?,
            GraphSpec::Complete { nodes } => complete(*nodes)?,
            GraphSpec::Cycle { nodes } => cycle(*nodes)?,
            GraphSpec::Star { leaves } => star(*leaves)?,
            GraphSpec::Lattice { side } => lattice(*side)?,
            GraphSpec::RandomRegular { nodes, degree } => {
                random_regular(*nodes, *degree, &mut rng)?
            }
            GraphSpec::ErdosRenyi {
                nodes,
                edge_probability,
            } => erdos_renyi(*nodes, *edge_probability, &mut rng)?,
            GraphSpec::RandomWeighted {
                nodes,
                edge_probability,
            } => random_weighted(*nodes, *edge_probability, &mut rng)?,
        };
        log::debug!("Generated {} with seed {}", self.label(), seed);
        Ok(graph)
    }
}

fn invalid(name: &'static str, reason: impl Into<String>) -> ValidationError {
    ValidationError::InvalidParameter {
        name,
        reason: reason.into(),
    }
}

fn require_nodes(nodes: usize, minimum: usize) -> Result<(), ValidationError> {
    if nodes < minimum {
        return Err(invalid(
            "nodes",
            format!("need at least {} nodes, got {}", minimum, nodes),
        ));
    }
    Ok(())
}

fn require_probability(p: f64, allow_zero: bool) -> Result<(), ValidationError> {
    let lower_ok = if allow_zero { p >= 0.0 } else { p > 0.0 };
    if !(p.is_finite() && lower_ok && p <= 1.0) {
        return Err(ValidationError::InvalidProbability { value: p });
    }
    Ok(())
}

/// Unit-weight undirected graph from an edge list.
fn undirected(nodes: usize, edges: impl IntoIterator<Item = (usize, usize)>) -> Matrix {
    let mut weights = Matrix::zeros(nodes, nodes);
    for (i, j) in edges {
        weights[(i, j)] = 1.0;
        weights[(j, i)] = 1.0;
    }
    weights
}

fn complete(nodes: usize) -> Result<Graph, ValidationError> {
    require_nodes(nodes, 2)?;
    let weights = Matrix::from_fn(nodes, nodes, |i, j| if i == j { 0.0 } else { 1.0 });
    Graph::from_adjacency_matrix(weights)
}

fn cycle(nodes: usize) -> Result<Graph, ValidationError> {
    require_nodes(nodes, 3)?;
    Graph::from_adjacency_matrix(undirected(nodes, (0..nodes).map(|i| (i, (i + 1) % nodes))))
}

fn star(leaves: usize) -> Result<Graph, ValidationError> {
    if leaves == 0 {
        return Err(invalid("leaves", "a star needs at least one leaf"));
    }
    Graph::from_adjacency_matrix(undirected(leaves + 1, (1..=leaves).map(|leaf| (0, leaf))))
}

fn lattice(side: usize) -> Result<Graph, ValidationError> {
    if side < 3 {
        return Err(invalid(
            "side",
            format!("a periodic lattice needs side ≥ 3, got {}", side),
        ));
    }
    let index = |x: usize, y: usize| y * side + x;
    let edges = (0..side).flat_map(|y| {
        (0..side).flat_map(move |x| {
            [
                (index(x, y), index((x + 1) % side, y)),
                (index(x, y), index(x, (y + 1) % side)),
            ]
        })
    });
    Graph::from_adjacency_matrix(undirected(side * side, edges))
}

/// Configuration model with incremental pairing: stubs that would form a
/// self-loop or a repeated edge are reshuffled among themselves until they
/// can all be placed, and the attempt restarts only when no placement is
/// left.
fn random_regular(nodes: usize, degree: usize, rng: &mut StdRng) -> Result<Graph, ValidationError> {
    require_nodes(nodes, 3)?;
    if degree == 0 || degree >= nodes {
        return Err(invalid(
            "degree",
            format!("must be in 1..{} for {} nodes, got {}", nodes, nodes, degree),
        ));
    }
    if (nodes * degree) % 2 != 0 {
        return Err(invalid("degree", "nodes × degree must be even"));
    }

    for attempt in 1..=MAX_ATTEMPTS {
        let Some(weights) = pair_stubs(nodes, degree, rng) else {
            continue;
        };
        let graph = Graph::from_adjacency_matrix(weights)?;
        if graph.is_strongly_connected() {
            log::debug!("Random regular graph accepted after {} attempts", attempt);
            return Ok(graph);
        }
    }

    Err(invalid(
        "degree",
        format!(
            "no connected simple {}-regular graph on {} nodes after {} attempts",
            degree, nodes, MAX_ATTEMPTS
        ),
    ))
}

/// One pairing attempt; `None` when the leftover stubs cannot be joined.
fn pair_stubs(nodes: usize, degree: usize, rng: &mut StdRng) -> Option<Matrix> {
    let mut weights = Matrix::zeros(nodes, nodes);
    let mut stubs: Vec<usize> = (0..nodes)
        .flat_map(|node| std::iter::repeat_n(node, degree))
        .collect();
    let mut leftover = vec![0usize; nodes];

    for _ in 0..100 * nodes * degree {
        if stubs.is_empty() {
            return Some(weights);
        }
        stubs.shuffle(rng);
        leftover.fill(0);
        for pair in stubs.chunks_exact(2) {
            let (i, j) = (pair[0], pair[1]);
            if i != j && weights[(i, j)] == 0.0 {
                weights[(i, j)] = 1.0;
                weights[(j, i)] = 1.0;
            } else {
                leftover[i] += 1;
                leftover[j] += 1;
            }
        }

        let open: Vec<usize> = (0..nodes).filter(|&i| leftover[i] > 0).collect();
        let joinable = open.iter().enumerate().any(|(a, &i)| {
            open[a + 1..].iter().any(|&j| weights[(i, j)] == 0.0)
        });
        if !open.is_empty() && !joinable {
            return None;
        }
        stubs = open
            .iter()
            .flat_map(|&node| std::iter::repeat_n(node, leftover[node]))
            .collect();
    }
    stubs.is_empty().then_some(weights)
}

fn erdos_renyi(nodes: usize, p: f64, rng: &mut StdRng) -> Result<Graph, ValidationError> {
    require_nodes(nodes, 2)?;
    require_probability(p, false)?;

    for attempt in 1..=MAX_ATTEMPTS {
        let mut edges = Vec::new();
        for i in 0..nodes {
            for j in (i + 1)..nodes {
                if rng.gen_bool(p) {
                    edges.push((i, j));
                }
            }
        }
        let weights = undirected(nodes, edges);
        // Isolated nodes cannot be normalized; resample
        let Ok(graph) = Graph::from_adjacency_matrix(weights) else {
            continue;
        };
        if graph.is_strongly_connected() {
            log::debug!("Erdős–Rényi graph accepted after {} attempts", attempt);
            return Ok(graph);
        }
    }

    Err(invalid(
        "edge_probability",
        format!(
            "no connected G({}, {}) sample after {} attempts",
            nodes, p, MAX_ATTEMPTS
        ),
    ))
}

fn random_weighted(nodes: usize, p: f64, rng: &mut StdRng) -> Result<Graph, ValidationError> {
    require_nodes(nodes, 2)?;
    require_probability(p, true)?;

    let mut weights = Matrix::zeros(nodes, nodes);
    for i in 0..nodes {
        for j in 0..nodes {
            if i != j && rng.gen_bool(p) {
                weights[(i, j)] = rng.sample::<f64, _>(Exp1);
            }
        }
        // Directed ring keeps every node reachable
        weights[(i, (i + 1) % nodes)] += rng.sample::<f64, _>(Exp1);
    }
    Graph::from_adjacency_matrix(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_complete_is_uniform() {
        let graph = GraphSpec::Complete { nodes: 5 }.generate(0).unwrap();
        for i in 0..5 {
            for j in 0..5 {
                let expected = if i == j { 0.0 } else { 0.25 };
                assert_eq!(graph.transition(i, j), expected);
            }
        }
    }

    #[test]
    fn test_cycle_and_lattice_are_regular() {
        let cycle = GraphSpec::Cycle { nodes: 6 }.generate(0).unwrap();
        assert!((0..6).all(|i| cycle.degree(i) == 2.0));
        let lattice = GraphSpec::Lattice { side: 4 }.generate(0).unwrap();
        assert_eq!(lattice.len(), 16);
        assert!((0..16).all(|i| lattice.degree(i) == 4.0));
        assert!(lattice.is_strongly_connected());
    }

    #[test]
    fn test_star_structure() {
        let graph = GraphSpec::Star { leaves: 4 }.generate(0).unwrap();
        assert_eq!(graph.degree(0), 4.0);
        assert!((1..5).all(|leaf| graph.transition(leaf, 0) == 1.0));
    }

    #[test]
    fn test_random_regular() {
        let spec = GraphSpec::RandomRegular {
            nodes: 12,
            degree: 3,
        };
        let graph = spec.generate(7).unwrap();
        for i in 0..12 {
            assert_eq!(graph.degree(i), 3.0);
            assert_eq!(graph.weight(i, i), 0.0);
        }
        assert!(graph.is_strongly_connected());
    }

    #[test]
    fn test_dense_random_regular() {
        for (nodes, degree) in [(20usize, 8usize), (30, 10), (10, 7)] {
            for seed in 0..5 {
                let graph = GraphSpec::RandomRegular { nodes, degree }
                    .generate(seed)
                    .unwrap();
                for i in 0..nodes {
                    assert_eq!(graph.degree(i), degree as f64, "node {} seed {}", i, seed);
                    assert_eq!(graph.weight(i, i), 0.0);
                    for j in 0..nodes {
                        assert_eq!(graph.weight(i, j), graph.weight(j, i));
                        assert!(graph.weight(i, j) == 0.0 || graph.weight(i, j) == 1.0);
                    }
                }
            }
        }
    }

    #[test]
    fn test_random_families_are_seeded() {
        let spec = GraphSpec::ErdosRenyi {
            nodes: 10,
            edge_probability: 0.4,
        };
        let a = spec.generate(42).unwrap();
        let b = spec.generate(42).unwrap();
        assert_eq!(a.transitions(), b.transitions());
    }

    #[test]
    fn test_random_weighted_is_irreducible() {
        let spec = GraphSpec::RandomWeighted {
            nodes: 8,
            edge_probability: 0.0,
        };
        let graph = spec.generate(3).unwrap();
        assert!(graph.is_strongly_connected());
        assert!(graph.stationary_distribution().is_ok());
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(GraphSpec::RandomRegular { nodes: 5, degree: 3 }.generate(0).is_err());
        assert!(GraphSpec::Cycle { nodes: 2 }.generate(0).is_err());
        assert!(matches!(
            GraphSpec::ErdosRenyi {
                nodes: 5,
                edge_probability: 1.5
            }
            .generate(0),
            Err(ValidationError::InvalidProbability { .. })
        ));
    }

    #[test]
    fn test_explicit_spec_validates() {
        let spec = GraphSpec::Stochastic {
            weights: vec![vec![0.1, 0.8], vec![1.0, 0.0]],
        };
        assert!(matches!(
            spec.generate(0),
            Err(ValidationError::RowSum { row: 0, .. })
        ));
    }
}
