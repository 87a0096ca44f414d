//! Population state for the fixation simulator.
//!
//! Payoffs are `f_i = Σ_j W_ij a(s_i, s_j)`. Instead of recomputing them
//! after every update, each node tracks the `W`-weight of its mutant
//! neighbors; a strategy change at `j` only touches the nodes that draw from
//! `j`.

use crate::error::ValidationError;

use super::game::{Game, Strategy};
use super::graph::Graph;

/// Sparse view of `W` in both directions, built once per graph.
#[derive(Debug, Clone)]
pub struct Neighborhood {
    /// Row `i`: `(j, W_ij)` for `W_ij > 0`.
    parents: Vec<Vec<(usize, f64)>>,
    /// Column `j`: `(i, W_ij)` for `W_ij > 0`.
    dependents: Vec<Vec<(usize, f64)>>,
}

impl Neighborhood {
    pub fn new(graph: &Graph) -> Self {
        let n = graph.len();
        let mut parents = vec![Vec::new(); n];
        let mut dependents = vec![Vec::new(); n];
        for (i, row) in parents.iter_mut().enumerate() {
            for (j, p) in graph.neighbors(i) {
                row.push((j, p));
                dependents[j].push((i, p));
            }
        }
        Self {
            parents,
            dependents,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.parents.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// Nodes `i` may draw a replacement from.
    #[inline]
    pub fn parents(&self, i: usize) -> &[(usize, f64)] {
        &self.parents[i]
    }

    /// Nodes whose replacement may come from `j`.
    #[inline]
    pub fn dependents(&self, j: usize) -> &[(usize, f64)] {
        &self.dependents[j]
    }

    /// First node that no node draws from, if any.
    pub fn first_unreachable(&self) -> Option<usize> {
        self.dependents.iter().position(|d| d.is_empty())
    }
}

/// Strategy assignment with incrementally maintained payoffs.
#[derive(Debug, Clone)]
pub struct Population<'a> {
    neighborhood: &'a Neighborhood,
    game: Game,
    strategies: Vec<Strategy>,
    /// `Σ_j W_ij [s_j = Mutant]` per node.
    mutant_weight: Vec<f64>,
    mutants: usize,
}

impl<'a> Population<'a> {
    /// Population with an explicit strategy per node.
    pub fn new(
        neighborhood: &'a Neighborhood,
        game: Game,
        strategies: Vec<Strategy>,
    ) -> Result<Self, ValidationError> {
        if strategies.len() != neighborhood.len() {
            return Err(ValidationError::StateLength {
                expected: neighborhood.len(),
                got: strategies.len(),
            });
        }
        let mutant_weight = (0..neighborhood.len())
            .map(|i| {
                neighborhood
                    .parents(i)
                    .iter()
                    .filter(|&&(j, _)| strategies[j] == Strategy::Mutant)
                    .map(|&(_, p)| p)
                    .sum()
            })
            .collect();
        let mutants = strategies
            .iter()
            .filter(|&&s| s == Strategy::Mutant)
            .count();
        Ok(Self {
            neighborhood,
            game,
            strategies,
            mutant_weight,
            mutants,
        })
    }

    /// All residents except a single mutant at `node`.
    pub fn single_mutant(
        neighborhood: &'a Neighborhood,
        game: Game,
        node: usize,
    ) -> Result<Self, ValidationError> {
        if node >= neighborhood.len() {
            return Err(ValidationError::NodeOutOfRange {
                node,
                len: neighborhood.len(),
            });
        }
        let mut strategies = vec![Strategy::Resident; neighborhood.len()];
        strategies[node] = Strategy::Mutant;
        Self::new(neighborhood, game, strategies)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    #[inline]
    pub fn neighborhood(&self) -> &'a Neighborhood {
        self.neighborhood
    }

    #[inline]
    pub fn strategy(&self, i: usize) -> Strategy {
        self.strategies[i]
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Number of mutants.
    #[inline]
    pub fn mutants(&self) -> usize {
        self.mutants
    }

    #[inline]
    pub fn is_fixed(&self) -> bool {
        self.mutants == self.len()
    }

    #[inline]
    pub fn is_extinct(&self) -> bool {
        self.mutants == 0
    }

    /// Whether an absorbing state has been reached.
    #[inline]
    pub fn is_absorbed(&self) -> bool {
        self.is_fixed() || self.is_extinct()
    }

    /// `f_i = Σ_j W_ij a(s_i, s_j)`.
    #[inline]
    pub fn payoff(&self, i: usize) -> f64 {
        let m = self.mutant_weight[i].clamp(0.0, 1.0);
        let focal = self.strategies[i];
        m * self.game.payoff(focal, Strategy::Mutant)
            + (1.0 - m) * self.game.payoff(focal, Strategy::Resident)
    }

    /// Assign `strategy` to `node`, updating the payoffs that depend on it.
    pub fn set(&mut self, node: usize, strategy: Strategy) {
        let previous = self.strategies[node];
        if previous == strategy {
            return;
        }
        self.strategies[node] = strategy;
        let sign = match strategy {
            Strategy::Mutant => {
                self.mutants += 1;
                1.0
            }
            Strategy::Resident => {
                self.mutants -= 1;
                -1.0
            }
        };
        for &(i, p) in self.neighborhood.dependents(node) {
            self.mutant_weight[i] += sign * p;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path() -> Graph {
        Graph::from_adjacency(&[
            vec![0.0, 1.0, 0.0],
            vec![1.0, 0.0, 3.0],
            vec![0.0, 1.0, 0.0],
        ])
        .unwrap()
    }

    fn full_payoff(graph: &Graph, game: &Game, strategies: &[Strategy], i: usize) -> f64 {
        (0..graph.len())
            .map(|j| graph.transition(i, j) * game.payoff(strategies[i], strategies[j]))
            .sum()
    }

    #[test]
    fn test_neighborhood_directions() {
        let graph = path();
        let hood = Neighborhood::new(&graph);
        assert_eq!(hood.parents(1).to_vec(), vec![(0usize, 0.25), (2, 0.75)]);
        assert_eq!(hood.dependents(1).to_vec(), vec![(0usize, 1.0), (2, 1.0)]);
        assert_eq!(hood.first_unreachable(), None);
    }

    #[test]
    fn test_single_mutant() {
        let graph = path();
        let hood = Neighborhood::new(&graph);
        let game = Game::new(3.0, 0.0, 5.0, 1.0, 0.1).unwrap();
        let population = Population::single_mutant(&hood, game, 2).unwrap();
        assert_eq!(population.mutants(), 1);
        assert!(!population.is_absorbed());
        assert_eq!(population.payoff(1), 0.75 * 5.0 + 0.25 * 1.0);
        assert!(Population::single_mutant(&hood, game, 3).is_err());
    }

    #[test]
    fn test_incremental_payoffs_match_full() {
        let graph = path();
        let hood = Neighborhood::new(&graph);
        let game = Game::new(2.0, -1.0, 4.0, 0.5, 0.1).unwrap();
        let mut population = Population::single_mutant(&hood, game, 0).unwrap();
        for (node, strategy) in [
            (1, Strategy::Mutant),
            (0, Strategy::Resident),
            (2, Strategy::Mutant),
            (1, Strategy::Mutant),
        ] {
            population.set(node, strategy);
            for i in 0..3 {
                let expected = full_payoff(&graph, &game, population.strategies(), i);
                assert!((population.payoff(i) - expected).abs() < 1e-12);
            }
        }
        assert_eq!(population.mutants(), 2);
    }

    #[test]
    fn test_absorbing_states() {
        let graph = path();
        let hood = Neighborhood::new(&graph);
        let game = Game::new(1.0, 1.0, 1.0, 1.0, 0.0).unwrap();
        let mut population = Population::single_mutant(&hood, game, 1).unwrap();
        population.set(1, Strategy::Resident);
        assert!(population.is_extinct());
        for i in 0..3 {
            population.set(i, Strategy::Mutant);
        }
        assert!(population.is_fixed());
    }

    #[test]
    fn test_state_length_checked() {
        let graph = path();
        let hood = Neighborhood::new(&graph);
        let game = Game::new(1.0, 0.0, 0.0, 0.0, 0.0).unwrap();
        assert_eq!(
            Population::new(&hood, game, vec![Strategy::Mutant]).unwrap_err(),
            ValidationError::StateLength {
                expected: 3,
                got: 1
            }
        );
    }
}
