//! Weighted population structure.
//!
//! A graph holds a row-stochastic replacement matrix `W`: `W[i][j]` is the
//! probability that, when the individual at `i` is replaced, the replacement
//! is an offspring of `j`. Following lineages backwards in time, `W` is the
//! ancestral random walk. It doubles as the interaction weighting, so an
//! individual's payoff is the `W`-weighted average over its neighbors.
//!
//! Derived quantities (stationary distribution, pair and triple coalescence
//! times) are computed on first use and cached; a `Graph` is immutable and
//! can be shared read-only across simulation threads.

use std::collections::VecDeque;
use std::sync::OnceLock;

use crate::error::{Error, NumericalError, ValidationError};
use crate::schema::SolverMethod;

use super::coalescence::{
    DENSE_TRIPLE_LIMIT, TripleCoalescence, coalescence_times, triple_coalescence_times,
};
use super::linalg::{DEFAULT_TOLERANCE, Matrix, solve};

/// Gauss–Seidel settings for triple systems too large to factor.
const TRIPLE_SWEEPS: SolverMethod = SolverMethod::Iterative {
    tolerance: 1e-13,
    max_iterations: 1_000_000,
};

/// Immutable population structure with cached derived quantities.
#[derive(Debug, Clone)]
pub struct Graph {
    /// Row-stochastic replacement / ancestral walk matrix.
    transitions: Matrix,
    /// Raw edge weights the graph was built from.
    weights: Matrix,
    /// Row-sum and residual tolerance.
    tolerance: f64,
    stationary: OnceLock<Result<Vec<f64>, NumericalError>>,
    coalescence: OnceLock<Result<Matrix, NumericalError>>,
    triples: OnceLock<Result<TripleCoalescence, NumericalError>>,
}

impl Graph {
    /// Build from a row-stochastic matrix given as nested rows.
    pub fn from_stochastic(rows: &[Vec<f64>]) -> Result<Self, ValidationError> {
        Self::from_stochastic_with_tolerance(rows, DEFAULT_TOLERANCE)
    }

    /// Build from a row-stochastic matrix with a custom row-sum tolerance.
    pub fn from_stochastic_with_tolerance(
        rows: &[Vec<f64>],
        tolerance: f64,
    ) -> Result<Self, ValidationError> {
        let matrix = Matrix::from_rows(rows)?;
        Self::from_stochastic_matrix(matrix, tolerance)
    }

    /// Build from a row-stochastic [`Matrix`].
    ///
    /// Every entry must be finite and non-negative and every row must sum to
    /// one within `tolerance`.
    pub fn from_stochastic_matrix(matrix: Matrix, tolerance: f64) -> Result<Self, ValidationError> {
        check_tolerance(tolerance)?;
        check_entries(&matrix)?;
        for (row, sum) in matrix.row_sums().into_iter().enumerate() {
            if (sum - 1.0).abs() > tolerance {
                return Err(ValidationError::RowSum { row, sum });
            }
        }
        Ok(Self::new_unchecked(matrix.clone(), matrix, tolerance))
    }

    /// Build from arbitrary non-negative edge weights, normalizing each row.
    pub fn from_adjacency(rows: &[Vec<f64>]) -> Result<Self, ValidationError> {
        let matrix = Matrix::from_rows(rows)?;
        Self::from_adjacency_matrix(matrix)
    }

    /// Build from a raw weight [`Matrix`], normalizing each row.
    pub fn from_adjacency_matrix(weights: Matrix) -> Result<Self, ValidationError> {
        check_entries(&weights)?;
        let sums = weights.row_sums();
        if let Some(row) = sums.iter().position(|&s| s <= 0.0) {
            return Err(ValidationError::ZeroRow { row });
        }
        let transitions = Matrix::from_fn(weights.rows(), weights.cols(), |i, j| {
            weights[(i, j)] / sums[i]
        });
        Ok(Self::new_unchecked(transitions, weights, DEFAULT_TOLERANCE))
    }

    fn new_unchecked(transitions: Matrix, weights: Matrix, tolerance: f64) -> Self {
        Self {
            transitions,
            weights,
            tolerance,
            stationary: OnceLock::new(),
            coalescence: OnceLock::new(),
            triples: OnceLock::new(),
        }
    }

    /// Number of nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.transitions.rows()
    }

    /// Always false: construction rejects empty graphs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// The row-stochastic matrix `W`.
    #[inline]
    pub fn transitions(&self) -> &Matrix {
        &self.transitions
    }

    /// Raw edge weights (equal to `W` for stochastic construction).
    #[inline]
    pub fn weights(&self) -> &Matrix {
        &self.weights
    }

    #[inline]
    pub fn transition(&self, i: usize, j: usize) -> f64 {
        self.transitions[(i, j)]
    }

    #[inline]
    pub fn weight(&self, i: usize, j: usize) -> f64 {
        self.weights[(i, j)]
    }

    /// Nodes `j` with `W[i][j] > 0`, with their transition probability.
    pub fn neighbors(&self, i: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.transitions
            .row(i)
            .iter()
            .copied()
            .enumerate()
            .filter(|&(_, p)| p > 0.0)
    }

    /// Raw outgoing weight of node `i`.
    pub fn degree(&self, i: usize) -> f64 {
        self.weights.row(i).iter().sum()
    }

    /// Check that `i` is a valid node index.
    pub fn check_node(&self, node: usize) -> Result<(), ValidationError> {
        if node < self.len() {
            Ok(())
        } else {
            Err(ValidationError::NodeOutOfRange {
                node,
                len: self.len(),
            })
        }
    }

    /// Whether every node reaches every other along positive transitions.
    pub fn is_strongly_connected(&self) -> bool {
        let n = self.len();
        let forward = reachable_from(n, 0, |i, j| self.transitions[(i, j)] > 0.0);
        let backward = reachable_from(n, 0, |i, j| self.transitions[(j, i)] > 0.0);
        forward && backward
    }

    /// Stationary distribution `π = πW`, `Σπ = 1`.
    ///
    /// Reducible graphs and singular or ill-conditioned solves are reported
    /// as [`NumericalError`]. The result is cached.
    pub fn stationary_distribution(&self) -> Result<&[f64], NumericalError> {
        self.stationary
            .get_or_init(|| stationary_distribution(&self.transitions, self.tolerance))
            .as_deref()
            .map_err(Clone::clone)
    }

    /// Pairwise coalescence times `τ`, solved directly and cached.
    ///
    /// `τ_ii = 0` and `τ_ij = 1 + ½ Σ_k (W_ik τ_kj + W_jk τ_ik)`.
    pub fn coalescence_times(&self) -> Result<&Matrix, NumericalError> {
        self.coalescence
            .get_or_init(|| {
                if !self.is_strongly_connected() {
                    return Err(NumericalError::Reducible);
                }
                coalescence_times(&self.transitions, &SolverMethod::Direct)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Three-lineage coalescence times, cached.
    ///
    /// Small graphs are solved directly; above [`DENSE_TRIPLE_LIMIT`]
    /// unknowns the system is swept with Gauss–Seidel.
    pub fn triple_coalescence_times(&self) -> Result<&TripleCoalescence, NumericalError> {
        self.triples
            .get_or_init(|| {
                let pairs = self.coalescence_times()?;
                let n = self.len();
                let unknowns = n * n.saturating_sub(1) * n.saturating_sub(2) / 6;
                let method = if unknowns <= DENSE_TRIPLE_LIMIT {
                    SolverMethod::Direct
                } else {
                    TRIPLE_SWEEPS
                };
                triple_coalescence_times(&self.transitions, pairs, &method)
            })
            .as_ref()
            .map_err(Clone::clone)
    }

    /// `Σ_i π_i Σ_jkl W_ij W_ik W_kl T_jkl`: three lineages placed at two
    /// parents of a `π`-sampled site and at a parent of the second one.
    pub fn triple_moment(&self) -> Result<f64, NumericalError> {
        let pi = self.stationary_distribution()?;
        let triples = self.triple_coalescence_times()?;
        let n = self.len();

        // M_jk = Σ_i π_i W_ij W_ik
        let mut parents = Matrix::zeros(n, n);
        for (i, &p) in pi.iter().enumerate() {
            for (j, w_ij) in self.neighbors(i) {
                for (k, w_ik) in self.neighbors(i) {
                    parents[(j, k)] += p * w_ij * w_ik;
                }
            }
        }

        let mut total = 0.0;
        for j in 0..n {
            for k in 0..n {
                let m = parents[(j, k)];
                if m == 0.0 {
                    continue;
                }
                for (l, w_kl) in self.neighbors(k) {
                    total += m * w_kl * triples.get(j, k, l);
                }
            }
        }
        Ok(total)
    }

    /// Expected coalescence time of lineages sampled at `i` and `j`.
    pub fn coalescence(&self, i: usize, j: usize) -> Result<f64, Error> {
        self.check_node(i)?;
        self.check_node(j)?;
        Ok(self.coalescence_times()?[(i, j)])
    }

    /// Mean coalescence time of two lineages sampled from `π`.
    pub fn mean_coalescence(&self) -> Result<f64, NumericalError> {
        let pi = self.stationary_distribution()?;
        let tau = self.coalescence_times()?;
        let mut total = 0.0;
        for (i, &pi_i) in pi.iter().enumerate() {
            total += pi_i * tau.row(i).iter().zip(pi).map(|(t, p)| t * p).sum::<f64>();
        }
        Ok(total)
    }

    /// Relatedness `1 − τ_ij / τ̄`, one on the diagonal.
    pub fn relatedness(&self, i: usize, j: usize) -> Result<f64, Error> {
        let tau_ij = self.coalescence(i, j)?;
        let mean = self.mean_coalescence()?;
        if mean <= 0.0 {
            return Ok(1.0);
        }
        Ok(1.0 - tau_ij / mean)
    }

    /// `W^n`, the `n`-step ancestral walk.
    pub fn step_power(&self, n: u32) -> Matrix {
        self.transitions.power(n)
    }

    /// `Σ_i π_i (W^a τ (W^b)ᵀ)_ii`: expected coalescence time of two lineages
    /// that start `a` and `b` ancestral steps away from a site sampled from `π`.
    pub fn remote_coalescence(&self, a: u32, b: u32) -> Result<f64, NumericalError> {
        let pi = self.stationary_distribution()?;
        let tau = self.coalescence_times()?;
        let left = self.step_power(a).matmul(tau);
        let right = self.step_power(b);
        Ok(pi
            .iter()
            .enumerate()
            .map(|(i, &p)| p * left.row(i).iter().zip(right.row(i)).map(|(l, r)| l * r).sum::<f64>())
            .sum())
    }

    /// Whether `π_i W_ij = π_j W_ji` for all pairs.
    pub fn is_reversible(&self) -> Result<bool, NumericalError> {
        let pi = self.stationary_distribution()?;
        let n = self.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let flow = pi[i] * self.transitions[(i, j)] - pi[j] * self.transitions[(j, i)];
                if flow.abs() > self.tolerance {
                    return Ok(false);
                }
            }
        }
        Ok(true)
    }
}

fn check_tolerance(tolerance: f64) -> Result<(), ValidationError> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidParameter {
            name: "tolerance",
            reason: format!("must be positive and finite, got {}", tolerance),
        })
    }
}

fn check_entries(matrix: &Matrix) -> Result<(), ValidationError> {
    if !matrix.is_square() {
        return Err(ValidationError::NonSquare {
            rows: matrix.rows(),
            cols: matrix.cols(),
        });
    }
    if matrix.rows() < 2 {
        return Err(ValidationError::InvalidParameter {
            name: "nodes",
            reason: format!("a population needs at least 2 nodes, got {}", matrix.rows()),
        });
    }
    for row in 0..matrix.rows() {
        for col in 0..matrix.cols() {
            let value = matrix[(row, col)];
            if !value.is_finite() {
                return Err(ValidationError::NonFinite { row, col });
            }
            if value < 0.0 {
                return Err(ValidationError::NegativeWeight { row, col, value });
            }
        }
    }
    Ok(())
}

/// Breadth-first search; true when every node is reached from `start`.
fn reachable_from(n: usize, start: usize, edge: impl Fn(usize, usize) -> bool) -> bool {
    let mut seen = vec![false; n];
    let mut queue = VecDeque::from([start]);
    seen[start] = true;
    let mut count = 1;
    while let Some(i) = queue.pop_front() {
        for j in 0..n {
            if !seen[j] && edge(i, j) {
                seen[j] = true;
                count += 1;
                queue.push_back(j);
            }
        }
    }
    count == n
}

/// Solve `(I − W)ᵀ πᵀ = 0` with the last equation replaced by `Σπ = 1`.
fn stationary_distribution(transitions: &Matrix, tolerance: f64) -> Result<Vec<f64>, NumericalError> {
    let n = transitions.rows();
    let connected = reachable_from(n, 0, |i, j| transitions[(i, j)] > 0.0)
        && reachable_from(n, 0, |i, j| transitions[(j, i)] > 0.0);
    if !connected {
        return Err(NumericalError::Reducible);
    }

    let mut system = Matrix::from_fn(n, n, |i, j| {
        let identity = if i == j { 1.0 } else { 0.0 };
        identity - transitions[(j, i)]
    });
    for v in system.row_mut(n - 1) {
        *v = 1.0;
    }
    let mut rhs = vec![0.0; n];
    rhs[n - 1] = 1.0;

    let pi = solve(&system, &rhs).map_err(|err| match err {
        NumericalError::Singular { .. } => NumericalError::Reducible,
        other => other,
    })?;

    // Check π W = π against the full (unreplaced) system
    let image = transitions.left_mul(&pi);
    let residual = image
        .iter()
        .zip(&pi)
        .fold(0.0f64, |m, (a, b)| m.max((a - b).abs()));
    if residual > tolerance {
        return Err(NumericalError::IllConditioned { residual });
    }
    if pi.iter().any(|&p| p < -tolerance) {
        return Err(NumericalError::Reducible);
    }
    log::debug!("Stationary distribution solved for {} nodes", n);
    Ok(pi.into_iter().map(|p| p.max(0.0)).collect())
}
