//! Lineage recurrences on unordered node pairs and triples.
//!
//! Both the coalescence times and the identity-by-state probabilities obey
//! the same recurrence: one of the two lineages (each with probability ½)
//! takes an ancestral step along `W`. Only unordered pairs `i < j` are
//! unknowns; the diagonal is fixed. Three lineages follow the same rule
//! with probability ⅓ each and fall back to the pair times once two of
//! them meet.

use crate::error::NumericalError;
use crate::schema::SolverMethod;

use super::linalg::{Matrix, SparseMatrix, solve_sparse, solve_with};

/// Index of the unordered pair `{i, j}`, `i < j`, among `n` nodes.
#[inline]
fn pair_index(n: usize, i: usize, j: usize) -> usize {
    debug_assert!(i < j && j < n);
    i * n - i * (i + 1) / 2 + (j - i - 1)
}

/// Index of the unordered triple `{i, j, k}`, `i < j < k`.
#[inline]
fn triple_index(i: usize, j: usize, k: usize) -> usize {
    debug_assert!(i < j && j < k);
    k * (k - 1) * (k - 2) / 6 + j * (j - 1) / 2 + i
}

fn check_square(transitions: &Matrix) -> Result<(), NumericalError> {
    if !transitions.is_square() {
        return Err(NumericalError::DimensionMismatch {
            rows: transitions.rows(),
            cols: transitions.cols(),
            rhs: transitions.rows(),
        });
    }
    Ok(())
}

/// Solve `X_ii = diagonal` and
/// `X_ij = constant + (continuation / 2) Σ_k (W_ik X_kj + W_jk X_ik)`.
///
/// Returns the full symmetric matrix `X`.
fn solve_pair_recurrence(
    transitions: &Matrix,
    diagonal: f64,
    constant: f64,
    continuation: f64,
    method: &SolverMethod,
) -> Result<Matrix, NumericalError> {
    check_square(transitions)?;
    let n = transitions.rows();
    let unknowns = n * n.saturating_sub(1) / 2;
    let half = continuation / 2.0;

    let mut system = Matrix::zeros(unknowns, unknowns);
    let mut rhs = vec![constant; unknowns];

    for i in 0..n {
        for j in (i + 1)..n {
            let row = pair_index(n, i, j);
            system[(row, row)] += 1.0;

            // Lineage at i steps to k, partner stays at j; then the reverse
            for (moving, staying) in [(i, j), (j, i)] {
                for (k, &p) in transitions.row(moving).iter().enumerate() {
                    if p == 0.0 {
                        continue;
                    }
                    if k == staying {
                        rhs[row] += half * p * diagonal;
                    } else {
                        let col = pair_index(n, k.min(staying), k.max(staying));
                        system[(row, col)] -= half * p;
                    }
                }
            }
        }
    }

    let solution = solve_with(&system, &rhs, method)?;

    let mut out = Matrix::from_fn(n, n, |i, j| if i == j { diagonal } else { 0.0 });
    for i in 0..n {
        for j in (i + 1)..n {
            let value = solution[pair_index(n, i, j)];
            out[(i, j)] = value;
            out[(j, i)] = value;
        }
    }
    Ok(out)
}

/// Expected time for two lineages at `i` and `j` to coalesce under neutral
/// death–birth dynamics (in units where one lineage moves per step).
pub fn coalescence_times(transitions: &Matrix, method: &SolverMethod) -> Result<Matrix, NumericalError> {
    let tau = solve_pair_recurrence(transitions, 0.0, 1.0, 1.0, method)?;
    log::debug!(
        "Coalescence times solved for {} nodes (max τ = {:.4})",
        transitions.rows(),
        tau.max_abs()
    );
    Ok(tau)
}

/// Probability that individuals at `i` and `j` share a type under neutral
/// drift with per-capita mutation probability `mutation_rate`.
pub fn identity_by_state(
    transitions: &Matrix,
    mutation_rate: f64,
    method: &SolverMethod,
) -> Result<Matrix, NumericalError> {
    solve_pair_recurrence(
        transitions,
        1.0,
        mutation_rate / 2.0,
        1.0 - mutation_rate,
        method,
    )
}

/// Number of unordered triples above which [`triple_coalescence_times`]
/// switches from a dense factorization to Gauss–Seidel sweeps.
pub const DENSE_TRIPLE_LIMIT: usize = 1_500;

/// Expected time for three lineages to coalesce into one.
#[derive(Debug, Clone, PartialEq)]
pub struct TripleCoalescence {
    pairs: Matrix,
    triples: Vec<f64>,
}

impl TripleCoalescence {
    /// Coalescence time of lineages at `a`, `b`, `c`; repeated nodes reduce
    /// to the pair time, or zero when all three coincide.
    pub fn get(&self, a: usize, b: usize, c: usize) -> f64 {
        let mut nodes = [a, b, c];
        nodes.sort_unstable();
        let [i, j, k] = nodes;
        match (i == j, j == k) {
            (true, true) => 0.0,
            (true, false) => self.pairs[(j, k)],
            (false, true) => self.pairs[(i, j)],
            (false, false) => self.triples[triple_index(i, j, k)],
        }
    }

    /// The pair times the triples were solved against.
    pub fn pairs(&self) -> &Matrix {
        &self.pairs
    }
}

/// Three-lineage coalescence times in the units of [`coalescence_times`].
///
/// For distinct `i, j, k`:
/// `T_ijk = ⅔ + ⅓ Σ_{x ∈ {i,j,k}} Σ_m W_xm T(x → m)`, where a step onto an
/// occupied node leaves the other two lineages with pair time `τ`.
pub fn triple_coalescence_times(
    transitions: &Matrix,
    pairs: &Matrix,
    method: &SolverMethod,
) -> Result<TripleCoalescence, NumericalError> {
    check_square(transitions)?;
    let n = transitions.rows();
    if pairs.rows() != n || pairs.cols() != n {
        return Err(NumericalError::DimensionMismatch {
            rows: pairs.rows(),
            cols: pairs.cols(),
            rhs: n,
        });
    }
    let unknowns = if n < 3 { 0 } else { triple_index(n - 3, n - 2, n - 1) + 1 };
    let third = 1.0 / 3.0;

    let mut system = SparseMatrix::new(unknowns);
    let mut rhs = vec![2.0 * third; unknowns];

    for k in 2..n {
        for j in 1..k {
            for i in 0..j {
                let row = triple_index(i, j, k);
                system.add(row, row, 1.0);
                for (moving, others) in [(i, [j, k]), (j, [i, k]), (k, [i, j])] {
                    for (m, &p) in transitions.row(moving).iter().enumerate() {
                        if p == 0.0 {
                            continue;
                        }
                        if others.contains(&m) {
                            rhs[row] += third * p * pairs[(others[0], others[1])];
                        } else {
                            let mut next = [others[0], others[1], m];
                            next.sort_unstable();
                            let col = triple_index(next[0], next[1], next[2]);
                            system.add(row, col, -third * p);
                        }
                    }
                }
            }
        }
    }

    let triples = solve_sparse(&system, &rhs, method)?;
    log::debug!(
        "Triple coalescence times solved for {} nodes ({} unknowns)",
        n,
        unknowns
    );
    Ok(TripleCoalescence {
        pairs: pairs.clone(),
        triples,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cycle(n: usize) -> Matrix {
        Matrix::from_fn(n, n, |i, j| {
            if (i + 1) % n == j || (j + 1) % n == i {
                0.5
            } else {
                0.0
            }
        })
    }

    #[test]
    fn test_pair_index_is_dense() {
        let n = 5;
        let mut seen = vec![false; n * (n - 1) / 2];
        for i in 0..n {
            for j in (i + 1)..n {
                let idx = pair_index(n, i, j);
                assert!(!seen[idx]);
                seen[idx] = true;
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_two_nodes() {
        // Each step the pair coalesces for sure
        let w = Matrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let tau = coalescence_times(&w, &SolverMethod::Direct).unwrap();
        assert!((tau[(0, 1)] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_coalescence_satisfies_recurrence() {
        let w = cycle(6);
        let tau = coalescence_times(&w, &SolverMethod::Direct).unwrap();
        let wt = w.matmul(&tau);
        for i in 0..6 {
            for j in 0..6 {
                if i == j {
                    continue;
                }
                let expected = 1.0 + 0.5 * (wt[(i, j)] + wt[(j, i)]);
                assert!((tau[(i, j)] - expected).abs() < 1e-9);
            }
        }
    }

    #[test]
    fn test_identity_by_state_recurrence() {
        let w = cycle(5);
        let u = 0.1;
        let phi = identity_by_state(&w, u, &SolverMethod::Direct).unwrap();
        let wp = w.matmul(&phi);
        for i in 0..5 {
            assert_eq!(phi[(i, i)], 1.0);
            for j in 0..5 {
                if i != j {
                    let expected = u / 2.0 + (1.0 - u) / 2.0 * (wp[(i, j)] + wp[(j, i)]);
                    assert!((phi[(i, j)] - expected).abs() < 1e-9);
                    assert!(phi[(i, j)] > 0.5 && phi[(i, j)] < 1.0);
                }
            }
        }
    }

    #[test]
    fn test_triple_index_is_dense() {
        let n = 6;
        let mut seen = vec![false; 20];
        for k in 2..n {
            for j in 1..k {
                for i in 0..j {
                    let idx = triple_index(i, j, k);
                    assert!(!seen[idx]);
                    seen[idx] = true;
                }
            }
        }
        assert!(seen.into_iter().all(|s| s));
    }

    #[test]
    fn test_triples_satisfy_recurrence() {
        let w = Matrix::from_rows(&[
            vec![0.0, 0.5, 0.0, 0.5, 0.0],
            vec![0.25, 0.0, 0.75, 0.0, 0.0],
            vec![0.0, 0.25, 0.0, 0.25, 0.5],
            vec![0.0, 0.0, 0.5, 0.0, 0.5],
            vec![0.8, 0.0, 0.0, 0.2, 0.0],
        ])
        .unwrap();
        let tau = coalescence_times(&w, &SolverMethod::Direct).unwrap();
        let triples = triple_coalescence_times(&w, &tau, &SolverMethod::Direct).unwrap();
        for (a, b, c) in [(0, 1, 2), (0, 2, 4), (1, 3, 4)] {
            let lineages = [a, b, c];
            let mut expected = 2.0 / 3.0;
            for x in 0..3 {
                for m in 0..5 {
                    let mut moved = lineages;
                    moved[x] = m;
                    expected += w[(lineages[x], m)] / 3.0 * triples.get(moved[0], moved[1], moved[2]);
                }
            }
            let value = triples.get(c, a, b);
            assert!((value - expected).abs() < 1e-9, "{} vs {}", value, expected);
            // All three merged implies every pair merged
            assert!(value >= tau[(a, b)].max(tau[(a, c)]).max(tau[(b, c)]));
        }
        assert_eq!(triples.get(2, 2, 2), 0.0);
        assert_eq!(triples.get(1, 3, 1), tau[(1, 3)]);
    }

    #[test]
    fn test_triple_iterative_matches_direct() {
        let w = cycle(6);
        let tau = coalescence_times(&w, &SolverMethod::Direct).unwrap();
        let direct = triple_coalescence_times(&w, &tau, &SolverMethod::Direct).unwrap();
        let iterative = triple_coalescence_times(
            &w,
            &tau,
            &SolverMethod::Iterative {
                tolerance: 1e-14,
                max_iterations: 100_000,
            },
        )
        .unwrap();
        for (d, i) in direct.triples.iter().zip(&iterative.triples) {
            assert!((d - i).abs() < 1e-8);
        }
    }

    #[test]
    fn test_non_square_transitions_rejected() {
        let w = Matrix::zeros(2, 3);
        assert!(matches!(
            coalescence_times(&w, &SolverMethod::Direct),
            Err(NumericalError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_iterative_matches_direct() {
        let w = cycle(7);
        let direct = identity_by_state(&w, 0.05, &SolverMethod::Direct).unwrap();
        let iterative = identity_by_state(
            &w,
            0.05,
            &SolverMethod::Iterative {
                tolerance: 1e-13,
                max_iterations: 100_000,
            },
        )
        .unwrap();
        assert!(direct.max_abs_diff(&iterative) < 1e-8);
    }
}
