//! Dense linear algebra for the graph computations.
//!
//! Matrices are small (tens of nodes, or node pairs for the coalescence
//! systems), so most are stored as a dense row-major `Vec<f64>`. Systems
//! over node triples use [`SparseMatrix`].

use std::ops::{Index, IndexMut};

use crate::error::{NumericalError, ValidationError};
use crate::schema::SolverMethod;

/// Default tolerance for row sums, stationary residuals, and verdict signs.
pub const DEFAULT_TOLERANCE: f64 = 1e-9;

/// Relative pivot magnitude below which a matrix is treated as singular.
pub const PIVOT_TOLERANCE: f64 = 1e-12;

/// Dense row-major matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl Matrix {
    /// Matrix of zeros.
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    /// Square identity matrix.
    pub fn identity(n: usize) -> Self {
        Self::from_fn(n, n, |i, j| if i == j { 1.0 } else { 0.0 })
    }

    /// Build a matrix entry by entry.
    pub fn from_fn(rows: usize, cols: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        let mut data = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                data.push(f(i, j));
            }
        }
        Self { rows, cols, data }
    }

    /// Build a square matrix from nested rows.
    ///
    /// Fails if the input is empty or not square.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self, ValidationError> {
        let n = rows.len();
        if n == 0 {
            return Err(ValidationError::Empty);
        }
        let mut data = Vec::with_capacity(n * n);
        for row in rows {
            if row.len() != n {
                return Err(ValidationError::NonSquare {
                    rows: n,
                    cols: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            rows: n,
            cols: n,
            data,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn is_square(&self) -> bool {
        self.rows == self.cols
    }

    /// Borrow row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[f64] {
        &self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Mutably borrow row `i`.
    #[inline]
    pub fn row_mut(&mut self, i: usize) -> &mut [f64] {
        &mut self.data[i * self.cols..(i + 1) * self.cols]
    }

    /// Row sums.
    pub fn row_sums(&self) -> Vec<f64> {
        (0..self.rows).map(|i| self.row(i).iter().sum()).collect()
    }

    pub fn transpose(&self) -> Matrix {
        Matrix::from_fn(self.cols, self.rows, |i, j| self[(j, i)])
    }

    /// Matrix product `self * other`.
    pub fn matmul(&self, other: &Matrix) -> Matrix {
        assert_eq!(self.cols, other.rows, "matmul dimension mismatch");
        let mut out = Matrix::zeros(self.rows, other.cols);
        for i in 0..self.rows {
            for k in 0..self.cols {
                let a = self[(i, k)];
                if a == 0.0 {
                    continue;
                }
                let src = other.row(k);
                for (o, &b) in out.row_mut(i).iter_mut().zip(src) {
                    *o += a * b;
                }
            }
        }
        out
    }

    /// Matrix-vector product `self * v`.
    pub fn mul_vec(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.cols, v.len(), "mul_vec dimension mismatch");
        (0..self.rows)
            .map(|i| self.row(i).iter().zip(v).map(|(a, b)| a * b).sum())
            .collect()
    }

    /// Row-vector product `vᵀ * self`.
    pub fn left_mul(&self, v: &[f64]) -> Vec<f64> {
        assert_eq!(self.rows, v.len(), "left_mul dimension mismatch");
        let mut out = vec![0.0; self.cols];
        for (i, &vi) in v.iter().enumerate() {
            if vi == 0.0 {
                continue;
            }
            for (o, &a) in out.iter_mut().zip(self.row(i)) {
                *o += vi * a;
            }
        }
        out
    }

    /// Integer power by repeated squaring.
    pub fn power(&self, n: u32) -> Matrix {
        assert!(self.is_square(), "power of a non-square matrix");
        let mut result = Matrix::identity(self.rows);
        let mut base = self.clone();
        let mut n = n;
        while n > 0 {
            if n & 1 == 1 {
                result = result.matmul(&base);
            }
            base = base.matmul(&base);
            n >>= 1;
        }
        result
    }

    /// Sum of the elementwise product, `Σ a_ij b_ij`.
    pub fn hadamard_sum(&self, other: &Matrix) -> f64 {
        assert_eq!(
            (self.rows, self.cols),
            (other.rows, other.cols),
            "hadamard dimension mismatch"
        );
        self.data.iter().zip(&other.data).map(|(a, b)| a * b).sum()
    }

    /// Largest absolute entry.
    pub fn max_abs(&self) -> f64 {
        self.data.iter().fold(0.0f64, |m, v| m.max(v.abs()))
    }

    /// Largest absolute entrywise difference.
    pub fn max_abs_diff(&self, other: &Matrix) -> f64 {
        self.data
            .iter()
            .zip(&other.data)
            .fold(0.0f64, |m, (a, b)| m.max((a - b).abs()))
    }
}

impl Index<(usize, usize)> for Matrix {
    type Output = f64;

    #[inline]
    fn index(&self, (i, j): (usize, usize)) -> &f64 {
        &self.data[i * self.cols + j]
    }
}

impl IndexMut<(usize, usize)> for Matrix {
    #[inline]
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut f64 {
        &mut self.data[i * self.cols + j]
    }
}

/// Square matrix stored as per-row `(column, value)` lists.
///
/// Used for the lineage systems whose unknowns grow like `N³`; repeated
/// entries in a row add up.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    rows: Vec<Vec<(usize, f64)>>,
}

impl SparseMatrix {
    /// `n × n` matrix with no entries.
    pub fn new(n: usize) -> Self {
        Self {
            rows: vec![Vec::new(); n],
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Add `value` to entry `(i, j)`.
    #[inline]
    pub fn add(&mut self, i: usize, j: usize, value: f64) {
        self.rows[i].push((j, value));
    }

    pub fn to_dense(&self) -> Matrix {
        let n = self.len();
        let mut dense = Matrix::zeros(n, n);
        for (i, row) in self.rows.iter().enumerate() {
            for &(j, value) in row {
                dense[(i, j)] += value;
            }
        }
        dense
    }
}

fn check_system(rows: usize, cols: usize, rhs: usize) -> Result<(), NumericalError> {
    if rows != cols || rows != rhs {
        return Err(NumericalError::DimensionMismatch { rows, cols, rhs });
    }
    Ok(())
}

/// Solve `a x = b` with the requested method.
pub fn solve_with(a: &Matrix, b: &[f64], method: &SolverMethod) -> Result<Vec<f64>, NumericalError> {
    match method {
        SolverMethod::Direct => solve(a, b),
        SolverMethod::Iterative {
            tolerance,
            max_iterations,
        } => gauss_seidel(a, b, *tolerance, *max_iterations),
    }
}

/// Solve a sparse system; the direct method factors a dense copy.
pub fn solve_sparse(
    a: &SparseMatrix,
    b: &[f64],
    method: &SolverMethod,
) -> Result<Vec<f64>, NumericalError> {
    check_system(a.len(), a.len(), b.len())?;
    match method {
        SolverMethod::Direct => solve(&a.to_dense(), b),
        SolverMethod::Iterative {
            tolerance,
            max_iterations,
        } => {
            let mut diagonal = vec![0.0; a.len()];
            let mut scale = f64::MIN_POSITIVE;
            for (i, row) in a.rows.iter().enumerate() {
                for &(j, value) in row {
                    scale = scale.max(value.abs());
                    if j == i {
                        diagonal[i] += value;
                    }
                }
            }
            sweep(b, &diagonal, scale, *tolerance, *max_iterations, |i, x| {
                a.rows[i]
                    .iter()
                    .filter(|&&(j, _)| j != i)
                    .map(|&(j, value)| value * x[j])
                    .sum()
            })
        }
    }
}

/// Solve `a x = b` by LU decomposition with partial pivoting.
///
/// Pivots smaller than `PIVOT_TOLERANCE` relative to the largest entry are
/// reported as singular; a relative residual above `DEFAULT_TOLERANCE` is
/// reported as ill-conditioned.
pub fn solve(a: &Matrix, b: &[f64]) -> Result<Vec<f64>, NumericalError> {
    check_system(a.rows(), a.cols(), b.len())?;
    let n = a.rows();
    let scale = a.max_abs().max(f64::MIN_POSITIVE);

    let mut lu = a.clone();
    let mut x = b.to_vec();

    // Forward elimination, applying row swaps to the right-hand side as we go
    for col in 0..n {
        let (pivot_row, pivot) = (col..n)
            .map(|r| (r, lu[(r, col)]))
            .fold((col, 0.0f64), |best, (r, v)| {
                if v.abs() > best.1.abs() { (r, v) } else { best }
            });
        if pivot.abs() < PIVOT_TOLERANCE * scale {
            return Err(NumericalError::Singular { column: col, pivot });
        }
        if pivot_row != col {
            for j in 0..n {
                lu.data.swap(col * n + j, pivot_row * n + j);
            }
            x.swap(col, pivot_row);
        }

        for r in (col + 1)..n {
            let factor = lu[(r, col)] / pivot;
            if factor == 0.0 {
                continue;
            }
            for j in col..n {
                lu[(r, j)] -= factor * lu[(col, j)];
            }
            x[r] -= factor * x[col];
        }
    }

    // Back substitution
    for col in (0..n).rev() {
        let mut sum = x[col];
        for j in (col + 1)..n {
            sum -= lu[(col, j)] * x[j];
        }
        x[col] = sum / lu[(col, col)];
    }

    let residual = relative_residual(a, &x, b);
    if !residual.is_finite() || residual > DEFAULT_TOLERANCE {
        return Err(NumericalError::IllConditioned { residual });
    }
    Ok(x)
}

/// Solve `a x = b` by Gauss–Seidel sweeps starting from zero.
///
/// Converged when the largest update in a sweep falls below `tolerance`
/// relative to the largest solution entry.
pub fn gauss_seidel(
    a: &Matrix,
    b: &[f64],
    tolerance: f64,
    max_iterations: usize,
) -> Result<Vec<f64>, NumericalError> {
    check_system(a.rows(), a.cols(), b.len())?;
    let diagonal: Vec<f64> = (0..a.rows()).map(|i| a[(i, i)]).collect();
    let scale = a.max_abs().max(f64::MIN_POSITIVE);
    sweep(b, &diagonal, scale, tolerance, max_iterations, |i, x| {
        a.row(i)
            .iter()
            .zip(x)
            .enumerate()
            .filter(|&(j, _)| j != i)
            .map(|(_, (&aij, &xj))| aij * xj)
            .sum()
    })
}

/// Gauss–Seidel iteration given the diagonal and the off-diagonal row
/// product `Σ_{j≠i} a_ij x_j`.
fn sweep(
    b: &[f64],
    diagonal: &[f64],
    scale: f64,
    tolerance: f64,
    max_iterations: usize,
    off_diagonal: impl Fn(usize, &[f64]) -> f64,
) -> Result<Vec<f64>, NumericalError> {
    for (i, &diag) in diagonal.iter().enumerate() {
        if diag.abs() < PIVOT_TOLERANCE * scale {
            return Err(NumericalError::Singular {
                column: i,
                pivot: diag,
            });
        }
    }

    let n = b.len();
    let mut x = vec![0.0; n];
    let mut delta = f64::INFINITY;
    for iteration in 1..=max_iterations {
        delta = 0.0;
        for i in 0..n {
            let next = (b[i] - off_diagonal(i, &x)) / diagonal[i];
            delta = delta.max((next - x[i]).abs());
            x[i] = next;
        }
        if !delta.is_finite() {
            break;
        }
        let magnitude = x.iter().fold(1.0f64, |m, v| m.max(v.abs()));
        if delta <= tolerance * magnitude {
            log::debug!("Gauss-Seidel converged after {} sweeps", iteration);
            return Ok(x);
        }
    }

    Err(NumericalError::DidNotConverge {
        iterations: max_iterations,
        residual: delta,
    })
}

/// `‖a x − b‖∞ / (‖a‖∞ ‖x‖∞ + ‖b‖∞)`.
fn relative_residual(a: &Matrix, x: &[f64], b: &[f64]) -> f64 {
    let ax = a.mul_vec(x);
    let residual = ax
        .iter()
        .zip(b)
        .fold(0.0f64, |m, (l, r)| m.max((l - r).abs()));
    let norm_a = (0..a.rows())
        .map(|i| a.row(i).iter().map(|v| v.abs()).sum::<f64>())
        .fold(0.0f64, f64::max);
    let norm_x = x.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let norm_b = b.iter().fold(0.0f64, |m, v| m.max(v.abs()));
    let denom = norm_a * norm_x + norm_b;
    if denom == 0.0 { residual } else { residual / denom }
}
