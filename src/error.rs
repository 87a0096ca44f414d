//! Error taxonomy for graph construction, linear solves, and simulation.
//!
//! Errors are never retried or approximated away: the correctness of a
//! structure-coefficient prediction depends on its preconditions holding, so
//! every failure surfaces to the caller immediately.

use crate::schema::ConfigError;

/// Malformed graph, game, or simulation input.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("Matrix must be non-empty")]
    Empty,
    #[error("Matrix must be square, got {rows} rows with a row of length {cols}")]
    NonSquare { rows: usize, cols: usize },
    #[error("Entry ({row}, {col}) is not a finite number")]
    NonFinite { row: usize, col: usize },
    #[error("Entry ({row}, {col}) is negative: {value}")]
    NegativeWeight { row: usize, col: usize, value: f64 },
    #[error("Row {row} sums to {sum}, expected 1")]
    RowSum { row: usize, sum: f64 },
    #[error("Row {row} has no outgoing weight")]
    ZeroRow { row: usize },
    #[error("Payoff {name} is not a finite number")]
    NonFinitePayoff { name: &'static str },
    #[error("Selection intensity must be finite and non-negative, got {0}")]
    NegativeIntensity(f64),
    #[error("Value {value} is not a valid probability")]
    InvalidProbability { value: f64 },
    #[error("Node {node} is out of range for a graph of {len} nodes")]
    NodeOutOfRange { node: usize, len: usize },
    #[error("State has {got} entries but the graph has {expected} nodes")]
    StateLength { expected: usize, got: usize },
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

/// Singular, ill-conditioned, or non-convergent linear algebra.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NumericalError {
    #[error("Graph is reducible: no unique stationary distribution")]
    Reducible,
    #[error("Linear system is singular (pivot {pivot:e} at column {column})")]
    Singular { column: usize, pivot: f64 },
    #[error("Solution residual {residual:e} exceeds tolerance")]
    IllConditioned { residual: f64 },
    #[error("Linear system is {rows}×{cols} with a right-hand side of length {rhs}")]
    DimensionMismatch { rows: usize, cols: usize, rhs: usize },
    #[error("Iterative solver did not converge after {iterations} iterations (residual {residual:e})")]
    DidNotConverge { iterations: usize, residual: f64 },
}

/// A simulation trial reached its step cap without absorbing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Trial {trial} did not absorb within {steps} steps")]
pub struct NonConvergenceError {
    pub trial: u64,
    pub steps: u64,
}

/// Crate-level error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    #[error("Numerical failure: {0}")]
    Numerical(#[from] NumericalError),
    #[error("Simulation did not converge: {0}")]
    NonConvergence(#[from] NonConvergenceError),
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// True for input validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    /// True for failed or ill-conditioned linear solves.
    pub fn is_numerical(&self) -> bool {
        matches!(self, Error::Numerical(_))
    }

    /// True when a trial hit its step cap.
    pub fn is_non_convergence(&self) -> bool {
        matches!(self, Error::NonConvergence(_))
    }
}
