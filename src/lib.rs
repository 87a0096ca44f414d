//! Graph Sigma - Evolutionary games on weighted population structures.
//!
//! Decides whether a mutant strategy is favored by selection on a graph,
//! two ways: exactly, from structure coefficients built on the graph's
//! stationary distribution and coalescence times, and empirically, from
//! Monte Carlo fixation trials.
//!
//! # Architecture
//!
//! The crate is split into two main modules:
//!
//! - `schema`: Configuration types for graphs, games, and experiments
//! - `compute`: Numerical computation (linear algebra, coalescence, exact
//!   evaluator, simulator, social-goods analysis)
//!
//! # Example
//!
//! ```rust,no_run
//! use graph_sigma::{
//!     schema::{GraphSpec, PayoffSpec, UpdateRule},
//!     build_game, build_graph, evaluate_exact, simulate,
//! };
//!
//! let graph = build_graph(&GraphSpec::Cycle { nodes: 10 }, 0)?;
//! let game = build_game(&PayoffSpec::Donation { benefit: 4.0, cost: 1.0 }, 0.01)?;
//!
//! let (sigma, favored) = evaluate_exact(&graph, &game)?;
//! let (probability, trials) = simulate(&graph, &game, UpdateRule::DeathBirth, 10_000, Some(42))?;
//!
//! println!("σ = {:?}, favored: {}", sigma, favored);
//! println!("ρ = {:.4} over {} trials (neutral {:.4})", probability, trials, 0.1);
//! # Ok::<(), graph_sigma::Error>(())
//! ```

pub mod compute;
pub mod error;
pub mod schema;

// Re-export commonly used types
pub use compute::{
    ExactEvaluator, ExactVerdict, FixationEstimate, Game, Graph, GraphGenerator, Simulator,
    Strategy, StructureCoefficients,
};
pub use error::{Error, NonConvergenceError, NumericalError, Result, ValidationError};
pub use schema::{ExperimentConfig, GraphSpec, PayoffSpec, SimulationConfig, UpdateRule};

/// Build a graph from its specification; `seed` drives random families.
pub fn build_graph(spec: &GraphSpec, seed: u64) -> Result<Graph> {
    Ok(spec.generate(seed)?)
}

/// Build a game from a payoff family and selection intensity δ.
pub fn build_game(payoffs: &PayoffSpec, delta: f64) -> Result<Game> {
    Ok(Game::from_spec(payoffs, delta)?)
}

/// Structure coefficient σ (when defined) and whether a single mutant fixes
/// with probability above `1/N` under weak selection.
///
/// Use [`ExactEvaluator`] for the full verdict and coefficients.
pub fn evaluate_exact(graph: &Graph, game: &Game) -> Result<(Option<f64>, bool)> {
    let verdict = compute::evaluate(graph, game)?;
    Ok((verdict.sigma(), verdict.favored))
}

/// Fixation probability of a single mutant and the number of trials run.
///
/// Uses the default configuration otherwise: uniformly random start,
/// exponential fecundity, and the default step cap.
pub fn simulate(
    graph: &Graph,
    game: &Game,
    rule: UpdateRule,
    trials: u64,
    seed: Option<u64>,
) -> Result<(f64, u64)> {
    let config = SimulationConfig {
        trials,
        seed,
        rule,
        ..SimulationConfig::default()
    };
    let estimate = compute::simulate(graph, *game, config)?;
    Ok((estimate.probability(), estimate.trials))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_sum_rejected_at_boundary() {
        let spec = GraphSpec::Stochastic {
            weights: vec![vec![0.5, 0.4], vec![1.0, 0.0]],
        };
        let err = build_graph(&spec, 0).unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_cycle_scenario() {
        let graph = build_graph(&GraphSpec::Cycle { nodes: 4 }, 0).unwrap();
        let game = build_game(&PayoffSpec::default(), 0.01).unwrap();
        let (sigma, favored) = evaluate_exact(&graph, &game).unwrap();
        assert!(sigma.unwrap().is_finite());
        assert_eq!(evaluate_exact(&graph, &game).unwrap(), (sigma, favored));

        let (probability, trials) =
            simulate(&graph, &game, UpdateRule::DeathBirth, 2_000, Some(8)).unwrap();
        assert_eq!(trials, 2_000);
        assert!((0.0..=1.0).contains(&probability));
    }

    #[test]
    fn test_invalid_intensity() {
        assert!(build_game(&PayoffSpec::default(), -1.0).unwrap_err().is_validation());
    }
}
