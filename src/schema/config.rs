//! Configuration types for games, simulations, and experiments.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::GraphSpec;

/// Default per-trial step cap.
pub const DEFAULT_MAX_STEPS: u64 = 1_000_000;

fn default_trials() -> u64 {
    10_000
}

fn default_max_steps() -> u64 {
    DEFAULT_MAX_STEPS
}

fn default_significance() -> f64 {
    3.0
}

fn default_tolerance() -> f64 {
    crate::compute::DEFAULT_TOLERANCE
}

fn default_iterations() -> usize {
    100_000
}

/// Payoffs of a symmetric two-strategy game.
///
/// Strategy A is the mutant, strategy B the resident. Families are expanded
/// into the four matrix entries by [`PayoffSpec::entries`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum PayoffSpec {
    /// Explicit matrix: A vs A, A vs B, B vs A, B vs B.
    Matrix {
        reward: f64,
        sucker: f64,
        temptation: f64,
        punishment: f64,
    },
    /// Cooperators pay `cost` to give `benefit` to their partner.
    Donation { benefit: f64, cost: f64 },
    /// Snowdrift: the cost of a joint contribution is shared.
    Snowdrift { benefit: f64, cost: f64 },
}

impl Default for PayoffSpec {
    fn default() -> Self {
        PayoffSpec::Matrix {
            reward: 3.0,
            sucker: 0.0,
            temptation: 5.0,
            punishment: 1.0,
        }
    }
}

impl PayoffSpec {
    /// `(R, S, T, P)` for this game.
    pub fn entries(&self) -> (f64, f64, f64, f64) {
        match *self {
            PayoffSpec::Matrix {
                reward,
                sucker,
                temptation,
                punishment,
            } => (reward, sucker, temptation, punishment),
            PayoffSpec::Donation { benefit, cost } => (benefit - cost, -cost, benefit, 0.0),
            PayoffSpec::Snowdrift { benefit, cost } => {
                (benefit - cost / 2.0, benefit - cost, benefit, 0.0)
            }
        }
    }
}

/// Linear solver used for the pairwise (node-pair) systems.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum SolverMethod {
    /// LU decomposition with partial pivoting.
    #[default]
    Direct,
    /// Gauss–Seidel sweeps.
    Iterative {
        #[serde(default = "default_tolerance")]
        tolerance: f64,
        #[serde(default = "default_iterations")]
        max_iterations: usize,
    },
}

/// Microscopic update rule for the simulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum UpdateRule {
    /// Uniform death, neighbor replacement proportional to fecundity.
    #[default]
    DeathBirth,
    /// Global reproduction proportional to fecundity, offspring replaces a
    /// site that draws from the parent.
    BirthDeath,
    /// Uniform focal individual imitates a neighbor with Fermi probability.
    PairwiseComparison,
}

/// Map from payoff to fecundity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FitnessMapping {
    /// `1 + δ f`; requires `1 + δ f ≥ 0` for all reachable payoffs.
    Linear,
    /// `exp(δ f)`.
    #[default]
    Exponential,
}

/// Where the initial mutant is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "type")]
pub enum Start {
    /// Uniformly random node, drawn independently per trial.
    #[default]
    Uniform,
    /// Fixed node for every trial.
    Node { node: usize },
}

/// Monte Carlo fixation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Independent trials to run.
    #[serde(default = "default_trials")]
    pub trials: u64,
    /// Base seed; drawn at random when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Step cap per trial.
    #[serde(default = "default_max_steps")]
    pub max_steps: u64,
    /// Initial mutant placement.
    #[serde(default)]
    pub start: Start,
    /// Update rule.
    #[serde(default)]
    pub rule: UpdateRule,
    /// Payoff-to-fecundity map.
    #[serde(default)]
    pub fitness: FitnessMapping,
    /// Standard errors required before an estimate counts as above neutral.
    #[serde(default = "default_significance")]
    pub significance: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            trials: default_trials(),
            seed: None,
            max_steps: default_max_steps(),
            start: Start::default(),
            rule: UpdateRule::default(),
            fitness: FitnessMapping::default(),
            significance: default_significance(),
        }
    }
}

impl SimulationConfig {
    /// Validate simulation parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.trials == 0 {
            return Err(ConfigError::ZeroTrials);
        }
        if self.max_steps == 0 {
            return Err(ConfigError::ZeroMaxSteps);
        }
        if !(self.significance.is_finite() && self.significance > 0.0) {
            return Err(ConfigError::InvalidSignificance(self.significance));
        }
        Ok(())
    }
}

/// Which social good is produced in the mutation–selection model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SocialGood {
    /// Fixed cost, fixed total benefit shared across out-weights ("ff").
    #[serde(rename = "ff")]
    Ff,
    /// Cost and benefit proportional to raw edge weight ("pp").
    #[serde(rename = "pp")]
    Pp,
}

impl SocialGood {
    pub const ALL: [SocialGood; 2] = [SocialGood::Ff, SocialGood::Pp];
}

/// Mutation–selection sweep for producers of social goods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialConfig {
    /// Benefit generated by a producer.
    pub benefit: f64,
    /// Cost paid by a producer.
    pub cost: f64,
    /// Per-capita mutation probabilities to evaluate.
    pub mutation_rates: Vec<f64>,
    /// Solver for the identity-by-state system.
    #[serde(default)]
    pub solver: SolverMethod,
    /// Updates per simulated mutation rate; no simulation when absent.
    #[serde(default)]
    pub updates: Option<u64>,
    /// Base seed for the simulated sweep.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl SocialConfig {
    /// Validate sweep parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.mutation_rates.is_empty() {
            return Err(ConfigError::EmptyMutationRates);
        }
        for &u in &self.mutation_rates {
            if !(u > 0.0 && u <= 1.0) {
                return Err(ConfigError::InvalidMutationRate(u));
            }
        }
        if let SolverMethod::Iterative {
            tolerance,
            max_iterations,
        } = &self.solver
        {
            if !(tolerance.is_finite() && *tolerance > 0.0) {
                return Err(ConfigError::InvalidTolerance(*tolerance));
            }
            if *max_iterations == 0 {
                return Err(ConfigError::ZeroIterations);
            }
        }
        if self.updates == Some(0) {
            return Err(ConfigError::ZeroUpdates);
        }
        Ok(())
    }
}

/// Top-level experiment: one graph, one game, and the analyses to run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentConfig {
    /// Population structure.
    pub graph: GraphSpec,
    /// Seed used when the graph spec is random.
    #[serde(default)]
    pub graph_seed: u64,
    /// Game played on the graph.
    pub game: PayoffSpec,
    /// Selection intensity δ.
    pub selection_intensity: f64,
    /// Fixation simulation; skipped when absent.
    #[serde(default)]
    pub simulation: Option<SimulationConfig>,
    /// Social-goods sweep; skipped when absent.
    #[serde(default)]
    pub social: Option<SocialConfig>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            graph: GraphSpec::default(),
            graph_seed: 0,
            game: PayoffSpec::default(),
            selection_intensity: 0.01,
            simulation: Some(SimulationConfig::default()),
            social: None,
        }
    }
}

impl ExperimentConfig {
    /// Load and validate an experiment from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> crate::Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: ExperimentConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate experiment parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.node_count() < 2 {
            return Err(ConfigError::TooFewNodes(self.graph.node_count()));
        }
        if !(self.selection_intensity.is_finite() && self.selection_intensity >= 0.0) {
            return Err(ConfigError::InvalidIntensity(self.selection_intensity));
        }
        if let Some(simulation) = &self.simulation {
            simulation.validate()?;
        }
        if let Some(social) = &self.social {
            social.validate()?;
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Graph must have at least 2 nodes, got {0}")]
    TooFewNodes(usize),
    #[error("Selection intensity must be finite and non-negative, got {0}")]
    InvalidIntensity(f64),
    #[error("Trial count must be positive")]
    ZeroTrials,
    #[error("Step cap must be positive")]
    ZeroMaxSteps,
    #[error("Significance must be positive, got {0}")]
    InvalidSignificance(f64),
    #[error("No mutation rates specified")]
    EmptyMutationRates,
    #[error("Mutation rate must be in (0, 1], got {0}")]
    InvalidMutationRate(f64),
    #[error("Solver tolerance must be positive, got {0}")]
    InvalidTolerance(f64),
    #[error("Solver iteration limit must be positive")]
    ZeroIterations,
    #[error("Update count must be positive")]
    ZeroUpdates,
}
