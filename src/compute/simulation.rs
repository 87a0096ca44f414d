//! Monte Carlo fixation probabilities.
//!
//! Each trial starts from a single mutant and runs the chosen update rule
//! until the population is all-mutant (fixation) or all-resident
//! (extinction). Trials share nothing mutable: trial `t` draws from its own
//! RNG derived from `(base_seed, t)`, so estimates do not depend on how
//! trials are scheduled across threads.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use rand::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, NonConvergenceError, ValidationError};
use crate::schema::{FitnessMapping, SimulationConfig, Start, UpdateRule};

use super::game::Game;
use super::graph::Graph;
use super::population::{Neighborhood, Population};

/// SplitMix64 finalizer, used to decorrelate per-trial seeds.
#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Random source owned by a single trial.
pub struct TrialRng {
    rng: StdRng,
}

impl TrialRng {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Independent stream for trial `trial` of a run seeded with `base_seed`.
    pub fn for_trial(base_seed: u64, trial: u64) -> Self {
        Self::new(splitmix64(base_seed ^ splitmix64(trial)))
    }

    /// Uniform in `[0, 1)`.
    #[inline]
    pub fn uniform(&mut self) -> f64 {
        self.rng.r#gen::<f64>()
    }

    /// Uniform index in `0..n`.
    #[inline]
    pub fn index(&mut self, n: usize) -> usize {
        self.rng.gen_range(0..n)
    }

    /// True with probability `p`.
    #[inline]
    pub fn bernoulli(&mut self, p: f64) -> bool {
        self.uniform() < p
    }

    /// Pick an item with probability proportional to its weight.
    ///
    /// Returns `None` when the total weight is not positive.
    pub fn choose_weighted(&mut self, items: &[(usize, f64)]) -> Option<usize> {
        let total: f64 = items.iter().map(|&(_, w)| w).sum();
        if !total.is_finite() || total <= 0.0 {
            return None;
        }
        let mut target = self.uniform() * total;
        let mut last = None;
        for &(item, w) in items {
            if w <= 0.0 {
                continue;
            }
            if target < w {
                return Some(item);
            }
            target -= w;
            last = Some(item);
        }
        // Rounding left a sliver past the end
        last
    }
}

/// Fixation counts with their statistics against the neutral baseline.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FixationEstimate {
    pub fixations: u64,
    pub trials: u64,
    /// Population size, for the neutral baseline `1/N`.
    pub nodes: usize,
    /// Standard errors required by [`FixationEstimate::exceeds_neutral`].
    pub significance: f64,
}

impl FixationEstimate {
    /// Fraction of trials that fixed.
    pub fn probability(&self) -> f64 {
        self.fixations as f64 / self.trials as f64
    }

    /// `sqrt(p (1 − p) / trials)` of the estimate itself.
    pub fn standard_error(&self) -> f64 {
        let p = self.probability();
        (p * (1.0 - p) / self.trials as f64).sqrt()
    }

    /// Fixation probability of a neutral mutant, `1/N`.
    pub fn neutral_baseline(&self) -> f64 {
        1.0 / self.nodes as f64
    }

    /// Distance from `1/N` in standard errors of the neutral binomial.
    ///
    /// The null standard error is used so the score stays finite when every
    /// trial fixes or none does.
    pub fn z_score(&self) -> f64 {
        let baseline = self.neutral_baseline();
        let null_error = (baseline * (1.0 - baseline) / self.trials as f64).sqrt();
        (self.probability() - baseline) / null_error
    }

    /// Significantly above the neutral baseline.
    pub fn exceeds_neutral(&self) -> bool {
        self.z_score() > self.significance
    }
}

/// Fixation estimates of both strategies as a single invader.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// `ρ_A`: a mutant invading residents.
    pub mutant: FixationEstimate,
    /// `ρ_B`: a resident invading mutants.
    pub resident: FixationEstimate,
}

impl Comparison {
    /// `ρ_A − ρ_B`.
    pub fn difference(&self) -> f64 {
        self.mutant.probability() - self.resident.probability()
    }

    /// Standard error of [`Comparison::difference`].
    pub fn standard_error(&self) -> f64 {
        self.mutant
            .standard_error()
            .hypot(self.resident.standard_error())
    }

    /// `ρ_A > ρ_B` at the configured significance.
    pub fn mutant_favored(&self) -> bool {
        let error = self.standard_error();
        if error == 0.0 {
            return self.difference() > 0.0;
        }
        self.difference() / error > self.mutant.significance
    }
}

/// Monte Carlo estimator for one graph and game.
#[derive(Debug, Clone)]
pub struct Simulator {
    neighborhood: Neighborhood,
    game: Game,
    config: SimulationConfig,
}

impl Simulator {
    /// Validate the run and prepare the graph for repeated trials.
    ///
    /// Fails before any trial starts when the configuration is invalid, the
    /// start node is out of range, linear fecundity can go negative, or
    /// birth–death updating meets a node whose offspring have nowhere to go.
    pub fn new(graph: &Graph, game: Game, config: SimulationConfig) -> Result<Self, Error> {
        config.validate()?;
        if let Start::Node { node } = config.start {
            graph.check_node(node)?;
        }
        if config.fitness == FitnessMapping::Linear {
            let lowest = 1.0 + game.delta() * game.min_payoff();
            if lowest < 0.0 {
                return Err(ValidationError::InvalidParameter {
                    name: "fitness",
                    reason: format!(
                        "linear fecundity 1 + δf reaches {} for δ = {}",
                        lowest,
                        game.delta()
                    ),
                }
                .into());
            }
        }
        let neighborhood = Neighborhood::new(graph);
        if config.rule == UpdateRule::BirthDeath {
            if let Some(node) = neighborhood.first_unreachable() {
                return Err(ValidationError::InvalidParameter {
                    name: "graph",
                    reason: format!("offspring of node {} have no site to replace", node),
                }
                .into());
            }
        }
        Ok(Self {
            neighborhood,
            game,
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn game(&self) -> &Game {
        &self.game
    }

    /// Estimate the mutant's fixation probability.
    ///
    /// Uses the configured seed, or a fresh random one when none is set.
    pub fn run(&self) -> Result<FixationEstimate, Error> {
        self.run_with_seed(self.base_seed())
    }

    /// Estimate the mutant's fixation probability from `base_seed`.
    pub fn run_with_seed(&self, base_seed: u64) -> Result<FixationEstimate, Error> {
        self.estimate(&self.game, base_seed)
    }

    /// Estimate `ρ_A` and `ρ_B` for a direct comparison.
    pub fn compare(&self) -> Result<Comparison, Error> {
        let base_seed = self.base_seed();
        let mutant = self.estimate(&self.game, base_seed)?;
        let resident = self.estimate(&self.game.swapped(), splitmix64(base_seed))?;
        log::info!(
            "ρ_A = {:.5} ± {:.5}, ρ_B = {:.5} ± {:.5}",
            mutant.probability(),
            mutant.standard_error(),
            resident.probability(),
            resident.standard_error()
        );
        Ok(Comparison { mutant, resident })
    }

    fn base_seed(&self) -> u64 {
        self.config.seed.unwrap_or_else(|| {
            let seed = rand::random();
            log::info!("No simulation seed configured; using {}", seed);
            seed
        })
    }

    fn estimate(&self, game: &Game, base_seed: u64) -> Result<FixationEstimate, Error> {
        log::debug!(
            "Running {} trials of {:?} on {} nodes (seed {})",
            self.config.trials,
            self.config.rule,
            self.neighborhood.len(),
            base_seed
        );
        let fixations = self.count_fixations(game, base_seed)?;
        Ok(FixationEstimate {
            fixations,
            trials: self.config.trials,
            nodes: self.neighborhood.len(),
            significance: self.config.significance,
        })
    }

    #[cfg(feature = "parallel")]
    fn count_fixations(&self, game: &Game, base_seed: u64) -> Result<u64, Error> {
        (0..self.config.trials)
            .into_par_iter()
            .map(|trial| self.run_trial(game, base_seed, trial).map(u64::from))
            .try_reduce(|| 0, |a, b| Ok(a + b))
    }

    #[cfg(not(feature = "parallel"))]
    fn count_fixations(&self, game: &Game, base_seed: u64) -> Result<u64, Error> {
        let mut fixations = 0;
        for trial in 0..self.config.trials {
            fixations += u64::from(self.run_trial(game, base_seed, trial)?);
        }
        Ok(fixations)
    }

    /// Run one trial to absorption; true on fixation.
    pub fn run_trial(&self, game: &Game, base_seed: u64, trial: u64) -> Result<bool, Error> {
        let mut rng = TrialRng::for_trial(base_seed, trial);
        let n = self.neighborhood.len();
        let start = match self.config.start {
            Start::Uniform => rng.index(n),
            Start::Node { node } => node,
        };
        let mut population = Population::single_mutant(&self.neighborhood, *game, start)?;
        let mut scratch = Vec::with_capacity(n);

        let mut steps = 0;
        while !population.is_absorbed() {
            if steps == self.config.max_steps {
                return Err(NonConvergenceError {
                    trial,
                    steps,
                }
                .into());
            }
            self.step(&mut population, &mut rng, &mut scratch)?;
            steps += 1;
        }
        Ok(population.is_fixed())
    }

    fn fecundity(&self, population: &Population, node: usize) -> Result<f64, ValidationError> {
        let delta = self.game.delta();
        let payoff = population.payoff(node);
        let value = match self.config.fitness {
            FitnessMapping::Linear => 1.0 + delta * payoff,
            FitnessMapping::Exponential => (delta * payoff).exp(),
        };
        if !(value.is_finite() && value >= 0.0) {
            return Err(ValidationError::InvalidParameter {
                name: "fitness",
                reason: format!("fecundity {} at node {} (payoff {})", value, node, payoff),
            });
        }
        Ok(value)
    }

    fn step(
        &self,
        population: &mut Population,
        rng: &mut TrialRng,
        scratch: &mut Vec<(usize, f64)>,
    ) -> Result<(), ValidationError> {
        let hood = population.neighborhood();
        let n = population.len();
        match self.config.rule {
            UpdateRule::DeathBirth => {
                let dead = rng.index(n);
                scratch.clear();
                for &(j, p) in hood.parents(dead) {
                    scratch.push((j, p * self.fecundity(population, j)?));
                }
                let parent = rng.choose_weighted(scratch).ok_or_else(|| no_fecundity(dead))?;
                population.set(dead, population.strategy(parent));
            }
            UpdateRule::BirthDeath => {
                scratch.clear();
                for j in 0..n {
                    scratch.push((j, self.fecundity(population, j)?));
                }
                let parent = rng.choose_weighted(scratch).ok_or_else(|| no_fecundity(n))?;
                let site = rng
                    .choose_weighted(hood.dependents(parent))
                    .ok_or_else(|| no_fecundity(parent))?;
                population.set(site, population.strategy(parent));
            }
            UpdateRule::PairwiseComparison => {
                let focal = rng.index(n);
                let model = rng
                    .choose_weighted(hood.parents(focal))
                    .ok_or_else(|| no_fecundity(focal))?;
                let strategy = population.strategy(model);
                if strategy != population.strategy(focal) {
                    let gain = population.payoff(model) - population.payoff(focal);
                    let adopt = 1.0 / (1.0 + (-self.game.delta() * gain).exp());
                    if rng.bernoulli(adopt) {
                        population.set(focal, strategy);
                    }
                }
            }
        }
        Ok(())
    }
}

fn no_fecundity(node: usize) -> ValidationError {
    ValidationError::InvalidParameter {
        name: "fitness",
        reason: format!("no candidate with positive weight around node {}", node),
    }
}

/// Estimate the fixation probability of `game`'s mutant on `graph`.
pub fn simulate(graph: &Graph, game: Game, config: SimulationConfig) -> Result<FixationEstimate, Error> {
    Simulator::new(graph, game, config)?.run()
}
