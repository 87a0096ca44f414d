//! Mutation–selection simulation for producers of social goods.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::ValidationError;

use super::super::graph::Graph;
use super::super::simulation::TrialRng;
use super::Production;

/// Death–birth process with mutation on a fixed graph.
///
/// Every update a uniformly random individual dies; a neighbor `j` replaces
/// it with probability proportional to `W_ij exp(δ (f_j − max f))`, and the
/// offspring's trait is flipped with probability `u/2`.
pub struct MutationSelection<'a> {
    graph: &'a Graph,
    production: Production,
    mutation_rate: f64,
    delta: f64,
    producers: Vec<bool>,
    count: usize,
    rng: TrialRng,
    scratch: Vec<(usize, f64)>,
}

impl<'a> MutationSelection<'a> {
    /// Start from an explicit producer assignment.
    pub fn new(
        graph: &'a Graph,
        production: Production,
        mutation_rate: f64,
        delta: f64,
        producers: Vec<bool>,
        rng: TrialRng,
    ) -> Result<Self, ValidationError> {
        if producers.len() != graph.len() {
            return Err(ValidationError::StateLength {
                expected: graph.len(),
                got: producers.len(),
            });
        }
        if !(0.0..=1.0).contains(&mutation_rate) {
            return Err(ValidationError::InvalidProbability {
                value: mutation_rate,
            });
        }
        if !(delta.is_finite() && delta >= 0.0) {
            return Err(ValidationError::NegativeIntensity(delta));
        }
        let production = Production::new(production.good, production.benefit, production.cost)?;
        let count = producers.iter().filter(|&&p| p).count();
        Ok(Self {
            graph,
            production,
            mutation_rate,
            delta,
            producers,
            count,
            rng,
            scratch: Vec::with_capacity(graph.len()),
        })
    }

    /// Start from a uniformly random assignment drawn from `rng`.
    pub fn random(
        graph: &'a Graph,
        production: Production,
        mutation_rate: f64,
        delta: f64,
        mut rng: TrialRng,
    ) -> Result<Self, ValidationError> {
        let producers = (0..graph.len()).map(|_| rng.bernoulli(0.5)).collect();
        Self::new(graph, production, mutation_rate, delta, producers, rng)
    }

    pub fn producers(&self) -> &[bool] {
        &self.producers
    }

    /// Fraction of producers.
    pub fn mean_frequency(&self) -> f64 {
        self.count as f64 / self.producers.len() as f64
    }

    fn payoff(&self, i: usize) -> f64 {
        self.production.payoff(self.graph, |k| self.producers[k], i)
    }

    /// Payoffs of the nodes in `subset`, in order.
    pub fn payoffs(&self, subset: &[usize]) -> Result<Vec<f64>, ValidationError> {
        subset
            .iter()
            .map(|&i| {
                self.graph.check_node(i)?;
                Ok(self.payoff(i))
            })
            .collect()
    }

    /// One death–birth event.
    pub fn update(&mut self) {
        let death = self.rng.index(self.graph.len());

        let mut scratch = std::mem::take(&mut self.scratch);
        scratch.clear();
        let mut best = f64::NEG_INFINITY;
        for (j, _) in self.graph.neighbors(death) {
            let payoff = self.payoff(j);
            best = best.max(payoff);
            scratch.push((j, payoff));
        }
        for (j, weight) in scratch.iter_mut() {
            *weight = self.graph.transition(death, *j) * (self.delta * (*weight - best)).exp();
        }
        let parent = self.rng.choose_weighted(&scratch);
        self.scratch = scratch;

        // Rows of W always carry mass, so a parent exists
        let Some(parent) = parent else {
            return;
        };
        let mut offspring = self.producers[parent];
        if self.rng.bernoulli(self.mutation_rate / 2.0) {
            offspring = !offspring;
        }
        let previous = std::mem::replace(&mut self.producers[death], offspring);
        match (previous, offspring) {
            (false, true) => self.count += 1,
            (true, false) => self.count -= 1,
            _ => {}
        }
    }

    /// Run `updates` events; returns the producer frequency after each.
    pub fn run(&mut self, updates: u64) -> Vec<f64> {
        (0..updates)
            .map(|_| {
                self.update();
                self.mean_frequency()
            })
            .collect()
    }
}

/// Time-averaged producer frequency at each mutation rate.
///
/// Rate `k` starts from a random state and runs with its own stream derived
/// from `(seed, k)`.
pub fn simulate_sweep(
    graph: &Graph,
    production: Production,
    rates: &[f64],
    delta: f64,
    updates: u64,
    seed: u64,
) -> Result<Vec<f64>, ValidationError> {
    let run_rate = |(k, &u): (usize, &f64)| -> Result<f64, ValidationError> {
        let rng = TrialRng::for_trial(seed, k as u64);
        let mut process = MutationSelection::random(graph, production, u, delta, rng)?;
        let frequencies = process.run(updates);
        let mean = frequencies.iter().sum::<f64>() / frequencies.len().max(1) as f64;
        log::debug!("u = {}: mean producer frequency {:.5}", u, mean);
        Ok(mean)
    };

    #[cfg(feature = "parallel")]
    let indexed = rates.par_iter().enumerate();
    #[cfg(not(feature = "parallel"))]
    let indexed = rates.iter().enumerate();
    indexed.map(run_rate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SocialGood;

    fn cycle(n: usize) -> Graph {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| {
                (0..n)
                    .map(|j| if (i + 1) % n == j || (j + 1) % n == i { 1.0 } else { 0.0 })
                    .collect()
            })
            .collect();
        Graph::from_adjacency(&rows).unwrap()
    }

    fn ff() -> Production {
        Production::new(SocialGood::Ff, 4.0, 1.0).unwrap()
    }

    #[test]
    fn test_no_mutation_keeps_monomorphic_state() {
        let graph = cycle(6);
        let mut all = MutationSelection::new(&graph, ff(), 0.0, 0.5, vec![true; 6], TrialRng::new(1))
            .unwrap();
        assert!(all.run(200).iter().all(|&f| f == 1.0));
        let mut none =
            MutationSelection::new(&graph, ff(), 0.0, 0.5, vec![false; 6], TrialRng::new(1))
                .unwrap();
        assert!(none.run(200).iter().all(|&f| f == 0.0));
    }

    #[test]
    fn test_payoffs_on_cycle() {
        let graph = cycle(4);
        let mut state = vec![false; 4];
        state[0] = true;
        let process = MutationSelection::new(&graph, ff(), 0.1, 0.1, state, TrialRng::new(0)).unwrap();
        let payoffs = process.payoffs(&[0, 1, 2]).unwrap();
        assert_eq!(payoffs, vec![-1.0, 2.0, 0.0]);
        assert!(process.payoffs(&[4]).is_err());
    }

    #[test]
    fn test_validation() {
        let graph = cycle(4);
        assert!(matches!(
            MutationSelection::new(&graph, ff(), 0.1, 0.1, vec![true; 3], TrialRng::new(0)),
            Err(ValidationError::StateLength { expected: 4, got: 3 })
        ));
        assert!(MutationSelection::new(&graph, ff(), 1.5, 0.1, vec![true; 4], TrialRng::new(0)).is_err());
        assert!(MutationSelection::new(&graph, ff(), 0.1, -1.0, vec![true; 4], TrialRng::new(0)).is_err());
    }

    #[test]
    fn test_seeded_runs_repeat() {
        let graph = cycle(8);
        let trajectory = |seed| {
            MutationSelection::random(&graph, ff(), 0.2, 0.1, TrialRng::new(seed))
                .unwrap()
                .run(500)
        };
        assert_eq!(trajectory(5), trajectory(5));
    }

    #[test]
    fn test_neutral_sweep_hovers_at_half() {
        let graph = cycle(6);
        let means = simulate_sweep(&graph, ff(), &[0.5, 1.0], 0.0, 20_000, 3).unwrap();
        assert_eq!(means.len(), 2);
        for mean in means {
            assert!((mean - 0.5).abs() < 0.1, "mean {}", mean);
        }
    }

    #[test]
    fn test_costly_production_tracks_exact_effect() {
        // Pure cost: ⟨x⟩ ≈ ½ + δ·ff with ff ≈ −0.346 at u = 0.2
        let graph = cycle(6);
        let (u, delta) = (0.2, 0.2);
        let effect = crate::compute::social::SocialAnalysis::new(&graph)
            .effects(u, 0.0, 1.0)
            .unwrap()
            .ff;
        assert!(effect < 0.0);

        let production = Production::new(SocialGood::Ff, 0.0, 1.0).unwrap();
        let means = simulate_sweep(&graph, production, &[u; 8], delta, 20_000, 41).unwrap();
        let mean = means.iter().sum::<f64>() / means.len() as f64;
        let shift = mean - 0.5;
        assert!(shift < 0.0, "mean {}", mean);
        assert!(
            (shift - delta * effect).abs() < 0.035,
            "simulated shift {} exact {}",
            shift,
            delta * effect
        );
    }
}
