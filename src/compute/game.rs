//! Symmetric two-strategy games.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::schema::PayoffSpec;

/// One of the two competing strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// The invading strategy (A).
    Mutant,
    /// The established strategy (B).
    Resident,
}

impl Strategy {
    /// The other strategy.
    #[inline]
    pub fn opponent(self) -> Strategy {
        match self {
            Strategy::Mutant => Strategy::Resident,
            Strategy::Resident => Strategy::Mutant,
        }
    }
}

/// 2×2 payoff matrix with a selection intensity.
///
/// | focal \ partner | Mutant | Resident |
/// |-----------------|--------|----------|
/// | Mutant          | R      | S        |
/// | Resident        | T      | P        |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Game {
    reward: f64,
    sucker: f64,
    temptation: f64,
    punishment: f64,
    delta: f64,
}

impl Game {
    /// Create a game from the four payoffs and selection intensity `delta`.
    pub fn new(
        reward: f64,
        sucker: f64,
        temptation: f64,
        punishment: f64,
        delta: f64,
    ) -> Result<Self, ValidationError> {
        for (name, value) in [
            ("reward", reward),
            ("sucker", sucker),
            ("temptation", temptation),
            ("punishment", punishment),
        ] {
            if !value.is_finite() {
                return Err(ValidationError::NonFinitePayoff { name });
            }
        }
        if !(delta.is_finite() && delta >= 0.0) {
            return Err(ValidationError::NegativeIntensity(delta));
        }
        Ok(Self {
            reward,
            sucker,
            temptation,
            punishment,
            delta,
        })
    }

    /// Create a game from a payoff family.
    pub fn from_spec(spec: &PayoffSpec, delta: f64) -> Result<Self, ValidationError> {
        let (r, s, t, p) = spec.entries();
        Self::new(r, s, t, p, delta)
    }

    /// Payoff to a `focal` individual interacting with `partner`.
    #[inline]
    pub fn payoff(&self, focal: Strategy, partner: Strategy) -> f64 {
        match (focal, partner) {
            (Strategy::Mutant, Strategy::Mutant) => self.reward,
            (Strategy::Mutant, Strategy::Resident) => self.sucker,
            (Strategy::Resident, Strategy::Mutant) => self.temptation,
            (Strategy::Resident, Strategy::Resident) => self.punishment,
        }
    }

    /// Selection intensity δ.
    #[inline]
    pub fn delta(&self) -> f64 {
        self.delta
    }

    /// The game seen from the resident's side: strategies swap roles.
    pub fn swapped(&self) -> Self {
        Self {
            reward: self.punishment,
            sucker: self.temptation,
            temptation: self.sucker,
            punishment: self.reward,
            delta: self.delta,
        }
    }

    /// `(R, S, T, P)`.
    pub fn entries(&self) -> (f64, f64, f64, f64) {
        (self.reward, self.sucker, self.temptation, self.punishment)
    }

    /// Smallest payoff entry; bounds every `W`-weighted average payoff.
    pub fn min_payoff(&self) -> f64 {
        self.reward
            .min(self.sucker)
            .min(self.temptation)
            .min(self.punishment)
    }

    /// Largest payoff entry.
    pub fn max_payoff(&self) -> f64 {
        self.reward
            .max(self.sucker)
            .max(self.temptation)
            .max(self.punishment)
    }

    /// Equal gains from switching: `R − S − T + P = 0`.
    pub fn is_additive(&self, tolerance: f64) -> bool {
        (self.reward - self.sucker - self.temptation + self.punishment).abs() <= tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payoff_lookup() {
        let game = Game::new(3.0, 0.0, 5.0, 1.0, 0.01).unwrap();
        assert_eq!(game.payoff(Strategy::Mutant, Strategy::Mutant), 3.0);
        assert_eq!(game.payoff(Strategy::Mutant, Strategy::Resident), 0.0);
        assert_eq!(game.payoff(Strategy::Resident, Strategy::Mutant), 5.0);
        assert_eq!(game.payoff(Strategy::Resident, Strategy::Resident), 1.0);
    }

    #[test]
    fn test_rejects_invalid_inputs() {
        assert_eq!(
            Game::new(f64::NAN, 0.0, 0.0, 0.0, 0.1).unwrap_err(),
            ValidationError::NonFinitePayoff { name: "reward" }
        );
        assert!(matches!(
            Game::new(1.0, 0.0, 0.0, 0.0, -0.1),
            Err(ValidationError::NegativeIntensity(_))
        ));
    }

    #[test]
    fn test_swapped_roles() {
        let game = Game::new(3.0, 0.0, 5.0, 1.0, 0.1).unwrap();
        let swapped = game.swapped();
        for a in [Strategy::Mutant, Strategy::Resident] {
            for b in [Strategy::Mutant, Strategy::Resident] {
                assert_eq!(
                    swapped.payoff(a.opponent(), b.opponent()),
                    game.payoff(a, b)
                );
            }
        }
    }

    #[test]
    fn test_donation_is_additive() {
        let donation = Game::from_spec(&PayoffSpec::Donation { benefit: 4.0, cost: 1.0 }, 0.0).unwrap();
        assert!(donation.is_additive(1e-12));
        let pd = Game::new(3.0, 0.0, 5.0, 1.0, 0.0).unwrap();
        assert!(!pd.is_additive(1e-12));
    }
}
