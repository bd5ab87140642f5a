//! Daily prize wheel: a fixed table of tiers resolved from a single uniform
//! draw against cumulative weights.

use rand::Rng;

use crate::constants::PRIZE_TABLE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrizeTier {
    pub amount: i64,
    pub weight: u32,
}

#[derive(Debug, Clone)]
pub struct PrizeWheel {
    tiers: Vec<PrizeTier>,
    total_weight: u32,
}

impl PrizeWheel {
    /// Builds a wheel; returns `None` when there are no tiers or every weight
    /// is zero.
    pub fn new(tiers: impl IntoIterator<Item = PrizeTier>) -> Option<Self> {
        let tiers: Vec<PrizeTier> = tiers.into_iter().collect();
        let total_weight = tiers.iter().map(|t| t.weight).sum();
        if total_weight == 0 {
            return None;
        }
        Some(Self {
            tiers,
            total_weight,
        })
    }

    pub fn standard() -> Self {
        Self {
            tiers: PRIZE_TABLE
                .iter()
                .map(|&(amount, weight)| PrizeTier { amount, weight })
                .collect(),
            total_weight: PRIZE_TABLE.iter().map(|&(_, w)| w).sum(),
        }
    }

    pub fn tiers(&self) -> &[PrizeTier] {
        &self.tiers
    }

    pub fn total_weight(&self) -> u32 {
        self.total_weight
    }

    pub fn contains(&self, amount: i64) -> bool {
        self.tiers.iter().any(|t| t.amount == amount)
    }

    /// Draws one prize.
    pub fn spin<R: Rng>(&self, rng: &mut R) -> i64 {
        self.resolve(rng.gen_range(0..self.total_weight))
    }

    /// Maps a roll in `[0, total_weight)` to its tier.
    pub fn resolve(&self, roll: u32) -> i64 {
        let mut cumulative = 0;
        for tier in &self.tiers {
            cumulative += tier.weight;
            if roll < cumulative {
                return tier.amount;
            }
        }
        // roll >= total_weight; clamp to the last tier
        self.tiers.last().map(|t| t.amount).unwrap_or_default()
    }
}

impl Default for PrizeWheel {
    fn default() -> Self {
        Self::standard()
    }
}
