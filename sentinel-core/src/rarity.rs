//! Rarity and diversity score types
//!
//! A rarity score is a bounded small integer computed per categorical
//! value (a country, an AS, a platform) and mapped to a named tier.
//! Operators additionally carry a weighted diversity score across their
//! whole relay set.

use serde::{Deserialize, Serialize};

/// Maximum raw rarity score: count factor (0-6) + weight factor (0-5).
pub const MAX_RARITY_RAW: u8 = 11;

/// Dimension a rarity score was computed over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RarityDimension {
    Country,
    Network,
    Platform,
}

/// Named rarity bucket derived from the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Common,
    Emerging,
    Rare,
    Epic,
    Legendary,
}

impl Tier {
    /// Pure mapping from a raw score to its tier. Fixed cut points:
    /// 0-2 common, 3-5 emerging, 6-8 rare, 9-10 epic, 11 legendary.
    pub fn from_raw(raw: u8) -> Self {
        match raw {
            0..=2 => Self::Common,
            3..=5 => Self::Emerging,
            6..=8 => Self::Rare,
            9..=10 => Self::Epic,
            _ => Self::Legendary,
        }
    }
}

/// Rarity score for one categorical value in one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RarityScore {
    pub dimension: RarityDimension,
    /// Bounded raw score in [0, MAX_RARITY_RAW]
    pub raw: u8,
    pub tier: Tier,
}

impl RarityScore {
    pub fn new(dimension: RarityDimension, raw: u8) -> Self {
        let raw = raw.min(MAX_RARITY_RAW);
        Self {
            dimension,
            raw,
            tier: Tier::from_raw(raw),
        }
    }

    /// Raw score normalized to [0, 1], used to scale the network
    /// dimension's diversity weight.
    pub fn normalized(&self) -> f64 {
        self.raw as f64 / MAX_RARITY_RAW as f64
    }
}

/// Weighted diversity score for one operator's whole relay set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiversityScore {
    pub score: f64,
    /// Tooltip-style explanation of how the score decomposes
    pub breakdown: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_cut_points() {
        assert_eq!(Tier::from_raw(0), Tier::Common);
        assert_eq!(Tier::from_raw(2), Tier::Common);
        assert_eq!(Tier::from_raw(3), Tier::Emerging);
        assert_eq!(Tier::from_raw(5), Tier::Emerging);
        assert_eq!(Tier::from_raw(6), Tier::Rare);
        assert_eq!(Tier::from_raw(8), Tier::Rare);
        assert_eq!(Tier::from_raw(9), Tier::Epic);
        assert_eq!(Tier::from_raw(10), Tier::Epic);
        assert_eq!(Tier::from_raw(11), Tier::Legendary);
    }

    #[test]
    fn test_raw_is_clamped() {
        let score = RarityScore::new(RarityDimension::Network, 200);
        assert_eq!(score.raw, MAX_RARITY_RAW);
        assert_eq!(score.tier, Tier::Legendary);
    }

    #[test]
    fn test_tier_is_deterministic() {
        for raw in 0..=MAX_RARITY_RAW {
            let a = RarityScore::new(RarityDimension::Country, raw);
            let b = RarityScore::new(RarityDimension::Country, raw);
            assert_eq!(a.tier, b.tier);
        }
    }
}
