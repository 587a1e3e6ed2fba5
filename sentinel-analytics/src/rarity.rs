//! Diversity/rarity scorer
//!
//! Stage one: population-level rarity per categorical value (country, AS,
//! platform) from two factors mapped through fixed threshold ladders.
//! Stage two: per-relay scores and per-operator weighted diversity, where
//! the network dimension only rewards spreading across AS numbers that
//! are actually rare.

use std::collections::{HashMap, HashSet};

use sentinel_core::{
    DiversityScore, RarityDimension, RarityScore, RelayEntity, GEO_WEIGHT, NETWORK_WEIGHT,
    PLATFORM_WEIGHT,
};

/// Relay-count factor: fraction of all relays in this value, 0-6.
fn count_factor(fraction: f64) -> u8 {
    match fraction {
        f if f >= 0.10 => 0,
        f if f >= 0.05 => 1,
        f if f >= 0.02 => 2,
        f if f >= 0.01 => 3,
        f if f >= 0.005 => 4,
        f if f >= 0.001 => 5,
        _ => 6,
    }
}

/// Concentration factor: fraction of total consensus weight (or, when no
/// weights are known, of distinct operators) in this value, 0-5.
fn concentration_factor(fraction: f64) -> u8 {
    match fraction {
        f if f >= 0.10 => 0,
        f if f >= 0.05 => 1,
        f if f >= 0.01 => 2,
        f if f >= 0.005 => 3,
        f if f >= 0.001 => 4,
        _ => 5,
    }
}

#[derive(Default)]
struct ValueAggregate {
    relay_count: usize,
    weight: u64,
    operators: HashSet<String>,
}

/// Population-wide rarity tables, rebuilt once per cycle.
pub struct RarityScorer {
    country: HashMap<String, RarityScore>,
    network: HashMap<String, RarityScore>,
    platform: HashMap<String, RarityScore>,
}

impl RarityScorer {
    /// Build rarity tables in a single pass over the population.
    pub fn build<'a>(relays: impl Iterator<Item = &'a RelayEntity>) -> Self {
        let mut countries: HashMap<String, ValueAggregate> = HashMap::new();
        let mut networks: HashMap<String, ValueAggregate> = HashMap::new();
        let mut platforms: HashMap<String, ValueAggregate> = HashMap::new();
        let mut total_relays = 0usize;
        let mut total_weight = 0u64;
        let mut all_operators: HashSet<String> = HashSet::new();

        for relay in relays {
            total_relays += 1;
            total_weight += relay.consensus_weight;
            let operator = relay.contact.clone().unwrap_or_default();
            if !operator.is_empty() {
                all_operators.insert(operator.clone());
            }

            let mut record = |table: &mut HashMap<String, ValueAggregate>,
                              value: &Option<String>| {
                if let Some(value) = value {
                    let aggregate = table.entry(value.clone()).or_default();
                    aggregate.relay_count += 1;
                    aggregate.weight += relay.consensus_weight;
                    if !operator.is_empty() {
                        aggregate.operators.insert(operator.clone());
                    }
                }
            };
            record(&mut countries, &relay.country_code);
            record(&mut networks, &relay.as_number);
            record(&mut platforms, &relay.platform);
        }

        let score_table = |table: HashMap<String, ValueAggregate>,
                           dimension: RarityDimension| {
            table
                .into_iter()
                .map(|(value, aggregate)| {
                    let count_fraction = if total_relays > 0 {
                        aggregate.relay_count as f64 / total_relays as f64
                    } else {
                        0.0
                    };
                    let concentration_fraction = if total_weight > 0 {
                        aggregate.weight as f64 / total_weight as f64
                    } else if !all_operators.is_empty() {
                        aggregate.operators.len() as f64 / all_operators.len() as f64
                    } else {
                        0.0
                    };
                    let raw =
                        count_factor(count_fraction) + concentration_factor(concentration_fraction);
                    (value, RarityScore::new(dimension, raw))
                })
                .collect()
        };

        Self {
            country: score_table(countries, RarityDimension::Country),
            network: score_table(networks, RarityDimension::Network),
            platform: score_table(platforms, RarityDimension::Platform),
        }
    }

    pub fn country(&self, code: &str) -> Option<RarityScore> {
        self.country.get(code).copied()
    }

    pub fn network(&self, as_number: &str) -> Option<RarityScore> {
        self.network.get(as_number).copied()
    }

    pub fn platform(&self, platform: &str) -> Option<RarityScore> {
        self.platform.get(platform).copied()
    }

    /// Per-dimension scores for one relay, skipping unknown values.
    pub fn relay_scores(&self, relay: &RelayEntity) -> Vec<RarityScore> {
        let mut scores = Vec::with_capacity(3);
        if let Some(code) = &relay.country_code {
            if let Some(score) = self.country(code) {
                scores.push(score);
            }
        }
        if let Some(as_number) = &relay.as_number {
            if let Some(score) = self.network(as_number) {
                scores.push(score);
            }
        }
        if let Some(platform) = &relay.platform {
            if let Some(score) = self.platform(platform) {
                scores.push(score);
            }
        }
        scores
    }

    /// Weighted diversity score for one operator's relays.
    ///
    /// Each dimension contributes distinct-value-count x weight; the
    /// network term additionally scales by the normalized mean rarity of
    /// the AS numbers involved, so spreading across dominant AS numbers
    /// contributes near zero.
    pub fn operator_diversity(&self, relays: &[&RelayEntity]) -> DiversityScore {
        let countries: HashSet<&str> = relays
            .iter()
            .filter_map(|r| r.country_code.as_deref())
            .collect();
        let as_numbers: HashSet<&str> =
            relays.iter().filter_map(|r| r.as_number.as_deref()).collect();
        let platforms: HashSet<&str> =
            relays.iter().filter_map(|r| r.platform.as_deref()).collect();

        let as_rarity_mean = if as_numbers.is_empty() {
            0.0
        } else {
            as_numbers
                .iter()
                .filter_map(|a| self.network(a))
                .map(|s| s.normalized())
                .sum::<f64>()
                / as_numbers.len() as f64
        };

        let geo_term = countries.len() as f64 * GEO_WEIGHT;
        let net_term = as_numbers.len() as f64 * NETWORK_WEIGHT * as_rarity_mean;
        let platform_term = platforms.len() as f64 * PLATFORM_WEIGHT;
        let score = geo_term + net_term + platform_term;

        let breakdown = format!(
            "geo {}x{GEO_WEIGHT} + net {}x{NETWORK_WEIGHT}x{as_rarity_mean:.2} + platform {}x{PLATFORM_WEIGHT} = {score:.2}",
            countries.len(),
            as_numbers.len(),
            platforms.len(),
        );
        DiversityScore { score, breakdown }
    }
}
