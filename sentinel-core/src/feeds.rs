//! Normalized feed document shapes
//!
//! One strongly-typed shape per external feed, produced by the source
//! adapters' parse step. Loosely-typed data never travels past the
//! adapter boundary.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Fingerprint, RelayFlag};

/// One relay record from the primary directory snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayDetail {
    pub fingerprint: Fingerprint,
    pub nickname: String,
    #[serde(default)]
    pub contact: Option<String>,
    #[serde(default)]
    pub or_addresses: Vec<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub as_number: Option<String>,
    #[serde(default)]
    pub as_name: Option<String>,
    #[serde(default)]
    pub platform: Option<String>,
    #[serde(default)]
    pub advertised_bandwidth: u64,
    #[serde(default)]
    pub observed_bandwidth: u64,
    #[serde(default)]
    pub bandwidth_rate: u64,
    #[serde(default)]
    pub flags: BTreeSet<RelayFlag>,
    /// Fingerprints the relay declares kinship with (normalized; nickname
    /// and malformed entries already dropped by the adapter)
    #[serde(default)]
    pub declared_family: Vec<Fingerprint>,
    #[serde(default)]
    pub first_seen: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Factor-compressed uptime time series, onion-directory style:
/// each value is an integer in [0, 999] scaled by `factor` to a fraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeSeries {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
    /// Seconds between data points
    pub interval: u64,
    pub factor: f64,
    /// None marks a gap in the history
    pub values: Vec<Option<u64>>,
}

impl UptimeSeries {
    /// Mean decoded fraction across non-gap data points.
    pub fn mean_fraction(&self) -> Option<f64> {
        let present: Vec<u64> = self.values.iter().flatten().copied().collect();
        if present.is_empty() {
            return None;
        }
        let sum: f64 = present.iter().map(|v| *v as f64 * self.factor).sum();
        Some((sum / present.len() as f64).clamp(0.0, 1.0))
    }

    /// Total span covered by the series, in seconds.
    pub fn span_secs(&self) -> u64 {
        (self.last - self.first).num_seconds().max(0) as u64
    }
}

/// Per-relay uptime history keyed by flag name ("Running", "Guard", ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayUptime {
    pub fingerprint: Fingerprint,
    pub series: HashMap<String, UptimeSeries>,
}

/// Numeric eligibility thresholds from one authority's vote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlagThresholds {
    pub stable_uptime: Option<u64>,
    pub stable_mtbf: Option<u64>,
    pub fast_speed: Option<u64>,
    /// Weighted fractional uptime as a fraction (0.0 - 1.0)
    pub guard_wfu: Option<f64>,
    pub guard_tk: Option<u64>,
    pub guard_bw_inc_exits: Option<u64>,
}

/// One authority's vote line in the consensus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityVote {
    pub name: String,
    pub address: String,
    pub thresholds: Option<FlagThresholds>,
}

/// One relay status entry in the consensus document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusRelay {
    pub nickname: String,
    pub fingerprint: Fingerprint,
    pub flags: BTreeSet<RelayFlag>,
    /// Consensus bandwidth weight
    pub bandwidth: u64,
    /// Whether the consensus confirmed an IPv6 OR port
    pub ipv6_reachable: bool,
}

/// Parsed consensus-equivalent document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsensusDoc {
    pub valid_after: DateTime<Utc>,
    pub fresh_until: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub method: u32,
    pub authorities: Vec<AuthorityVote>,
    pub relays: Vec<ConsensusRelay>,
}

impl ConsensusDoc {
    /// Relay count per flag across the whole document.
    pub fn flag_counts(&self) -> HashMap<RelayFlag, usize> {
        let mut counts: HashMap<RelayFlag, usize> = HashMap::new();
        for relay in &self.relays {
            for flag in &relay.flags {
                *counts.entry(*flag).or_default() += 1;
            }
        }
        counts
    }

    /// Sum of consensus bandwidth weights.
    pub fn total_bandwidth(&self) -> u64 {
        self.relays.iter().map(|r| r.bandwidth).sum()
    }

    /// Majority threshold value for a vote-derived metric, with the count
    /// of authorities that actually reported it.
    pub fn vote_threshold<T, F>(&self, extract: F) -> (Option<T>, u32)
    where
        T: PartialOrd + Copy,
        F: Fn(&FlagThresholds) -> Option<T>,
    {
        let mut reported: Vec<T> = self
            .authorities
            .iter()
            .filter_map(|a| a.thresholds.as_ref().and_then(&extract))
            .collect();
        let count = reported.len() as u32;
        if reported.is_empty() {
            return (None, 0);
        }
        // Median of reporting authorities.
        reported.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        (Some(reported[reported.len() / 2]), count)
    }
}

/// How a proof-of-ownership document is published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofKind {
    /// Fetched from https://<domain>/.well-known/ path
    WellKnownUri,
    /// DNS-TXT-equivalent record lookup
    DnsTxt,
}

/// Result of checking one operator's claimed domain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorProof {
    pub domain: String,
    pub kind: ProofKind,
    /// Fingerprints found in the proof document
    pub fingerprints: Vec<Fingerprint>,
    pub validated: bool,
    pub checked_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(c: char) -> Fingerprint {
        Fingerprint::parse(&c.to_string().repeat(40)).unwrap()
    }

    #[test]
    fn test_uptime_series_mean() {
        let series = UptimeSeries {
            first: Utc::now() - chrono::Duration::days(7),
            last: Utc::now(),
            interval: 3_600,
            factor: 0.001,
            values: vec![Some(999), Some(999), None, Some(0)],
        };
        let mean = series.mean_fraction().unwrap();
        assert!((mean - 0.666).abs() < 0.001);
    }

    #[test]
    fn test_uptime_series_all_gaps() {
        let series = UptimeSeries {
            first: Utc::now(),
            last: Utc::now(),
            interval: 3_600,
            factor: 0.001,
            values: vec![None, None],
        };
        assert!(series.mean_fraction().is_none());
    }

    #[test]
    fn test_consensus_flag_counts_and_bandwidth() {
        let doc = ConsensusDoc {
            valid_after: Utc::now(),
            fresh_until: Utc::now(),
            valid_until: Utc::now(),
            method: 28,
            authorities: Vec::new(),
            relays: vec![
                ConsensusRelay {
                    nickname: "a".into(),
                    fingerprint: fp('A'),
                    flags: [RelayFlag::Running, RelayFlag::Fast].into_iter().collect(),
                    bandwidth: 100,
                    ipv6_reachable: false,
                },
                ConsensusRelay {
                    nickname: "b".into(),
                    fingerprint: fp('B'),
                    flags: [RelayFlag::Running].into_iter().collect(),
                    bandwidth: 50,
                    ipv6_reachable: true,
                },
            ],
        };
        let counts = doc.flag_counts();
        assert_eq!(counts[&RelayFlag::Running], 2);
        assert_eq!(counts[&RelayFlag::Fast], 1);
        assert_eq!(doc.total_bandwidth(), 150);
    }

    #[test]
    fn test_vote_threshold_median_and_count() {
        let vote = |fast: Option<u64>| AuthorityVote {
            name: "auth".into(),
            address: "203.0.113.1:80".into(),
            thresholds: Some(FlagThresholds {
                fast_speed: fast,
                ..Default::default()
            }),
        };
        let doc = ConsensusDoc {
            valid_after: Utc::now(),
            fresh_until: Utc::now(),
            valid_until: Utc::now(),
            method: 28,
            authorities: vec![vote(Some(100)), vote(Some(300)), vote(Some(200)), vote(None)],
            relays: Vec::new(),
        };
        let (threshold, count) = doc.vote_threshold(|t| t.fast_speed);
        assert_eq!(threshold, Some(200));
        assert_eq!(count, 3);
    }
}
