//! Consensus health evaluation
//!
//! Classifies raw authority probes into reachability statuses, runs the
//! consensus freshness state machine, and rolls both up into aggregate
//! network-quality indicators for the alert generator and the published
//! snapshot.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sentinel_core::feeds::ConsensusDoc;
use sentinel_core::{
    AuthorityStatus, DirectoryAuthority, ProbeOutcome, ReachStatus, RelayFlag,
};

/// Latency boundary between online and slow (milliseconds).
pub const SLOW_LATENCY_MS: u64 = 200;

/// Consensus validity relative to now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    /// now < valid-after
    Future,
    /// valid-after <= now <= fresh-until
    Current,
    /// now > fresh-until
    Stale,
    /// No parseable consensus this cycle
    Unknown,
}

/// Freshness state machine over the validity window.
pub fn consensus_freshness(document: Option<&ConsensusDoc>, now: DateTime<Utc>) -> Freshness {
    match document {
        None => Freshness::Unknown,
        Some(doc) => {
            if now < doc.valid_after {
                Freshness::Future
            } else if now <= doc.fresh_until {
                Freshness::Current
            } else {
                Freshness::Stale
            }
        }
    }
}

/// Classify one probe outcome.
///
/// timeout and offline both leave latency unset; they differ in whether
/// the connection attempt itself failed or the budget expired.
pub fn classify_probe(outcome: &ProbeOutcome, authority: &DirectoryAuthority) -> AuthorityStatus {
    let status = match (outcome.response_code, outcome.latency_ms) {
        (Some(code), Some(latency)) if (200..300).contains(&code) => {
            if latency < SLOW_LATENCY_MS {
                ReachStatus::Online
            } else {
                ReachStatus::Slow
            }
        }
        (Some(_), _) => ReachStatus::Degraded,
        (None, _) if outcome.timed_out => ReachStatus::Timeout,
        _ => ReachStatus::Offline,
    };
    AuthorityStatus {
        name: outcome.authority.clone(),
        status,
        latency_ms: outcome.latency_ms,
        last_checked: outcome.checked_at,
        capability_flags: authority.capability_flags.clone(),
    }
}

/// Classify all probes, matching each back to its registry entry.
pub fn classify_probes(
    probes: &[ProbeOutcome],
    registry: &[DirectoryAuthority],
) -> Vec<AuthorityStatus> {
    let empty = DirectoryAuthority {
        name: String::new(),
        address: String::new(),
        capability_flags: Vec::new(),
    };
    probes
        .iter()
        .map(|outcome| {
            let authority = registry
                .iter()
                .find(|a| a.name == outcome.authority)
                .unwrap_or(&empty);
            classify_probe(outcome, authority)
        })
        .collect()
}

/// Aggregate network-quality indicators for one cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkIndicators {
    pub freshness: Freshness,
    /// Seconds since valid-after, when a consensus is known
    pub consensus_age_secs: Option<i64>,
    pub flag_counts: HashMap<RelayFlag, usize>,
    pub total_consensus_bandwidth: u64,
    pub authorities_reachable: usize,
    pub authorities_total: usize,
}

pub fn evaluate_network(
    document: Option<&ConsensusDoc>,
    statuses: &[AuthorityStatus],
    now: DateTime<Utc>,
) -> NetworkIndicators {
    let freshness = consensus_freshness(document, now);
    NetworkIndicators {
        freshness,
        consensus_age_secs: document.map(|d| (now - d.valid_after).num_seconds()),
        flag_counts: document.map(|d| d.flag_counts()).unwrap_or_default(),
        total_consensus_bandwidth: document.map(|d| d.total_bandwidth()).unwrap_or(0),
        authorities_reachable: statuses
            .iter()
            .filter(|s| !s.status.is_unreachable())
            .count(),
        authorities_total: statuses.len(),
    }
}
