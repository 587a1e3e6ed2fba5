//! Flag eligibility records
//!
//! One row per relay per tracked metric: the measured value, the threshold
//! it was compared against, where both came from, and the verdict.

use serde::{Deserialize, Serialize};

use crate::RelayFlag;

/// Where a metric's threshold came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasurementSource {
    /// Relay's own published value compared against a fixed constant
    SelfReported,
    /// Threshold derived from directory-authority votes
    AuthorityVote,
}

/// Outcome of comparing a measured value against its threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Meets,
    Below,
    /// Base requirement state is incomplete: vote quorum not reached, or an
    /// optional secondary dimension (e.g. IPv6 reachability) is unconfirmed
    Partial,
}

/// One evaluated eligibility row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagEligibility {
    pub flag: RelayFlag,
    /// Metric name, e.g. "observed_bandwidth", "weighted_fractional_uptime"
    pub metric: String,
    pub measured: f64,
    pub threshold: f64,
    pub source: MeasurementSource,
    pub verdict: Verdict,
    /// Authorities whose votes contributed the threshold
    pub authority_vote_count: u32,
    /// Authorities known in the current consensus
    pub authority_total: u32,
}

impl FlagEligibility {
    /// Majority quorum for vote-based metrics.
    pub fn quorum(authority_total: u32) -> u32 {
        authority_total / 2 + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quorum_is_simple_majority() {
        assert_eq!(FlagEligibility::quorum(9), 5);
        assert_eq!(FlagEligibility::quorum(8), 5);
        assert_eq!(FlagEligibility::quorum(1), 1);
    }
}
