//! Alert records
//!
//! Alerts are deduplicated by (category, subject); a still-triggering
//! condition refreshes `still_active` instead of emitting a duplicate,
//! keeping the list stable across cycles for downstream diffing.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertCategory {
    /// Directory authorities unreachable or slow
    AuthorityReachability,
    /// Consensus validity window problems
    ConsensusFreshness,
    /// Aggregate network capacity / flag population problems
    NetworkCapacity,
    /// Widespread eligibility regressions
    FlagEligibility,
}

impl AlertCategory {
    pub fn name(&self) -> &'static str {
        match self {
            Self::AuthorityReachability => "authority_reachability",
            Self::ConsensusFreshness => "consensus_freshness",
            Self::NetworkCapacity => "network_capacity",
            Self::FlagEligibility => "flag_eligibility",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    /// Stable content-derived identifier for downstream diffing
    pub id: String,
    pub level: AlertLevel,
    pub category: AlertCategory,
    /// What the alert is about (authority name, flag name, "network", ...)
    pub subject: String,
    pub message: String,
    pub first_observed: DateTime<Utc>,
    pub still_active: bool,
}

impl Alert {
    pub fn new(
        level: AlertLevel,
        category: AlertCategory,
        subject: &str,
        message: String,
    ) -> Self {
        Self {
            id: Self::compute_id(category, subject),
            level,
            category,
            subject: subject.to_string(),
            message,
            first_observed: Utc::now(),
            still_active: true,
        }
    }

    /// Dedup key.
    pub fn key(&self) -> (AlertCategory, String) {
        (self.category, self.subject.clone())
    }

    fn compute_id(category: AlertCategory, subject: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(category.name().as_bytes());
        hasher.update(b":");
        hasher.update(subject.as_bytes());
        format!("{:x}", hasher.finalize())[..16].to_string()
    }
}
