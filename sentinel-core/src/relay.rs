//! Canonical per-relay entities
//!
//! A `RelayEntity` is keyed by its stable fingerprint. The primary
//! directory snapshot creates entities and owns their baseline fields;
//! enrichment sources fill in the rest incrementally.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::FamilyRelation;

/// Errors from relay identity handling
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("Invalid fingerprint: {0}")]
    InvalidFingerprint(String),
}

/// Stable unique relay identifier: 40 uppercase hex characters.
///
/// Every constructor goes through `parse`, so a held `Fingerprint` is
/// always exactly 40 hex characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl<'de> Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

impl Fingerprint {
    /// Parse a fingerprint, normalizing case. Rejects non-hex input.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let normalized = raw.trim().to_uppercase();
        if normalized.len() != 40 || !normalized.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(RelayError::InvalidFingerprint(raw.to_string()));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..8]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capability/role flags assigned to relays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelayFlag {
    Authority,
    BadExit,
    Exit,
    Fast,
    Guard,
    HSDir,
    Running,
    Stable,
    StaleDesc,
    V2Dir,
    Valid,
}

impl RelayFlag {
    /// Parse a flag name as it appears in directory documents.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "Authority" => Some(Self::Authority),
            "BadExit" => Some(Self::BadExit),
            "Exit" => Some(Self::Exit),
            "Fast" => Some(Self::Fast),
            "Guard" => Some(Self::Guard),
            "HSDir" => Some(Self::HSDir),
            "Running" => Some(Self::Running),
            "Stable" => Some(Self::Stable),
            "StaleDesc" => Some(Self::StaleDesc),
            "V2Dir" => Some(Self::V2Dir),
            "Valid" => Some(Self::Valid),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Authority => "Authority",
            Self::BadExit => "BadExit",
            Self::Exit => "Exit",
            Self::Fast => "Fast",
            Self::Guard => "Guard",
            Self::HSDir => "HSDir",
            Self::Running => "Running",
            Self::Stable => "Stable",
            Self::StaleDesc => "StaleDesc",
            Self::V2Dir => "V2Dir",
            Self::Valid => "Valid",
        }
    }
}

/// Uptime summary derived from the historical-uptime feed.
///
/// Carries the timestamp of the fetch it came from; a stale uptime source
/// leaves this in place with its original timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UptimeSummary {
    /// Mean fraction of time the relay was reachable (0.0 - 1.0)
    pub running_fraction: f64,
    /// Mean fraction of time per flag, where the feed provides one
    pub flag_fractions: HashMap<RelayFlag, f64>,
    /// When the underlying feed payload was fetched
    pub fetched_at: DateTime<Utc>,
}

/// Canonical per-relay record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayEntity {
    /// Stable identity
    pub fingerprint: Fingerprint,
    pub nickname: String,
    /// Operator contact identifier (raw contact line, lowercased)
    pub contact: Option<String>,

    /// OR addresses as published (ip:port, IPv6 in brackets)
    pub or_addresses: Vec<String>,
    pub country_code: Option<String>,
    pub as_number: Option<String>,
    pub as_name: Option<String>,
    pub platform: Option<String>,

    /// Bandwidth figures in bytes/second
    pub advertised_bandwidth: u64,
    pub observed_bandwidth: u64,
    pub bandwidth_rate: u64,
    /// Consensus weight, filled by consensus enrichment
    pub consensus_weight: u64,

    /// Current flag set from the primary snapshot
    pub flags: BTreeSet<RelayFlag>,
    /// IPv6 OR port confirmed reachable by the consensus; None = unconfirmed
    pub ipv6_confirmed: Option<bool>,

    pub first_seen: Option<DateTime<Utc>>,
    pub last_seen: Option<DateTime<Utc>>,

    /// Fingerprints this relay declares kinship with (raw, as published)
    pub declared_family: Vec<Fingerprint>,
    /// Resolved family relations, recomputed each cycle
    #[serde(default)]
    pub family: FamilyRelation,

    /// Uptime-derived fields, kept at last-good values when the feed lags
    pub uptime: Option<UptimeSummary>,

    /// Generation this entity was last touched in
    pub generation: u64,
    /// Consecutive primary snapshots this relay has been absent from
    pub missed_snapshots: u32,
}

impl RelayEntity {
    pub fn new(fingerprint: Fingerprint) -> Self {
        Self {
            fingerprint,
            nickname: String::new(),
            contact: None,
            or_addresses: Vec::new(),
            country_code: None,
            as_number: None,
            as_name: None,
            platform: None,
            advertised_bandwidth: 0,
            observed_bandwidth: 0,
            bandwidth_rate: 0,
            consensus_weight: 0,
            flags: BTreeSet::new(),
            ipv6_confirmed: None,
            first_seen: None,
            last_seen: None,
            declared_family: Vec::new(),
            family: FamilyRelation::default(),
            uptime: None,
            generation: 0,
            missed_snapshots: 0,
        }
    }

    pub fn has_flag(&self, flag: RelayFlag) -> bool {
        self.flags.contains(&flag)
    }

    /// Whether the relay publishes any IPv6 OR address.
    pub fn has_ipv6_address(&self) -> bool {
        self.or_addresses.iter().any(|a| a.starts_with('['))
    }

    /// Seconds since the relay was first seen, relative to `now`.
    pub fn time_known_secs(&self, now: DateTime<Utc>) -> u64 {
        match self.first_seen {
            Some(first) => (now - first).num_seconds().max(0) as u64,
            None => 0,
        }
    }
}
