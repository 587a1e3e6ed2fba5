//! Directory authority identity and health status

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A known directory authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryAuthority {
    pub name: String,
    /// host:port of the directory endpoint
    pub address: String,
    /// Roles the authority advertises (e.g. "v3ident", "bridge")
    pub capability_flags: Vec<String>,
}

/// Raw outcome of one reachability probe, before classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub authority: String,
    /// HTTP-style status code, when a response arrived
    pub response_code: Option<u16>,
    /// Round-trip latency; None when the probe never completed
    pub latency_ms: Option<u64>,
    /// Whether the probe's time budget expired before any response
    #[serde(default)]
    pub timed_out: bool,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

/// Classified reachability state of one authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReachStatus {
    /// 2xx under 200 ms
    Online,
    /// 2xx but slower than 200 ms
    Slow,
    /// Responded with a non-2xx code
    Degraded,
    /// Probe budget expired
    Timeout,
    /// Connection could not be established
    Offline,
}

impl ReachStatus {
    /// Whether this state counts against the reachable-authority quorum.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Offline)
    }
}

/// Health record for one authority, produced each monitoring cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorityStatus {
    pub name: String,
    pub status: ReachStatus,
    pub latency_ms: Option<u64>,
    pub last_checked: DateTime<Utc>,
    pub capability_flags: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_states() {
        assert!(ReachStatus::Timeout.is_unreachable());
        assert!(ReachStatus::Offline.is_unreachable());
        assert!(!ReachStatus::Slow.is_unreachable());
        assert!(!ReachStatus::Degraded.is_unreachable());
    }
}
