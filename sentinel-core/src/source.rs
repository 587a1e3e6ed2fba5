//! Per-source cache records
//!
//! Every external feed is tracked by exactly one `SourceRecord`, mutated
//! only by the coordinator task that owns the source. A failed refresh
//! never discards the previous payload: the record flips to stale/error
//! while continuing to serve last-known-good data.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::feeds::{ConsensusDoc, OperatorProof, RelayDetail, RelayUptime};
use crate::ProbeOutcome;

/// Identifier for one external feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceId {
    /// Primary relay-directory snapshot (fast, defines the population)
    Details,
    /// Historical per-relay uptime feed
    Uptime,
    /// Consensus / authority-vote documents (slowest)
    Consensus,
    /// Directory-authority reachability probes
    Authorities,
    /// Proof-of-ownership (domain validation) feed
    Proofs,
}

impl SourceId {
    pub const ALL: [SourceId; 5] = [
        SourceId::Details,
        SourceId::Uptime,
        SourceId::Consensus,
        SourceId::Authorities,
        SourceId::Proofs,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Details => "details",
            Self::Uptime => "uptime",
            Self::Consensus => "consensus",
            Self::Authorities => "authorities",
            Self::Proofs => "proofs",
        }
    }
}

/// Freshness of a source's cached payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceStatus {
    /// Latest fetch succeeded
    Ready,
    /// Latest fetch failed; serving a previously fetched payload
    Stale,
    /// Latest fetch failed and no payload has ever been fetched
    Error,
}

/// Normalized payload shapes, one variant per feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SourcePayload {
    Details { relays: Vec<RelayDetail> },
    Uptime { relays: Vec<RelayUptime> },
    Consensus { document: ConsensusDoc },
    Authorities { probes: Vec<ProbeOutcome> },
    Proofs { proofs: Vec<OperatorProof> },
}

impl SourcePayload {
    pub fn source(&self) -> SourceId {
        match self {
            Self::Details { .. } => SourceId::Details,
            Self::Uptime { .. } => SourceId::Uptime,
            Self::Consensus { .. } => SourceId::Consensus,
            Self::Authorities { .. } => SourceId::Authorities,
            Self::Proofs { .. } => SourceId::Proofs,
        }
    }
}

/// The latest known state of one source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceRecord {
    pub source: SourceId,
    /// Last successfully parsed payload, if any fetch ever succeeded
    pub payload: Option<SourcePayload>,
    /// When the payload was fetched (unchanged by failed refreshes)
    pub fetched_at: Option<DateTime<Utc>>,
    /// Fetch-start tag of the attempt that produced this record;
    /// used to reject out-of-order writes
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration of the last attempt
    pub duration: Duration,
    pub status: SourceStatus,
    pub error_detail: Option<String>,
    /// Total fetch attempts for this source
    pub attempt: u64,
}

impl SourceRecord {
    /// Whether the record carries usable data (fresh or last-known-good).
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}
