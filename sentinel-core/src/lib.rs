//! Relay Sentinel Core - domain model for relay network intelligence
//!
//! This crate provides the foundational types shared by every layer:
//! - Per-relay canonical entities and flag sets
//! - Per-source cache records with stale-fallback status
//! - Derived records: family relations, flag eligibility, rarity scores
//! - Authority health status and deduplicated alerts

pub mod alert;
pub mod authority;
pub mod eligibility;
pub mod family;
pub mod feeds;
pub mod rarity;
pub mod relay;
pub mod source;

pub use alert::*;
pub use authority::*;
pub use eligibility::*;
pub use family::*;
pub use rarity::*;
pub use relay::*;
pub use source::*;

/// Consecutive primary snapshots a relay may be absent from before removal.
pub const GRACE_SNAPSHOTS: u32 = 3;

/// Fallback Fast threshold when no authority votes are available (bytes/s).
pub const FALLBACK_FAST_SPEED: u64 = 100 * 1024;

/// Fallback Stable MTBF threshold (seconds, ~19 days).
pub const FALLBACK_STABLE_MTBF: u64 = 19 * 86_400;

/// Fallback Guard weighted-fractional-uptime threshold (fraction).
pub const FALLBACK_GUARD_WFU: f64 = 0.98;

/// Fallback Guard time-known threshold (seconds, 8 days).
pub const FALLBACK_GUARD_TK: u64 = 8 * 86_400;

/// Fallback Guard bandwidth threshold including exits (bytes/s, 2 MB/s).
pub const FALLBACK_GUARD_BANDWIDTH: u64 = 2 * 1024 * 1024;

/// Time-known threshold for the HSDir flag (seconds, 96 hours).
pub const HSDIR_TIME_KNOWN: u64 = 96 * 3_600;

/// Diversity weight for the geography dimension.
pub const GEO_WEIGHT: f64 = 2.0;

/// Diversity weight for the network/AS dimension.
pub const NETWORK_WEIGHT: f64 = 1.5;

/// Diversity weight for the platform dimension.
pub const PLATFORM_WEIGHT: f64 = 0.75;
