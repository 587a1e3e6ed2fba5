//! Relay Sentinel source layer
//!
//! One adapter per external feed, each owning its endpoint, cadence, and
//! parse step. Adapters are pure: a fetch either yields a fully-typed
//! payload or an error; nothing loosely-typed escapes this crate.

pub mod adapter;
pub mod authorities;
pub mod client;
pub mod consensus;
pub mod details;
pub mod proof;
pub mod uptime;

pub use adapter::*;
pub use authorities::*;
pub use client::*;
pub use consensus::ConsensusAdapter;
pub use details::DetailsAdapter;
pub use proof::{claims_from_details, ProofAdapter, ProofClaim};
pub use uptime::UptimeAdapter;
