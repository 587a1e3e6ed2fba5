//! Relay Sentinel runtime
//!
//! The concurrent half of the system: the per-source cache store, the
//! coordinator that keeps it filled, the population builder, the cycle
//! engine that turns cached payloads into record sets, and the snapshot
//! publisher boundary.

pub mod builder;
pub mod coordinator;
pub mod engine;
pub mod publish;
pub mod store;

pub use builder::*;
pub use coordinator::*;
pub use engine::*;
pub use publish::*;
pub use store::*;

pub use sentinel_analytics::NetworkIndicators;
