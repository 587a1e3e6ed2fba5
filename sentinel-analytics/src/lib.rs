//! Relay Sentinel analytics
//!
//! Pure, synchronous computations over a point-in-time population
//! snapshot: family resolution, flag eligibility, rarity/diversity
//! scoring, consensus health evaluation, and alert generation. Nothing
//! here touches the network or the cache store.

pub mod alerts;
pub mod eligibility;
pub mod family;
pub mod health;
pub mod rarity;

pub use alerts::*;
pub use eligibility::*;
pub use family::*;
pub use health::*;
pub use rarity::*;
