//! Family relation sets
//!
//! Derived from declared-family lists, attached to each relay:
//! - `effective`: mutual declarations (symmetric across the population)
//! - `alleged`: outbound declarations that were not reciprocated
//! - `indirect`: reachable through one hop of another relay's effective set

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::Fingerprint;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyRelation {
    pub effective: BTreeSet<Fingerprint>,
    pub alleged: BTreeSet<Fingerprint>,
    pub indirect: BTreeSet<Fingerprint>,
}

impl FamilyRelation {
    pub fn is_empty(&self) -> bool {
        self.effective.is_empty() && self.alleged.is_empty() && self.indirect.is_empty()
    }

    /// Total relays related in any way.
    pub fn total(&self) -> usize {
        self.effective.len() + self.alleged.len() + self.indirect.len()
    }
}
