//! Relay record builder
//!
//! Maintains the canonical relay population across cycles. The primary
//! directory snapshot creates and retires entities; the uptime and
//! consensus feeds enrich existing ones. Enrichment never creates a
//! relay, so a lagging secondary source cannot resurrect a retired one.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use sentinel_core::feeds::{ConsensusDoc, RelayDetail, RelayUptime};
use sentinel_core::{Fingerprint, RelayEntity, RelayFlag, UptimeSummary, GRACE_SNAPSHOTS};

/// The canonical relay population, keyed by fingerprint.
#[derive(Default)]
pub struct RelayPopulation {
    relays: HashMap<Fingerprint, RelayEntity>,
    generation: u64,
}

impl RelayPopulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.relays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relays.is_empty()
    }

    pub fn get(&self, fingerprint: &Fingerprint) -> Option<&RelayEntity> {
        self.relays.get(fingerprint)
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelayEntity> {
        self.relays.values()
    }

    /// Apply a primary directory snapshot. Bumps the generation, updates
    /// or creates an entity per detail record, and retires relays that
    /// have been absent for `GRACE_SNAPSHOTS` consecutive snapshots.
    pub fn apply_details(&mut self, details: &[RelayDetail]) {
        self.generation += 1;
        let generation = self.generation;

        let mut seen: HashSet<Fingerprint> = HashSet::with_capacity(details.len());
        let mut created = 0usize;
        for detail in details {
            seen.insert(detail.fingerprint.clone());
            let entity = self
                .relays
                .entry(detail.fingerprint.clone())
                .or_insert_with(|| {
                    created += 1;
                    RelayEntity::new(detail.fingerprint.clone())
                });

            entity.nickname = detail.nickname.clone();
            entity.contact = detail.contact.clone();
            entity.or_addresses = detail.or_addresses.clone();
            entity.country_code = detail.country.clone();
            entity.as_number = detail.as_number.clone();
            entity.as_name = detail.as_name.clone();
            entity.platform = detail.platform.clone();
            entity.advertised_bandwidth = detail.advertised_bandwidth;
            entity.observed_bandwidth = detail.observed_bandwidth;
            entity.bandwidth_rate = detail.bandwidth_rate;
            entity.flags = detail.flags.clone();
            entity.first_seen = detail.first_seen;
            entity.last_seen = detail.last_seen;
            entity.declared_family = detail.declared_family.clone();
            entity.generation = generation;
            entity.missed_snapshots = 0;
        }

        // Absent relays age toward retirement instead of vanishing
        // immediately; a transiently incomplete snapshot must not churn
        // the population.
        let mut retired: Vec<Fingerprint> = Vec::new();
        for (fingerprint, entity) in self.relays.iter_mut() {
            if seen.contains(fingerprint) {
                continue;
            }
            entity.missed_snapshots += 1;
            if entity.missed_snapshots >= GRACE_SNAPSHOTS {
                retired.push(fingerprint.clone());
            }
        }
        for fingerprint in &retired {
            debug!("Retiring relay {} after {} missed snapshots", fingerprint.short(), GRACE_SNAPSHOTS);
            self.relays.remove(fingerprint);
        }

        info!(
            "Snapshot generation {}: {} relays ({} new, {} retired)",
            generation,
            self.relays.len(),
            created,
            retired.len()
        );
    }

    /// Store freshly resolved family relations on their entities.
    pub fn apply_families(
        &mut self,
        relations: &HashMap<Fingerprint, sentinel_core::FamilyRelation>,
    ) {
        for (fingerprint, relation) in relations {
            if let Some(entity) = self.relays.get_mut(fingerprint) {
                entity.family = relation.clone();
            }
        }
    }

    /// Enrich the population with uptime histories. Unknown fingerprints
    /// are skipped; the feed may lag the primary snapshot in either
    /// direction. Re-applying the same payload is a no-op in effect.
    pub fn apply_uptime(&mut self, histories: &[RelayUptime], fetched_at: DateTime<Utc>) {
        let mut matched = 0usize;
        for history in histories {
            let Some(entity) = self.relays.get_mut(&history.fingerprint) else {
                debug!("Uptime history for unknown relay {}", history.fingerprint.short());
                continue;
            };
            let running_fraction = history
                .series
                .get(RelayFlag::Running.name())
                .and_then(|s| s.mean_fraction())
                .unwrap_or(0.0);
            let flag_fractions = history
                .series
                .iter()
                .filter_map(|(name, series)| {
                    let flag = RelayFlag::parse(name)?;
                    Some((flag, series.mean_fraction()?))
                })
                .collect();
            entity.uptime = Some(UptimeSummary {
                running_fraction,
                flag_fractions,
                fetched_at,
            });
            matched += 1;
        }
        debug!("Uptime enrichment matched {}/{} relays", matched, histories.len());
    }

    /// Enrich the population with consensus weights and IPv6 reachability
    /// confirmations. Unknown fingerprints are skipped.
    pub fn apply_consensus(&mut self, document: &ConsensusDoc) {
        let mut matched = 0usize;
        for relay in &document.relays {
            let Some(entity) = self.relays.get_mut(&relay.fingerprint) else {
                continue;
            };
            entity.consensus_weight = relay.bandwidth;
            // A consensus entry confirms or denies IPv6 only for relays
            // that publish an IPv6 address at all.
            if entity.has_ipv6_address() {
                entity.ipv6_confirmed = Some(relay.ipv6_reachable);
            }
            matched += 1;
        }
        debug!(
            "Consensus enrichment matched {}/{} relays",
            matched,
            document.relays.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::feeds::{ConsensusRelay, UptimeSeries};
    use std::collections::BTreeSet;

    fn fp(c: char) -> Fingerprint {
        Fingerprint::parse(&c.to_string().repeat(40)).unwrap()
    }

    fn detail(c: char, nickname: &str) -> RelayDetail {
        RelayDetail {
            fingerprint: fp(c),
            nickname: nickname.to_string(),
            contact: None,
            or_addresses: vec!["203.0.113.5:9001".to_string()],
            country: Some("de".to_string()),
            as_number: Some("AS3320".to_string()),
            as_name: None,
            platform: Some("Tor 0.4.8.12 on Linux".to_string()),
            advertised_bandwidth: 1_000_000,
            observed_bandwidth: 900_000,
            bandwidth_rate: 1_200_000,
            flags: BTreeSet::new(),
            declared_family: Vec::new(),
            first_seen: None,
            last_seen: None,
        }
    }

    #[test]
    fn test_details_create_and_update() {
        let mut pop = RelayPopulation::new();
        pop.apply_details(&[detail('A', "alpha"), detail('B', "beta")]);
        assert_eq!(pop.len(), 2);
        assert_eq!(pop.generation(), 1);
        assert_eq!(pop.get(&fp('A')).unwrap().nickname, "alpha");

        let mut renamed = detail('A', "alpha-renamed");
        renamed.observed_bandwidth = 42;
        pop.apply_details(&[renamed, detail('B', "beta")]);
        assert_eq!(pop.len(), 2);
        assert_eq!(pop.generation(), 2);
        let a = pop.get(&fp('A')).unwrap();
        assert_eq!(a.nickname, "alpha-renamed");
        assert_eq!(a.observed_bandwidth, 42);
        assert_eq!(a.generation, 2);
    }

    #[test]
    fn test_absent_relay_survives_grace_then_retires() {
        let mut pop = RelayPopulation::new();
        pop.apply_details(&[detail('A', "alpha"), detail('B', "beta")]);

        // Absent for GRACE_SNAPSHOTS - 1 snapshots: still present.
        for i in 1..GRACE_SNAPSHOTS {
            pop.apply_details(&[detail('B', "beta")]);
            assert_eq!(pop.get(&fp('A')).unwrap().missed_snapshots, i);
        }

        // One more absence retires it.
        pop.apply_details(&[detail('B', "beta")]);
        assert!(pop.get(&fp('A')).is_none());
        assert_eq!(pop.len(), 1);
    }

    #[test]
    fn test_reappearance_resets_miss_counter() {
        let mut pop = RelayPopulation::new();
        pop.apply_details(&[detail('A', "alpha")]);
        pop.apply_details(&[]);
        assert_eq!(pop.get(&fp('A')).unwrap().missed_snapshots, 1);

        pop.apply_details(&[detail('A', "alpha")]);
        assert_eq!(pop.get(&fp('A')).unwrap().missed_snapshots, 0);
    }

    #[test]
    fn test_uptime_enrichment_skips_unknown() {
        let mut pop = RelayPopulation::new();
        pop.apply_details(&[detail('A', "alpha")]);

        let series = UptimeSeries {
            first: Utc::now() - chrono::Duration::days(30),
            last: Utc::now(),
            interval: 3_600,
            factor: 0.001,
            values: vec![Some(999); 10],
        };
        let histories = vec![
            RelayUptime {
                fingerprint: fp('A'),
                series: [("Running".to_string(), series.clone())].into_iter().collect(),
            },
            RelayUptime {
                fingerprint: fp('F'),
                series: [("Running".to_string(), series)].into_iter().collect(),
            },
        ];
        let fetched_at = Utc::now();
        pop.apply_uptime(&histories, fetched_at);

        let uptime = pop.get(&fp('A')).unwrap().uptime.as_ref().unwrap();
        assert!((uptime.running_fraction - 0.999).abs() < 1e-9);
        assert_eq!(uptime.fetched_at, fetched_at);
        assert!(pop.get(&fp('F')).is_none());
        assert_eq!(pop.len(), 1);
    }

    #[test]
    fn test_uptime_enrichment_is_idempotent() {
        let mut pop = RelayPopulation::new();
        pop.apply_details(&[detail('A', "alpha")]);
        let histories = vec![RelayUptime {
            fingerprint: fp('A'),
            series: [(
                "Running".to_string(),
                UptimeSeries {
                    first: Utc::now() - chrono::Duration::days(7),
                    last: Utc::now(),
                    interval: 3_600,
                    factor: 0.001,
                    values: vec![Some(500)],
                },
            )]
            .into_iter()
            .collect(),
        }];
        let fetched_at = Utc::now();
        pop.apply_uptime(&histories, fetched_at);
        let first = pop.get(&fp('A')).unwrap().uptime.clone().unwrap();
        pop.apply_uptime(&histories, fetched_at);
        let second = pop.get(&fp('A')).unwrap().uptime.clone().unwrap();
        assert_eq!(first.running_fraction, second.running_fraction);
        assert_eq!(first.fetched_at, second.fetched_at);
    }

    #[test]
    fn test_consensus_enrichment() {
        let mut pop = RelayPopulation::new();
        let mut with_v6 = detail('A', "alpha");
        with_v6.or_addresses.push("[2001:db8::5]:9001".to_string());
        pop.apply_details(&[with_v6, detail('B', "beta")]);

        let doc = ConsensusDoc {
            valid_after: Utc::now(),
            fresh_until: Utc::now(),
            valid_until: Utc::now(),
            method: 28,
            authorities: Vec::new(),
            relays: vec![
                ConsensusRelay {
                    nickname: "alpha".to_string(),
                    fingerprint: fp('A'),
                    flags: BTreeSet::new(),
                    bandwidth: 7_700,
                    ipv6_reachable: true,
                },
                ConsensusRelay {
                    nickname: "beta".to_string(),
                    fingerprint: fp('B'),
                    flags: BTreeSet::new(),
                    bandwidth: 120,
                    ipv6_reachable: false,
                },
            ],
        };
        pop.apply_consensus(&doc);

        let a = pop.get(&fp('A')).unwrap();
        assert_eq!(a.consensus_weight, 7_700);
        assert_eq!(a.ipv6_confirmed, Some(true));

        // No published IPv6 address means the consensus bit is not a
        // confirmation either way.
        let b = pop.get(&fp('B')).unwrap();
        assert_eq!(b.consensus_weight, 120);
        assert_eq!(b.ipv6_confirmed, None);
    }
}
