//! Intelligence engine
//!
//! One `run_cycle` call turns the current source cache into a complete,
//! self-consistent record set: population maintenance, family resolution,
//! eligibility, rarity/diversity, authority health, and alerts. A cycle
//! degrades gracefully on stale or missing secondary sources; only a
//! population that has never been fetched aborts it.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use sentinel_analytics::{
    classify_probes, evaluate_network, evaluate_relay, resolve_families, AlertGenerator,
    AlertInputs, NetworkIndicators, RarityScorer,
};
use sentinel_core::feeds::{ConsensusDoc, OperatorProof};
use sentinel_core::{
    Alert, AuthorityStatus, DirectoryAuthority, DiversityScore, FlagEligibility, RarityScore,
    RelayEntity, RelayFlag, SourceId, SourcePayload, SourceStatus, Verdict,
};
use sentinel_sources::proof::extract_claim;

use crate::{RelayPopulation, SourceStore};

#[derive(Debug, Error)]
pub enum CycleError {
    /// The primary directory source has never produced a payload. With no
    /// population there is nothing to analyze; every other source being
    /// absent merely degrades the cycle.
    #[error("no relay directory data has ever been fetched")]
    NoPrimaryData,
}

/// Everything derived for one relay this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayReport {
    #[serde(flatten)]
    pub entity: RelayEntity,
    pub eligibility: Vec<FlagEligibility>,
    pub rarity: Vec<RarityScore>,
}

/// Everything derived for one operator (distinct contact) this cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatorReport {
    pub contact: String,
    pub relay_count: usize,
    pub diversity: DiversityScore,
    /// Domain validation result, when the contact carries a claim
    pub proof: Option<OperatorProof>,
}

/// Per-source health summary carried in the published snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: SourceId,
    pub status: SourceStatus,
    pub fetched_at: Option<DateTime<Utc>>,
    pub attempt: u64,
    pub error_detail: Option<String>,
}

/// The complete output of one engine cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordSet {
    pub generation: u64,
    pub produced_at: DateTime<Utc>,
    pub relays: Vec<RelayReport>,
    pub operators: Vec<OperatorReport>,
    pub authorities: Vec<AuthorityStatus>,
    pub indicators: NetworkIndicators,
    pub alerts: Vec<Alert>,
    pub sources: Vec<SourceHealth>,
}

/// Cycle-to-cycle engine state: the canonical population, the alert
/// dedup set, and bookkeeping of which payloads were already applied.
pub struct IntelligenceEngine {
    population: RelayPopulation,
    alerts: AlertGenerator,
    registry: Vec<DirectoryAuthority>,
    applied: HashMap<SourceId, DateTime<Utc>>,
}

impl IntelligenceEngine {
    pub fn new(registry: Vec<DirectoryAuthority>) -> Self {
        Self {
            population: RelayPopulation::new(),
            alerts: AlertGenerator::new(),
            registry,
            applied: HashMap::new(),
        }
    }

    pub fn population(&self) -> &RelayPopulation {
        &self.population
    }

    pub fn run_cycle(&mut self, store: &SourceStore) -> Result<RecordSet, CycleError> {
        self.run_cycle_at(store, Utc::now())
    }

    /// Run one full analysis cycle against the cache as of `now`.
    pub fn run_cycle_at(
        &mut self,
        store: &SourceStore,
        now: DateTime<Utc>,
    ) -> Result<RecordSet, CycleError> {
        self.ingest(store, now)?;

        // Family resolution runs over the whole population each cycle.
        let declarations: Vec<_> = self
            .population
            .iter()
            .map(|r| (r.fingerprint.clone(), r.declared_family.clone()))
            .collect();
        let relations = resolve_families(&declarations);
        self.population.apply_families(&relations);

        let consensus = self.payload(store, SourceId::Consensus);
        let consensus_doc: Option<&ConsensusDoc> = match &consensus {
            Some(SourcePayload::Consensus { document }) => Some(document),
            _ => None,
        };

        // Eligibility per relay, tracking the Guard regression fraction
        // for the alert generator as we go.
        let scorer = RarityScorer::build(self.population.iter());
        let mut guard_total = 0usize;
        let mut guard_below = 0usize;
        let mut relays: Vec<RelayReport> = self
            .population
            .iter()
            .map(|relay| {
                let eligibility = evaluate_relay(relay, consensus_doc, now);
                if relay.has_flag(RelayFlag::Guard) {
                    guard_total += 1;
                    let below = eligibility
                        .iter()
                        .any(|e| e.flag == RelayFlag::Guard && e.verdict == Verdict::Below);
                    if below {
                        guard_below += 1;
                    }
                }
                RelayReport {
                    eligibility,
                    rarity: scorer.relay_scores(relay),
                    entity: relay.clone(),
                }
            })
            .collect();
        relays.sort_by(|a, b| a.entity.fingerprint.cmp(&b.entity.fingerprint));
        let guard_below_fraction = if guard_total > 0 {
            guard_below as f64 / guard_total as f64
        } else {
            0.0
        };

        let operators = self.operator_reports(store, &scorer);

        // Authority health and network indicators.
        let probes = self.payload(store, SourceId::Authorities);
        let statuses = match &probes {
            Some(SourcePayload::Authorities { probes }) => {
                classify_probes(probes, &self.registry)
            }
            _ => Vec::new(),
        };
        let indicators = evaluate_network(consensus_doc, &statuses, now);

        let alerts = self.alerts.evaluate(&AlertInputs {
            statuses: &statuses,
            indicators: &indicators,
            guard_below_fraction,
        });

        let sources = source_health(store);
        info!(
            "Cycle complete: generation {}, {} relays, {} operators, {} alerts",
            self.population.generation(),
            relays.len(),
            operators.len(),
            alerts.len()
        );

        Ok(RecordSet {
            generation: self.population.generation(),
            produced_at: now,
            relays,
            operators,
            authorities: statuses,
            indicators,
            alerts,
            sources,
        })
    }

    /// Feed cached payloads into the population, applying each fetched
    /// payload at most once.
    fn ingest(&mut self, store: &SourceStore, now: DateTime<Utc>) -> Result<(), CycleError> {
        let details = store
            .get(SourceId::Details)
            .filter(|r| r.has_payload())
            .ok_or(CycleError::NoPrimaryData)?;
        if details.status != SourceStatus::Ready {
            warn!("Analyzing against a stale relay directory snapshot");
        }
        if self.is_fresh(SourceId::Details, details.fetched_at) {
            if let Some(SourcePayload::Details { relays }) = &details.payload {
                self.population.apply_details(relays);
            }
        } else {
            debug!("Relay directory payload unchanged, keeping population");
        }

        if let Some(record) = store.get(SourceId::Uptime).filter(|r| r.has_payload()) {
            if self.is_fresh(SourceId::Uptime, record.fetched_at) {
                if let Some(SourcePayload::Uptime { relays }) = &record.payload {
                    self.population
                        .apply_uptime(relays, record.fetched_at.unwrap_or(now));
                }
            }
        }

        if let Some(record) = store.get(SourceId::Consensus).filter(|r| r.has_payload()) {
            if self.is_fresh(SourceId::Consensus, record.fetched_at) {
                if let Some(SourcePayload::Consensus { document }) = &record.payload {
                    self.population.apply_consensus(document);
                }
            }
        }
        Ok(())
    }

    /// Whether this fetched_at has not been applied yet; records it if so.
    fn is_fresh(&mut self, source: SourceId, fetched_at: Option<DateTime<Utc>>) -> bool {
        let Some(fetched_at) = fetched_at else {
            return false;
        };
        if self.applied.get(&source) == Some(&fetched_at) {
            return false;
        }
        self.applied.insert(source, fetched_at);
        true
    }

    fn payload(&self, store: &SourceStore, source: SourceId) -> Option<SourcePayload> {
        store.get(source).and_then(|r| r.payload.clone())
    }

    fn operator_reports(
        &self,
        store: &SourceStore,
        scorer: &RarityScorer,
    ) -> Vec<OperatorReport> {
        let proofs: Vec<OperatorProof> = match self.payload(store, SourceId::Proofs) {
            Some(SourcePayload::Proofs { proofs }) => proofs,
            _ => Vec::new(),
        };

        let mut by_contact: HashMap<&str, Vec<&RelayEntity>> = HashMap::new();
        for relay in self.population.iter() {
            if let Some(contact) = relay.contact.as_deref() {
                if !contact.is_empty() {
                    by_contact.entry(contact).or_default().push(relay);
                }
            }
        }

        let mut reports: Vec<OperatorReport> = by_contact
            .into_iter()
            .map(|(contact, relays)| {
                let proof = extract_claim(contact)
                    .and_then(|(domain, _)| proofs.iter().find(|p| p.domain == domain))
                    .cloned();
                OperatorReport {
                    contact: contact.to_string(),
                    relay_count: relays.len(),
                    diversity: scorer.operator_diversity(&relays),
                    proof,
                }
            })
            .collect();
        reports.sort_by(|a, b| a.contact.cmp(&b.contact));
        reports
    }
}

/// Summarize the cache store for the published snapshot.
fn source_health(store: &SourceStore) -> Vec<SourceHealth> {
    let mut sources: Vec<SourceHealth> = store
        .snapshot()
        .into_values()
        .map(|record| SourceHealth {
            source: record.source,
            status: record.status,
            fetched_at: record.fetched_at,
            attempt: record.attempt,
            error_detail: record.error_detail.clone(),
        })
        .collect();
    sources.sort_by_key(|s| s.source);
    sources
}
