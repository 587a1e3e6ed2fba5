//! Proof-of-ownership (domain validation) adapter
//!
//! Operators may claim a domain in their contact line
//! (`url:example.org proof:uri-rsa`). The proof document published under
//! the domain's well-known path (or a DNS-TXT-equivalent endpoint) must
//! list the operator's relay fingerprints; a claim validates only when
//! every claimed fingerprint appears in the fetched document.

use std::sync::OnceLock;

use parking_lot::RwLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use regex::Regex;
use reqwest::Client;
use tracing::{debug, warn};

use sentinel_core::feeds::{OperatorProof, ProofKind, RelayDetail};
use sentinel_core::{Fingerprint, SourceId, SourcePayload};

use crate::{fetch_text, FetchError, SourceAdapter};

/// Per-domain fetch budget. Claim checks fan out concurrently, so one
/// dead or stalled operator domain costs at most this much wall time.
pub const CLAIM_TIMEOUT: Duration = Duration::from_secs(20);

/// Concurrent claim checks in flight at once.
const MAX_CONCURRENT_CLAIMS: usize = 8;

/// One operator's domain claim, extracted from relay contact lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProofClaim {
    pub domain: String,
    pub kind: ProofKind,
    /// Fingerprints of the relays carrying this claim
    pub fingerprints: Vec<Fingerprint>,
}

fn claim_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"url:(?:https?://)?([a-z0-9.-]+)\b.*?proof:(uri-rsa|dns-rsa)").unwrap()
    })
}

fn fingerprint_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Fa-f0-9]{40}\b").unwrap())
}

/// Extract a domain claim from one contact line, if it carries one.
pub fn extract_claim(contact: &str) -> Option<(String, ProofKind)> {
    let captures = claim_regex().captures(contact)?;
    let domain = captures[1].to_string();
    let kind = match &captures[2] {
        "dns-rsa" => ProofKind::DnsTxt,
        _ => ProofKind::WellKnownUri,
    };
    Some((domain, kind))
}

/// Group domain claims across a details snapshot, one claim per domain.
pub fn claims_from_details(relays: &[RelayDetail]) -> Vec<ProofClaim> {
    let mut by_domain: Vec<ProofClaim> = Vec::new();
    for relay in relays {
        let contact = match &relay.contact {
            Some(c) => c,
            None => continue,
        };
        if let Some((domain, kind)) = extract_claim(contact) {
            match by_domain.iter_mut().find(|c| c.domain == domain) {
                Some(claim) => claim.fingerprints.push(relay.fingerprint.clone()),
                None => by_domain.push(ProofClaim {
                    domain,
                    kind,
                    fingerprints: vec![relay.fingerprint.clone()],
                }),
            }
        }
    }
    by_domain
}

/// Scan a proof document body for relay fingerprints.
pub fn parse_proof_body(body: &str) -> Vec<Fingerprint> {
    fingerprint_regex()
        .find_iter(body)
        .filter_map(|m| Fingerprint::parse(m.as_str()).ok())
        .collect()
}

pub struct ProofAdapter {
    /// Claims refresh when the primary snapshot changes, so they live
    /// behind a lock rather than being fixed at construction.
    claims: RwLock<Vec<ProofClaim>>,
    interval: Duration,
    timeout: Duration,
}

impl ProofAdapter {
    pub fn new(claims: Vec<ProofClaim>) -> Self {
        Self {
            claims: RwLock::new(claims),
            interval: Duration::from_secs(6 * 60 * 60),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Replace the claim set; the next fetch picks it up.
    pub fn set_claims(&self, claims: Vec<ProofClaim>) {
        *self.claims.write() = claims;
    }
}

fn proof_url(claim: &ProofClaim) -> String {
    match claim.kind {
        ProofKind::WellKnownUri => format!(
            "https://{}/.well-known/tor-relay/rsa-fingerprint.txt",
            claim.domain
        ),
        // DNS-TXT-equivalent checks go through a resolver endpoint
        // that serves the record as plain text.
        ProofKind::DnsTxt => format!(
            "https://dns.google/resolve?name={}&type=TXT",
            claim.domain
        ),
    }
}

/// Check one domain claim within its own time budget.
///
/// Never returns an error: a failed or timed-out fetch yields an
/// unvalidated proof so every claimed domain appears in the payload.
pub async fn check_claim(client: &Client, claim: &ProofClaim, budget: Duration) -> OperatorProof {
    let url = proof_url(claim);
    let checked_at = Utc::now();

    let found = match tokio::time::timeout(budget, fetch_text(client, &url)).await {
        Ok(Ok(body)) => parse_proof_body(&body),
        Ok(Err(e)) => {
            warn!("Proof fetch for {} failed: {}", claim.domain, e);
            Vec::new()
        }
        Err(_) => {
            warn!(
                "Proof fetch for {} timed out after {} s",
                claim.domain,
                budget.as_secs()
            );
            Vec::new()
        }
    };

    let validated = !claim.fingerprints.is_empty()
        && claim.fingerprints.iter().all(|fp| found.contains(fp));
    debug!(
        "Proof {} ({:?}): {} fingerprints found, validated={}",
        claim.domain,
        claim.kind,
        found.len(),
        validated
    );

    OperatorProof {
        domain: claim.domain.clone(),
        kind: claim.kind,
        fingerprints: found,
        validated,
        checked_at,
    }
}

/// Check all claims concurrently. One stalled domain holds its own slot
/// until its budget expires; the rest keep moving.
pub async fn check_claims(
    client: &Client,
    claims: &[ProofClaim],
    max_concurrent: usize,
    budget: Duration,
) -> Vec<OperatorProof> {
    let mut proofs: Vec<OperatorProof> = stream::iter(claims.to_vec())
        .map(|claim| {
            let client = client.clone();
            async move { check_claim(&client, &claim, budget).await }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await;
    proofs.sort_by(|a, b| a.domain.cmp(&b.domain));
    proofs
}

#[async_trait]
impl SourceAdapter for ProofAdapter {
    fn source(&self) -> SourceId {
        SourceId::Proofs
    }

    fn endpoint(&self) -> &str {
        ".well-known/tor-relay"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, client: &Client) -> Result<SourcePayload, FetchError> {
        let claims = self.claims.read().clone();
        let proofs = check_claims(client, &claims, MAX_CONCURRENT_CLAIMS, CLAIM_TIMEOUT).await;
        Ok(SourcePayload::Proofs { proofs })
    }
}
