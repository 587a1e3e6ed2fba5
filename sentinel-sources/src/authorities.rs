//! Directory authority registry and reachability probes
//!
//! Provides the list of known directory authorities and a concurrent,
//! bounded-timeout probe of each one's status endpoint. One slow or dead
//! authority never delays the others: probes fan out independently and a
//! timed-out probe is abandoned, not awaited.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, warn};

use sentinel_core::{DirectoryAuthority, ProbeOutcome, SourceId, SourcePayload};

use crate::{FetchError, SourceAdapter};

/// Per-probe time budget.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Path probed on each authority's directory port.
const STATUS_PATH: &str = "/tor/keys/authority";

/// The known directory authorities.
pub fn default_authorities() -> Vec<DirectoryAuthority> {
    let entry = |name: &str, address: &str, caps: &[&str]| DirectoryAuthority {
        name: name.to_string(),
        address: address.to_string(),
        capability_flags: caps.iter().map(|c| c.to_string()).collect(),
    };
    vec![
        entry("moria1", "128.31.0.39:9231", &["v3ident"]),
        entry("tor26", "217.196.147.77:80", &["v3ident"]),
        entry("dizum", "45.66.35.11:80", &["v3ident"]),
        entry("gabelmoo", "131.188.40.189:80", &["v3ident"]),
        entry("dannenberg", "193.23.244.244:80", &["v3ident"]),
        entry("maatuska", "171.25.193.9:443", &["v3ident"]),
        entry("longclaw", "199.58.81.140:80", &["v3ident"]),
        entry("bastet", "204.13.164.118:80", &["v3ident"]),
        entry("faravahar", "216.218.219.41:80", &["v3ident"]),
    ]
}

/// Probe one authority's status endpoint.
///
/// Never returns an error: every failure mode is encoded in the outcome
/// so downstream classification sees all authorities every cycle.
pub async fn probe_authority(
    client: &Client,
    authority: &DirectoryAuthority,
    budget: Duration,
) -> ProbeOutcome {
    let url = format!("http://{}{}", authority.address, STATUS_PATH);
    let started = Instant::now();

    let result = tokio::time::timeout(budget, client.get(&url).send()).await;
    let checked_at = Utc::now();

    match result {
        Ok(Ok(response)) => {
            let latency_ms = started.elapsed().as_millis() as u64;
            debug!(
                "Authority {} responded {} in {} ms",
                authority.name,
                response.status(),
                latency_ms
            );
            ProbeOutcome {
                authority: authority.name.clone(),
                response_code: Some(response.status().as_u16()),
                latency_ms: Some(latency_ms),
                timed_out: false,
                error: None,
                checked_at,
            }
        }
        Ok(Err(e)) => {
            warn!("Authority {} unreachable: {}", authority.name, e);
            ProbeOutcome {
                authority: authority.name.clone(),
                response_code: None,
                latency_ms: None,
                timed_out: false,
                error: Some(e.to_string()),
                checked_at,
            }
        }
        Err(_) => {
            warn!(
                "Authority {} timed out after {:?}",
                authority.name, budget
            );
            ProbeOutcome {
                authority: authority.name.clone(),
                response_code: None,
                latency_ms: None,
                timed_out: true,
                error: Some(format!("timeout after {} s", budget.as_secs())),
                checked_at,
            }
        }
    }
}

/// Probe all authorities concurrently.
pub async fn probe_all(
    client: &Client,
    authorities: &[DirectoryAuthority],
    max_concurrent: usize,
) -> Vec<ProbeOutcome> {
    stream::iter(authorities.to_vec())
        .map(|authority| {
            let client = client.clone();
            async move { probe_authority(&client, &authority, PROBE_TIMEOUT).await }
        })
        .buffer_unordered(max_concurrent.max(1))
        .collect()
        .await
}

/// Source adapter wrapping the probe fan-out.
pub struct AuthoritiesAdapter {
    authorities: Vec<DirectoryAuthority>,
    interval: Duration,
    max_concurrent: usize,
}

impl AuthoritiesAdapter {
    pub fn new() -> Self {
        Self {
            authorities: default_authorities(),
            interval: Duration::from_secs(10 * 60),
            max_concurrent: 9,
        }
    }

    pub fn with_authorities(mut self, authorities: Vec<DirectoryAuthority>) -> Self {
        self.authorities = authorities;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn authorities(&self) -> &[DirectoryAuthority] {
        &self.authorities
    }
}

impl Default for AuthoritiesAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for AuthoritiesAdapter {
    fn source(&self) -> SourceId {
        SourceId::Authorities
    }

    fn endpoint(&self) -> &str {
        STATUS_PATH
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn timeout(&self) -> Duration {
        // All probes run concurrently within the same budget, plus slack
        // for connection setup.
        PROBE_TIMEOUT + Duration::from_secs(5)
    }

    async fn fetch(&self, client: &Client) -> Result<SourcePayload, FetchError> {
        let probes = probe_all(client, &self.authorities, self.max_concurrent).await;
        Ok(SourcePayload::Authorities { probes })
    }
}
