//! Primary relay-directory snapshot adapter
//!
//! Fetches the JSON details document that defines the relay population:
//! identity, addresses, bandwidth, flags, and declared families. This is
//! the fastest feed and the only one allowed to create entities.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use sentinel_core::feeds::RelayDetail;
use sentinel_core::{Fingerprint, RelayFlag, SourceId, SourcePayload};

use crate::{fetch_text, FetchError, SourceAdapter};

/// Wire shape of the details document.
#[derive(Debug, Deserialize)]
struct DetailsDocument {
    relays: Vec<RawRelay>,
}

#[derive(Debug, Deserialize)]
struct RawRelay {
    fingerprint: String,
    nickname: String,
    #[serde(default)]
    contact: Option<String>,
    #[serde(default)]
    or_addresses: Vec<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default, rename = "as")]
    as_number: Option<String>,
    #[serde(default)]
    as_name: Option<String>,
    #[serde(default)]
    platform: Option<String>,
    #[serde(default)]
    advertised_bandwidth: u64,
    #[serde(default)]
    observed_bandwidth: u64,
    #[serde(default)]
    bandwidth_rate: u64,
    #[serde(default)]
    flags: Vec<String>,
    #[serde(default)]
    effective_family: Vec<String>,
    #[serde(default)]
    first_seen: Option<String>,
    #[serde(default)]
    last_seen: Option<String>,
}

pub struct DetailsAdapter {
    endpoint: String,
    interval: Duration,
    timeout: Duration,
}

impl DetailsAdapter {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            interval: Duration::from_secs(30 * 60),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl SourceAdapter for DetailsAdapter {
    fn source(&self) -> SourceId {
        SourceId::Details
    }

    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn fetch(&self, client: &Client) -> Result<SourcePayload, FetchError> {
        let body = fetch_text(client, &self.endpoint).await?;
        let relays = parse_details(&body)?;
        debug!("Details snapshot: {} relays", relays.len());
        Ok(SourcePayload::Details { relays })
    }
}

/// Parse the details JSON body into normalized relay records.
pub fn parse_details(body: &str) -> Result<Vec<RelayDetail>, FetchError> {
    let document: DetailsDocument =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut relays = Vec::with_capacity(document.relays.len());
    for raw in document.relays {
        let fingerprint = Fingerprint::parse(&raw.fingerprint)
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        // Family lists mix $-prefixed fingerprints and bare nicknames;
        // only fingerprints identify relays, nicknames are dropped.
        let declared_family: Vec<Fingerprint> = raw
            .effective_family
            .iter()
            .filter_map(|entry| Fingerprint::parse(entry.trim_start_matches('$')).ok())
            .collect();

        let flags: BTreeSet<RelayFlag> =
            raw.flags.iter().filter_map(|f| RelayFlag::parse(f)).collect();

        relays.push(RelayDetail {
            fingerprint,
            nickname: raw.nickname,
            contact: raw.contact.map(|c| c.trim().to_lowercase()),
            or_addresses: raw.or_addresses,
            country: raw.country,
            as_number: raw.as_number,
            as_name: raw.as_name,
            platform: raw.platform,
            advertised_bandwidth: raw.advertised_bandwidth,
            observed_bandwidth: raw.observed_bandwidth,
            bandwidth_rate: raw.bandwidth_rate,
            flags,
            declared_family,
            first_seen: raw.first_seen.as_deref().and_then(parse_timestamp),
            last_seen: raw.last_seen.as_deref().and_then(parse_timestamp),
        });
    }
    Ok(relays)
}

/// Directory timestamps come as "YYYY-MM-DD HH:MM:SS" in UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "relays": [
            {
                "fingerprint": "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa",
                "nickname": "relayA",
                "contact": "Admin <admin@example.org>",
                "or_addresses": ["203.0.113.5:9001", "[2001:db8::5]:9001"],
                "country": "de",
                "as": "AS24940",
                "as_name": "Hetzner Online GmbH",
                "platform": "Tor 0.4.8 on Linux",
                "advertised_bandwidth": 10485760,
                "observed_bandwidth": 9437184,
                "bandwidth_rate": 12582912,
                "flags": ["Fast", "Guard", "Running", "Stable", "Valid", "Bogus"],
                "effective_family": [
                    "$BBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBBB",
                    "someNickname"
                ],
                "first_seen": "2021-03-14 06:00:00",
                "last_seen": "2026-08-29 12:00:00"
            }
        ]
    }"#;

    #[test]
    fn test_parse_details() {
        let relays = parse_details(SAMPLE).unwrap();
        assert_eq!(relays.len(), 1);

        let relay = &relays[0];
        assert_eq!(relay.fingerprint.as_str(), "A".repeat(40));
        assert_eq!(relay.nickname, "relayA");
        assert_eq!(relay.contact.as_deref(), Some("admin <admin@example.org>"));
        assert_eq!(relay.as_number.as_deref(), Some("AS24940"));
        // Unknown flag names are dropped, known ones kept.
        assert_eq!(relay.flags.len(), 5);
        assert!(relay.flags.contains(&RelayFlag::Guard));
        // Nickname family entries are dropped, fingerprints normalized.
        assert_eq!(relay.declared_family.len(), 1);
        assert_eq!(relay.declared_family[0].as_str(), "B".repeat(40));
        assert!(relay.first_seen.is_some());
    }

    #[test]
    fn test_parse_rejects_malformed_document() {
        assert!(parse_details("{\"not_relays\": []}").is_err());
        assert!(parse_details("not json at all").is_err());
    }

    #[test]
    fn test_parse_rejects_bad_fingerprint() {
        let body = r#"{"relays": [{"fingerprint": "nope", "nickname": "x"}]}"#;
        assert!(parse_details(body).is_err());
    }

    #[test]
    fn test_adapter_identity() {
        let adapter = DetailsAdapter::new("https://directory.example/details");
        assert_eq!(adapter.source(), SourceId::Details);
        assert_eq!(adapter.endpoint(), "https://directory.example/details");
    }
}
