//! Historical-uptime feed adapter
//!
//! Per-relay, per-flag time series keyed by fingerprint. The slow cousin
//! of the details snapshot: its population may lag behind the primary's,
//! which the record builder tolerates per-fingerprint.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use sentinel_core::feeds::{RelayUptime, UptimeSeries};
use sentinel_core::{Fingerprint, SourceId, SourcePayload};

use crate::{fetch_text, FetchError, SourceAdapter};

#[derive(Debug, Deserialize)]
struct UptimeDocument {
    relays: Vec<RawUptime>,
}

#[derive(Debug, Deserialize)]
struct RawUptime {
    fingerprint: String,
    #[serde(default)]
    uptime: HashMap<String, RawSeries>,
}

#[derive(Debug, Deserialize)]
struct RawSeries {
    first: String,
    last: String,
    interval: u64,
    factor: f64,
    values: Vec<Option<u64>>,
}

pub struct UptimeAdapter {
    endpoint: String,
    interval: Duration,
    timeout: Duration,
}

impl UptimeAdapter {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            interval: Duration::from_secs(60 * 60),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl SourceAdapter for UptimeAdapter {
    fn source(&self) -> SourceId {
        SourceId::Uptime
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
        let relays = parse_uptime(&body)?;
        debug!("Uptime feed: {} relays with history", relays.len());
        Ok(SourcePayload::Uptime { relays })
    }
}

/// Parse the uptime JSON body into per-relay series.
pub fn parse_uptime(body: &str) -> Result<Vec<RelayUptime>, FetchError> {
    let document: UptimeDocument =
        serde_json::from_str(body).map_err(|e| FetchError::Parse(e.to_string()))?;

    let mut relays = Vec::with_capacity(document.relays.len());
    for raw in document.relays {
        let fingerprint = Fingerprint::parse(&raw.fingerprint)
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        let mut series = HashMap::with_capacity(raw.uptime.len());
        for (flag_name, raw_series) in raw.uptime {
            let first = parse_timestamp(&raw_series.first)?;
            let last = parse_timestamp(&raw_series.last)?;
            series.insert(
                flag_name,
                UptimeSeries {
                    first,
                    last,
                    interval: raw_series.interval,
                    factor: raw_series.factor,
                    values: raw_series.values,
                },
            );
        }
        relays.push(RelayUptime {
            fingerprint,
            series,
        });
    }
    Ok(relays)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| FetchError::Parse(format!("bad timestamp {raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "relays": [
            {
                "fingerprint": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                "uptime": {
                    "Running": {
                        "first": "2026-07-01 00:00:00",
                        "last": "2026-08-29 00:00:00",
                        "interval": 14400,
                        "factor": 0.001,
                        "values": [999, 999, null, 500]
                    },
                    "Guard": {
                        "first": "2026-07-01 00:00:00",
                        "last": "2026-08-29 00:00:00",
                        "interval": 14400,
                        "factor": 0.001,
                        "values": [800, 900]
                    }
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_uptime() {
        let relays = parse_uptime(SAMPLE).unwrap();
        assert_eq!(relays.len(), 1);

        let running = &relays[0].series["Running"];
        assert_eq!(running.interval, 14_400);
        assert_eq!(running.values.len(), 4);
        assert_eq!(running.values[2], None);
        let mean = running.mean_fraction().unwrap();
        assert!((mean - 0.8326).abs() < 0.001);

        assert!(relays[0].series.contains_key("Guard"));
    }

    #[test]
    fn test_parse_rejects_bad_timestamp() {
        let body = r#"{
            "relays": [{
                "fingerprint": "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
                "uptime": {
                    "Running": {
                        "first": "yesterday",
                        "last": "2026-08-29 00:00:00",
                        "interval": 14400,
                        "factor": 0.001,
                        "values": []
                    }
                }
            }]
        }"#;
        assert!(parse_uptime(body).is_err());
    }

    #[test]
    fn test_adapter_identity() {
        let adapter = UptimeAdapter::new("https://directory.example/uptime");
        assert_eq!(adapter.source(), SourceId::Uptime);
    }
}
