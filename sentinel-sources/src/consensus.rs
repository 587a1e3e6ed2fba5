//! Consensus / authority-vote document adapter
//!
//! The slowest feed: a line-oriented text document carrying the validity
//! window, consensus method, per-authority vote lines with eligibility
//! thresholds, and per-relay status entries (r/a/s/w lines).

use std::collections::BTreeSet;
use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use regex::Regex;
use reqwest::Client;
use tracing::debug;

use sentinel_core::feeds::{AuthorityVote, ConsensusDoc, ConsensusRelay, FlagThresholds};
use sentinel_core::{Fingerprint, RelayFlag, SourceId, SourcePayload};

use crate::{fetch_text, FetchError, SourceAdapter};

pub struct ConsensusAdapter {
    endpoint: String,
    interval: Duration,
    timeout: Duration,
}

impl ConsensusAdapter {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            interval: Duration::from_secs(60 * 60),
            // Consensus fetches regularly run for many minutes.
            timeout: Duration::from_secs(15 * 60),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }
}

#[async_trait]
impl SourceAdapter for ConsensusAdapter {
    fn source(&self) -> SourceId {
        SourceId::Consensus
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
        let document = parse_consensus(&body)?;
        debug!(
            "Consensus: {} relays, {} authorities, method {}",
            document.relays.len(),
            document.authorities.len(),
            document.method
        );
        Ok(SourcePayload::Consensus { document })
    }
}

fn threshold_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"([a-z-]+)=([0-9.]+)%?").unwrap())
}

/// Parse a consensus-equivalent text document.
pub fn parse_consensus(body: &str) -> Result<ConsensusDoc, FetchError> {
    let mut valid_after = None;
    let mut fresh_until = None;
    let mut valid_until = None;
    let mut method = None;
    let mut authorities: Vec<AuthorityVote> = Vec::new();
    let mut relays: Vec<ConsensusRelay> = Vec::new();
    let mut current: Option<ConsensusRelay> = None;

    for line in body.lines() {
        let line = line.trim_end();
        let (keyword, rest) = match line.split_once(' ') {
            Some((k, r)) => (k, r),
            None => (line, ""),
        };

        match keyword {
            "valid-after" => valid_after = Some(parse_timestamp(rest)?),
            "fresh-until" => fresh_until = Some(parse_timestamp(rest)?),
            "valid-until" => valid_until = Some(parse_timestamp(rest)?),
            "consensus-method" => {
                method = Some(
                    rest.parse::<u32>()
                        .map_err(|e| FetchError::Parse(format!("bad method: {e}")))?,
                )
            }
            "dir-source" => {
                let mut parts = rest.split_whitespace();
                let name = parts
                    .next()
                    .ok_or_else(|| FetchError::Parse("dir-source missing name".into()))?;
                let address = parts.next().unwrap_or_default();
                authorities.push(AuthorityVote {
                    name: name.to_string(),
                    address: address.to_string(),
                    thresholds: None,
                });
            }
            "flag-thresholds" => {
                // Attaches to the most recent dir-source line.
                let thresholds = parse_thresholds(rest);
                match authorities.last_mut() {
                    Some(authority) => authority.thresholds = Some(thresholds),
                    None => {
                        return Err(FetchError::Parse(
                            "flag-thresholds before any dir-source".into(),
                        ))
                    }
                }
            }
            "r" => {
                if let Some(relay) = current.take() {
                    relays.push(relay);
                }
                let mut parts = rest.split_whitespace();
                let nickname = parts
                    .next()
                    .ok_or_else(|| FetchError::Parse("r line missing nickname".into()))?;
                let fingerprint = parts
                    .next()
                    .ok_or_else(|| FetchError::Parse("r line missing fingerprint".into()))?;
                current = Some(ConsensusRelay {
                    nickname: nickname.to_string(),
                    fingerprint: Fingerprint::parse(fingerprint)
                        .map_err(|e| FetchError::Parse(e.to_string()))?,
                    flags: BTreeSet::new(),
                    bandwidth: 0,
                    ipv6_reachable: false,
                });
            }
            "a" => {
                if let Some(relay) = current.as_mut() {
                    if rest.starts_with('[') {
                        relay.ipv6_reachable = true;
                    }
                }
            }
            "s" => {
                if let Some(relay) = current.as_mut() {
                    relay.flags = rest
                        .split_whitespace()
                        .filter_map(RelayFlag::parse)
                        .collect();
                }
            }
            "w" => {
                if let Some(relay) = current.as_mut() {
                    for token in rest.split_whitespace() {
                        if let Some(value) = token.strip_prefix("Bandwidth=") {
                            relay.bandwidth = value.parse().map_err(|e| {
                                FetchError::Parse(format!("bad bandwidth: {e}"))
                            })?;
                        }
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(relay) = current.take() {
        relays.push(relay);
    }

    Ok(ConsensusDoc {
        valid_after: valid_after
            .ok_or_else(|| FetchError::Parse("missing valid-after".into()))?,
        fresh_until: fresh_until
            .ok_or_else(|| FetchError::Parse("missing fresh-until".into()))?,
        valid_until: valid_until
            .ok_or_else(|| FetchError::Parse("missing valid-until".into()))?,
        method: method.ok_or_else(|| FetchError::Parse("missing consensus-method".into()))?,
        authorities,
        relays,
    })
}

/// Parse a flag-thresholds line's key=value tokens. Unknown keys are
/// ignored so vote format extensions don't break parsing.
fn parse_thresholds(rest: &str) -> FlagThresholds {
    let mut thresholds = FlagThresholds::default();
    for capture in threshold_regex().captures_iter(rest) {
        let key = &capture[1];
        let value = &capture[2];
        match key {
            "stable-uptime" => thresholds.stable_uptime = value.parse().ok(),
            "stable-mtbf" => thresholds.stable_mtbf = value.parse().ok(),
            "fast-speed" => thresholds.fast_speed = value.parse().ok(),
            "guard-wfu" => {
                // Published as a percentage, stored as a fraction.
                thresholds.guard_wfu = value.parse::<f64>().ok().map(|p| p / 100.0)
            }
            "guard-tk" => thresholds.guard_tk = value.parse().ok(),
            "guard-bw-inc-exits" => thresholds.guard_bw_inc_exits = value.parse().ok(),
            _ => {}
        }
    }
    thresholds
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FetchError> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y-%m-%d %H:%M:%S")
        .map(|naive| naive.and_utc())
        .map_err(|e| FetchError::Parse(format!("bad timestamp {raw:?}: {e}")))
}
