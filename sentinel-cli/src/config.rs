//! Optional TOML configuration
//!
//! Everything here is an override: absent keys fall back to the built-in
//! defaults, and CLI flags take precedence over the file.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use sentinel_core::SourceId;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// SOCKS proxy for all fetches
    pub proxy: Option<String>,
    pub details_endpoint: Option<String>,
    pub uptime_endpoint: Option<String>,
    pub consensus_endpoint: Option<String>,
    /// Per-source fetch interval overrides in seconds, keyed by source name
    #[serde(default)]
    pub intervals: HashMap<String, u64>,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let body = fs::read_to_string(path)?;
        Ok(toml::from_str(&body)?)
    }

    pub fn interval(&self, source: SourceId) -> Option<Duration> {
        self.intervals
            .get(source.name())
            .map(|secs| Duration::from_secs(*secs))
    }

    /// Apply a configured interval override to a freshly built adapter.
    pub fn apply_interval<A>(
        &self,
        source: SourceId,
        adapter: A,
        set: impl FnOnce(A, Duration) -> A,
    ) -> A {
        match self.interval(source) {
            Some(interval) => set(adapter, interval),
            None => adapter,
        }
    }
}
