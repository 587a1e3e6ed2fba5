//! Cache/state store
//!
//! One entry per source holding the latest `SourceRecord` behind an
//! atomically swapped pointer. Writes are single-writer-per-key (each
//! coordinator task owns exactly one source); readers always see a
//! complete, previously committed record. Failed refreshes fall back to
//! the last good payload instead of discarding it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{debug, warn};

use sentinel_core::{SourceId, SourcePayload, SourceRecord, SourceStatus};

/// Shared per-source cache. Cheap to clone; all clones see the same map.
#[derive(Clone, Default)]
pub struct SourceStore {
    records: Arc<DashMap<SourceId, Arc<SourceRecord>>>,
}

impl SourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Commit a successful fetch. Returns false (and changes nothing)
    /// when a newer fetch has already been applied for this source.
    pub fn apply_success(
        &self,
        payload: SourcePayload,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> bool {
        let source = payload.source();
        if self.is_outdated(source, started_at) {
            warn!(
                "Discarding out-of-order result for {} (started {})",
                source.name(),
                started_at
            );
            return false;
        }
        let attempt = self.next_attempt(source);
        // Build the record fully, then swap it in; readers never observe
        // a partially updated entry.
        let record = SourceRecord {
            source,
            payload: Some(payload),
            fetched_at: Some(Utc::now()),
            started_at,
            duration,
            status: SourceStatus::Ready,
            error_detail: None,
            attempt,
        };
        self.records.insert(source, Arc::new(record));
        debug!("Source {} ready (attempt {})", source.name(), attempt);
        true
    }

    /// Commit a failed fetch: keep the previous payload (if any) and
    /// flip the status to stale, or error when nothing was ever fetched.
    pub fn apply_failure(
        &self,
        source: SourceId,
        error: String,
        started_at: DateTime<Utc>,
        duration: Duration,
    ) -> bool {
        if self.is_outdated(source, started_at) {
            return false;
        }
        let attempt = self.next_attempt(source);
        let previous = self.records.get(&source).map(|r| Arc::clone(r.value()));
        let (payload, fetched_at, status) = match previous.as_deref() {
            Some(prev) if prev.payload.is_some() => {
                (prev.payload.clone(), prev.fetched_at, SourceStatus::Stale)
            }
            _ => (None, None, SourceStatus::Error),
        };
        let record = SourceRecord {
            source,
            payload,
            fetched_at,
            started_at,
            duration,
            status,
            error_detail: Some(error),
            attempt,
        };
        self.records.insert(source, Arc::new(record));
        true
    }

    fn is_outdated(&self, source: SourceId, started_at: DateTime<Utc>) -> bool {
        self.records
            .get(&source)
            .map(|r| started_at < r.started_at)
            .unwrap_or(false)
    }

    fn next_attempt(&self, source: SourceId) -> u64 {
        self.records.get(&source).map(|r| r.attempt + 1).unwrap_or(1)
    }

    pub fn get(&self, source: SourceId) -> Option<Arc<SourceRecord>> {
        self.records.get(&source).map(|r| Arc::clone(r.value()))
    }

    /// Point-in-time copy of every source's current record.
    pub fn snapshot(&self) -> HashMap<SourceId, Arc<SourceRecord>> {
        self.records
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect()
    }

    /// Sources that have reported at least once.
    pub fn reported(&self) -> Vec<SourceId> {
        let mut sources: Vec<SourceId> =
            self.records.iter().map(|entry| *entry.key()).collect();
        sources.sort();
        sources
    }
}
