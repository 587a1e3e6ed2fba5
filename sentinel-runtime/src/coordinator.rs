//! Multi-source coordinator
//!
//! Owns one long-lived task per source adapter. Tasks fetch on their own
//! cadence with a hard per-fetch timeout, write results through the
//! source store, and broadcast source-updated events. A slow or failing
//! source never blocks the others, and the coordinator itself never
//! fails: every source failure degrades to last-good-cache.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use parking_lot::Mutex;
use rand::Rng;
use reqwest::Client;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sentinel_core::SourceId;
use sentinel_sources::{create_client, FetchConfig, SourceAdapter};

use crate::SourceStore;

/// Broadcast whenever a source task commits a record.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Updated { source: SourceId },
    Failed { source: SourceId, error: String },
}

impl SourceEvent {
    pub fn source(&self) -> SourceId {
        match self {
            Self::Updated { source } | Self::Failed { source, .. } => *source,
        }
    }
}

/// Coordinator configuration
pub struct CoordinatorConfig {
    pub fetch: FetchConfig,
    /// Event channel capacity; lagging subscribers drop oldest events
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            fetch: FetchConfig::default(),
            event_capacity: 64,
        }
    }
}

pub struct Coordinator {
    store: SourceStore,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    client: Client,
    events: broadcast::Sender<SourceEvent>,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Coordinator {
    pub fn new(
        config: CoordinatorConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
    ) -> Result<Self, anyhow::Error> {
        let client = create_client(&config.fetch)?;
        let (events, _) = broadcast::channel(config.event_capacity);
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self {
            store: SourceStore::new(),
            adapters,
            client,
            events,
            shutdown_tx,
            started: AtomicBool::new(false),
            tasks: Mutex::new(Vec::new()),
        })
    }

    pub fn store(&self) -> SourceStore {
        self.store.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SourceEvent> {
        self.events.subscribe()
    }

    /// Spawn all source tasks. Idempotent: a second call is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            debug!("Coordinator already started");
            return;
        }
        let mut tasks = self.tasks.lock();
        for adapter in &self.adapters {
            let handle = tokio::spawn(run_source_loop(
                Arc::clone(adapter),
                self.client.clone(),
                self.store.clone(),
                self.events.clone(),
                self.shutdown_tx.subscribe(),
            ));
            tasks.push(handle);
        }
        info!("Coordinator started {} source tasks", tasks.len());
    }

    /// Non-blocking view of every source's current record.
    pub fn snapshot(&self) -> std::collections::HashMap<SourceId, Arc<sentinel_core::SourceRecord>> {
        self.store.snapshot()
    }

    /// Wait until every source has reported at least once, or the
    /// deadline passes. Returns the sources that have reported.
    pub async fn await_quiescence(&self, deadline: Duration) -> Vec<SourceId> {
        let expected: Vec<SourceId> = self.adapters.iter().map(|a| a.source()).collect();
        // Subscribe before checking so no event slips between the check
        // and the wait.
        let mut events = self.events.subscribe();

        let all_reported = |store: &SourceStore| {
            let reported = store.reported();
            expected.iter().all(|s| reported.contains(s))
        };

        let wait = async {
            while !all_reported(&self.store) {
                match events.recv().await {
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        };

        if tokio::time::timeout(deadline, wait).await.is_err() {
            warn!(
                "Quiescence deadline passed with {}/{} sources reported",
                self.store.reported().len(),
                expected.len()
            );
        }
        self.store.reported()
    }

    /// Stop all source tasks.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut tasks = self.tasks.lock();
        for task in tasks.drain(..) {
            task.abort();
        }
        info!("Coordinator stopped");
    }
}

/// The fetch loop for one source.
async fn run_source_loop(
    adapter: Arc<dyn SourceAdapter>,
    client: Client,
    store: SourceStore,
    events: broadcast::Sender<SourceEvent>,
    mut shutdown: watch::Receiver<bool>,
) {
    let source = adapter.source();
    debug!("Source task for {} starting", source.name());

    loop {
        fetch_once(adapter.as_ref(), &client, &store, &events).await;

        // Small jitter keeps independently configured sources from
        // synchronizing their fetches.
        let jitter = rand::thread_rng().gen_range(0..=adapter.interval().as_secs() / 10);
        let sleep = adapter.interval() + Duration::from_secs(jitter);

        tokio::select! {
            _ = tokio::time::sleep(sleep) => {}
            _ = shutdown.changed() => {
                debug!("Source task for {} shutting down", source.name());
                break;
            }
        }
    }
}

/// One fetch attempt: hard timeout, then commit through the store.
async fn fetch_once(
    adapter: &dyn SourceAdapter,
    client: &Client,
    store: &SourceStore,
    events: &broadcast::Sender<SourceEvent>,
) {
    let source = adapter.source();
    let started_at = Utc::now();
    let clock = std::time::Instant::now();

    // On expiry the in-flight future is dropped, not awaited.
    let result = tokio::time::timeout(adapter.timeout(), adapter.fetch(client)).await;
    let duration = clock.elapsed();

    let event = match result {
        Ok(Ok(payload)) => {
            if store.apply_success(payload, started_at, duration) {
                info!(
                    "Source {} updated in {:.1}s",
                    source.name(),
                    duration.as_secs_f64()
                );
                Some(SourceEvent::Updated { source })
            } else {
                None
            }
        }
        Ok(Err(e)) => {
            if e.is_parse() {
                warn!("Source {} returned unparseable data: {}", source.name(), e);
            } else {
                warn!("Source {} fetch failed: {}", source.name(), e);
            }
            let error = e.to_string();
            store.apply_failure(source, error.clone(), started_at, duration);
            Some(SourceEvent::Failed { source, error })
        }
        Err(_) => {
            let error = format!("timeout after {} s", adapter.timeout().as_secs());
            warn!("Source {} {}", source.name(), error);
            store.apply_failure(source, error.clone(), started_at, duration);
            Some(SourceEvent::Failed { source, error })
        }
    };

    if let Some(event) = event {
        // Send only fails when nobody subscribes, which is fine.
        let _ = events.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sentinel_core::{SourcePayload, SourceStatus};
    use sentinel_sources::FetchError;

    /// Adapter that always succeeds instantly with an empty payload.
    struct InstantAdapter(SourceId);

    #[async_trait]
    impl SourceAdapter for InstantAdapter {
        fn source(&self) -> SourceId {
            self.0
        }
        fn endpoint(&self) -> &str {
            "test://instant"
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(3600)
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn fetch(&self, _client: &Client) -> Result<SourcePayload, FetchError> {
            Ok(match self.0 {
                SourceId::Proofs => SourcePayload::Proofs { proofs: Vec::new() },
                _ => SourcePayload::Details { relays: Vec::new() },
            })
        }
    }

    /// Adapter that hangs far past its own timeout.
    struct HangingAdapter;

    #[async_trait]
    impl SourceAdapter for HangingAdapter {
        fn source(&self) -> SourceId {
            SourceId::Consensus
        }
        fn endpoint(&self) -> &str {
            "test://hang"
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(3600)
        }
        fn timeout(&self) -> Duration {
            Duration::from_millis(50)
        }
        async fn fetch(&self, _client: &Client) -> Result<SourcePayload, FetchError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            unreachable!("fetch should have been abandoned")
        }
    }

    /// Adapter that always fails with a network-style error.
    struct FailingAdapter;

    #[async_trait]
    impl SourceAdapter for FailingAdapter {
        fn source(&self) -> SourceId {
            SourceId::Uptime
        }
        fn endpoint(&self) -> &str {
            "test://fail"
        }
        fn interval(&self) -> Duration {
            Duration::from_secs(3600)
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(5)
        }
        async fn fetch(&self, _client: &Client) -> Result<SourcePayload, FetchError> {
            Err(FetchError::Status(503))
        }
    }

    fn coordinator(adapters: Vec<Arc<dyn SourceAdapter>>) -> Coordinator {
        Coordinator::new(CoordinatorConfig::default(), adapters).unwrap()
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let c = coordinator(vec![Arc::new(InstantAdapter(SourceId::Details))]);
        c.start();
        c.start();
        assert_eq!(c.tasks.lock().len(), 1);
        c.shutdown();
    }

    #[tokio::test]
    async fn test_quiescence_with_fast_sources() {
        let c = coordinator(vec![
            Arc::new(InstantAdapter(SourceId::Details)),
            Arc::new(InstantAdapter(SourceId::Proofs)),
        ]);
        c.start();
        let reported = c.await_quiescence(Duration::from_secs(5)).await;
        assert!(reported.contains(&SourceId::Details));
        assert!(reported.contains(&SourceId::Proofs));
        c.shutdown();
    }

    #[tokio::test]
    async fn test_slow_source_does_not_block_others() {
        let c = coordinator(vec![
            Arc::new(InstantAdapter(SourceId::Details)),
            Arc::new(HangingAdapter),
        ]);
        c.start();
        let reported = c.await_quiescence(Duration::from_secs(5)).await;
        // Both reported: the hanging one via its timeout path.
        assert!(reported.contains(&SourceId::Details));
        assert!(reported.contains(&SourceId::Consensus));

        let record = c.store().get(SourceId::Consensus).unwrap();
        assert_eq!(record.status, SourceStatus::Error);
        assert!(record.error_detail.as_deref().unwrap().starts_with("timeout"));
        c.shutdown();
    }

    #[tokio::test]
    async fn test_failed_source_emits_event() {
        let c = coordinator(vec![Arc::new(FailingAdapter)]);
        let mut events = c.subscribe();
        c.start();
        match tokio::time::timeout(Duration::from_secs(5), events.recv()).await {
            Ok(Ok(SourceEvent::Failed { source, error })) => {
                assert_eq!(source, SourceId::Uptime);
                assert!(error.contains("503"));
            }
            other => panic!("expected failure event, got {other:?}"),
        }
        c.shutdown();
    }

    #[tokio::test]
    async fn test_quiescence_deadline_passes_with_no_sources_reporting() {
        // A coordinator that was never started reports nothing.
        let c = coordinator(vec![Arc::new(InstantAdapter(SourceId::Details))]);
        let reported = c.await_quiescence(Duration::from_millis(50)).await;
        assert!(reported.is_empty());
    }
}
