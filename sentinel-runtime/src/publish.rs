//! Snapshot publisher boundary
//!
//! Downstream consumers read whole published record sets; they never see
//! a half-written cycle. The JSON publisher writes to a scratch file and
//! renames it into place, so `latest.json` always holds a complete
//! document.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, info};

use crate::RecordSet;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("snapshot serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("snapshot write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Outbound boundary for completed record sets.
#[async_trait]
pub trait SnapshotPublisher: Send + Sync {
    async fn publish(&self, records: &RecordSet) -> Result<(), PublishError>;
}

/// Writes each record set as a generation-numbered JSON document plus a
/// `latest.json` pointer file.
pub struct JsonPublisher {
    directory: PathBuf,
}

impl JsonPublisher {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    async fn write_atomic(&self, path: &Path, body: &[u8]) -> Result<(), PublishError> {
        let scratch = path.with_extension("json.tmp");
        tokio::fs::write(&scratch, body).await?;
        tokio::fs::rename(&scratch, path).await?;
        debug!("Published {}", path.display());
        Ok(())
    }
}

#[async_trait]
impl SnapshotPublisher for JsonPublisher {
    async fn publish(&self, records: &RecordSet) -> Result<(), PublishError> {
        tokio::fs::create_dir_all(&self.directory).await?;
        let body = serde_json::to_vec_pretty(records)?;

        let numbered = self
            .directory
            .join(format!("snapshot-{:06}.json", records.generation));
        self.write_atomic(&numbered, &body).await?;
        self.write_atomic(&self.directory.join("latest.json"), &body)
            .await?;

        info!(
            "Published generation {} ({} relays, {} alerts)",
            records.generation,
            records.relays.len(),
            records.alerts.len()
        );
        Ok(())
    }
}
