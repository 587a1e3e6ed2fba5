//! Common interface for source adapters

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use sentinel_core::{SourceId, SourcePayload};

use crate::FetchError;

/// One external feed: knows its endpoint, cadence, budget, and how to
/// turn one fetch into a typed payload.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Which source this adapter serves
    fn source(&self) -> SourceId;

    /// Endpoint the adapter fetches from
    fn endpoint(&self) -> &str;

    /// Re-fetch cadence for this source
    fn interval(&self) -> Duration;

    /// Hard per-fetch timeout; an attempt past this is abandoned
    fn timeout(&self) -> Duration;

    /// Fetch and parse one document. Fails closed: connectivity problems
    /// and shape mismatches are both errors, never partial payloads.
    async fn fetch(&self, client: &Client) -> Result<SourcePayload, FetchError>;
}
