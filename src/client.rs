//! Injected cloud-client primitives (§6 wire-level contracts).
//!
//! The sink never talks to a concrete SDK directly — it is built against
//! these two traits, which the host application implements over whatever
//! Kinesis-like / SQS-like client it already has. Implementations are
//! assumed `Send + Sync` and safely shared across the background tasks
//! that drive dispatch, retry, and health probing (§5).

use crate::types::RecordOutcome;
use async_trait::async_trait;

/// One entry submitted to the primary stream.
#[derive(Clone, Debug)]
pub struct PrimaryEntry {
    pub partition_key: String,
    pub data: Vec<u8>,
}

/// Result of a `put_records`-shaped call: one outcome per submitted entry,
/// aligned by index.
#[derive(Clone, Debug)]
pub struct PrimaryResponse {
    pub outcomes: Vec<RecordOutcome>,
}

/// One entry submitted to the secondary queue (already split to respect
/// the 10-entry batch cap and the per-message byte cap — see
/// [`crate::secondary`]).
#[derive(Clone, Debug)]
pub struct SecondaryEntry {
    pub id: String,
    pub body: String,
    pub attributes: Vec<(String, String)>,
}

/// Result of a `send_message_batch`-shaped call: ids of the entries that
/// failed, with their error classification.
#[derive(Clone, Debug)]
pub struct SecondaryResponse {
    pub failed: Vec<(String, RecordOutcome)>,
}

/// The Kinesis-shaped primary record stream.
#[async_trait]
pub trait PrimaryClient: Send + Sync {
    /// Submit one batch as a single `PutRecords`-shaped call.
    async fn put_records(&self, entries: Vec<PrimaryEntry>) -> Result<PrimaryResponse, String>;

    /// Lightweight liveness check. Returns the provider's status string;
    /// the prober treats `"ACTIVE"` as ready (§4.7).
    async fn describe_stream(&self) -> Result<String, String>;
}

/// The SQS-shaped secondary queue.
#[async_trait]
pub trait SecondaryClient: Send + Sync {
    /// Submit at most 10 entries as a single `SendMessageBatch`-shaped
    /// call.
    async fn send_message_batch(
        &self,
        entries: Vec<SecondaryEntry>,
    ) -> Result<SecondaryResponse, String>;

    /// Succeeds iff the queue exists; used by the prober (§4.7).
    async fn get_queue_url(&self) -> Result<String, String>;
}
