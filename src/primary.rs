//! Primary stream writer (C3).

use crate::client::{PrimaryClient, PrimaryEntry};
use crate::types::{Event, RecordOutcome};
use std::sync::Arc;

/// One batch submitted to the primary and the per-record outcomes aligned
/// by index to the submitted events.
pub struct PrimaryWriteResult {
    pub outcomes: Vec<(Event, RecordOutcome)>,
}

impl PrimaryWriteResult {
    pub fn failures(self) -> Vec<Event> {
        self.outcomes
            .into_iter()
            .filter(|(_, outcome)| outcome.is_failure())
            .map(|(event, _)| event)
            .collect()
    }
}

/// Submit a batch to the primary stream as a single `PutRecords`-shaped
/// call, building one entry per event with `partition_key = event.key`.
///
/// A total call failure (transport error, throttling at the request
/// level) is treated as every record in the batch failing with that
/// error's message (§7 kind 2).
pub async fn write_to_primary(
    client: &Arc<dyn PrimaryClient>,
    batch: Vec<Event>,
) -> PrimaryWriteResult {
    let entries = batch
        .iter()
        .map(|e| PrimaryEntry {
            partition_key: e.key.clone(),
            data: e.payload.to_vec(),
        })
        .collect();

    match client.put_records(entries).await {
        Ok(response) => {
            let outcomes = batch.into_iter().zip(response.outcomes).collect();
            PrimaryWriteResult { outcomes }
        }
        Err(message) => {
            let outcomes = batch
                .into_iter()
                .map(|e| (e, RecordOutcome::failure("CallFailed", message.clone())))
                .collect();
            PrimaryWriteResult { outcomes }
        }
    }
}
