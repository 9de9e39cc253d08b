//! Secondary queue writer (C4).

use crate::client::{SecondaryClient, SecondaryEntry};
use crate::splitter;
use crate::types::{Event, RecordOutcome};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// SQS caps a single `SendMessageBatch` call at 10 entries.
const SECONDARY_MAX_ENTRIES: usize = 10;

/// Encode and submit a batch to the secondary queue in splitter-produced
/// sub-batches honoring the 10-entry count cap and the secondary's
/// per-message byte cap (§4.4).
///
/// Returns every failed entry across all sub-batches, paired back with its
/// original event.
pub async fn write_to_secondary(
    client: &Arc<dyn SecondaryClient>,
    batch: Vec<Event>,
    max_bytes: usize,
) -> Vec<Event> {
    let sub_batches = splitter::split(batch, Event::size, SECONDARY_MAX_ENTRIES, max_bytes);

    let mut failed = Vec::new();

    for sub_batch in sub_batches {
        let mut by_id: HashMap<String, Event> = HashMap::new();
        let mut entries = Vec::with_capacity(sub_batch.len());

        for event in sub_batch {
            let id = Uuid::new_v4().to_string();
            entries.push(SecondaryEntry {
                id: id.clone(),
                body: STANDARD.encode(&event.payload),
                attributes: vec![("kinesisKey".to_string(), event.key.clone())],
            });
            by_id.insert(id, event);
        }

        match client.send_message_batch(entries).await {
            Ok(response) => {
                for (id, _outcome) in response.failed {
                    if let Some(event) = by_id.remove(&id) {
                        failed.push(event);
                    }
                }
            }
            Err(_message) => {
                // Total call failure: every entry in this sub-batch failed.
                failed.extend(by_id.into_values());
            }
        }
    }

    failed
}

/// Helper for building a [`RecordOutcome`] from a secondary failure code,
/// used by fakes in tests and by real `SecondaryClient` implementations.
pub fn outcome_for(code: impl Into<String>, message: impl Into<String>) -> RecordOutcome {
    RecordOutcome::failure(code, message)
}
