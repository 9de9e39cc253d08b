//! Producer-facing sink: `store_raw_events`, `is_healthy`, `shutdown` (§6).

use crate::buffer::EventBuffer;
use crate::client::{PrimaryClient, SecondaryClient};
use crate::dispatch::Dispatcher;
use crate::error::SinkBuildError;
use crate::health::{probe_primary, probe_secondary, HealthFlag};
use crate::types::{BackoffPolicy, BufferConfig, Event, SinkConfig};
use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::error;

/// The dual-destination streaming sink.
///
/// Owns the event buffer and both destination client handles; destroyed
/// on [`Sink::shutdown`] after a final flush and a bounded drain of the
/// background tasks it spawned (§3 ownership & lifecycle).
pub struct Sink {
    buffer: Arc<EventBuffer>,
    dispatcher: Arc<Dispatcher>,
    dispatch_loop: JoinHandle<()>,
    periodic_flush: JoinHandle<()>,
}

impl Sink {
    /// Enqueue events under a common partition key. Non-blocking with
    /// respect to network I/O (§5, §6).
    pub fn store_raw_events(&self, events: Vec<Bytes>, key: impl Into<String>) {
        let key = key.into();
        for payload in events {
            self.buffer.store(Event::new(payload, key.clone()));
        }
    }

    /// Used by the collector's readiness probe: `true` iff either
    /// destination is currently considered healthy.
    pub fn is_healthy(&self) -> bool {
        self.dispatcher.is_healthy()
    }

    /// Idempotent drain: a final synchronous flush, then a bounded wait
    /// for in-flight retries and background tasks. Anything not finished
    /// within the bound is dropped without being reported upward (§7
    /// kind 5).
    pub async fn shutdown(self) {
        self.buffer.flush();

        // Stop re-arming the periodic flush and wait for the cancellation
        // to actually land before dropping our own handle: `abort()` only
        // schedules the cancellation, so without this await the periodic
        // task's cloned `Arc<EventBuffer>` can outlive this function,
        // leaving the flush channel's sender alive and the dispatch loop
        // below blocked until the shutdown timeout regardless of whether
        // anything was actually in flight.
        self.periodic_flush.abort();
        let _ = self.periodic_flush.await;
        drop(self.buffer);

        let drain = async {
            let _ = self.dispatch_loop.await;
        };

        if tokio::time::timeout(Duration::from_secs(10), drain)
            .await
            .is_err()
        {
            error!("shutdown timed out after 10s, abandoning in-flight retries");
        }
    }
}

/// Builder for constructing a [`Sink`].
///
/// Following the teacher crate's builder convention, construction is
/// fallible and returns a fully-initialized value or an error — no
/// partially-built sink is ever observable (§7 kind 6, §9 construction
/// race): probers for any destination that starts unhealthy, and the
/// periodic-flush schedule, are installed before `build()` returns.
#[must_use = "builders do nothing unless you call .build()"]
pub struct SinkBuilder {
    config: SinkConfig,
    primary_client: Arc<dyn PrimaryClient>,
    secondary_client: Option<Arc<dyn SecondaryClient>>,
    primary_initially_healthy: bool,
    secondary_initially_healthy: bool,
}

impl SinkBuilder {
    pub fn new(config: SinkConfig, primary_client: Arc<dyn PrimaryClient>) -> Self {
        Self {
            config,
            primary_client,
            secondary_client: None,
            primary_initially_healthy: true,
            secondary_initially_healthy: true,
        }
    }

    /// Attach the secondary queue client. Presence of this call (combined
    /// with `sqs_buffer_name` in the config) enables spill-over.
    pub fn secondary_client(mut self, client: Arc<dyn SecondaryClient>) -> Self {
        self.secondary_client = Some(client);
        self
    }

    /// Seed the primary's initial health, skipping a warm-up prober when
    /// the caller already knows the stream is up.
    pub fn primary_initially_healthy(mut self, healthy: bool) -> Self {
        self.primary_initially_healthy = healthy;
        self
    }

    pub fn secondary_initially_healthy(mut self, healthy: bool) -> Self {
        self.secondary_initially_healthy = healthy;
        self
    }

    pub fn build(self) -> Result<Sink, SinkBuildError> {
        self.config.validate()?;

        let buffer_config: BufferConfig = self.config.buffer;
        let backoff: BackoffPolicy = self.config.backoff_policy;

        let (buffer, mut flush_rx) = EventBuffer::new(buffer_config);

        let primary_health = Arc::new(HealthFlag::new(self.primary_initially_healthy));
        let secondary_health = Arc::new(HealthFlag::new(self.secondary_initially_healthy));

        let secondary_client = if self.config.secondary_enabled() {
            self.secondary_client
        } else {
            None
        };

        let dispatcher = Arc::new(Dispatcher::new(
            self.primary_client.clone(),
            secondary_client.clone(),
            primary_health.clone(),
            secondary_health.clone(),
            backoff,
            self.config.sqs_max_bytes,
            self.config.startup_check_interval,
        ));

        // Install probers before the sink becomes observable if either
        // destination starts out unhealthy (§9 construction race).
        if !self.primary_initially_healthy {
            tokio::spawn(probe_primary(
                primary_health.clone(),
                self.primary_client.clone(),
                self.config.startup_check_interval,
            ));
        }
        if let Some(client) = secondary_client.clone() {
            if !self.secondary_initially_healthy {
                tokio::spawn(probe_secondary(
                    secondary_health.clone(),
                    client,
                    self.config.startup_check_interval,
                ));
            }
        }

        let periodic_flush = tokio::spawn(buffer.clone().run_periodic_flush());

        let dispatch_loop = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move {
                while let Some(batch) = flush_rx.recv().await {
                    dispatcher.dispatch(batch).await;
                }
            })
        };

        Ok(Sink {
            buffer,
            dispatcher,
            dispatch_loop,
            periodic_flush,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PrimaryEntry, PrimaryResponse, SecondaryEntry, SecondaryResponse};
    use crate::types::RecordOutcome;
    use async_trait::async_trait;

    struct AlwaysOkPrimary;

    #[async_trait]
    impl PrimaryClient for AlwaysOkPrimary {
        async fn put_records(&self, entries: Vec<PrimaryEntry>) -> Result<PrimaryResponse, String> {
            Ok(PrimaryResponse {
                outcomes: entries.iter().map(|_| RecordOutcome::success()).collect(),
            })
        }

        async fn describe_stream(&self) -> Result<String, String> {
            Ok("ACTIVE".to_string())
        }
    }

    struct AlwaysOkSecondary;

    #[async_trait]
    impl SecondaryClient for AlwaysOkSecondary {
        async fn send_message_batch(
            &self,
            _entries: Vec<SecondaryEntry>,
        ) -> Result<SecondaryResponse, String> {
            Ok(SecondaryResponse { failed: Vec::new() })
        }

        async fn get_queue_url(&self) -> Result<String, String> {
            Ok("https://sqs.example/q".to_string())
        }
    }

    fn test_config() -> SinkConfig {
        SinkConfig {
            stream_name: "my-stream".to_string(),
            region: "us-east-1".to_string(),
            custom_endpoint: None,
            max_bytes: 1_000_000,
            buffer: BufferConfig::new(3, 10_000, Duration::from_millis(50)),
            backoff_policy: BackoffPolicy::new(Duration::from_millis(5), Duration::from_millis(20), 2),
            startup_check_interval: Duration::from_millis(10),
            sqs_max_bytes: 256 * 1024,
            sqs_buffer_name: Some("spillover".to_string()),
        }
    }

    #[tokio::test]
    async fn store_and_shutdown_is_healthy_throughout() {
        let sink = SinkBuilder::new(test_config(), Arc::new(AlwaysOkPrimary))
            .secondary_client(Arc::new(AlwaysOkSecondary))
            .build()
            .expect("build succeeds");

        assert!(sink.is_healthy());
        sink.store_raw_events(vec![Bytes::from_static(b"one")], "k1");
        sink.store_raw_events(vec![Bytes::from_static(b"two")], "k2");
        sink.shutdown().await;
    }

    #[test]
    fn rejects_invalid_buffer_config() {
        let mut config = test_config();
        config.buffer.record_limit = 0;
        let err = SinkBuilder::new(config, Arc::new(AlwaysOkPrimary)).build();
        assert!(err.is_err());
    }

    #[test]
    fn rejects_invalid_backoff_policy() {
        let mut config = test_config();
        config.backoff_policy.min_backoff = Duration::from_secs(10);
        config.backoff_policy.max_backoff = Duration::from_secs(1);
        let err = SinkBuilder::new(config, Arc::new(AlwaysOkPrimary)).build();
        assert!(err.is_err());
    }
}
