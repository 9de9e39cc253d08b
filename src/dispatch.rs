//! Dispatch & failover controller (C5).
//!
//! Chooses a destination per flushed batch based on observed health and
//! per-record size, feeds failures back through the retry scheduler, and
//! applies the exhaustion policy in §4.5 when a retry chain runs out of
//! budget.

use crate::client::{PrimaryClient, SecondaryClient};
use crate::health::{probe_primary, probe_secondary, HealthFlag};
use crate::primary::write_to_primary;
use crate::retry::{next_backoff, RetriesLeft, RetryAttempt, RetryDestination, RetryScheduler};
use crate::secondary::write_to_secondary;
use crate::types::{BackoffPolicy, Event};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Everything the controller needs to route and retry a batch, shared
/// across the background tasks it spawns.
pub struct Dispatcher {
    primary_client: Arc<dyn PrimaryClient>,
    secondary_client: Option<Arc<dyn SecondaryClient>>,
    primary_health: Arc<HealthFlag>,
    secondary_health: Arc<HealthFlag>,
    backoff: BackoffPolicy,
    sqs_max_bytes: usize,
    startup_check_interval: Duration,
    scheduler: RetryScheduler,
}

impl Dispatcher {
    pub fn new(
        primary_client: Arc<dyn PrimaryClient>,
        secondary_client: Option<Arc<dyn SecondaryClient>>,
        primary_health: Arc<HealthFlag>,
        secondary_health: Arc<HealthFlag>,
        backoff: BackoffPolicy,
        sqs_max_bytes: usize,
        startup_check_interval: Duration,
    ) -> Self {
        Self {
            primary_client,
            secondary_client,
            primary_health,
            secondary_health,
            backoff,
            sqs_max_bytes,
            startup_check_interval,
            scheduler: RetryScheduler::new(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.primary_health.is_healthy()
            || (self.secondary_client.is_some() && self.secondary_health.is_healthy())
    }

    /// Dispatch one freshly flushed batch per the decision table in §4.5.
    pub async fn dispatch(self: &Arc<Self>, batch: Vec<Event>) {
        if batch.is_empty() {
            return;
        }

        match &self.secondary_client {
            None => {
                // Only path available, healthy or not.
                self.send_to_primary(batch, RetriesLeft::Bounded(self.backoff.max_retries), Duration::ZERO)
                    .await;
            }
            Some(_) if self.primary_health.is_healthy() => {
                self.send_to_primary(batch, RetriesLeft::Bounded(self.backoff.max_retries), Duration::ZERO)
                    .await;
            }
            Some(_) => {
                let (small, large): (Vec<Event>, Vec<Event>) = batch
                    .into_iter()
                    .partition(|e| e.size() <= self.sqs_max_bytes);

                if !small.is_empty() {
                    self.send_to_secondary(small, RetriesLeft::Bounded(self.backoff.max_retries), Duration::ZERO)
                        .await;
                }
                if !large.is_empty() {
                    // Oversized records wait on primary indefinitely rather
                    // than being dropped (§4.5 rationale); seeded at
                    // max_backoff like the exhaustion path's unbounded
                    // chain, since both are the same "wait on primary
                    // forever" retry lineage (scenario 5, §8).
                    self.send_to_primary(large, RetriesLeft::Unbounded, self.backoff.max_backoff)
                        .await;
                }
            }
        }
    }

    async fn send_to_primary(self: &Arc<Self>, batch: Vec<Event>, retries_left: RetriesLeft, current_delay: Duration) {
        let result = write_to_primary(&self.primary_client, batch).await;
        let failures = result.failures();

        if failures.is_empty() {
            self.primary_health.mark_healthy();
            return;
        }

        self.handle_primary_failures(failures, retries_left, current_delay).await;
    }

    async fn send_to_secondary(self: &Arc<Self>, batch: Vec<Event>, retries_left: RetriesLeft, current_delay: Duration) {
        let Some(client) = self.secondary_client.clone() else {
            // Caller only routes here when a secondary is configured.
            return;
        };
        let failures = write_to_secondary(&client, batch, self.sqs_max_bytes).await;

        if failures.is_empty() {
            self.secondary_health.mark_healthy();
            return;
        }

        self.handle_secondary_failures(failures, retries_left, current_delay).await;
    }

    async fn handle_primary_failures(
        self: &Arc<Self>,
        failures: Vec<Event>,
        retries_left: RetriesLeft,
        current_delay: Duration,
    ) {
        if let Some(next) = retries_left.decrement() {
            let delay = next_backoff(&self.backoff, current_delay);
            warn!(count = failures.len(), delay_ms = delay.as_millis() as u64, "primary batch partially failed, scheduling retry");
            self.schedule_retry(RetryDestination::Primary, failures, next, delay);
            return;
        }

        // Exhaustion policy (§4.5).
        info!(count = failures.len(), "primary retries exhausted");
        if self.secondary_client.is_some() {
            let (small, large): (Vec<Event>, Vec<Event>) =
                failures.into_iter().partition(|e| e.size() <= self.sqs_max_bytes);

            if self.primary_health.flip_unhealthy_and_claim_prober() {
                self.start_primary_prober();
            }

            if !small.is_empty() {
                self.schedule_retry(
                    RetryDestination::Secondary,
                    small,
                    RetriesLeft::Bounded(self.backoff.max_retries),
                    self.backoff.min_backoff,
                );
            }
            if !large.is_empty() {
                self.schedule_retry(
                    RetryDestination::Primary,
                    large,
                    RetriesLeft::Unbounded,
                    self.backoff.max_backoff,
                );
            }
        } else {
            self.primary_health.flip_unhealthy_and_claim_prober();
            // No secondary configured: primary is the only path available,
            // so no prober-required branch above applies; still start one
            // so the flag can recover.
            self.start_primary_prober();
            self.schedule_retry(
                RetryDestination::Primary,
                failures,
                RetriesLeft::Bounded(self.backoff.max_retries),
                self.backoff.max_backoff,
            );
        }
    }

    async fn handle_secondary_failures(
        self: &Arc<Self>,
        failures: Vec<Event>,
        retries_left: RetriesLeft,
        current_delay: Duration,
    ) {
        if let Some(next) = retries_left.decrement() {
            let delay = next_backoff(&self.backoff, current_delay);
            warn!(count = failures.len(), delay_ms = delay.as_millis() as u64, "secondary batch partially failed, scheduling retry");
            self.schedule_retry(RetryDestination::Secondary, failures, next, delay);
            return;
        }

        info!(count = failures.len(), "secondary retries exhausted, failing over to primary");
        if self.secondary_health.flip_unhealthy_and_claim_prober() {
            self.start_secondary_prober();
        }

        self.schedule_retry(
            RetryDestination::Primary,
            failures,
            RetriesLeft::Bounded(self.backoff.max_retries),
            self.backoff.min_backoff,
        );
    }

    /// `delay` is both how long the scheduler waits before this attempt
    /// runs, and (once it runs) the `d` fed back into the adaptive backoff
    /// formula if that attempt itself partially fails (§4.6).
    fn schedule_retry(
        self: &Arc<Self>,
        destination: RetryDestination,
        events: Vec<Event>,
        retries_left: RetriesLeft,
        delay: Duration,
    ) {
        let dispatcher = self.clone();
        self.scheduler.schedule(
            RetryAttempt {
                destination,
                events,
                retries_left,
                delay,
            },
            move |attempt| async move {
                let delay = attempt.delay;
                match attempt.destination {
                    RetryDestination::Primary => {
                        dispatcher.retry_primary(attempt.events, attempt.retries_left, delay).await
                    }
                    RetryDestination::Secondary => {
                        dispatcher.retry_secondary(attempt.events, attempt.retries_left, delay).await
                    }
                }
            },
        );
    }

    async fn retry_primary(self: Arc<Self>, events: Vec<Event>, retries_left: RetriesLeft, current_delay: Duration) {
        self.send_to_primary(events, retries_left, current_delay).await;
    }

    async fn retry_secondary(self: Arc<Self>, events: Vec<Event>, retries_left: RetriesLeft, current_delay: Duration) {
        self.send_to_secondary(events, retries_left, current_delay).await;
    }

    fn start_primary_prober(self: &Arc<Self>) {
        let flag = self.primary_health.clone();
        let client = self.primary_client.clone();
        let interval = self.startup_check_interval;
        tokio::spawn(probe_primary(flag, client, interval));
    }

    fn start_secondary_prober(self: &Arc<Self>) {
        if let Some(client) = self.secondary_client.clone() {
            let flag = self.secondary_health.clone();
            let interval = self.startup_check_interval;
            tokio::spawn(probe_secondary(flag, client, interval));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{PrimaryEntry, PrimaryResponse, SecondaryEntry, SecondaryResponse};
    use crate::types::RecordOutcome;
    use async_trait::async_trait;
    use bytes::Bytes;
    use parking_lot::Mutex;
    use std::collections::HashSet;

    struct ScriptedPrimary {
        /// Keys that should fail on the *next* call; consumed after use.
        fail_keys: Mutex<HashSet<String>>,
        calls: Mutex<usize>,
    }

    #[async_trait]
    impl PrimaryClient for ScriptedPrimary {
        async fn put_records(&self, entries: Vec<PrimaryEntry>) -> Result<PrimaryResponse, String> {
            *self.calls.lock() += 1;
            let fail_keys = self.fail_keys.lock();
            let outcomes = entries
                .iter()
                .map(|e| {
                    if fail_keys.contains(&e.partition_key) {
                        RecordOutcome::failure("ProvisionedThroughputExceededException", "slow down")
                    } else {
                        RecordOutcome::success()
                    }
                })
                .collect();
            Ok(PrimaryResponse { outcomes })
        }

        async fn describe_stream(&self) -> Result<String, String> {
            Ok("ACTIVE".to_string())
        }
    }

    struct AcceptingSecondary;

    #[async_trait]
    impl SecondaryClient for AcceptingSecondary {
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

    fn backoff() -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_millis(5), Duration::from_millis(20), 2)
    }

    fn ev(key: &str, size: usize) -> Event {
        Event::new(Bytes::from(vec![0u8; size]), key)
    }

    #[tokio::test]
    async fn healthy_primary_with_secondary_present_routes_to_primary() {
        let primary: Arc<dyn PrimaryClient> = Arc::new(ScriptedPrimary {
            fail_keys: Mutex::new(HashSet::new()),
            calls: Mutex::new(0),
        });
        let secondary: Arc<dyn SecondaryClient> = Arc::new(AcceptingSecondary);
        let dispatcher = Arc::new(Dispatcher::new(
            primary,
            Some(secondary),
            Arc::new(HealthFlag::new(true)),
            Arc::new(HealthFlag::new(true)),
            backoff(),
            1000,
            Duration::from_millis(5),
        ));

        dispatcher.dispatch(vec![ev("a", 10), ev("b", 10)]).await;
        assert!(dispatcher.is_healthy());
    }

    #[tokio::test]
    async fn unhealthy_primary_with_secondary_splits_by_size() {
        let primary: Arc<dyn PrimaryClient> = Arc::new(ScriptedPrimary {
            fail_keys: Mutex::new(HashSet::new()),
            calls: Mutex::new(0),
        });
        let secondary: Arc<dyn SecondaryClient> = Arc::new(AcceptingSecondary);
        let dispatcher = Arc::new(Dispatcher::new(
            primary,
            Some(secondary),
            Arc::new(HealthFlag::new(false)),
            Arc::new(HealthFlag::new(true)),
            backoff(),
            1000,
            Duration::from_millis(5),
        ));

        // small -> secondary (accepted, marks secondary healthy),
        // large -> primary (succeeds, marks primary healthy).
        dispatcher.dispatch(vec![ev("small", 500), ev("large", 1500)]).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(dispatcher.is_healthy());
    }

    #[tokio::test]
    async fn unhealthy_primary_with_no_secondary_still_routes_to_primary() {
        let primary: Arc<dyn PrimaryClient> = Arc::new(ScriptedPrimary {
            fail_keys: Mutex::new(HashSet::new()),
            calls: Mutex::new(0),
        });
        let dispatcher = Arc::new(Dispatcher::new(
            primary,
            None,
            Arc::new(HealthFlag::new(false)),
            Arc::new(HealthFlag::new(false)),
            backoff(),
            1000,
            Duration::from_millis(5),
        ));

        dispatcher.dispatch(vec![ev("only", 10)]).await;
        assert!(dispatcher.is_healthy());
    }

    #[tokio::test]
    async fn no_secondary_configured_ignores_a_stray_healthy_secondary_flag() {
        // `secondary_health` can start out `true` (the builder's default)
        // even when no secondary client is attached. With primary down,
        // readiness must not ride on that unused flag.
        let primary: Arc<dyn PrimaryClient> = Arc::new(ScriptedPrimary {
            fail_keys: Mutex::new(HashSet::from(["down".to_string()])),
            calls: Mutex::new(0),
        });
        let dispatcher = Arc::new(Dispatcher::new(
            primary,
            None,
            Arc::new(HealthFlag::new(false)),
            Arc::new(HealthFlag::new(true)),
            backoff(),
            1000,
            Duration::from_millis(5),
        ));

        assert!(!dispatcher.is_healthy());
    }
}
