//! Health flags and background liveness probing (C7).

use crate::client::{PrimaryClient, SecondaryClient};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// A destination's observable health, plus the lock guarding the
/// flip-and-launch-prober composite.
///
/// Reads go through the atomic for the hot `is_healthy()` path (§5);
/// writes that also need to decide whether to start a prober take the
/// mutex, so the flip and the spawn happen as one step (double-checked
/// locking, preventing duplicate probers during rapid oscillation, §4.7).
pub struct HealthFlag {
    healthy: AtomicBool,
    prober_lock: Mutex<bool>,
}

impl HealthFlag {
    pub fn new(initially_healthy: bool) -> Self {
        Self {
            healthy: AtomicBool::new(initially_healthy),
            prober_lock: Mutex::new(false),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Mark healthy. Called on any successful destination call (§4.5).
    pub fn mark_healthy(&self) {
        self.healthy.store(true, Ordering::Release);
    }

    /// Flip to unhealthy and, if no prober is already running for this
    /// destination, return `true` so the caller starts exactly one.
    pub fn flip_unhealthy_and_claim_prober(&self) -> bool {
        let mut prober_running = self.prober_lock.lock();
        self.healthy.store(false, Ordering::Release);
        if *prober_running {
            false
        } else {
            *prober_running = true;
            true
        }
    }

    fn release_prober_claim(&self) {
        *self.prober_lock.lock() = false;
    }
}

/// Runs the primary's `DescribeStream` probe loop until the stream reports
/// `"ACTIVE"`, then marks it healthy and releases the prober claim.
pub async fn probe_primary(
    flag: Arc<HealthFlag>,
    client: Arc<dyn PrimaryClient>,
    check_interval: Duration,
) {
    loop {
        match client.describe_stream().await {
            Ok(status) if status == "ACTIVE" => {
                flag.mark_healthy();
                info!("primary recovered, describe_stream reports ACTIVE");
                break;
            }
            Ok(status) => {
                debug!(status = %status, "primary not yet active");
            }
            Err(err) => {
                warn!(error = %err, "primary describe_stream failed, will retry");
            }
        }
        tokio::time::sleep(check_interval).await;
    }
    flag.release_prober_claim();
}

/// Runs the secondary's queue-url probe loop until a lookup succeeds.
pub async fn probe_secondary(
    flag: Arc<HealthFlag>,
    client: Arc<dyn SecondaryClient>,
    check_interval: Duration,
) {
    loop {
        match client.get_queue_url().await {
            Ok(_) => {
                flag.mark_healthy();
                info!("secondary recovered, queue-url lookup succeeded");
                break;
            }
            Err(err) => {
                warn!(error = %err, "secondary queue-url lookup failed, will retry");
            }
        }
        tokio::time::sleep(check_interval).await;
    }
    flag.release_prober_claim();
}
