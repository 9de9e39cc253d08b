//! Core types for the dual-destination sink.

use bytes::Bytes;
use std::time::Duration;

/// An immutable event accepted from the collector front-end.
///
/// `payload` is opaque to the sink; `key` is used by the primary as its
/// partition key and is carried through to the secondary as the
/// `kinesisKey` message attribute when a record spills over.
#[derive(Clone, Debug)]
pub struct Event {
    pub payload: Bytes,
    pub key: String,
}

impl Event {
    pub fn new(payload: impl Into<Bytes>, key: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            key: key.into(),
        }
    }

    pub fn size(&self) -> usize {
        self.payload.len()
    }
}

/// Size of a batch is the sum of its events' payload lengths.
pub fn batch_size(events: &[Event]) -> usize {
    events.iter().map(Event::size).sum()
}

/// Buffer thresholds that trigger a flush.
///
/// Invariants: `record_limit >= 1`, `byte_limit >= max_single_event_bytes`,
/// `time_limit > Duration::ZERO`.
#[derive(Clone, Copy, Debug)]
pub struct BufferConfig {
    pub record_limit: usize,
    pub byte_limit: usize,
    pub time_limit: Duration,
}

impl BufferConfig {
    pub fn new(record_limit: usize, byte_limit: usize, time_limit: Duration) -> Self {
        Self {
            record_limit,
            byte_limit,
            time_limit,
        }
    }

    /// Validate the invariants in §3 against the configured per-event cap.
    pub fn validate(
        &self,
        max_single_event_bytes: usize,
    ) -> Result<(), crate::error::SinkBuildError> {
        if self.record_limit < 1 {
            return Err(crate::error::SinkBuildError::InvalidBufferConfig(
                "record_limit must be >= 1".into(),
            ));
        }
        if self.byte_limit < max_single_event_bytes {
            return Err(crate::error::SinkBuildError::InvalidBufferConfig(format!(
                "byte_limit ({}) must be >= max_single_event_bytes ({})",
                self.byte_limit, max_single_event_bytes
            )));
        }
        if self.time_limit <= Duration::ZERO {
            return Err(crate::error::SinkBuildError::InvalidBufferConfig(
                "time_limit must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Randomized, adaptive retry backoff.
///
/// Invariant: `0 < min_backoff <= max_backoff`.
#[derive(Clone, Copy, Debug)]
pub struct BackoffPolicy {
    pub min_backoff: Duration,
    pub max_backoff: Duration,
    pub max_retries: u32,
}

impl BackoffPolicy {
    pub fn new(min_backoff: Duration, max_backoff: Duration, max_retries: u32) -> Self {
        Self {
            min_backoff,
            max_backoff,
            max_retries,
        }
    }

    pub fn validate(&self) -> Result<(), crate::error::SinkBuildError> {
        if self.min_backoff <= Duration::ZERO || self.min_backoff > self.max_backoff {
            return Err(crate::error::SinkBuildError::InvalidBackoffPolicy(format!(
                "require 0 < min_backoff ({:?}) <= max_backoff ({:?})",
                self.min_backoff, self.max_backoff
            )));
        }
        Ok(())
    }
}

/// Outcome of one submitted record/entry.
///
/// A record failed iff `error_code` is `Some`.
#[derive(Clone, Debug)]
pub struct RecordOutcome {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

impl RecordOutcome {
    pub fn success() -> Self {
        Self {
            error_code: None,
            error_message: None,
        }
    }

    pub fn failure(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    pub fn is_failure(&self) -> bool {
        self.error_code.is_some()
    }
}

/// Top-level sink configuration, mirroring the option list the collector
/// front-end is expected to supply (parsing that configuration format is
/// out of scope here; this is only the validated, in-memory shape).
#[derive(Clone, Debug)]
pub struct SinkConfig {
    pub stream_name: String,
    pub region: String,
    pub custom_endpoint: Option<String>,
    pub max_bytes: usize,
    pub buffer: BufferConfig,
    pub backoff_policy: BackoffPolicy,
    pub startup_check_interval: Duration,
    pub sqs_max_bytes: usize,
    pub sqs_buffer_name: Option<String>,
}

impl SinkConfig {
    pub fn validate(&self) -> Result<(), crate::error::SinkBuildError> {
        self.buffer.validate(self.max_bytes)?;
        self.backoff_policy.validate()?;
        if self.startup_check_interval <= Duration::ZERO {
            return Err(crate::error::SinkBuildError::InvalidBufferConfig(
                "startup_check_interval must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn secondary_enabled(&self) -> bool {
        self.sqs_buffer_name.is_some()
    }
}
