//! Error types for the dual-destination sink.

use thiserror::Error;

/// Fatal errors raised while constructing a [`crate::sink::Sink`].
///
/// No partial sink is ever returned to the caller; construction either
/// fully succeeds or fails with one of these (§7 kind 6).
#[derive(Debug, Error)]
pub enum SinkBuildError {
    #[error("invalid buffer config: {0}")]
    InvalidBufferConfig(String),

    #[error("invalid backoff policy: {0}")]
    InvalidBackoffPolicy(String),

    #[error("failed to construct primary client: {0}")]
    PrimaryClientInit(String),

    #[error("failed to construct secondary client: {0}")]
    SecondaryClientInit(String),
}
