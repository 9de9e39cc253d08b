//! Dual-destination streaming sink with failover and surge protection.
//!
//! Accepts serialized event payloads and durably forwards them to a
//! primary record stream (Kinesis-shaped), spilling over to a secondary
//! queue (SQS-shaped) while the primary is unhealthy. See the module docs
//! on [`sink`] for the producer-facing surface.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use dual_sink::{BackoffPolicy, BufferConfig, SinkBuilder, SinkConfig};
//! use std::sync::Arc;
//! use std::time::Duration;
//! # use dual_sink::{PrimaryClient, PrimaryEntry, PrimaryResponse};
//! # use async_trait::async_trait;
//! # struct MyKinesis;
//! # #[async_trait]
//! # impl PrimaryClient for MyKinesis {
//! #     async fn put_records(&self, _e: Vec<PrimaryEntry>) -> Result<PrimaryResponse, String> { unimplemented!() }
//! #     async fn describe_stream(&self) -> Result<String, String> { unimplemented!() }
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = SinkConfig {
//!     stream_name: "events".into(),
//!     region: "us-east-1".into(),
//!     custom_endpoint: None,
//!     max_bytes: 1_000_000,
//!     buffer: BufferConfig::new(500, 5_000_000, Duration::from_secs(1)),
//!     backoff_policy: BackoffPolicy::new(Duration::from_millis(100), Duration::from_secs(30), 5),
//!     startup_check_interval: Duration::from_secs(5),
//!     sqs_max_bytes: 256 * 1024,
//!     sqs_buffer_name: None,
//! };
//!
//! let sink = SinkBuilder::new(config, Arc::new(MyKinesis)).build()?;
//! sink.store_raw_events(vec![b"hello world".to_vec().into()], "partition-key");
//! assert!(sink.is_healthy());
//! sink.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod client;
mod dispatch;
mod error;
mod health;
mod primary;
mod retry;
mod secondary;
mod sink;
mod splitter;
mod types;

pub use client::{
    PrimaryClient, PrimaryEntry, PrimaryResponse, SecondaryClient, SecondaryEntry,
    SecondaryResponse,
};
pub use error::SinkBuildError;
pub use sink::{Sink, SinkBuilder};
pub use splitter::split;
pub use types::{BackoffPolicy, BufferConfig, Event, RecordOutcome, SinkConfig};
