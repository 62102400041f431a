// src/sink/mod.rs
//! Delivery backends for certificate batches.
//!
//! The pipeline treats sinks as opaque: transport-specific batching, record
//! separators and partitioning are each backend's internal concern.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Error;
use crate::record::Batch;

pub mod file;
pub mod firehose;
pub mod kafka;
pub mod s3;

/// A durable destination for batches.
#[async_trait]
pub trait Sink: Send + Sync + std::fmt::Debug {
    /// Perform any handshake (credential load, stream/topic existence check,
    /// directory stat). Must be idempotent.
    async fn init(&mut self) -> Result<(), Error>;

    /// Deliver every record in the batch as a single logical unit: the sink
    /// may split internally but must either deliver all or report failure.
    async fn put(&self, batch: &Batch) -> Result<(), Error>;

    /// Stable human identifier used in logs.
    fn describe(&self) -> String;
}

/// The sinks selectable from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SinkKind {
    Firehose,
    Kafka,
    File,
    S3,
}

/// Construct and initialize the chosen sink.
pub async fn build(kind: SinkKind) -> Result<Arc<dyn Sink>, Error> {
    match kind {
        SinkKind::File => {
            let mut sink = file::FileSink::default();
            sink.init().await?;
            Ok(Arc::new(sink))
        }
        SinkKind::S3 => {
            let mut sink = s3::S3Sink::default();
            sink.init().await?;
            Ok(Arc::new(sink))
        }
        SinkKind::Firehose => {
            let mut sink = firehose::FirehoseSink::default();
            sink.init().await?;
            Ok(Arc::new(sink))
        }
        SinkKind::Kafka => {
            let mut sink = kafka::KafkaSink::default();
            sink.init().await?;
            Ok(Arc::new(sink))
        }
    }
}
