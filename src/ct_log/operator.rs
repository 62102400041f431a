// src/ct_log/operator.rs
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::stream::{LogStream, StreamConfig};
use crate::catalog;
use crate::record::Batch;

/// Buffered hand-off between one stream and its forwarder.
const STREAM_CHANNEL_CAPACITY: usize = 25;

/// Owns every tailed log of one catalog operator and fans their batches into
/// the shared pipeline channel.
pub struct LogOperator {
    name: String,
    streams: Vec<LogStream>,
}

impl LogOperator {
    /// Build a stream for every log of `operator` whose status is in
    /// `statuses`. Logs whose client cannot be constructed are skipped with a
    /// diagnostic.
    pub fn new(
        operator: &catalog::Operator,
        statuses: &[catalog::LogStatus],
        config: &StreamConfig,
    ) -> Self {
        let mut streams = Vec::new();
        for log in &operator.logs {
            if !statuses.contains(&log.status()) {
                continue;
            }
            match LogStream::new(&log.url, &operator.name, log.public_key_der(), config.clone()) {
                Ok(stream) => streams.push(stream),
                Err(e) => error!("error log-source={}: {:#}", log.url, e),
            }
        }
        Self {
            name: operator.name.clone(),
            streams,
        }
    }

    /// Assemble an operator from pre-built streams.
    pub fn from_streams(name: &str, streams: Vec<LogStream>) -> Self {
        Self {
            name: name.to_string(),
            streams,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stream_count(&self) -> usize {
        self.streams.len()
    }

    /// Run every stream with a private channel and a fixed forwarder task
    /// into the shared channel. Returns once all streams and forwarders have
    /// drained. The shared channel stays open; the pipeline owns closing it.
    pub async fn run(self, token: CancellationToken, to_sink: async_channel::Sender<Batch>) {
        if self.streams.is_empty() {
            info!("Operator=[{}] 0 streams", self.name);
            return;
        }
        info!("Operator=[{}] {} streams", self.name, self.streams.len());

        let mut tasks = JoinSet::new();
        for stream in self.streams {
            let (tx, mut rx) = mpsc::channel::<Batch>(STREAM_CHANNEL_CAPACITY);
            tasks.spawn(stream.run(token.clone(), tx));

            let to_sink = to_sink.clone();
            tasks.spawn(async move {
                // Keeps draining after cancellation so batches the stream
                // already emitted still reach the shared channel.
                while let Some(batch) = rx.recv().await {
                    if to_sink.send(batch).await.is_err() {
                        return;
                    }
                }
            });
        }

        while tasks.join_next().await.is_some() {}
    }
}
