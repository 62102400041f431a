// src/sink/firehose.rs
use async_trait::async_trait;
use aws_sdk_firehose::primitives::Blob;
use aws_sdk_firehose::types::Record;
use tracing::{debug, error};

use super::Sink;
use crate::error::Error;
use crate::record::Batch;

/// Delivers each batch as one PutRecordBatch call against a Kinesis Firehose
/// delivery stream, one record per log entry.
#[derive(Debug, Default)]
pub struct FirehoseSink {
    client: Option<aws_sdk_firehose::Client>,
    delivery_stream_name: String,
}

#[async_trait]
impl Sink for FirehoseSink {
    async fn init(&mut self) -> Result<(), Error> {
        let delivery_stream_name =
            std::env::var("SINK_FIREHOSE_DELIVERY_STREAM_NAME").map_err(|_| {
                Error::SinkConfig(
                    "missing environment variable: SINK_FIREHOSE_DELIVERY_STREAM_NAME".to_string(),
                )
            })?;

        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_firehose::config::Builder::from(&config);
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            builder = builder.endpoint_url(endpoint);
        }
        let client = aws_sdk_firehose::Client::from_conf(builder.build());

        client
            .describe_delivery_stream()
            .delivery_stream_name(&delivery_stream_name)
            .send()
            .await
            .map_err(|e| {
                Error::SinkAuth(format!(
                    "could not describe delivery stream {}: {}",
                    delivery_stream_name, e
                ))
            })?;

        self.client = Some(client);
        self.delivery_stream_name = delivery_stream_name;
        Ok(())
    }

    async fn put(&self, batch: &Batch) -> Result<(), Error> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::SinkConfig("Firehose sink is not initialized".to_string()))?;

        let mut records = Vec::with_capacity(batch.logs.len());
        for log in &batch.logs {
            let mut data = match serde_json::to_vec(log) {
                Ok(data) => data,
                Err(e) => {
                    error!("could not marshal log entry: {}", e);
                    continue;
                }
            };
            // Firehose concatenates record payloads into one blob; the
            // trailing comma keeps the concatenation decodable as JSON
            // downstream.
            data.push(b',');
            let record = Record::builder()
                .data(Blob::new(data))
                .build()
                .map_err(|e| Error::SinkWrite(e.to_string()))?;
            records.push(record);
        }

        client
            .put_record_batch()
            .delivery_stream_name(&self.delivery_stream_name)
            .set_records(Some(records))
            .send()
            .await
            .map_err(|e| Error::SinkWrite(e.to_string()))?;

        debug!(
            "{}:{} batch=[{}:{}] put to {}",
            batch.operator_name,
            batch.log_source_name,
            batch.start,
            batch.end,
            self.describe()
        );
        Ok(())
    }

    fn describe(&self) -> String {
        format!("Firehose={}", self.delivery_stream_name)
    }
}
