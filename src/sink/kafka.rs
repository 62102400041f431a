// src/sink/kafka.rs
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use tracing::{debug, error};

use super::Sink;
use crate::error::Error;
use crate::record::Batch;

/// Publishes each record of a batch as one message to a fixed partition of a
/// Kafka topic.
#[derive(Default)]
pub struct KafkaSink {
    producer: Option<FutureProducer>,
    topic_name: String,
    partition: i32,
}

impl std::fmt::Debug for KafkaSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaSink")
            .field("producer", &self.producer.is_some())
            .field("topic_name", &self.topic_name)
            .field("partition", &self.partition)
            .finish()
    }
}

#[async_trait]
impl Sink for KafkaSink {
    async fn init(&mut self) -> Result<(), Error> {
        let topic_name = std::env::var("SINK_KAFKA_TOPIC_NAME").map_err(|_| {
            Error::SinkConfig("missing environment variable: SINK_KAFKA_TOPIC_NAME".to_string())
        })?;
        let endpoint_urls = std::env::var("SINK_KAFKA_ENDPOINT_URL").map_err(|_| {
            Error::SinkConfig("missing environment variable: SINK_KAFKA_ENDPOINT_URL".to_string())
        })?;
        let partition_raw = std::env::var("SINK_KAFKA_PARTITION").map_err(|_| {
            Error::SinkConfig("missing environment variable: SINK_KAFKA_PARTITION".to_string())
        })?;
        let partition: i32 = partition_raw.parse().map_err(|_| {
            Error::SinkConfig(format!(
                "SINK_KAFKA_PARTITION is not an integer: {}",
                partition_raw
            ))
        })?;

        // rdkafka takes the broker list comma-separated, same as the env var
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &endpoint_urls)
            .set("allow.auto.create.topics", "true")
            .create()
            .map_err(|e| Error::SinkAuth(format!("could not create Kafka producer: {}", e)))?;

        self.producer = Some(producer);
        self.topic_name = topic_name;
        self.partition = partition;
        Ok(())
    }

    async fn put(&self, batch: &Batch) -> Result<(), Error> {
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| Error::SinkConfig("Kafka sink is not initialized".to_string()))?;

        for log in &batch.logs {
            let data = match serde_json::to_vec(log) {
                Ok(data) => data,
                Err(e) => {
                    error!("could not marshal log entry: {}", e);
                    continue;
                }
            };
            let record = FutureRecord::<(), _>::to(&self.topic_name)
                .partition(self.partition)
                .payload(&data);
            if let Err((e, _)) = producer
                .send(record, Timeout::After(Duration::from_secs(5)))
                .await
            {
                return Err(Error::SinkWrite(e.to_string()));
            }
        }

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
        format!("Kafka={}-{}", self.topic_name, self.partition)
    }
}
