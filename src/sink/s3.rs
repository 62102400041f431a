// src/sink/s3.rs
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::Sink;
use crate::error::Error;
use crate::record::Batch;

/// Writes one JSON object per batch to an S3 bucket, optionally laid out in
/// the `year=/month=/day=` partition scheme Athena and Glue expect.
#[derive(Debug, Default)]
pub struct S3Sink {
    client: Option<aws_sdk_s3::Client>,
    bucket_name: String,
    bucket_prefix: String,
    use_date_partitioning: bool,
}

#[async_trait]
impl Sink for S3Sink {
    async fn init(&mut self) -> Result<(), Error> {
        let bucket_name = std::env::var("SINK_S3_BUCKET_NAME").map_err(|_| {
            Error::SinkConfig("missing environment variable: SINK_S3_BUCKET_NAME".to_string())
        })?;
        let bucket_prefix = std::env::var("SINK_S3_BUCKET_PREFIX").map_err(|_| {
            Error::SinkConfig("missing environment variable: SINK_S3_BUCKET_PREFIX".to_string())
        })?;
        if let Ok(raw) = std::env::var("SINK_S3_USE_DATE_PARTITIONING") {
            self.use_date_partitioning = raw.parse::<bool>().map_err(|_| {
                Error::SinkConfig(format!("SINK_S3_USE_DATE_PARTITIONING is not a bool: {}", raw))
            })?;
        }

        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder = aws_sdk_s3::config::Builder::from(&config);
        if let Ok(endpoint) = std::env::var("AWS_ENDPOINT_URL") {
            // localstack-style endpoints need path-style addressing
            builder = builder.endpoint_url(endpoint).force_path_style(true);
        }
        self.client = Some(aws_sdk_s3::Client::from_conf(builder.build()));
        self.bucket_name = bucket_name;
        self.bucket_prefix = bucket_prefix;

        debug!(
            "Sink {} useDatePartitioning={}",
            self.describe(),
            self.use_date_partitioning
        );
        Ok(())
    }

    async fn put(&self, batch: &Batch) -> Result<(), Error> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| Error::SinkConfig("S3 sink is not initialized".to_string()))?;

        let now = Utc::now();
        let filename = format!("{}_{}.json", now.timestamp_micros(), Uuid::new_v4());
        let key = if self.use_date_partitioning {
            format!(
                "{}/{}/{}",
                self.bucket_prefix,
                now.format("year=%Y/month=%m/day=%d"),
                filename
            )
        } else {
            format!("{}/{}", self.bucket_prefix, filename)
        };

        let body = serde_json::to_vec(&batch.logs).map_err(|e| Error::SinkWrite(e.to_string()))?;
        client
            .put_object()
            .bucket(&self.bucket_name)
            .key(&key)
            .body(ByteStream::from(body))
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
        format!("S3://{}/{}", self.bucket_name, self.bucket_prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_init_requires_bucket_config() {
        unsafe {
            std::env::remove_var("SINK_S3_BUCKET_NAME");
            std::env::remove_var("SINK_S3_BUCKET_PREFIX");
        }
        let mut sink = S3Sink::default();
        let err = sink.init().await.unwrap_err();
        assert!(matches!(err, Error::SinkConfig(msg) if msg.contains("SINK_S3_BUCKET_NAME")));
    }
}
