// src/sink/file.rs
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use super::Sink;
use crate::error::Error;
use crate::record::Batch;

/// Writes one JSON file per batch under a date-partitioned directory tree:
/// `<base>/year=YYYY/month=MM/day=DD/<uuid>.json`.
#[derive(Debug, Default)]
pub struct FileSink {
    base_dir: PathBuf,
}

#[async_trait]
impl Sink for FileSink {
    async fn init(&mut self) -> Result<(), Error> {
        let dir = std::env::var("SINK_FILE_DIRECTORY").map_err(|_| {
            Error::SinkConfig("missing environment variable: SINK_FILE_DIRECTORY".to_string())
        })?;
        let dir = PathBuf::from(dir.trim_end_matches('/'));
        tokio::fs::metadata(&dir)
            .await
            .map_err(|e| Error::SinkConfig(format!("SINK_FILE_DIRECTORY {}: {}", dir.display(), e)))?;
        self.base_dir = dir;
        Ok(())
    }

    async fn put(&self, batch: &Batch) -> Result<(), Error> {
        let now = Utc::now();
        let dir = self
            .base_dir
            .join(now.format("year=%Y/month=%m/day=%d").to_string());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| Error::SinkWrite(format!("could not create {}: {}", dir.display(), e)))?;

        let path = dir.join(format!("{}.json", Uuid::new_v4()));
        let body = serde_json::to_vec(&batch.logs).map_err(|e| Error::SinkWrite(e.to_string()))?;
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| Error::SinkWrite(format!("could not write {}: {}", path.display(), e)))?;

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
        format!("FileDir={}", self.base_dir.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Batch;

    fn empty_batch() -> Batch {
        Batch {
            operator_name: "Test Operator".to_string(),
            log_source_name: "testlog".to_string(),
            start: 0,
            end: 1,
            logs: vec![],
        }
    }

    // Single test so the SINK_FILE_DIRECTORY mutations cannot race each other.
    #[tokio::test]
    async fn test_init_and_put() {
        unsafe { std::env::remove_var("SINK_FILE_DIRECTORY") };
        let mut sink = FileSink::default();
        assert!(matches!(sink.init().await, Err(Error::SinkConfig(_))));

        unsafe { std::env::set_var("SINK_FILE_DIRECTORY", "/definitely/not/a/real/directory") };
        assert!(matches!(sink.init().await, Err(Error::SinkConfig(_))));

        let dir = tempfile::tempdir().unwrap();
        unsafe { std::env::set_var("SINK_FILE_DIRECTORY", dir.path()) };
        sink.init().await.unwrap();
        assert_eq!(sink.describe(), format!("FileDir={}", dir.path().display()));

        sink.put(&empty_batch()).await.unwrap();

        // one partitioned .json file containing the record array
        let mut files = Vec::new();
        let mut stack = vec![dir.path().to_path_buf()];
        while let Some(current) = stack.pop() {
            for entry in std::fs::read_dir(current).unwrap() {
                let path = entry.unwrap().path();
                if path.is_dir() {
                    stack.push(path);
                } else {
                    files.push(path);
                }
            }
        }
        assert_eq!(files.len(), 1);
        let name = files[0].to_string_lossy().to_string();
        assert!(name.contains("year="));
        assert!(name.contains("month="));
        assert!(name.contains("day="));
        assert!(name.ends_with(".json"));

        let body = std::fs::read_to_string(&files[0]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert!(parsed.as_array().unwrap().is_empty());

        unsafe { std::env::remove_var("SINK_FILE_DIRECTORY") };
    }
}
