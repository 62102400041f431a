// src/ct_log/client.rs
use std::time::Duration;

use anyhow::Context;
use tracing::{debug, warn};

use super::types::{GetEntriesResponse, RawLogEntry, SignedTreeHead};
use crate::error::Error;

const USER_AGENT: &str = concat!("ct-relay/", env!("CARGO_PKG_VERSION"));

/// HTTP client for the Certificate Transparency log RFC 6962 API
pub struct CtLogClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl CtLogClient {
    /// Create a new CT log client for one endpoint
    pub fn new(base_url: String) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(30))
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .user_agent(USER_AGENT)
            .gzip(true)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }

    /// Get Signed Tree Head (current log size and timestamp)
    /// Endpoint: GET {base_url}/ct/v1/get-sth
    pub async fn get_sth(&self) -> Result<SignedTreeHead, Error> {
        let url = format!("{}/ct/v1/get-sth", self.base_url);

        debug!("Fetching STH from {}", url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(Error::SthFetch)?
            .error_for_status()
            .map_err(Error::SthFetch)?;

        let sth: SignedTreeHead = response.json().await.map_err(Error::SthFetch)?;

        debug!(
            "STH received from {}: tree_size={}, timestamp={}",
            self.base_url, sth.tree_size, sth.timestamp
        );

        Ok(sth)
    }

    /// Get entries from the log, inclusive on both ends. The log may return
    /// fewer entries than requested; callers advance by the count returned.
    /// Endpoint: GET {base_url}/ct/v1/get-entries?start={start}&end={end}
    pub async fn get_entries(&self, start: u64, end: u64) -> Result<Vec<RawLogEntry>, Error> {
        let url = format!(
            "{}/ct/v1/get-entries?start={}&end={}",
            self.base_url, start, end
        );

        debug!("Fetching entries {}-{} from {}", start, end, self.base_url);

        let response = self
            .http_client
            .get(&url)
            .send()
            .await
            .map_err(Error::EntryFetch)?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            warn!("Rate limited by CT log: {}", self.base_url);
        }

        let response = response.error_for_status().map_err(Error::EntryFetch)?;
        let entries: GetEntriesResponse = response.json().await.map_err(Error::EntryFetch)?;

        debug!(
            "Received {} entries from {}",
            entries.entries.len(),
            self.base_url
        );

        Ok(entries.entries)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Last path component of the base URL, e.g. "argon2025h1" for
    /// "https://ct.googleapis.com/logs/us1/argon2025h1".
    pub fn source_name(&self) -> String {
        self.base_url
            .rsplit('/')
            .next()
            .unwrap_or(&self.base_url)
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_name_is_last_path_component() {
        let client =
            CtLogClient::new("https://ct.googleapis.com/logs/us1/argon2025h1/".to_string())
                .unwrap();
        assert_eq!(client.source_name(), "argon2025h1");
        assert_eq!(client.base_url(), "https://ct.googleapis.com/logs/us1/argon2025h1");
    }

    #[test]
    fn test_source_name_without_path() {
        let client = CtLogClient::new("nimbus2025".to_string()).unwrap();
        assert_eq!(client.source_name(), "nimbus2025");
    }
}
