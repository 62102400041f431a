// src/ct_log/stream.rs
use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoff;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::client::CtLogClient;
use super::entry;
use super::sth;
use super::types::{BatchIndex, SignedTreeHead};
use crate::error::Error;
use crate::formatter;
use crate::record::Batch;

/// Start streaming from the log's current head, skipping history.
pub const START_HEAD: i64 = -1;
/// Start streaming from the first entry in the log.
pub const START_ROOT: i64 = 0;

/// Retry schedule for STH and entry fetches against one log. An unchanged
/// STH is retried under the same schedule as a transport failure; the log is
/// simply not publishing new entries yet.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    pub initial_interval: Duration,
    pub multiplier: f64,
    pub randomization_factor: f64,
    pub max_interval: Duration,
    pub max_elapsed_time: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            initial_interval: Duration::from_secs(60),
            multiplier: 1.5,
            randomization_factor: 0.75,
            max_interval: Duration::from_secs(10 * 60),
            max_elapsed_time: Duration::from_secs(5 * 60 * 60),
        }
    }
}

impl BackoffPolicy {
    fn to_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_interval,
            current_interval: self.initial_interval,
            multiplier: self.multiplier,
            randomization_factor: self.randomization_factor,
            max_interval: self.max_interval,
            max_elapsed_time: Some(self.max_elapsed_time),
            ..ExponentialBackoff::default()
        }
    }
}

/// Sizing and start-index knobs shared by every stream in one run.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Upper bound on entries per emitted batch.
    pub batch_size: u64,
    /// Concurrent entry fetchers against this one log.
    pub n_workers: usize,
    /// START_HEAD, START_ROOT, or an explicit first index.
    pub start_index: i64,
    pub backoff: BackoffPolicy,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            n_workers: 2,
            start_index: START_HEAD,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Tails a single CT log endpoint: advances the STH, cuts the new index
/// window into ranges, and fans entry fetches over `n_workers` consumers.
pub struct LogStream {
    client: Arc<CtLogClient>,
    operator_name: String,
    log_source_name: String,
    public_key: Option<Vec<u8>>,
    config: StreamConfig,
}

/// Everything the producer and consumer tasks share.
struct StreamShared {
    name: String,
    client: Arc<CtLogClient>,
    operator_name: String,
    log_source_name: String,
    public_key: Option<Vec<u8>>,
    config: StreamConfig,
}

/// Tail position. `index_start <= index_end` always; `index_end` never
/// decreases over the stream's lifetime. Owned by the range producer once
/// the stream is running.
struct Cursor {
    index_start: u64,
    index_end: u64,
    sth: Option<SignedTreeHead>,
    initialized: bool,
}

impl Cursor {
    fn new() -> Self {
        Self {
            index_start: 0,
            index_end: 0,
            sth: None,
            initialized: false,
        }
    }

    /// Tree size committed to by the last verified STH; no emitted range may
    /// reach past it.
    fn tree_size(&self) -> u64 {
        self.sth.as_ref().map_or(0, |sth| sth.tree_size)
    }
}

impl LogStream {
    pub fn new(
        log_url: &str,
        operator_name: &str,
        public_key: Option<Vec<u8>>,
        config: StreamConfig,
    ) -> anyhow::Result<Self> {
        let client = CtLogClient::new(log_url.to_string())?;
        let log_source_name = client.source_name();
        Ok(Self {
            client: Arc::new(client),
            operator_name: operator_name.to_string(),
            log_source_name,
            public_key,
            config,
        })
    }

    pub fn name(&self) -> String {
        format!("{}:{}", self.operator_name, self.log_source_name)
    }

    /// Stream batches until cancellation or a fatal per-stream error. The
    /// sender is dropped on return, which closes this stream's channel.
    pub async fn run(self, token: CancellationToken, out: mpsc::Sender<Batch>) {
        let shared = Arc::new(StreamShared {
            name: self.name(),
            client: self.client,
            operator_name: self.operator_name,
            log_source_name: self.log_source_name,
            public_key: self.public_key,
            config: self.config,
        });

        let mut cursor = Cursor::new();
        match update_sth(&shared, &mut cursor, &token).await {
            Ok(true) => {}
            Ok(false) => return,
            Err(e) => {
                error!("{} could not get STH: {}", shared.name, e);
                return;
            }
        }

        let (range_tx, range_rx) = async_channel::bounded::<BatchIndex>(1);

        let mut workers = JoinSet::new();
        {
            let shared = Arc::clone(&shared);
            let token = token.clone();
            workers.spawn(produce_ranges(shared, cursor, token, range_tx));
        }
        for _ in 0..shared.config.n_workers {
            let shared = Arc::clone(&shared);
            let token = token.clone();
            let range_rx = range_rx.clone();
            let out = out.clone();
            workers.spawn(consume_ranges(shared, token, range_rx, out));
        }
        drop(range_rx);
        drop(out);

        while workers.join_next().await.is_some() {}
        debug!("{} workers have stopped", shared.name);
    }
}

/// Poll get-sth under the backoff policy until the tree grows past the
/// current `index_end`, then verify the signature and advance the cursor.
/// Returns Ok(false) when cancellation was observed.
async fn update_sth(
    shared: &StreamShared,
    cursor: &mut Cursor,
    token: &CancellationToken,
) -> Result<bool, Error> {
    let current_end = cursor.index_end;
    let client = shared.client.as_ref();
    let name = shared.name.as_str();
    let operation = || async move {
        if token.is_cancelled() {
            return Err(backoff::Error::permanent(Error::Cancelled));
        }
        let head = client.get_sth().await.map_err(backoff::Error::transient)?;
        if head.tree_size <= current_end {
            debug!("{} STH has not changed (tree_size={})", name, head.tree_size);
            return Err(backoff::Error::transient(Error::SthStall));
        }
        Ok(head)
    };

    let head = tokio::select! {
        _ = token.cancelled() => return Ok(false),
        result = backoff::future::retry(shared.config.backoff.to_backoff(), operation) => {
            match result {
                Ok(head) => head,
                Err(Error::Cancelled) => return Ok(false),
                Err(e) => return Err(e),
            }
        }
    };
    if token.is_cancelled() {
        return Ok(false);
    }

    match &shared.public_key {
        Some(key) => sth::verify_sth(&head, key)?,
        None => debug!(
            "{} has no public key on file, skipping STH signature verification",
            shared.name
        ),
    }

    if !cursor.initialized {
        cursor.index_start = match shared.config.start_index {
            START_HEAD => head.tree_size,
            n if n > 0 => std::cmp::min(n as u64, head.tree_size),
            _ => 0,
        };
        cursor.initialized = true;
    } else {
        // Subsequent resumes always pick up at the previous end, regardless
        // of the original start sentinel.
        cursor.index_start = cursor.index_end;
    }
    cursor.index_end = head.tree_size;
    cursor.sth = Some(head);

    debug!(
        "{} STH updated: start={} end={}",
        shared.name, cursor.index_start, cursor.index_end
    );
    Ok(true)
}

/// Cuts `[index_start, index_end)` into inclusive ranges of at most
/// `batch_size` entries, refreshing the STH whenever the window is consumed.
async fn produce_ranges(
    shared: Arc<StreamShared>,
    mut cursor: Cursor,
    token: CancellationToken,
    ranges: async_channel::Sender<BatchIndex>,
) {
    loop {
        if token.is_cancelled() {
            debug!("{} will stop producing ranges", shared.name);
            return;
        }
        if cursor.index_start >= cursor.index_end {
            match update_sth(&shared, &mut cursor, &token).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    error!("{} could not update STH: {}", shared.name, e);
                    return;
                }
            }
        }

        let span = std::cmp::min(cursor.index_end - cursor.index_start, shared.config.batch_size);
        let range = BatchIndex {
            start: cursor.index_start,
            end: cursor.index_start + span - 1,
        };
        debug_assert!(range.end < cursor.tree_size());
        tokio::select! {
            _ = token.cancelled() => {
                debug!("{} will stop producing ranges", shared.name);
                return;
            }
            sent = ranges.send(range) => {
                if sent.is_err() {
                    // every consumer has returned
                    return;
                }
            }
        }
        debug!(
            "{} range created: start={} end={}",
            shared.name, range.start, range.end
        );
        cursor.index_start += span;
    }
}

/// Pulls ranges off the shared queue, fetches their entries (tolerating short
/// reads), and forwards assembled batches. Returns on cancellation, on a
/// closed queue, or once the retry budget for a fetch is exhausted.
async fn consume_ranges(
    shared: Arc<StreamShared>,
    token: CancellationToken,
    ranges: async_channel::Receiver<BatchIndex>,
    out: mpsc::Sender<Batch>,
) {
    while let Ok(mut range) = ranges.recv().await {
        while range.start <= range.end {
            let client = shared.client.as_ref();
            let token_ref = &token;
            let (start, end) = (range.start, range.end);
            let operation = || async move {
                if token_ref.is_cancelled() {
                    return Err(backoff::Error::permanent(Error::Cancelled));
                }
                client
                    .get_entries(start, end)
                    .await
                    .map_err(backoff::Error::transient)
            };
            let entries = tokio::select! {
                _ = token.cancelled() => return,
                result = backoff::future::retry(shared.config.backoff.to_backoff(), operation) => {
                    match result {
                        Ok(entries) => entries,
                        Err(Error::Cancelled) => return,
                        Err(e) => {
                            error!(
                                "{} could not get entries [{}, {}]: {}",
                                shared.name, range.start, range.end, e
                            );
                            return;
                        }
                    }
                }
            };
            if token.is_cancelled() {
                return;
            }
            if entries.is_empty() {
                warn!(
                    "{} log returned no entries for [{}, {}], abandoning range",
                    shared.name, range.start, range.end
                );
                break;
            }

            let mut records = Vec::with_capacity(entries.len());
            for (offset, raw) in entries.iter().enumerate() {
                let index = range.start + offset as u64;
                let parsed = match entry::parse_entry(&raw.leaf_input, &raw.extra_data) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("{} could not parse leaf at index {}: {}", shared.name, index, e);
                        continue;
                    }
                };
                match formatter::record_from_entry(
                    &parsed,
                    index,
                    shared.client.base_url(),
                    &shared.operator_name,
                ) {
                    Ok(record) => records.push(record),
                    Err(e) => {
                        warn!(
                            "{} could not parse certificate at index {}: {}",
                            shared.name, index, e
                        );
                    }
                }
            }

            let fetched = entries.len() as u64;
            let batch = Batch {
                operator_name: shared.operator_name.clone(),
                log_source_name: shared.log_source_name.clone(),
                start: range.start,
                end: range.end,
                logs: records,
            };
            tokio::select! {
                _ = token.cancelled() => return,
                sent = out.send(batch) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
            range.start += fetched;
        }
    }
}
