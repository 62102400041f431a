// src/error.rs
use thiserror::Error;

/// Everything that can go wrong between the catalog and the sink.
///
/// Transport failures (`SthFetch`, `EntryFetch`) are retried under backoff and
/// only surface once the retry budget is exhausted; they are fatal for the
/// stream that hit them, never for the whole pipeline. `Cancelled` is the
/// non-error shutdown path and is swallowed by every retry wrapper.
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not fetch the CT log catalog")]
    CatalogFetch(#[source] reqwest::Error),

    #[error("unknown log operator: {0}")]
    UnknownOperator(String),

    #[error("could not fetch STH")]
    SthFetch(#[source] reqwest::Error),

    #[error("no new STH within the backoff budget")]
    SthStall,

    #[error("STH signature verification failed: {0}")]
    SthSignature(String),

    #[error("could not fetch entries")]
    EntryFetch(#[source] reqwest::Error),

    #[error("could not parse leaf entry: {0}")]
    LeafParse(String),

    #[error("missing sink configuration: {0}")]
    SinkConfig(String),

    #[error("sink connection failed: {0}")]
    SinkAuth(String),

    #[error("sink write failed: {0}")]
    SinkWrite(String),

    #[error("operation cancelled")]
    Cancelled,
}
