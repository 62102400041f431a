// src/ct_log/mod.rs
//! Certificate Transparency log protocol: the RFC 6962 client, leaf decoding,
//! STH signature verification, and the per-log streaming machinery.

pub mod client;
pub mod entry;
pub mod operator;
pub mod sth;
pub mod stream;
pub mod types;

pub use client::CtLogClient;
pub use operator::LogOperator;
pub use stream::LogStream;
