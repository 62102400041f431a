// src/cli.rs
use clap::{Args, Parser, Subcommand};

use crate::catalog::{LogStatus, OperatorName};
use crate::sink::SinkKind;

/// ct-relay: stream the Certificate Transparency logs
///
/// Stream TLS certificates directly from the CT logs into a durable sink for
/// analysis. Learn more about Certificate Transparency at
/// https://certificate.transparency.dev/
#[derive(Parser, Debug)]
#[command(name = "ct-relay")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the Operators and Log sources from Google Chrome's CT log list in
    /// a table format.
    Loglist,
    /// Stream the certificate transparency logs until signalled.
    Stream(StreamArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StreamArgs {
    /// Streaming sink where to write batches of logs (e.g. kafka).
    #[arg(short = 's', long = "sink", value_enum)]
    pub sink: SinkKind,

    /// Comma separated list of Log Operator names (e.g. certly,digicert,google).
    #[arg(
        short = 'o',
        long = "operator",
        value_enum,
        value_delimiter = ',',
        default_value = "all"
    )]
    pub operator: Vec<OperatorName>,

    /// Comma separated list of Log Status (e.g. usable,undefined).
    #[arg(
        short = 'f',
        long = "status",
        value_enum,
        value_delimiter = ',',
        default_value = "usable"
    )]
    pub status: Vec<LogStatus>,

    /// Number of concurrent workers for the sink.
    #[arg(short = 'w', long = "workersForSink", default_value_t = 5)]
    pub workers_for_sink: usize,

    /// Number of concurrent workers per log stream.
    #[arg(short = 'c', long = "workersPerStream", default_value_t = 2)]
    pub workers_per_stream: usize,

    /// Maximum number of logs included in each sink put operation.
    #[arg(short = 'b', long = "maxBatchSize", default_value_t = 200)]
    pub max_batch_size: u64,

    /// Start streaming from the log's root (index=0).
    #[arg(short = 'r', long = "startFromRoot")]
    pub start_from_root: bool,

    /// Enable verbose debug logging.
    #[arg(short = 'd', long = "debug")]
    pub debug: bool,
}

impl StreamArgs {
    /// Reject sizing values outside the supported ranges before anything
    /// launches.
    pub fn validate(&self) -> anyhow::Result<()> {
        if !(1..=20).contains(&self.workers_per_stream) {
            anyhow::bail!("workersPerStream {} is not recommended", self.workers_per_stream);
        }
        if !(1..=20).contains(&self.workers_for_sink) {
            anyhow::bail!("workersForSink {} is not recommended", self.workers_for_sink);
        }
        if !(10..=500).contains(&self.max_batch_size) {
            // Firehose caps a PutRecordBatch at 500 records (4KB/record, 1MB total)
            anyhow::bail!("maxBatchSize {} is not recommended", self.max_batch_size);
        }
        Ok(())
    }
}
