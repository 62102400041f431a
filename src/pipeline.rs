// src/pipeline.rs
//! Wires resolved operators to one bounded batch channel drained by a pool of
//! sink workers, and owns the shutdown drain.

use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::catalog::{self, LogStatus, OperatorName};
use crate::ct_log::operator::LogOperator;
use crate::ct_log::stream::StreamConfig;
use crate::error::Error;
use crate::record::Batch;
use crate::sink::Sink;

/// Resolve the operator filter against the catalog and build a LogOperator
/// (with its streams) for every match.
pub async fn build_operators(
    names: &[OperatorName],
    statuses: &[LogStatus],
    config: &StreamConfig,
) -> Result<Vec<LogOperator>, Error> {
    let resolved = catalog::resolve_operators(names).await?;
    Ok(resolved
        .iter()
        .map(|operator| LogOperator::new(operator, statuses, config))
        .collect())
}

/// Drive all operators into one bounded channel drained by `workers_per_sink`
/// sink workers. The channel capacity (`workers_per_sink * 2`) is the only
/// backpressure mechanism: a full channel blocks the per-operator forwarders,
/// which blocks the streams' fetchers.
///
/// Returns once every operator has stopped and every buffered batch has been
/// handed to the sink. Sink puts never observe the cancellation token, so the
/// final drain completes even after the token fires.
pub async fn run(
    operators: Vec<LogOperator>,
    sink: Arc<dyn Sink>,
    workers_per_sink: usize,
    token: CancellationToken,
) {
    let (batch_tx, batch_rx) = async_channel::bounded::<Batch>(workers_per_sink * 2);

    let mut operator_tasks = JoinSet::new();
    for operator in operators {
        operator_tasks.spawn(operator.run(token.clone(), batch_tx.clone()));
    }
    drop(batch_tx);

    let mut sink_workers = JoinSet::new();
    for _ in 0..workers_per_sink {
        let batch_rx = batch_rx.clone();
        let sink = Arc::clone(&sink);
        sink_workers.spawn(async move {
            while let Ok(batch) = batch_rx.recv().await {
                if let Err(e) = sink.put(&batch).await {
                    debug!(
                        "could not put batch [{}:{}] to sink: {}",
                        batch.start, batch.end, e
                    );
                }
            }
        });
    }
    drop(batch_rx);

    while operator_tasks.join_next().await.is_some() {}
    // Every operator-side sender is gone now, so the channel is closed; the
    // workers exit once the remaining buffered batches have been delivered.
    while sink_workers.join_next().await.is_some() {}

    info!("pipeline stopped");
}
