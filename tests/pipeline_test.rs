// Integration tests for the pipeline driver: fan-in, sink worker pool, and
// the shutdown drain.
mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use wiremock::MockServer;

use common::{make_entries, mint_cert, mount_fake_log, test_config};
use ct_relay::ct_log::operator::LogOperator;
use ct_relay::ct_log::stream::{LogStream, START_ROOT};
use ct_relay::error::Error;
use ct_relay::pipeline;
use ct_relay::record::Batch;
use ct_relay::sink::{self, Sink, SinkKind};

/// Records every put; an optional gate makes puts block until permits arrive.
#[derive(Debug)]
struct TestSink {
    puts: Arc<Mutex<Vec<Batch>>>,
    gate: Option<Arc<Semaphore>>,
}

#[async_trait]
impl Sink for TestSink {
    async fn init(&mut self) -> Result<(), Error> {
        Ok(())
    }

    async fn put(&self, batch: &Batch) -> Result<(), Error> {
        if let Some(gate) = &self.gate {
            let permit = gate
                .acquire()
                .await
                .map_err(|_| Error::SinkWrite("gate closed".to_string()))?;
            permit.forget();
        }
        self.puts.lock().await.push(batch.clone());
        Ok(())
    }

    fn describe(&self) -> String {
        "TestSink".to_string()
    }
}

async fn fake_log_operator(server: &MockServer, tree_size: u64, batch_size: u64) -> LogOperator {
    let cert = mint_cert("pipeline.example.com");
    mount_fake_log(
        server,
        vec![tree_size],
        make_entries(tree_size as usize, &cert),
        100,
    )
    .await;
    let stream = LogStream::new(
        &server.uri(),
        "Test Operator",
        None,
        test_config(batch_size, 1, START_ROOT),
    )
    .unwrap();
    LogOperator::from_streams("Test Operator", vec![stream])
}

#[tokio::test]
async fn test_pipeline_delivers_every_batch_once() {
    let server = MockServer::start().await;
    let operator = fake_log_operator(&server, 10, 2).await;

    let puts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::new(TestSink {
        puts: Arc::clone(&puts),
        gate: None,
    });

    timeout(
        Duration::from_secs(30),
        pipeline::run(vec![operator], sink, 2, CancellationToken::new()),
    )
    .await
    .unwrap();

    let mut windows: Vec<(u64, u64)> = puts.lock().await.iter().map(|b| (b.start, b.end)).collect();
    windows.sort();
    assert_eq!(windows, vec![(0, 1), (2, 3), (4, 5), (6, 7), (8, 9)]);
}

#[tokio::test]
async fn test_cancellation_drains_buffered_batches() {
    let server = MockServer::start().await;
    let operator = fake_log_operator(&server, 10, 2).await;

    let puts = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(Semaphore::new(0));
    let sink = Arc::new(TestSink {
        puts: Arc::clone(&puts),
        gate: Some(Arc::clone(&gate)),
    });

    let token = CancellationToken::new();
    let run = tokio::spawn(pipeline::run(
        vec![operator],
        sink,
        1,
        token.clone(),
    ));

    // Let the single blocked sink worker and the bounded channel fill up with
    // everything the stream produced, then signal shutdown and open the gate.
    tokio::time::sleep(Duration::from_millis(400)).await;
    token.cancel();
    gate.add_permits(100);

    timeout(Duration::from_secs(10), run)
        .await
        .expect("pipeline did not drain after cancellation")
        .unwrap();

    let mut windows: Vec<(u64, u64)> = puts.lock().await.iter().map(|b| (b.start, b.end)).collect();
    windows.sort();
    windows.dedup();
    assert_eq!(
        windows.len(),
        puts.lock().await.len(),
        "a batch was delivered more than once"
    );
    // every batch the stream managed to buffer was handed to the sink
    assert_eq!(windows, vec![(0, 1), (2, 3), (4, 5), (6, 7), (8, 9)]);
}

#[tokio::test]
async fn test_pipeline_with_empty_operator_stops() {
    let operator = LogOperator::from_streams("Empty Operator", vec![]);
    let puts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::new(TestSink {
        puts: Arc::clone(&puts),
        gate: None,
    });

    timeout(
        Duration::from_secs(5),
        pipeline::run(vec![operator], sink, 2, CancellationToken::new()),
    )
    .await
    .unwrap();

    assert!(puts.lock().await.is_empty());
}

// The SINK_FILE_DIRECTORY mutations live in one test so they cannot race.
#[tokio::test]
async fn test_file_sink_end_to_end() {
    unsafe { std::env::remove_var("SINK_FILE_DIRECTORY") };
    // startup fails before any stream launches
    let err = sink::build(SinkKind::File).await.unwrap_err();
    assert!(matches!(err, Error::SinkConfig(_)));

    let dir = tempfile::tempdir().unwrap();
    unsafe { std::env::set_var("SINK_FILE_DIRECTORY", dir.path()) };
    let file_sink = sink::build(SinkKind::File).await.unwrap();

    let server = MockServer::start().await;
    let operator = fake_log_operator(&server, 4, 2).await;

    timeout(
        Duration::from_secs(30),
        pipeline::run(vec![operator], file_sink, 1, CancellationToken::new()),
    )
    .await
    .unwrap();

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
    assert_eq!(files.len(), 2, "expected one file per batch");

    let body = std::fs::read_to_string(&files[0]).unwrap();
    let records: serde_json::Value = serde_json::from_str(&body).unwrap();
    let records = records.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["entry_type"], "X509Cert");
    assert_eq!(
        records[0]["body"]["cert_leaf"]["extensions"]["subjectAltNames"],
        "DNS:pipeline.example.com"
    );

    unsafe { std::env::remove_var("SINK_FILE_DIRECTORY") };
}
