// src/main.rs
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ct_relay::catalog;
use ct_relay::cli::{Cli, Command, StreamArgs};
use ct_relay::ct_log::stream::{BackoffPolicy, START_HEAD, START_ROOT, StreamConfig};
use ct_relay::pipeline;
use ct_relay::sink;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Command::Loglist => loglist().await,
        Command::Stream(args) => stream(args).await,
    }
}

fn init_logging(debug: bool) {
    let level = if debug { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn loglist() {
    init_logging(false);

    let catalog = match catalog::get_catalog().await {
        Ok(catalog) => catalog,
        Err(e) => {
            tracing::error!("could not get loglist: {}", e);
            std::process::exit(1);
        }
    };

    println!("|{:<3}| {:<40}| {:<25}| {}", "", "Operator", "Log Status", "Log URL");
    let mut n = 1;
    for operator in &catalog.operators {
        for log in &operator.logs {
            println!(
                "|{:<3}| {:<40}| {:<25}| {}",
                n,
                operator.name,
                log.status().to_string(),
                log.url
            );
            n += 1;
        }
    }
}

async fn stream(args: StreamArgs) {
    init_logging(args.debug);

    if let Err(e) = args.validate() {
        tracing::error!("{}", e);
        std::process::exit(1);
    }

    let sink = match sink::build(args.sink).await {
        Ok(sink) => sink,
        Err(e) => {
            tracing::error!("sink error: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("Using {} as sink", sink.describe());

    let config = StreamConfig {
        batch_size: args.max_batch_size,
        n_workers: args.workers_per_stream,
        start_index: if args.start_from_root { START_ROOT } else { START_HEAD },
        backoff: BackoffPolicy::default(),
    };
    let operators = match pipeline::build_operators(&args.operator, &args.status, &config).await {
        Ok(operators) => operators,
        Err(e) => {
            tracing::error!("could not get operators: {}", e);
            std::process::exit(1);
        }
    };

    let token = CancellationToken::new();
    let signal_token = token.clone();
    tokio::spawn(async move {
        wait_for_signal().await;
        tracing::info!("Received termination signal");
        tracing::info!("Putting remaining batches to the sink before exiting");
        signal_token.cancel();
    });

    pipeline::run(operators, Arc::clone(&sink), args.workers_for_sink, token).await;

    // the pipeline only returns after a signal or after every stream died
    std::process::exit(1);
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut sigterm =
            signal(SignalKind::terminate()).expect("could not install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = sigterm.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
