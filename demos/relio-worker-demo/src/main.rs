//! A runnable proof that `relio` works end to end: register a handler,
//! wire it to an in-memory transport, and either drive a batch of demo
//! tasks through it (`produce`) or run the worker standalone (`serve`).
//!
//! This is a demo, not a product: it exists to exercise the library the
//! way an embedding application would, the way the reference
//! implementation's `example/` programs do.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use clap::{Parser, Subcommand};

use relio_engine::{Handler, Manager, ManagerConfig};
use relio_inmemory::InMemoryTransport;
use relio_task::{create_descriptor, Descriptor, HandlerError, RetryRequested};

#[derive(Parser)]
#[command(name = "relio-worker-demo", about = "Demo producer/worker for relio")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit `count` demo tasks against an in-memory worker and wait for
    /// all of them to finish, then print the final metrics.
    Produce {
        #[arg(long, default_value_t = 10)]
        count: usize,
        /// Number of initial attempts each task fails before succeeding.
        #[arg(long, default_value_t = 2)]
        flaky_attempts: u32,
    },
    /// Run a worker against an in-memory transport until interrupted.
    /// Intended to be paired with a producer; this demo's transport is
    /// in-process only, so nothing will arrive unless submitted in the
    /// same run.
    Serve,
}

/// Greets whoever `payload` names, failing the first `fail_until` attempts
/// of each task to make the retry path visible in the logs.
struct GreeterHandler {
    fail_until: u32,
}

#[async_trait]
impl Handler for GreeterHandler {
    async fn handle(&self, descriptor: &Descriptor) -> Result<(), HandlerError> {
        let name = String::from_utf8_lossy(&descriptor.payload);
        if descriptor.current_try <= self.fail_until {
            tracing::warn!(
                task_id = %descriptor.id,
                attempt = descriptor.current_try,
                "greeter: simulated transient failure for {name}"
            );
            return Err(Box::new(RetryRequested));
        }
        tracing::info!(task_id = %descriptor.id, attempt = descriptor.current_try, "hello, {name}!");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Produce {
            count,
            flaky_attempts,
        } => produce(count, flaky_attempts).await,
        Commands::Serve => serve().await,
    }
}

async fn produce(count: usize, flaky_attempts: u32) -> Result<()> {
    let transport = InMemoryTransport::new();
    let manager = Manager::with_config(transport, ManagerConfig::from_env());
    manager
        .register_handler(
            "greet",
            GreeterHandler {
                fail_until: flaky_attempts,
            },
        )
        .await?;

    let manager_for_worker = Arc::clone(&manager);
    let worker = tokio::spawn(async move { manager_for_worker.run_worker().await });

    for i in 0..count {
        manager
            .submit(create_descriptor("greet", format!("task-{i}").into_bytes()).set_max_retry(-1))
            .await?;
    }

    let target = count as u64;
    while manager.metrics_snapshot().task_done_success
        + manager.metrics_snapshot().task_done_error
        < target
    {
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    manager.stop_worker().await;
    worker.await??;

    let snapshot = manager.metrics_snapshot();
    println!(
        "sent={} succeeded={} failed={}",
        snapshot.task_sent, snapshot.task_done_success, snapshot.task_done_error
    );
    Ok(())
}

async fn serve() -> Result<()> {
    let transport = InMemoryTransport::new();
    let manager = Manager::new(transport);
    manager
        .register_handler("greet", GreeterHandler { fail_until: 0 })
        .await?;

    tracing::info!("worker running, press ctrl-c to stop");
    manager.run_worker().await?;

    let snapshot = manager.metrics_snapshot();
    tracing::info!(
        sent = snapshot.task_sent,
        succeeded = snapshot.task_done_success,
        failed = snapshot.task_done_error,
        "worker stopped"
    );
    Ok(())
}
