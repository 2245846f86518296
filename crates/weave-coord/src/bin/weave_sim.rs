//! weave-sim: runs a scripted scenario against a coordinator and prints the
//! event stream.
//!
//! The scenario syncs a board through a flaky operation, drops the
//! connection for a while, queues work during the outage, and lets the
//! reconnect controller flush the queue once the connection returns.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use clap::Parser;
use tokio::sync::broadcast::error::RecvError;
use tracing::info;

use weave_coord::{init_tracing, Coordinator, OfflineQueue, QueueProcessor};
use weave_core::{
    BackendConfig, ConnectionHints, CoordinatorConfig, Error, EventEnvelope, Result,
};

#[derive(Parser)]
#[command(name = "weave-sim")]
#[command(author, version, about = "Simulate TimeWeave coordination scenarios")]
struct Cli {
    /// Number of times the sync operation fails before succeeding
    #[arg(long, default_value_t = 1)]
    failures: u32,

    /// Local retries for the sync operation
    #[arg(long, default_value_t = 2)]
    retries: u32,

    /// Base delay between retries, in milliseconds
    #[arg(long, default_value_t = 250)]
    delay_ms: u64,

    /// How long the simulated outage lasts, in milliseconds
    #[arg(long, default_value_t = 1500)]
    offline_ms: u64,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,
}

/// Pretends to upload queued edits.
struct Uploader;

#[async_trait]
impl QueueProcessor<String> for Uploader {
    async fn process(&self, item: String) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        info!(item = %item, "Uploaded queued edit");
        Ok(())
    }
}

fn print_event(envelope: &EventEnvelope, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(envelope)?);
    } else {
        match envelope.payload.notification() {
            Some(n) => println!(
                "{} [{}] {:?}: {}",
                envelope.occurred_at.format("%H:%M:%S%.3f"),
                envelope.event_type,
                n.level,
                n.message
            ),
            None => println!(
                "{} [{}] {}",
                envelope.occurred_at.format("%H:%M:%S%.3f"),
                envelope.event_type,
                serde_json::to_string(&envelope.payload)?
            ),
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let _log_guard = init_tracing("weave_coord=info,weave_sim=info")?;

    let cli = Cli::parse();

    let coordinator = Coordinator::new(
        CoordinatorConfig::from_env(),
        BackendConfig::from_env(),
        ConnectionHints::online(),
    );

    let mut events = coordinator.bus().subscribe();
    let json = cli.json;
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(envelope) => {
                    if let Err(e) = print_event(&envelope, json) {
                        eprintln!("Error: {e}");
                    }
                }
                Err(RecvError::Lagged(skipped)) => eprintln!("(skipped {skipped} events)"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 1. Flaky sync under a loading entry.
    let failures = cli.failures;
    let attempts = Arc::new(AtomicU32::new(0));
    let counter = attempts.clone();
    let sync = coordinator
        .operation(move || {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if n <= failures {
                    Err(Error::operation(format!("simulated failure {n}")))
                } else {
                    Ok(n)
                }
            }
        })
        .label("sync-board")
        .retries(cli.retries)
        .retry_delay(Duration::from_millis(cli.delay_ms))
        .success_message_with(|n: &u32| format!("Board synced after {n} attempt(s)"))
        .build();

    let synced = coordinator
        .loading()
        .track("sync-board", Some("Syncing board"), true, sync.execute())
        .await;
    info!(outcome = ?synced, attempts = attempts.load(Ordering::SeqCst), "Sync finished");

    // 2. Outage: work is rejected and queued instead.
    let queue: Arc<OfflineQueue<String>> = Arc::new(coordinator.offline_queue());
    let flush_queue = queue.clone();
    let uploader = Arc::new(Uploader);
    let controller = coordinator.retry_on_reconnect(move || {
        let queue = flush_queue.clone();
        let uploader = uploader.clone();
        async move { queue.process(uploader.as_ref()).await.map(|_| ()) }
    });

    coordinator.network().set_online(false);
    if let Err(err) = sync.execute().await {
        info!(error = %err, "Sync rejected while offline");
    }
    for edit in ["rename column", "move card", "archive list"] {
        queue.push(edit.to_string());
    }
    tokio::time::sleep(Duration::from_millis(cli.offline_ms)).await;

    // 3. Reconnect: the controller flushes the queue.
    coordinator.network().observe(
        ConnectionHints::online()
            .with_effective_type(weave_core::EffectiveType::FourG)
            .with_downlink(12.0)
            .with_rtt(60),
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    while controller.is_retrying() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let errors = coordinator.errors();
    info!(
        recorded = errors.len(),
        unresolved = errors.unresolved_errors().len(),
        queued = queue.len(),
        "Scenario complete"
    );

    // Let the printer drain before exiting.
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(controller);
    printer.abort();
    Ok(())
}
