//! prawn-sync demo
//!
//! Runs a session against the in-process backend: queues the given URLs,
//! optionally downloads everything, then prints the activity log and what is
//! left in the queue.
//!
//! # Usage
//!
//! ```sh
//! cargo run -p prawn-sync -- --url https://www.deezer.com/album/302127 --download
//!
//! # Every second download fails
//! cargo run -p prawn-sync -- --download --fail-every 2
//! ```

use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use prawn_sync::backend::{LocalBackend, LocalBackendConfig};
use prawn_sync::logging;
use prawn_sync::queue::QueueState;
use prawn_sync::session::Session;
use tokio::sync::watch;

const DEMO_URLS: [&str; 4] = [
    "https://www.deezer.com/en/track/3135556",
    "https://www.deezer.com/album/302127",
    "https://www.youtube.com/watch?v=FGBhQbmPwH8",
    "https://www.deezer.com/track/900000001",
];

/// Drive a download queue against a simulated backend
#[derive(Parser, Debug)]
#[command(name = "prawn-sync")]
struct Args {
    /// URL to queue (repeatable). Defaults to a small demo set.
    #[arg(long = "url")]
    urls: Vec<String>,

    /// Download the whole queue once it is populated
    #[arg(long)]
    download: bool,

    /// Make every n-th download fail
    #[arg(long)]
    fail_every: Option<u32>,

    /// Simulated download time in milliseconds
    #[arg(long, default_value = "50")]
    settle_ms: u64,
}

async fn wait_for(
    rx: &mut watch::Receiver<QueueState>,
    limit: Duration,
    pred: impl FnMut(&QueueState) -> bool,
) -> bool {
    matches!(tokio::time::timeout(limit, rx.wait_for(pred)).await, Ok(Ok(_)))
}

/// Base patience plus one settle period per entry.
fn waiting_limit(patience: Duration, settle: Duration, pending: u32) -> Duration {
    settle
        .saturating_mul(pending.saturating_add(1))
        .saturating_add(patience)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init();

    let settle = Duration::from_millis(args.settle_ms);
    let (backend, events) = LocalBackend::new(LocalBackendConfig {
        settle,
        fail_every: args.fail_every,
        ..LocalBackendConfig::default()
    });

    let session = match Session::start(backend, events).await {
        Ok(session) => session,
        Err(err) => {
            eprintln!("Error: could not start session: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let urls = if args.urls.is_empty() {
        DEMO_URLS.iter().map(|url| url.to_string()).collect()
    } else {
        args.urls
    };

    let mut queue = session.queue();
    let patience = Duration::from_secs(2);

    if let Err(err) = session.enqueue(urls) {
        eprintln!("Error: {}", err);
        return ExitCode::FAILURE;
    }
    if !wait_for(&mut queue, patience, |q| !q.is_empty() || q.last_error.is_some()).await {
        eprintln!("Nothing was queued.");
    }

    if args.download && !queue.borrow().is_empty() {
        let pending = u32::try_from(queue.borrow().len()).unwrap_or(u32::MAX);
        if let Err(err) = session.download_all() {
            eprintln!("Error: {}", err);
            return ExitCode::FAILURE;
        }
        let limit = waiting_limit(patience, settle, pending);
        if !wait_for(&mut queue, limit, QueueState::is_settled).await {
            eprintln!("Timed out waiting for downloads.");
        }
    }

    let snapshot = session.snapshot();

    println!("Activity:");
    for entry in &snapshot.log.entries {
        let mark = if entry.success { "ok " } else { "err" };
        println!(
            "  [{}] {} {}",
            mark,
            entry.timestamp.format("%H:%M:%S%.3f"),
            entry.content
        );
    }

    println!("Queue:");
    if snapshot.queue.is_empty() {
        println!("  (empty)");
    }
    for entry in &snapshot.queue.items {
        println!("  #{:<3} {:<40} {:?}", entry.id, entry.item.label(), entry.status);
    }

    if let Some(err) = &snapshot.queue.last_error {
        eprintln!("Last queue error: {}", err);
    }

    session.shutdown().await;
    ExitCode::SUCCESS
}
