//! Periodic trigger: one pass immediately, then one every `interval`, checked on
//! each `poll_tick`. Stops when the shutdown signal flips to `true` or its sender
//! is dropped.

use crate::pipeline::Orchestrator;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{error, info};

pub struct Scheduler {
    orchestrator: Arc<Orchestrator>,
    interval: Duration,
    poll_tick: Duration,
}

/// Flip to stop a running scheduler.
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

impl Scheduler {
    pub fn new(orchestrator: Arc<Orchestrator>, interval: Duration, poll_tick: Duration) -> Self {
        Self {
            orchestrator,
            interval,
            poll_tick,
        }
    }

    /// Run on a background task so the caller (and anything sharing the runtime) keeps going.
    pub fn spawn(self) -> (JoinHandle<()>, ShutdownHandle) {
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { self.run(rx).await });
        (handle, ShutdownHandle { tx })
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            poll_secs = self.poll_tick.as_secs(),
            "Scheduler started"
        );

        self.pass().await;
        let mut next_due = Instant::now() + self.interval;

        let mut ticker = tokio::time::interval_at(Instant::now() + self.poll_tick, self.poll_tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if Instant::now() >= next_due {
                        self.pass().await;
                        next_due = Instant::now() + self.interval;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// One pass on its own task; a panic inside it is logged, not propagated.
    async fn pass(&self) {
        let orchestrator = Arc::clone(&self.orchestrator);
        match tokio::spawn(async move { orchestrator.run_once().await }).await {
            Ok(summary) => info!(
                sources = summary.sources.len(),
                scraped = summary.total_scraped(),
                failed = summary.failed_sources(),
                "Scheduled pass finished"
            ),
            Err(e) => error!(error = %e, "Scheduled pass aborted"),
        }
    }
}
