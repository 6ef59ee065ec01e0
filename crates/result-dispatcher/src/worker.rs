//! Periodic worker driving the dispatcher.

use crate::build::BuildReference;
use crate::dispatcher::{CycleOutcome, Dispatcher};
use crate::queue::PendingQueue;
use chrono::Utc;
use dispatcher_config_and_utils::ServerConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info};

impl Dispatcher {
    /// Spawn the worker on the current tokio runtime.
    ///
    /// The first cycle runs immediately, then one cycle per `period`. Cycles
    /// never overlap; a slow cycle delays the next tick instead of bursting.
    /// Dropping the returned handle stops the worker after its current cycle.
    pub fn start(self, period: Duration) -> DispatcherHandle {
        let queue = self.queue().clone();
        let server = self.server_slot();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (cycles_tx, cycles_rx) = watch::channel(0u64);

        let task = tokio::spawn(run_worker(self, period, shutdown_rx, cycles_tx));

        info!(period_ms = period.as_millis() as u64, "Result dispatcher started");

        DispatcherHandle {
            queue,
            server,
            cycles: cycles_rx,
            shutdown_tx: Some(shutdown_tx),
            task,
        }
    }
}

async fn run_worker(
    mut dispatcher: Dispatcher,
    period: Duration,
    mut shutdown_rx: oneshot::Receiver<()>,
    cycles_tx: watch::Sender<u64>,
) -> Dispatcher {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut completed = 0u64;

    loop {
        tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                info!("Result dispatcher received shutdown signal");
                break;
            }
            _ = ticker.tick() => {}
        }

        // Runs outside the select so shutdown never interrupts a cycle.
        let outcome = dispatcher.run_cycle(Utc::now()).await;
        if let CycleOutcome::Processed(items) = &outcome {
            debug!(items = items.len(), pending = dispatcher.queue().len(), "Dispatch cycle finished");
        }

        completed += 1;
        cycles_tx.send_replace(completed);
    }

    debug!(cycles = completed, "Result dispatcher stopped");
    dispatcher
}

/// Handle to a running dispatcher; also the producer interface for the host.
pub struct DispatcherHandle {
    queue: Arc<PendingQueue>,
    server: Arc<RwLock<Option<ServerConfig>>>,
    cycles: watch::Receiver<u64>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<Dispatcher>,
}

impl DispatcherHandle {
    /// Enqueue a finished build. Returns `false` if it was already pending
    /// or its project name is refused by the queue.
    pub fn enqueue(&self, project_name: impl Into<String>, build_number: u64) -> bool {
        self.queue
            .add(BuildReference::new(project_name, build_number))
    }

    /// Enqueue several finished builds, returning how many were new.
    pub fn enqueue_many<I, S>(&self, builds: I) -> usize
    where
        I: IntoIterator<Item = (S, u64)>,
        S: Into<String>,
    {
        self.queue
            .add_all(builds.into_iter().map(BuildReference::from))
    }

    pub fn queue(&self) -> &Arc<PendingQueue> {
        &self.queue
    }

    pub async fn set_server_config(&self, server: ServerConfig) {
        *self.server.write().await = Some(server);
    }

    pub async fn clear_server_config(&self) {
        *self.server.write().await = None;
    }

    /// Number of cycles completed so far.
    pub fn completed_cycles(&self) -> u64 {
        *self.cycles.borrow()
    }

    pub fn subscribe_cycles(&self) -> watch::Receiver<u64> {
        self.cycles.clone()
    }

    /// Wait until `count` more cycles have completed, or the worker is gone.
    pub async fn wait_for_cycles(&self, count: u64) {
        let mut cycles = self.cycles.clone();
        let target = *cycles.borrow_and_update() + count;
        let _ = cycles.wait_for(|completed| *completed >= target).await;
    }

    /// Stop the worker, letting an in-flight cycle finish first.
    ///
    /// Returns the dispatcher so it can be restarted with its retry state.
    /// The queue is untouched.
    pub async fn stop(mut self) -> Option<Dispatcher> {
        if let Some(shutdown_tx) = self.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }

        match (&mut self.task).await {
            Ok(dispatcher) => Some(dispatcher),
            Err(err) => {
                error!(error = %err, "Result dispatcher task failed");
                None
            }
        }
    }
}
