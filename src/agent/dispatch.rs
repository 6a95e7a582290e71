//! Snapshot dispatcher: bounded job queue, worker pool, retry
//!
//! The report tick pushes each drained snapshot as one job onto a queue
//! bounded to the configured concurrency; N−1 persistent workers pull
//! jobs and send one transport request per record, so a failing record
//! never blocks its siblings. Failed sends land on a shared error channel
//! that the control loop logs and moves past.
//!
//! Delivery is best-effort, at-most-once per tick: after retry exhaustion
//! the record is dropped. A lost gauge is superseded by the next tick; a
//! lost counter delta for that tick is permanently lost.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::transport::{RecordSender, TransportError};
use crate::Snapshot;

pub struct Dispatcher {
    jobs: mpsc::Sender<Snapshot>,
    workers: Vec<JoinHandle<()>>,
}

impl Dispatcher {
    /// Spawn the worker pool. `concurrency` sizes the job queue; the pool
    /// runs `concurrency - 1` workers (at least one).
    pub fn spawn(
        transport: Arc<dyn RecordSender>,
        concurrency: usize,
        num_retries: u32,
        cancel: CancellationToken,
    ) -> (Self, mpsc::UnboundedReceiver<TransportError>) {
        let queue_size = concurrency.max(1);
        let worker_count = concurrency.saturating_sub(1).max(1);

        let (jobs_tx, jobs_rx) = mpsc::channel::<Snapshot>(queue_size);
        let (errs_tx, errs_rx) = mpsc::unbounded_channel();

        // Workers share one receiver; whichever is free picks up the next
        // snapshot
        let jobs_rx = Arc::new(Mutex::new(jobs_rx));

        let workers = (0..worker_count)
            .map(|id| {
                let jobs_rx = Arc::clone(&jobs_rx);
                let errs_tx = errs_tx.clone();
                let transport = Arc::clone(&transport);
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    worker(id, jobs_rx, errs_tx, transport, num_retries, cancel).await;
                })
            })
            .collect();

        (
            Self {
                jobs: jobs_tx,
                workers,
            },
            errs_rx,
        )
    }

    /// Queue one snapshot for delivery; blocks while the queue is full.
    pub async fn push(&self, snapshot: Snapshot) {
        // Send fails only when all workers are gone, which means shutdown
        // is already in progress; the snapshot is dropped either way
        let _ = self.jobs.send(snapshot).await;
    }

    /// Close the queue, let workers drain what is already queued, and wait
    /// for them to finish.
    pub async fn shutdown(self) {
        drop(self.jobs);
        join_all(self.workers).await;
        info!("dispatcher stopped");
    }
}

async fn worker(
    id: usize,
    jobs: Arc<Mutex<mpsc::Receiver<Snapshot>>>,
    errs: mpsc::UnboundedSender<TransportError>,
    transport: Arc<dyn RecordSender>,
    num_retries: u32,
    cancel: CancellationToken,
) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(snapshot) = job else {
            debug!(id, "worker done");
            return;
        };

        debug!(id, count = snapshot.len(), "worker picked up snapshot");
        for record in &snapshot {
            let result = retry(&cancel, num_retries, || transport.send(record)).await;
            if let Err(err) = result {
                // Failure of one record never aborts the batch
                let _ = errs.send(err);
            }
        }
    }
}

/// Re-invoke `submit` up to `num_retries` times after the initial attempt,
/// waiting `i + 2` seconds before attempt `i`. Aborts as soon as the
/// cancellation token trips, returning the last error.
pub async fn retry<F, Fut, E>(
    cancel: &CancellationToken,
    num_retries: u32,
    mut submit: F,
) -> Result<(), E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
{
    let mut last_err = match submit().await {
        Ok(()) => return Ok(()),
        Err(err) => err,
    };

    for attempt in 1..=num_retries {
        let delay = Duration::from_secs(u64::from(attempt) + 2);
        tokio::select! {
            _ = cancel.cancelled() => return Err(last_err),
            _ = tokio::time::sleep(delay) => {}
        }

        debug!(attempt, "retrying send");
        match submit().await {
            Ok(()) => return Ok(()),
            Err(err) => last_err = err,
        }
    }

    Err(last_err)
}
