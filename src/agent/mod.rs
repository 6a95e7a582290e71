//! Telemetry agent
//!
//! The agent reacts to two independent timers: the poll tick samples host
//! statistics into a shared snapshot accumulator, the report tick drains
//! the accumulator and hands the snapshot to the dispatcher. One root
//! cancellation token stops the control loop, the workers, and every
//! in-flight retry.

pub mod collect;
pub mod dispatch;

pub use collect::CollectError;
pub use dispatch::Dispatcher;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use sysinfo::System;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::AgentConfig;
use crate::transport::RecordSender;
use crate::{MetricRecord, Snapshot};

/// Send retries per record after the initial attempt.
const SEND_RETRIES: u32 = 3;

/// Agent context: the only agent-side mutable shared state.
///
/// Sampling and draining may run concurrently; every append goes through
/// the one accumulator lock.
#[derive(Default)]
pub struct Agent {
    snapshot: Mutex<Snapshot>,
}

impl Agent {
    pub fn new() -> Self {
        Self::default()
    }

    fn append(&self, records: impl IntoIterator<Item = MetricRecord>) {
        let mut snapshot = match self.snapshot.lock() {
            Ok(snapshot) => snapshot,
            Err(poisoned) => poisoned.into_inner(),
        };
        snapshot.extend(records);
    }

    /// Take the current snapshot, leaving the accumulator empty.
    pub fn drain(&self) -> Snapshot {
        let mut snapshot = match self.snapshot.lock() {
            Ok(snapshot) => snapshot,
            Err(poisoned) => poisoned.into_inner(),
        };
        std::mem::take(&mut *snapshot)
    }
}

/// Poll/report control loop; returns only on cancellation or a fatal
/// sampling error.
pub async fn run(
    config: &AgentConfig,
    transport: Arc<dyn RecordSender>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let agent = Agent::new();
    let (dispatcher, mut send_errors) =
        Dispatcher::spawn(transport, config.rate_limit, SEND_RETRIES, cancel.clone());

    let mut sys = System::new_all();
    let mut poll = tokio::time::interval(Duration::from_secs(config.poll_interval));
    let mut report = tokio::time::interval(Duration::from_secs(config.report_interval));
    // Skip the immediate first firing of both tickers
    poll.tick().await;
    report.tick().await;

    info!(
        poll = config.poll_interval,
        report = config.report_interval,
        workers = config.rate_limit.saturating_sub(1).max(1),
        "agent started"
    );

    let result = loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("shutting down agent");
                break Ok(());
            }
            _ = poll.tick() => {
                agent.sample_runtime(&mut sys);
                if let Err(err) = agent.sample_process(&mut sys) {
                    // The OS-level source is essential; escalate
                    break Err(anyhow::Error::new(err));
                }
                debug!("metrics sampled");
            }
            _ = report.tick() => {
                let snapshot = agent.drain();
                if snapshot.is_empty() {
                    continue;
                }
                debug!(count = snapshot.len(), "snapshot queued for delivery");
                // Blocks when the job queue is full: sampling throttles
                // until delivery catches up
                dispatcher.push(snapshot).await;
            }
            Some(err) = send_errors.recv() => {
                warn!("failed to deliver record: {err}");
            }
        }
    };

    cancel.cancel();
    dispatcher.shutdown().await;
    result
}
