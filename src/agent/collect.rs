//! Host statistic sampling
//!
//! The allow-list of runtime gauges is a static table of name/accessor
//! pairs over the refreshed [`System`]; there is no runtime reflection.
//! Two synthetic series ride along on every successful tick: `RandomValue`
//! (fresh uniform value) and `PollCount` (+1), which the server side uses
//! to detect a stalled agent.

use sysinfo::System;
use tracing::warn;

use super::Agent;
use crate::MetricRecord;

/// Fixed allow-list of system statistics exported as gauges.
const RUNTIME_GAUGES: &[(&str, fn(&System) -> f64)] = &[
    ("UsedMemory", |s| s.used_memory() as f64),
    ("AvailableMemory", |s| s.available_memory() as f64),
    ("TotalSwap", |s| s.total_swap() as f64),
    ("UsedSwap", |s| s.used_swap() as f64),
    ("CpuCount", |s| s.cpus().len() as f64),
    ("ProcessCount", |s| s.processes().len() as f64),
    ("LoadAverage1", |_| System::load_average().one),
    ("LoadAverage5", |_| System::load_average().five),
    ("LoadAverage15", |_| System::load_average().fifteen),
    ("Uptime", |_| System::uptime() as f64),
];

/// Sampling failure escalated to the control loop.
#[derive(Debug)]
pub enum CollectError {
    /// The OS reported no usable CPU statistics
    CpuUnavailable,
}

impl std::fmt::Display for CollectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CollectError::CpuUnavailable => {
                write!(f, "no CPU statistics available from the OS")
            }
        }
    }
}

impl std::error::Error for CollectError {}

impl Agent {
    /// Sample the allow-list plus the agent's own process statistics.
    ///
    /// A failed read of the process entry soft-fails: the tick contributes
    /// an empty snapshot rather than aborting the agent.
    pub fn sample_runtime(&self, sys: &mut System) {
        sys.refresh_all();

        let own_process = sysinfo::get_current_pid()
            .ok()
            .and_then(|pid| sys.process(pid));
        let Some(own_process) = own_process else {
            warn!("could not read own process statistics; skipping tick");
            return;
        };

        let mut records: Vec<MetricRecord> = RUNTIME_GAUGES
            .iter()
            .map(|(name, accessor)| MetricRecord::gauge(*name, accessor(sys)))
            .collect();

        records.push(MetricRecord::gauge(
            "OwnMemory",
            own_process.memory() as f64,
        ));
        records.push(MetricRecord::gauge(
            "OwnVirtualMemory",
            own_process.virtual_memory() as f64,
        ));

        records.push(MetricRecord::gauge("RandomValue", rand::random::<f64>()));
        records.push(MetricRecord::counter("PollCount", 1));

        self.append(records);
    }

    /// Sample extended OS statistics: total memory, free memory, CPU
    /// utilization. Failure here is fatal to the control loop.
    pub fn sample_process(&self, sys: &mut System) -> Result<(), CollectError> {
        if sys.cpus().is_empty() {
            return Err(CollectError::CpuUnavailable);
        }

        self.append([
            MetricRecord::gauge("TotalMemory", sys.total_memory() as f64),
            MetricRecord::gauge("FreeMemory", sys.free_memory() as f64),
            MetricRecord::gauge("CPUutilization1", sys.global_cpu_usage() as f64),
        ]);
        Ok(())
    }
}
