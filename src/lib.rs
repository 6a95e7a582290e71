//! Metrion collects runtime and host telemetry from agent processes and
//! delivers it to a central collector that persists it durably.
//!
//! The crate ships two binaries built from the same library:
//!
//! - `metrion-agent` — samples host statistics on a poll tick and ships
//!   them to the server through a bounded worker pool with retry.
//! - `metrion-server` — ingests metrics over HTTP (axum) and an optional
//!   binary RPC listener, stores them in memory or Postgres, and backs the
//!   store up to a file on a fixed interval.
//!
//! Both sides share one wire model ([`MetricRecord`]) and one codec
//! pipeline (`transport`): serialize → sign → encrypt → compress on the way
//! out, the exact mirror on the way in.

pub mod agent;
pub mod backup;
pub mod config;
pub mod rpc;
pub mod server;
pub mod service;
pub mod storage;
pub mod transport;

use serde::{Deserialize, Serialize};

/// Metric kind carried on the wire and used as part of the storage key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// Point-in-time value; last write wins.
    Gauge,
    /// Accumulator; deltas sum across writes.
    Counter,
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetricKind::Gauge => write!(f, "gauge"),
            MetricKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for MetricKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gauge" => Ok(MetricKind::Gauge),
            "counter" => Ok(MetricKind::Counter),
            _ => Err(()),
        }
    }
}

/// One metric observation as exchanged between agent and server and as
/// persisted in the backup file.
///
/// Exactly one of `value`/`delta` is populated, determined by `kind`:
/// gauges carry `value`, counters carry `delta`. The optionals are skipped
/// during serialization so the JSON shape stays
/// `{"id", "type", "value"?, "delta"?}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: MetricKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<i64>,
}

impl MetricRecord {
    pub fn gauge(id: impl Into<String>, value: f64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Gauge,
            value: Some(value),
            delta: None,
        }
    }

    pub fn counter(id: impl Into<String>, delta: i64) -> Self {
        Self {
            id: id.into(),
            kind: MetricKind::Counter,
            value: None,
            delta: Some(delta),
        }
    }
}

/// The full metric set captured in one sampling round.
pub type Snapshot = Vec<MetricRecord>;
