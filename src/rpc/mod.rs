//! Binary RPC surface
//!
//! A second, equivalent front-end next to HTTP: `UpdateMetric` (single
//! record) and `UpdateMetrics` (batch) over prost-encoded frames with
//! length-delimited framing on plain TCP. The message structs below are
//! the fixed wire contract; the tagged union deliberately carries an
//! `Unspecified` kind so a zero-valued field decodes to something the
//! server can reject rather than misread.

pub mod client;
pub mod server;

pub use client::RpcTransport;

use crate::{MetricKind, MetricRecord};

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum WireKind {
    Unspecified = 0,
    Gauge = 1,
    Counter = 2,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct WireMetric {
    #[prost(string, tag = "1")]
    pub id: String,

    #[prost(enumeration = "WireKind", tag = "2")]
    pub kind: i32,

    #[prost(double, tag = "3")]
    pub value: f64,

    #[prost(sint64, tag = "4")]
    pub delta: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricRequest {
    #[prost(message, optional, tag = "1")]
    pub metric: Option<WireMetric>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct UpdateMetricsRequest {
    #[prost(message, repeated, tag = "1")]
    pub metrics: Vec<WireMetric>,
}

/// One frame from agent to server.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcRequest {
    #[prost(oneof = "rpc_request::Call", tags = "1, 2")]
    pub call: Option<rpc_request::Call>,
}

pub mod rpc_request {
    #[derive(Clone, PartialEq, prost::Oneof)]
    pub enum Call {
        #[prost(message, tag = "1")]
        Update(super::UpdateMetricRequest),

        #[prost(message, tag = "2")]
        UpdateBatch(super::UpdateMetricsRequest),
    }
}

/// One frame from server to agent.
#[derive(Clone, PartialEq, prost::Message)]
pub struct RpcResponse {
    #[prost(bool, tag = "1")]
    pub ok: bool,

    /// Human-readable failure reason when `ok` is false.
    #[prost(string, tag = "2")]
    pub error: String,
}

/// Translate a wire metric into the canonical record.
///
/// `Unspecified` (or any unknown enum value) is rejected here, before the
/// service ever sees the record.
pub fn from_wire(metric: &WireMetric) -> Result<MetricRecord, String> {
    match WireKind::try_from(metric.kind) {
        Ok(WireKind::Gauge) => Ok(MetricRecord::gauge(metric.id.clone(), metric.value)),
        Ok(WireKind::Counter) => Ok(MetricRecord::counter(metric.id.clone(), metric.delta)),
        Ok(WireKind::Unspecified) | Err(_) => {
            Err(format!("unknown metric type: {}", metric.kind))
        }
    }
}

pub fn to_wire(record: &MetricRecord) -> WireMetric {
    match record.kind {
        MetricKind::Gauge => WireMetric {
            id: record.id.clone(),
            kind: WireKind::Gauge as i32,
            value: record.value.unwrap_or_default(),
            delta: 0,
        },
        MetricKind::Counter => WireMetric {
            id: record.id.clone(),
            kind: WireKind::Counter as i32,
            value: 0.0,
            delta: record.delta.unwrap_or_default(),
        },
    }
}
