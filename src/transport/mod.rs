//! Shared wire codec and agent-side transports
//!
//! Everything that touches bytes on the way between agent and server lives
//! here: serialization, signing, encryption, compression, and the HTTP
//! client the dispatcher workers use. The server's ingestion middleware
//! applies the same primitives in mirror order.
//!
//! ## Pipeline order
//!
//! Outbound: serialize → HMAC over plaintext → RSA encrypt → gzip.
//! Inbound: gunzip → RSA decrypt → verify HMAC → deserialize.
//!
//! The MAC is always computed over the pre-compression, pre-encryption
//! serialized bytes and travels hex-encoded in the `HashSHA256` header.

pub mod codec;
pub mod crypto;
pub mod http;

pub use codec::{CodecError, OutboundCodec, SealedPayload};
pub use http::HttpTransport;

use async_trait::async_trait;

use crate::MetricRecord;

/// Name of the header carrying the hex-encoded payload MAC.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Name of the header carrying the agent's own source address.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Failure to deliver a record to the server.
///
/// Transport errors are retried with bounded backoff by the dispatcher and
/// then dropped; they are never fatal to the agent.
#[derive(Debug)]
pub enum TransportError {
    Codec(CodecError),
    Http(reqwest::Error),
    Rejected(u16),
    Remote(String),
    Io(std::io::Error),
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Codec(err) => write!(f, "failed to encode payload: {}", err),
            TransportError::Http(err) => write!(f, "request failed: {}", err),
            TransportError::Rejected(status) => {
                write!(f, "server rejected payload with status {}", status)
            }
            TransportError::Remote(reason) => {
                write!(f, "server rejected payload: {}", reason)
            }
            TransportError::Io(err) => write!(f, "connection error: {}", err),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Codec(err) => Some(err),
            TransportError::Http(err) => Some(err),
            TransportError::Io(err) => Some(err),
            TransportError::Rejected(_) | TransportError::Remote(_) => None,
        }
    }
}

impl From<CodecError> for TransportError {
    fn from(err: CodecError) -> Self {
        TransportError::Codec(err)
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        TransportError::Http(err)
    }
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(err)
    }
}

/// A way to deliver one metric record to the server.
///
/// Implemented by [`HttpTransport`] and [`crate::rpc::RpcTransport`]; the
/// dispatcher workers only see this trait.
#[async_trait]
pub trait RecordSender: Send + Sync {
    async fn send(&self, record: &MetricRecord) -> Result<(), TransportError>;
}
