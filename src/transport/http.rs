//! Agent-side HTTP transport
//!
//! One `POST /update/` per record, matching the per-record failure
//! isolation the dispatcher relies on. A batch endpoint is kept for
//! callers that want the whole snapshot in one request.

use std::net::{IpAddr, UdpSocket};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::codec::{OutboundCodec, SealedPayload};
use super::{RecordSender, TransportError, REAL_IP_HEADER, SIGNATURE_HEADER};
use crate::{MetricRecord, Snapshot};

pub struct HttpTransport {
    client: reqwest::Client,
    update_url: String,
    updates_url: String,
    codec: OutboundCodec,
    source_ip: Option<IpAddr>,
}

impl HttpTransport {
    pub fn new(address: &str, codec: OutboundCodec) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            update_url: format!("http://{address}/update/"),
            updates_url: format!("http://{address}/updates/"),
            codec,
            source_ip: outbound_ip(),
        })
    }

    async fn post(&self, url: &str, sealed: SealedPayload) -> Result<(), TransportError> {
        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("Content-Encoding", "gzip")
            .body(sealed.body);

        if let Some(signature) = sealed.signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        if let Some(ip) = self.source_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Rejected(status.as_u16()));
        }

        debug!(%url, %status, "payload delivered");
        Ok(())
    }

    /// Send the whole snapshot as one `POST /updates/` request.
    pub async fn send_batch(&self, snapshot: &Snapshot) -> Result<(), TransportError> {
        let sealed = self.codec.seal(snapshot)?;
        self.post(&self.updates_url, sealed).await
    }
}

#[async_trait]
impl RecordSender for HttpTransport {
    async fn send(&self, record: &MetricRecord) -> Result<(), TransportError> {
        let sealed = self.codec.seal(record)?;
        self.post(&self.update_url, sealed).await
    }
}

/// Best-effort guess of the address the server will see us from.
///
/// Connecting a UDP socket performs no I/O; it only asks the kernel which
/// local address would be used for the route.
fn outbound_ip() -> Option<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0").ok()?;
    socket.connect("203.0.113.1:9").ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}
