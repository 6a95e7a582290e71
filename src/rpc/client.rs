//! Agent-side RPC transport
//!
//! Opens one connection per send, mirroring the HTTP transport's
//! one-request-per-record behavior so the dispatcher's failure isolation
//! holds regardless of which transport is configured.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use prost::Message;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use super::{rpc_request::Call, to_wire, RpcRequest, RpcResponse, UpdateMetricRequest, UpdateMetricsRequest};
use crate::transport::{RecordSender, TransportError};
use crate::{MetricRecord, Snapshot};

pub struct RpcTransport {
    address: String,
}

impl RpcTransport {
    pub fn new(address: &str) -> Self {
        Self {
            address: address.to_string(),
        }
    }

    async fn call(&self, request: RpcRequest) -> Result<(), TransportError> {
        let stream = TcpStream::connect(&self.address).await?;
        let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

        framed.send(request.encode_to_vec().into()).await?;

        let frame = framed
            .next()
            .await
            .ok_or_else(|| {
                TransportError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed before response",
                ))
            })??;

        let response = RpcResponse::decode(frame.as_ref()).map_err(|err| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                err.to_string(),
            ))
        })?;

        if !response.ok {
            return Err(TransportError::Remote(response.error));
        }
        Ok(())
    }

    /// Send a whole snapshot as one `UpdateMetrics` call.
    pub async fn send_batch(&self, snapshot: &Snapshot) -> Result<(), TransportError> {
        self.call(RpcRequest {
            call: Some(Call::UpdateBatch(UpdateMetricsRequest {
                metrics: snapshot.iter().map(to_wire).collect(),
            })),
        })
        .await
    }
}

#[async_trait]
impl RecordSender for RpcTransport {
    async fn send(&self, record: &MetricRecord) -> Result<(), TransportError> {
        self.call(RpcRequest {
            call: Some(Call::Update(UpdateMetricRequest {
                metric: Some(to_wire(record)),
            })),
        })
        .await
    }
}
