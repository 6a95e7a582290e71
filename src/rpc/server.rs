//! RPC listener
//!
//! Accept loop plus one task per connection. Each frame is a prost
//! `RpcRequest`; the reply mirrors the HTTP error taxonomy: validation
//! failures come back as `ok = false` with a reason, storage failures
//! likewise, and the connection stays open for the next frame.
//!
//! The trusted-subnet check applies here the same way it does on the HTTP
//! side, except at connection granularity: an outside peer gets one
//! rejection frame and the connection is closed.

use futures::{SinkExt, StreamExt};
use ipnet::IpNet;
use prost::Message;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{from_wire, rpc_request::Call, RpcRequest, RpcResponse};
use crate::service::MetricService;
use crate::MetricRecord;

pub async fn serve(
    address: &str,
    trusted_subnet: Option<IpNet>,
    service: MetricService,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address).await?;
    serve_with_listener(listener, trusted_subnet, service, cancel).await
}

/// Accept loop over an already-bound listener.
pub async fn serve_with_listener(
    listener: TcpListener,
    trusted_subnet: Option<IpNet>,
    service: MetricService,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    if let Ok(address) = listener.local_addr() {
        info!("rpc listening on {address}");
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("rpc server stopped");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;

                if let Some(subnet) = trusted_subnet {
                    if !subnet.contains(&peer.ip()) {
                        warn!(%peer, "rejected rpc connection from outside the trusted subnet");
                        tokio::spawn(reject_connection(stream));
                        continue;
                    }
                }

                debug!(%peer, "rpc connection accepted");
                let service = service.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if let Err(err) = handle_connection(stream, service, cancel).await {
                        warn!(%peer, "rpc connection failed: {err}");
                    }
                });
            }
        }
    }
}

/// Best-effort rejection frame for an untrusted peer, then close.
async fn reject_connection(stream: TcpStream) {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());
    let response = failure("request from this ip-address was rejected".to_string());
    let _ = framed.send(response.encode_to_vec().into()).await;
}

async fn handle_connection(
    stream: TcpStream,
    service: MetricService,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return Ok(()),
            frame = framed.next() => match frame {
                Some(frame) => frame?,
                None => return Ok(()),
            },
        };

        let response = match RpcRequest::decode(frame.as_ref()) {
            Ok(request) => dispatch(&service, request).await,
            Err(err) => failure(format!("undecodable frame: {err}")),
        };

        framed
            .send(response.encode_to_vec().into())
            .await?;
    }
}

async fn dispatch(service: &MetricService, request: RpcRequest) -> RpcResponse {
    match request.call {
        Some(Call::Update(update)) => {
            let Some(wire) = update.metric else {
                return failure("missing metric".to_string());
            };
            match from_wire(&wire) {
                Ok(record) => save_one(service, record).await,
                Err(reason) => failure(reason),
            }
        }
        Some(Call::UpdateBatch(batch)) => {
            let mut records = Vec::with_capacity(batch.metrics.len());
            for wire in &batch.metrics {
                match from_wire(wire) {
                    Ok(record) => records.push(record),
                    Err(reason) => return failure(reason),
                }
            }
            match service.save_all(&records).await {
                Ok(()) => RpcResponse {
                    ok: true,
                    error: String::new(),
                },
                Err(err) => failure(err.to_string()),
            }
        }
        None => failure("empty request".to_string()),
    }
}

async fn save_one(service: &MetricService, record: MetricRecord) -> RpcResponse {
    match service.save(&record).await {
        Ok(()) => RpcResponse {
            ok: true,
            error: String::new(),
        },
        Err(err) => failure(err.to_string()),
    }
}

fn failure(reason: String) -> RpcResponse {
    RpcResponse {
        ok: false,
        error: reason,
    }
}
