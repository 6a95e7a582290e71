use std::sync::Arc;

use clap::Parser;
use metrion::config::{AgentConfig, TransportKind};
use metrion::rpc::RpcTransport;
use metrion::transport::codec::OutboundCodec;
use metrion::transport::{crypto, HttpTransport, RecordSender};
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrion", LevelFilter::DEBUG),
        ("agent", LevelFilter::DEBUG),
    ]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init();
    let config = AgentConfig::parse();
    trace!("started with config: {config:?}");

    let public_key = match &config.crypto_key {
        Some(path) => Some(crypto::load_public_key(path)?),
        None => None,
    };

    let transport: Arc<dyn RecordSender> = match config.transport {
        TransportKind::Http => {
            let codec = OutboundCodec::new(config.key.clone(), public_key);
            Arc::new(HttpTransport::new(&config.address, codec)?)
        }
        TransportKind::Rpc => Arc::new(RpcTransport::new(&config.address)),
    };

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    metrion::agent::run(&config, transport, cancel).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
