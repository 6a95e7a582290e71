use std::sync::Arc;

use clap::Parser;
use metrion::backup::{self, BackupError, BackupManager};
use metrion::config::ServerConfig;
use metrion::server::{self, IngressConfig};
use metrion::service::MetricService;
use metrion::storage::{MemoryStorage, Storage};
use metrion::transport::crypto;
use metrion::MetricRecord;
use tokio_util::sync::CancellationToken;
use tracing::{info, level_filters::LevelFilter, trace, warn};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

fn init() {
    dotenv::dotenv().ok();

    let filter = filter::Targets::new().with_targets(vec![
        ("metrion", LevelFilter::INFO),
        ("server", LevelFilter::INFO),
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
    let config = ServerConfig::parse();
    trace!("started with config: {config:?}");
    info!(version = env!("CARGO_PKG_VERSION"), "starting metrion server");

    // Restore runs once, before anything serves; a configured database is
    // the durable store, so the file is only consulted for memory storage
    let restored = if config.wants_file_restore() {
        match backup::restore(&config.file_storage_path) {
            Ok(records) => records,
            Err(BackupError::Restore(err)) => {
                warn!("backup file unreadable, starting empty: {err}");
                Vec::new()
            }
            Err(BackupError::Io(err)) => {
                info!("no backup file to restore ({err}), starting empty");
                Vec::new()
            }
        }
    } else {
        Vec::new()
    };

    let storage = build_storage(&config, &restored).await?;
    let service = MetricService::new(storage);

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received");
        signal_cancel.cancel();
    });

    let backup_manager = BackupManager::new(
        service.clone(),
        config.file_storage_path.clone(),
        config.store_interval,
    );
    let backup_task = tokio::spawn(backup_manager.run(cancel.clone()));

    let rpc_task = config.rpc_address.as_ref().map(|address| {
        let address = address.clone();
        let trusted_subnet = config.trusted_subnet;
        let service = service.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            metrion::rpc::server::serve(&address, trusted_subnet, service, cancel).await
        })
    });

    let private_key = match &config.crypto_key {
        Some(path) => Some(Arc::new(crypto::load_private_key(path)?)),
        None => None,
    };
    let ingress = IngressConfig {
        key: config.key.clone(),
        private_key,
        trusted_subnet: config.trusted_subnet,
    };

    let app = server::router(service, ingress);
    server::serve(&config.address, app, cancel.clone()).await?;

    // The final backup writes during shutdown; wait for it
    let _ = backup_task.await;
    if let Some(rpc_task) = rpc_task {
        let _ = rpc_task.await;
    }

    info!("server stopped");
    Ok(())
}

async fn build_storage(
    config: &ServerConfig,
    restored: &[MetricRecord],
) -> anyhow::Result<Arc<dyn Storage>> {
    #[cfg(feature = "storage-postgres")]
    if let Some(dsn) = &config.database_dsn {
        let storage = metrion::storage::PostgresStorage::connect(dsn).await?;
        return Ok(Arc::new(storage));
    }

    #[cfg(not(feature = "storage-postgres"))]
    if config.database_dsn.is_some() {
        anyhow::bail!("built without postgres support; unset DATABASE_DSN");
    }

    Ok(Arc::new(MemoryStorage::from_records(restored)))
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
