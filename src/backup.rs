//! Periodic backup and startup restore
//!
//! The manager dumps the whole store to a JSON file on a fixed interval
//! and once more on graceful shutdown. Restore runs exactly once, before
//! the server starts accepting connections; a corrupt file is the
//! distinguished non-fatal [`BackupError::Restore`] so the server can boot
//! empty instead of aborting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::service::MetricService;
use crate::MetricRecord;

#[derive(Debug)]
pub enum BackupError {
    Io(std::io::Error),

    /// The backup file exists but does not decode
    Restore(serde_json::Error),
}

impl std::fmt::Display for BackupError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupError::Io(err) => write!(f, "backup file I/O failed: {}", err),
            BackupError::Restore(err) => write!(f, "error restoring from file: {}", err),
        }
    }
}

impl std::error::Error for BackupError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BackupError::Io(err) => Some(err),
            BackupError::Restore(err) => Some(err),
        }
    }
}

pub struct BackupManager {
    service: MetricService,
    path: PathBuf,
    interval: Duration,
}

impl BackupManager {
    pub fn new(service: MetricService, path: PathBuf, interval_secs: u64) -> Self {
        Self {
            service,
            path,
            interval: Duration::from_secs(interval_secs),
        }
    }

    /// Tick until cancelled, then write one final backup.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        // The first tick of a tokio interval fires immediately; skip it so
        // an empty boot-time store never races the restore that fed it.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.write().await {
                        error!("periodic backup failed: {err}");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("writing final backup before shutdown");
                    if let Err(err) = self.write().await {
                        error!("final backup failed: {err}");
                    }
                    return;
                }
            }
        }
    }

    /// Dump the store to the backup file.
    ///
    /// An empty store skips the write entirely, so a freshly restored file
    /// is never clobbered before the first save arrives.
    pub async fn write(&self) -> Result<(), BackupError> {
        let records = match self.service.get_all().await {
            Ok(records) => records,
            Err(err) => {
                warn!("skipping backup, store unreadable: {err}");
                return Ok(());
            }
        };

        if records.is_empty() {
            return Ok(());
        }

        let encoded = serde_json::to_vec(&records).map_err(BackupError::Restore)?;
        tokio::fs::write(&self.path, encoded)
            .await
            .map_err(BackupError::Io)?;

        info!(count = records.len(), path = %self.path.display(), "backup written");
        Ok(())
    }
}

/// Read and decode the backup file.
///
/// Called once at startup when restore is enabled. A missing file is an
/// `Io` error, a present-but-corrupt file is `Restore`; both are treated
/// as "start empty" by the server.
pub fn restore(path: impl AsRef<Path>) -> Result<Vec<MetricRecord>, BackupError> {
    let contents = std::fs::read(path.as_ref()).map_err(BackupError::Io)?;
    let records = serde_json::from_slice(&contents).map_err(BackupError::Restore)?;
    info!(
        path = %path.as_ref().display(),
        "restored metrics from backup file"
    );
    Ok(records)
}
