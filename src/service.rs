//! Storage-agnostic metric business rules
//!
//! The service owns the overwrite-vs-accumulate decision and the record
//! validation; both front-ends (HTTP and RPC) call into it through thin
//! adapters that carry no logic of their own.

use std::sync::Arc;

use crate::storage::{Storage, StorageError};
use crate::{MetricKind, MetricRecord};

#[derive(Debug)]
pub enum ServiceError {
    /// Record kind did not match any known metric type
    InvalidMetricType,

    /// The value field required by the kind was missing or malformed
    InvalidValue,

    /// No metric stored under the requested (id, kind)
    NotFound,

    Storage(StorageError),
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::InvalidMetricType => write!(f, "invalid metric type"),
            ServiceError::InvalidValue => write!(f, "invalid metric value"),
            ServiceError::NotFound => write!(f, "metric not found"),
            ServiceError::Storage(err) => write!(f, "storage error: {}", err),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ServiceError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound => ServiceError::NotFound,
            other => ServiceError::Storage(other),
        }
    }
}

#[derive(Clone)]
pub struct MetricService {
    storage: Arc<dyn Storage>,
}

impl MetricService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    /// Persist one record: gauges overwrite, counters accumulate.
    pub async fn save(&self, record: &MetricRecord) -> Result<(), ServiceError> {
        if record.id.is_empty() {
            return Err(ServiceError::InvalidValue);
        }
        match record.kind {
            MetricKind::Gauge => {
                let value = record.value.ok_or(ServiceError::InvalidValue)?;
                self.storage.set_gauge(&record.id, value).await?;
            }
            MetricKind::Counter => {
                let delta = record.delta.ok_or(ServiceError::InvalidValue)?;
                self.storage.set_counter(&record.id, delta).await?;
            }
        }
        Ok(())
    }

    /// Persist a batch atomically; validation failures abort before any
    /// record reaches the backend.
    pub async fn save_all(&self, records: &[MetricRecord]) -> Result<(), ServiceError> {
        for record in records {
            if record.id.is_empty() {
                return Err(ServiceError::InvalidValue);
            }
            let populated = match record.kind {
                MetricKind::Gauge => record.value.is_some(),
                MetricKind::Counter => record.delta.is_some(),
            };
            if !populated {
                return Err(ServiceError::InvalidValue);
            }
        }
        self.storage.set_all(records).await?;
        Ok(())
    }

    /// Current stored value for (id, kind) as a full wire record.
    pub async fn retrieve(&self, id: &str, kind: MetricKind) -> Result<MetricRecord, ServiceError> {
        match kind {
            MetricKind::Gauge => {
                let value = self.storage.get_gauge(id).await?;
                Ok(MetricRecord::gauge(id, value))
            }
            MetricKind::Counter => {
                let delta = self.storage.get_counter(id).await?;
                Ok(MetricRecord::counter(id, delta))
            }
        }
    }

    /// Consistent dump of the whole store.
    pub async fn get_all(&self) -> Result<Vec<MetricRecord>, ServiceError> {
        Ok(self.storage.get_all().await?)
    }

    pub async fn ping_storage(&self) -> Result<(), ServiceError> {
        Ok(self.storage.ping().await?)
    }
}
