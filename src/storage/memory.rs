//! In-memory storage backend
//!
//! Two hash maps guarded by one `RwLock`. Point reads take the read lock;
//! writes, batches, and `get_all` take the write lock so a dump or batch
//! can never observe a half-applied write. Durability comes from the
//! backup manager, which feeds `from_records` at the next boot.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::error::{StorageError, StorageResult};
use super::Storage;
use crate::{MetricKind, MetricRecord};

#[derive(Debug, Default)]
struct Maps {
    gauge: HashMap<String, f64>,
    counter: HashMap<String, i64>,
}

impl Maps {
    fn apply(&mut self, record: &MetricRecord) {
        match record.kind {
            MetricKind::Gauge => {
                if let Some(value) = record.value {
                    self.gauge.insert(record.id.clone(), value);
                }
            }
            MetricKind::Counter => {
                if let Some(delta) = record.delta {
                    let entry = self.counter.entry(record.id.clone()).or_insert(0);
                    *entry = entry.wrapping_add(delta);
                }
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    maps: RwLock<Maps>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the store from restored backup records.
    ///
    /// Restored counters are absolute values, not deltas, so they are
    /// inserted rather than accumulated.
    pub fn from_records(records: &[MetricRecord]) -> Self {
        let mut maps = Maps::default();
        for record in records {
            match record.kind {
                MetricKind::Gauge => {
                    if let Some(value) = record.value {
                        maps.gauge.insert(record.id.clone(), value);
                    }
                }
                MetricKind::Counter => {
                    if let Some(delta) = record.delta {
                        maps.counter.insert(record.id.clone(), delta);
                    }
                }
            }
        }
        Self {
            maps: RwLock::new(maps),
        }
    }
}

fn poisoned(_: impl std::fmt::Display) -> StorageError {
    StorageError::Backend("storage lock poisoned".to_string())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn set_gauge(&self, id: &str, value: f64) -> StorageResult<()> {
        let mut maps = self.maps.write().map_err(poisoned)?;
        maps.gauge.insert(id.to_string(), value);
        Ok(())
    }

    async fn set_counter(&self, id: &str, delta: i64) -> StorageResult<()> {
        let mut maps = self.maps.write().map_err(poisoned)?;
        // Counters wrap on overflow rather than panic or saturate
        let entry = maps.counter.entry(id.to_string()).or_insert(0);
        *entry = entry.wrapping_add(delta);
        Ok(())
    }

    async fn get_gauge(&self, id: &str) -> StorageResult<f64> {
        let maps = self.maps.read().map_err(poisoned)?;
        maps.gauge.get(id).copied().ok_or(StorageError::NotFound)
    }

    async fn get_counter(&self, id: &str) -> StorageResult<i64> {
        let maps = self.maps.read().map_err(poisoned)?;
        maps.counter.get(id).copied().ok_or(StorageError::NotFound)
    }

    async fn set_all(&self, records: &[MetricRecord]) -> StorageResult<()> {
        // One critical section for the whole batch
        let mut maps = self.maps.write().map_err(poisoned)?;
        for record in records {
            maps.apply(record);
        }
        Ok(())
    }

    async fn get_all(&self) -> StorageResult<Vec<MetricRecord>> {
        let maps = self.maps.write().map_err(poisoned)?;
        let mut records = Vec::with_capacity(maps.gauge.len() + maps.counter.len());
        for (id, value) in &maps.gauge {
            records.push(MetricRecord::gauge(id.clone(), *value));
        }
        for (id, delta) in &maps.counter {
            records.push(MetricRecord::counter(id.clone(), *delta));
        }
        Ok(records)
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn gauge_overwrites() {
        let storage = MemoryStorage::new();
        storage.set_gauge("Alloc", 1.0).await.unwrap();
        storage.set_gauge("Alloc", 2.5).await.unwrap();
        assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 2.5);
    }

    #[tokio::test]
    async fn counter_accumulates() {
        let storage = MemoryStorage::new();
        storage.set_counter("Hits", 5).await.unwrap();
        storage.set_counter("Hits", 7).await.unwrap();
        assert_eq!(storage.get_counter("Hits").await.unwrap(), 12);
    }

    #[tokio::test]
    async fn counter_wraps_on_overflow() {
        let storage = MemoryStorage::new();
        storage.set_counter("Hits", i64::MAX).await.unwrap();
        storage.set_counter("Hits", 1).await.unwrap();
        assert_eq!(storage.get_counter("Hits").await.unwrap(), i64::MIN);

        storage
            .set_all(&[MetricRecord::counter("Hits", -1)])
            .await
            .unwrap();
        assert_eq!(storage.get_counter("Hits").await.unwrap(), i64::MAX);
    }

    #[tokio::test]
    async fn missing_metric_is_not_found() {
        let storage = MemoryStorage::new();
        assert_matches!(storage.get_gauge("nope").await, Err(StorageError::NotFound));
        assert_matches!(
            storage.get_counter("nope").await,
            Err(StorageError::NotFound)
        );
    }

    #[tokio::test]
    async fn restore_inserts_counters_verbatim() {
        let storage = MemoryStorage::from_records(&[
            MetricRecord::counter("Hits", 12),
            MetricRecord::gauge("Alloc", 123.5),
        ]);
        assert_eq!(storage.get_counter("Hits").await.unwrap(), 12);
        assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 123.5);
    }

    #[tokio::test]
    async fn batch_applies_save_semantics() {
        let storage = MemoryStorage::new();
        storage.set_counter("Hits", 1).await.unwrap();
        storage
            .set_all(&[
                MetricRecord::counter("Hits", 2),
                MetricRecord::gauge("Alloc", 9.0),
                MetricRecord::gauge("Alloc", 10.0),
            ])
            .await
            .unwrap();
        assert_eq!(storage.get_counter("Hits").await.unwrap(), 3);
        assert_eq!(storage.get_gauge("Alloc").await.unwrap(), 10.0);
    }
}
