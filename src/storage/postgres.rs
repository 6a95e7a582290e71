//! Postgres storage backend
//!
//! One `metrics` table keyed by (name, type). Counter saves read the
//! existing delta and upsert the sum inside a transaction to avoid lost
//! updates under concurrent writers; batches run as a single transaction.
//!
//! Startup tolerates a database that is not ready yet: a bounded number of
//! connection attempts with increasing delay, then a fatal error.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{info, warn};

use super::error::{StorageError, StorageResult};
use super::Storage;
use crate::{MetricKind, MetricRecord};

/// Extra connection attempts after the first failure.
const CONNECT_RETRIES: u64 = 3;

pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    /// Connect to the database and run migrations.
    ///
    /// Attempt `i` waits `i + 2` seconds before reconnecting; exhaustion
    /// surfaces as `ConnectionFailed`, which the server treats as a fatal
    /// boot condition.
    pub async fn connect(dsn: &str) -> StorageResult<Self> {
        let mut attempt = 0;
        let pool = loop {
            match PgPoolOptions::new().max_connections(5).connect(dsn).await {
                Ok(pool) => break pool,
                Err(err) => {
                    attempt += 1;
                    if attempt > CONNECT_RETRIES {
                        return Err(StorageError::ConnectionFailed(err.to_string()));
                    }
                    warn!(attempt, "database not ready: {err}");
                    tokio::time::sleep(Duration::from_secs(attempt + 2)).await;
                }
            }
        };

        info!("connected to postgres");

        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self { pool })
    }

    async fn accumulate_counter(
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
        delta: i64,
    ) -> StorageResult<()> {
        let existing: Option<i64> =
            sqlx::query("SELECT delta FROM metrics WHERE name = $1 AND type = 'counter'")
                .bind(id)
                .fetch_optional(&mut **tx)
                .await?
                .and_then(|row| row.get(0));

        sqlx::query(
            "INSERT INTO metrics(name, type, delta) VALUES($1, 'counter', $2) \
             ON CONFLICT (name, type) DO UPDATE SET delta = $2",
        )
        .bind(id)
        .bind(existing.unwrap_or(0).wrapping_add(delta))
        .execute(&mut **tx)
        .await?;

        Ok(())
    }

    async fn upsert_gauge(
        tx: &mut Transaction<'_, Postgres>,
        id: &str,
        value: f64,
    ) -> StorageResult<()> {
        sqlx::query(
            "INSERT INTO metrics(name, type, value) VALUES($1, 'gauge', $2) \
             ON CONFLICT (name, type) DO UPDATE SET value = $2",
        )
        .bind(id)
        .bind(value)
        .execute(&mut **tx)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    async fn set_gauge(&self, id: &str, value: f64) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::upsert_gauge(&mut tx, id, value).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_counter(&self, id: &str, delta: i64) -> StorageResult<()> {
        let mut tx = self.pool.begin().await?;
        Self::accumulate_counter(&mut tx, id, delta).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get_gauge(&self, id: &str) -> StorageResult<f64> {
        let row = sqlx::query("SELECT value FROM metrics WHERE name = $1 AND type = 'gauge'")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        row.get::<Option<f64>, _>(0).ok_or(StorageError::NotFound)
    }

    async fn get_counter(&self, id: &str) -> StorageResult<i64> {
        let row = sqlx::query("SELECT delta FROM metrics WHERE name = $1 AND type = 'counter'")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StorageError::NotFound)?;
        row.get::<Option<i64>, _>(0).ok_or(StorageError::NotFound)
    }

    async fn set_all(&self, records: &[MetricRecord]) -> StorageResult<()> {
        // Whole batch in one transaction; any failure rolls everything back
        let mut tx = self.pool.begin().await?;
        for record in records {
            match record.kind {
                MetricKind::Gauge => {
                    if let Some(value) = record.value {
                        Self::upsert_gauge(&mut tx, &record.id, value).await?;
                    }
                }
                MetricKind::Counter => {
                    if let Some(delta) = record.delta {
                        Self::accumulate_counter(&mut tx, &record.id, delta).await?;
                    }
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_all(&self) -> StorageResult<Vec<MetricRecord>> {
        let rows = sqlx::query("SELECT name, type, value, delta FROM metrics")
            .fetch_all(&self.pool)
            .await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get(0);
            let kind: String = row.get(1);
            match kind.as_str() {
                "gauge" => {
                    if let Some(value) = row.get::<Option<f64>, _>(2) {
                        records.push(MetricRecord::gauge(id, value));
                    }
                }
                "counter" => {
                    if let Some(delta) = row.get::<Option<i64>, _>(3) {
                        records.push(MetricRecord::counter(id, delta));
                    }
                }
                other => {
                    return Err(StorageError::Backend(format!(
                        "unexpected metric type in row: {other}"
                    )));
                }
            }
        }
        Ok(records)
    }

    async fn ping(&self) -> StorageResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
