//! Relational backend: two upsert tables behind a bounded connection pool.

use crate::entities::{counter, gauge};
use crate::error::{Result, StorageError};
use crate::{MetricStorage, PoolConfig};
use async_trait::async_trait;
use migration::{Migrator, MigratorTrait};
use sea_orm::sea_query::{Expr, ExprTrait, OnConflict};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Set,
    TransactionTrait,
};
use statmon_common::types::{Metric, MetricKind, MetricValue, MetricsDump};
use std::collections::BTreeMap;
use std::time::Duration;

/// A ping slower than this is reported as backend-unavailable.
const PING_TIMEOUT: Duration = Duration::from_secs(1);

/// SQL metric store over a SQLite or PostgreSQL DSN.
///
/// Single-row updates are upserts resolved by the database: gauges replace
/// the stored value, counters add to it (`value = value + excluded`), so no
/// read-modify-write race exists. Batches run in one transaction and roll
/// back entirely on any row failure.
pub struct RelationalRepo {
    db: DatabaseConnection,
}

impl RelationalRepo {
    /// Connects with bounded pool settings and runs pending migrations.
    pub async fn connect(dsn: &str, pool: &PoolConfig) -> Result<Self> {
        let mut options = ConnectOptions::new(dsn.to_string());
        options
            .max_connections(pool.max_connections)
            .min_connections(pool.min_connections)
            .connect_timeout(Duration::from_secs(pool.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(pool.idle_timeout_secs))
            .max_lifetime(Duration::from_secs(pool.max_lifetime_secs))
            .sqlx_logging(false);

        let db = Database::connect(options).await?;
        Migrator::up(&db, None).await?;
        Ok(Self { db })
    }

    async fn upsert<C>(conn: &C, id: &str, value: MetricValue) -> Result<()>
    where
        C: ConnectionTrait,
    {
        if id.is_empty() {
            return Err(StorageError::InvalidMetric("metric id is empty".to_string()));
        }

        match value {
            MetricValue::Gauge(v) => {
                let row = gauge::ActiveModel {
                    name: Set(id.to_string()),
                    value: Set(v),
                };
                gauge::Entity::insert(row)
                    .on_conflict(
                        OnConflict::column(gauge::Column::Name)
                            .update_column(gauge::Column::Value)
                            .to_owned(),
                    )
                    .exec_without_returning(conn)
                    .await?;
            }
            MetricValue::Counter(delta) => {
                let row = counter::ActiveModel {
                    name: Set(id.to_string()),
                    value: Set(delta),
                };
                counter::Entity::insert(row)
                    .on_conflict(
                        OnConflict::column(counter::Column::Name)
                            .value(
                                counter::Column::Value,
                                Expr::col(counter::Column::Value).add(delta),
                            )
                            .to_owned(),
                    )
                    .exec_without_returning(conn)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl MetricStorage for RelationalRepo {
    async fn update(&self, id: &str, value: MetricValue) -> Result<()> {
        Self::upsert(&self.db, id, value).await
    }

    async fn update_many(&self, batch: &[Metric]) -> Result<()> {
        let txn = self.db.begin().await?;
        for metric in batch {
            // An error drops the transaction, rolling back the whole batch.
            Self::upsert(&txn, &metric.id, metric.value).await?;
        }
        txn.commit().await?;
        Ok(())
    }

    async fn read(&self, id: &str, kind: MetricKind) -> Result<MetricValue> {
        let value = match kind {
            MetricKind::Gauge => gauge::Entity::find_by_id(id.to_string())
                .one(&self.db)
                .await?
                .map(|row| MetricValue::Gauge(row.value)),
            MetricKind::Counter => counter::Entity::find_by_id(id.to_string())
                .one(&self.db)
                .await?
                .map(|row| MetricValue::Counter(row.value)),
        };
        value.ok_or_else(|| StorageError::NotFound {
            kind,
            id: id.to_string(),
        })
    }

    async fn read_all(&self) -> Result<MetricsDump> {
        let gauges: BTreeMap<String, MetricValue> = gauge::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| (row.name, MetricValue::Gauge(row.value)))
            .collect();
        let counters: BTreeMap<String, MetricValue> = counter::Entity::find()
            .all(&self.db)
            .await?
            .into_iter()
            .map(|row| (row.name, MetricValue::Counter(row.value)))
            .collect();

        let mut dump = MetricsDump::new();
        dump.insert(MetricKind::Gauge, gauges);
        dump.insert(MetricKind::Counter, counters);
        Ok(dump)
    }

    async fn save(&self) -> Result<()> {
        // Rows are durable as soon as their transaction commits.
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        match tokio::time::timeout(PING_TIMEOUT, self.db.ping()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(StorageError::Database(e)),
            Err(_) => Err(StorageError::Unavailable(
                "database ping timed out".to_string(),
            )),
        }
    }

    async fn close(&self) -> Result<()> {
        self.db.clone().close().await?;
        Ok(())
    }
}
