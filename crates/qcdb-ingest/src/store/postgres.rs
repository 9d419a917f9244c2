//! PostgreSQL store backed by a sqlx pool

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

use super::{ColumnValue, JobStore, Row, StoreResult};
use crate::config::DbConfig;
use crate::schema::{quote_ident, ColumnSpec, TableSchema};

/// Store handle with an explicit open/close lifecycle
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(config: &DbConfig) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        tracing::info!(
            max_connections = config.max_connections,
            min_connections = config.min_connections,
            "Database connection pool created"
        );

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the pool, waiting for checked-out connections to be returned
    pub async fn close(&self) {
        self.pool.close().await;
        tracing::debug!("Database connection pool closed");
    }
}

fn push_value(qb: &mut QueryBuilder<'_, Postgres>, value: &ColumnValue) {
    match value {
        ColumnValue::Null => {
            qb.push("NULL");
        },
        ColumnValue::Text(v) => {
            qb.push_bind(v.clone());
        },
        ColumnValue::Float(v) => {
            qb.push_bind(*v);
        },
        ColumnValue::Int(v) => {
            qb.push_bind(*v);
        },
        ColumnValue::Bool(v) => {
            qb.push_bind(*v);
        },
        ColumnValue::Timestamp(v) => {
            qb.push_bind(*v);
        },
        ColumnValue::Json(v) => {
            qb.push_bind(Json(v.clone()));
        },
    }
}

#[async_trait]
impl JobStore for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn create_table(&self, schema: &TableSchema) -> StoreResult<()> {
        sqlx::query(&schema.create_sql()).execute(&self.pool).await?;
        Ok(())
    }

    async fn live_columns(&self, table: &str) -> StoreResult<Vec<String>> {
        let columns: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_schema = current_schema() AND table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table)
        .fetch_all(&self.pool)
        .await?;

        Ok(columns)
    }

    async fn add_column(&self, table: &str, column: &ColumnSpec) -> StoreResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
            quote_ident(table),
            column.add_definition()
        );
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn insert(&self, table: &str, row: &Row, returning: Option<&str>) -> StoreResult<Option<i64>> {
        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {}", quote_ident(table)));

        if row.is_empty() {
            qb.push(" DEFAULT VALUES");
        } else {
            qb.push(" (");
            let mut columns = qb.separated(", ");
            for column in row.columns() {
                columns.push(quote_ident(column));
            }
            qb.push(") VALUES (");
            for (i, (_, value)) in row.iter().enumerate() {
                if i > 0 {
                    qb.push(", ");
                }
                push_value(&mut qb, value);
            }
            qb.push(")");
        }

        let Some(key) = returning else {
            qb.build().execute(&self.pool).await?;
            return Ok(None);
        };

        qb.push(" RETURNING ").push(quote_ident(key));
        let id: Option<i32> = qb.build_query_scalar().fetch_optional(&self.pool).await?;
        Ok(id.map(i64::from))
    }

    async fn update(&self, table: &str, row: &Row, key_column: &str, key: i64) -> StoreResult<u64> {
        if row.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", quote_ident(table)));
        for (i, (column, value)) in row.iter().enumerate() {
            if i > 0 {
                qb.push(", ");
            }
            qb.push(quote_ident(column)).push(" = ");
            push_value(&mut qb, value);
        }
        qb.push(" WHERE ")
            .push(quote_ident(key_column))
            .push(" = ")
            .push_bind(key);

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn exists(&self, table: &str, key_column: &str, key: i64) -> StoreResult<bool> {
        let sql = format!(
            "SELECT EXISTS (SELECT 1 FROM {} WHERE {} = $1)",
            quote_ident(table),
            quote_ident(key_column)
        );
        let found: bool = sqlx::query_scalar(&sql).bind(key).fetch_one(&self.pool).await?;
        Ok(found)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::schema::{jobs_schema, migrate, status_schema};
    use qcdb_common::Package;

    async fn connect() -> PgStore {
        let config = DbConfig::from_env().expect("DATABASE_URL must be set for database tests");
        PgStore::connect(&config).await.unwrap()
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_migrate_is_idempotent() {
        let store = connect().await;
        migrate(&store, Package::Orca).await.unwrap();
        let second = migrate(&store, Package::Orca).await.unwrap();
        assert!(second.added.is_empty());

        let live = store.live_columns("orca_jobs").await.unwrap();
        let expected: Vec<String> = jobs_schema(Package::Orca)
            .column_names()
            .map(String::from)
            .collect();
        for column in expected {
            assert!(live.contains(&column), "missing {column}");
        }
        store.close().await;
    }

    #[tokio::test]
    #[ignore] // Requires database
    async fn test_insert_returning_and_update() {
        let store = connect().await;
        migrate(&store, Package::Vasp).await.unwrap();

        let job = Row::new()
            .with("package", "vasp")
            .with("user_id", "pg-test")
            .with("sys_name", "si")
            .with("efermi", None::<f64>)
            .with("kpoints", serde_json::json!([[0.0, 0.0, 0.0]]));
        let job_id = store.insert("vasp_jobs", &job, Some("job_id")).await.unwrap().unwrap();

        let status = status_schema(Package::Vasp);
        let row = Row::new().with("job_id", job_id).with("status", "RUNNING");
        store.insert(&status.name, &row, None).await.unwrap();
        assert!(store.exists(&status.name, "job_id", job_id).await.unwrap());

        let touched = store
            .update(&status.name, &Row::new().with("status", "COMPLETED"), "job_id", job_id)
            .await
            .unwrap();
        assert_eq!(touched, 1);
        store.close().await;
    }
}
