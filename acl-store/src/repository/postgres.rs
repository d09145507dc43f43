//! PostgreSQL-backed row store
//!
//! Table names are interpolated as quoted identifiers; keys and values are
//! always bound as parameters.

use crate::{
    buckets::quote_ident,
    error::{AclError, AclResult},
    repository::{RowStore, StoredRow},
    schema::Statement,
};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use tracing::{debug, error};

/// PostgreSQL-backed row store
#[derive(Clone)]
pub struct PostgresRowStore {
    pool: PgPool,
}

impl PostgresRowStore {
    /// Wrap an existing pool
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create with connection string
    ///
    /// # Errors
    /// Returns a storage error when the pool cannot connect.
    pub async fn from_connection_string(connection_string: &str) -> AclResult<Self> {
        let pool = PgPool::connect(connection_string)
            .await
            .map_err(|e| AclError::Storage(format!("Failed to connect: {}", e)))?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn read_row(row: &sqlx::postgres::PgRow) -> AclResult<StoredRow> {
    Ok(StoredRow {
        key: row.try_get("acl_key")?,
        value: row.try_get("acl_value")?,
    })
}

#[async_trait]
impl RowStore for PostgresRowStore {
    async fn select(&self, table: &str, key: &str) -> AclResult<Option<StoredRow>> {
        debug!("Selecting row: table={}, key={}", table, key);

        let sql = format!(
            "SELECT acl_key, acl_value FROM {} WHERE acl_key = $1 ORDER BY id LIMIT 1",
            quote_ident(table)
        );

        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AclError::Storage(format!("Failed to read row: {}", e)))?;

        row.as_ref().map(read_row).transpose()
    }

    async fn select_in(&self, table: &str, keys: &[String]) -> AclResult<Vec<StoredRow>> {
        debug!("Selecting rows: table={}, keys={:?}", table, keys);

        let sql = format!(
            "SELECT acl_key, acl_value FROM {} WHERE acl_key = ANY($1) ORDER BY id",
            quote_ident(table)
        );

        let rows = sqlx::query(&sql)
            .bind(keys)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AclError::Storage(format!("Failed to read rows: {}", e)))?;

        let rows = rows.iter().map(read_row).collect::<AclResult<Vec<_>>>()?;
        debug!("Found {} rows", rows.len());
        Ok(rows)
    }

    async fn insert(&self, table: &str, key: &str, value: &str) -> AclResult<()> {
        let sql = format!(
            "INSERT INTO {} (acl_key, acl_value) VALUES ($1, $2)",
            quote_ident(table)
        );

        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| AclError::Storage(format!("Failed to insert row: {}", e)))?;

        Ok(())
    }

    async fn update(&self, table: &str, key: &str, value: &str) -> AclResult<()> {
        let sql = format!(
            "UPDATE {} SET acl_value = $2 WHERE acl_key = $1",
            quote_ident(table)
        );

        sqlx::query(&sql)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(|e| AclError::Storage(format!("Failed to update row: {}", e)))?;

        Ok(())
    }

    async fn delete_in(&self, table: &str, keys: &[String]) -> AclResult<()> {
        let sql = format!("DELETE FROM {} WHERE acl_key = ANY($1)", quote_ident(table));

        let result = sqlx::query(&sql)
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(|e| AclError::Storage(format!("Failed to delete rows: {}", e)))?;

        debug!("Deleted {} rows from {}", result.rows_affected(), table);
        Ok(())
    }

    async fn execute(&self, statement: &Statement) -> AclResult<()> {
        sqlx::query(&statement.sql)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Schema statement failed: {}", statement.sql);
                AclError::Storage(format!("Failed to execute statement: {}", e))
            })?;

        Ok(())
    }
}
