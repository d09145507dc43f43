use crate::{
    error::{AclError, AclResult},
    schema::{Statement, StatementKind},
};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use tracing::debug;

pub mod postgres;

pub use postgres::PostgresRowStore;

/// One `(acl_key, acl_value)` row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRow {
    pub key: String,
    pub value: String,
}

/// Relational operations the bucket store needs from a database connection.
///
/// Every table has the shape `(id, acl_key, acl_value)`; lookups are equality
/// or IN filters on `acl_key`, and rows come back in insertion order.
#[async_trait]
pub trait RowStore: Send + Sync {
    /// First row whose key equals `key`
    async fn select(&self, table: &str, key: &str) -> AclResult<Option<StoredRow>>;

    /// All rows whose key is in `keys`
    async fn select_in(&self, table: &str, keys: &[String]) -> AclResult<Vec<StoredRow>>;

    async fn insert(&self, table: &str, key: &str, value: &str) -> AclResult<()>;

    /// Overwrite the value of every row whose key equals `key`
    async fn update(&self, table: &str, key: &str, value: &str) -> AclResult<()>;

    /// Delete every row whose key is in `keys`
    async fn delete_in(&self, table: &str, keys: &[String]) -> AclResult<()>;

    /// Run one schema statement
    async fn execute(&self, statement: &Statement) -> AclResult<()>;
}

#[derive(Debug, Clone)]
struct MemoryRow {
    id: i64,
    key: String,
    value: String,
}

/// In-memory row store for testing and development
pub struct InMemoryRowStore {
    tables: Arc<DashMap<String, Vec<MemoryRow>>>,
    next_id: AtomicI64,
}

impl InMemoryRowStore {
    pub fn new() -> Self {
        Self {
            tables: Arc::new(DashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    fn missing(table: &str) -> AclError {
        AclError::Storage(format!("relation \"{}\" does not exist", table))
    }

    /// Names of the tables that currently exist
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.key().clone()).collect();
        names.sort();
        names
    }

    /// Snapshot of a table's rows, `None` if the table does not exist
    pub fn rows(&self, table: &str) -> Option<Vec<StoredRow>> {
        self.tables.get(table).map(|rows| {
            rows.iter()
                .map(|r| StoredRow {
                    key: r.key.clone(),
                    value: r.value.clone(),
                })
                .collect()
        })
    }
}

impl Default for InMemoryRowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RowStore for InMemoryRowStore {
    async fn select(&self, table: &str, key: &str) -> AclResult<Option<StoredRow>> {
        let rows = self.tables.get(table).ok_or_else(|| Self::missing(table))?;
        Ok(rows
            .iter()
            .filter(|r| r.key == key)
            .min_by_key(|r| r.id)
            .map(|r| StoredRow {
                key: r.key.clone(),
                value: r.value.clone(),
            }))
    }

    async fn select_in(&self, table: &str, keys: &[String]) -> AclResult<Vec<StoredRow>> {
        let rows = self.tables.get(table).ok_or_else(|| Self::missing(table))?;
        Ok(rows
            .iter()
            .filter(|r| keys.contains(&r.key))
            .map(|r| StoredRow {
                key: r.key.clone(),
                value: r.value.clone(),
            })
            .collect())
    }

    async fn insert(&self, table: &str, key: &str, value: &str) -> AclResult<()> {
        let mut rows = self.tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        rows.push(MemoryRow {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn update(&self, table: &str, key: &str, value: &str) -> AclResult<()> {
        let mut rows = self.tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        for row in rows.iter_mut().filter(|r| r.key == key) {
            row.value = value.to_string();
        }
        Ok(())
    }

    async fn delete_in(&self, table: &str, keys: &[String]) -> AclResult<()> {
        let mut rows = self.tables.get_mut(table).ok_or_else(|| Self::missing(table))?;
        rows.retain(|r| !keys.contains(&r.key));
        Ok(())
    }

    async fn execute(&self, statement: &Statement) -> AclResult<()> {
        debug!("Applying statement in memory: {:?}", statement.kind);
        match &statement.kind {
            StatementKind::DropTable { table } => {
                self.tables.remove(table);
            }
            StatementKind::CreateTable { table } => {
                if self.tables.contains_key(table) {
                    return Err(AclError::Storage(format!(
                        "relation \"{}\" already exists",
                        table
                    )));
                }
                self.tables.insert(table.clone(), Vec::new());
            }
            StatementKind::Seed { table, key, value } => {
                self.insert(table, key, value).await?;
            }
        }
        Ok(())
    }
}
