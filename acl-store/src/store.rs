//! Bucket store: the runtime adapter behind [`AclBackend`].
//!
//! Commands of one transaction run strictly in order, each finishing its
//! read-modify-write before the next starts, so later commands see the
//! effects of earlier ones. Nothing serialises separate transactions: two
//! concurrent `end` calls touching the same row each read, merge and write
//! on their own, and the later write wins (lost update). Callers that need
//! more must serialise writers themselves.

use crate::{
    backend::AclBackend,
    buckets::{BucketDescriptor, BucketKind, BucketNames, TablePrefix},
    config::AclConfig,
    error::AclResult,
    repository::{PostgresRowStore, RowStore},
    schema::SchemaManager,
    transaction::{Command, Transaction},
    values::{self, AclKey, AclValue, Keys, PermissionMap, Values},
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Bucket store bound to one row store, prefix and alias table
pub struct BucketStore {
    rows: Arc<dyn RowStore>,
    prefix: TablePrefix,
    names: BucketNames,
    schema: SchemaManager,
}

impl BucketStore {
    /// # Errors
    /// Returns a contract violation when the prefix or an alias cannot be
    /// used in a table name.
    pub fn new(rows: Arc<dyn RowStore>, prefix: Option<&str>, names: BucketNames) -> AclResult<Self> {
        names.validate()?;
        let prefix = TablePrefix::resolve(prefix)?;
        let schema = SchemaManager::new(prefix.clone(), names.clone());

        Ok(Self {
            rows,
            prefix,
            names,
            schema,
        })
    }

    /// Store with the default prefix and canonical table names
    pub fn with_defaults(rows: Arc<dyn RowStore>) -> Self {
        let prefix = TablePrefix::default();
        let names = BucketNames::default();
        let schema = SchemaManager::new(prefix.clone(), names.clone());

        Self {
            rows,
            prefix,
            names,
            schema,
        }
    }

    /// Connect to PostgreSQL using `config`
    ///
    /// # Errors
    /// Returns configuration errors for incomplete connection settings and
    /// storage errors when the database is unreachable.
    pub async fn connect(config: &AclConfig) -> AclResult<Self> {
        let pool = config.connection.connect().await?;
        Self::new(
            Arc::new(PostgresRowStore::new(pool)),
            config.prefix.as_deref(),
            config.buckets.clone(),
        )
    }

    pub fn prefix(&self) -> &TablePrefix {
        &self.prefix
    }

    pub fn schema(&self) -> &SchemaManager {
        &self.schema
    }

    /// Classify a bucket name against this store's prefix and aliases
    ///
    /// # Errors
    /// Returns a contract violation for unusable bucket names.
    pub fn describe(&self, bucket: &str) -> AclResult<BucketDescriptor> {
        BucketDescriptor::classify(bucket, &self.prefix, &self.names)
    }

    /// # Errors
    /// Returns storage errors, or a serialization error for a corrupt row.
    pub async fn get(&self, bucket: &str, key: impl Into<AclKey>) -> AclResult<Vec<AclValue>> {
        let desc = self.describe(bucket)?;
        let key = key.into();

        match desc.kind {
            BucketKind::Permission => Ok(self
                .permission_map(&desc)
                .await?
                .map(|map| map.get(&key))
                .unwrap_or_default()),
            BucketKind::Set => match self.rows.select(&desc.table, key.as_str()).await? {
                Some(row) => values::parse_set(&row.value),
                None => Ok(Vec::new()),
            },
        }
    }

    /// Union of the sets stored under `keys`, ordered by first occurrence
    /// across the keys in list order.
    ///
    /// # Errors
    /// Returns storage errors, or a serialization error for a corrupt row.
    pub async fn union(&self, bucket: &str, keys: impl Into<Keys>) -> AclResult<Vec<AclValue>> {
        let desc = self.describe(bucket)?;
        let keys = keys.into().into_vec();
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        match desc.kind {
            BucketKind::Permission => Ok(self
                .permission_map(&desc)
                .await?
                .map(|map| map.union(&keys))
                .unwrap_or_default()),
            BucketKind::Set => {
                let rows = self.rows.select_in(&desc.table, &key_strings(&keys)).await?;
                let mut sets = Vec::with_capacity(rows.len());
                for key in &keys {
                    for row in rows.iter().filter(|r| r.key == key.as_str()) {
                        sets.push(values::parse_set(&row.value)?);
                    }
                }
                Ok(values::union(sets))
            }
        }
    }

    /// Queue a union of `values` into the set at `key`
    ///
    /// # Errors
    /// Returns a contract violation for a bad bucket name or mixed values.
    pub fn add(
        &self,
        transaction: &mut Transaction,
        bucket: &str,
        key: impl Into<AclKey>,
        values: impl Into<Values>,
    ) -> AclResult<()> {
        self.describe(bucket)?;
        let values = values.into().into_checked()?;
        transaction.push(Command::Add {
            bucket: bucket.to_string(),
            key: key.into(),
            values,
        });
        Ok(())
    }

    /// Queue deletion of `keys`
    ///
    /// # Errors
    /// Returns a contract violation for a bad bucket name.
    pub fn del(&self, transaction: &mut Transaction, bucket: &str, keys: impl Into<Keys>) -> AclResult<()> {
        self.describe(bucket)?;
        transaction.push(Command::Delete {
            bucket: bucket.to_string(),
            keys: keys.into().into_vec(),
        });
        Ok(())
    }

    /// Queue removal of `values` from the set at `key`
    ///
    /// # Errors
    /// Returns a contract violation for a bad bucket name or mixed values.
    pub fn remove(
        &self,
        transaction: &mut Transaction,
        bucket: &str,
        key: impl Into<AclKey>,
        values: impl Into<Values>,
    ) -> AclResult<()> {
        self.describe(bucket)?;
        let values = values.into().into_checked()?;
        transaction.push(Command::Remove {
            bucket: bucket.to_string(),
            key: key.into(),
            values,
        });
        Ok(())
    }

    /// Run every command in order. A failing command does not stop the
    /// ones after it; the last error seen is returned.
    ///
    /// # Errors
    /// Returns the error of the last command that failed.
    pub async fn end(&self, transaction: Transaction) -> AclResult<()> {
        debug!("Ending transaction with {} commands", transaction.len());

        let mut last_error = None;
        for (step, command) in transaction.into_iter().enumerate() {
            if let Err(e) = self.execute(&command).await {
                warn!(
                    step,
                    op = command.name(),
                    bucket = command.bucket(),
                    error = %e,
                    "Transaction step failed"
                );
                last_error = Some(e);
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Apply a single command
    ///
    /// # Errors
    /// Returns contract violations for bad bucket names, storage errors, and
    /// serialization errors for corrupt rows.
    pub async fn execute(&self, command: &Command) -> AclResult<()> {
        let desc = self.describe(command.bucket())?;
        debug!("Executing {} on {} ({:?})", command.name(), desc.table, desc.kind);

        match command {
            Command::Add { key, values, .. } => self.apply_add(&desc, key, values).await,
            Command::Delete { keys, .. } => self.apply_delete(&desc, keys).await,
            Command::Remove { key, values, .. } => self.apply_remove(&desc, key, values).await,
        }
    }

    async fn permission_map(&self, desc: &BucketDescriptor) -> AclResult<Option<PermissionMap>> {
        match self.rows.select(&desc.table, &desc.bucket).await? {
            Some(row) => Ok(Some(PermissionMap::parse(&row.value)?)),
            None => Ok(None),
        }
    }

    async fn apply_add(&self, desc: &BucketDescriptor, key: &AclKey, incoming: &[AclValue]) -> AclResult<()> {
        // Adding nothing never creates a row
        if incoming.is_empty() {
            return Ok(());
        }
        match desc.kind {
            BucketKind::Permission => match self.permission_map(desc).await? {
                Some(mut map) => {
                    map.add(key, incoming.to_vec());
                    self.rows.update(&desc.table, &desc.bucket, &map.encode()?).await
                }
                None => {
                    let mut map = PermissionMap::default();
                    map.add(key, incoming.to_vec());
                    self.rows.insert(&desc.table, &desc.bucket, &map.encode()?).await
                }
            },
            BucketKind::Set => match self.rows.select(&desc.table, key.as_str()).await? {
                Some(row) => {
                    let mut set = values::parse_set(&row.value)?;
                    values::union_into(&mut set, incoming.iter().cloned());
                    self.rows
                        .update(&desc.table, key.as_str(), &values::encode_set(&set)?)
                        .await
                }
                None => {
                    let set = values::union([incoming.to_vec()]);
                    self.rows
                        .insert(&desc.table, key.as_str(), &values::encode_set(&set)?)
                        .await
                }
            },
        }
    }

    async fn apply_delete(&self, desc: &BucketDescriptor, keys: &[AclKey]) -> AclResult<()> {
        match desc.kind {
            BucketKind::Permission => {
                let Some(mut map) = self.permission_map(desc).await? else {
                    return Ok(());
                };
                map.delete(keys);
                if map.is_empty() {
                    self.rows.delete_in(&desc.table, &[desc.bucket.clone()]).await
                } else {
                    self.rows.update(&desc.table, &desc.bucket, &map.encode()?).await
                }
            }
            BucketKind::Set => {
                if keys.is_empty() {
                    return Ok(());
                }
                self.rows.delete_in(&desc.table, &key_strings(keys)).await
            }
        }
    }

    async fn apply_remove(&self, desc: &BucketDescriptor, key: &AclKey, removed: &[AclValue]) -> AclResult<()> {
        match desc.kind {
            BucketKind::Permission => {
                let Some(mut map) = self.permission_map(desc).await? else {
                    return Ok(());
                };
                map.remove(key, removed);
                self.rows.update(&desc.table, &desc.bucket, &map.encode()?).await
            }
            BucketKind::Set => {
                let Some(row) = self.rows.select(&desc.table, key.as_str()).await? else {
                    return Ok(());
                };
                let remaining = values::difference(values::parse_set(&row.value)?, removed);
                if remaining.is_empty() {
                    self.rows
                        .delete_in(&desc.table, &[key.as_str().to_string()])
                        .await
                } else {
                    self.rows
                        .update(&desc.table, key.as_str(), &values::encode_set(&remaining)?)
                        .await
                }
            }
        }
    }
}

fn key_strings(keys: &[AclKey]) -> Vec<String> {
    keys.iter().map(|k| k.as_str().to_string()).collect()
}

#[async_trait]
impl AclBackend for BucketStore {
    async fn setup(&self) -> AclResult<()> {
        self.schema.create_tables(self.rows.as_ref()).await
    }

    async fn teardown(&self) -> AclResult<()> {
        self.schema.drop_tables(self.rows.as_ref()).await
    }

    fn begin(&self) -> Transaction {
        Transaction::new()
    }

    async fn end(&self, transaction: Transaction) -> AclResult<()> {
        BucketStore::end(self, transaction).await
    }

    async fn clean(&self) -> AclResult<()> {
        debug!("clean is a no-op for the SQL backend");
        Ok(())
    }

    async fn get(&self, bucket: &str, key: AclKey) -> AclResult<Vec<AclValue>> {
        BucketStore::get(self, bucket, key).await
    }

    async fn union(&self, bucket: &str, keys: Keys) -> AclResult<Vec<AclValue>> {
        BucketStore::union(self, bucket, keys).await
    }

    fn add(&self, transaction: &mut Transaction, bucket: &str, key: AclKey, values: Values) -> AclResult<()> {
        BucketStore::add(self, transaction, bucket, key, values)
    }

    fn del(&self, transaction: &mut Transaction, bucket: &str, keys: Keys) -> AclResult<()> {
        BucketStore::del(self, transaction, bucket, keys)
    }

    fn remove(&self, transaction: &mut Transaction, bucket: &str, key: AclKey, values: Values) -> AclResult<()> {
        BucketStore::remove(self, transaction, bucket, key, values)
    }
}

impl std::fmt::Debug for BucketStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BucketStore")
            .field("prefix", &self.prefix)
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryRowStore;

    async fn store() -> BucketStore {
        let store = BucketStore::with_defaults(Arc::new(InMemoryRowStore::new()));
        store.setup().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_commands_see_earlier_commands_in_the_same_transaction() {
        let store = store().await;

        let mut tx = store.begin();
        store.add(&mut tx, "users", "alice", "admin").unwrap();
        store.add(&mut tx, "users", "alice", ["editor", "admin"]).unwrap();
        store.remove(&mut tx, "users", "alice", "admin").unwrap();
        store.end(tx).await.unwrap();

        let roles = store.get("users", "alice").await.unwrap();
        assert_eq!(roles, vec![AclValue::from("editor")]);
    }

    #[tokio::test]
    async fn test_add_validates_before_queueing() {
        let store = store().await;
        let mut tx = store.begin();

        let err = store
            .add(&mut tx, "users", "alice", vec![AclValue::from("a"), AclValue::from(1)])
            .unwrap_err();
        assert!(err.is_contract_violation());
        assert!(store.add(&mut tx, "", "alice", "a").is_err());
        assert!(tx.is_empty(), "rejected calls leave the transaction untouched");
    }

    #[tokio::test]
    async fn test_execute_single_command() {
        let store = store().await;
        let command = Command::Add {
            bucket: "parents".to_string(),
            key: AclKey::from("child"),
            values: vec![AclValue::from("parent")],
        };
        store.execute(&command).await.unwrap();
        assert_eq!(
            store.get("parents", "child").await.unwrap(),
            vec![AclValue::from("parent")]
        );
    }
}
