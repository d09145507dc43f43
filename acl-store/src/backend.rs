use crate::{
    error::AclResult,
    transaction::Transaction,
    values::{AclKey, AclValue, Keys, Values},
};
use async_trait::async_trait;

/// Storage contract consumed by an access-control engine.
///
/// Reads go straight to storage. Writes are queued into a [`Transaction`]
/// with `add`, `del` and `remove`, which only validate their arguments, and
/// are applied by `end`.
#[async_trait]
pub trait AclBackend: Send + Sync {
    /// Create (or recreate) the backing tables
    async fn setup(&self) -> AclResult<()>;

    /// Drop the backing tables
    async fn teardown(&self) -> AclResult<()>;

    fn begin(&self) -> Transaction;

    /// Apply every queued command in order
    async fn end(&self, transaction: Transaction) -> AclResult<()>;

    async fn clean(&self) -> AclResult<()>;

    async fn get(&self, bucket: &str, key: AclKey) -> AclResult<Vec<AclValue>>;

    async fn union(&self, bucket: &str, keys: Keys) -> AclResult<Vec<AclValue>>;

    fn add(&self, transaction: &mut Transaction, bucket: &str, key: AclKey, values: Values)
        -> AclResult<()>;

    fn del(&self, transaction: &mut Transaction, bucket: &str, keys: Keys) -> AclResult<()>;

    fn remove(
        &self,
        transaction: &mut Transaction,
        bucket: &str,
        key: AclKey,
        values: Values,
    ) -> AclResult<()>;
}
