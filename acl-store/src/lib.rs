//! Relational storage backend for access-control rule sets
//!
//! Persists users, roles, resources, parent links and permission grants for
//! an access-control engine, behind a small bucket-oriented key/value
//! contract ([`AclBackend`]).
//!
//! # Record shapes
//!
//! - **Set buckets** (`users`, `roles`, `parents`, ...): one row per key; the
//!   value is a JSON array with no duplicates.
//! - **Permission buckets** (any name containing `allows`): one row per
//!   bucket in the permissions table; the value is a JSON object mapping a
//!   resource to its set of permissions.
//!
//! # Example
//!
//! ```rust,no_run
//! use acl_store::{AclBackend, AclConfig, BucketStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AclConfig::load(Some("acl.toml"))?;
//!     let store = BucketStore::connect(&config).await?;
//!     store.setup().await?;
//!
//!     let mut tx = store.begin();
//!     store.add(&mut tx, "users", "alice", ["admin"])?;
//!     store.add(&mut tx, "roles_allows_admin", "blogs", ["read", "write"])?;
//!     store.end(tx).await?;
//!
//!     let roles = store.get("users", "alice").await?;
//!     println!("alice: {:?}", roles);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod buckets;
pub mod config;
pub mod error;
pub mod repository;
pub mod schema;
pub mod store;
pub mod transaction;
pub mod values;

pub use backend::AclBackend;
pub use buckets::{BucketDescriptor, BucketKind, BucketNames, TablePrefix};
pub use config::{AclConfig, ConnectionSettings};
pub use error::{AclError, AclResult};
pub use repository::{InMemoryRowStore, PostgresRowStore, RowStore};
pub use schema::SchemaManager;
pub use store::BucketStore;
pub use transaction::{Command, Transaction};
pub use values::{AclKey, AclValue, Keys, Values};
