//! Bucket classification and physical table naming.
//!
//! A bucket whose name contains [`PERMISSION_MARKER`] is a permission bucket:
//! all of its data lives in one row of the permissions table, keyed by the
//! bucket name. Every other bucket is a set bucket with one row per key in
//! its own table.

use crate::error::{AclError, AclResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Substring that marks a bucket name as a permission bucket
pub const PERMISSION_MARKER: &str = "allows";

/// Prefix used when none (or an empty one) is configured
pub const DEFAULT_PREFIX: &str = "acl_";

/// The six canonical buckets that own a backing table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BucketRole {
    Meta,
    Resources,
    Parents,
    Users,
    Roles,
    Permissions,
}

impl BucketRole {
    pub const ALL: [BucketRole; 6] = [
        BucketRole::Meta,
        BucketRole::Resources,
        BucketRole::Parents,
        BucketRole::Users,
        BucketRole::Roles,
        BucketRole::Permissions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Meta => "meta",
            Self::Resources => "resources",
            Self::Parents => "parents",
            Self::Users => "users",
            Self::Roles => "roles",
            Self::Permissions => "permissions",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.name() == name)
    }
}

impl fmt::Display for BucketRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Table-name suffix for each canonical bucket. Unset entries keep the
/// canonical name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketNames {
    pub meta: String,
    pub parents: String,
    pub permissions: String,
    pub resources: String,
    pub roles: String,
    pub users: String,
}

impl Default for BucketNames {
    fn default() -> Self {
        Self {
            meta: "meta".to_string(),
            parents: "parents".to_string(),
            permissions: "permissions".to_string(),
            resources: "resources".to_string(),
            roles: "roles".to_string(),
            users: "users".to_string(),
        }
    }
}

impl BucketNames {
    pub fn suffix(&self, role: BucketRole) -> &str {
        match role {
            BucketRole::Meta => &self.meta,
            BucketRole::Resources => &self.resources,
            BucketRole::Parents => &self.parents,
            BucketRole::Users => &self.users,
            BucketRole::Roles => &self.roles,
            BucketRole::Permissions => &self.permissions,
        }
    }

    /// Table suffix for a set bucket: aliased when canonical, verbatim otherwise.
    pub fn resolve<'a>(&'a self, bucket: &'a str) -> &'a str {
        match BucketRole::from_name(bucket) {
            Some(role) => self.suffix(role),
            None => bucket,
        }
    }

    /// # Errors
    /// Returns a contract violation when an alias is empty or cannot be used
    /// inside a quoted identifier.
    pub fn validate(&self) -> AclResult<()> {
        for role in BucketRole::ALL {
            let suffix = self.suffix(role);
            if suffix.is_empty() {
                return Err(AclError::contract(format!("bucket alias for '{}' is empty", role)));
            }
            check_identifier(suffix)?;
        }
        Ok(())
    }
}

/// Table-name prefix shared by schema management and runtime lookups.
///
/// An absent or empty prefix resolves to [`DEFAULT_PREFIX`] for both, so
/// tables created by `setup` are the tables read and written afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TablePrefix(String);

impl TablePrefix {
    /// # Errors
    /// Returns a contract violation for prefixes that cannot be quoted.
    pub fn resolve(prefix: Option<&str>) -> AclResult<Self> {
        match prefix {
            Some(p) if !p.is_empty() => {
                check_identifier(p)?;
                Ok(Self(p.to_string()))
            }
            _ => Ok(Self(DEFAULT_PREFIX.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn table(&self, suffix: &str) -> String {
        format!("{}{}", self.0, suffix)
    }
}

impl Default for TablePrefix {
    fn default() -> Self {
        Self(DEFAULT_PREFIX.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BucketKind {
    /// One row per key, value is a set
    Set,
    /// One row per bucket, value maps sub-key to a set
    Permission,
}

/// Where a bucket's data lives and in which shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketDescriptor {
    pub kind: BucketKind,
    pub table: String,
    pub bucket: String,
}

impl BucketDescriptor {
    /// Classify `bucket` and resolve its physical table.
    ///
    /// # Errors
    /// Returns a contract violation for an empty bucket name, or for a set
    /// bucket name that cannot be used as a table identifier.
    pub fn classify(bucket: &str, prefix: &TablePrefix, names: &BucketNames) -> AclResult<Self> {
        if bucket.is_empty() {
            return Err(AclError::contract("bucket name must not be empty"));
        }

        if bucket.contains(PERMISSION_MARKER) {
            return Ok(Self {
                kind: BucketKind::Permission,
                table: prefix.table(&names.permissions),
                bucket: bucket.to_string(),
            });
        }

        check_identifier(bucket)?;
        Ok(Self {
            kind: BucketKind::Set,
            table: prefix.table(names.resolve(bucket)),
            bucket: bucket.to_string(),
        })
    }

    pub fn is_permission(&self) -> bool {
        self.kind == BucketKind::Permission
    }
}

fn check_identifier(name: &str) -> AclResult<()> {
    if name.contains('"') || name.contains('\0') {
        return Err(AclError::contract(format!(
            "'{}' cannot be used in a table name",
            name.escape_debug()
        )));
    }
    Ok(())
}

/// Quote a table name for interpolation into SQL.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_buckets_share_the_permissions_table() {
        let prefix = TablePrefix::default();
        let names = BucketNames::default();

        let desc = BucketDescriptor::classify("roles_allows_admin", &prefix, &names).unwrap();
        assert_eq!(desc.kind, BucketKind::Permission);
        assert_eq!(desc.table, "acl_permissions");
        assert_eq!(desc.bucket, "roles_allows_admin");
    }

    #[test]
    fn test_canonical_buckets_go_through_aliases() {
        let prefix = TablePrefix::resolve(Some("app_")).unwrap();
        let names = BucketNames {
            users: "people".to_string(),
            permissions: "grants".to_string(),
            ..BucketNames::default()
        };

        let users = BucketDescriptor::classify("users", &prefix, &names).unwrap();
        assert_eq!(users.kind, BucketKind::Set);
        assert_eq!(users.table, "app_people");

        let custom = BucketDescriptor::classify("groups", &prefix, &names).unwrap();
        assert_eq!(custom.table, "app_groups");

        let allows = BucketDescriptor::classify("allows_blog", &prefix, &names).unwrap();
        assert_eq!(allows.table, "app_grants");
    }

    #[test]
    fn test_empty_prefix_falls_back_to_default() {
        assert_eq!(TablePrefix::resolve(None).unwrap().as_str(), "acl_");
        assert_eq!(TablePrefix::resolve(Some("")).unwrap().as_str(), "acl_");
        assert!(TablePrefix::resolve(Some("bad\"prefix")).is_err());
    }

    #[test]
    fn test_bad_bucket_names_break_contract() {
        let prefix = TablePrefix::default();
        let names = BucketNames::default();
        assert!(BucketDescriptor::classify("", &prefix, &names)
            .unwrap_err()
            .is_contract_violation());
        assert!(BucketDescriptor::classify("users\"; drop", &prefix, &names).is_err());
        // permission bucket names never reach SQL as identifiers
        assert!(BucketDescriptor::classify("allows_\"odd\"", &prefix, &names).is_ok());
    }

    #[test]
    fn test_partial_alias_config_keeps_defaults() {
        let names: BucketNames = serde_json::from_str(r#"{"roles":"acl_roles_v2"}"#).unwrap();
        assert_eq!(names.roles, "acl_roles_v2");
        assert_eq!(names.users, "users");
        assert!(names.validate().is_ok());

        let broken = BucketNames { meta: String::new(), ..BucketNames::default() };
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_quote_ident() {
        assert_eq!(quote_ident("acl_users"), "\"acl_users\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
