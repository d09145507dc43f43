//! Schema management for the six backing tables.
//!
//! Statements are rendered from templates with `{{prefix}}` and one
//! placeholder per canonical bucket (`{{meta}}`, `{{users}}`, ...), then run
//! strictly one after another. The first failure aborts the rest; nothing is
//! rolled back, and re-running `create_tables` recovers because every drop is
//! `IF EXISTS`.

use crate::{
    buckets::{BucketNames, BucketRole, TablePrefix},
    error::AclResult,
    repository::RowStore,
};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use tracing::{debug, info};

/// Value seeded into the meta rows. `meta` is a set bucket, so the seed is
/// an empty set.
pub const META_SEED_VALUE: &str = "[]";

#[derive(Debug, Clone, Copy)]
enum Step {
    Drop(BucketRole),
    Create(BucketRole),
    Seed(BucketRole, &'static str),
}

const DOWN_SQL: [(Step, &str); 6] = [
    (Step::Drop(BucketRole::Meta), r#"DROP TABLE IF EXISTS "{{prefix}}{{meta}}";"#),
    (Step::Drop(BucketRole::Resources), r#"DROP TABLE IF EXISTS "{{prefix}}{{resources}}";"#),
    (Step::Drop(BucketRole::Parents), r#"DROP TABLE IF EXISTS "{{prefix}}{{parents}}";"#),
    (Step::Drop(BucketRole::Users), r#"DROP TABLE IF EXISTS "{{prefix}}{{users}}";"#),
    (Step::Drop(BucketRole::Roles), r#"DROP TABLE IF EXISTS "{{prefix}}{{roles}}";"#),
    (Step::Drop(BucketRole::Permissions), r#"DROP TABLE IF EXISTS "{{prefix}}{{permissions}}";"#),
];

const UP_SQL: [(Step, &str); 8] = [
    (
        Step::Create(BucketRole::Meta),
        r#"CREATE TABLE "{{prefix}}{{meta}}" (id SERIAL PRIMARY KEY, acl_key TEXT NOT NULL, acl_value TEXT NOT NULL);"#,
    ),
    (
        Step::Seed(BucketRole::Meta, "users"),
        r#"INSERT INTO "{{prefix}}{{meta}}" (acl_key, acl_value) VALUES ('users', '[]');"#,
    ),
    (
        Step::Seed(BucketRole::Meta, "roles"),
        r#"INSERT INTO "{{prefix}}{{meta}}" (acl_key, acl_value) VALUES ('roles', '[]');"#,
    ),
    (
        Step::Create(BucketRole::Resources),
        r#"CREATE TABLE "{{prefix}}{{resources}}" (id SERIAL PRIMARY KEY, acl_key TEXT NOT NULL, acl_value TEXT NOT NULL);"#,
    ),
    (
        Step::Create(BucketRole::Parents),
        r#"CREATE TABLE "{{prefix}}{{parents}}" (id SERIAL PRIMARY KEY, acl_key TEXT NOT NULL, acl_value TEXT NOT NULL);"#,
    ),
    (
        Step::Create(BucketRole::Roles),
        r#"CREATE TABLE "{{prefix}}{{roles}}" (id SERIAL PRIMARY KEY, acl_key TEXT NOT NULL, acl_value TEXT NOT NULL);"#,
    ),
    (
        Step::Create(BucketRole::Users),
        r#"CREATE TABLE "{{prefix}}{{users}}" (id SERIAL PRIMARY KEY, acl_key TEXT NOT NULL, acl_value TEXT NOT NULL);"#,
    ),
    (
        Step::Create(BucketRole::Permissions),
        r#"CREATE TABLE "{{prefix}}{{permissions}}" (id SERIAL PRIMARY KEY, acl_key TEXT NOT NULL, acl_value TEXT NOT NULL);"#,
    ),
];

/// What a statement does, for row stores that do not speak SQL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatementKind {
    DropTable { table: String },
    CreateTable { table: String },
    Seed { table: String, key: String, value: String },
}

/// A rendered schema statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub kind: StatementKind,
    pub sql: String,
}

#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("placeholder pattern is valid"));

/// Replace every `{{name}}` placeholder that `lookup` knows. Unknown
/// placeholders are left as they are.
pub fn render<'a, F>(template: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<&'a str>,
{
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let whole = caps.get(0).map_or("", |m| m.as_str());
            caps.get(1)
                .and_then(|name| lookup(name.as_str()))
                .unwrap_or(whole)
                .to_string()
        })
        .into_owned()
}

/// Creates and drops the backing tables for one prefix and alias table
#[derive(Debug, Clone)]
pub struct SchemaManager {
    prefix: TablePrefix,
    names: BucketNames,
}

impl SchemaManager {
    pub fn new(prefix: TablePrefix, names: BucketNames) -> Self {
        Self { prefix, names }
    }

    fn lookup(&self, name: &str) -> Option<&str> {
        if name == "prefix" {
            return Some(self.prefix.as_str());
        }
        BucketRole::from_name(name).map(|role| self.names.suffix(role))
    }

    fn statement(&self, step: Step, template: &str) -> Statement {
        let kind = match step {
            Step::Drop(role) => StatementKind::DropTable {
                table: self.prefix.table(self.names.suffix(role)),
            },
            Step::Create(role) => StatementKind::CreateTable {
                table: self.prefix.table(self.names.suffix(role)),
            },
            Step::Seed(role, key) => StatementKind::Seed {
                table: self.prefix.table(self.names.suffix(role)),
                key: key.to_string(),
                value: META_SEED_VALUE.to_string(),
            },
        };

        Statement {
            kind,
            sql: render(template, |name| self.lookup(name)),
        }
    }

    /// Drop statements for all six tables
    pub fn down_statements(&self) -> Vec<Statement> {
        DOWN_SQL
            .iter()
            .map(|(step, template)| self.statement(*step, template))
            .collect()
    }

    /// Drop, then create all six tables and seed the meta rows
    pub fn up_statements(&self) -> Vec<Statement> {
        DOWN_SQL
            .iter()
            .chain(UP_SQL.iter())
            .map(|(step, template)| self.statement(*step, template))
            .collect()
    }

    /// # Errors
    /// Returns the error of the first statement that fails; later statements
    /// are not run.
    pub async fn create_tables(&self, rows: &dyn RowStore) -> AclResult<()> {
        execute_statements(rows, &self.up_statements()).await?;
        info!(prefix = self.prefix.as_str(), "ACL tables created");
        Ok(())
    }

    /// # Errors
    /// Returns the error of the first statement that fails.
    pub async fn drop_tables(&self, rows: &dyn RowStore) -> AclResult<()> {
        execute_statements(rows, &self.down_statements()).await?;
        info!(prefix = self.prefix.as_str(), "ACL tables dropped");
        Ok(())
    }
}

async fn execute_statements(rows: &dyn RowStore, statements: &[Statement]) -> AclResult<()> {
    for statement in statements {
        debug!("Executing schema statement: {}", statement.sql);
        rows.execute(statement).await?;
    }
    Ok(())
}
