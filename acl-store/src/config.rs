//! Connection and table configuration.
//!
//! Loaded from an optional file overlaid with `ACL__*` environment
//! variables, e.g. `ACL__CONNECTION__URL` or `ACL__BUCKETS__USERS`.

use crate::{
    buckets::BucketNames,
    error::{AclError, AclResult},
};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::info;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5432;

/// Where and how to reach PostgreSQL.
///
/// A non-empty `url` wins over the individual fields.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConnectionSettings {
    pub database: Option<String>,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            database: None,
            username: None,
            password: None,
            host: None,
            port: None,
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 30,
        }
    }
}

impl ConnectionSettings {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// # Errors
    /// Returns a configuration error for an unparsable URL, or when neither a
    /// URL nor both database name and username are given.
    pub fn connect_options(&self) -> AclResult<PgConnectOptions> {
        if let Some(url) = self.url.as_deref().filter(|u| !u.is_empty()) {
            return url
                .parse::<PgConnectOptions>()
                .map_err(|e| AclError::Configuration(format!("invalid database url: {}", e)));
        }

        let database = non_empty(self.database.as_deref())
            .ok_or_else(|| AclError::Configuration("no database name supplied".to_string()))?;
        let username = non_empty(self.username.as_deref())
            .ok_or_else(|| AclError::Configuration("no username supplied".to_string()))?;

        let mut options = PgConnectOptions::new()
            .host(non_empty(self.host.as_deref()).unwrap_or(DEFAULT_HOST))
            .port(self.port.unwrap_or(DEFAULT_PORT))
            .username(username)
            .database(database);

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        Ok(options)
    }

    /// Build a connection pool
    ///
    /// # Errors
    /// Returns a configuration error for incomplete settings, or a storage
    /// error when the database cannot be reached.
    pub async fn connect(&self) -> AclResult<PgPool> {
        let options = self.connect_options()?;

        let pool = PgPoolOptions::new()
            .max_connections(self.max_connections)
            .acquire_timeout(Duration::from_secs(self.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| AclError::Storage(format!("Failed to connect: {}", e)))?;

        info!("ACL database connection pool created");
        Ok(pool)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct AclConfig {
    pub connection: ConnectionSettings,
    /// Table-name prefix; empty or absent means `acl_`
    pub prefix: Option<String>,
    pub buckets: BucketNames,
}

impl AclConfig {
    /// Load from `path` (if given and present) and `ACL__*` variables. A
    /// `.env` file is read first when one exists.
    ///
    /// # Errors
    /// Returns a configuration error for unreadable or mistyped settings.
    pub fn load(path: Option<&str>) -> AclResult<Self> {
        dotenvy::dotenv().ok();

        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("ACL")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Parse settings from TOML text
    ///
    /// # Errors
    /// Returns a configuration error for invalid TOML or mistyped settings.
    pub fn from_toml(text: &str) -> AclResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(text, config::FileFormat::Toml))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
