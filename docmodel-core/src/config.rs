//! Connection configuration.
//!
//! [`ConnectionConfig`] names the store address and the database to select. It derives
//! `Deserialize`, so applications can embed it in their own configuration files, or it
//! can be read from the `MONGODB_URI` / `MONGODB_NAME` environment variables.
//!
//! [`ConnectOptions`] carries client tuning knobs. Unset fields leave the driver defaults
//! in place.

use serde::{Deserialize, Serialize};
use std::{env, time::Duration};

use crate::error::{StoreError, StoreResult};

/// Environment variable holding the store address.
pub const URI_ENV: &str = "MONGODB_URI";
/// Environment variable holding the database name.
pub const DATABASE_ENV: &str = "MONGODB_NAME";

/// Store address plus selected database.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    pub uri: String,
    #[serde(alias = "db")]
    pub database: String,
}

impl ConnectionConfig {
    pub fn new(uri: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: database.into(),
        }
    }

    /// Reads the configuration from [`URI_ENV`] and [`DATABASE_ENV`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Initialization`] if either variable is missing or empty.
    pub fn from_env() -> StoreResult<Self> {
        Ok(Self::new(read_env(URI_ENV)?, read_env(DATABASE_ENV)?))
    }
}

fn read_env(key: &str) -> StoreResult<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(StoreError::Initialization(format!("{key} is not set"))),
    }
}

/// Client options applied on top of the driver defaults.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Application name reported to the server.
    pub app_name: Option<String>,
    /// Upper bound of pooled connections per server.
    pub max_pool_size: Option<u32>,
    /// Connections kept open per server while idle.
    pub min_pool_size: Option<u32>,
    /// Time allowed to establish a single connection.
    pub connect_timeout: Option<Duration>,
    /// Time allowed to find a suitable server before an operation fails.
    pub server_selection_timeout: Option<Duration>,
}

impl ConnectOptions {
    pub fn builder() -> ConnectOptionsBuilder {
        ConnectOptionsBuilder::default()
    }
}

/// Builder for [`ConnectOptions`].
#[derive(Debug, Clone, Default)]
pub struct ConnectOptionsBuilder {
    options: ConnectOptions,
}

impl ConnectOptionsBuilder {
    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.options.app_name = Some(app_name.into());
        self
    }

    pub fn with_max_pool_size(mut self, size: u32) -> Self {
        self.options.max_pool_size = Some(size);
        self
    }

    pub fn with_min_pool_size(mut self, size: u32) -> Self {
        self.options.min_pool_size = Some(size);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.options.connect_timeout = Some(timeout);
        self
    }

    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.options.server_selection_timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ConnectOptions {
        self.options
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_accepts_db_alias() {
        let config: ConnectionConfig =
            serde_json::from_str(r#"{ "uri": "mongodb://localhost:27017", "db": "app" }"#).unwrap();

        assert_eq!(config, ConnectionConfig::new("mongodb://localhost:27017", "app"));
    }

    #[test]
    fn test_connect_options_builder() {
        let options = ConnectOptions::builder()
            .with_app_name("api")
            .with_max_pool_size(16)
            .build();

        assert_eq!(options.app_name.as_deref(), Some("api"));
        assert_eq!(options.max_pool_size, Some(16));
        assert_eq!(options.connect_timeout, None);
    }
}
