//! Connection source for migration sessions.
//!
//! Migrations need a long-held administrative session (schema changes, the
//! advisory lock) that must not be borrowed from the pool serving requests.
//! A [`ConnectionPool`] hands out such sessions already wrapped in a driver.

use may_postgres::Client;

use crate::config::MigrateConfig;
use crate::connection::{self, ConnectionError};
use crate::migration::postgres::read_schema_version;
use crate::migration::{DbError, Driver, DriverConfig, PostgresDriver, SchemaVersion};

/// Source of dedicated migration sessions.
pub trait ConnectionPool {
    type Driver: Driver;

    /// Check out a fresh connection and build a driver on it.
    fn open_driver(&self, config: &DriverConfig) -> Result<Self::Driver, DbError>;
}

impl<P: ConnectionPool + ?Sized> ConnectionPool for &P {
    type Driver = P::Driver;

    fn open_driver(&self, config: &DriverConfig) -> Result<Self::Driver, DbError> {
        (**self).open_driver(config)
    }
}

/// Opens one `may_postgres` client per checkout.
#[derive(Clone)]
pub struct PgPool {
    url: String,
}

impl std::fmt::Debug for PgPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgPool")
            .field("url", &connection::redact(&self.url))
            .finish()
    }
}

impl PgPool {
    pub fn new(url: impl Into<String>) -> Result<Self, ConnectionError> {
        let url = url.into();
        connection::validate_connection_string(&url)?;
        Ok(Self { url })
    }

    /// Uses `database_url` from the configuration.
    pub fn from_config(cfg: &MigrateConfig) -> Result<Self, ConnectionError> {
        match &cfg.database_url {
            Some(url) => Self::new(url.clone()),
            None => Err(ConnectionError::InvalidConnectionString(
                "database_url is not configured".to_string(),
            )),
        }
    }

    /// Raw connection for administrative work, closed when dropped.
    pub fn checkout(&self) -> Result<Client, ConnectionError> {
        log::debug!("opening migration session url={}", connection::redact(&self.url));
        connection::connect(&self.url)
    }

    /// Stored schema version, read on a fresh session without the migration lock.
    pub fn current_version(&self, config: &DriverConfig) -> Result<SchemaVersion, DbError> {
        let client = self.checkout()?;
        read_schema_version(&client, config)
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl ConnectionPool for PgPool {
    type Driver = PostgresDriver;

    fn open_driver(&self, config: &DriverConfig) -> Result<PostgresDriver, DbError> {
        let client = self.checkout()?;
        PostgresDriver::with_client(client, config)
    }
}
