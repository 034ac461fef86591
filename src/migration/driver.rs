//! The driver seam between the runner and the database.

use std::fmt;

use crate::migration::source::MigrationStep;
use crate::migration::DbError;

/// Stored schema version: `None` until the first migration has been recorded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchemaVersion {
    pub version: Option<i64>,
    /// Set while a migration is being applied; left set if it was interrupted.
    pub dirty: bool,
}

impl SchemaVersion {
    pub const NONE: SchemaVersion = SchemaVersion {
        version: None,
        dirty: false,
    };

    pub fn clean(version: i64) -> Self {
        Self {
            version: Some(version),
            dirty: false,
        }
    }

    pub fn dirty(version: i64) -> Self {
        Self {
            version: Some(version),
            dirty: true,
        }
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.version {
            Some(v) if self.dirty => write!(f, "{} (dirty)", v),
            Some(v) => write!(f, "{}", v),
            None => f.write_str("none"),
        }
    }
}

/// Settings a driver is built with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    pub migrations_table: String,
    /// Defaults to the session's `current_schema()`.
    pub schema_name: Option<String>,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            migrations_table: "schema_migrations".to_string(),
            schema_name: None,
        }
    }
}

impl From<&crate::config::MigrateConfig> for DriverConfig {
    fn from(cfg: &crate::config::MigrateConfig) -> Self {
        Self {
            migrations_table: cfg.migrations_table.clone(),
            schema_name: cfg.schema_name.clone(),
        }
    }
}

/// A live migration session.
///
/// Implementations hold one dedicated connection and the cross-process
/// migration lock while [`lock`](Driver::lock) is in effect. All calls block.
pub trait Driver {
    /// Take the migration lock. Fails with [`DbError::Locked`] when the lock is
    /// already held from within this process.
    fn lock(&mut self) -> Result<(), DbError>;

    fn unlock(&mut self) -> Result<(), DbError>;

    /// Read the tracking table. A missing table reads as [`SchemaVersion::NONE`].
    fn version(&mut self) -> Result<SchemaVersion, DbError>;

    /// Replace the tracking row; `None` clears it.
    fn set_version(&mut self, version: Option<i64>, dirty: bool) -> Result<(), DbError>;

    /// Execute the statements of one step.
    fn run(&mut self, step: &MigrationStep) -> Result<(), DbError>;

    /// Release the lock if still held and close the connection. Idempotent.
    fn close(&mut self) -> Result<(), DbError>;
}

impl<D: Driver + ?Sized> Driver for Box<D> {
    fn lock(&mut self) -> Result<(), DbError> {
        (**self).lock()
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        (**self).unlock()
    }

    fn version(&mut self) -> Result<SchemaVersion, DbError> {
        (**self).version()
    }

    fn set_version(&mut self, version: Option<i64>, dirty: bool) -> Result<(), DbError> {
        (**self).set_version(version, dirty)
    }

    fn run(&mut self, step: &MigrationStep) -> Result<(), DbError> {
        (**self).run(step)
    }

    fn close(&mut self) -> Result<(), DbError> {
        (**self).close()
    }
}
