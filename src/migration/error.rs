//! Migration-specific error types

use std::path::PathBuf;

use crate::classify::Classifiable;
use crate::connection::ConnectionError;
use crate::migration::source::Direction;
use crate::retry::RetryError;

/// SQLSTATE for `undefined_table`.
pub(crate) const UNDEFINED_TABLE: &str = "42P01";

/// Failure of a single driver operation.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("connection error: {0}")]
    Connection(#[from] ConnectionError),
    #[error("{0}")]
    Postgres(#[from] may_postgres::Error),
    /// The lock is already held by this driver or by another driver in this process.
    #[error("can't acquire lock: {0}")]
    Locked(String),
    #[error("driver is closed")]
    Closed,
    #[error("{0}")]
    Other(String),
}

impl DbError {
    /// The SQLSTATE code reported by the server, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            DbError::Postgres(e) => e.code().map(|state| state.code()),
            DbError::Connection(ConnectionError::PostgresError(e)) => {
                e.code().map(|state| state.code())
            }
            _ => None,
        }
    }

    pub(crate) fn is_undefined_table(&self) -> bool {
        self.code() == Some(UNDEFINED_TABLE)
    }
}

impl Classifiable for DbError {
    fn sql_state(&self) -> Option<&str> {
        self.code()
    }
}

/// Failure of one migration run (a single attempt of the migrate phase).
#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error(transparent)]
    Database(#[from] DbError),
    /// A statement of migration `version` failed; the schema is left dirty at that version.
    #[error("migration {version} ({name}) failed: {source}")]
    Step {
        version: i64,
        name: String,
        #[source]
        source: DbError,
    },
    /// An earlier run was interrupted mid-migration.
    #[error("Dirty database version {version}. Fix and force version.")]
    Dirty { version: i64 },
    /// The stored version is not part of the migration source.
    #[error("no migration found for version {version}")]
    MissingVersion { version: i64 },
}

impl Classifiable for ApplyError {
    fn sql_state(&self) -> Option<&str> {
        match self {
            ApplyError::Database(e) | ApplyError::Step { source: e, .. } => e.code(),
            ApplyError::Dirty { .. } | ApplyError::MissingVersion { .. } => None,
        }
    }
}

/// Failure to open the set of migration files.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read migrations from {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid migration file name '{0}', expected {{version}}_{{title}}.up.sql or {{version}}_{{title}}.down.sql")]
    InvalidName(String),
    #[error("duplicate {direction} migration for version {version}")]
    Duplicate { version: i64, direction: Direction },
    #[error("no migrations found in {0}")]
    Empty(String),
}

/// Terminal error of [`Migrator::up`](crate::Migrator::up).
///
/// Every variant names the phase that failed so the caller can tell a
/// contended lock from a broken migration.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    #[error("db pool is nil")]
    NilPool,
    #[error("open migrations: {0}")]
    SourceLoad(#[from] SourceError),
    #[error("create postgres migration driver (after {attempts} attempts): {source}")]
    DriverAcquisition {
        attempts: u32,
        #[source]
        source: DbError,
    },
    #[error("run migrations (after {attempts} attempts): {source}")]
    MigrationApply {
        attempts: u32,
        #[source]
        source: ApplyError,
    },
    #[error("migration startup cancelled during {phase}")]
    Cancelled { phase: &'static str },
    #[error("invalid migration configuration: {0}")]
    Config(#[from] config::ConfigError),
}

impl MigrateError {
    pub(crate) fn from_driver_retry(err: RetryError<DbError>) -> Self {
        if let RetryError::Cancelled { .. } = err {
            return MigrateError::Cancelled {
                phase: "driver acquisition",
            };
        }
        let attempts = err.attempts();
        match err.into_error() {
            Some(source) => MigrateError::DriverAcquisition { attempts, source },
            None => MigrateError::Cancelled {
                phase: "driver acquisition",
            },
        }
    }

    pub(crate) fn from_apply_retry(err: RetryError<ApplyError>) -> Self {
        if let RetryError::Cancelled { .. } = err {
            return MigrateError::Cancelled { phase: "migration" };
        }
        let attempts = err.attempts();
        match err.into_error() {
            Some(source) => MigrateError::MigrationApply { attempts, source },
            None => MigrateError::Cancelled { phase: "migration" },
        }
    }

    /// True when the failure came from lock contention that outlasted every attempt.
    pub fn is_contention(&self) -> bool {
        matches!(
            self,
            MigrateError::DriverAcquisition { .. } | MigrateError::MigrationApply { .. }
        ) && crate::classify::is_lock_contention_message(&self.to_string())
    }
}
