//! # Schemaguard
//!
//! Contention-safe startup schema migrations for PostgreSQL services running
//! on the `may` coroutine runtime.
//!
//! Every instance of a service calls [`Migrator::up`] while starting. A random
//! jitter spreads the instances out, a PostgreSQL advisory lock lets exactly
//! one of them apply pending migrations, and bounded retry loops absorb lock
//! contention so the others wait instead of crashing.

pub mod cancel;
pub mod classify;
pub mod config;
pub mod connection;
pub mod jitter;
pub mod metrics;
pub mod migration;
pub mod pool;
pub mod retry;

#[cfg(test)]
mod test_helpers;

pub use cancel::CancelToken;
pub use classify::{Classifiable, Classifier, LockContention};
pub use config::MigrateConfig;
pub use connection::ConnectionError;
pub use jitter::StartupJitter;
pub use migration::{
    startup_migrations, MigrateError, MigrationSource, Migrator, SchemaVersion, UpOutcome,
};
pub use pool::{ConnectionPool, PgPool};
pub use retry::{RetryPolicy, Sleeper};
