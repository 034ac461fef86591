//! PostgreSQL implementation of [`Driver`] over `may_postgres`.

use may_postgres::Client;

use crate::config::is_identifier;
use crate::migration::driver::{Driver, DriverConfig, SchemaVersion};
use crate::migration::lock::{advisory_lock_key, claim_process_lock, ProcessLock};
use crate::migration::source::MigrationStep;
use crate::migration::state_table;
use crate::migration::DbError;

/// Driver bound to one dedicated connection.
///
/// Construction creates the tracking table (under the advisory lock) if it
/// does not exist yet, which is why building a driver can itself fail on lock
/// contention.
pub struct PostgresDriver {
    client: Option<Client>,
    table: String,
    lock_key: i64,
    held: Option<ProcessLock>,
}

impl std::fmt::Debug for PostgresDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresDriver")
            .field("table", &self.table)
            .field("lock_key", &self.lock_key)
            .field("locked", &self.held.is_some())
            .field("closed", &self.client.is_none())
            .finish()
    }
}

impl PostgresDriver {
    /// Build a driver on `client` and make sure the tracking table exists.
    pub fn with_client(client: Client, config: &DriverConfig) -> Result<Self, DbError> {
        let (database, schema) = resolve_target(&client, config)?;

        let mut driver = Self {
            client: Some(client),
            table: state_table::qualified_name(&schema, &config.migrations_table),
            lock_key: advisory_lock_key(&database, &schema, &config.migrations_table),
            held: None,
        };
        driver.ensure_version_table()?;

        log::debug!(
            "postgres migration driver ready database={} table={}",
            database,
            driver.table
        );
        Ok(driver)
    }

    fn client(&self) -> Result<&Client, DbError> {
        self.client.as_ref().ok_or(DbError::Closed)
    }

    fn ensure_version_table(&mut self) -> Result<(), DbError> {
        self.lock()?;
        let created = self.client().and_then(|client| {
            client
                .batch_execute(&state_table::create_table_sql(&self.table))
                .map_err(DbError::from)
        });
        let unlocked = self.unlock();
        created?;
        unlocked
    }

    fn write_version(
        client: &Client,
        table: &str,
        version: Option<i64>,
        dirty: bool,
    ) -> Result<(), DbError> {
        client.execute(state_table::truncate_sql(table).as_str(), &[])?;
        if let Some(version) = version {
            client.execute(
                state_table::insert_version_sql(table).as_str(),
                &[&version, &dirty],
            )?;
        }
        Ok(())
    }
}

impl Driver for PostgresDriver {
    fn lock(&mut self) -> Result<(), DbError> {
        if self.held.is_some() {
            return Err(DbError::Locked("already held by this driver".to_string()));
        }
        let process_lock = claim_process_lock()?;
        // Blocks until the lock is free, or until the server's lock_timeout fires (55P03).
        self.client()?
            .execute("SELECT pg_advisory_lock($1)", &[&self.lock_key])?;
        self.held = Some(process_lock);
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        let Some(process_lock) = self.held.take() else {
            return Ok(());
        };
        let result = self
            .client()?
            .execute("SELECT pg_advisory_unlock($1)", &[&self.lock_key]);
        drop(process_lock);
        result.map(|_| ()).map_err(DbError::from)
    }

    fn version(&mut self) -> Result<SchemaVersion, DbError> {
        select_version(self.client()?, &self.table)
    }

    fn set_version(&mut self, version: Option<i64>, dirty: bool) -> Result<(), DbError> {
        let client = self.client()?;
        client.execute("BEGIN", &[])?;
        match Self::write_version(client, &self.table, version, dirty) {
            Ok(()) => {
                client.execute("COMMIT", &[])?;
                Ok(())
            }
            Err(e) => {
                let _ = client.execute("ROLLBACK", &[]);
                Err(e)
            }
        }
    }

    fn run(&mut self, step: &MigrationStep) -> Result<(), DbError> {
        if step.statements.trim().is_empty() {
            return Ok(());
        }
        // One simple-protocol query: the server runs it as a single implicit transaction.
        self.client()?.batch_execute(&step.statements)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), DbError> {
        if self.client.is_none() {
            return Ok(());
        }
        let unlocked = self.unlock();
        // Dropping the client closes the session, which also frees any advisory lock.
        self.client = None;
        unlocked
    }
}

/// Read the stored version on `client` without taking the migration lock or
/// creating the tracking table.
///
/// Safe to call while another instance is migrating; a missing table reads as
/// no version.
pub fn read_schema_version(client: &Client, config: &DriverConfig) -> Result<SchemaVersion, DbError> {
    let (_, schema) = resolve_target(client, config)?;
    select_version(
        client,
        &state_table::qualified_name(&schema, &config.migrations_table),
    )
}

/// Database name and validated tracking-table schema for `config`.
fn resolve_target(client: &Client, config: &DriverConfig) -> Result<(String, String), DbError> {
    if !is_identifier(&config.migrations_table) {
        return Err(DbError::Other(format!(
            "invalid migrations table name '{}'",
            config.migrations_table
        )));
    }

    let row = client.query_one("SELECT current_database(), current_schema()", &[])?;
    let database: String = row.get(0);
    let current_schema: Option<String> = row.get(1);

    match config.schema_name.clone().or(current_schema) {
        Some(schema) if is_identifier(&schema) => Ok((database, schema)),
        Some(schema) => Err(DbError::Other(format!("invalid schema name '{}'", schema))),
        None => Err(DbError::Other(
            "no schema selected: current_schema() is NULL and no schema_name configured"
                .to_string(),
        )),
    }
}

fn select_version(client: &Client, table: &str) -> Result<SchemaVersion, DbError> {
    let rows = match client.query(state_table::select_version_sql(table).as_str(), &[]) {
        Ok(rows) => rows,
        Err(e) => {
            let err = DbError::from(e);
            if err.is_undefined_table() {
                return Ok(SchemaVersion::NONE);
            }
            return Err(err);
        }
    };

    Ok(match rows.first() {
        Some(row) => SchemaVersion {
            version: Some(row.get::<_, i64>(0)),
            dirty: row.get::<_, bool>(1),
        },
        None => SchemaVersion::NONE,
    })
}

impl Drop for PostgresDriver {
    fn drop(&mut self) {
        let _ = self.close();
    }
}
