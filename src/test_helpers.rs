//! In-memory driver and pool used by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::migration::{
    DbError, Driver, DriverConfig, MigrationSource, MigrationStep, SchemaVersion,
};
use crate::pool::ConnectionPool;

pub(crate) type SharedState = Arc<Mutex<FakeState>>;

/// Database as seen through [`FakeDriver`].
#[derive(Debug, Default)]
pub(crate) struct FakeState {
    pub version: SchemaVersion,
    pub executed: Vec<i64>,
    pub locked: bool,
    pub closed: bool,
    pub close_calls: u32,
    pub set_version_calls: u32,
    /// Statement errors by version, returned every time the step runs.
    pub fail_step: HashMap<i64, String>,
    /// Statement errors by version, returned once and then cleared.
    pub transient_step_failures: HashMap<i64, String>,
    /// Returned by `version()` while set.
    pub version_error: Option<String>,
    /// Errors returned by successive `lock()` calls before it starts succeeding.
    pub lock_failures: VecDeque<String>,
    pub lock_calls: u32,
}

impl FakeState {
    pub(crate) fn shared() -> SharedState {
        Arc::new(Mutex::new(FakeState::default()))
    }
}

pub(crate) struct FakeDriver {
    state: SharedState,
}

impl FakeDriver {
    pub(crate) fn new(state: &SharedState) -> Self {
        Self {
            state: Arc::clone(state),
        }
    }
}

impl Driver for FakeDriver {
    fn lock(&mut self) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        state.lock_calls += 1;
        if let Some(msg) = state.lock_failures.pop_front() {
            return Err(DbError::Other(msg));
        }
        if state.locked {
            return Err(DbError::Locked("already held by this driver".to_string()));
        }
        state.locked = true;
        Ok(())
    }

    fn unlock(&mut self) -> Result<(), DbError> {
        self.state.lock().unwrap().locked = false;
        Ok(())
    }

    fn version(&mut self) -> Result<SchemaVersion, DbError> {
        let state = self.state.lock().unwrap();
        match &state.version_error {
            Some(msg) => Err(DbError::Other(msg.clone())),
            None => Ok(state.version),
        }
    }

    fn set_version(&mut self, version: Option<i64>, dirty: bool) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        state.set_version_calls += 1;
        state.version = SchemaVersion { version, dirty };
        Ok(())
    }

    fn run(&mut self, step: &MigrationStep) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        if let Some(msg) = state.fail_step.get(&step.version) {
            return Err(DbError::Other(msg.clone()));
        }
        if let Some(msg) = state.transient_step_failures.remove(&step.version) {
            return Err(DbError::Other(msg));
        }
        state.executed.push(step.version);
        Ok(())
    }

    fn close(&mut self) -> Result<(), DbError> {
        let mut state = self.state.lock().unwrap();
        state.close_calls += 1;
        state.locked = false;
        state.closed = true;
        Ok(())
    }
}

/// Pool whose first `open_failures` checkouts fail with the given messages.
pub(crate) struct FakePool {
    pub state: SharedState,
    pub open_failures: Mutex<VecDeque<String>>,
    pub opened: Mutex<u32>,
}

impl FakePool {
    pub(crate) fn new(state: &SharedState) -> Self {
        Self {
            state: Arc::clone(state),
            open_failures: Mutex::new(VecDeque::new()),
            opened: Mutex::new(0),
        }
    }

    pub(crate) fn failing(state: &SharedState, failures: &[&str]) -> Self {
        let pool = Self::new(state);
        pool.open_failures
            .lock()
            .unwrap()
            .extend(failures.iter().map(|s| s.to_string()));
        pool
    }

    pub(crate) fn open_attempts(&self) -> u32 {
        *self.opened.lock().unwrap()
    }
}

impl ConnectionPool for FakePool {
    type Driver = FakeDriver;

    fn open_driver(&self, _config: &DriverConfig) -> Result<FakeDriver, DbError> {
        *self.opened.lock().unwrap() += 1;
        if let Some(msg) = self.open_failures.lock().unwrap().pop_front() {
            return Err(DbError::Other(msg));
        }
        Ok(FakeDriver::new(&self.state))
    }
}

/// v1 creates table `t`, v2 adds column `c`.
pub(crate) fn two_step_source() -> MigrationSource {
    MigrationSource::from_steps(vec![
        MigrationStep::up(1, "create_t", "CREATE TABLE t (id BIGINT PRIMARY KEY);"),
        MigrationStep::down(1, "create_t", "DROP TABLE t;"),
        MigrationStep::up(2, "add_c", "ALTER TABLE t ADD COLUMN c TEXT;"),
        MigrationStep::down(2, "add_c", "ALTER TABLE t DROP COLUMN c;"),
    ])
    .unwrap()
}
