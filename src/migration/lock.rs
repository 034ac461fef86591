//! Migration lock primitives.
//!
//! Across processes the lock is a PostgreSQL session-level advisory lock keyed
//! on database, schema and tracking table, so two services sharing a database
//! but not a tracking table do not block each other. Within one process a
//! static flag guarantees that at most one driver holds the lock at a time.

use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::migration::DbError;

static PROCESS_LOCK: AtomicBool = AtomicBool::new(false);

/// Advisory lock key for a tracking table.
pub fn advisory_lock_key(database: &str, schema: &str, table: &str) -> i64 {
    let mut hasher = Sha256::new();
    hasher.update(database.as_bytes());
    hasher.update([0u8]);
    hasher.update(schema.as_bytes());
    hasher.update([0u8]);
    hasher.update(table.as_bytes());
    let digest = hasher.finalize();

    let mut key = [0u8; 8];
    key.copy_from_slice(&digest[..8]);
    i64::from_be_bytes(key)
}

/// Claim the in-process migration lock.
pub(crate) fn claim_process_lock() -> Result<ProcessLock, DbError> {
    PROCESS_LOCK
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .map(|_| ProcessLock { _priv: () })
        .map_err(|_| DbError::Locked("held by another migrator in this process".to_string()))
}

/// Held while a driver owns the migration lock; released on drop.
#[derive(Debug)]
pub(crate) struct ProcessLock {
    _priv: (),
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        PROCESS_LOCK.store(false, Ordering::Release);
    }
}
