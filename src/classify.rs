//! Retryable vs fatal error classification.
//!
//! Lock contention shows up in many shapes depending on where the migration
//! session was blocked: an advisory lock wait cancelled by `lock_timeout`, a
//! DDL statement cancelled by `statement_timeout`, or a second migrator in the
//! same process. All of them are worth another attempt; everything else
//! (syntax errors, dirty schema, missing migrations) needs an operator.

use std::fmt;

/// Substrings that mark an error message as lock contention (matched case-insensitively).
pub const RETRYABLE_MARKERS: [&str; 4] = ["timeout", "lock", "can't acquire", "55P03"];

/// SQLSTATE codes treated as lock contention when the driver reports them.
///
/// `55P03` is `lock_not_available`, `57014` is `query_canceled` (raised by
/// `lock_timeout` and `statement_timeout`).
pub const RETRYABLE_SQLSTATES: [&str; 2] = ["55P03", "57014"];

/// What an error exposes to a [`Classifier`].
pub trait Classifiable: fmt::Display {
    /// The PostgreSQL SQLSTATE behind this error, when there is one.
    fn sql_state(&self) -> Option<&str> {
        None
    }
}

/// Decides whether a failed attempt should be retried.
pub trait Classifier: Send + Sync {
    fn is_retryable(&self, error: &dyn Classifiable) -> bool;
}

impl<F> Classifier for F
where
    F: Fn(&dyn Classifiable) -> bool + Send + Sync,
{
    fn is_retryable(&self, error: &dyn Classifiable) -> bool {
        self(error)
    }
}

/// Default policy: text markers first, then the structured SQLSTATE.
#[derive(Debug, Clone, Copy, Default)]
pub struct LockContention;

impl Classifier for LockContention {
    fn is_retryable(&self, error: &dyn Classifiable) -> bool {
        is_lock_contention_message(&error.to_string())
            || error
                .sql_state()
                .is_some_and(|code| RETRYABLE_SQLSTATES.contains(&code))
    }
}

/// Message-only check against [`RETRYABLE_MARKERS`].
pub fn is_lock_contention_message(message: &str) -> bool {
    let message = message.to_lowercase();
    RETRYABLE_MARKERS
        .iter()
        .any(|marker| message.contains(&marker.to_lowercase()))
}

impl Classifiable for &str {}

impl Classifiable for String {}
