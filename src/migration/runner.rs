//! Migration runner: applies pending forward steps with an acquired driver.

use std::sync::Arc;
use std::time::Instant;

use crate::classify::{Classifier, LockContention};
use crate::migration::driver::{Driver, SchemaVersion};
use crate::migration::source::MigrationSource;
use crate::migration::{ApplyError, DbError};

/// Result of a successful run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpOutcome {
    /// Nothing was pending; the stored version was left untouched.
    NoChange,
    Applied {
        from: Option<i64>,
        to: i64,
        count: usize,
    },
}

impl UpOutcome {
    pub fn is_no_change(&self) -> bool {
        matches!(self, UpOutcome::NoChange)
    }
}

/// Owns the driver for the duration of one startup run and closes it on drop.
pub struct MigrationRunner<'s, D: Driver> {
    driver: D,
    source: &'s MigrationSource,
    classifier: Arc<dyn Classifier>,
}

impl<'s, D: Driver> MigrationRunner<'s, D> {
    pub fn new(driver: D, source: &'s MigrationSource) -> Self {
        Self {
            driver,
            source,
            classifier: Arc::new(LockContention),
        }
    }

    /// Policy deciding which step failures leave the schema clean for a retry.
    pub fn with_classifier(mut self, classifier: Arc<dyn Classifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// Best-effort read of the stored version.
    ///
    /// Failures are logged and swallowed: this read is diagnostic only and must
    /// never abort the run.
    pub fn observe_version(&mut self) -> Option<SchemaVersion> {
        match self.driver.version() {
            Ok(current) => {
                log::info!(
                    "current migration version version={} dirty={}",
                    current
                        .version
                        .map_or_else(|| "none".to_string(), |v| v.to_string()),
                    current.dirty
                );
                Some(current)
            }
            Err(e) => {
                log::warn!("could not get current migration version error={}", e);
                None
            }
        }
    }

    /// One attempt of the migrate phase: lock, apply everything pending, unlock.
    ///
    /// The lock is released on every path out of this call.
    pub fn apply_pending(&mut self) -> Result<UpOutcome, ApplyError> {
        self.driver.lock()?;
        let applied = self.apply_locked();
        let unlocked = self.driver.unlock();

        match (applied, unlocked) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Err(e), Err(unlock_err)) => {
                log::warn!("failed to release migration lock error={}", unlock_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
            (Ok(_), Err(unlock_err)) => Err(ApplyError::Database(unlock_err)),
        }
    }

    fn apply_locked(&mut self) -> Result<UpOutcome, ApplyError> {
        let current = self.driver.version()?;

        if current.dirty {
            // An interrupted run needs an operator to fix the schema and force the version.
            return Err(ApplyError::Dirty {
                version: current.version.unwrap_or_default(),
            });
        }
        if let Some(version) = current.version {
            if !self.source.contains(version) {
                return Err(ApplyError::MissingVersion { version });
            }
        }

        let migrations: &'s MigrationSource = self.source;
        let pending = migrations.pending_after(current.version);
        if pending.is_empty() {
            return Ok(UpOutcome::NoChange);
        }

        let mut to = current.version;
        for step in &pending {
            let started = Instant::now();
            self.driver.set_version(Some(step.version), true)?;
            if let Err(source) = self.driver.run(step) {
                if self.classifier.is_retryable(&source) {
                    // A step runs as one batch, so a contended step left nothing behind.
                    self.restore_version(to, step.version);
                }
                return Err(ApplyError::Step {
                    version: step.version,
                    name: step.name.clone(),
                    source,
                });
            }
            self.driver.set_version(Some(step.version), false)?;
            to = Some(step.version);

            #[cfg(feature = "metrics")]
            crate::metrics::METRICS.record_applied();

            log::info!(
                "applied migration version={} name={} elapsed_ms={}",
                step.version,
                step.name,
                started.elapsed().as_millis()
            );
        }

        Ok(UpOutcome::Applied {
            from: current.version,
            // pending is non-empty, so at least one step ran
            to: to.unwrap_or_default(),
            count: pending.len(),
        })
    }

    fn restore_version(&mut self, previous: Option<i64>, failed: i64) {
        match self.driver.set_version(previous, false) {
            Ok(()) => log::warn!(
                "migration interrupted by lock contention, version restored version={} restored={}",
                failed,
                SchemaVersion {
                    version: previous,
                    dirty: false
                }
            ),
            Err(e) => log::warn!(
                "could not restore version after lock contention version={} error={}",
                failed,
                e
            ),
        }
    }

    /// Log the final state of a successful run.
    pub fn report(&mut self, outcome: &UpOutcome) {
        match outcome {
            UpOutcome::NoChange => {
                log::info!("migrations up to date, no changes needed");
            }
            UpOutcome::Applied { count, .. } => match self.driver.version() {
                Ok(version) => log::info!(
                    "migrations completed successfully new_version={} applied={}",
                    version,
                    count
                ),
                Err(_) => log::info!("migrations completed successfully applied={}", count),
            },
        }
    }

    /// Close the driver now instead of on drop, surfacing the error.
    pub fn close(mut self) -> Result<(), DbError> {
        self.driver.close()
    }
}

impl<D: Driver> Drop for MigrationRunner<'_, D> {
    fn drop(&mut self) {
        log::info!("closing migrator");
        if let Err(e) = self.driver.close() {
            log::warn!("failed to close migration driver error={}", e);
        }
    }
}
