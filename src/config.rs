//! Migration settings.
//!
//! [`MigrateConfig::load()`] reads the `[migrate]` section of
//! `config/config.toml` and overlays `SCHEMAGUARD__MIGRATE__*` environment
//! variables on top of it.

use config::{Config, ConfigError, Environment, File};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::time::Duration;

use crate::retry::RetryPolicy;

const CONFIG_FILE: &str = "config/config.toml";
const ENV_PREFIX: &str = "SCHEMAGUARD";

static IDENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("identifier pattern is valid")
});

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MigrateConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default = "default_migrations_table")]
    pub migrations_table: String,
    /// Schema holding the tracking table; the session's `current_schema()` when unset.
    #[serde(default)]
    pub schema_name: Option<String>,
    #[serde(default = "default_driver_max_attempts")]
    pub driver_max_attempts: u32,
    #[serde(default = "default_migrate_max_attempts")]
    pub migrate_max_attempts: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

fn default_migrations_table() -> String {
    "schema_migrations".to_string()
}

fn default_driver_max_attempts() -> u32 {
    10
}

fn default_migrate_max_attempts() -> u32 {
    20
}

fn default_retry_delay_ms() -> u64 {
    500
}

fn default_max_jitter_ms() -> u64 {
    2000
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            migrations_table: default_migrations_table(),
            schema_name: None,
            driver_max_attempts: default_driver_max_attempts(),
            migrate_max_attempts: default_migrate_max_attempts(),
            retry_delay_ms: default_retry_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

impl MigrateConfig {
    /// Load the migration configuration from `config/config.toml`, falling back to env vars.
    ///
    /// A missing `[migrate]` section yields the defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let builder = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"));

        let settings = match builder.build() {
            Ok(cfg) => cfg,
            Err(err) => {
                if std::path::Path::new(CONFIG_FILE).exists() {
                    log::warn!(
                        "failed to load {}, falling back to environment error={}",
                        CONFIG_FILE,
                        err
                    );
                }
                Config::builder()
                    .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
                    .build()
                    .map_err(|env_err| {
                        ConfigError::Message(format!(
                            "Failed to load configuration from file and env: {}, then env-only error: {}",
                            err, env_err
                        ))
                    })?
            }
        };

        let cfg = match settings.get::<MigrateConfig>("migrate") {
            Ok(cfg) => cfg,
            Err(ConfigError::NotFound(_)) => MigrateConfig::default(),
            Err(e) => {
                return Err(ConfigError::Message(format!(
                    "Migration configuration could not be loaded from file or environment: {}",
                    e
                )))
            }
        };

        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects settings the migrator cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.driver_max_attempts == 0 || self.migrate_max_attempts == 0 {
            return Err(ConfigError::Message(
                "max attempts must be at least 1".to_string(),
            ));
        }
        if !IDENT.is_match(&self.migrations_table) {
            return Err(ConfigError::Message(format!(
                "invalid migrations table name '{}'",
                self.migrations_table
            )));
        }
        if let Some(schema) = &self.schema_name {
            if !IDENT.is_match(schema) {
                return Err(ConfigError::Message(format!(
                    "invalid schema name '{}'",
                    schema
                )));
            }
        }
        Ok(())
    }

    pub fn driver_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.driver_max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    pub fn migrate_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.migrate_max_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    pub fn max_jitter(&self) -> Duration {
        Duration::from_millis(self.max_jitter_ms)
    }
}

/// True when `name` is safe to splice into SQL as an identifier.
pub(crate) fn is_identifier(name: &str) -> bool {
    IDENT.is_match(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_startup_policy() {
        let cfg = MigrateConfig::default();
        assert_eq!(cfg.migrations_table, "schema_migrations");
        assert_eq!(cfg.driver_policy().max_attempts, 10);
        assert_eq!(cfg.migrate_policy().max_attempts, 20);
        assert_eq!(cfg.driver_policy().delay, Duration::from_millis(500));
        assert_eq!(cfg.max_jitter(), Duration::from_millis(2000));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let cfg = MigrateConfig {
            migrate_max_attempts: 0,
            ..MigrateConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_identifiers() {
        let cfg = MigrateConfig {
            migrations_table: "schema_migrations; DROP TABLE users".to_string(),
            ..MigrateConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = MigrateConfig {
            schema_name: Some("1public".to_string()),
            ..MigrateConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let settings = Config::builder()
            .add_source(File::from_str(
                "[migrate]\nretry_delay_ms = 50\nmigrations_table = \"app_migrations\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let cfg: MigrateConfig = settings.get("migrate").unwrap();
        assert_eq!(cfg.retry_delay_ms, 50);
        assert_eq!(cfg.migrations_table, "app_migrations");
        assert_eq!(cfg.driver_max_attempts, 10);
        assert_eq!(cfg.max_jitter_ms, 2000);
    }
}
