//! Tracking table SQL.
//!
//! The table holds a single row: the last applied version and whether the
//! migration that produced it finished.

/// `"schema"."table"`, both parts already validated as identifiers.
pub fn qualified_name(schema: &str, table: &str) -> String {
    format!("\"{}\".\"{}\"", schema, table)
}

pub fn create_table_sql(qualified: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (version BIGINT NOT NULL PRIMARY KEY, dirty BOOLEAN NOT NULL)",
        qualified
    )
}

pub fn select_version_sql(qualified: &str) -> String {
    format!("SELECT version, dirty FROM {} LIMIT 1", qualified)
}

pub fn truncate_sql(qualified: &str) -> String {
    format!("TRUNCATE {}", qualified)
}

pub fn insert_version_sql(qualified: &str) -> String {
    format!("INSERT INTO {} (version, dirty) VALUES ($1, $2)", qualified)
}
