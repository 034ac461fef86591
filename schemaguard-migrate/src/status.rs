//! Applied/pending listing from the migration source and the stored version.

use colored::Colorize;
use schemaguard::{MigrationSource, SchemaVersion};
use std::fmt::Write;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    pub version: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub current: SchemaVersion,
    pub applied: Vec<StatusEntry>,
    pub pending: Vec<StatusEntry>,
}

impl StatusReport {
    /// Everything up to and including the stored version counts as applied.
    pub fn build(source: &MigrationSource, current: SchemaVersion) -> Self {
        let (applied, pending): (Vec<_>, Vec<_>) = source
            .ups()
            .map(|step| StatusEntry {
                version: step.version,
                name: step.name.clone(),
            })
            .partition(|entry| current.version.is_some_and(|v| entry.version <= v));

        Self {
            current,
            applied,
            pending,
        }
    }

    pub fn is_up_to_date(&self) -> bool {
        self.pending.is_empty() && !self.current.dirty
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "\nMigration Status\n");

        let version = self.current.to_string();
        if self.current.dirty {
            let _ = writeln!(out, "Current version: {}", version.red().bold());
            let _ = writeln!(
                out,
                "{}",
                "The schema is dirty: fix it manually and force the version before migrating."
                    .red()
            );
        } else {
            let _ = writeln!(out, "Current version: {}", version.bold());
        }
        let _ = writeln!(out);

        if self.applied.is_empty() {
            let _ = writeln!(out, "Applied Migrations: None");
        } else {
            let _ = writeln!(out, "Applied Migrations ({}):", self.applied.len());
            for entry in &self.applied {
                let _ = writeln!(
                    out,
                    "  {} {}_{}",
                    "✓".green(),
                    entry.version,
                    entry.name
                );
            }
        }
        let _ = writeln!(out);

        if self.pending.is_empty() {
            let _ = writeln!(out, "Pending Migrations: None");
        } else {
            let _ = writeln!(out, "Pending Migrations ({}):", self.pending.len());
            for entry in &self.pending {
                let _ = writeln!(
                    out,
                    "  {} {}_{} (pending)",
                    "⏳".yellow(),
                    entry.version,
                    entry.name
                );
            }
        }

        let _ = writeln!(
            out,
            "\nSummary: {} applied, {} pending",
            self.applied.len(),
            self.pending.len()
        );
        out
    }
}
