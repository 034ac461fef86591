//! Migration source: the ordered set of versioned SQL steps.
//!
//! Files follow the `{version}_{title}.{up|down}.sql` convention, e.g.
//! `0001_create_users.up.sql`. Only the `up` half is ever applied at startup;
//! `down` files are loaded so a source can be inspected as a whole.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::migration::SourceError;

static FILE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([0-9]+)_(.+)\.(up|down)\.sql$").expect("migration file pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => f.write_str("up"),
            Direction::Down => f.write_str("down"),
        }
    }
}

/// One migration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStep {
    pub version: i64,
    pub name: String,
    pub direction: Direction,
    /// Statements sent to the server as one batch.
    pub statements: String,
}

impl MigrationStep {
    pub fn up(version: i64, name: impl Into<String>, statements: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            direction: Direction::Up,
            statements: statements.into(),
        }
    }

    pub fn down(version: i64, name: impl Into<String>, statements: impl Into<String>) -> Self {
        Self {
            version,
            name: name.into(),
            direction: Direction::Down,
            statements: statements.into(),
        }
    }

    /// Parse `{version}_{title}.{up|down}.sql` into its parts.
    pub fn parse_filename(filename: &str) -> Result<(i64, String, Direction), SourceError> {
        let caps = FILE_NAME
            .captures(filename)
            .ok_or_else(|| SourceError::InvalidName(filename.to_string()))?;

        let version = caps[1]
            .parse::<i64>()
            .map_err(|_| SourceError::InvalidName(filename.to_string()))?;
        let direction = if &caps[3] == "up" {
            Direction::Up
        } else {
            Direction::Down
        };
        Ok((version, caps[2].to_string(), direction))
    }
}

/// A file compiled into the binary, typically with `include_str!`.
pub type EmbeddedFile = (&'static str, &'static str);

/// Immutable, version-ordered migration set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationSource {
    ups: BTreeMap<i64, MigrationStep>,
    downs: BTreeMap<i64, MigrationStep>,
}

impl MigrationSource {
    /// Build a source from steps; duplicate version/direction pairs are rejected.
    pub fn from_steps<I>(steps: I) -> Result<Self, SourceError>
    where
        I: IntoIterator<Item = MigrationStep>,
    {
        let mut source = Self::default();
        for step in steps {
            let map = match step.direction {
                Direction::Up => &mut source.ups,
                Direction::Down => &mut source.downs,
            };
            if map.contains_key(&step.version) {
                return Err(SourceError::Duplicate {
                    version: step.version,
                    direction: step.direction,
                });
            }
            map.insert(step.version, step);
        }
        Ok(source)
    }

    /// Load every `*.sql` file of `dir`. Other files are ignored.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SourceError> {
        let dir = dir.as_ref();
        let io_err = |source| SourceError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let mut steps = Vec::new();
        for entry in fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|s| s.to_str()) != Some("sql") {
                continue;
            }
            let filename = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| SourceError::InvalidName(path.display().to_string()))?;
            let (version, name, direction) = MigrationStep::parse_filename(filename)?;
            let statements = fs::read_to_string(&path).map_err(|source| SourceError::Io {
                path: path.clone(),
                source,
            })?;
            steps.push(MigrationStep {
                version,
                name,
                direction,
                statements,
            });
        }

        let source = Self::from_steps(steps)?;
        if source.ups.is_empty() {
            return Err(SourceError::Empty(dir.display().to_string()));
        }
        Ok(source)
    }

    /// Load `(file name, contents)` pairs compiled into the binary.
    pub fn from_embedded(files: &[EmbeddedFile]) -> Result<Self, SourceError> {
        let mut steps = Vec::with_capacity(files.len());
        for (filename, contents) in files {
            let (version, name, direction) = MigrationStep::parse_filename(filename)?;
            steps.push(MigrationStep {
                version,
                name,
                direction,
                statements: (*contents).to_string(),
            });
        }

        let source = Self::from_steps(steps)?;
        if source.ups.is_empty() {
            return Err(SourceError::Empty("embedded migrations".to_string()));
        }
        Ok(source)
    }

    pub fn is_empty(&self) -> bool {
        self.ups.is_empty()
    }

    /// Number of forward migrations.
    pub fn len(&self) -> usize {
        self.ups.len()
    }

    pub fn first_version(&self) -> Option<i64> {
        self.ups.keys().next().copied()
    }

    /// Highest forward version; the target of every startup run.
    pub fn latest_version(&self) -> Option<i64> {
        self.ups.keys().next_back().copied()
    }

    pub fn contains(&self, version: i64) -> bool {
        self.ups.contains_key(&version)
    }

    pub fn get(&self, version: i64, direction: Direction) -> Option<&MigrationStep> {
        match direction {
            Direction::Up => self.ups.get(&version),
            Direction::Down => self.downs.get(&version),
        }
    }

    /// Forward steps in increasing version order.
    pub fn ups(&self) -> impl Iterator<Item = &MigrationStep> {
        self.ups.values()
    }

    /// Forward steps strictly after `current` (all of them when nothing is applied).
    pub fn pending_after(&self, current: Option<i64>) -> Vec<&MigrationStep> {
        match current {
            Some(version) => self
                .ups
                .range(version.saturating_add(1)..)
                .map(|(_, step)| step)
                .collect(),
            None => self.ups.values().collect(),
        }
    }
}

/// Where [`Migrator`](crate::Migrator) loads its migrations from.
#[derive(Debug, Clone)]
pub enum SourceLocation {
    Directory(PathBuf),
    Embedded(&'static [EmbeddedFile]),
    Loaded(MigrationSource),
}

impl SourceLocation {
    pub fn open(&self) -> Result<MigrationSource, SourceError> {
        match self {
            SourceLocation::Directory(dir) => MigrationSource::from_dir(dir),
            SourceLocation::Embedded(files) => MigrationSource::from_embedded(files),
            SourceLocation::Loaded(source) => Ok(source.clone()),
        }
    }
}

impl From<MigrationSource> for SourceLocation {
    fn from(source: MigrationSource) -> Self {
        SourceLocation::Loaded(source)
    }
}

impl From<PathBuf> for SourceLocation {
    fn from(dir: PathBuf) -> Self {
        SourceLocation::Directory(dir)
    }
}

impl From<&'static [EmbeddedFile]> for SourceLocation {
    fn from(files: &'static [EmbeddedFile]) -> Self {
        SourceLocation::Embedded(files)
    }
}
