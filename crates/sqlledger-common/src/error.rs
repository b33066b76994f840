use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Which half of a migration pair a file or statement belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("invalid migration filename: {}", path.display())]
    InvalidFilename { path: PathBuf },

    #[error("migration {id} is missing its {direction} file: expected {}", path.display())]
    MissingFile {
        id: String,
        direction: Direction,
        path: PathBuf,
    },

    #[error("migration {id} has {} {direction} files: {}", paths.len(), join_paths(paths))]
    DuplicateFile {
        id: String,
        direction: Direction,
        paths: Vec<PathBuf>,
    },

    #[error("cannot read migrations directory {}: {source}", path.display())]
    DirectoryUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot read migration file {}: {source}", path.display())]
    FileUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("table {schema}.{table} has an unexpected shape: expected [{expected}], found [{found}]")]
    SchemaShape {
        schema: String,
        table: String,
        expected: String,
        found: String,
    },

    #[error(
        "down migrations required for [{}] but down mode is disabled",
        ids.join(", ")
    )]
    UnauthorizedDownMigration { ids: Vec<String> },

    #[error("down migration {id} failed: {message}\n{sql}")]
    DownMigrationFailed {
        id: String,
        sql: String,
        message: String,
    },

    #[error("up migration {id} failed: {message}\n{sql}")]
    UpMigrationFailed {
        id: String,
        sql: String,
        message: String,
    },

    #[error("migration {id} is older than already applied migration {highest}")]
    OutOfOrderMigration { id: String, highest: String },

    #[error("migration {id} changed after it was applied: ledger md5 {recorded}, files md5 {computed}")]
    ChecksumMismatch {
        id: String,
        recorded: String,
        computed: String,
    },

    #[error("ledger holds {rows} rows for migration {id}")]
    LedgerIntegrity { id: String, rows: usize },
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
