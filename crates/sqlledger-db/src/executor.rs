//! The seam between the reconciliation engine and a database driver.
//!
//! The engine never builds driver-specific SQL itself. A driver exposes a
//! [`TransactionalExecutor`] that opens one [`LedgerTransaction`] per run;
//! every phase of a run goes through that transaction and the run ends with
//! either [`LedgerTransaction::commit`] or a drop, which must roll back.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlledger_common::Result;
use thiserror::Error;

use crate::files::Migration;

/// Name of the ledger table inside the configured schema.
pub const LEDGER_TABLE: &str = "schema_migration";

/// Schema used when neither the caller nor the driver picks one.
pub const DEFAULT_SCHEMA: &str = "public";

/// A persisted ledger row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub id: String,
    pub md5: String,
    pub up: String,
    pub down: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ColumnType {
    Text,
    /// Timestamp without time zone.
    Timestamp,
    Other(String),
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Text => f.write_str("text"),
            ColumnType::Timestamp => f.write_str("timestamp"),
            ColumnType::Other(name) => f.write_str(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: ColumnType,
    pub nullable: bool,
}

impl ColumnInfo {
    pub fn required(name: &str, data_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            nullable: false,
        }
    }
}

impl fmt::Display for ColumnInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.data_type)?;
        if !self.nullable {
            f.write_str(" not null")?;
        }
        Ok(())
    }
}

/// Failure reported by the driver while running migration SQL.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct DriverError(pub String);

/// One open, atomic unit of work against the target database.
///
/// Dropping a transaction without calling [`commit`](Self::commit) rolls
/// back everything done through it.
pub trait LedgerTransaction {
    /// Run migration SQL verbatim. The script may hold several statements.
    fn execute_script(&mut self, sql: &str) -> std::result::Result<(), DriverError>;

    /// Create the ledger table in `schema` unless a table of that name exists.
    fn create_ledger(&mut self, schema: &str) -> Result<()>;

    /// The columns of the ledger table as the database reports them.
    fn ledger_columns(&mut self, schema: &str) -> Result<Vec<ColumnInfo>>;

    fn ledger_rows(&mut self, schema: &str) -> Result<Vec<LedgerRow>>;

    fn insert_ledger_row(&mut self, schema: &str, migration: &Migration, md5: &str)
    -> Result<()>;

    fn delete_ledger_row(&mut self, schema: &str, id: &str) -> Result<()>;

    fn commit(self) -> Result<()>
    where
        Self: Sized;
}

/// Something that can open a [`LedgerTransaction`].
pub trait TransactionalExecutor {
    type Transaction<'a>: LedgerTransaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Transaction<'_>>;

    /// Schema to use when the caller does not configure one.
    fn default_schema(&self) -> &str {
        DEFAULT_SCHEMA
    }
}
