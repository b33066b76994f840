use std::collections::{BTreeMap, HashSet};

use sqlledger_common::{Error, Result};
use tracing::debug;

use crate::executor::{ColumnInfo, ColumnType, LEDGER_TABLE, LedgerRow, LedgerTransaction};
use crate::files::Migration;

/// Bootstraps the ledger table and checks that it has the expected shape.
pub struct SchemaGuard;

impl SchemaGuard {
    /// The ledger columns every run expects to find.
    pub fn expected_columns() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::required("id", ColumnType::Text),
            ColumnInfo::required("md5", ColumnType::Text),
            ColumnInfo::required("up", ColumnType::Text),
            ColumnInfo::required("down", ColumnType::Text),
            ColumnInfo::required("created_at", ColumnType::Timestamp),
        ]
    }

    /// Create the ledger table if it is absent, then validate it.
    ///
    /// A conflicting table that merely shares the ledger's name survives the
    /// `CREATE ... IF NOT EXISTS` untouched, so the shape check is what tells
    /// it apart from a freshly created ledger.
    pub fn ensure<T: LedgerTransaction>(tx: &mut T, schema: &str) -> Result<()> {
        tx.create_ledger(schema)?;
        let found = tx.ledger_columns(schema)?;
        Self::validate(schema, found)?;
        debug!("ledger table {schema}.{LEDGER_TABLE} is ready");
        Ok(())
    }

    /// Compare columns by name, type and nullability. Column order is ignored.
    pub fn validate(schema: &str, mut found: Vec<ColumnInfo>) -> Result<()> {
        let mut expected = Self::expected_columns();
        expected.sort();
        found.sort();
        if expected == found {
            return Ok(());
        }
        Err(Error::SchemaShape {
            schema: schema.to_string(),
            table: LEDGER_TABLE.to_string(),
            expected: describe(&expected),
            found: describe(&found),
        })
    }
}

fn describe(columns: &[ColumnInfo]) -> String {
    columns
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Splits the ledger against the current file set.
pub struct LedgerReconciler;

impl LedgerReconciler {
    /// Ledger rows whose id has no file pair any more, newest first.
    pub fn rollback_candidates<T: LedgerTransaction>(
        tx: &mut T,
        schema: &str,
        migrations: &[Migration],
    ) -> Result<Vec<LedgerRow>> {
        let on_disk: HashSet<&str> = migrations.iter().map(|m| m.id.as_str()).collect();
        let mut rows: Vec<LedgerRow> = tx
            .ledger_rows(schema)?
            .into_iter()
            .filter(|row| !on_disk.contains(row.id.as_str()))
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows)
    }

    /// Ledger rows whose id is still on disk, grouped by id.
    ///
    /// Groups normally hold one row; more than one means the primary key was
    /// bypassed and is reported by the caller.
    pub fn checksum_candidates<T: LedgerTransaction>(
        tx: &mut T,
        schema: &str,
        migrations: &[Migration],
    ) -> Result<BTreeMap<String, Vec<LedgerRow>>> {
        let on_disk: HashSet<&str> = migrations.iter().map(|m| m.id.as_str()).collect();
        let mut grouped: BTreeMap<String, Vec<LedgerRow>> = BTreeMap::new();
        for row in tx.ledger_rows(schema)? {
            if on_disk.contains(row.id.as_str()) {
                grouped.entry(row.id.clone()).or_default().push(row);
            }
        }
        Ok(grouped)
    }
}
