use std::path::Path;

use chrono::NaiveDateTime;
use rusqlite::{Connection, Transaction, TransactionBehavior, params};
use sqlledger_common::{Error, Result};
use tracing::info;

use crate::executor::{
    ColumnInfo, ColumnType, DriverError, LEDGER_TABLE, LedgerRow, LedgerTransaction,
    TransactionalExecutor,
};
use crate::files::Migration;

/// SQLite-backed executor. Schemas map to attached database names, so the
/// default schema is `main`.
pub struct SqliteExecutor {
    conn: Connection,
}

impl SqliteExecutor {
    pub fn open(db_path: &Path) -> Result<Self> {
        info!("opening migration target at {}", db_path.display());
        let conn = Connection::open(db_path)
            .map_err(|e| Error::Database(format!("failed to open database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self { conn })
    }

    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Database(format!("failed to open in-memory database: {e}")))?;

        conn.execute_batch("PRAGMA foreign_keys=ON;")
            .map_err(|e| Error::Database(format!("failed to set pragmas: {e}")))?;

        Ok(Self { conn })
    }

    /// Direct access to the underlying connection, outside any migration run.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl TransactionalExecutor for SqliteExecutor {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>> {
        // Take the write lock before the ledger is read.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| Error::Database(format!("failed to begin transaction: {e}")))?;
        Ok(SqliteTransaction { tx })
    }

    fn default_schema(&self) -> &str {
        "main"
    }
}

pub struct SqliteTransaction<'conn> {
    tx: Transaction<'conn>,
}

impl LedgerTransaction for SqliteTransaction<'_> {
    fn execute_script(&mut self, sql: &str) -> std::result::Result<(), DriverError> {
        self.tx
            .execute_batch(sql)
            .map_err(|e| DriverError(e.to_string()))
    }

    fn create_ledger(&mut self, schema: &str) -> Result<()> {
        self.tx
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    id TEXT PRIMARY KEY NOT NULL,
                    md5 TEXT NOT NULL,
                    up TEXT NOT NULL,
                    down TEXT NOT NULL,
                    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
                );",
                ledger_name(schema)
            ))
            .map_err(|e| Error::Database(format!("failed to create ledger table: {e}")))
    }

    fn ledger_columns(&mut self, schema: &str) -> Result<Vec<ColumnInfo>> {
        let mut stmt = self
            .tx
            .prepare(&format!(
                "PRAGMA {}.table_info({})",
                quote_ident(schema),
                quote_ident(LEDGER_TABLE)
            ))
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                let declared: String = row.get(2)?;
                let not_null: i64 = row.get(3)?;
                Ok(ColumnInfo {
                    name: row.get(1)?,
                    data_type: column_type(&declared),
                    nullable: not_null == 0,
                })
            })
            .map_err(|e| Error::Database(format!("failed to describe ledger table: {e}")))?;

        let mut columns = Vec::new();
        for row in rows {
            columns.push(
                row.map_err(|e| Error::Database(format!("failed to read column info: {e}")))?,
            );
        }
        Ok(columns)
    }

    fn ledger_rows(&mut self, schema: &str) -> Result<Vec<LedgerRow>> {
        let mut stmt = self
            .tx
            .prepare(&format!(
                "SELECT id, md5, up, down, created_at FROM {} ORDER BY id ASC",
                ledger_name(schema)
            ))
            .map_err(|e| Error::Database(format!("failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            })
            .map_err(|e| Error::Database(format!("failed to query ledger: {e}")))?;

        let mut ledger = Vec::new();
        for row in rows {
            let (id, md5, up, down, created_at) =
                row.map_err(|e| Error::Database(format!("failed to read ledger row: {e}")))?;
            ledger.push(LedgerRow {
                created_at: parse_timestamp(&created_at)?,
                id,
                md5,
                up,
                down,
            });
        }
        Ok(ledger)
    }

    fn insert_ledger_row(
        &mut self,
        schema: &str,
        migration: &Migration,
        md5: &str,
    ) -> Result<()> {
        self.tx
            .execute(
                &format!(
                    "INSERT INTO {} (id, md5, up, down) VALUES (?1, ?2, ?3, ?4)",
                    ledger_name(schema)
                ),
                params![migration.id, md5, migration.up, migration.down],
            )
            .map_err(|e| Error::Database(format!("failed to record migration: {e}")))?;
        Ok(())
    }

    fn delete_ledger_row(&mut self, schema: &str, id: &str) -> Result<()> {
        self.tx
            .execute(
                &format!("DELETE FROM {} WHERE id = ?1", ledger_name(schema)),
                params![id],
            )
            .map_err(|e| Error::Database(format!("failed to delete ledger row: {e}")))?;
        Ok(())
    }

    fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .map_err(|e| Error::Database(format!("failed to commit transaction: {e}")))
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn ledger_name(schema: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(LEDGER_TABLE))
}

fn column_type(declared: &str) -> ColumnType {
    let normalized = declared
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_lowercase();
    match normalized.as_str() {
        "text" => ColumnType::Text,
        "timestamp" | "timestamp without time zone" => ColumnType::Timestamp,
        _ => ColumnType::Other(declared.to_string()),
    }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
    // CURRENT_TIMESTAMP produces "YYYY-MM-DD HH:MM:SS"
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .map_err(|e| Error::Database(format!("invalid ledger timestamp {s:?}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns(executor: &mut SqliteExecutor) -> Vec<ColumnInfo> {
        let mut tx = executor.begin().unwrap();
        tx.create_ledger("main").unwrap();
        tx.ledger_columns("main").unwrap()
    }

    #[test]
    fn created_ledger_reports_expected_columns() {
        let mut executor = SqliteExecutor::in_memory().unwrap();
        let cols = columns(&mut executor);
        assert_eq!(
            cols,
            vec![
                ColumnInfo::required("id", ColumnType::Text),
                ColumnInfo::required("md5", ColumnType::Text),
                ColumnInfo::required("up", ColumnType::Text),
                ColumnInfo::required("down", ColumnType::Text),
                ColumnInfo::required("created_at", ColumnType::Timestamp),
            ]
        );
    }

    #[test]
    fn insert_list_and_delete_round_trip() {
        let mut executor = SqliteExecutor::in_memory().unwrap();
        let migration = Migration::new("2024010100_init", "CREATE TABLE t(x int)", "DROP TABLE t");

        let mut tx = executor.begin().unwrap();
        tx.create_ledger("main").unwrap();
        tx.insert_ledger_row("main", &migration, "abc").unwrap();
        let rows = tx.ledger_rows("main").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, "2024010100_init");
        assert_eq!(rows[0].md5, "abc");
        assert_eq!(rows[0].up, "CREATE TABLE t(x int)");
        assert_eq!(rows[0].down, "DROP TABLE t");

        tx.delete_ledger_row("main", "2024010100_init").unwrap();
        assert!(tx.ledger_rows("main").unwrap().is_empty());
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut executor = SqliteExecutor::in_memory().unwrap();
        {
            let mut tx = executor.begin().unwrap();
            tx.create_ledger("main").unwrap();
            tx.execute_script("CREATE TABLE t(x int);").unwrap();
        }

        let count: i64 = executor
            .connection()
            .query_row(
                "SELECT count(*) FROM sqlite_master WHERE name IN ('t', 'schema_migration')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn committed_transaction_persists() {
        let mut executor = SqliteExecutor::in_memory().unwrap();
        let mut tx = executor.begin().unwrap();
        tx.execute_script("CREATE TABLE t(x int); INSERT INTO t VALUES (1);")
            .unwrap();
        tx.commit().unwrap();

        let count: i64 = executor
            .connection()
            .query_row("SELECT count(*) FROM t", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn script_errors_carry_driver_message() {
        let mut executor = SqliteExecutor::in_memory().unwrap();
        let mut tx = executor.begin().unwrap();
        let err = tx.execute_script("CREATE TABLE (").unwrap_err();
        assert!(!err.0.is_empty());
    }

    #[test]
    fn maps_declared_types() {
        assert_eq!(column_type("TEXT"), ColumnType::Text);
        assert_eq!(column_type("timestamp"), ColumnType::Timestamp);
        assert_eq!(
            column_type("TIMESTAMP  WITHOUT TIME ZONE"),
            ColumnType::Timestamp
        );
        assert_eq!(
            column_type("TIMESTAMPTZ"),
            ColumnType::Other("TIMESTAMPTZ".into())
        );
        assert_eq!(column_type(""), ColumnType::Other(String::new()));
    }

    #[test]
    fn quotes_identifiers() {
        assert_eq!(quote_ident("main"), "\"main\"");
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
        assert_eq!(ledger_name("main"), "\"main\".\"schema_migration\"");
    }
}
