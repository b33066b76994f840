pub mod checksum;
pub mod downgrade;
pub mod executor;
pub mod files;
pub mod ledger;
pub mod migrator;
pub mod sqlite;
pub mod status;
pub mod upgrade;

pub use checksum::checksum;
pub use executor::{
    ColumnInfo, ColumnType, DEFAULT_SCHEMA, DriverError, LEDGER_TABLE, LedgerRow,
    LedgerTransaction, TransactionalExecutor,
};
pub use files::{Migration, load_migrations};
pub use ledger::{LedgerReconciler, SchemaGuard};
pub use migrator::{Migrator, RunReport, run, run_best_effort};
pub use sqlite::{SqliteExecutor, SqliteTransaction};
pub use status::{MigrationState, MigrationStatus, StatusReport};
