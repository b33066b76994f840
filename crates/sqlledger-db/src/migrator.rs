use std::path::{Path, PathBuf};

use serde::Serialize;
use sqlledger_common::Result;
use tracing::{error, info};

use crate::downgrade::downgrade;
use crate::executor::{LedgerTransaction, TransactionalExecutor};
use crate::files::{Migration, load_migrations};
use crate::ledger::{LedgerReconciler, SchemaGuard};
use crate::status::{MigrationState, MigrationStatus, StatusReport};
use crate::upgrade::{Step, classify, highest_applied, upgrade};

/// Result of a committed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    /// Every migration found on disk, ascending by id.
    pub migrations: Vec<Migration>,
    /// Ids applied by this run, in application order.
    pub applied: Vec<String>,
    /// Ids rolled back by this run, in rollback order.
    pub rolled_back: Vec<String>,
    /// Ids already applied with matching checksums.
    pub unchanged: Vec<String>,
}

/// Reconciles one migrations directory against the ledger of one database.
#[derive(Debug, Clone)]
pub struct Migrator {
    dir: PathBuf,
    schema: Option<String>,
    down_mode: bool,
}

impl Migrator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            schema: None,
            down_mode: false,
        }
    }

    /// Use `schema` instead of the executor's default.
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Permit rolling back migrations whose files were removed.
    pub fn allow_down(mut self, down_mode: bool) -> Self {
        self.down_mode = down_mode;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn schema<'a, E: TransactionalExecutor>(&'a self, executor: &'a E) -> &'a str {
        self.schema
            .as_deref()
            .unwrap_or_else(|| executor.default_schema())
    }

    /// Load the file set and reconcile it in a single transaction.
    ///
    /// Files are fully validated before the transaction opens. Any error
    /// drops the transaction, undoing every change made during the run.
    pub fn reconcile<E: TransactionalExecutor>(&self, executor: &mut E) -> Result<RunReport> {
        let migrations = load_migrations(&self.dir)?;
        let schema = self.schema(executor).to_string();

        let mut tx = executor.begin()?;
        SchemaGuard::ensure(&mut tx, &schema)?;

        let orphans = LedgerReconciler::rollback_candidates(&mut tx, &schema, &migrations)?;
        let rolled_back = downgrade(&mut tx, &schema, &orphans, self.down_mode)?;

        let applied = LedgerReconciler::checksum_candidates(&mut tx, &schema, &migrations)?;
        let outcome = upgrade(&mut tx, &schema, &migrations, &applied)?;

        tx.commit()?;
        info!(
            "migrations in {} are up to date: {} applied, {} rolled back, {} unchanged",
            self.dir.display(),
            outcome.applied.len(),
            rolled_back.len(),
            outcome.unchanged.len()
        );

        Ok(RunReport {
            migrations,
            applied: outcome.applied,
            rolled_back,
            unchanged: outcome.unchanged,
        })
    }

    /// Describe what the next run would find, without changing anything.
    ///
    /// The ledger table may be created to inspect it, but the transaction is
    /// always rolled back and no migration SQL is executed.
    pub fn status<E: TransactionalExecutor>(&self, executor: &mut E) -> Result<StatusReport> {
        let migrations = load_migrations(&self.dir)?;
        let schema = self.schema(executor).to_string();

        let mut tx = executor.begin()?;
        SchemaGuard::ensure(&mut tx, &schema)?;

        let orphans = LedgerReconciler::rollback_candidates(&mut tx, &schema, &migrations)?;
        let applied = LedgerReconciler::checksum_candidates(&mut tx, &schema, &migrations)?;
        drop(tx);

        let highest = highest_applied(&applied);
        let mut entries: Vec<MigrationStatus> = migrations
            .iter()
            .map(|migration| {
                let rows = applied
                    .get(&migration.id)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let state = match classify(migration, rows, highest) {
                    Step::Apply => MigrationState::Pending,
                    Step::Unchanged => MigrationState::Applied,
                    Step::OutOfOrder { .. } => MigrationState::OutOfOrder,
                    Step::Drifted { .. } => MigrationState::Drifted,
                    Step::Corrupt { .. } => MigrationState::Corrupt,
                };
                MigrationStatus {
                    id: migration.id.clone(),
                    state,
                    applied_at: rows.first().map(|row| row.created_at),
                }
            })
            .collect();

        entries.extend(orphans.into_iter().map(|row| MigrationStatus {
            id: row.id,
            state: MigrationState::Orphaned,
            applied_at: Some(row.created_at),
        }));
        entries.sort_by(|a, b| a.id.cmp(&b.id));

        Ok(StatusReport {
            schema,
            migrations: entries,
        })
    }
}

/// Reconcile `dir` against the ledger in `schema` and return the migrations
/// found on disk.
pub fn run<E: TransactionalExecutor>(
    dir: &Path,
    executor: &mut E,
    down_mode: bool,
    schema: &str,
) -> Result<Vec<Migration>> {
    Migrator::new(dir)
        .with_schema(schema)
        .allow_down(down_mode)
        .reconcile(executor)
        .map(|report| report.migrations)
}

/// Like [`run`], but logs a failure instead of returning it.
pub fn run_best_effort<E: TransactionalExecutor>(
    dir: &Path,
    executor: &mut E,
    down_mode: bool,
    schema: &str,
) -> Option<Vec<Migration>> {
    match run(dir, executor, down_mode, schema) {
        Ok(migrations) => Some(migrations),
        Err(e) => {
            error!("migration run for {} failed: {e}", dir.display());
            None
        }
    }
}
