use std::collections::BTreeMap;

use sqlledger_common::{Error, Result};
use tracing::{debug, info};

use crate::executor::{LedgerRow, LedgerTransaction};
use crate::files::Migration;

/// What the apply phase must do with one migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Not in the ledger yet.
    Apply,
    /// In the ledger with a matching checksum.
    Unchanged,
    /// Not in the ledger, but older than something that already is.
    OutOfOrder { highest: String },
    /// In the ledger with a different checksum.
    Drifted { recorded: String, computed: String },
    /// More than one ledger row for the id.
    Corrupt { rows: usize },
}

/// Highest applied id among the rows still backed by files, if any.
pub fn highest_applied(applied: &BTreeMap<String, Vec<LedgerRow>>) -> Option<&str> {
    applied.keys().next_back().map(String::as_str)
}

pub fn classify(migration: &Migration, rows: &[LedgerRow], highest: Option<&str>) -> Step {
    match rows {
        [] => match highest {
            Some(highest) if migration.id.as_str() < highest => Step::OutOfOrder {
                highest: highest.to_string(),
            },
            _ => Step::Apply,
        },
        [row] => {
            let computed = migration.checksum();
            if row.md5 == computed {
                Step::Unchanged
            } else {
                Step::Drifted {
                    recorded: row.md5.clone(),
                    computed,
                }
            }
        }
        rows => Step::Corrupt { rows: rows.len() },
    }
}

/// Ids touched by the apply phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpgradeOutcome {
    pub applied: Vec<String>,
    pub unchanged: Vec<String>,
}

/// Apply every migration that is not yet in the ledger, in ascending id order.
///
/// `migrations` must already be sorted ascending; `applied` comes from
/// [`LedgerReconciler::checksum_candidates`](crate::ledger::LedgerReconciler::checksum_candidates).
/// The highest applied id is taken once, before anything is inserted. A new
/// migration's up script runs before its id is checked against it.
pub fn upgrade<T: LedgerTransaction>(
    tx: &mut T,
    schema: &str,
    migrations: &[Migration],
    applied: &BTreeMap<String, Vec<LedgerRow>>,
) -> Result<UpgradeOutcome> {
    let highest = highest_applied(applied);
    let mut outcome = UpgradeOutcome::default();

    for migration in migrations {
        let rows = applied
            .get(&migration.id)
            .map(Vec::as_slice)
            .unwrap_or_default();

        match classify(migration, rows, highest) {
            Step::Unchanged => {
                debug!("migration {} already applied", migration.id);
                outcome.unchanged.push(migration.id.clone());
            }
            step @ (Step::Apply | Step::OutOfOrder { .. }) => {
                tx.execute_script(&migration.up)
                    .map_err(|e| Error::UpMigrationFailed {
                        id: migration.id.clone(),
                        sql: migration.up.clone(),
                        message: e.0,
                    })?;
                // A failing script reports as such even when the id is also out of order.
                if let Step::OutOfOrder { highest } = step {
                    return Err(Error::OutOfOrderMigration {
                        id: migration.id.clone(),
                        highest,
                    });
                }
                tx.insert_ledger_row(schema, migration, &migration.checksum())?;
                info!("applied migration {}", migration.id);
                outcome.applied.push(migration.id.clone());
            }
            Step::Drifted { recorded, computed } => {
                return Err(Error::ChecksumMismatch {
                    id: migration.id.clone(),
                    recorded,
                    computed,
                });
            }
            Step::Corrupt { rows } => {
                return Err(Error::LedgerIntegrity {
                    id: migration.id.clone(),
                    rows,
                });
            }
        }
    }

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn row(migration: &Migration, md5: &str) -> LedgerRow {
        LedgerRow {
            id: migration.id.clone(),
            md5: md5.to_string(),
            up: migration.up.clone(),
            down: migration.down.clone(),
            created_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn classifies_new_migration() {
        let m = Migration::new("2024010100_init", "CREATE TABLE t(x int)", "DROP TABLE t");
        assert_eq!(classify(&m, &[], None), Step::Apply);
        assert_eq!(classify(&m, &[], Some("2024010100_init")), Step::Apply);
        assert_eq!(classify(&m, &[], Some("2023010100_old")), Step::Apply);
    }

    #[test]
    fn classifies_migration_older_than_ledger() {
        let m = Migration::new("2023010100_old", "SELECT 1", "SELECT 1");
        assert_eq!(
            classify(&m, &[], Some("2024010100_init")),
            Step::OutOfOrder {
                highest: "2024010100_init".into()
            }
        );
    }

    #[test]
    fn classifies_applied_migration_by_checksum() {
        let m = Migration::new("2024010100_init", "CREATE TABLE t(x int)", "DROP TABLE t");
        let good = row(&m, &m.checksum());
        assert_eq!(classify(&m, &[good], None), Step::Unchanged);

        let stale = row(&m, "0123");
        assert_eq!(
            classify(&m, &[stale], None),
            Step::Drifted {
                recorded: "0123".into(),
                computed: m.checksum(),
            }
        );
    }

    #[test]
    fn classifies_duplicate_rows_as_corrupt() {
        let m = Migration::new("2024010100_init", "SELECT 1", "SELECT 1");
        let r = row(&m, &m.checksum());
        assert_eq!(
            classify(&m, &[r.clone(), r], None),
            Step::Corrupt { rows: 2 }
        );
    }

    #[test]
    fn highest_applied_is_none_for_empty_ledger() {
        assert_eq!(highest_applied(&BTreeMap::new()), None);

        let m1 = Migration::new("0000000001_a", "", "");
        let m2 = Migration::new("0000000002_b", "", "");
        let mut applied = BTreeMap::new();
        applied.insert(m2.id.clone(), vec![row(&m2, "x")]);
        applied.insert(m1.id.clone(), vec![row(&m1, "y")]);
        assert_eq!(highest_applied(&applied), Some("0000000002_b"));
    }
}
