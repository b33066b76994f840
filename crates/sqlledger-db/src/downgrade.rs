use sqlledger_common::{Error, Result};
use tracing::{info, warn};

use crate::executor::{LedgerRow, LedgerTransaction};

/// Roll back ledger rows whose files are gone, newest first.
///
/// `candidates` must already be in descending id order. Nothing is touched
/// unless `down_mode` is set; a disabled gate with pending rollbacks fails the
/// run. Each down script comes from the ledger, not from disk.
pub fn downgrade<T: LedgerTransaction>(
    tx: &mut T,
    schema: &str,
    candidates: &[LedgerRow],
    down_mode: bool,
) -> Result<Vec<String>> {
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let ids: Vec<String> = candidates.iter().map(|row| row.id.clone()).collect();
    if !down_mode {
        warn!(
            "refusing to roll back {} migration(s) without down mode: {}",
            ids.len(),
            ids.join(", ")
        );
        return Err(Error::UnauthorizedDownMigration { ids });
    }

    for row in candidates {
        tx.execute_script(&row.down)
            .map_err(|e| Error::DownMigrationFailed {
                id: row.id.clone(),
                sql: row.down.clone(),
                message: e.0,
            })?;
        tx.delete_ledger_row(schema, &row.id)?;
        info!("rolled back migration {}", row.id);
    }

    Ok(ids)
}
