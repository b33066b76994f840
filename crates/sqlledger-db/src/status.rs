use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Where one migration id stands relative to the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// Files present, not yet applied.
    Pending,
    /// Applied and unchanged since.
    Applied,
    /// Applied, but the files no longer match the recorded checksum.
    Drifted,
    /// Not applied and older than an applied migration.
    OutOfOrder,
    /// In the ledger with no file pair on disk; would be rolled back.
    Orphaned,
    /// More than one ledger row for the id.
    Corrupt,
}

impl MigrationState {
    /// States that make the next run fail.
    pub fn is_blocking(self) -> bool {
        matches!(
            self,
            MigrationState::Drifted | MigrationState::OutOfOrder | MigrationState::Corrupt
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationStatus {
    pub id: String,
    pub state: MigrationState,
    pub applied_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub schema: String,
    pub migrations: Vec<MigrationStatus>,
}

impl StatusReport {
    pub fn count(&self, state: MigrationState) -> usize {
        self.migrations.iter().filter(|m| m.state == state).count()
    }

    pub fn is_blocked(&self) -> bool {
        self.migrations.iter().any(|m| m.state.is_blocking())
    }

    /// Whether an `up` run would have anything to do.
    pub fn has_work(&self) -> bool {
        self.migrations
            .iter()
            .any(|m| matches!(m.state, MigrationState::Pending | MigrationState::Orphaned))
    }
}
