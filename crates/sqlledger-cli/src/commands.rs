use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, TimeZone};
use sqlledger_config::AppConfig;
use sqlledger_db::files::parse_filename;
use sqlledger_db::{
    Migration, Migrator, RunReport, SqliteExecutor, StatusReport, load_migrations,
};
use tracing::info;

pub fn migrator(config: &AppConfig, down_mode: bool) -> Migrator {
    let migrator = Migrator::new(&config.migrations_dir).allow_down(down_mode);
    match &config.database.schema {
        Some(schema) => migrator.with_schema(schema.clone()),
        None => migrator,
    }
}

pub fn run_up(config: &AppConfig, down_mode: bool) -> Result<RunReport> {
    let mut executor = SqliteExecutor::open(&config.database.path)?;
    let report = migrator(config, down_mode)
        .reconcile(&mut executor)
        .with_context(|| {
            format!(
                "migration run against {} failed",
                config.database.path.display()
            )
        })?;
    Ok(report)
}

pub fn run_status(config: &AppConfig) -> Result<StatusReport> {
    let mut executor = SqliteExecutor::open(&config.database.path)?;
    let status = migrator(config, false).status(&mut executor)?;
    Ok(status)
}

pub fn run_check(config: &AppConfig) -> Result<Vec<Migration>> {
    let migrations = load_migrations(&config.migrations_dir)?;
    Ok(migrations)
}

/// Write an empty migration pair whose id is the local hour `YYYYMMDDHH`.
pub fn new_migration<Tz: TimeZone>(
    dir: &Path,
    label: &str,
    now: DateTime<Tz>,
) -> Result<(PathBuf, PathBuf)>
where
    Tz::Offset: std::fmt::Display,
{
    if label.is_empty() || label.contains(['/', '\\']) || label.chars().any(char::is_whitespace) {
        bail!("invalid migration label {label:?}");
    }

    let id = format!("{}_{label}", now.format("%Y%m%d%H"));
    let up_name = format!("{id}.up.sql");
    if parse_filename(&up_name).is_none() {
        bail!("label {label:?} does not produce a valid migration filename");
    }
    let up = dir.join(up_name);
    let down = dir.join(format!("{id}.down.sql"));
    if up.exists() || down.exists() {
        bail!("migration {id} already exists in {}", dir.display());
    }

    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    std::fs::write(&up, format!("-- {id}: up\n"))?;
    std::fs::write(&down, format!("-- {id}: down\n"))?;
    info!("created migration {id}");

    Ok((up, down))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn config(dir: &Path) -> AppConfig {
        let mut config = AppConfig::default();
        config.migrations_dir = dir.join("migrations");
        config.database.path = dir.join("test.db");
        config
    }

    #[test]
    fn new_migration_writes_a_loadable_pair() {
        let dir = tempfile::tempdir().unwrap();
        let migrations = dir.path().join("migrations");
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 7, 30, 0).unwrap();

        let (up, down) = new_migration(&migrations, "add_users", now).unwrap();
        assert_eq!(up, migrations.join("2024010107_add_users.up.sql"));
        assert_eq!(down, migrations.join("2024010107_add_users.down.sql"));

        let loaded = load_migrations(&migrations).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, "2024010107_add_users");
    }

    #[test]
    fn new_migration_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap();
        new_migration(dir.path(), "init", now).unwrap();
        assert!(new_migration(dir.path(), "init", now).is_err());
    }

    #[test]
    fn new_migration_rejects_bad_labels() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 7, 0, 0).unwrap();
        assert!(new_migration(dir.path(), "", now).is_err());
        assert!(new_migration(dir.path(), "a/b", now).is_err());
        assert!(new_migration(dir.path(), "add users", now).is_err());
    }

    #[test]
    fn up_then_status_against_a_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let (up, down) = new_migration(&config.migrations_dir, "init", now).unwrap();
        std::fs::write(&up, "CREATE TABLE t(x int);").unwrap();
        std::fs::write(&down, "DROP TABLE t;").unwrap();

        let report = run_up(&config, false).unwrap();
        assert_eq!(report.applied, ["2024010100_init"]);

        let status = run_status(&config).unwrap();
        assert_eq!(status.schema, "main");
        assert!(!status.has_work());
        assert!(!status.is_blocked());
    }
}
