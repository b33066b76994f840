use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use sqlledger_config::AppConfig;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::commands;
use crate::report;

const DEBOUNCE_MS: u64 = 500;

/// Watches a migrations directory and signals on every change to a file in it.
pub struct DirectoryWatcher {
    // Dropping the watcher stops watching.
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    pub fn start(dir: &Path) -> Result<(Self, mpsc::Receiver<()>), notify::Error> {
        let (tx, rx) = mpsc::channel::<()>(8);

        let mut watcher =
            notify::recommended_watcher(move |event: notify::Result<notify::Event>| {
                if let Ok(event) = event {
                    if is_relevant(&event.kind) {
                        let _ = tx.try_send(());
                    }
                }
            })?;

        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!("watching migrations in {}", dir.display());
        Ok((Self { _watcher: watcher }, rx))
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

/// Run `up` now and after every debounced change until Ctrl+C.
///
/// A failing run is logged and the loop keeps going with the previous
/// database state, which the failed transaction left untouched.
pub async fn run_watch(config: AppConfig, down_mode: bool) -> Result<()> {
    let dir: PathBuf = config.migrations_dir.clone();
    let (_watcher, mut rx) = DirectoryWatcher::start(&dir)
        .with_context(|| format!("failed to watch {}", dir.display()))?;

    reconcile_logged(&config, down_mode).await;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("stopping watch");
                break;
            }
            event = rx.recv() => {
                if event.is_none() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(DEBOUNCE_MS)).await;
                while rx.try_recv().is_ok() {}
                reconcile_logged(&config, down_mode).await;
            }
        }
    }

    Ok(())
}

async fn reconcile_logged(config: &AppConfig, down_mode: bool) {
    let config = config.clone();
    let outcome =
        tokio::task::spawn_blocking(move || commands::run_up(&config, down_mode)).await;

    match outcome {
        Ok(Ok(run)) => report::print_run_report(&run),
        Ok(Err(e)) => error!("migration run failed, waiting for the next change: {e:#}"),
        Err(e) => warn!("migration task did not complete: {e}"),
    }
}
