//! Age-based retention sweep.
//!
//! Runs independently of request handling and deletes only artifacts older
//! than the maximum retention, which is always beyond the freshness window:
//! the sweep reclaims disk, it never evicts an entry the coordinator might
//! still serve fresh.

use super::store::{CacheStore, SUMMARY_SUFFIX};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Delete artifacts older than `max_retention`. Returns how many were
/// removed.
///
/// Fetch artifacts age by their recorded `fetched_at`; derived summaries
/// (which carry no timestamp of their own) age by file mtime. Unreadable
/// files are left in place for the operator rather than deleted blind.
pub fn sweep_once(store: &CacheStore, max_retention: Duration) -> Result<usize, String> {
    let dir = std::fs::read_dir(store.base())
        .map_err(|e| format!("failed to read cache dir {}: {e}", store.base().display()))?;

    let mut removed = 0;
    for item in dir.flatten() {
        let path = item.path();
        let name = item.file_name().to_string_lossy().into_owned();
        if !name.ends_with(".json") {
            continue;
        }

        let age = if name.ends_with(SUMMARY_SUFFIX) {
            mtime_age(&path)
        } else {
            artifact_age(&path)
        };
        let Some(age) = age else {
            warn!("sweep: could not determine age of {name}, leaving it");
            continue;
        };

        if age > max_retention {
            match std::fs::remove_file(&path) {
                Ok(()) => {
                    debug!("sweep: removed {name} (age {}h)", age.as_secs() / 3600);
                    removed += 1;
                }
                Err(e) => warn!("sweep: failed to remove {name}: {e}"),
            }
        }
    }
    if removed > 0 {
        info!("sweep: removed {removed} expired artifacts");
    }
    Ok(removed)
}

/// Spawn the periodic sweep task.
pub fn spawn(
    store: CacheStore,
    interval: Duration,
    max_retention: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The immediate first tick would race server startup for no benefit.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = sweep_once(&store, max_retention) {
                warn!("sweep failed: {e}");
            }
        }
    })
}

fn artifact_age(path: &std::path::Path) -> Option<Duration> {
    let raw = std::fs::read_to_string(path).ok()?;
    let entry: super::store::CacheEntry = serde_json::from_str(&raw).ok()?;
    (Utc::now() - entry.fetched_at).to_std().ok()
}

fn mtime_age(path: &std::path::Path) -> Option<Duration> {
    let modified = std::fs::metadata(path).ok()?.modified().ok()?;
    modified.elapsed().ok()
}
