//! On-disk cache store: one JSON artifact per key.
//!
//! Artifacts are small (a month of one district's transactions, a page of
//! statistic rows), so reads load the whole entry and `list` is a
//! load-then-filter pass over the directory. Writes go to a uniquely named
//! temp file and are renamed into place, so concurrent writers to the same
//! key can interleave without ever exposing a torn artifact; the last
//! rename wins.

use super::key::CacheKey;
use crate::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Suffix distinguishing derived summaries from fetch artifacts.
pub const SUMMARY_SUFFIX: &str = "_summary.json";

static WRITER_SEQ: AtomicU64 = AtomicU64::new(0);

/// The persisted unit for one cache key.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CacheEntry {
    pub key: String,
    pub fetched_at: DateTime<Utc>,
    pub params: BTreeMap<String, String>,
    pub records: Vec<Record>,
}

/// Substring/equality filters for [`CacheStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    /// Substring matched against the key, params, and record fields.
    pub contains: Option<String>,
    /// Tool identifier the key must start with.
    pub tool: Option<String>,
    /// Exact `lawd_cd` match.
    pub region: Option<String>,
    /// Exact `deal_ymd` match.
    pub month: Option<String>,
}

impl ListFilter {
    fn matches(&self, entry: &CacheEntry) -> bool {
        if let Some(tool) = &self.tool
            && !entry.key.starts_with(tool.as_str())
        {
            return false;
        }
        if let Some(region) = &self.region
            && entry.params.get("lawd_cd") != Some(region)
        {
            return false;
        }
        if let Some(month) = &self.month
            && entry.params.get("deal_ymd") != Some(month)
        {
            return false;
        }
        if let Some(needle) = &self.contains {
            let in_key = entry.key.contains(needle.as_str());
            let in_params = entry
                .params
                .iter()
                .any(|(k, v)| k.contains(needle.as_str()) || v.contains(needle.as_str()));
            let in_records = entry.records.iter().any(|r| {
                r.iter().any(|(k, v)| {
                    k.contains(needle.as_str())
                        || v.as_str().is_some_and(|s| s.contains(needle.as_str()))
                })
            });
            if !(in_key || in_params || in_records) {
                return false;
            }
        }
        true
    }
}

/// Store rooted at an explicitly injected base directory.
#[derive(Debug, Clone)]
pub struct CacheStore {
    base: PathBuf,
}

impl CacheStore {
    /// Open (and create if needed) a store at `base`.
    pub fn new(base: impl Into<PathBuf>) -> Result<Self, String> {
        let base = base.into();
        std::fs::create_dir_all(&base)
            .map_err(|e| format!("failed to create cache dir {}: {e}", base.display()))?;
        Ok(Self { base })
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Absolute artifact path for a key.
    pub fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.base.join(key.file_name())
    }

    /// Load the entry for `key`, or `None` when no artifact exists.
    ///
    /// An unreadable or unparsable artifact is an error; callers decide
    /// whether that means "treat as miss" (the coordinator does, since the
    /// refetch overwrites it) or "surface" (inspection tools do).
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, String> {
        let path = self.path_for(key);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(format!("failed to read {}: {e}", path.display())),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| format!("corrupt cache artifact {}: {e}", path.display()))
    }

    /// Persist `records` for `key`, stamping the current time.
    ///
    /// Write-new-then-rename: the artifact is never partially visible.
    pub fn put(
        &self,
        key: &CacheKey,
        params: &BTreeMap<String, String>,
        records: Vec<Record>,
    ) -> Result<CacheEntry, String> {
        let entry = CacheEntry {
            key: key.as_str().to_string(),
            fetched_at: Utc::now(),
            params: params.clone(),
            records,
        };
        self.write_entry(key, &entry)?;
        Ok(entry)
    }

    /// Write an already-built entry (used by tests to backdate `fetched_at`).
    pub fn write_entry(&self, key: &CacheKey, entry: &CacheEntry) -> Result<(), String> {
        let path = self.path_for(key);
        let body = serde_json::to_string(entry)
            .map_err(|e| format!("failed to encode cache entry {key}: {e}"))?;

        let seq = WRITER_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = self
            .base
            .join(format!(".{}.{}.{seq}.tmp", key.as_str(), std::process::id()));
        std::fs::write(&tmp, body).map_err(|e| format!("failed to write {}: {e}", tmp.display()))?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            format!("failed to replace {}: {e}", path.display())
        })?;
        debug!("persisted {} ({} records)", path.display(), entry.records.len());
        Ok(())
    }

    /// Age of an entry relative to now.
    pub fn age(&self, entry: &CacheEntry) -> Duration {
        (Utc::now() - entry.fetched_at)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Enumerate entries matching `filter`, newest first.
    ///
    /// Unreadable artifacts are skipped with a warning rather than failing
    /// the whole listing; summaries are not fetch artifacts and are not
    /// listed.
    pub fn list(&self, filter: &ListFilter) -> Result<Vec<CacheEntry>, String> {
        let dir = std::fs::read_dir(&self.base)
            .map_err(|e| format!("failed to read cache dir {}: {e}", self.base.display()))?;

        let mut entries = Vec::new();
        for item in dir.flatten() {
            let name = item.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".json") || name.ends_with(SUMMARY_SUFFIX) {
                continue;
            }
            let raw = match std::fs::read_to_string(item.path()) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("skipping unreadable artifact {name}: {e}");
                    continue;
                }
            };
            match serde_json::from_str::<CacheEntry>(&raw) {
                Ok(entry) if filter.matches(&entry) => entries.push(entry),
                Ok(_) => {}
                Err(e) => warn!("skipping corrupt artifact {name}: {e}"),
            }
        }
        entries.sort_by(|a, b| b.fetched_at.cmp(&a.fetched_at));
        Ok(entries)
    }

    /// Delete the artifact for `key`. Missing artifacts are not an error.
    pub fn remove(&self, key: &CacheKey) -> Result<(), String> {
        let path = self.path_for(key);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(format!("failed to remove {}: {e}", path.display())),
        }
    }
}
