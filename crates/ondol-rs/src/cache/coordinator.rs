//! Fetch-or-serve coordination with stale fallback.
//!
//! One algorithm for every collection tool: derive the key, serve a fresh
//! hit directly, otherwise call upstream (with retries for transient
//! failures), persist the result, and if upstream is down serve the stale
//! entry flagged as degraded. Only when there is nothing cached at all does
//! an upstream failure surface as an error envelope.
//!
//! Per request:
//! `START -> KEY_DERIVED -> {CACHE_HIT_FRESH -> DONE}
//!  | {CACHE_MISS_OR_STALE -> UPSTREAM_CALL -> {OK -> PERSIST -> DONE}
//!     | {FAIL -> {STALE_AVAILABLE -> DONE_DEGRADED} | {NO_STALE -> ERROR}}}`

use super::key::{self, CacheKey, ParamSpec};
use super::store::{CacheEntry, CacheStore};
use super::FreshnessPolicy;
use crate::upstream::retry::{self, RetryConfig};
use crate::upstream::Upstream;
use crate::{preview_of, Stage, ToolResult};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Orchestrates cache lookups, upstream refreshes, and fallback.
#[derive(Debug, Clone)]
pub struct Coordinator {
    store: CacheStore,
    policy: FreshnessPolicy,
    retry: RetryConfig,
}

impl Coordinator {
    pub fn new(store: CacheStore, policy: FreshnessPolicy, retry: RetryConfig) -> Self {
        Self {
            store,
            policy,
            retry,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// Resolve one collection request to a result envelope.
    ///
    /// Every exit path produces a [`ToolResult`]; nothing propagates out of
    /// here as an error.
    pub async fn resolve(
        &self,
        tool: &str,
        spec: &[ParamSpec],
        params: &BTreeMap<String, String>,
        upstream: &dyn Upstream,
    ) -> ToolResult {
        // Validation happens here, before any cache or upstream access.
        let cache_key = match key::derive(tool, spec, params) {
            Ok(k) => k,
            Err(e) => return ToolResult::error(Stage::KeyDerivation, e.to_string()),
        };

        // A corrupt artifact is treated as a miss: the refetch below
        // overwrites it, which is also the repair.
        let existing = match self.store.get(&cache_key) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("{tool}: {e}; treating as cache miss");
                None
            }
        };

        if let Some(entry) = &existing {
            let age = self.store.age(entry);
            if self.policy.is_fresh(age) {
                debug!(
                    "{tool}: fresh cache hit for {cache_key} (age {}s)",
                    age.as_secs()
                );
                return self.entry_result(&cache_key, entry, false);
            }
            debug!(
                "{tool}: stale entry for {cache_key} (age {}s), refreshing",
                age.as_secs()
            );
        }

        match retry::with_retry(&self.retry, tool, || upstream.fetch(params)).await {
            Ok(records) => {
                info!(
                    "{tool}: fetched {} records for {cache_key}",
                    records.len()
                );
                match self.store.put(&cache_key, params, records) {
                    Ok(entry) => self.entry_result(&cache_key, &entry, false),
                    Err(e) => ToolResult::error(Stage::Persist, e),
                }
            }
            Err(e) => match existing {
                // Degraded service: the stale entry beats an error.
                Some(entry) => {
                    warn!(
                        "{tool}: upstream failed ({}), serving stale {cache_key}: {e}",
                        e.kind()
                    );
                    self.entry_result(&cache_key, &entry, true)
                }
                None => ToolResult::error(
                    Stage::UpstreamFetch,
                    format!("[{}] {e}", e.kind()),
                ),
            },
        }
    }

    fn entry_result(&self, cache_key: &CacheKey, entry: &CacheEntry, stale: bool) -> ToolResult {
        let path = self.store.path_for(cache_key).display().to_string();
        let preview = preview_of(&entry.records);
        let text = if entry.records.is_empty() {
            format!("{path} (no records for this query)")
        } else {
            path
        };
        if stale {
            ToolResult::degraded(text, preview)
        } else {
            match preview {
                Some(p) => ToolResult::success_with_preview(text, p),
                None => ToolResult::success(text),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::key::ParamShape;
    use crate::upstream::{FetchError, FetchFuture};
    use crate::Record;
    use chrono::Utc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    const TRADE_SPEC: &[ParamSpec] = &[
        ParamSpec::required("lawd_cd", ParamShape::RegionCode),
        ParamSpec::required("deal_ymd", ParamShape::YearMonth),
    ];

    /// Scripted upstream: pops one outcome per call, counts calls.
    struct ScriptedUpstream {
        calls: AtomicU32,
        outcomes: Mutex<Vec<Result<Vec<Record>, FetchError>>>,
    }

    impl ScriptedUpstream {
        fn new(outcomes: Vec<Result<Vec<Record>, FetchError>>) -> Self {
            Self {
                calls: AtomicU32::new(0),
                outcomes: Mutex::new(outcomes),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl Upstream for ScriptedUpstream {
        fn fetch(&self, _params: &BTreeMap<String, String>) -> FetchFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let outcome = {
                let mut outcomes = self.outcomes.lock().unwrap_or_else(|e| e.into_inner());
                if outcomes.is_empty() {
                    Err(FetchError::Network("script exhausted".into()))
                } else {
                    outcomes.remove(0)
                }
            };
            Box::pin(async move { outcome })
        }
    }

    fn record(amount: &str) -> Record {
        [(
            "dealAmount".to_string(),
            serde_json::Value::String(amount.to_string()),
        )]
        .into_iter()
        .collect()
    }

    fn params() -> BTreeMap<String, String> {
        [
            ("lawd_cd".to_string(), "11680".to_string()),
            ("deal_ymd".to_string(), "202505".to_string()),
        ]
        .into()
    }

    fn coordinator(dir: &TempDir) -> Coordinator {
        Coordinator::new(
            CacheStore::new(dir.path()).unwrap(),
            FreshnessPolicy::default(),
            RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
        )
    }

    fn backdate(c: &Coordinator, hours: i64) {
        let cache_key = key::derive("get_apt_trade_data", TRADE_SPEC, &params()).unwrap();
        let mut entry = c.store().get(&cache_key).unwrap().unwrap();
        entry.fetched_at = Utc::now() - chrono::Duration::hours(hours);
        c.store().write_entry(&cache_key, &entry).unwrap();
    }

    #[tokio::test]
    async fn miss_fetches_persists_and_returns_path() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream = ScriptedUpstream::new(vec![Ok(vec![record("82,500")])]);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(result.is_success());
        assert_eq!(upstream.calls(), 1);
        let cache_key = key::derive("get_apt_trade_data", TRADE_SPEC, &params()).unwrap();
        assert_eq!(result.text, c.store().path_for(&cache_key).display().to_string());
        assert!(c.store().path_for(&cache_key).exists());
        assert!(result.preview.is_some());
    }

    #[tokio::test]
    async fn fresh_repeat_issues_no_upstream_call() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream = ScriptedUpstream::new(vec![Ok(vec![record("82,500")])]);

        let first = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;
        let second = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert_eq!(upstream.calls(), 1);
        assert_eq!(first.text, second.text);
        assert!(!second.served_stale);
    }

    #[tokio::test]
    async fn malformed_region_code_fails_before_upstream() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream = ScriptedUpstream::new(vec![Ok(vec![])]);
        let mut bad = params();
        bad.insert("lawd_cd".into(), "00000".into());

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &bad, &upstream)
            .await;

        assert!(!result.is_success());
        assert_eq!(result.stage, Some(Stage::KeyDerivation));
        assert_eq!(upstream.calls(), 0);
    }

    #[tokio::test]
    async fn stale_entry_is_served_when_refresh_fails() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream = ScriptedUpstream::new(vec![
            Ok(vec![record("82,500")]),
            Err(FetchError::Timeout("upstream down".into())),
        ]);

        c.resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;
        backdate(&c, 30);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(result.is_success());
        assert!(result.served_stale);
        assert_eq!(upstream.calls(), 2);
        // The stale payload is still the old one.
        let preview = result.preview.unwrap();
        assert_eq!(preview[0]["dealAmount"], "82,500");
    }

    #[tokio::test]
    async fn twenty_hour_old_entry_is_fresh_enough_to_skip_upstream() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream = ScriptedUpstream::new(vec![Ok(vec![record("82,500")])]);

        c.resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;
        backdate(&c, 20);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(result.is_success());
        assert!(!result.served_stale);
        assert_eq!(upstream.calls(), 1);
    }

    #[tokio::test]
    async fn timeout_with_twenty_hour_entry_under_short_window_degrades() {
        // With a 12h window a 20-hour-old entry is stale; the refresh
        // times out and the old payload comes back flagged, not an error.
        let dir = TempDir::new().unwrap();
        let c = Coordinator::new(
            CacheStore::new(dir.path()).unwrap(),
            FreshnessPolicy::new(Duration::from_secs(12 * 3600)),
            RetryConfig {
                max_retries: 0,
                ..Default::default()
            },
        );
        let upstream = ScriptedUpstream::new(vec![
            Ok(vec![record("82,500")]),
            Err(FetchError::Timeout("upstream down".into())),
        ]);

        c.resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;
        backdate(&c, 20);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(result.is_success());
        assert!(result.served_stale);
        assert_eq!(result.stage, None);
        assert_eq!(upstream.calls(), 2);
    }

    #[tokio::test]
    async fn failure_with_no_prior_entry_is_an_error() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream =
            ScriptedUpstream::new(vec![Err(FetchError::Timeout("no route".into()))]);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(!result.is_success());
        assert_eq!(result.stage, Some(Stage::UpstreamFetch));
        assert!(result.text.contains("timeout"));
    }

    #[tokio::test]
    async fn empty_result_is_cached_success() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream = ScriptedUpstream::new(vec![Ok(vec![])]);

        let first = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;
        let second = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(first.is_success());
        assert!(first.text.contains("no records"));
        assert!(first.preview.is_none());
        // The empty artifact satisfies the second call.
        assert_eq!(upstream.calls(), 1);
        assert!(second.is_success());
    }

    #[tokio::test]
    async fn successful_refresh_replaces_stale_payload() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let upstream = ScriptedUpstream::new(vec![
            Ok(vec![record("82,500")]),
            Ok(vec![record("91,000"), record("84,000")]),
        ]);

        c.resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;
        backdate(&c, 30);
        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(!result.served_stale);
        let cache_key = key::derive("get_apt_trade_data", TRADE_SPEC, &params()).unwrap();
        let entry = c.store().get(&cache_key).unwrap().unwrap();
        assert_eq!(entry.records.len(), 2);
    }

    #[tokio::test]
    async fn transient_failures_are_retried_within_budget() {
        let dir = TempDir::new().unwrap();
        let c = Coordinator::new(
            CacheStore::new(dir.path()).unwrap(),
            FreshnessPolicy::default(),
            RetryConfig {
                max_retries: 2,
                initial_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let upstream = ScriptedUpstream::new(vec![
            Err(FetchError::RateLimited("slow down".into())),
            Err(FetchError::Network("reset".into())),
            Ok(vec![record("82,500")]),
        ]);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(result.is_success());
        assert_eq!(upstream.calls(), 3);
    }

    #[tokio::test]
    async fn auth_failures_are_not_retried() {
        let dir = TempDir::new().unwrap();
        let c = Coordinator::new(
            CacheStore::new(dir.path()).unwrap(),
            FreshnessPolicy::default(),
            RetryConfig {
                max_retries: 5,
                initial_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let upstream = ScriptedUpstream::new(vec![Err(FetchError::Auth("bad key".into()))]);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(!result.is_success());
        assert_eq!(upstream.calls(), 1);
        assert!(result.text.contains("auth"));
    }

    #[tokio::test]
    async fn corrupt_artifact_is_repaired_by_refetch() {
        let dir = TempDir::new().unwrap();
        let c = coordinator(&dir);
        let cache_key = key::derive("get_apt_trade_data", TRADE_SPEC, &params()).unwrap();
        std::fs::write(c.store().path_for(&cache_key), "{torn write").unwrap();
        let upstream = ScriptedUpstream::new(vec![Ok(vec![record("82,500")])]);

        let result = c
            .resolve("get_apt_trade_data", TRADE_SPEC, &params(), &upstream)
            .await;

        assert!(result.is_success());
        assert_eq!(upstream.calls(), 1);
        assert!(c.store().get(&cache_key).unwrap().is_some());
    }
}
