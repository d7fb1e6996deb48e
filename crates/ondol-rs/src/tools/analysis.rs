//! Summaries over cached artifacts, plus cache inspection.
//!
//! Analysis never talks to upstream: it reads an artifact a collection tool
//! already persisted, aggregates it according to that dataset's
//! [`SummaryPlan`], and caches the summary beside the artifact. The summary
//! is recomputed only when the artifact is newer than it (mtime
//! comparison), mirroring the fetch cache one level up.

use super::ServerContext;
use super::registry::ToolRegistry;
use crate::cache::store::SUMMARY_SUFFIX;
use crate::cache::CacheEntry;
use crate::stats::{SummaryMode, SummaryPlan, summarize};
use crate::{Stage, ToolDef, ToolResult, json_schema_for};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

// ── Plans ──────────────────────────────────────────────────────────

const DONG: (&str, &[&str]) = ("byDong", &["umdNm", "법정동"]);
const DAY: &[&str] = &["dealDay", "일"];
const SALE_AMOUNT: &[&str] = &["dealAmount", "거래금액"];
const DEPOSIT: &[&str] = &["deposit", "보증금액", "보증금"];
const MONTHLY_RENT: &[&str] = &["monthlyRent", "월세금액", "월세"];

const SALE_BY_DONG: SummaryPlan = SummaryPlan {
    mode: SummaryMode::Sale,
    amount_fields: SALE_AMOUNT,
    deposit_fields: &[],
    monthly_rent_fields: &[],
    groups: &[DONG],
    day_fields: DAY,
};

const RENT_BY_DONG: SummaryPlan = SummaryPlan {
    mode: SummaryMode::Rent,
    amount_fields: &[],
    deposit_fields: DEPOSIT,
    monthly_rent_fields: MONTHLY_RENT,
    groups: &[DONG],
    day_fields: DAY,
};

struct AnalysisTool {
    tool: &'static str,
    /// The collection tool whose artifacts this summarizes.
    source: &'static str,
    plan: SummaryPlan,
}

const ANALYSES: &[AnalysisTool] = &[
    AnalysisTool {
        tool: "analyze_apartment_trade",
        source: "get_apt_trade_data",
        plan: SummaryPlan {
            groups: &[DONG, ("byComplex", &["aptNm", "아파트"])],
            ..SALE_BY_DONG
        },
    },
    AnalysisTool {
        tool: "analyze_apartment_rent",
        source: "get_apt_rent_data",
        plan: RENT_BY_DONG,
    },
    AnalysisTool {
        tool: "analyze_officetel_trade",
        source: "get_officetel_trade_data",
        plan: SummaryPlan {
            groups: &[DONG, ("byComplex", &["offiNm", "단지"])],
            ..SALE_BY_DONG
        },
    },
    AnalysisTool {
        tool: "analyze_officetel_rent",
        source: "get_officetel_rent_data",
        plan: RENT_BY_DONG,
    },
    AnalysisTool {
        tool: "analyze_sh_trade",
        source: "get_sh_trade_data",
        plan: SALE_BY_DONG,
    },
    AnalysisTool {
        tool: "analyze_commercial_trade",
        source: "get_nrg_trade_data",
        plan: SummaryPlan {
            groups: &[
                DONG,
                ("byBuildingUse", &["buildingUse", "건물용도"]),
                ("byBuyer", &["buyerGbn", "구매자구분"]),
            ],
            ..SALE_BY_DONG
        },
    },
];

// ── Arguments ──────────────────────────────────────────────────────

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct AnalyzeArgs {
    /// Path to a cached artifact, as returned by the collection tool.
    pub file_path: String,
}

#[derive(Serialize, Deserialize, JsonSchema, Default)]
pub struct ListCacheArgs {
    /// Substring matched against keys, parameters, and record fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Only entries produced by this tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
    /// Only entries for this 5-digit district code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Only entries for this YYYYMM month.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<String>,
}

// ── Registration ───────────────────────────────────────────────────

pub fn register(registry: &mut ToolRegistry) {
    for analysis in ANALYSES {
        registry.register(
            ToolDef::new(
                analysis.tool,
                format!(
                    "Summarize a cached artifact from {}: overall and grouped \
                     transaction counts and amount statistics (만원). The \
                     summary is cached beside the artifact and reused until \
                     the artifact changes.",
                    analysis.source,
                ),
                json_schema_for::<AnalyzeArgs>(),
            ),
            move |_ctx: Arc<ServerContext>, args| async move {
                let parsed: AnalyzeArgs = match serde_json::from_value(args) {
                    Ok(p) => p,
                    Err(e) => return ToolResult::error(Stage::KeyDerivation, e.to_string()),
                };
                analyze(Path::new(&parsed.file_path), &analysis.plan)
            },
        );
    }

    registry.register(
        ToolDef::new(
            "list_cached_data",
            "List cached artifacts with their age and record counts, \
             filterable by tool, district code, month, or substring.",
            json_schema_for::<ListCacheArgs>(),
        ),
        |ctx: Arc<ServerContext>, args| async move {
            let parsed: ListCacheArgs = match serde_json::from_value(args) {
                Ok(p) => p,
                Err(e) => return ToolResult::error(Stage::KeyDerivation, e.to_string()),
            };
            let filter = crate::cache::ListFilter {
                contains: parsed.contains,
                tool: parsed.tool,
                region: parsed.region,
                month: parsed.month,
            };
            match ctx.store().list(&filter) {
                Ok(entries) => ToolResult::success(format_listing(ctx.as_ref(), &entries)),
                Err(e) => ToolResult::error(Stage::CacheRead, e),
            }
        },
    );
}

// ── Implementation ─────────────────────────────────────────────────

/// Summarize one artifact, reusing a newer-than-source cached summary.
fn analyze(artifact: &Path, plan: &SummaryPlan) -> ToolResult {
    let raw = match std::fs::read_to_string(artifact) {
        Ok(raw) => raw,
        Err(e) => {
            return ToolResult::error(
                Stage::CacheRead,
                format!("failed to read artifact {}: {e}", artifact.display()),
            );
        }
    };
    let entry: CacheEntry = match serde_json::from_str(&raw) {
        Ok(entry) => entry,
        Err(e) => {
            return ToolResult::error(
                Stage::CacheRead,
                format!("not a cache artifact: {}: {e}", artifact.display()),
            );
        }
    };

    let summary_file = summary_path(artifact);
    if summary_is_current(artifact, &summary_file)
        && let Ok(cached) = std::fs::read_to_string(&summary_file)
        && let Ok(summary) = serde_json::from_str::<serde_json::Value>(&cached)
    {
        debug!("reusing summary {}", summary_file.display());
        return ToolResult::success_with_preview(summary_file.display().to_string(), summary);
    }

    let summary = summarize(&entry.records, plan);
    if let Err(e) = write_atomically(&summary_file, &summary) {
        return ToolResult::error(Stage::Persist, e);
    }
    ToolResult::success_with_preview(summary_file.display().to_string(), summary)
}

/// `<artifact stem>_summary.json` beside the artifact.
fn summary_path(artifact: &Path) -> PathBuf {
    let stem = artifact
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    artifact.with_file_name(format!("{stem}{SUMMARY_SUFFIX}"))
}

fn summary_is_current(artifact: &Path, summary: &Path) -> bool {
    let mtime = |p: &Path| std::fs::metadata(p).and_then(|m| m.modified()).ok();
    match (mtime(artifact), mtime(summary)) {
        (Some(a), Some(s)) => s > a,
        _ => false,
    }
}

fn write_atomically(path: &Path, value: &serde_json::Value) -> Result<(), String> {
    let body = serde_json::to_string_pretty(value)
        .map_err(|e| format!("failed to encode summary: {e}"))?;
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, body).map_err(|e| format!("failed to write {}: {e}", tmp.display()))?;
    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        format!("failed to replace {}: {e}", path.display())
    })
}

fn format_listing(ctx: &ServerContext, entries: &[CacheEntry]) -> String {
    const MAX_LINES: usize = 50;
    if entries.is_empty() {
        return "no cached artifacts match".to_string();
    }
    let mut out = format!("{} cached artifact(s):\n", entries.len());
    for entry in entries.iter().take(MAX_LINES) {
        let hours = ctx.store().age(entry).as_secs() / 3600;
        out.push_str(&format!(
            "- {} ({} records, {hours}h old)\n",
            entry.key,
            entry.records.len(),
        ));
    }
    if entries.len() > MAX_LINES {
        out.push_str(&format!("... and {} more\n", entries.len() - MAX_LINES));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Record;
    use crate::cache::key::{ParamShape, ParamSpec, derive};
    use crate::tools::testutil::test_context;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    const SPEC: &[ParamSpec] = &[
        ParamSpec::required("lawd_cd", ParamShape::RegionCode),
        ParamSpec::required("deal_ymd", ParamShape::YearMonth),
    ];

    fn record(pairs: &[(&str, &str)]) -> Record {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
            .collect()
    }

    fn seed_artifact(ctx: &ServerContext, records: Vec<Record>) -> PathBuf {
        let params: BTreeMap<String, String> = [
            ("lawd_cd".to_string(), "11680".to_string()),
            ("deal_ymd".to_string(), "202505".to_string()),
        ]
        .into();
        let key = derive("get_apt_trade_data", SPEC, &params).unwrap();
        ctx.store().put(&key, &params, records).unwrap();
        ctx.store().path_for(&key)
    }

    #[tokio::test]
    async fn analyze_produces_summary_beside_artifact() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let path = seed_artifact(
            &ctx,
            vec![
                record(&[("dealAmount", "80,000"), ("umdNm", "역삼동"), ("dealDay", "3")]),
                record(&[("dealAmount", "100,000"), ("umdNm", "역삼동"), ("dealDay", "9")]),
            ],
        );

        let mut registry = ToolRegistry::new(ctx.clone());
        register(&mut registry);
        let result = registry
            .call(
                "analyze_apartment_trade",
                serde_json::json!({"file_path": path.display().to_string()}),
            )
            .await;

        assert!(result.is_success(), "{}", result.text);
        assert!(result.text.ends_with(SUMMARY_SUFFIX));
        assert!(PathBuf::from(&result.text).exists());
        let summary = result.preview.unwrap();
        assert_eq!(summary["total"]["count"], 2);
        assert_eq!(summary["total"]["avgAmount"], 90_000.0);
        assert_eq!(summary["byDong"][0]["name"], "역삼동");
    }

    #[tokio::test]
    async fn newer_summary_is_reused_stale_summary_is_replaced() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let path = seed_artifact(&ctx, vec![record(&[("dealAmount", "80,000")])]);

        // A summary newer than the artifact is served as-is.
        let summary_file = summary_path(&path);
        std::fs::write(&summary_file, r#"{"marker": "precomputed"}"#).unwrap();
        let first = analyze(&path, &SALE_BY_DONG);
        assert_eq!(first.preview.unwrap()["marker"], "precomputed");

        // Rewriting the artifact invalidates it.
        seed_artifact(&ctx, vec![record(&[("dealAmount", "120,000")])]);
        let second = analyze(&path, &SALE_BY_DONG);
        let summary = second.preview.unwrap();
        assert!(summary.get("marker").is_none());
        assert_eq!(summary["total"]["maxAmount"], 120_000.0);
    }

    #[tokio::test]
    async fn missing_artifact_is_a_cache_read_error() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let mut registry = ToolRegistry::new(ctx);
        register(&mut registry);

        let result = registry
            .call(
                "analyze_apartment_trade",
                serde_json::json!({"file_path": "/nonexistent/artifact.json"}),
            )
            .await;

        assert!(!result.is_success());
        assert_eq!(result.stage, Some(Stage::CacheRead));
    }

    #[tokio::test]
    async fn empty_artifact_summarizes_without_error() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        let path = seed_artifact(&ctx, Vec::new());

        let result = analyze(&path, &SALE_BY_DONG);
        assert!(result.is_success());
        assert_eq!(result.preview.unwrap()["total"]["count"], 0);
    }

    #[tokio::test]
    async fn list_cached_data_reports_entries() {
        let dir = TempDir::new().unwrap();
        let ctx = test_context(&dir);
        seed_artifact(&ctx, vec![record(&[("dealAmount", "80,000")])]);

        let mut registry = ToolRegistry::new(ctx);
        register(&mut registry);

        let all = registry.call("list_cached_data", serde_json::json!({})).await;
        assert!(all.is_success());
        assert!(all.text.contains("get_apt_trade_data"));
        assert!(all.text.contains("1 records"));

        let filtered = registry
            .call(
                "list_cached_data",
                serde_json::json!({"region": "99999"}),
            )
            .await;
        assert!(filtered.text.contains("no cached artifacts"));
    }

    #[test]
    fn summary_path_is_stem_plus_suffix() {
        let p = summary_path(Path::new("/cache/get_apt_trade_data_x.json"));
        assert_eq!(
            p,
            PathBuf::from("/cache/get_apt_trade_data_x_summary.json")
        );
    }

    #[test]
    fn every_analysis_tool_has_a_matching_collection_source() {
        use crate::tools::datasets::DATASETS;
        for analysis in ANALYSES {
            assert!(
                DATASETS.iter().any(|d| d.tool == analysis.source),
                "{} references unknown source {}",
                analysis.tool,
                analysis.source,
            );
        }
    }
}
