//! Legal district code tools.
//!
//! Every transaction tool needs a 5-digit `lawd_cd` first, so the workflow
//! is: `search_region_code` (name to code, against the cached nationwide
//! table) then the collection tool. The table itself is one cache artifact
//! fetched through the coordinator like any other dataset, so it shares the
//! freshness window and the stale-fallback behavior.

use super::ServerContext;
use super::registry::ToolRegistry;
use crate::cache::key;
use crate::upstream::RegionCodeUpstream;
use crate::{Record, Stage, ToolDef, ToolResult, json_schema_for, preview_of};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tool id doubling as the cache key prefix for the table artifact.
pub const REGION_TABLE_TOOL: &str = "get_region_codes";

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct SearchRegionArgs {
    /// Province / metropolitan city name (시도명), e.g. `서울특별시`.
    pub sido: String,
    /// District name (시군구명), e.g. `강남구`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sigungu: Option<String>,
    /// Town / neighborhood name (읍면동명), e.g. `역삼동`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eupmyeon: Option<String>,
}

/// Empty argument object for the table fetch.
#[derive(Serialize, Deserialize, JsonSchema, Default)]
pub struct NoArgs {}

pub fn register(registry: &mut ToolRegistry) {
    registry.register(
        ToolDef::new(
            REGION_TABLE_TOOL,
            "Fetch and cache the full nationwide legal district code table \
             (법정동코드). Mostly useful indirectly: search_region_code \
             resolves names against this table.",
            json_schema_for::<NoArgs>(),
        ),
        |ctx: Arc<ServerContext>, _args| async move { resolve_table(&ctx).await },
    );

    registry.register(
        ToolDef::new(
            "search_region_code",
            "Resolve a district name to the 5-digit legal district code \
             (lawd_cd) the transaction tools require. Give at least the \
             province (sido); add sigungu and eupmyeon to narrow.",
            json_schema_for::<SearchRegionArgs>(),
        ),
        |ctx: Arc<ServerContext>, args| async move {
            let parsed: SearchRegionArgs = match serde_json::from_value(args) {
                Ok(p) => p,
                Err(e) => return ToolResult::error(Stage::KeyDerivation, e.to_string()),
            };
            if parsed.sido.trim().is_empty() {
                return ToolResult::error(
                    Stage::KeyDerivation,
                    "parameter 'sido' must be non-empty",
                );
            }

            // Make sure the table artifact exists and is as fresh as the
            // policy allows; a stale copy after a failed refresh is fine
            // for name lookup.
            let table = resolve_table(&ctx).await;
            if !table.is_success() {
                return table;
            }

            let table_key = match key::derive(REGION_TABLE_TOOL, &[], &BTreeMap::new()) {
                Ok(k) => k,
                Err(e) => return ToolResult::error(Stage::KeyDerivation, e.to_string()),
            };
            let entry = match ctx.store().get(&table_key) {
                Ok(Some(entry)) => entry,
                Ok(None) => {
                    return ToolResult::error(
                        Stage::CacheRead,
                        "district code table artifact disappeared after fetch",
                    );
                }
                Err(e) => return ToolResult::error(Stage::CacheRead, e),
            };

            let matches = matching_districts(
                &entry.records,
                &parsed.sido,
                parsed.sigungu.as_deref(),
                parsed.eupmyeon.as_deref(),
            );
            match lawd_cd_of(&matches) {
                Some(code) => {
                    let shown: Vec<Record> = matches.into_iter().take(5).cloned().collect();
                    let mut result = ToolResult::success(format!(
                        "lawd_cd {code} ({})",
                        [
                            Some(parsed.sido.as_str()),
                            parsed.sigungu.as_deref(),
                            parsed.eupmyeon.as_deref(),
                        ]
                        .into_iter()
                        .flatten()
                        .collect::<Vec<_>>()
                        .join(" "),
                    ));
                    result.preview = preview_of(&shown);
                    result.served_stale = table.served_stale;
                    result
                }
                None => ToolResult::success(format!(
                    "no district matched sido='{}' sigungu='{}' eupmyeon='{}'",
                    parsed.sido,
                    parsed.sigungu.as_deref().unwrap_or(""),
                    parsed.eupmyeon.as_deref().unwrap_or(""),
                )),
            }
        },
    );
}

async fn resolve_table(ctx: &Arc<ServerContext>) -> ToolResult {
    let upstream = RegionCodeUpstream::new(
        ctx.http.clone(),
        ctx.config.public_data_api_key.clone(),
        ctx.config.region_code_url.clone(),
    );
    ctx.coordinator
        .resolve(REGION_TABLE_TOOL, &[], &BTreeMap::new(), &upstream)
        .await
}

/// Filter the table down to live districts matching the given names,
/// best match (lowest 순위) first.
fn matching_districts<'a>(
    records: &'a [Record],
    sido: &str,
    sigungu: Option<&str>,
    eupmyeon: Option<&str>,
) -> Vec<&'a Record> {
    let mut matches: Vec<&Record> = records
        .iter()
        .filter(|r| field_str(r, "시도명") == Some(sido))
        .filter(|r| sigungu.is_none_or(|s| field_str(r, "시군구명") == Some(s)))
        .filter(|r| eupmyeon.is_none_or(|e| field_str(r, "읍면동명") == Some(e)))
        .filter(|r| field_str(r, "폐지여부") != Some("폐지"))
        .collect();
    matches.sort_by_key(|r| rank_of(r));
    matches
}

/// First match's code truncated to the 5 digits RTMS wants.
fn lawd_cd_of(matches: &[&Record]) -> Option<String> {
    let code = matches.first()?.get("법정동코드")?;
    let code = match code {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    let five: String = code.chars().take(5).collect();
    (five.len() == 5).then_some(five)
}

fn field_str<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record.get(name).and_then(|v| v.as_str())
}

fn rank_of(record: &Record) -> u64 {
    match record.get("순위") {
        Some(serde_json::Value::Number(n)) => n.as_u64().unwrap_or(u64::MAX),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(u64::MAX),
        _ => u64::MAX,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn district(code: u64, sido: &str, sigungu: &str, eupmyeon: &str, rank: u64) -> Record {
        let mut r = Record::new();
        r.insert("법정동코드".into(), serde_json::json!(code));
        r.insert("시도명".into(), serde_json::json!(sido));
        r.insert("시군구명".into(), serde_json::json!(sigungu));
        r.insert("읍면동명".into(), serde_json::json!(eupmyeon));
        r.insert("폐지여부".into(), serde_json::json!("존재"));
        r.insert("순위".into(), serde_json::json!(rank));
        r
    }

    fn table() -> Vec<Record> {
        vec![
            district(1168010100, "서울특별시", "강남구", "역삼동", 2),
            district(1168000000, "서울특별시", "강남구", "", 1),
            district(2644000000, "부산광역시", "강서구", "", 1),
        ]
    }

    #[test]
    fn narrows_by_each_name_level() {
        let records = table();
        let seoul = matching_districts(&records, "서울특별시", None, None);
        assert_eq!(seoul.len(), 2);

        let yeoksam = matching_districts(&records, "서울특별시", Some("강남구"), Some("역삼동"));
        assert_eq!(yeoksam.len(), 1);

        let nowhere = matching_districts(&records, "서울특별시", Some("없는구"), None);
        assert!(nowhere.is_empty());
    }

    #[test]
    fn best_rank_wins_and_code_is_truncated() {
        let records = table();
        let matches = matching_districts(&records, "서울특별시", Some("강남구"), None);
        assert_eq!(lawd_cd_of(&matches).as_deref(), Some("11680"));
    }

    #[test]
    fn abolished_districts_are_skipped() {
        let mut records = table();
        records[1].insert("폐지여부".into(), serde_json::json!("폐지"));
        let matches = matching_districts(&records, "서울특별시", Some("강남구"), None);
        // Falls through to the dong-level row.
        assert_eq!(lawd_cd_of(&matches).as_deref(), Some("11680"));
        assert_eq!(matches.len(), 1);
    }

    #[test]
    fn no_match_yields_none() {
        let records = table();
        let matches = matching_districts(&records, "제주특별자치도", None, None);
        assert!(lawd_cd_of(&matches).is_none());
    }
}
