//! Bank of Korea ECOS macro-indicator tools.
//!
//! Rate decisions, price indices, and the housing-related series ECOS
//! publishes give transaction data its macro context. Each endpoint has its
//! own argument shape (unlike the RTMS datasets), so the table carries a
//! per-endpoint schema and parameter spec alongside the shared handler.

use super::ServerContext;
use super::registry::{ToolRegistry, params_from};
use crate::cache::{ParamShape, ParamSpec};
use crate::upstream::EcosUpstream;
use crate::{Stage, ToolDef, ToolResult, json_schema_for};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

// ── Argument shapes ────────────────────────────────────────────────

/// Pagination window shared by every ECOS tool.
#[derive(Serialize, Deserialize, JsonSchema, Default)]
pub struct WindowArgs {
    /// First row to return (1-based). Default 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<u32>,
    /// Last row to return. Default 100.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<u32>,
}

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct TableListArgs {
    /// Statistic table code to narrow to, e.g. `102Y004`. Omit for the
    /// full catalog.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stat_code: Option<String>,
    #[serde(flatten)]
    pub window: WindowArgs,
}

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct WordArgs {
    /// Term to look up in the statistics glossary (통계용어사전).
    pub word: String,
    #[serde(flatten)]
    pub window: WindowArgs,
}

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct ItemListArgs {
    /// Statistic table code whose item hierarchy to list.
    pub stat_code: String,
    #[serde(flatten)]
    pub window: WindowArgs,
}

#[derive(Serialize, Deserialize, JsonSchema)]
pub struct StatisticSearchArgs {
    /// Statistic table code, e.g. `200Y001`.
    pub stat_code: String,
    /// Cycle: A (annual), S (semiannual), Q (quarterly), M (monthly),
    /// SM (semimonthly), D (daily).
    pub cycle: String,
    /// First time point, shaped to the cycle (e.g. `2020`, `202001`).
    pub start_time: String,
    /// Last time point, shaped to the cycle.
    pub end_time: String,
    /// Item code filters, outermost first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code1: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code2: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code3: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_code4: Option<String>,
    #[serde(flatten)]
    pub window: WindowArgs,
}

// ── Tool table ─────────────────────────────────────────────────────

struct Indicator {
    tool: &'static str,
    endpoint: &'static str,
    description: &'static str,
    spec: &'static [ParamSpec],
    schema: fn() -> serde_json::Value,
}

const INDICATORS: &[Indicator] = &[
    Indicator {
        tool: "search_statistic_tables",
        endpoint: "StatisticTableList",
        description: "Browse the Bank of Korea ECOS statistic table catalog, \
                      optionally narrowed to one table code. Use this to find \
                      the stat_code for get_statistic_data.",
        spec: &[ParamSpec::optional("stat_code", ParamShape::StatCode)],
        schema: json_schema_for::<TableListArgs>,
    },
    Indicator {
        tool: "search_statistic_word",
        endpoint: "StatisticWord",
        description: "Look a term up in the ECOS statistics glossary \
                      (통계용어사전).",
        spec: &[ParamSpec::required("word", ParamShape::Text)],
        schema: json_schema_for::<WordArgs>,
    },
    Indicator {
        tool: "list_statistic_items",
        endpoint: "StatisticItemList",
        description: "List the item hierarchy of one ECOS statistic table; \
                      item codes feed get_statistic_data filters.",
        spec: &[ParamSpec::required("stat_code", ParamShape::StatCode)],
        schema: json_schema_for::<ItemListArgs>,
    },
    Indicator {
        tool: "get_statistic_data",
        endpoint: "StatisticSearch",
        description: "Fetch one ECOS statistic series (e.g. the base rate or \
                      a housing price index) for a table code, cycle, and \
                      time range, caching it on disk.",
        spec: &[
            ParamSpec::required("stat_code", ParamShape::StatCode),
            ParamSpec::required("cycle", ParamShape::Cycle),
            ParamSpec::required("start_time", ParamShape::TimePoint),
            ParamSpec::required("end_time", ParamShape::TimePoint),
        ],
        schema: json_schema_for::<StatisticSearchArgs>,
    },
    Indicator {
        tool: "get_key_statistics",
        endpoint: "KeyStatisticList",
        description: "Fetch the ECOS top-100 key indicator snapshot \
                      (100대 통계지표).",
        spec: &[],
        schema: json_schema_for::<WindowArgs>,
    },
];

pub fn register(registry: &mut ToolRegistry) {
    for indicator in INDICATORS {
        registry.register(
            ToolDef::new(indicator.tool, indicator.description, (indicator.schema)()),
            move |ctx: Arc<ServerContext>, args| async move {
                if args.as_object().is_none() {
                    return ToolResult::error(
                        Stage::KeyDerivation,
                        "arguments must be a JSON object",
                    );
                }
                // The typed structs above exist for the published schemas;
                // by this point the arguments are schema-valid JSON, so the
                // generic flattening applies uniformly.
                let params = params_from(&args);
                let upstream = EcosUpstream::new(
                    ctx.http.clone(),
                    ctx.config.ecos_api_key.clone(),
                    ctx.config.ecos_base_url.clone(),
                    indicator.endpoint,
                );
                ctx.coordinator
                    .resolve(indicator.tool, indicator.spec, &params, &upstream)
                    .await
            },
        );
    }
}
