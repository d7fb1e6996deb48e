//! Transaction collection tools: one table row per RTMS dataset.
//!
//! Every dataset shares the same argument shape, the same validation, and
//! the same fetch-or-serve algorithm; the only differences are the tool
//! name, the upstream service path, and the label in the description. The
//! per-dataset functions of a naive implementation collapse into
//! [`DATASETS`] plus one handler.

use super::registry::{ToolRegistry, params_from};
use super::ServerContext;
use crate::cache::{ParamShape, ParamSpec};
use crate::upstream::MolitUpstream;
use crate::{Stage, ToolDef, ToolResult, json_schema_for};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One RTMS dataset exposed as a collection tool.
pub struct Dataset {
    pub tool: &'static str,
    /// Service path under the RTMS base URL.
    pub service: &'static str,
    /// Human label used in the tool description.
    pub label: &'static str,
}

/// Every transaction dataset the server exposes.
pub const DATASETS: &[Dataset] = &[
    Dataset {
        tool: "get_apt_trade_data",
        service: "RTMSDataSvcAptTrade/getRTMSDataSvcAptTrade",
        label: "apartment sales (아파트 매매)",
    },
    Dataset {
        tool: "get_apt_rent_data",
        service: "RTMSDataSvcAptRent/getRTMSDataSvcAptRent",
        label: "apartment jeonse/wolse (아파트 전월세)",
    },
    Dataset {
        tool: "get_officetel_trade_data",
        service: "RTMSDataSvcOffiTrade/getRTMSDataSvcOffiTrade",
        label: "officetel sales (오피스텔 매매)",
    },
    Dataset {
        tool: "get_officetel_rent_data",
        service: "RTMSDataSvcOffiRent/getRTMSDataSvcOffiRent",
        label: "officetel jeonse/wolse (오피스텔 전월세)",
    },
    Dataset {
        tool: "get_sh_trade_data",
        service: "RTMSDataSvcSHTrade/getRTMSDataSvcSHTrade",
        label: "detached/multi-family house sales (단독/다가구 매매)",
    },
    Dataset {
        tool: "get_nrg_trade_data",
        service: "RTMSDataSvcNrgTrade/getRTMSDataSvcNrgTrade",
        label: "commercial property sales (상업업무용 매매)",
    },
];

/// Shared parameter table for every transaction dataset.
pub const TRADE_PARAMS: &[ParamSpec] = &[
    ParamSpec::required("lawd_cd", ParamShape::RegionCode),
    ParamSpec::required("deal_ymd", ParamShape::YearMonth),
];

/// Arguments shared by every transaction collection tool.
#[derive(Serialize, Deserialize, JsonSchema)]
pub struct RegionMonthArgs {
    /// Legal district code (법정동코드), exactly 5 digits. Look it up with
    /// `search_region_code` first.
    pub lawd_cd: String,
    /// Transaction year-month as YYYYMM, exactly 6 digits.
    pub deal_ymd: String,
}

fn description(dataset: &Dataset) -> String {
    format!(
        "Fetch actual {label} transaction records for one district and month \
         from the MOLIT open data API, caching them on disk. Requires the \
         5-digit legal district code (use search_region_code to find it) and \
         a YYYYMM year-month. Returns the path to the cached artifact; pair \
         it with the matching analyze_* tool for statistics.",
        label = dataset.label,
    )
}

pub fn register(registry: &mut ToolRegistry) {
    for dataset in DATASETS {
        registry.register(
            ToolDef::new(
                dataset.tool,
                description(dataset),
                json_schema_for::<RegionMonthArgs>(),
            ),
            move |ctx: Arc<ServerContext>, args| async move {
                let parsed: RegionMonthArgs = match serde_json::from_value(args) {
                    Ok(p) => p,
                    Err(e) => return ToolResult::error(Stage::KeyDerivation, e.to_string()),
                };
                let params = params_from(&parsed);
                let upstream = MolitUpstream::new(
                    ctx.http.clone(),
                    ctx.config.public_data_api_key.clone(),
                    ctx.config.molit_base_url.clone(),
                    dataset.service,
                );
                ctx.coordinator
                    .resolve(dataset.tool, TRADE_PARAMS, &params, &upstream)
                    .await
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::testutil::test_context;
    use tempfile::TempDir;

    #[test]
    fn every_dataset_registers_a_tool() {
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new(test_context(&dir));
        register(&mut registry);
        assert_eq!(registry.len(), DATASETS.len());
        for dataset in DATASETS {
            assert!(registry.contains(dataset.tool), "{}", dataset.tool);
        }
    }

    #[test]
    fn schemas_require_both_parameters() {
        let schema = json_schema_for::<RegionMonthArgs>();
        let required = schema["required"].as_array().unwrap();
        assert!(required.contains(&"lawd_cd".into()));
        assert!(required.contains(&"deal_ymd".into()));
    }

    #[tokio::test]
    async fn invalid_month_is_rejected_without_network() {
        // No credentials and an unroutable base URL: reaching upstream
        // would fail loudly, so an early validation error proves ordering.
        let dir = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new(test_context(&dir));
        register(&mut registry);

        let result = registry
            .call(
                "get_apt_trade_data",
                serde_json::json!({"lawd_cd": "11680", "deal_ymd": "2025"}),
            )
            .await;

        assert!(!result.is_success());
        assert_eq!(result.stage, Some(Stage::KeyDerivation));
        assert!(result.text.contains("deal_ymd"));
    }

    #[test]
    fn service_paths_are_rtms_shaped() {
        for dataset in DATASETS {
            assert!(
                dataset.service.starts_with("RTMSDataSvc"),
                "{}",
                dataset.service
            );
            assert!(dataset.service.contains('/'));
        }
    }
}
