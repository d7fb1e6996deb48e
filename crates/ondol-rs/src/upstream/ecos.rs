//! Bank of Korea ECOS statistics client.
//!
//! ECOS addresses everything through path segments rather than a query
//! string: `/{endpoint}/{key}/json/kr/{start}/{end}/...` with
//! endpoint-specific trailing segments. Errors come back in-band as a
//! `RESULT` object; `INFO-200` ("no data found") is a valid empty result,
//! not a failure.

use super::{FetchError, FetchFuture, Upstream};
use crate::Record;
use std::collections::BTreeMap;
use tracing::debug;

/// Default pagination window when the caller does not narrow it.
const DEFAULT_START: &str = "1";
const DEFAULT_END: &str = "100";

/// Client for one ECOS endpoint.
pub struct EcosUpstream {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    /// Endpoint name, e.g. `StatisticSearch`. Doubles as the key the row
    /// array is nested under in the response.
    endpoint: &'static str,
}

impl EcosUpstream {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        base_url: impl Into<String>,
        endpoint: &'static str,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.into(),
            endpoint,
        }
    }
}

impl Upstream for EcosUpstream {
    fn fetch(&self, params: &BTreeMap<String, String>) -> FetchFuture<'_> {
        let params = params.clone();
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| FetchError::Auth("ECOS_API_KEY is not set".into()))?;

            let mut url = format!("{}/{}/{}/json/kr", self.base_url, self.endpoint, api_key);
            for segment in path_segments(self.endpoint, &params) {
                url.push('/');
                url.push_str(&segment);
            }

            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(FetchError::from_transport)?;
            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(FetchError::from_transport)?;
            if !status.is_success() {
                return Err(FetchError::from_status(status, &body));
            }

            let data: serde_json::Value = serde_json::from_str(&body)
                .map_err(|e| FetchError::Malformed(format!("not JSON: {e}")))?;
            let records = extract_rows(self.endpoint, &data)?;
            debug!("{}: {} rows", self.endpoint, records.len());
            Ok(records)
        })
    }
}

/// Trailing URL segments for each endpoint, drawn from the parameter map.
///
/// The pagination window always leads; endpoint-specific codes follow in
/// the order the API defines. Optional segments are simply omitted, which
/// ECOS treats as "unfiltered".
fn path_segments(endpoint: &str, params: &BTreeMap<String, String>) -> Vec<String> {
    let get = |name: &str| params.get(name).cloned();
    let mut segments = vec![
        get("start").unwrap_or_else(|| DEFAULT_START.into()),
        get("end").unwrap_or_else(|| DEFAULT_END.into()),
    ];
    match endpoint {
        "StatisticSearch" => {
            segments.extend(
                ["stat_code", "cycle", "start_time", "end_time"]
                    .into_iter()
                    .filter_map(&get),
            );
            for i in 1..=4 {
                match get(&format!("item_code{i}")) {
                    Some(code) => segments.push(code),
                    None => break,
                }
            }
        }
        "StatisticTableList" | "StatisticItemList" => {
            segments.extend(get("stat_code"));
        }
        "StatisticWord" => {
            segments.extend(get("word"));
        }
        // KeyStatisticList takes only the window.
        _ => {}
    }
    segments
}

/// Pull the row array out of a response, honoring the in-band RESULT codes.
fn extract_rows(endpoint: &str, data: &serde_json::Value) -> Result<Vec<Record>, FetchError> {
    if let Some(result) = data.get("RESULT") {
        let code = result
            .get("CODE")
            .and_then(|c| c.as_str())
            .unwrap_or("(none)");
        let message = result
            .get("MESSAGE")
            .and_then(|m| m.as_str())
            .unwrap_or_default();
        return match code {
            // INFO-200: no data for the query. Valid empty result.
            "INFO-000" | "INFO-200" => Ok(Vec::new()),
            "INFO-100" => Err(FetchError::Auth(format!("{code}: {message}"))),
            _ => Err(FetchError::Malformed(format!("{code}: {message}"))),
        };
    }

    let rows = data
        .get(endpoint)
        .and_then(|section| section.get("row"))
        .and_then(|rows| rows.as_array())
        .ok_or_else(|| {
            FetchError::Malformed(format!("response has no {endpoint}.row array"))
        })?;

    Ok(rows
        .iter()
        .filter_map(|row| row.as_object().cloned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn search_segments_in_api_order() {
        let p = params(&[
            ("stat_code", "200Y001"),
            ("cycle", "A"),
            ("start_time", "2020"),
            ("end_time", "2024"),
            ("item_code1", "10101"),
        ]);
        let segments = path_segments("StatisticSearch", &p);
        assert_eq!(
            segments,
            vec!["1", "100", "200Y001", "A", "2020", "2024", "10101"]
        );
    }

    #[test]
    fn window_defaults_apply() {
        let segments = path_segments("KeyStatisticList", &params(&[]));
        assert_eq!(segments, vec!["1", "100"]);
    }

    #[test]
    fn table_list_appends_optional_stat_code() {
        let with = path_segments("StatisticTableList", &params(&[("stat_code", "102Y004")]));
        assert_eq!(with.last().map(String::as_str), Some("102Y004"));
        let without = path_segments("StatisticTableList", &params(&[]));
        assert_eq!(without.len(), 2);
    }

    #[test]
    fn word_segment_follows_window() {
        let segments = path_segments("StatisticWord", &params(&[("word", "기준금리")]));
        assert_eq!(segments, vec!["1", "100", "기준금리"]);
    }

    #[test]
    fn rows_are_extracted() {
        let data = serde_json::json!({
            "StatisticSearch": {
                "list_total_count": 2,
                "row": [
                    {"TIME": "2023", "DATA_VALUE": "3.5"},
                    {"TIME": "2024", "DATA_VALUE": "3.0"}
                ]
            }
        });
        let rows = extract_rows("StatisticSearch", &data).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["DATA_VALUE"], "3.5");
    }

    #[test]
    fn no_data_result_is_empty_success() {
        let data = serde_json::json!({
            "RESULT": {"CODE": "INFO-200", "MESSAGE": "해당하는 데이터가 없습니다."}
        });
        assert!(extract_rows("StatisticSearch", &data).unwrap().is_empty());
    }

    #[test]
    fn bad_key_result_is_auth() {
        let data = serde_json::json!({
            "RESULT": {"CODE": "INFO-100", "MESSAGE": "인증키가 유효하지 않습니다."}
        });
        let err = extract_rows("StatisticSearch", &data).unwrap_err();
        assert!(matches!(err, FetchError::Auth(_)));
    }

    #[test]
    fn missing_row_array_is_malformed() {
        let err = extract_rows("StatisticSearch", &serde_json::json!({"odd": true})).unwrap_err();
        assert!(matches!(err, FetchError::Malformed(_)));
    }
}
