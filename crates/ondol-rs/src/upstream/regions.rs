//! Legal district code (법정동코드) table client.
//!
//! The odcloud endpoint serves the full nationwide table as paged JSON.
//! The whole table is fetched in one go and cached as a single artifact;
//! name-to-code resolution happens locally against that artifact.

use super::{FetchError, FetchFuture, Upstream};
use crate::Record;
use std::collections::BTreeMap;
use tracing::debug;

const PER_PAGE: u32 = 1000;
const MAX_PAGES: u32 = 50;

/// Client for the district code table.
pub struct RegionCodeUpstream {
    client: reqwest::Client,
    api_key: Option<String>,
    url: String,
}

impl RegionCodeUpstream {
    pub fn new(client: reqwest::Client, api_key: Option<String>, url: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            url: url.into(),
        }
    }

    async fn fetch_page(&self, api_key: &str, page: u32) -> Result<(Vec<Record>, u64), FetchError> {
        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("serviceKey", api_key),
                ("page", &page.to_string()),
                ("perPage", &PER_PAGE.to_string()),
                ("returnType", "JSON"),
            ])
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
        let rows = data
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| FetchError::Malformed("response has no data array".into()))?;
        let total = data
            .get("totalCount")
            .and_then(|t| t.as_u64())
            .unwrap_or(0);
        let records = rows
            .iter()
            .filter_map(|row| row.as_object().cloned())
            .collect();
        Ok((records, total))
    }
}

impl Upstream for RegionCodeUpstream {
    fn fetch(&self, _params: &BTreeMap<String, String>) -> FetchFuture<'_> {
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| FetchError::Auth("PUBLIC_DATA_API_KEY is not set".into()))?;

            let mut records: Vec<Record> = Vec::new();
            for page in 1..=MAX_PAGES {
                let (rows, total) = self.fetch_page(api_key, page).await?;
                let row_count = rows.len();
                records.extend(rows);
                debug!("district codes: page {page}, {} of {total}", records.len());
                if row_count < PER_PAGE as usize || records.len() as u64 >= total {
                    break;
                }
            }
            Ok(records)
        })
    }
}
