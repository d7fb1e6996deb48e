//! MOLIT RTMS actual-transaction-price client.
//!
//! One client covers every RTMS dataset (apartment sales, officetel rent,
//! commercial property, ...): the endpoints differ only in their service
//! path and are parameterized here, not duplicated. Responses are flat XML
//! with a result-code header, a `totalCount`, and `<item>` rows; the client
//! pages through `numOfRows`/`pageNo` until the advertised total is
//! collected.

use super::{FetchError, FetchFuture, Upstream, xml};
use crate::Record;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Rows requested per page.
const PAGE_SIZE: u32 = 100;

/// Hard page cap; a month of one district never comes close.
const MAX_PAGES: u32 = 50;

/// Client for one RTMS dataset.
pub struct MolitUpstream {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    /// Service path, e.g. `RTMSDataSvcAptTrade/getRTMSDataSvcAptTrade`.
    service: &'static str,
}

impl MolitUpstream {
    pub fn new(
        client: reqwest::Client,
        api_key: Option<String>,
        base_url: impl Into<String>,
        service: &'static str,
    ) -> Self {
        Self {
            client,
            api_key,
            base_url: base_url.into(),
            service,
        }
    }

    async fn fetch_page(
        &self,
        api_key: &str,
        lawd_cd: &str,
        deal_ymd: &str,
        page_no: u32,
    ) -> Result<(Vec<Record>, u32), FetchError> {
        let url = format!("{}/{}", self.base_url, self.service);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("serviceKey", api_key),
                ("LAWD_CD", lawd_cd),
                ("DEAL_YMD", deal_ymd),
                ("numOfRows", &PAGE_SIZE.to_string()),
                ("pageNo", &page_no.to_string()),
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

        check_result_code(&body)?;

        let total = xml::text_of(&body, "totalCount")
            .and_then(|t| t.parse::<u32>().ok())
            .unwrap_or(0);
        Ok((xml::items(&body), total))
    }
}

impl Upstream for MolitUpstream {
    fn fetch(&self, params: &BTreeMap<String, String>) -> FetchFuture<'_> {
        let lawd_cd = params.get("lawd_cd").cloned().unwrap_or_default();
        let deal_ymd = params.get("deal_ymd").cloned().unwrap_or_default();
        Box::pin(async move {
            let api_key = self
                .api_key
                .as_deref()
                .ok_or_else(|| FetchError::Auth("PUBLIC_DATA_API_KEY is not set".into()))?;

            let mut records: Vec<Record> = Vec::new();
            let mut page_no = 1;
            loop {
                let (page, total) = self
                    .fetch_page(api_key, &lawd_cd, &deal_ymd, page_no)
                    .await?;
                let page_len = page.len();
                records.extend(page);
                debug!(
                    "{}: page {page_no} returned {page_len} rows ({} of {total})",
                    self.service,
                    records.len(),
                );
                if page_len == 0 || records.len() as u32 >= total {
                    break;
                }
                if page_no >= MAX_PAGES {
                    warn!(
                        "{}: stopping at page cap {MAX_PAGES} with {} of {total} rows",
                        self.service,
                        records.len(),
                    );
                    break;
                }
                page_no += 1;
            }
            Ok(records)
        })
    }
}

/// Map the data.go.kr result header to the failure taxonomy.
///
/// The portal reports errors in-band two ways: a normal `<resultCode>`
/// header, or an `OpenAPI_ServiceResponse` envelope with a
/// `<returnReasonCode>`. Codes follow the shared OpenAPI table: 20/30/31
/// are credential problems, 22 is the request quota, 01/04/05 are
/// provider-side hiccups worth retrying.
fn check_result_code(body: &str) -> Result<(), FetchError> {
    let code = xml::text_of(body, "resultCode")
        .or_else(|| xml::text_of(body, "returnReasonCode"));
    let Some(code) = code else {
        return Err(FetchError::Malformed(
            "response has no result code header".into(),
        ));
    };
    if code == "000" || code == "00" {
        return Ok(());
    }
    let msg = xml::text_of(body, "resultMsg")
        .or_else(|| xml::text_of(body, "returnAuthMsg"))
        .unwrap_or_default();
    let detail = format!("code {code}: {msg}");
    Err(match code.as_str() {
        "20" | "30" | "31" => FetchError::Auth(detail),
        "22" => FetchError::RateLimited(detail),
        "01" | "04" | "05" => FetchError::Network(detail),
        _ => FetchError::Malformed(detail),
    })
}
