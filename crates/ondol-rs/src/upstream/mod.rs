//! Upstream API clients and the failure taxonomy they share.
//!
//! Every public data provider is wrapped in a thin client implementing
//! [`Upstream`]: take validated parameters, return a flat sequence of
//! [`Record`]s, or fail with one [`FetchError`] kind. The coordinator
//! depends only on this contract; no protocol detail leaks past this module.
//!
//! # Submodules
//!
//! - [`molit`] — MOLIT RTMS actual-transaction endpoints (flat XML, paged).
//! - [`ecos`] — Bank of Korea ECOS statistics (path-segment URLs, JSON).
//! - [`regions`] — the odcloud legal district code table (paged JSON).
//! - [`retry`] — exponential backoff for the retriable failure kinds.
//! - [`xml`] — a minimal scanner for the flat `<item>` payloads RTMS emits.

pub mod ecos;
pub mod molit;
pub mod regions;
pub mod retry;
pub mod xml;

use crate::Record;
use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use thiserror::Error;

pub use ecos::EcosUpstream;
pub use molit::MolitUpstream;
pub use regions::RegionCodeUpstream;
pub use retry::RetryConfig;

// ── Failure taxonomy ───────────────────────────────────────────────

/// What went wrong talking to (or validating input for) an upstream API.
///
/// Retriability is a property of the kind, not the message: rate limits and
/// transient network faults are worth retrying with backoff, while bad
/// parameters, bad credentials, and malformed payloads are not (a retry
/// of a malformed response rarely returns a well-formed one).
#[derive(Debug, Error)]
pub enum FetchError {
    /// Missing or malformed request parameters. Raised before any cache or
    /// network access.
    #[error("invalid parameters: {0}")]
    Validation(String),

    /// Missing, expired, or rejected credential.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The provider throttled us.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Connection-level or 5xx failure.
    #[error("network error: {0}")]
    Network(String),

    /// The response arrived but could not be interpreted.
    #[error("malformed upstream response: {0}")]
    Malformed(String),
}

impl FetchError {
    /// Whether a retry with backoff has any chance of succeeding.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::RateLimited(_) | FetchError::Timeout(_) | FetchError::Network(_)
        )
    }

    /// Short kind label for logs and error envelopes.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Validation(_) => "validation",
            FetchError::Auth(_) => "auth",
            FetchError::RateLimited(_) => "rate-limit",
            FetchError::Timeout(_) => "timeout",
            FetchError::Network(_) => "network",
            FetchError::Malformed(_) => "malformed-response",
        }
    }

    /// Classify a transport-level `reqwest` failure.
    pub fn from_transport(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else {
            FetchError::Network(format!("request failed: {e}"))
        }
    }

    /// Classify a non-success HTTP status.
    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let snippet: String = body.chars().take(200).collect();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            FetchError::Auth(format!("HTTP {status}: {snippet}"))
        } else if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            FetchError::RateLimited(format!("HTTP {status}: {snippet}"))
        } else if status.is_server_error() {
            FetchError::Network(format!("HTTP {status}: {snippet}"))
        } else {
            FetchError::Malformed(format!("HTTP {status}: {snippet}"))
        }
    }
}

// ── Upstream contract ──────────────────────────────────────────────

/// Boxed future returned by [`Upstream::fetch`].
///
/// Type alias to keep the trait dyn-compatible, same shape as the tool
/// execution futures in [`crate::tools`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<Record>, FetchError>> + Send + 'a>>;

/// A data provider queried on cache miss.
///
/// `params` arrive already validated and canonicalized (sorted names) from
/// the key deriver. An empty record set is a valid success: "no transactions
/// this month" is data, not a failure.
pub trait Upstream: Send + Sync {
    fn fetch(&self, params: &BTreeMap<String, String>) -> FetchFuture<'_>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(FetchError::RateLimited("429".into()).is_retryable());
        assert!(FetchError::Timeout("30s".into()).is_retryable());
        assert!(FetchError::Network("reset".into()).is_retryable());
    }

    #[test]
    fn non_retryable_kinds() {
        assert!(!FetchError::Validation("bad code".into()).is_retryable());
        assert!(!FetchError::Auth("bad key".into()).is_retryable());
        assert!(!FetchError::Malformed("not xml".into()).is_retryable());
    }

    #[test]
    fn status_classification() {
        use reqwest::StatusCode;
        assert!(matches!(
            FetchError::from_status(StatusCode::UNAUTHORIZED, ""),
            FetchError::Auth(_)
        ));
        assert!(matches!(
            FetchError::from_status(StatusCode::TOO_MANY_REQUESTS, ""),
            FetchError::RateLimited(_)
        ));
        assert!(matches!(
            FetchError::from_status(StatusCode::BAD_GATEWAY, ""),
            FetchError::Network(_)
        ));
        assert!(matches!(
            FetchError::from_status(StatusCode::NOT_FOUND, ""),
            FetchError::Malformed(_)
        ));
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(FetchError::Timeout("t".into()).kind(), "timeout");
        assert_eq!(
            FetchError::Malformed("m".into()).kind(),
            "malformed-response"
        );
    }
}
