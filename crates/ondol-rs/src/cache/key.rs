//! Cache key derivation and request-parameter validation.
//!
//! A key is determined by the tool identifier plus every query-defining
//! parameter, canonicalized by name order, so identical logical requests
//! always map to the same artifact no matter how the caller ordered its
//! arguments. Validation runs here, before any cache or upstream access:
//! a malformed district code never reaches the wire.

use crate::upstream::FetchError;
use std::collections::BTreeMap;

/// A stable on-disk identifier for one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Artifact file name for this key.
    pub fn file_name(&self) -> String {
        format!("{}.json", self.0)
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Parameter shapes ───────────────────────────────────────────────

/// Expected shape of one parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamShape {
    /// 5-digit legal district code (법정동코드 앞 5자리). All-zero codes
    /// are placeholders, not districts.
    RegionCode,
    /// YYYYMM with a real month.
    YearMonth,
    /// ECOS statistic table code, e.g. `200Y001`.
    StatCode,
    /// ECOS cycle: annual, semiannual, quarterly, monthly, semimonthly, daily.
    Cycle,
    /// ECOS time point; length varies with the cycle (YYYY .. YYYYMMDD).
    TimePoint,
    /// Free text; must be non-empty.
    Text,
}

impl ParamShape {
    fn check(&self, name: &str, value: &str) -> Result<(), FetchError> {
        let ok = match self {
            ParamShape::RegionCode => {
                value.len() == 5
                    && value.bytes().all(|b| b.is_ascii_digit())
                    && value != "00000"
            }
            ParamShape::YearMonth => {
                value.len() == 6 && value.bytes().all(|b| b.is_ascii_digit()) && {
                    let month: u32 = value.get(4..).and_then(|m| m.parse().ok()).unwrap_or(0);
                    (1..=12).contains(&month)
                }
            }
            ParamShape::StatCode => {
                !value.is_empty() && value.chars().all(|c| c.is_ascii_alphanumeric())
            }
            ParamShape::Cycle => matches!(value, "A" | "S" | "Q" | "M" | "SM" | "D"),
            ParamShape::TimePoint => {
                (4..=8).contains(&value.len()) && value.chars().all(|c| c.is_ascii_alphanumeric())
            }
            ParamShape::Text => !value.trim().is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(FetchError::Validation(format!(
                "parameter '{name}' has invalid value '{value}' (expected {})",
                self.describe()
            )))
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            ParamShape::RegionCode => "a 5-digit legal district code",
            ParamShape::YearMonth => "a year-month in YYYYMM form",
            ParamShape::StatCode => "an alphanumeric statistic code",
            ParamShape::Cycle => "one of A, S, Q, M, SM, D",
            ParamShape::TimePoint => "a time point of 4 to 8 characters",
            ParamShape::Text => "non-empty text",
        }
    }
}

/// Declared shape of one tool parameter, a row in the per-tool table.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub shape: ParamShape,
    pub required: bool,
}

impl ParamSpec {
    pub const fn required(name: &'static str, shape: ParamShape) -> Self {
        Self {
            name,
            shape,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, shape: ParamShape) -> Self {
        Self {
            name,
            shape,
            required: false,
        }
    }
}

// ── Derivation ─────────────────────────────────────────────────────

/// Validate `params` against `spec` and derive the canonical key.
///
/// The key is the tool identifier followed by every provided parameter as
/// sorted `name-value` pairs (BTreeMap ordering), sanitized for the
/// filesystem. Parameters beyond the declared spec still participate in
/// the key: anything that could change the upstream result must
/// distinguish the artifact.
pub fn derive(
    tool: &str,
    spec: &[ParamSpec],
    params: &BTreeMap<String, String>,
) -> Result<CacheKey, FetchError> {
    for p in spec {
        match params.get(p.name) {
            Some(value) if !value.is_empty() => p.shape.check(p.name, value)?,
            Some(_) | None if p.required => {
                return Err(FetchError::Validation(format!(
                    "missing required parameter '{}'",
                    p.name
                )));
            }
            _ => {}
        }
    }

    let mut key = sanitize(tool);
    for (name, value) in params {
        if value.is_empty() {
            continue;
        }
        key.push('_');
        key.push_str(&sanitize(name));
        key.push('-');
        key.push_str(&sanitize(value));
    }
    Ok(CacheKey(key))
}

/// Reduce a component to filesystem-safe characters.
///
/// Unicode alphanumerics stay (Korean search words must keep distinct
/// keys); separators and punctuation become underscores.
fn sanitize(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
