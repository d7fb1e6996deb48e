//! Statistical summaries over fetched transaction records.
//!
//! Upstream fields are untyped strings in mixed naming (the portals have
//! shipped both English and Korean tag names over the years), with amounts
//! like `" 82,500 "` in 만원. Parsing is lenient: a field that fails to
//! parse drops that record from the affected statistic, it never fails the
//! summary. Which fields to aggregate and group by is a [`SummaryPlan`]
//! table, one row per tool, not one function per asset type.

use crate::Record;
use serde_json::{Value, json};
use std::collections::BTreeMap;

// ── Numeric parsing ────────────────────────────────────────────────

/// Parse an upstream numeric field: strips commas and whitespace.
pub fn to_num(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
            if cleaned.is_empty() {
                None
            } else {
                cleaned.parse().ok()
            }
        }
        _ => None,
    }
}

/// First present field among `candidates` (new-style English tags first,
/// legacy Korean tags as fallback).
pub fn field_of<'a>(record: &'a Record, candidates: &[&str]) -> Option<&'a Value> {
    candidates.iter().find_map(|name| record.get(*name))
}

/// Numeric value of the first present candidate field.
pub fn num_of(record: &Record, candidates: &[&str]) -> Option<f64> {
    field_of(record, candidates).and_then(to_num)
}

/// Count / mean / min / max over one numeric field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumStats {
    pub count: usize,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl NumStats {
    /// Aggregate the parseable values; `None` when nothing parsed.
    pub fn over(values: impl IntoIterator<Item = f64>) -> Option<Self> {
        let mut count = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            count += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        if count == 0 {
            return None;
        }
        Some(Self {
            count,
            mean: sum / count as f64,
            min,
            max,
        })
    }

    fn to_json(self) -> Value {
        json!({
            "count": self.count,
            "avgAmount": round1(self.mean),
            "minAmount": self.min,
            "maxAmount": self.max,
        })
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

// ── Summary plans ──────────────────────────────────────────────────

/// Whether a dataset reports a single sale price or a deposit/monthly-rent
/// pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryMode {
    Sale,
    Rent,
}

/// Field table driving [`summarize`] for one dataset.
#[derive(Debug, Clone, Copy)]
pub struct SummaryPlan {
    pub mode: SummaryMode,
    /// Sale price candidates (ignored in rent mode).
    pub amount_fields: &'static [&'static str],
    /// Deposit (보증금) candidates, rent mode.
    pub deposit_fields: &'static [&'static str],
    /// Monthly rent (월세) candidates, rent mode.
    pub monthly_rent_fields: &'static [&'static str],
    /// Grouping dimensions: output label and field candidates.
    pub groups: &'static [(&'static str, &'static [&'static str])],
    /// Day-of-month candidates for the by-day series.
    pub day_fields: &'static [&'static str],
}

/// Build the summary document for one artifact's records.
///
/// Empty input produces a summary that says so instead of erroring;
/// "no transactions this month" is an answer.
pub fn summarize(records: &[Record], plan: &SummaryPlan) -> Value {
    if records.is_empty() {
        return json!({
            "amountUnit": "만원",
            "total": { "count": 0 },
            "message": "no transactions recorded for this query",
        });
    }

    let mut summary = serde_json::Map::new();
    summary.insert("amountUnit".into(), json!("만원"));

    match plan.mode {
        SummaryMode::Sale => {
            let total = NumStats::over(records.iter().filter_map(|r| num_of(r, plan.amount_fields)));
            summary.insert(
                "total".into(),
                total.map_or_else(|| json!({"count": records.len()}), NumStats::to_json),
            );
            for (label, candidates) in plan.groups {
                summary.insert(
                    (*label).into(),
                    grouped(records, candidates, plan.amount_fields),
                );
            }
            summary.insert("byDay".into(), day_series(records, plan));
        }
        SummaryMode::Rent => {
            // Jeonse (pure deposit) and wolse (deposit + monthly rent) are
            // different markets; mixing their deposits misleads.
            let (jeonse, wolse): (Vec<&Record>, Vec<&Record>) = records
                .iter()
                .partition(|r| num_of(r, plan.monthly_rent_fields).unwrap_or(0.0) == 0.0);

            summary.insert("total".into(), json!({ "count": records.len() }));
            summary.insert(
                "jeonse".into(),
                rent_block(&jeonse, plan.deposit_fields, None),
            );
            summary.insert(
                "wolse".into(),
                rent_block(&wolse, plan.deposit_fields, Some(plan.monthly_rent_fields)),
            );
            for (label, candidates) in plan.groups {
                summary.insert(
                    (*label).into(),
                    grouped(records, candidates, plan.deposit_fields),
                );
            }
        }
    }

    Value::Object(summary)
}

fn rent_block(records: &[&Record], deposit: &[&str], monthly: Option<&[&str]>) -> Value {
    let mut block = serde_json::Map::new();
    block.insert("count".into(), json!(records.len()));
    if let Some(stats) = NumStats::over(records.iter().filter_map(|r| num_of(r, deposit))) {
        block.insert("deposit".into(), stats.to_json());
    }
    if let Some(fields) = monthly
        && let Some(stats) = NumStats::over(records.iter().filter_map(|r| num_of(r, fields)))
    {
        block.insert("monthlyRent".into(), stats.to_json());
    }
    Value::Object(block)
}

/// Per-group stats, largest group first.
fn grouped(records: &[Record], group_candidates: &[&str], amount_candidates: &[&str]) -> Value {
    let mut buckets: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for record in records {
        let Some(group) = field_of(record, group_candidates).and_then(|v| v.as_str()) else {
            continue;
        };
        let group = group.trim().to_string();
        *counts.entry(group.clone()).or_default() += 1;
        if let Some(amount) = num_of(record, amount_candidates) {
            buckets.entry(group).or_default().push(amount);
        }
    }

    let mut rows: Vec<Value> = counts
        .into_iter()
        .map(|(group, count)| {
            let stats = NumStats::over(buckets.get(&group).into_iter().flatten().copied());
            let mut row = serde_json::Map::new();
            row.insert("name".into(), json!(group));
            row.insert("count".into(), json!(count));
            if let Some(stats) = stats {
                row.insert("avgAmount".into(), json!(round1(stats.mean)));
                row.insert("minAmount".into(), json!(stats.min));
                row.insert("maxAmount".into(), json!(stats.max));
            }
            Value::Object(row)
        })
        .collect();
    rows.sort_by_key(|row| std::cmp::Reverse(row["count"].as_u64().unwrap_or(0)));
    Value::Array(rows)
}

/// Transaction counts and averages per day of month, ascending.
fn day_series(records: &[Record], plan: &SummaryPlan) -> Value {
    let mut by_day: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    let mut counts: BTreeMap<u32, usize> = BTreeMap::new();
    for record in records {
        let Some(day) = num_of(record, plan.day_fields).map(|d| d as u32) else {
            continue;
        };
        *counts.entry(day).or_default() += 1;
        if let Some(amount) = num_of(record, plan.amount_fields) {
            by_day.entry(day).or_default().push(amount);
        }
    }
    let rows: Vec<Value> = counts
        .into_iter()
        .map(|(day, count)| {
            let mut row = serde_json::Map::new();
            row.insert("day".into(), json!(day));
            row.insert("count".into(), json!(count));
            if let Some(stats) =
                NumStats::over(by_day.get(&day).into_iter().flatten().copied())
            {
                row.insert("avgAmount".into(), json!(round1(stats.mean)));
            }
            Value::Object(row)
        })
        .collect();
    Value::Array(rows)
}
