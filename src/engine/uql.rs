//! Execution-time semantics for UQL's Select/Aggregation/Join shapes and the
//! Correlation shape's WITHIN/NEAR/BEFORE/AFTER operators (§4.3.2, §4.4's join
//! semantics paragraph). Pure record-level logic, grounded in the same
//! `BTreeMap`-as-label-bag shape `engine::join` already uses for the
//! correlation DSL.

use std::collections::BTreeMap;
use std::time::Duration;

use crate::models::result::{CorrelationSummary, Record};
use crate::models::uql::{AggFunc, Condition, ConditionClause, ConditionOp, ConditionValue, Conjunction, TimeOperator};

/// Pulls a field's value out of a record: label map first, then a same-named
/// top-level key inside the record's JSON value.
pub fn record_field(record: &Record, field: &str) -> Option<serde_json::Value> {
    if let Some(v) = record.labels.get(field) {
        return Some(serde_json::Value::String(v.clone()));
    }
    record.value.as_object().and_then(|obj| obj.get(field)).cloned()
}

fn as_f64(value: &serde_json::Value) -> Option<f64> {
    value.as_f64().or_else(|| value.as_str().and_then(|s| s.parse().ok()))
}

fn as_str(value: &serde_json::Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

fn value_as_str(value: &ConditionValue) -> String {
    match value {
        ConditionValue::String(s) => s.clone(),
        ConditionValue::Integer(i) => i.to_string(),
        ConditionValue::Float(f) => f.to_string(),
        ConditionValue::Bool(b) => b.to_string(),
    }
}

fn condition_value_matches(lhs: &serde_json::Value, op: ConditionOp, rhs: &ConditionValue) -> bool {
    match op {
        ConditionOp::Eq | ConditionOp::Ne => {
            let eq = match rhs {
                ConditionValue::String(s) => as_str(lhs) == *s,
                ConditionValue::Integer(i) => as_f64(lhs) == Some(*i as f64),
                ConditionValue::Float(f) => as_f64(lhs) == Some(*f),
                ConditionValue::Bool(b) => lhs.as_bool() == Some(*b),
            };
            if op == ConditionOp::Eq {
                eq
            } else {
                !eq
            }
        }
        ConditionOp::Lt | ConditionOp::Lte | ConditionOp::Gt | ConditionOp::Gte => {
            let rv = match rhs {
                ConditionValue::Integer(i) => *i as f64,
                ConditionValue::Float(f) => *f,
                _ => return false,
            };
            match as_f64(lhs) {
                Some(lv) => match op {
                    ConditionOp::Lt => lv < rv,
                    ConditionOp::Lte => lv <= rv,
                    ConditionOp::Gt => lv > rv,
                    ConditionOp::Gte => lv >= rv,
                    _ => unreachable!(),
                },
                None => false,
            }
        }
        ConditionOp::Like => as_str(lhs).to_ascii_lowercase().contains(&value_as_str(rhs).to_ascii_lowercase()),
        ConditionOp::Match => regex::Regex::new(&value_as_str(rhs))
            .map(|re| re.is_match(&as_str(lhs)))
            .unwrap_or(false),
    }
}

fn condition_matches(record: &Record, cond: &Condition) -> bool {
    match record_field(record, &cond.field) {
        Some(v) => condition_value_matches(&v, cond.op, &cond.value),
        None => false,
    }
}

/// Left-folds a flat AND/OR chain — §4.3.2 forbids nested parentheses in
/// conditions, so there's no precedence to resolve.
pub fn clause_matches(record: &Record, clause: &ConditionClause) -> bool {
    let mut result = match clause.conditions.first() {
        Some(c) => condition_matches(record, c),
        None => return true,
    };
    for (cond, join) in clause.conditions.iter().skip(1).zip(clause.joins.iter()) {
        let next = condition_matches(record, cond);
        result = match join {
            Conjunction::And => result && next,
            Conjunction::Or => result || next,
        };
    }
    result
}

/// A `JoinQuery.on` clause compares a left-side field against a right-side
/// field named by the condition's value token (`ON trace_id = trace_id`).
fn condition_matches_pair(left: &Record, right: &Record, cond: &Condition) -> bool {
    let right_field = value_as_str(&cond.value);
    match (record_field(left, &cond.field), record_field(right, &right_field)) {
        (Some(lv), Some(rv)) => condition_value_matches(&lv, cond.op, &json_to_condition_value(&rv)),
        _ => false,
    }
}

fn json_to_condition_value(v: &serde_json::Value) -> ConditionValue {
    if let Some(s) = v.as_str() {
        ConditionValue::String(s.to_string())
    } else if let Some(i) = v.as_i64() {
        ConditionValue::Integer(i)
    } else if let Some(f) = v.as_f64() {
        ConditionValue::Float(f)
    } else if let Some(b) = v.as_bool() {
        ConditionValue::Bool(b)
    } else {
        ConditionValue::String(v.to_string())
    }
}

pub fn clause_matches_pair(left: &Record, right: &Record, clause: &ConditionClause) -> bool {
    let mut result = match clause.conditions.first() {
        Some(c) => condition_matches_pair(left, right, c),
        None => return true,
    };
    for (cond, join) in clause.conditions.iter().skip(1).zip(clause.joins.iter()) {
        let next = condition_matches_pair(left, right, cond);
        result = match join {
            Conjunction::And => result && next,
            Conjunction::Or => result || next,
        };
    }
    result
}

fn numeric_field(record: &Record, field: &str) -> Option<f64> {
    record_field(record, field).and_then(|v| as_f64(&v))
}

fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let idx = (((sorted.len() - 1) as f64) * p).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

/// Applies one §4.3.2 aggregation function over a record group. `field` is
/// `None` only for COUNT — `AggregationQuery::validate` already rejects every
/// other function without one.
pub fn aggregate(func: AggFunc, field: Option<&str>, records: &[Record]) -> f64 {
    if func == AggFunc::Count {
        return records.len() as f64;
    }
    let field = match field {
        Some(f) => f,
        None => return 0.0,
    };
    let values: Vec<f64> = records.iter().filter_map(|r| numeric_field(r, field)).collect();
    match func {
        AggFunc::Count => records.len() as f64,
        AggFunc::Sum | AggFunc::Increase => values.iter().sum(),
        AggFunc::Avg => {
            if values.is_empty() {
                0.0
            } else {
                values.iter().sum::<f64>() / values.len() as f64
            }
        }
        AggFunc::Min => values.iter().cloned().fold(f64::INFINITY, f64::min),
        AggFunc::Max => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        AggFunc::Rate => {
            let span = records
                .iter()
                .map(|r| r.timestamp)
                .max()
                .zip(records.iter().map(|r| r.timestamp).min())
                .map(|(max, min)| (max - min).num_seconds().max(1) as f64)
                .unwrap_or(1.0);
            values.iter().sum::<f64>() / span
        }
        AggFunc::Percentile | AggFunc::Quantile => percentile(&values, 0.95),
        AggFunc::Histogram => values.len() as f64,
    }
}

pub fn group_key(record: &Record, group_by: &[String]) -> BTreeMap<String, String> {
    group_by
        .iter()
        .map(|field| (field.clone(), record_field(record, field).map(|v| as_str(&v)).unwrap_or_default()))
        .collect()
}

fn summarize(records: Vec<Record>, confidences: Vec<f64>) -> (Vec<Record>, CorrelationSummary) {
    let matched_pairs = confidences.len();
    let average_confidence = if matched_pairs == 0 {
        0.0
    } else {
        confidences.iter().sum::<f64>() / matched_pairs as f64
    };
    (records, CorrelationSummary { matched_pairs, average_confidence })
}

fn within_fraction(window: Duration, delta_ms: i64) -> Option<f64> {
    let window_ms = window.as_millis().max(1) as f64;
    let delta = delta_ms.unsigned_abs() as f64;
    if delta <= window_ms {
        Some(delta / window_ms)
    } else {
        None
    }
}

/// Binary timed join for UQL's Correlation shape. AND/OR are set-theoretic —
/// UQL correlation carries no correlation-key concept the way the correlation
/// DSL's `CorrelationOptions` does, so "matched" just means both sides
/// produced at least one record.
pub fn join_uql(left: Vec<Record>, right: Vec<Record>, operator: TimeOperator, window: Option<Duration>) -> (Vec<Record>, CorrelationSummary) {
    match operator {
        TimeOperator::And => {
            if left.is_empty() || right.is_empty() {
                return (vec![], CorrelationSummary::default());
            }
            let mut records = left;
            records.extend(right);
            (records, CorrelationSummary { matched_pairs: 1, average_confidence: 1.0 })
        }
        TimeOperator::Or => {
            let mut records = left;
            records.extend(right);
            (records, CorrelationSummary::default())
        }
        TimeOperator::Within | TimeOperator::Near => {
            let window = window.unwrap_or_default();
            let mut matched = Vec::new();
            let mut confidences = Vec::new();
            for l in &left {
                for r in &right {
                    let delta_ms = (l.timestamp - r.timestamp).num_milliseconds();
                    if let Some(frac) = within_fraction(window, delta_ms) {
                        matched.push(l.clone());
                        matched.push(r.clone());
                        confidences.push(1.0 - frac);
                    }
                }
            }
            summarize(matched, confidences)
        }
        TimeOperator::Before => {
            let window = window.unwrap_or_default();
            let mut matched = Vec::new();
            let mut confidences = Vec::new();
            for l in &left {
                for r in &right {
                    let delta_ms = (r.timestamp - l.timestamp).num_milliseconds();
                    if delta_ms >= 0 {
                        if let Some(frac) = within_fraction(window, delta_ms) {
                            matched.push(l.clone());
                            matched.push(r.clone());
                            confidences.push(1.0 - frac);
                        }
                    }
                }
            }
            summarize(matched, confidences)
        }
        TimeOperator::After => {
            let window = window.unwrap_or_default();
            let mut matched = Vec::new();
            let mut confidences = Vec::new();
            for l in &left {
                for r in &right {
                    let delta_ms = (l.timestamp - r.timestamp).num_milliseconds();
                    if delta_ms >= 0 {
                        if let Some(frac) = within_fraction(window, delta_ms) {
                            matched.push(l.clone());
                            matched.push(r.clone());
                            confidences.push(1.0 - frac);
                        }
                    }
                }
            }
            summarize(matched, confidences)
        }
    }
}
