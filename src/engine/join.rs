//! Correlation join semantics (§4.4): given the per-engine result sets a
//! correlation query fanned out to, decide which records correlate and score
//! how confidently. Two matching strategies, picked by whether a time window
//! is driving the join: `WITHIN`/`NEAR`/`BEFORE`/`AFTER` (§4.4) are purely
//! time-based — no correlation-key agreement is required, and confidence
//! decays with `|Δt|/window` the same way `engine::uql::join_uql` scores its
//! binary timed joins. Plain AND/OR (no time window) instead requires the
//! configured correlation keys to agree, confidence being the matched/total
//! key fraction.

use std::collections::BTreeMap;

use crate::models::correlation::LogicalOperator;
use crate::models::result::{CorrelationSummary, Record};

/// Pulls a correlation key's value out of a record: first from its label map
/// (the metrics shape), falling back to a same-named top-level field inside
/// its JSON value (the logs/traces shape).
fn correlation_value(record: &Record, key: &str) -> Option<String> {
    if let Some(v) = record.labels.get(key) {
        return Some(v.clone());
    }
    record
        .value
        .as_object()
        .and_then(|obj| obj.get(key))
        .and_then(|v| v.as_str().map(str::to_string))
}

fn keys_match(a: &Record, b: &Record, keys: &[String]) -> (usize, usize) {
    let mut matched = 0;
    for key in keys {
        match (correlation_value(a, key), correlation_value(b, key)) {
            (Some(va), Some(vb)) if va == vb => matched += 1,
            _ => {}
        }
    }
    (matched, keys.len())
}

/// `1 - |Δt|/window` if the pair falls inside the window, `None` otherwise —
/// the same formula `engine::uql::join_uql`'s `within_fraction` uses for its
/// time-based operators.
fn time_confidence(a: &Record, b: &Record, window: std::time::Duration) -> Option<f64> {
    let window_ms = window.as_millis().max(1) as f64;
    let diff_ms = (a.timestamp - b.timestamp).num_milliseconds().unsigned_abs() as f64;
    if diff_ms <= window_ms {
        Some(1.0 - diff_ms / window_ms)
    } else {
        None
    }
}

/// Joins consecutive engine-result groups pairwise (group 0 vs 1, 1 vs 2, ...),
/// matching each pair's records by correlation key under the logical operator.
/// Returns the surviving records (AND keeps only matched pairs; OR keeps the
/// union) plus a summary of how many pairs matched and how confidently.
pub fn join(
    groups: &[Vec<Record>],
    operator: LogicalOperator,
    correlation_keys: &[String],
    window: Option<std::time::Duration>,
) -> (Vec<Record>, CorrelationSummary) {
    if groups.is_empty() {
        return (vec![], CorrelationSummary::default());
    }
    if groups.len() == 1 {
        return (groups[0].clone(), CorrelationSummary::default());
    }

    let mut matched_pairs = 0usize;
    let mut confidence_sum = 0.0f64;
    let mut surviving = BTreeMap::new(); // index path -> record, dedups by (group,index)
    for (g, records) in groups.iter().enumerate() {
        for (i, r) in records.iter().enumerate() {
            surviving.insert((g, i), r.clone());
        }
    }

    let mut and_keep: Vec<(usize, usize)> = Vec::new();

    for pair in groups.windows(2).enumerate() {
        let (g, window_pair) = pair;
        let (left, right) = (&window_pair[0], &window_pair[1]);
        for (li, lrec) in left.iter().enumerate() {
            for (ri, rrec) in right.iter().enumerate() {
                let confidence = match window {
                    Some(w) => match time_confidence(lrec, rrec, w) {
                        Some(c) => c,
                        None => continue,
                    },
                    None => {
                        let (matched, total) = keys_match(lrec, rrec, correlation_keys);
                        if total == 0 || matched == 0 {
                            continue;
                        }
                        matched as f64 / total as f64
                    }
                };
                matched_pairs += 1;
                confidence_sum += confidence;
                and_keep.push((g, li));
                and_keep.push((g + 1, ri));
            }
        }
    }

    let records = match operator {
        LogicalOperator::And => {
            let keep: std::collections::BTreeSet<(usize, usize)> = and_keep.into_iter().collect();
            surviving
                .into_iter()
                .filter(|(k, _)| keep.contains(k))
                .map(|(_, v)| v)
                .collect()
        }
        LogicalOperator::Or => surviving.into_values().collect(),
    };

    let summary = CorrelationSummary {
        matched_pairs,
        average_confidence: if matched_pairs == 0 {
            0.0
        } else {
            confidence_sum / matched_pairs as f64
        },
    };
    (records, summary)
}
